//! Round clock: time-ordered ids and the shared round timestamp
//!
//! Every mutating round (commit, checkpoint, version or change set creation)
//! draws its ids from one `RoundClock`. Ids use the UUIDv7 layout:
//!
//! ```text
//! | 48 bit unix ms | ver 7 | 12 bit ctr hi | var 10 | 20 bit ctr lo | 42 bit rand |
//! ```
//!
//! The millisecond field is fixed for the round and strictly greater than the
//! previous round's, and the 32 bit counter increments per id, so ids sort in
//! issue order across and within rounds.

use chrono::{SecondsFormat, TimeZone, Utc};
use uuid::Uuid;

use crate::errors::{Result, StateError};

const MS_MASK: u64 = (1 << 48) - 1;
const RAND_MASK: u128 = (1 << 42) - 1;

#[derive(Debug, Clone)]
pub struct RoundClock {
    ms: u64,
    counter: u32,
    deterministic: bool,
}

impl RoundClock {
    /// Start a wall-clock round; `last_ms` is the previous round's millisecond
    pub fn begin(now_ms: u64, last_ms: Option<u64>) -> Self {
        let ms = match last_ms {
            Some(last) => now_ms.max(last + 1),
            None => now_ms,
        };
        Self {
            ms: ms & MS_MASK,
            counter: 0,
            deterministic: false,
        }
    }

    /// Start a reproducible round; ids carry no random bits
    pub fn deterministic(seed_ms: u64, sequence: u64) -> Self {
        Self {
            ms: seed_ms.saturating_add(sequence) & MS_MASK,
            counter: 0,
            deterministic: true,
        }
    }

    /// Current wall clock in unix milliseconds
    pub fn now_ms() -> u64 {
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
    }

    pub fn round_ms(&self) -> u64 {
        self.ms
    }

    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    /// Issue the next id of this round
    pub fn next_id(&mut self) -> Result<String> {
        let counter = self.counter;
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| StateError::Internal {
                message: "round id counter exhausted".to_string(),
            })?;

        let rand = if self.deterministic {
            0
        } else {
            Uuid::new_v4().as_u128() & RAND_MASK
        };

        let counter = u128::from(counter);
        let bits = (u128::from(self.ms) << 80)
            | (0x7 << 76)
            | ((counter >> 20) << 64)
            | (0b10 << 62)
            | ((counter & 0xF_FFFF) << 42)
            | rand;
        Ok(Uuid::from_u128(bits).to_string())
    }

    /// RFC 3339 timestamp shared by every change of the round
    pub fn timestamp(&self) -> String {
        let ms = i64::try_from(self.ms).unwrap_or(i64::MAX);
        Utc.timestamp_millis_opt(ms)
            .single()
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}
