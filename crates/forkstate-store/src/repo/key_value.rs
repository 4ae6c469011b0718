//! Internal settings rows and the persisted round clock

#![allow(clippy::result_large_err)]

use crate::errors::{from_rusqlite, Result};
use forkstate_core::errors::{ExError, ExErrorKind};
use forkstate_core::RoundClock;
use rusqlite::{Connection, OptionalExtension};

/// Rounds completed so far; advanced exactly once per mutating round
pub const KEY_ROUND_SEQUENCE: &str = "round_sequence";
/// Millisecond field of the most recent round
pub const KEY_LAST_ROUND_MS: &str = "last_round_ms";
/// "true" once the database was opened in deterministic mode
pub const KEY_DETERMINISTIC_MODE: &str = "deterministic_mode";

pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row("SELECT value FROM key_value WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .optional()
    .map_err(from_rusqlite)
}

pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO key_value (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, value],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

fn get_u64(conn: &Connection, key: &str) -> Result<Option<u64>> {
    get(conn, key)?
        .map(|v| {
            v.parse::<u64>().map_err(|e| {
                ExError::new(ExErrorKind::Serialization)
                    .with_op("key_value")
                    .with_message(format!("{} is not a counter: {}", key, e))
            })
        })
        .transpose()
}

pub fn round_sequence(conn: &Connection) -> Result<u64> {
    Ok(get_u64(conn, KEY_ROUND_SEQUENCE)?.unwrap_or(0))
}

/// Start a round's clock from the persisted counters
///
/// `deterministic_seed_ms` switches to reproducible ids derived from the
/// round sequence.
pub fn begin_round(conn: &Connection, deterministic_seed_ms: Option<u64>) -> Result<RoundClock> {
    let sequence = round_sequence(conn)?;
    Ok(match deterministic_seed_ms {
        Some(seed) => RoundClock::deterministic(seed, sequence),
        None => RoundClock::begin(RoundClock::now_ms(), get_u64(conn, KEY_LAST_ROUND_MS)?),
    })
}

/// Persist the round's clock and advance the sequence; call once per round,
/// inside the round's transaction
pub fn finish_round(conn: &Connection, clock: &RoundClock) -> Result<u64> {
    let next = round_sequence(conn)? + 1;
    set(conn, KEY_ROUND_SEQUENCE, &next.to_string())?;
    set(conn, KEY_LAST_ROUND_MS, &clock.round_ms().to_string())?;
    Ok(next)
}
