//! Error handling for forkstate-store
//!
//! Wraps forkstate-core ExError with store-specific helpers

use forkstate_core::errors::{ExError, ExErrorKind};
use rusqlite::ErrorCode;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Message prefix raised by the immutability triggers
pub const IMMUTABILITY_PREFIX: &str = "IMMUTABILITY_VIOLATION";

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

/// Create a checksum mismatch error
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> ExError {
    ExError::new(ExErrorKind::ConstraintViolation)
        .with_op("migration_checksum")
        .with_message(format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ))
}

/// Map a rusqlite error onto the canonical taxonomy
///
/// Trigger aborts carrying the immutability prefix become
/// `ImmutabilityViolation`; other constraint failures become
/// `ConstraintViolation`; lock contention becomes `Concurrency`.
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    let kind = match &err {
        rusqlite::Error::SqliteFailure(code, message) => {
            let raised_by_trigger = message
                .as_deref()
                .is_some_and(|m| m.starts_with(IMMUTABILITY_PREFIX));
            if raised_by_trigger {
                ExErrorKind::ImmutabilityViolation
            } else {
                match code.code {
                    ErrorCode::ConstraintViolation => ExErrorKind::ConstraintViolation,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                        ExErrorKind::Concurrency
                    }
                    _ => ExErrorKind::Persistence,
                }
            }
        }
        rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..) => {
            ExErrorKind::Serialization
        }
        _ => ExErrorKind::Persistence,
    };
    ExError::new(kind)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Create an IO error
pub fn io_error(operation: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    fn failure(code: std::os::raw::c_int, message: &str) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), Some(message.to_string()))
    }

    #[test]
    fn test_trigger_abort_is_immutability() {
        let err = from_rusqlite(failure(
            ffi::SQLITE_CONSTRAINT_TRIGGER,
            "IMMUTABILITY_VIOLATION: changes are append-only",
        ));
        assert_eq!(err.kind(), ExErrorKind::ImmutabilityViolation);
    }

    #[test]
    fn test_unique_failure_is_constraint() {
        let err = from_rusqlite(failure(
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY,
            "UNIQUE constraint failed: versions.name",
        ));
        assert_eq!(err.kind(), ExErrorKind::ConstraintViolation);
    }

    #[test]
    fn test_busy_is_concurrency() {
        let err = from_rusqlite(failure(ffi::SQLITE_BUSY, "database is locked"));
        assert_eq!(err.kind(), ExErrorKind::Concurrency);
    }

    #[test]
    fn test_other_is_persistence() {
        let err = from_rusqlite(rusqlite::Error::InvalidQuery);
        assert_eq!(err.kind(), ExErrorKind::Persistence);
        assert_eq!(err.op(), Some("sqlite"));
    }
}
