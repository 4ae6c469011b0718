//! Migration framework
//!
//! - Embedded SQL migrations applied in id order
//! - SHA-256 checksums recorded in `schema_version`
//! - Idempotent application; checksum drift is rejected

mod checksums;
mod embedded;
mod runner;

pub use checksums::compute_checksum;
pub use runner::{apply_migrations, applied_migrations};
