//! Structured logging facility for forkstate
//!
//! - Single initialization point via `init(profile)`
//! - Boundary macros (`log_op_start!`, `log_op_end!`, `log_op_error!`) used by
//!   the engine around every public operation
//! - Test capture mode for asserting emitted events
//!
//! Store and kernel code never emit start/end events; they log at `debug`
//! level only so each operation has exactly one owning boundary.
//!
//! # Usage
//!
//! ```rust
//! use forkstate_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
