//! Structured logging for the treespace engine
//!
//! Every engine operation is bracketed by `log_op_start!` and either
//! `log_op_end!` or `log_op_error!`, so a log consumer can pair boundaries
//! by `op` and measure them by `duration_ms`. Install a subscriber once
//! with [`init`]; tests use [`init_test_capture`] instead.
//!
//! ```rust
//! use treespace_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
