//! Operation boundary macros
//!
//! Each emits `component` (the calling module), `op` and `event`, followed
//! by whatever extra fields the call site passes in `tracing` syntax.

/// Log the start of an operation
///
/// ```
/// # use treespace_core::log_op_start;
/// log_op_start!("compose");
/// log_op_start!("register_treespace", treespace = "controller");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)+)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::__log_schema::EVENT_START
            $(, $($field)+)?
        )
    };
}

/// Log the successful end of an operation
///
/// ```
/// # use treespace_core::log_op_end;
/// log_op_end!("mutate", duration_ms = 2u64, version = 7u64);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr $(, $($field:tt)+)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::__log_schema::EVENT_END,
            duration_ms = $duration
            $(, $($field)+)?
        )
    };
}

/// Log the failed end of an operation
///
/// `err` is anything convertible into `ExError`, `&TreespaceError`
/// included; its kind and stable code become fields, and so does its
/// request id when it carries one.
///
/// ```
/// # use treespace_core::{log_op_error, errors::TreespaceError};
/// let err = TreespaceError::TreespaceNotFound { name: "lab".to_string() };
/// log_op_error!("get_treespace", &err, duration_ms = 0u64, treespace = "lab");
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr $(, $($field:tt)+)?) => {{
        let ex: $crate::errors::ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::__log_schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?ex.kind(),
            err_code = ex.code(),
            error = %ex.message(),
            request_id = ex.request_id().map(tracing::field::display)
            $(, $($field)+)?
        )
    }};
}
