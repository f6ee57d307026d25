//! Field and event names shared by every structured log line
//!
//! Operation boundaries are logged as `op=<name> event=<start|end|end_error>`;
//! the capture layer and log consumers key on these names.

pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";

// what the operation acted on
pub const FIELD_TREESPACE: &str = "treespace";
pub const FIELD_PATH: &str = "path";
pub const FIELD_VERSION: &str = "version";

pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";

/// True for the event that closes an operation, successful or not
pub fn is_terminal_event(event: &str) -> bool {
    event == EVENT_END || event == EVENT_END_ERROR
}
