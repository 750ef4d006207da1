//! Names shared by the logging macros and the test capture layer

/// Step name, e.g. `transfer` or `prune`
pub const FIELD_OP: &str = "op";
/// One of the `EVENT_*` values below
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
