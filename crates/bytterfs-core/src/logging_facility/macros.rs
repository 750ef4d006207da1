//! Step logging macros
//!
//! Each macro emits one event tagged with `component`, `op` and `event`.
//! Extra `key = value` fields are passed through to `tracing` unchanged;
//! callers time the step and pass `duration_ms` to the end and error forms.

/// Mark the start of a step
///
/// ```
/// # use bytterfs_core::log_op_start;
/// log_op_start!("transfer");
/// log_op_start!("transfer", snapshot = "rootfs_1700000000");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)+)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::__core_types::schema::EVENT_START,
            $($($field)+)?
        )
    };
}

/// Mark the successful end of a step
///
/// ```
/// # use bytterfs_core::log_op_end;
/// log_op_end!("transfer", duration_ms = 42);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr $(, $($field:tt)+)?) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::__core_types::schema::EVENT_END,
            $($($field)+)?
        )
    };
}

/// Mark a failed step at ERROR level
///
/// `$err` is consumed and converted into an `ExError`; its kind and stable
/// code become `err.kind` and `err.code`, its rendering the message.
///
/// ```
/// # use bytterfs_core::{log_op_error, errors::BackupError};
/// log_op_error!("decide", BackupError::MarkerWithEmptyDestination, duration_ms = 10);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr $(, $($field:tt)+)?) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::__core_types::schema::EVENT_END_ERROR,
            err.kind = ?ex_err.kind(),
            err.code = ex_err.code(),
            $($($field)+ ,)?
            "{}",
            ex_err
        )
    }};
}
