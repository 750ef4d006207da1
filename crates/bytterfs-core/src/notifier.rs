//! Operator notification interface.

use std::sync::{Arc, Mutex};

use crate::errors::ExError;

/// Severity of an operator notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    Info,
    Warning,
    Error,
}

impl NotifyEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyEvent::Info => "info",
            NotifyEvent::Warning => "warning",
            NotifyEvent::Error => "error",
        }
    }
}

/// Deliver an alert to the operator.
#[allow(clippy::result_large_err)]
pub trait Notifier {
    /// Send one notification.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::Notification` when delivery fails. Callers log
    /// the failure and carry on; a lost notification never fails a run.
    fn notify(&self, event: NotifyEvent, subject: &str, message: &str) -> Result<(), ExError>;
}

/// Noop notifier: accepts everything, delivers nothing.
/// Used when no notification command is configured; events still reach the log.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    #[allow(clippy::result_large_err)]
    fn notify(&self, _: NotifyEvent, _: &str, _: &str) -> Result<(), ExError> {
        Ok(())
    }
}

/// A notification kept by [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub event: NotifyEvent,
    pub subject: String,
    pub message: String,
}

/// Notifier that keeps every notification in memory for later assertions
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications sent so far
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Count notifications of one severity
    pub fn count(&self, event: NotifyEvent) -> usize {
        self.sent().iter().filter(|n| n.event == event).count()
    }
}

impl Notifier for RecordingNotifier {
    #[allow(clippy::result_large_err)]
    fn notify(&self, event: NotifyEvent, subject: &str, message: &str) -> Result<(), ExError> {
        self.sent
            .lock()
            .map(|mut sent| {
                sent.push(Notification {
                    event,
                    subject: subject.to_string(),
                    message: message.to_string(),
                })
            })
            .ok();
        Ok(())
    }
}
