//! Notifier delivering through an external mail helper
//!
//! The helper is invoked as `<program> -e <event> -s <subject> -m <message>`.

#![allow(clippy::result_large_err)]

use bytterfs_core::errors::{ExError, ExErrorKind};
use bytterfs_core::notifier::{Notifier, NotifyEvent};

use crate::btrfs::runner::{CommandLine, CommandRunner, ProcessRunner};

pub struct CommandNotifier<R = ProcessRunner> {
    program: String,
    runner: R,
}

impl CommandNotifier<ProcessRunner> {
    pub fn new(program: impl Into<String>) -> Self {
        Self::with_runner(program, ProcessRunner)
    }
}

impl<R: CommandRunner> CommandNotifier<R> {
    pub fn with_runner(program: impl Into<String>, runner: R) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    fn command(&self, event: NotifyEvent, subject: &str, message: &str) -> CommandLine {
        CommandLine::new(
            self.program.clone(),
            vec![
                "-e".to_string(),
                event.as_str().to_string(),
                "-s".to_string(),
                subject.to_string(),
                "-m".to_string(),
                message.to_string(),
            ],
        )
    }
}

impl<R: CommandRunner> Notifier for CommandNotifier<R> {
    fn notify(&self, event: NotifyEvent, subject: &str, message: &str) -> Result<(), ExError> {
        let command = self.command(event, subject, message);
        let fail = |reason: String| {
            ExError::new(ExErrorKind::Notification)
                .with_op("notify")
                .with_message(format!("{}: {}", self.program, reason))
        };

        let output = self.runner.run(&command).map_err(|e| fail(e.to_string()))?;
        if output.success {
            Ok(())
        } else {
            Err(fail(output.failure_summary()))
        }
    }
}
