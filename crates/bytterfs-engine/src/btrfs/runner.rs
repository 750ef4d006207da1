//! Command lines for both ends of the replication pair
//!
//! Source commands run locally. Destination commands run through ssh with
//! `sudo`, the remote command line being a single shell-quoted string.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use bytterfs_core_types::Sensitive;

/// ssh coordinates of the destination host
#[derive(Debug, Clone, PartialEq)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub key: Option<Sensitive<PathBuf>>,
}

impl SshTarget {
    pub fn new(host: impl Into<String>, port: u16, key: Option<Sensitive<PathBuf>>) -> Self {
        Self {
            host: host.into(),
            port,
            key,
        }
    }

    /// `ssh` options up to and including the host
    fn ssh_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(key) = &self.key {
            args.push("-i".to_string());
            args.push(key.expose().display().to_string());
        }
        args.push("-p".to_string());
        args.push(self.port.to_string());
        // never prompt from an unattended run
        args.push("-o".to_string());
        args.push("BatchMode=yes".to_string());
        args.push(self.host.clone());
        args
    }
}

/// Where a command runs
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    Local,
    Remote(SshTarget),
}

impl Endpoint {
    /// Wrap `argv` (program first) for this endpoint
    pub fn command(&self, argv: &[String]) -> CommandLine {
        let summary = argv.join(" ");
        match self {
            Endpoint::Local => CommandLine {
                program: argv.first().cloned().unwrap_or_default(),
                args: argv.iter().skip(1).cloned().collect(),
                summary,
            },
            Endpoint::Remote(target) => {
                let remote = std::iter::once("sudo")
                    .chain(argv.iter().map(String::as_str))
                    .map(shell_quote)
                    .collect::<Vec<_>>()
                    .join(" ");
                let mut args = target.ssh_args();
                args.push(remote);
                CommandLine {
                    program: "ssh".to_string(),
                    args,
                    summary: format!("[{}] sudo {}", target.host, summary),
                }
            }
        }
    }
}

/// A fully resolved command
///
/// `Display` shows the summary only, which never includes ssh options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    summary: String,
}

impl CommandLine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        let summary = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            program,
            args,
            summary,
        }
    }

    pub fn std_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }

    pub fn tokio_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Short failure description for error messages
    pub fn failure_summary(&self) -> String {
        let status = match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            status
        } else {
            format!("{}: {}", status, stderr)
        }
    }
}

/// Runs a command to completion and captures its output
pub trait CommandRunner {
    /// # Errors
    /// The spawn error when the program cannot be started. A non-zero exit
    /// is not an error here; callers inspect `CommandOutput::success`.
    fn run(&self, command: &CommandLine) -> std::io::Result<CommandOutput>;
}

/// Runs commands as child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &CommandLine) -> std::io::Result<CommandOutput> {
        tracing::debug!(command = %command, "running");
        let output = command.std_command().output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Quote one word for a POSIX shell
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./=:@,+%".contains(&b));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
