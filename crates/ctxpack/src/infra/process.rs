//! Child process execution.

use std::ffi::OsString;
use std::io;
use std::process::{Command, Stdio};

/// Exit status and (optionally captured) output of a child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Capability to run an external program to completion.
///
/// The pipeline only depends on this trait so tests can substitute a fake.
pub trait ProcessRunner {
    /// Run `program` with `args`, blocking until it exits. Spawn failures are `Err`.
    fn run(&self, program: &str, args: &[OsString]) -> io::Result<ProcessOutput>;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for &R {
    fn run(&self, program: &str, args: &[OsString]) -> io::Result<ProcessOutput> {
        (**self).run(program, args)
    }
}

/// How child output streams are wired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Stream straight to the parent's stdout/stderr; nothing is captured.
    #[default]
    Inherit,
    Capture,
}

/// [`ProcessRunner`] backed by [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    mode: OutputMode,
}

impl SystemRunner {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &str, args: &[OsString]) -> io::Result<ProcessOutput> {
        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null());

        match self.mode {
            OutputMode::Inherit => {
                let status = command
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit())
                    .status()?;
                Ok(ProcessOutput {
                    exit_code: status.code(),
                    ..ProcessOutput::default()
                })
            }
            OutputMode::Capture => {
                let output = command.output()?;
                Ok(ProcessOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
        }
    }
}

/// Render a command line for logs and error messages.
pub fn display_command(program: &str, args: &[OsString]) -> String {
    let mut line = program.to_owned();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}
