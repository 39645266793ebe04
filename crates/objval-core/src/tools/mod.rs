//! External tool adapters.
//!
//! Each adapter maps `(args) -> parsed result | ToolError` for one binary so
//! that all text and JSON parsing of tool output lives in one place per tool.

pub mod fakes;
pub mod fido;
pub mod jhove;

use std::process::Command;

use tracing::debug;

use crate::error::ToolError;

pub use fido::{Fido, FormatVocabulary};
pub use jhove::{Jhove, JhoveAppInfo, JhoveMessage, JhoveReport};

/// Captured output of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Convert a non-zero exit into [`ToolError::Failed`].
    pub fn check(self, program: &str) -> Result<Self, ToolError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ToolError::Failed {
                program: program.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }
}

/// A runnable external program.
///
/// `run` only fails when the program cannot be started; a non-zero exit is a
/// regular [`ToolOutput`].
pub trait ExternalTool: Send + Sync {
    fn program(&self) -> &str;

    fn run(&self, args: &[String]) -> Result<ToolOutput, ToolError>;
}

/// Runs a program on the host, blocking until it exits.
#[derive(Debug, Clone)]
pub struct SystemTool {
    program: String,
    /// Arguments placed before the per-call arguments.
    prefix: Vec<String>,
}

impl SystemTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            prefix: Vec::new(),
        }
    }

    pub fn with_prefix(program: impl Into<String>, prefix: Vec<String>) -> Self {
        Self {
            program: program.into(),
            prefix,
        }
    }
}

impl ExternalTool for SystemTool {
    fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, args: &[String]) -> Result<ToolOutput, ToolError> {
        debug!(program = %self.program, ?args, "running external tool");
        let output = Command::new(&self.program)
            .args(&self.prefix)
            .args(args)
            .output()
            .map_err(|e| ToolError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;
        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
