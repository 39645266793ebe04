//! Scripted fake for [`ExternalTool`] (testing only)
//!
//! `ScriptedTool` answers every invocation through a closure and records the
//! argument lists it was called with, so tests can assert both on behavior
//! and on whether a binary would have been spawned at all.

use std::sync::{Mutex, PoisonError};

use crate::error::ToolError;
use crate::tools::{ExternalTool, ToolOutput};

type Responder = dyn Fn(&[String]) -> Result<ToolOutput, ToolError> + Send + Sync;

pub struct ScriptedTool {
    program: String,
    responder: Box<Responder>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedTool {
    pub fn new<F>(program: impl Into<String>, responder: F) -> Self
    where
        F: Fn(&[String]) -> Result<ToolOutput, ToolError> + Send + Sync + 'static,
    {
        Self {
            program: program.into(),
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always succeeds with the given stdout.
    pub fn stdout(program: impl Into<String>, stdout: impl Into<String>) -> Self {
        let stdout = stdout.into();
        Self::new(program, move |_| Ok(ToolOutput::ok(stdout.clone())))
    }

    /// Behaves like a binary that is not installed.
    pub fn missing(program: impl Into<String>) -> Self {
        let program = program.into();
        let name = program.clone();
        Self::new(program, move |_| {
            Err(ToolError::Spawn {
                program: name.clone(),
                reason: "No such file or directory (os error 2)".to_string(),
            })
        })
    }

    /// Argument lists of all invocations so far.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for ScriptedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTool")
            .field("program", &self.program)
            .field("calls", &self.call_count())
            .finish()
    }
}

impl ExternalTool for ScriptedTool {
    fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, args: &[String]) -> Result<ToolOutput, ToolError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(args.to_vec());
        (self.responder)(args)
    }
}
