//! Validation plugins backed by an arbitrary external command.
//!
//! Descriptors are JSON files:
//!
//! ```json
//! {"name": "xmllint", "display_name": "XML-Lint", "command": ["xmllint", "--noout"]}
//! ```
//!
//! The record path is appended to `command`; exit code 0 means valid.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::batch::{self, BatchRequest, RecordValidator};
use crate::error::{RegistryError, ToolError};
use crate::plugin::{
    Args, ExecutionContext, Plugin, PluginContext, PluginSignature, RecordResult,
    ValidationPlugin, ValidationResult,
};
use crate::tools::{ExternalTool, SystemTool};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Program followed by its leading arguments.
    pub command: Vec<String>,
}

impl CommandDescriptor {
    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let bad = |reason: String| RegistryError::BadDescriptor {
            path: path.to_path_buf(),
            reason,
        };
        let content = fs::read_to_string(path).map_err(|e| bad(e.to_string()))?;
        let descriptor: Self = serde_json::from_str(&content).map_err(|e| bad(e.to_string()))?;
        if descriptor.command.is_empty() {
            return Err(bad("'command' must name a program".to_string()));
        }
        Ok(descriptor)
    }
}

pub struct CommandPlugin {
    descriptor: CommandDescriptor,
    display_name: String,
    description: String,
    tool: Arc<dyn ExternalTool>,
    signature: PluginSignature,
}

impl CommandPlugin {
    pub fn new(descriptor: CommandDescriptor) -> Self {
        let (program, prefix) = match descriptor.command.split_first() {
            Some((program, prefix)) => (program.clone(), prefix.to_vec()),
            None => (String::new(), Vec::new()),
        };
        Self::with_tool(descriptor, Arc::new(SystemTool::with_prefix(program, prefix)))
    }

    pub fn with_tool(descriptor: CommandDescriptor, tool: Arc<dyn ExternalTool>) -> Self {
        let display_name = descriptor
            .display_name
            .clone()
            .unwrap_or_else(|| format!("{}-Plugin", descriptor.name));
        let description = descriptor
            .description
            .clone()
            .unwrap_or_else(|| {
                format!("File validation using '{}'.", descriptor.command.join(" "))
            });
        Self {
            descriptor,
            display_name,
            description,
            tool,
            signature: batch::base_signature(),
        }
    }

    pub fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }
}

/// Whether `program` resolves to a file, directly or through `PATH`.
fn program_available(program: &str) -> bool {
    let direct = Path::new(program);
    if direct.components().count() > 1 {
        return direct.is_file();
    }
    env::var_os("PATH")
        .map(|paths| {
            env::split_paths(&paths).any(|dir: PathBuf| dir.join(program).is_file())
        })
        .unwrap_or(false)
}

impl std::fmt::Debug for CommandPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandPlugin")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl Plugin for CommandPlugin {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn context(&self) -> PluginContext {
        PluginContext::Validation
    }

    fn signature(&self) -> &PluginSignature {
        &self.signature
    }

    fn requirements_met(&self) -> Result<(), String> {
        let program = self.tool.program();
        if program_available(program) {
            Ok(())
        } else {
            Err(format!("Unable to locate program '{program}'."))
        }
    }

    fn info(&self) -> Value {
        json!({ "command": self.descriptor.command })
    }
}

impl RecordValidator for CommandPlugin {
    type State = ();

    fn prepare(
        &self,
        _request: &BatchRequest,
        _context: &mut ExecutionContext<'_>,
    ) -> Result<(), String> {
        Ok(())
    }

    fn validate_record(&self, record: &Path, _request: &BatchRequest, _state: &()) -> RecordResult {
        let mut result = RecordResult::new(record, &self.display_name);
        let program = self.tool.program().to_string();
        let output = match self.tool.run(&[record.to_string_lossy().into_owned()]) {
            Ok(output) => output,
            Err(ToolError::Spawn { reason, .. }) => {
                return result.fail(format!("Unable to run '{program}': {reason}"))
            }
            Err(other) => return result.fail(other.to_string()),
        };
        result.success = Some(true);
        if output.success() {
            result.valid = Some(true);
            result
                .log
                .info(format!("File '{}' accepted by '{program}'.", record.display()));
        } else {
            result.valid = Some(false);
            let code = output
                .exit_code
                .map_or_else(|| "none".to_string(), |c| c.to_string());
            result.log.error(format!(
                "File '{}' rejected by '{program}' (exit code {code}): {}",
                record.display(),
                output.stderr.trim()
            ));
        }
        result
    }
}

impl ValidationPlugin for CommandPlugin {
    fn execute(&self, context: &mut ExecutionContext<'_>, args: &Args) -> ValidationResult {
        batch::run(self, context, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogLevel;
    use crate::tools::fakes::ScriptedTool;
    use crate::tools::ToolOutput;

    fn descriptor() -> CommandDescriptor {
        CommandDescriptor {
            name: "lint".to_string(),
            display_name: None,
            description: None,
            command: vec!["lint".to_string(), "--strict".to_string()],
        }
    }

    #[test]
    fn test_descriptor_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("lint.json");
        let content = r#"{"name": "lint", "command": ["lint", "--strict"]}"#;
        std::fs::write(&path, content).expect("write");
        assert_eq!(CommandDescriptor::from_file(&path).expect("descriptor"), descriptor());

        std::fs::write(&path, r#"{"name": "lint", "command": []}"#).expect("write");
        assert!(matches!(
            CommandDescriptor::from_file(&path),
            Err(RegistryError::BadDescriptor { .. })
        ));
    }

    #[test]
    fn test_exit_code_decides_validity() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("good.xml"), "<a/>").expect("write");
        std::fs::write(dir.path().join("bad.xml"), "<a>").expect("write");

        let tool = ScriptedTool::new("lint", |args| {
            if args[0].ends_with("good.xml") {
                Ok(ToolOutput::ok(""))
            } else {
                Ok(ToolOutput::failed(1, "premature end of data\n"))
            }
        });
        let plugin = CommandPlugin::with_tool(descriptor(), Arc::new(tool));
        assert_eq!(plugin.display_name(), "lint-Plugin");

        let args = json!({"path": dir.path().to_str().expect("utf-8")});
        let mut context = ExecutionContext::detached(plugin.display_name());
        let result = plugin.execute(&mut context, args.as_object().expect("object"));

        assert_eq!(result.record_count(), 2);
        assert_eq!(result.success, Some(true));
        assert_eq!(result.valid, Some(false));
        let error = result.log.last(LogLevel::Error).expect("error");
        assert!(error.contains("bad.xml"));
        assert!(error.ends_with("(exit code 1): premature end of data"));
    }

    #[test]
    fn test_spawn_failure_fails_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("a.xml");
        std::fs::write(&file, "<a/>").expect("write");
        let tool = Arc::new(ScriptedTool::missing("lint"));
        let plugin = CommandPlugin::with_tool(descriptor(), tool);
        let args = json!({"path": file.to_str().expect("utf-8"), "batch": false});
        let mut context = ExecutionContext::detached(plugin.display_name());
        let result = plugin.execute(&mut context, args.as_object().expect("object"));
        assert_eq!(result.success, Some(false));
        assert_eq!(result.record(0).and_then(|r| r.valid), None);
    }
}
