//! JHOVE format validation adapter.
//!
//! JHOVE is always asked for JSON output (`-h JSON`). Module metadata is
//! loaded once per adapter and cached.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::tools::ExternalTool;

/// Application metadata reported by `jhove -h JSON`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JhoveAppInfo {
    pub release: String,
    /// Module name to module release.
    pub modules: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct AppEnvelope {
    #[serde(default)]
    jhove: AppSection,
}

#[derive(Debug, Default, Deserialize)]
struct AppSection {
    #[serde(default)]
    release: Option<String>,
    #[serde(default)]
    app: AppModules,
}

#[derive(Debug, Default, Deserialize)]
struct AppModules {
    #[serde(default)]
    modules: Vec<ModuleEntry>,
}

#[derive(Debug, Deserialize)]
struct ModuleEntry {
    module: Option<String>,
    release: Option<String>,
}

/// One message of a JHOVE record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JhoveMessage {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportingModule {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepInfo {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    reporting_module: ReportingModule,
    #[serde(default)]
    messages: Vec<JhoveMessage>,
}

/// Parsed response for one validated file.
#[derive(Debug, Clone, PartialEq)]
pub struct JhoveReport {
    /// The complete JSON document.
    pub raw: Value,
    pub uri: Option<String>,
    pub status: Option<String>,
    /// Module that actually produced the report.
    pub reporting_module: Option<String>,
    pub messages: Vec<JhoveMessage>,
}

impl JhoveReport {
    /// Messages with `error` severity.
    pub fn errors(&self) -> impl Iterator<Item = &JhoveMessage> {
        self.messages
            .iter()
            .filter(|m| m.severity.as_deref() == Some("error"))
    }

    /// Parse the stdout of `jhove -h JSON ... <file>`.
    pub fn parse(program: &str, stdout: &str) -> Result<Self, ToolError> {
        let raw: Value = serde_json::from_str(stdout).map_err(|_| ToolError::Unreadable {
            program: program.to_string(),
            output: stdout.to_string(),
        })?;
        let first = raw
            .get("jhove")
            .and_then(|j| j.get("repInfo"))
            .and_then(Value::as_array)
            .and_then(|records| records.first())
            .cloned()
            .ok_or_else(|| ToolError::EmptyResponse {
                program: program.to_string(),
                output: stdout.to_string(),
            })?;
        let record: RepInfo = serde_json::from_value(first).map_err(|_| ToolError::Unreadable {
            program: program.to_string(),
            output: stdout.to_string(),
        })?;
        Ok(Self {
            raw,
            uri: record.uri,
            status: record.status,
            reporting_module: record.reporting_module.name,
            messages: record.messages,
        })
    }
}

pub struct Jhove {
    tool: Arc<dyn ExternalTool>,
    info: OnceLock<Option<JhoveAppInfo>>,
}

impl Jhove {
    pub fn new(tool: Arc<dyn ExternalTool>) -> Self {
        Self {
            tool,
            info: OnceLock::new(),
        }
    }

    pub fn program(&self) -> &str {
        self.tool.program()
    }

    /// Check that JHOVE can be invoked (bare `jhove`).
    pub fn probe(&self) -> Result<(), ToolError> {
        self.tool.run(&[])?.check(self.tool.program()).map(|_| ())
    }

    /// Application metadata; `None` when JHOVE is unavailable or its answer
    /// cannot be read. Loaded on first use.
    pub fn app_info(&self) -> Option<&JhoveAppInfo> {
        self.info.get_or_init(|| self.load_app_info()).as_ref()
    }

    /// Loaded modules and their releases.
    pub fn modules(&self) -> BTreeMap<String, String> {
        self.app_info()
            .map(|info| info.modules.clone())
            .unwrap_or_default()
    }

    pub fn release(&self) -> String {
        self.app_info()
            .map(|info| info.release.clone())
            .unwrap_or_else(|| "?".to_string())
    }

    fn load_app_info(&self) -> Option<JhoveAppInfo> {
        let args = ["-h".to_string(), "JSON".to_string()];
        let output = match self.tool.run(&args).and_then(|o| o.check(self.tool.program())) {
            Ok(output) => output,
            Err(err) => {
                warn!(program = %self.tool.program(), error = %err, "cannot load JHOVE metadata");
                return None;
            }
        };
        let envelope: AppEnvelope = match serde_json::from_str(&output.stdout) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(program = %self.tool.program(), error = %err, "unreadable JHOVE metadata");
                return None;
            }
        };
        let modules = envelope
            .jhove
            .app
            .modules
            .into_iter()
            .map(|m| {
                (
                    m.module.unwrap_or_else(|| "?".to_string()),
                    m.release.unwrap_or_else(|| "?".to_string()),
                )
            })
            .collect();
        let info = JhoveAppInfo {
            release: envelope.jhove.release.unwrap_or_else(|| "?".to_string()),
            modules,
        };
        debug!(release = %info.release, modules = info.modules.len(), "loaded JHOVE metadata");
        Some(info)
    }

    /// Validate `file`, constrained to `module` when given.
    pub fn validate(&self, file: &Path, module: Option<&str>) -> Result<JhoveReport, ToolError> {
        let mut args = vec!["-h".to_string(), "JSON".to_string()];
        if let Some(module) = module {
            args.push("-m".to_string());
            args.push(module.to_string());
        }
        args.push(file.to_string_lossy().into_owned());
        let output = self.tool.run(&args)?.check(self.tool.program())?;
        JhoveReport::parse(self.tool.program(), &output.stdout)
    }
}

impl fmt::Debug for Jhove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jhove")
            .field("program", &self.tool.program())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fakes::ScriptedTool;
    use crate::tools::ToolOutput;

    const APP_INFO: &str = r#"{"jhove": {"name": "Jhove", "release": "1.28.0",
        "app": {"modules": [{"module": "JPEG-hul", "release": "1.5.4"},
                            {"module": "PDF-hul", "release": "1.12.4"}]}}}"#;

    #[test]
    fn test_app_info_is_cached() {
        let tool = Arc::new(ScriptedTool::stdout("jhove", APP_INFO));
        let jhove = Jhove::new(tool.clone());
        assert_eq!(jhove.release(), "1.28.0");
        assert_eq!(jhove.modules().get("PDF-hul").map(String::as_str), Some("1.12.4"));
        assert_eq!(tool.call_count(), 1);
    }

    #[test]
    fn test_app_info_unavailable() {
        let jhove = Jhove::new(Arc::new(ScriptedTool::missing("jhove")));
        assert!(jhove.app_info().is_none());
        assert!(jhove.modules().is_empty());
        assert_eq!(jhove.release(), "?");
    }

    #[test]
    fn test_validate_builds_command() {
        let tool = Arc::new(ScriptedTool::stdout(
            "jhove",
            r#"{"jhove": {"repInfo": [{"uri": "a.jpg", "status": "Well-Formed and valid",
                "reportingModule": {"name": "JPEG-hul"}, "messages": []}]}}"#,
        ));
        let jhove = Jhove::new(tool.clone());
        let report = jhove
            .validate(Path::new("a.jpg"), Some("JPEG-hul"))
            .expect("validate");
        assert_eq!(report.reporting_module.as_deref(), Some("JPEG-hul"));
        assert_eq!(report.errors().count(), 0);
        assert_eq!(tool.calls()[0], vec!["-h", "JSON", "-m", "JPEG-hul", "a.jpg"]);

        jhove.validate(Path::new("b.bin"), None).expect("validate");
        assert_eq!(tool.calls()[1], vec!["-h", "JSON", "b.bin"]);
    }

    #[test]
    fn test_parse_collects_errors() {
        let report = JhoveReport::parse(
            "jhove",
            r#"{"jhove": {"repInfo": [{"uri": "a.pdf", "status": "Not well-formed",
                "reportingModule": {"name": "PDF-hul"},
                "messages": [{"message": "No PDF header", "severity": "error", "id": "PDF-HUL-137"},
                             {"message": "Outlines", "severity": "info"}]}]}}"#,
        )
        .expect("parse");
        let errors: Vec<_> = report.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].id.as_deref(), Some("PDF-HUL-137"));
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(
            JhoveReport::parse("jhove", "not json"),
            Err(ToolError::Unreadable { .. })
        ));
        assert!(matches!(
            JhoveReport::parse("jhove", r#"{"jhove": {"repInfo": []}}"#),
            Err(ToolError::EmptyResponse { .. })
        ));
    }

    #[test]
    fn test_validate_non_zero_exit() {
        let tool = Arc::new(ScriptedTool::new("jhove", |_| Ok(ToolOutput::failed(1, "Exception"))));
        let err = Jhove::new(tool).validate(Path::new("a"), None).expect_err("failed");
        assert_eq!(err.to_string(), "jhove returned with error: Exception");
    }
}
