//! Composite format validation.
//!
//! Identifies each record once and hands it to every wrapped sub-plugin whose
//! type associations accept one of the identified labels.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::batch::{self, list_files, BatchRequest, RecordValidator};
use crate::error::Result;
use crate::log::LogLevel;
use crate::plugin::{
    Args, ExecutionContext, IdentificationPlugin, Plugin, PluginContext, PluginSignature,
    RecordResult, ValidationPlugin, ValidationResult,
};

/// Type association accepting every label.
pub const ANY_FORMAT: &str = "*";

/// A format validator wrapped by [`FileFormatModule`].
#[derive(Clone)]
pub struct SubPlugin {
    pub id: String,
    pub plugin: Arc<dyn ValidationPlugin>,
    /// Labels this sub-plugin handles; [`ANY_FORMAT`] accepts all.
    pub associations: Vec<String>,
    /// Bound arguments, completed per record with `path`, `batch` and `format`.
    pub args: Args,
}

impl SubPlugin {
    /// First of `formats` this sub-plugin accepts.
    pub fn accepts<'a>(&self, formats: &'a [String]) -> Option<&'a str> {
        formats
            .iter()
            .find(|f| {
                self.associations
                    .iter()
                    .any(|a| a == ANY_FORMAT || a == *f)
            })
            .map(String::as_str)
    }
}

impl std::fmt::Debug for SubPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubPlugin")
            .field("id", &self.id)
            .field("plugin", &self.plugin.name())
            .field("associations", &self.associations)
            .finish()
    }
}

pub struct FileFormatModule {
    identification: Arc<dyn IdentificationPlugin>,
    sub_plugins: Vec<SubPlugin>,
    payload_only: bool,
    signature: PluginSignature,
}

impl FileFormatModule {
    pub const NAME: &'static str = "file_format";

    pub fn new(identification: Arc<dyn IdentificationPlugin>, sub_plugins: Vec<SubPlugin>) -> Self {
        Self {
            identification,
            sub_plugins,
            payload_only: false,
            signature: batch::base_signature(),
        }
    }

    /// Restrict batch records to the payload directory `data/`.
    pub fn payload_only(mut self, payload_only: bool) -> Self {
        self.payload_only = payload_only;
        self
    }

    pub fn sub_plugins(&self) -> &[SubPlugin] {
        &self.sub_plugins
    }

    fn identify(&self, record: &Path) -> std::result::Result<Vec<String>, String> {
        let mut context = ExecutionContext::detached(self.identification.display_name());
        let mut args = Args::new();
        args.insert("path".to_string(), json!(record.to_string_lossy()));
        let identified = self.identification.identify(&mut context, &args);
        match (identified.success, identified.formats) {
            (Some(true), Some(formats)) => Ok(formats),
            _ => Err(format!(
                "Format identification using '{}' failed: {}",
                self.identification.name(),
                identified
                    .log
                    .last(LogLevel::Error)
                    .unwrap_or("Unknown error.")
            )),
        }
    }
}

impl std::fmt::Debug for FileFormatModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileFormatModule")
            .field("identification", &self.identification.name())
            .field("sub_plugins", &self.sub_plugins)
            .field("payload_only", &self.payload_only)
            .finish()
    }
}

impl Plugin for FileFormatModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn display_name(&self) -> &str {
        "File-Format-Module"
    }

    fn description(&self) -> &str {
        "File format validation delegating to format-specific plugins."
    }

    fn context(&self) -> PluginContext {
        PluginContext::Validation
    }

    fn signature(&self) -> &PluginSignature {
        &self.signature
    }

    fn info(&self) -> Value {
        let plugins: serde_json::Map<String, Value> = self
            .sub_plugins
            .iter()
            .map(|sub| (sub.id.clone(), json!(sub.associations)))
            .collect();
        json!({
            "identification": self.identification.name(),
            "plugins": plugins,
        })
    }
}

impl RecordValidator for FileFormatModule {
    type State = ();

    fn prepare(
        &self,
        _request: &BatchRequest,
        _context: &mut ExecutionContext<'_>,
    ) -> std::result::Result<(), String> {
        Ok(())
    }

    fn collect_records(&self, request: &BatchRequest, _state: &()) -> Result<Vec<PathBuf>> {
        if !self.payload_only {
            return list_files(&request.path);
        }
        let payload = request.path.join("data");
        if !payload.is_dir() {
            return Ok(Vec::new());
        }
        list_files(&payload)
    }

    fn validate_record(&self, record: &Path, _request: &BatchRequest, _state: &()) -> RecordResult {
        let mut result = RecordResult::new(record, self.display_name());
        let formats = match self.identify(record) {
            Ok(formats) => formats,
            Err(reason) => return result.fail(reason),
        };

        let mut success = true;
        let mut valid = true;
        let mut modules = Vec::new();
        for sub in &self.sub_plugins {
            let Some(format) = sub.accepts(&formats) else {
                continue;
            };
            debug!(
                record = %record.display(),
                plugin = %sub.id,
                format,
                "delegating format validation"
            );
            let mut args = sub.args.clone();
            args.insert("path".to_string(), json!(record.to_string_lossy()));
            args.insert("batch".to_string(), json!(false));
            args.insert("format".to_string(), json!(format));

            let mut context = ExecutionContext::detached(sub.plugin.display_name());
            let mut outcome = sub.plugin.execute(&mut context, &args);
            if outcome.success != Some(true) {
                result.log.error(format!(
                    "Plugin '{}' gave bad response for file '{}'.",
                    sub.id,
                    record.display()
                ));
            }
            success &= outcome.success == Some(true);
            valid &= outcome.valid == Some(true);
            match outcome.records.as_mut().and_then(|records| records.remove(&0)) {
                Some(part) => {
                    result.log.merge(part.log);
                    modules.push(part.module.unwrap_or_else(|| sub.id.clone()));
                }
                None => {
                    result.log.merge(outcome.log);
                    modules.push(sub.id.clone());
                }
            }
        }

        if modules.is_empty() {
            let shown = formats
                .iter()
                .map(|f| format!("'{f}'"))
                .collect::<Vec<_>>()
                .join(", ");
            result.log.warning(format!(
                "No format validation available for file '{}' (identified as {shown}).",
                record.display()
            ));
            result.success = Some(true);
            result.valid = Some(true);
            return result;
        }

        result.module = Some(modules.join(", "));
        result.success = Some(success);
        if success {
            result.valid = Some(valid);
        }
        result
    }
}

impl ValidationPlugin for FileFormatModule {
    fn execute(&self, context: &mut ExecutionContext<'_>, args: &Args) -> ValidationResult {
        batch::run(self, context, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::FidoPlugin;
    use crate::tools::fakes::ScriptedTool;

    struct Nothing(PluginSignature);

    impl Plugin for Nothing {
        fn name(&self) -> &str {
            "nothing"
        }
        fn display_name(&self) -> &str {
            "Nothing"
        }
        fn description(&self) -> &str {
            ""
        }
        fn context(&self) -> PluginContext {
            PluginContext::Validation
        }
        fn signature(&self) -> &PluginSignature {
            &self.0
        }
    }

    impl ValidationPlugin for Nothing {
        fn execute(&self, context: &mut ExecutionContext<'_>, _args: &Args) -> ValidationResult {
            ValidationResult::new(context.take_log())
        }
    }

    fn sub(associations: &[&str]) -> SubPlugin {
        SubPlugin {
            id: "file_format_nothing".to_string(),
            plugin: Arc::new(Nothing(PluginSignature::new())),
            associations: associations.iter().map(|a| a.to_string()).collect(),
            args: Args::new(),
        }
    }

    #[test]
    fn test_accepts_matching_label() {
        let formats = vec!["image/jpeg".to_string(), "image/png".to_string()];
        assert_eq!(sub(&["image/png"]).accepts(&formats), Some("image/png"));
        assert_eq!(sub(&["text/xml"]).accepts(&formats), None);
    }

    #[test]
    fn test_bad_sub_plugin_response_fails_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("pixel.png");
        std::fs::write(&file, [0u8; 8]).expect("write");

        let fido = ScriptedTool::stdout("fido", "image/png ");
        let module = FileFormatModule::new(
            Arc::new(FidoPlugin::mimetype(Arc::new(fido))),
            vec![sub(&[ANY_FORMAT])],
        );
        let mut args = Args::new();
        args.insert("path".to_string(), json!(file.to_string_lossy()));
        args.insert("batch".to_string(), json!(false));

        let mut context = ExecutionContext::detached("test");
        let result = module.execute(&mut context, &args);
        assert_eq!(result.success, Some(false));
        let record = result.record(0).expect("record");
        assert_eq!(record.success, Some(false));
        assert_eq!(record.valid, None);
        assert_eq!(record.module.as_deref(), Some("file_format_nothing"));
        assert!(record
            .log
            .last(LogLevel::Error)
            .expect("error")
            .starts_with("Plugin 'file_format_nothing' gave bad response"));
    }

    #[test]
    fn test_wildcard_accepts_first_label() {
        let formats = vec!["application/pdf".to_string()];
        assert_eq!(sub(&[ANY_FORMAT]).accepts(&formats), Some("application/pdf"));
        assert_eq!(sub(&[ANY_FORMAT]).accepts(&[]), None);
    }
}
