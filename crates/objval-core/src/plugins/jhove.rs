//! Format validation through JHOVE with fido identification.
//!
//! Per record the JHOVE module is resolved, highest precedence first, from an
//! explicit `module` argument, an explicit `format` argument, or the fido
//! MIME-type labels mapped through the module-type table. Without a table
//! match JHOVE is asked to auto-detect.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::batch::{self, list_files, BatchRequest, RecordValidator};
use crate::error::{Result, ToolError};
use crate::log::LogLevel;
use crate::plugin::{
    Argument, Args, ExecutionContext, JsonType, Plugin, PluginContext, PluginSignature,
    RecordResult, ValidationPlugin, ValidationResult,
};
use crate::plugins::identification::FidoPlugin;
use crate::tools::{ExternalTool, Jhove, JhoveReport};

pub const DISPLAY_NAME: &str = "JHOVE-Plugin";

/// Sentinel module asking JHOVE to pick a module itself.
pub const AUTO_MODULE: &str = "auto";

/// Module-type table: JHOVE module to the format labels it handles.
pub type ModuleTypeMap = Vec<(String, Vec<String>)>;

const DEFAULT_MODULE_MAP: &[(&str, &[&str])] = &[
    ("AIFF-hul", &["audio/x-aiff"]),
    ("GIF-hul", &["image/gif"]),
    ("HTML-hul", &["text/html"]),
    ("JPEG-hul", &["image/jpeg"]),
    ("JPEG2000-hul", &["image/jp2", "image/jpx"]),
    ("PDF-hul", &["application/pdf"]),
    ("TIFF-hul", &["image/tiff", "image/tiff-fx", "image/ief"]),
    ("WAVE-hul", &["audio/vnd.wave"]),
    ("XML-hul", &["text/xml"]),
    ("PNG-gdm", &["image/png"]),
];

pub fn default_module_map() -> ModuleTypeMap {
    DEFAULT_MODULE_MAP
        .iter()
        .map(|(module, types)| {
            (
                module.to_string(),
                types.iter().map(|t| t.to_string()).collect(),
            )
        })
        .collect()
}

/// First module in `table` handling any of `formats`, else [`AUTO_MODULE`].
pub fn resolve_module<'a>(table: &'a [(String, Vec<String>)], formats: &[String]) -> &'a str {
    table
        .iter()
        .find(|(_, types)| formats.iter().any(|f| types.contains(f)))
        .map_or(AUTO_MODULE, |(module, _)| module.as_str())
}

#[derive(Debug)]
pub struct JhovePlugin {
    jhove: Jhove,
    identification: Arc<FidoPlugin>,
    module_map: ModuleTypeMap,
    payload_only: bool,
    signature: PluginSignature,
}

impl JhovePlugin {
    pub const NAME: &'static str = "jhove-fido-mimetype";
    pub const BAGIT_NAME: &'static str = "jhove-fido-mimetype-bagit";

    pub fn new(jhove: Arc<dyn ExternalTool>, fido: Arc<dyn ExternalTool>) -> Self {
        Self::with_identification(jhove, Arc::new(FidoPlugin::mimetype(fido)))
    }

    pub fn with_identification(
        jhove: Arc<dyn ExternalTool>,
        identification: Arc<FidoPlugin>,
    ) -> Self {
        let signature = batch::base_signature()
            .with(
                "format",
                Argument::new(
                    JsonType::String,
                    "explicitly specify file-format; takes precedence over identification-plugin",
                )
                .with_example(json!("image/jpeg")),
            )
            .with(
                "module",
                Argument::new(
                    JsonType::String,
                    "request specific JHOVE-module; takes precedence over using identification-plugin to determine the correct module",
                )
                .with_example(json!("JPEG-hul")),
            );
        Self {
            jhove: Jhove::new(jhove),
            identification,
            module_map: default_module_map(),
            payload_only: false,
            signature,
        }
    }

    /// BagIt variant: batch only, records are the payload files under `data/`.
    pub fn bagit(mut self) -> Self {
        self.payload_only = true;
        self
    }

    pub fn with_module_map(mut self, module_map: ModuleTypeMap) -> Self {
        self.module_map = module_map;
        self
    }

    pub fn identification(&self) -> &FidoPlugin {
        &self.identification
    }

    /// Modules JHOVE can be asked for, including [`AUTO_MODULE`].
    pub fn known_modules(&self) -> BTreeMap<String, String> {
        let mut modules = self.jhove.modules();
        modules.insert(AUTO_MODULE.to_string(), "-".to_string());
        modules
    }

    /// The module-type table restricted to modules JHOVE actually provides.
    pub fn effective_module_map(&self) -> ModuleTypeMap {
        let known = self.jhove.modules();
        self.module_map
            .iter()
            .filter(|(module, _)| known.contains_key(module))
            .cloned()
            .collect()
    }

    fn fail(result: RecordResult, reason: impl std::fmt::Display) -> RecordResult {
        result.fail(format!("Call to JHOVE failed: {reason}"))
    }

    fn record_module(
        &self,
        record: &Path,
        request: &BatchRequest,
        result: &mut RecordResult,
    ) -> std::result::Result<String, String> {
        if let Some(module) = request.str_arg("module") {
            return Ok(module.to_string());
        }
        let formats = match request.str_arg("format") {
            Some(format) => vec![format.to_string()],
            None => {
                let mut context = ExecutionContext::detached(self.identification.display_name());
                let identified = self.identification.identify_path(&mut context, record);
                if identified.success != Some(true) {
                    return Err(format!(
                        "Format identification using '{}' failed: {}",
                        self.identification.name(),
                        identified
                            .log
                            .last(LogLevel::Error)
                            .unwrap_or("Unknown error.")
                    ));
                }
                let formats = identified.formats.unwrap_or_default();
                result.log.log_from(
                    LogLevel::Info,
                    self.identification.display_name(),
                    format!(
                        "Identified file '{}' as '{}'.",
                        record.display(),
                        formats.join("', '")
                    ),
                );
                formats
            }
        };
        Ok(resolve_module(&self.effective_module_map(), &formats).to_string())
    }

    fn describe_failure(err: ToolError) -> String {
        match err {
            ToolError::Spawn { reason, .. } => format!("Unable to run JHOVE: {reason}"),
            other => other.to_string(),
        }
    }

    fn evaluate(result: &mut RecordResult, report: JhoveReport, requested: &str) {
        let uri = report.uri.clone().unwrap_or_else(|| "?".to_string());
        let reporting = report
            .reporting_module
            .clone()
            .unwrap_or_else(|| "?".to_string());
        for message in report.errors() {
            result.log.error(format!(
                "{} (file '{uri}', module '{reporting}', id '{}')",
                message.message.as_deref().unwrap_or("?"),
                message.id.as_deref().unwrap_or("?"),
            ));
        }
        let module = report
            .reporting_module
            .clone()
            .unwrap_or_else(|| requested.to_string());
        result.log.info(format!(
            "{} (file '{uri}', module '{module}')",
            report.status.as_deref().unwrap_or("?")
        ));
        result.module = Some(module);
        result.raw = Some(report.raw);
        result.success = Some(true);
        result.valid = Some(!result.log.contains(LogLevel::Error));
    }
}

impl Plugin for JhovePlugin {
    fn name(&self) -> &str {
        if self.payload_only {
            Self::BAGIT_NAME
        } else {
            Self::NAME
        }
    }

    fn display_name(&self) -> &str {
        DISPLAY_NAME
    }

    fn description(&self) -> &str {
        if self.payload_only {
            concat!(
                "File format validation using JHOVE (with format-identification via ",
                "'fido/MIME-Plugin' (fido-mimetype)). ",
                "Validates only payload-section of given BagIt-bag."
            )
        } else {
            concat!(
                "File format validation using JHOVE (with format-identification via ",
                "'fido/MIME-Plugin' (fido-mimetype))."
            )
        }
    }

    fn context(&self) -> PluginContext {
        PluginContext::Validation
    }

    fn signature(&self) -> &PluginSignature {
        &self.signature
    }

    fn requirements_met(&self) -> std::result::Result<(), String> {
        self.identification.requirements_met()?;
        self.jhove.probe().map_err(|err| match err {
            ToolError::Spawn { reason, .. } => format!("Unable to load JHOVE: {reason}"),
            ToolError::Failed { stderr, .. } => format!("JHOVE returned with an error: {stderr}"),
            other => other.to_string(),
        })
    }

    fn info(&self) -> Value {
        let table: serde_json::Map<String, Value> = self
            .effective_module_map()
            .into_iter()
            .map(|(module, types)| (module, json!(types)))
            .collect();
        json!({
            "release": self.jhove.release(),
            "moduleVersions": self.known_modules(),
            "moduleTypeMap": table,
        })
    }
}

impl RecordValidator for JhovePlugin {
    type State = ();

    fn check_request(&self, request: &BatchRequest) -> std::result::Result<(), String> {
        if self.payload_only && !request.batch {
            return Err("this plugin only supports batch-mode".to_string());
        }
        Ok(())
    }

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

    fn validate_record(&self, record: &Path, request: &BatchRequest, _state: &()) -> RecordResult {
        let mut result = RecordResult::new(record, DISPLAY_NAME);
        result
            .log
            .info(format!("Calling JHOVE on file '{}'.", record.display()));

        let module = match self.record_module(record, request, &mut result) {
            Ok(module) => module,
            Err(reason) => return Self::fail(result, reason),
        };
        result.module = Some(module.clone());
        if !self.known_modules().contains_key(&module) {
            return Self::fail(result, format!("Requested module '{module}' not available."));
        }

        debug!(record = %record.display(), module = %module, "calling JHOVE");
        let constraint = (module != AUTO_MODULE).then_some(module.as_str());
        match self.jhove.validate(record, constraint) {
            Ok(report) => {
                Self::evaluate(&mut result, report, &module);
                result
            }
            Err(err) => Self::fail(result, Self::describe_failure(err)),
        }
    }
}

impl ValidationPlugin for JhovePlugin {
    fn execute(&self, context: &mut ExecutionContext<'_>, args: &Args) -> ValidationResult {
        batch::run(self, context, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ModuleTypeMap {
        vec![
            ("JPEG-hul".to_string(), vec!["image/jpeg".to_string()]),
            ("TIFF-hul".to_string(), vec!["image/tiff".to_string(), "image/ief".to_string()]),
        ]
    }

    #[test]
    fn test_resolve_module_from_table() {
        assert_eq!(resolve_module(&table(), &["image/jpeg".to_string()]), "JPEG-hul");
        assert_eq!(
            resolve_module(&table(), &["text/plain".to_string(), "image/ief".to_string()]),
            "TIFF-hul"
        );
    }

    #[test]
    fn test_resolve_module_falls_back_to_auto() {
        assert_eq!(resolve_module(&table(), &["text/plain".to_string()]), AUTO_MODULE);
        assert_eq!(resolve_module(&table(), &[]), AUTO_MODULE);
    }

    #[test]
    fn test_default_map_contains_png() {
        let map = default_module_map();
        assert_eq!(map.len(), 10);
        assert_eq!(resolve_module(&map, &["image/png".to_string()]), "PNG-gdm");
    }
}
