//! Format identification plugins backed by fido.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::error::ToolError;
use crate::plugin::{
    Argument, Args, ExecutionContext, IdentificationPlugin, IdentificationResult, JsonType,
    Plugin, PluginContext, PluginSignature,
};
use crate::tools::{ExternalTool, Fido, FormatVocabulary};

/// fido-based identification for one label vocabulary.
#[derive(Debug)]
pub struct FidoPlugin {
    fido: Fido,
    vocabulary: FormatVocabulary,
    signature: PluginSignature,
}

impl FidoPlugin {
    pub const PUID: &'static str = "fido-puid";
    pub const MIMETYPE: &'static str = "fido-mimetype";

    pub fn new(tool: Arc<dyn ExternalTool>, vocabulary: FormatVocabulary) -> Self {
        Self {
            fido: Fido::new(tool),
            vocabulary,
            signature: PluginSignature::new().with(
                "path",
                Argument::new(
                    JsonType::String,
                    "target file for format identification; if omitted, filled automatically by parent format-validation plugin",
                )
                .with_example(json!("relative/path/to/file.jpg")),
            ),
        }
    }

    pub fn puid(tool: Arc<dyn ExternalTool>) -> Self {
        Self::new(tool, FormatVocabulary::Puid)
    }

    pub fn mimetype(tool: Arc<dyn ExternalTool>) -> Self {
        Self::new(tool, FormatVocabulary::Mimetype)
    }

    pub fn vocabulary(&self) -> FormatVocabulary {
        self.vocabulary
    }

    /// Identify one file without going through argument validation.
    pub fn identify_path(
        &self,
        context: &mut ExecutionContext<'_>,
        path: &Path,
    ) -> IdentificationResult {
        context
            .log
            .info(format!("Calling fido on file '{}'.", path.display()));
        context.set_progress(format!("calling fido on file '{}'", path.display()));
        context.push();

        match self.fido.identify(path, self.vocabulary) {
            Ok(formats) => {
                let shown = formats
                    .iter()
                    .map(|f| format!("'{f}'"))
                    .collect::<Vec<_>>()
                    .join(" | ");
                debug!(file = %path.display(), formats = %shown, "identified");
                context
                    .log
                    .info(format!("Identified file '{}' as {shown}.", path.display()));
                context.set_progress("success");
                context.push();
                IdentificationResult {
                    success: Some(true),
                    formats: Some(formats),
                    log: context.take_log(),
                }
            }
            Err(err) => {
                let reason = match err {
                    ToolError::Failed { stderr, .. } => stderr,
                    ToolError::EmptyResponse { output, .. } => {
                        format!("{output} (does the file exist?)")
                    }
                    other => other.to_string(),
                };
                context.log.error(format!("Call to fido failed: {reason}"));
                context.set_progress(format!("failure: {reason}"));
                context.push();
                IdentificationResult {
                    success: Some(false),
                    formats: None,
                    log: context.take_log(),
                }
            }
        }
    }
}

impl Plugin for FidoPlugin {
    fn name(&self) -> &str {
        match self.vocabulary {
            FormatVocabulary::Puid => Self::PUID,
            FormatVocabulary::Mimetype => Self::MIMETYPE,
        }
    }

    fn display_name(&self) -> &str {
        match self.vocabulary {
            FormatVocabulary::Puid => "fido/PUID-Plugin",
            FormatVocabulary::Mimetype => "fido/MIME-Plugin",
        }
    }

    fn description(&self) -> &str {
        match self.vocabulary {
            FormatVocabulary::Puid => "File format identification based on fido's puid output.",
            FormatVocabulary::Mimetype => {
                "File format identification based on fido's MIME-type output."
            }
        }
    }

    fn context(&self) -> PluginContext {
        PluginContext::Identification
    }

    fn signature(&self) -> &PluginSignature {
        &self.signature
    }

    fn requirements_met(&self) -> Result<(), String> {
        self.fido.probe().map_err(|err| match err {
            ToolError::Spawn { reason, .. } => format!("Unable to load fido: {reason}"),
            ToolError::Failed { stderr, .. } => format!("fido returned with an error: {stderr}"),
            other => other.to_string(),
        })
    }

    fn info(&self) -> Value {
        json!({
            "vocabulary": self.vocabulary,
            "program": self.fido.program(),
        })
    }
}

impl IdentificationPlugin for FidoPlugin {
    fn identify(&self, context: &mut ExecutionContext<'_>, args: &Args) -> IdentificationResult {
        let hydrated = match self.signature.validate(args) {
            Ok(hydrated) => hydrated,
            Err(err) => {
                context.log.error(format!("Invalid request: {err}"));
                return IdentificationResult {
                    success: Some(false),
                    formats: None,
                    log: context.take_log(),
                };
            }
        };
        let Some(path) = hydrated.get("path").and_then(Value::as_str) else {
            context
                .log
                .error("Invalid request: missing value for 'path'");
            return IdentificationResult {
                success: Some(false),
                formats: None,
                log: context.take_log(),
            };
        };
        self.identify_path(context, Path::new(path))
    }
}
