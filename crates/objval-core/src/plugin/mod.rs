//! Plugin execution contract.
//!
//! Every check implements [`Plugin`] plus one of [`ValidationPlugin`] or
//! [`IdentificationPlugin`]. `execute`/`identify` never return `Err`: tool and
//! I/O failures are converted into failed results at this boundary.

pub mod context;
pub mod result;
pub mod signature;

use serde::Serialize;
use serde_json::{json, Value};

pub use context::{CancelToken, ExecutionContext};
pub use result::{IdentificationResult, RecordResult, ValidationResult};
pub use signature::{Argument, Args, JsonType, PluginSignature};

/// Kind of work a plugin performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginContext {
    Validation,
    Identification,
}

/// Shared capabilities of every plugin.
pub trait Plugin: Send + Sync {
    /// Registry identifier, e.g. `integrity-bagit`.
    fn name(&self) -> &str;

    /// Human-readable name, also used as log origin.
    fn display_name(&self) -> &str;

    fn description(&self) -> &str;

    fn context(&self) -> PluginContext;

    fn signature(&self) -> &PluginSignature;

    /// Cheap probe for external prerequisites.
    fn requirements_met(&self) -> Result<(), String> {
        Ok(())
    }

    /// Plugin-specific self-description details.
    fn info(&self) -> Value {
        json!({})
    }

    /// Full self-description.
    fn describe(&self) -> PluginDescription {
        let requirements = self.requirements_met();
        PluginDescription {
            name: self.name().to_string(),
            display_name: self.display_name().to_string(),
            description: self.description().to_string(),
            context: self.context(),
            signature: self.signature().clone(),
            info: self.info(),
            requirements_met: requirements.is_ok(),
            requirements_reason: requirements.err(),
        }
    }
}

/// A plugin that validates a target and produces a [`ValidationResult`].
pub trait ValidationPlugin: Plugin {
    fn execute(&self, context: &mut ExecutionContext<'_>, args: &Args) -> ValidationResult;
}

/// A plugin that identifies the format of a single file.
pub trait IdentificationPlugin: Plugin {
    fn identify(&self, context: &mut ExecutionContext<'_>, args: &Args) -> IdentificationResult;
}

/// Serializable plugin self-description.
#[derive(Debug, Clone, Serialize)]
pub struct PluginDescription {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub context: PluginContext,
    pub signature: PluginSignature,
    pub info: Value,
    pub requirements_met: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        signature: PluginSignature,
    }

    impl Plugin for Probe {
        fn name(&self) -> &str {
            "probe"
        }
        fn display_name(&self) -> &str {
            "Probe-Plugin"
        }
        fn description(&self) -> &str {
            "test plugin"
        }
        fn context(&self) -> PluginContext {
            PluginContext::Validation
        }
        fn signature(&self) -> &PluginSignature {
            &self.signature
        }
        fn requirements_met(&self) -> Result<(), String> {
            Err("probe binary missing".to_string())
        }
    }

    #[test]
    fn test_describe_reports_requirements() {
        let probe = Probe {
            signature: PluginSignature::new()
                .with("path", Argument::new(JsonType::String, "target").required()),
        };
        let value = serde_json::to_value(probe.describe()).expect("serialize");
        assert_eq!(value["name"], "probe");
        assert_eq!(value["context"], "validation");
        assert_eq!(value["requirements_met"], false);
        assert_eq!(value["requirements_reason"], "probe binary missing");
        assert_eq!(value["signature"]["path"]["required"], true);
    }
}
