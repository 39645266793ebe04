//! objval core library
//!
//! Validation plugins for digital-preservation objects (checksums, BagIt
//! manifests, file formats via fido and JHOVE), module selection and the
//! job runner that folds everything into one verdict.

pub mod batch;
pub mod config;
pub mod error;
pub mod hashing;
pub mod job;
pub mod log;
pub mod manifest;
pub mod obs;
pub mod plugin;
pub mod plugins;
pub mod registry;
pub mod selection;
pub mod telemetry;
pub mod tools;

pub use batch::{BatchRequest, RecordValidator};
pub use config::AppConfig;
pub use error::{
    ManifestError, RegistryError, Result, SignatureError, ToolError, ValidatorError,
};
pub use hashing::{HashAlgorithm, DEFAULT_BLOCK_SIZE};
pub use job::{JobOptions, Report, ReportData, ValidationJob, Verdict};
pub use log::{Log, LogLevel, LogMessage};
pub use manifest::Manifest;
pub use plugin::{
    Argument, Args, CancelToken, ExecutionContext, IdentificationPlugin, IdentificationResult,
    JsonType, Plugin, PluginContext, PluginDescription, PluginSignature, RecordResult,
    ValidationPlugin, ValidationResult,
};
pub use registry::{PluginConfig, PluginRegistry};
pub use selection::{
    ModuleCatalog, ModuleSelectionPlan, Rejection, SelectedModule, ValidationContext,
};
pub use telemetry::init_tracing;
pub use tools::{ExternalTool, SystemTool, ToolOutput};
