//! Error taxonomy for the validation pipeline.
//!
//! None of these cross a plugin's `execute` boundary: plugins convert them
//! into failed results with an ERROR log entry.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while checking arguments against a plugin signature.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("unknown argument '{name}'")]
    UnknownArgument { name: String },

    #[error("missing required argument '{name}'")]
    MissingArgument { name: String },

    #[error("argument '{name}' has bad type (expected {expected}, found {found})")]
    BadType {
        name: String,
        expected: String,
        found: String,
    },

    #[error("argument '{name}' has unsupported value {value} (allowed: {allowed})")]
    NotAllowed {
        name: String,
        value: String,
        allowed: String,
    },
}

/// Errors raised by an external tool adapter (fido, JHOVE, command plugins).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("unable to run '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} returned with error: {stderr}")]
    Failed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("unable to read {program}'s response: {output}")]
    Unreadable { program: String, output: String },

    #[error("{program}'s response is empty: {output}")]
    EmptyResponse { program: String, output: String },
}

/// Errors raised while parsing a manifest file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("cannot read manifest file '{path}': {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("malformed line {line} in manifest file '{path}': '{content}'")]
    MalformedLine {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("manifest entry for '{entry}' is not a string")]
    BadEntry { entry: String },
}

/// Errors raised while registering plugins or catalog modules.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid identifier '{0}' (expected [a-z0-9][a-z0-9_-]*)")]
    InvalidIdentifier(String),

    #[error("duplicate registration for '{0}'")]
    Duplicate(String),

    #[error("bad plugin descriptor '{path}': {reason}")]
    BadDescriptor { path: PathBuf, reason: String },
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid arguments: {0}")]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("unsupported hash algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

impl ValidatorError {
    /// Short class name, used when reporting constructor failures.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::Config(_) => "ConfigError",
            Self::Signature(_) => "SignatureError",
            Self::Tool(_) => "ToolError",
            Self::Manifest(_) => "ManifestError",
            Self::Registry(_) => "RegistryError",
            Self::UnsupportedAlgorithm(_) => "UnsupportedAlgorithm",
            Self::Io(_) => "IoError",
            Self::Serialization(_) => "SerializationError",
            Self::Walk(_) => "WalkError",
        }
    }
}

/// Result type for validator operations.
pub type Result<T> = std::result::Result<T, ValidatorError>;
