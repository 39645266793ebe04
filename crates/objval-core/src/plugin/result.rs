//! Result types returned by plugins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::hashing::HashAlgorithm;
use crate::log::Log;

/// Outcome for one record (file).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordResult {
    pub path: PathBuf,
    /// Whether the check ran without internal failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Whether the content satisfied the check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<HashAlgorithm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    pub log: Log,
}

impl RecordResult {
    pub fn new(path: &Path, origin: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            success: None,
            valid: None,
            method: None,
            module: None,
            raw: None,
            log: Log::new(origin),
        }
    }

    /// Mark the record as failed with `reason` logged as an error.
    pub fn fail(mut self, reason: impl Into<String>) -> Self {
        self.log.error(reason);
        self.success = Some(false);
        self
    }
}

/// Aggregate over the records of one validation-plugin invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    /// Records keyed by discovery index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<BTreeMap<usize, RecordResult>>,
    pub log: Log,
}

impl ValidationResult {
    pub fn new(log: Log) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Failed result that never reached record processing.
    pub fn rejected(mut log: Log, reason: impl Into<String>) -> Self {
        log.error(reason);
        Self {
            success: Some(false),
            log,
            ..Self::default()
        }
    }

    /// Recompute `success` and `valid` from the records.
    ///
    /// Both are the conjunction over all records; with no records the
    /// result is vacuously successful and valid.
    pub fn eval(&mut self) {
        let records = self.records.get_or_insert_with(BTreeMap::new);
        self.success = Some(records.values().all(|r| r.success == Some(true)));
        self.valid = Some(records.values().all(|r| r.valid == Some(true)));
    }

    pub fn record_count(&self) -> usize {
        self.records.as_ref().map_or(0, BTreeMap::len)
    }

    pub fn record(&self, index: usize) -> Option<&RecordResult> {
        self.records.as_ref().and_then(|records| records.get(&index))
    }
}

/// Result of a format-identification invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IdentificationResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Candidate format labels, deduplicated and sorted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<String>>,
    pub log: Log,
}
