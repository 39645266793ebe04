//! Record-batch engine.
//!
//! Turns one validation request into a sequence of per-file checks and folds
//! the per-record outcomes into a single [`ValidationResult`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::log::LogLevel;
use crate::plugin::{
    Argument, Args, ExecutionContext, JsonType, Plugin, PluginSignature, RecordResult,
    ValidationResult,
};

/// A request that passed signature validation.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub path: PathBuf,
    pub batch: bool,
    /// Arguments completed with signature defaults.
    pub args: Args,
}

impl BatchRequest {
    pub fn str_arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }
}

/// Signature shared by every record-batch plugin: `path` and `batch`.
pub fn base_signature() -> PluginSignature {
    PluginSignature::new()
        .with(
            "path",
            Argument::new(
                JsonType::String,
                "target for validation; if omitted, filled automatically by job based on job-target",
            )
            .with_example(json!("relative/path/to/file.jpg")),
        )
        .with(
            "batch",
            Argument::new(
                JsonType::Boolean,
                "if true, 'path' is interpreted as directory and its contents are validated in batch (recursively); otherwise 'path' is expected to reference a file",
            )
            .with_default(json!(true))
            .with_example(json!(false)),
        )
}

/// Per-record validation logic driven by [`run`].
pub trait RecordValidator: Plugin {
    /// Data derived from the request once, before any record is processed.
    type State;

    /// Plugin-specific request checks, run before the path-kind check.
    fn check_request(&self, _request: &BatchRequest) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Build the shared state. An `Err` aborts the invocation with zero records.
    fn prepare(
        &self,
        request: &BatchRequest,
        context: &mut ExecutionContext<'_>,
    ) -> std::result::Result<Self::State, String>;

    /// Records for batch mode; every file below `path` by default.
    fn collect_records(
        &self,
        request: &BatchRequest,
        _state: &Self::State,
    ) -> Result<Vec<PathBuf>> {
        list_files(&request.path)
    }

    fn validate_record(
        &self,
        record: &Path,
        request: &BatchRequest,
        state: &Self::State,
    ) -> RecordResult;
}

/// Every regular file below `root`, in a stable (file-name sorted) order.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn reject(context: &mut ExecutionContext<'_>, reason: impl std::fmt::Display) -> ValidationResult {
    let result =
        ValidationResult::rejected(context.take_log(), format!("Invalid request: {reason}"));
    context.set_progress("failure");
    context.push();
    result
}

fn abort(context: &mut ExecutionContext<'_>, reason: String) -> ValidationResult {
    let result = ValidationResult::rejected(context.take_log(), reason);
    context.set_progress("failure");
    context.push();
    result
}

/// Execute `validator` for one request.
pub fn run<V: RecordValidator + ?Sized>(
    validator: &V,
    context: &mut ExecutionContext<'_>,
    args: &Args,
) -> ValidationResult {
    let shown = args.get("path").and_then(Value::as_str).unwrap_or("?");
    context.set_progress(format!("validating request '{shown}'"));
    context.push();

    let hydrated = match validator.signature().validate(args) {
        Ok(hydrated) => hydrated,
        Err(err) => return reject(context, err),
    };
    let Some(path) = hydrated.get("path").and_then(Value::as_str).map(PathBuf::from) else {
        return reject(context, "missing value for 'path'");
    };
    let batch = hydrated.get("batch").and_then(Value::as_bool).unwrap_or(true);
    let request = BatchRequest {
        path,
        batch,
        args: hydrated,
    };

    if let Err(reason) = validator.check_request(&request) {
        return reject(context, reason);
    }
    if !request.batch && !request.path.is_file() {
        return reject(context, "non-batch-mode requires 'path' to be a file");
    }
    if request.batch && !request.path.is_dir() {
        return reject(context, "batch-mode requires 'path' to be a directory");
    }

    let state = match validator.prepare(&request, context) {
        Ok(state) => state,
        Err(reason) => return abort(context, reason),
    };

    context.set_progress("collecting targets");
    context.push();
    let records = if request.batch {
        match validator.collect_records(&request, &state) {
            Ok(records) => records,
            Err(err) => return abort(context, format!("Cannot collect records: {err}")),
        }
    } else {
        vec![request.path.clone()]
    };
    context
        .log
        .info(format!("Collected {} record(s).", records.len()));

    let mut processed = BTreeMap::new();
    let mut cancelled = false;
    for (index, record) in records.iter().enumerate() {
        if context.is_cancelled() {
            warn!(plugin = validator.name(), record = %record.display(), "validation cancelled");
            context.log.error(format!(
                "Validation cancelled before record '{}'.",
                record.display()
            ));
            cancelled = true;
            break;
        }
        context.set_progress(format!("processing '{}'", record.display()));
        context.push();
        let outcome = validator.validate_record(record, &request, &state);
        debug!(
            plugin = validator.name(),
            record = %record.display(),
            success = ?outcome.success,
            valid = ?outcome.valid,
            "record processed"
        );
        context.log.merge(outcome.log.pick(LogLevel::Error));
        processed.insert(index, outcome);
        context.push();
    }

    let mut result = ValidationResult::new(context.take_log());
    result.records = Some(processed);
    result.eval();
    if cancelled {
        result.success = Some(false);
    }
    context.set_progress(if result.success == Some(true) {
        "success"
    } else {
        "failure"
    });
    context.push();
    result
}
