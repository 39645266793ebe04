//! Checksum-based file integrity validation.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::batch::{self, BatchRequest, RecordValidator};
use crate::error::Result;
use crate::hashing::{HashAlgorithm, DEFAULT_BLOCK_SIZE};
use crate::manifest::{is_within, Manifest};
use crate::plugin::{
    Argument, Args, ExecutionContext, JsonType, Plugin, PluginContext, PluginSignature,
    RecordResult, ValidationPlugin, ValidationResult,
};

pub const DISPLAY_NAME: &str = "Integrity-Plugin";

/// `method` argument shared by both integrity plugins.
pub(crate) fn method_argument() -> Argument {
    Argument::new(
        JsonType::String,
        "identifier for a checksum-algorithm; one of 'md5', 'sha1', 'sha256', 'sha512'; if left empty, use heuristics to determine algorithm",
    )
    .with_example(json!("md5"))
    .with_allowed(
        HashAlgorithm::ALL
            .iter()
            .map(|alg| json!(alg.as_str()))
            .collect(),
    )
}

pub(crate) fn requested_method(request: &BatchRequest) -> Option<HashAlgorithm> {
    request.str_arg("method").and_then(|m| m.parse().ok())
}

pub(crate) fn integrity_info() -> Value {
    json!({
        "algorithms": HashAlgorithm::ALL.iter().map(|alg| alg.as_str()).collect::<Vec<_>>(),
    })
}

/// Failed record for a manifest entry that resolves outside `root`.
pub(crate) fn outside_root(origin: &str, root: &Path, record: &Path) -> Option<RecordResult> {
    (!is_within(root, record)).then(|| {
        RecordResult::new(record, origin).fail(format!(
            "File '{}' lies outside of '{}'.",
            record.display(),
            root.display()
        ))
    })
}

/// Compare the digest of `record` against `expected`.
///
/// The algorithm is `method` when given, otherwise inferred from the length
/// of `expected`. Hex digests compare case-insensitively.
pub(crate) fn check_record(
    origin: &str,
    record: &Path,
    expected: Option<&str>,
    method: Option<HashAlgorithm>,
    block_size: usize,
) -> RecordResult {
    let result = RecordResult::new(record, origin);
    if !record.exists() {
        return result.fail(format!("File '{}' does not exist.", record.display()));
    }
    let Some(expected) = expected else {
        return result.fail(format!(
            "Cannot find hash for '{}' in manifest.",
            record.display()
        ));
    };
    let Some(method) = method.or_else(|| HashAlgorithm::infer(expected)) else {
        return result.fail(format!(
            "Heuristic detection of hashing algorithm failed (file '{}', checksum '{expected}').",
            record.display()
        ));
    };

    let mut result = result;
    result.method = Some(method);
    let actual = match method.hash_file_with_block(record, block_size) {
        Ok(actual) => actual,
        Err(err) => {
            return result.fail(format!(
                "Cannot compute {method}-hash for file '{}': {err}",
                record.display()
            ))
        }
    };

    let valid = actual.eq_ignore_ascii_case(expected);
    if valid {
        result
            .log
            .info(format!("Checksum of file '{}' is good.", record.display()));
    } else {
        result.log.error(format!(
            "Bad {method}-hash '{actual}' for file '{}' (expected '{expected}').",
            record.display()
        ));
    }
    result.success = Some(true);
    result.valid = Some(valid);
    result
}

/// Expected digests for one request.
#[derive(Debug)]
pub enum Expected {
    Value(String),
    Manifest(Manifest),
}

/// File integrity validation from an explicit checksum or a caller manifest.
#[derive(Debug)]
pub struct IntegrityPlugin {
    signature: PluginSignature,
    block_size: usize,
}

impl IntegrityPlugin {
    pub const NAME: &'static str = "integrity";

    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(block_size: usize) -> Self {
        let signature = batch::base_signature()
            .with("method", method_argument())
            .with(
                "value",
                Argument::new(
                    JsonType::String,
                    "expected checksum value (only applicable if 'batch' is false)",
                )
                .with_example(json!("46a78da2a246a86f76d066db766cda4f")),
            )
            .with(
                "manifest",
                Argument::new(
                    JsonType::Object,
                    "expected checksums by filepath (only applicable if 'batch' is true); file paths are required to be given relative to 'path'; only files listed here are accounted for",
                ),
            );
        Self {
            signature,
            block_size,
        }
    }
}

impl Default for IntegrityPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for IntegrityPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn display_name(&self) -> &str {
        DISPLAY_NAME
    }

    fn description(&self) -> &str {
        "File integrity validation."
    }

    fn context(&self) -> PluginContext {
        PluginContext::Validation
    }

    fn signature(&self) -> &PluginSignature {
        &self.signature
    }

    fn info(&self) -> Value {
        integrity_info()
    }
}

impl RecordValidator for IntegrityPlugin {
    type State = Expected;

    fn check_request(&self, request: &BatchRequest) -> std::result::Result<(), String> {
        if !request.batch && !request.args.contains_key("value") {
            return Err("missing required 'value' (checksum)".to_string());
        }
        if request.batch && !request.args.contains_key("manifest") {
            return Err("missing required 'manifest' (checksums)".to_string());
        }
        Ok(())
    }

    fn prepare(
        &self,
        request: &BatchRequest,
        _context: &mut ExecutionContext<'_>,
    ) -> std::result::Result<Expected, String> {
        if !request.batch {
            let value = request.str_arg("value").unwrap_or_default();
            return Ok(Expected::Value(value.to_string()));
        }
        let manifest = request.args.get("manifest").unwrap_or(&Value::Null);
        Manifest::from_json(manifest)
            .map(Expected::Manifest)
            .map_err(|err| format!("Invalid request: {err}"))
    }

    fn collect_records(&self, request: &BatchRequest, state: &Expected) -> Result<Vec<PathBuf>> {
        Ok(match state {
            Expected::Manifest(manifest) => manifest.records(&request.path),
            Expected::Value(_) => vec![request.path.clone()],
        })
    }

    fn validate_record(
        &self,
        record: &Path,
        request: &BatchRequest,
        state: &Expected,
    ) -> RecordResult {
        let expected = match state {
            Expected::Value(value) => Some(value.as_str()),
            Expected::Manifest(manifest) => {
                if let Some(outside) = outside_root(DISPLAY_NAME, &request.path, record) {
                    return outside;
                }
                manifest.lookup(&request.path, record)
            }
        };
        check_record(
            DISPLAY_NAME,
            record,
            expected,
            requested_method(request),
            self.block_size,
        )
    }
}

impl ValidationPlugin for IntegrityPlugin {
    fn execute(&self, context: &mut ExecutionContext<'_>, args: &Args) -> ValidationResult {
        batch::run(self, context, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogLevel;

    const ABC_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";

    #[test]
    fn test_check_record_good_and_bad() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("abc.txt");
        std::fs::write(&file, "abc").expect("write");

        let good = check_record(DISPLAY_NAME, &file, Some(ABC_MD5), None, 4);
        assert_eq!(good.success, Some(true));
        assert_eq!(good.valid, Some(true));
        assert_eq!(good.method, Some(HashAlgorithm::Md5));

        let upper = check_record(DISPLAY_NAME, &file, Some(&ABC_MD5.to_uppercase()), None, 4);
        assert_eq!(upper.valid, Some(true));

        let bad = check_record(DISPLAY_NAME, &file, Some(&"0".repeat(40)), None, 4);
        assert_eq!(bad.success, Some(true));
        assert_eq!(bad.valid, Some(false));
        assert_eq!(bad.method, Some(HashAlgorithm::Sha1));
        assert!(bad.log.last(LogLevel::Error).expect("error").starts_with("Bad sha1-hash"));
    }

    #[test]
    fn test_check_record_inference_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("abc.txt");
        std::fs::write(&file, "abc").expect("write");

        let result = check_record(DISPLAY_NAME, &file, Some("abc123"), None, 4);
        assert_eq!(result.success, Some(false));
        assert_eq!(result.valid, None);
        assert_eq!(result.method, None);
        assert!(result
            .log
            .last(LogLevel::Error)
            .expect("error")
            .starts_with("Heuristic detection of hashing algorithm failed"));
    }

    #[test]
    fn test_explicit_method_overrides_inference() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("abc.txt");
        std::fs::write(&file, "abc").expect("write");

        let result = check_record(
            DISPLAY_NAME,
            &file,
            Some(ABC_MD5),
            Some(HashAlgorithm::Sha256),
            4,
        );
        assert_eq!(result.method, Some(HashAlgorithm::Sha256));
        assert_eq!(result.valid, Some(false));
    }

    #[test]
    fn test_missing_value_is_precondition_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("abc.txt");
        std::fs::write(&file, "abc").expect("write");

        let args = json!({"path": file.to_str().expect("utf-8"), "batch": false});
        let mut context = ExecutionContext::detached(DISPLAY_NAME);
        let args = args.as_object().expect("object");
        let result = IntegrityPlugin::new().execute(&mut context, args);
        assert_eq!(result.success, Some(false));
        assert_eq!(result.record_count(), 0);
        assert_eq!(
            result.log.last(LogLevel::Error),
            Some("Invalid request: missing required 'value' (checksum)")
        );
    }

    #[test]
    fn test_unsupported_method_rejected_by_signature() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = json!({
            "path": dir.path().to_str().expect("utf-8"),
            "manifest": {},
            "method": "crc32",
        });
        let mut context = ExecutionContext::detached(DISPLAY_NAME);
        let args = args.as_object().expect("object");
        let result = IntegrityPlugin::new().execute(&mut context, args);
        assert_eq!(result.success, Some(false));
        assert!(result.records.is_none());
    }

    #[test]
    fn test_info_lists_algorithms() {
        let info = IntegrityPlugin::new().info();
        assert_eq!(info["algorithms"], json!(["md5", "sha1", "sha256", "sha512"]));
    }
}
