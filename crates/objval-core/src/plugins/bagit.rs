//! Integrity validation for BagIt packages (RFC 8493).
//!
//! Expected digests come from the bag's own `manifest-<alg>.txt` and
//! `tagmanifest-<alg>.txt` files. The two files may use different
//! algorithms; each record's method is resolved independently.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::batch::{self, BatchRequest, RecordValidator};
use crate::error::Result;
use crate::hashing::{HashAlgorithm, DEFAULT_BLOCK_SIZE};
use crate::manifest::Manifest;
use crate::plugin::{
    Args, ExecutionContext, Plugin, PluginContext, PluginSignature, RecordResult,
    ValidationPlugin, ValidationResult,
};
use crate::plugins::integrity::{
    check_record, integrity_info, method_argument, outside_root, requested_method, DISPLAY_NAME,
};

const MANIFEST_KINDS: [&str; 2] = ["manifest", "tagmanifest"];

/// Locate the manifest file of `kind` for the first available algorithm.
pub fn locate_manifest(bag: &Path, kind: &str, methods: &[HashAlgorithm]) -> Option<PathBuf> {
    methods
        .iter()
        .map(|method| bag.join(format!("{kind}-{method}.txt")))
        .find(|file| file.is_file())
}

/// Read manifest and tag-manifest of `bag` into one manifest.
///
/// Fails when either file class is missing for all `methods` or when any
/// line is malformed, before a single payload file is hashed.
pub fn read_bag_manifest(
    bag: &Path,
    methods: &[HashAlgorithm],
) -> std::result::Result<Manifest, String> {
    let mut manifest = Manifest::new();
    for kind in MANIFEST_KINDS {
        let Some(file) = locate_manifest(bag, kind, methods) else {
            let names = methods
                .iter()
                .map(|m| format!("'{m}'"))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(format!("Cannot locate valid {kind} among methods {names}"));
        };
        debug!(manifest = %file.display(), "reading bag manifest");
        let parsed = Manifest::parse_bagit(&file).map_err(|err| err.to_string())?;
        manifest.extend(parsed);
    }
    Ok(manifest)
}

#[derive(Debug)]
pub struct BagItIntegrityPlugin {
    signature: PluginSignature,
    block_size: usize,
}

impl BagItIntegrityPlugin {
    pub const NAME: &'static str = "integrity-bagit";

    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            signature: batch::base_signature().with("method", method_argument()),
            block_size,
        }
    }
}

impl Default for BagItIntegrityPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for BagItIntegrityPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn display_name(&self) -> &str {
        DISPLAY_NAME
    }

    fn description(&self) -> &str {
        "File integrity validation for files in BagIt-format."
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

impl RecordValidator for BagItIntegrityPlugin {
    type State = Manifest;

    fn check_request(&self, request: &BatchRequest) -> std::result::Result<(), String> {
        if !request.batch {
            return Err("this plugin only supports batch-mode".to_string());
        }
        Ok(())
    }

    fn prepare(
        &self,
        request: &BatchRequest,
        context: &mut ExecutionContext<'_>,
    ) -> std::result::Result<Manifest, String> {
        context.set_progress(format!(
            "generating manifest information from '{}'",
            request.path.display()
        ));
        context.push();
        let methods = match requested_method(request) {
            Some(method) => vec![method],
            None => HashAlgorithm::STRONGEST_FIRST.to_vec(),
        };
        read_bag_manifest(&request.path, &methods)
    }

    fn collect_records(&self, request: &BatchRequest, manifest: &Manifest) -> Result<Vec<PathBuf>> {
        Ok(manifest.records(&request.path))
    }

    fn validate_record(
        &self,
        record: &Path,
        request: &BatchRequest,
        manifest: &Manifest,
    ) -> RecordResult {
        if let Some(outside) = outside_root(DISPLAY_NAME, &request.path, record) {
            return outside;
        }
        check_record(
            DISPLAY_NAME,
            record,
            manifest.lookup(&request.path, record),
            requested_method(request),
            self.block_size,
        )
    }
}

impl ValidationPlugin for BagItIntegrityPlugin {
    fn execute(&self, context: &mut ExecutionContext<'_>, args: &Args) -> ValidationResult {
        batch::run(self, context, args)
    }
}
