//! Path-to-digest manifests.
//!
//! A manifest is either supplied by the caller as a JSON object or parsed
//! from BagIt `manifest-<alg>.txt`/`tagmanifest-<alg>.txt` files. Entry order
//! is preserved and becomes the record order.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;

use crate::error::ManifestError;

/// Ordered mapping from relative file path to expected digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<(String, String)>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a caller-supplied JSON object whose values are digests.
    pub fn from_json(value: &Value) -> Result<Self, ManifestError> {
        let Some(object) = value.as_object() else {
            return Err(ManifestError::BadEntry {
                entry: value.to_string(),
            });
        };
        let mut manifest = Self::new();
        for (path, digest) in object {
            let digest = digest.as_str().ok_or_else(|| ManifestError::BadEntry {
                entry: path.clone(),
            })?;
            manifest.insert(path.clone(), digest.to_string());
        }
        Ok(manifest)
    }

    /// Parse a BagIt manifest file.
    ///
    /// Every non-blank line must read `<digest><whitespace><path>`. Encoded
    /// line breaks and percent signs in paths are decoded.
    pub fn parse_bagit(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|err| ManifestError::Unreadable {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        let mut manifest = Self::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let malformed = || ManifestError::MalformedLine {
                path: path.to_path_buf(),
                line: number + 1,
                content: line.to_string(),
            };
            let trimmed = line.trim_start();
            let split = trimmed.find(char::is_whitespace).ok_or_else(malformed)?;
            let (digest, rest) = trimmed.split_at(split);
            let file = rest.trim_start();
            if file.is_empty() {
                return Err(malformed());
            }
            manifest.insert(decode_bagit_path(file), digest.to_string());
        }
        Ok(manifest)
    }

    /// Insert or replace an entry; a replaced entry keeps its position.
    pub fn insert(&mut self, path: String, digest: String) {
        match self.entries.iter_mut().find(|(p, _)| *p == path) {
            Some(entry) => entry.1 = digest,
            None => self.entries.push((path, digest)),
        }
    }

    pub fn extend(&mut self, other: Manifest) {
        for (path, digest) in other.entries {
            self.insert(path, digest);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, d)| (p.as_str(), d.as_str()))
    }

    /// Record paths: each entry resolved against `root`, in manifest order.
    pub fn records(&self, root: &Path) -> Vec<PathBuf> {
        self.entries.iter().map(|(p, _)| root.join(p)).collect()
    }

    /// Expected digest for `record`, matching by normalized path rather than
    /// by string.
    pub fn lookup(&self, root: &Path, record: &Path) -> Option<&str> {
        let target = normalize(record);
        self.entries
            .iter()
            .find(|(p, _)| normalize(&root.join(p)) == target)
            .map(|(_, d)| d.as_str())
    }
}

/// Whether `record` stays under `root` after lexical normalization.
pub fn is_within(root: &Path, record: &Path) -> bool {
    let root = normalize(root);
    let record = normalize(record);
    // normalized paths keep `..` only as leading components
    let parents = |path: &Path| {
        path.components()
            .take_while(|c| *c == Component::ParentDir)
            .count()
    };
    record.starts_with(&root) && parents(&record) == parents(&root)
}

/// Lexically normalize a path: drop `.` components and resolve `..`
/// against preceding components. Does not touch the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn decode_bagit_path(path: &str) -> String {
    path.replace("%0A", "\n")
        .replace("%0D", "\r")
        .replace("%25", "%")
}
