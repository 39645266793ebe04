//! Runtime configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidatorError};
use crate::hashing::DEFAULT_BLOCK_SIZE;

/// Settings shared by the plugin registry and the job runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Job targets are resolved relative to this directory.
    pub fs_mount_point: PathBuf,
    pub jhove_cmd: String,
    pub fido_cmd: String,
    /// Directory with external command plugin descriptors.
    pub plugins_dir: Option<PathBuf>,
    /// Streaming block size for hashing, in bytes.
    pub hash_block_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fs_mount_point: PathBuf::from("."),
            jhove_cmd: "jhove".to_string(),
            fido_cmd: "fido".to_string(),
            plugins_dir: None,
            hash_block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl AppConfig {
    /// Create from environment variables
    ///
    /// Reads:
    /// - FS_MOUNT_POINT (optional, default: ".")
    /// - DEFAULT_JHOVE_CMD (optional, default: "jhove")
    /// - DEFAULT_FIDO_CMD (optional, default: "fido")
    /// - ADDITIONAL_VALIDATION_PLUGINS_DIR (optional)
    /// - HASH_BLOCK_SIZE (optional, default: 65536)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let hash_block_size = match lookup("HASH_BLOCK_SIZE") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(ValidatorError::Config(format!(
                        "HASH_BLOCK_SIZE must be a positive integer, got '{raw}'"
                    )))
                }
            },
            None => defaults.hash_block_size,
        };
        Ok(Self {
            fs_mount_point: lookup("FS_MOUNT_POINT")
                .map(PathBuf::from)
                .unwrap_or(defaults.fs_mount_point),
            jhove_cmd: lookup("DEFAULT_JHOVE_CMD").unwrap_or(defaults.jhove_cmd),
            fido_cmd: lookup("DEFAULT_FIDO_CMD").unwrap_or(defaults.fido_cmd),
            plugins_dir: lookup("ADDITIONAL_VALIDATION_PLUGINS_DIR")
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            hash_block_size,
        })
    }

    /// Resolve a job target against the mount point.
    pub fn resolve_target(&self, target: &Path) -> PathBuf {
        self.fs_mount_point.join(target)
    }
}
