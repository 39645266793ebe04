//! fido format identification adapter.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::tools::ExternalTool;

/// Label vocabulary printed by fido.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatVocabulary {
    /// PRONOM persistent identifiers, e.g. `fmt/43`.
    Puid,
    /// MIME types, e.g. `image/jpeg`.
    Mimetype,
}

impl FormatVocabulary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Puid => "puid",
            Self::Mimetype => "mimetype",
        }
    }
}

impl fmt::Display for FormatVocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct Fido {
    tool: Arc<dyn ExternalTool>,
}

impl Fido {
    pub fn new(tool: Arc<dyn ExternalTool>) -> Self {
        Self { tool }
    }

    pub fn program(&self) -> &str {
        self.tool.program()
    }

    /// Check that fido can be invoked (`fido -h`).
    pub fn probe(&self) -> Result<(), ToolError> {
        self.tool
            .run(&["-h".to_string()])?
            .check(self.tool.program())
            .map(|_| ())
    }

    /// Identify `file`, returning deduplicated labels in sorted order.
    ///
    /// An empty answer is reported as [`ToolError::EmptyResponse`] carrying
    /// fido's stderr.
    pub fn identify(
        &self,
        file: &Path,
        vocabulary: FormatVocabulary,
    ) -> Result<Vec<String>, ToolError> {
        let args = vec![
            "-q".to_string(),
            "-matchprintf".to_string(),
            format!("%(info.{vocabulary})s "),
            file.to_string_lossy().into_owned(),
        ];
        let output = self.tool.run(&args)?.check(self.tool.program())?;
        let labels: BTreeSet<String> = output
            .stdout
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if labels.is_empty() {
            return Err(ToolError::EmptyResponse {
                program: self.tool.program().to_string(),
                output: output.stderr,
            });
        }
        Ok(labels.into_iter().collect())
    }
}

impl fmt::Debug for Fido {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fido")
            .field("program", &self.tool.program())
            .finish()
    }
}
