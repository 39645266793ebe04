//! Tiered diagnostic log attached to results and reports.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity tier of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
        })
    }
}

/// One log message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub datetime: DateTime<Utc>,
    pub origin: String,
    pub body: String,
}

/// Append-only log grouped by [`LogLevel`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Log {
    tiers: BTreeMap<LogLevel, Vec<LogMessage>>,
    #[serde(skip)]
    default_origin: String,
}

impl Log {
    /// Empty log whose messages are attributed to `origin`.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            tiers: BTreeMap::new(),
            default_origin: origin.into(),
        }
    }

    pub fn default_origin(&self) -> &str {
        &self.default_origin
    }

    /// Append a message under the default origin.
    pub fn log(&mut self, level: LogLevel, body: impl Into<String>) {
        let origin = self.default_origin.clone();
        self.log_from(level, origin, body);
    }

    /// Append a message with an explicit origin.
    pub fn log_from(
        &mut self,
        level: LogLevel,
        origin: impl Into<String>,
        body: impl Into<String>,
    ) {
        self.tiers.entry(level).or_default().push(LogMessage {
            datetime: Utc::now(),
            origin: origin.into(),
            body: body.into(),
        });
    }

    pub fn info(&mut self, body: impl Into<String>) {
        self.log(LogLevel::Info, body);
    }

    pub fn warning(&mut self, body: impl Into<String>) {
        self.log(LogLevel::Warning, body);
    }

    pub fn error(&mut self, body: impl Into<String>) {
        self.log(LogLevel::Error, body);
    }

    /// Copy of a single tier.
    pub fn pick(&self, level: LogLevel) -> Log {
        let mut picked = Log::new(self.default_origin.clone());
        if let Some(messages) = self.tiers.get(&level) {
            picked.tiers.insert(level, messages.clone());
        }
        picked
    }

    /// Append all messages of `other`, keeping their origins.
    pub fn merge(&mut self, other: Log) {
        for (level, messages) in other.tiers {
            self.tiers.entry(level).or_default().extend(messages);
        }
    }

    pub fn contains(&self, level: LogLevel) -> bool {
        self.count(level) > 0
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.tiers.get(&level).map_or(0, Vec::len)
    }

    pub fn messages(&self, level: LogLevel) -> &[LogMessage] {
        self.tiers.get(&level).map_or(&[], Vec::as_slice)
    }

    /// Last message body of a tier.
    pub fn last(&self, level: LogLevel) -> Option<&str> {
        self.messages(level).last().map(|m| m.body.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.values().all(Vec::is_empty)
    }
}

impl fmt::Display for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (level, messages) in &self.tiers {
            for message in messages {
                writeln!(f, "[{level}] {}: {}", message.origin, message.body)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_tiers() {
        let mut log = Log::new("Integrity-Plugin");
        log.info("collected 2 record(s)");
        log.error("bad checksum");
        log.error("missing file");

        assert!(log.contains(LogLevel::Error));
        assert!(!log.contains(LogLevel::Warning));
        assert_eq!(log.count(LogLevel::Error), 2);
        assert_eq!(log.last(LogLevel::Error), Some("missing file"));
        assert_eq!(log.messages(LogLevel::Info)[0].origin, "Integrity-Plugin");
    }

    #[test]
    fn test_pick_and_merge_keep_origin() {
        let mut record = Log::new("JHOVE-Plugin");
        record.info("calling JHOVE");
        record.error("not well-formed");

        let mut parent = Log::new("Job");
        parent.merge(record.pick(LogLevel::Error));

        assert_eq!(parent.count(LogLevel::Error), 1);
        assert_eq!(parent.count(LogLevel::Info), 0);
        assert_eq!(parent.messages(LogLevel::Error)[0].origin, "JHOVE-Plugin");
    }

    #[test]
    fn test_serializes_as_tier_map() {
        let mut log = Log::new("x");
        log.warning("careful");
        let value = serde_json::to_value(&log).expect("serialize");
        assert_eq!(value["WARNING"][0]["body"], "careful");
        assert!(value.get("ERROR").is_none());
    }

    #[test]
    fn test_display_lists_messages() {
        let mut log = Log::new("Integrity-Plugin");
        log.error("Cannot locate valid manifest among methods 'sha512'");
        assert!(log.to_string().contains(" manifest "));
    }
}
