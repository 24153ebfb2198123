//! Syslog-style severity levels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RelayError;

/// Log severity. Higher severity values are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    pub const ALL: [LogLevel; 8] = [
        LogLevel::Emergency,
        LogLevel::Alert,
        LogLevel::Critical,
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Notice,
        LogLevel::Info,
        LogLevel::Debug,
    ];

    /// Integer severity persisted in the `level` column.
    pub fn severity(self) -> i64 {
        match self {
            LogLevel::Emergency => 800,
            LogLevel::Alert => 700,
            LogLevel::Critical => 600,
            LogLevel::Error => 500,
            LogLevel::Warning => 400,
            LogLevel::Notice => 300,
            LogLevel::Info => 200,
            LogLevel::Debug => 100,
        }
    }

    pub fn from_severity(severity: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.severity() == severity)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Emergency => "emergency",
            LogLevel::Alert => "alert",
            LogLevel::Critical => "critical",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Notice => "notice",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = RelayError;

    /// Unknown names are rejected; there is no fallback level.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|l| l.as_str() == name)
            .ok_or_else(|| RelayError::Validation(format!("unknown log level '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_table_round_trips() {
        for level in LogLevel::ALL {
            assert_eq!(LogLevel::from_severity(level.severity()), Some(level));
            assert_eq!(level.as_str().parse::<LogLevel>().unwrap(), level);
        }
        assert_eq!(LogLevel::Emergency.severity(), 800);
        assert_eq!(LogLevel::Debug.severity(), 100);
        assert_eq!(LogLevel::from_severity(250), None);
    }

    #[test]
    fn test_ordering_follows_severity() {
        assert!(LogLevel::Error > LogLevel::Info);
        assert!(LogLevel::Emergency > LogLevel::Alert);
    }

    #[test]
    fn test_unknown_level_fails() {
        assert!(matches!(
            "verbose".parse::<LogLevel>(),
            Err(RelayError::Validation(msg)) if msg.contains("verbose")
        ));
        assert_eq!("ERROR".parse::<LogLevel>().unwrap(), LogLevel::Error);
    }
}
