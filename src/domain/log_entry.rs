use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            "critical" => Some(LogLevel::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin category of a log event as reported by the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Console,
    Logger,
    Exception,
    Network,
    Database,
    Endpoint,
    Custom,
}

impl LogType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogType::Console => "console",
            LogType::Logger => "logger",
            LogType::Exception => "exception",
            LogType::Network => "network",
            LogType::Database => "database",
            LogType::Endpoint => "endpoint",
            LogType::Custom => "custom",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated log event as handed over by the ingestion boundary.
///
/// Optional fields are always serialized (no `skip_serializing_if`) so the
/// struct stays decodable from the positional binary queue encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub log_type: LogType,
    #[serde(default = "default_importance")]
    pub importance: String,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub release: Option<String>,
    pub message: String,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub sdk_name: Option<String>,
    #[serde(default)]
    pub sdk_version: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

fn default_importance() -> String {
    "standard".to_string()
}

impl LogEntry {
    /// Builds a bare entry; remaining fields can be filled in with struct update syntax.
    #[must_use]
    pub fn new(
        timestamp: DateTime<Utc>,
        level: LogLevel,
        log_type: LogType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            level,
            log_type,
            importance: default_importance(),
            environment: None,
            release: None,
            message: message.into(),
            error_type: None,
            error_message: None,
            stack_trace: None,
            attributes: HashMap::new(),
            sdk_name: None,
            sdk_version: None,
            platform: None,
        }
    }

    #[must_use]
    pub fn is_exception(&self) -> bool {
        self.log_type == LogType::Exception
    }

    /// `"METHOD path"` for endpoint events that carry both attributes.
    #[must_use]
    pub fn route_signature(&self) -> Option<String> {
        if self.log_type != LogType::Endpoint {
            return None;
        }
        let method = self.attributes.get("method")?;
        let path = self.attributes.get("path")?;
        Some(format!("{} {}", method.to_uppercase(), path))
    }
}
