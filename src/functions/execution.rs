//! # Execution Records
//!
//! One record per invocation. Status moves `pending -> running` and then
//! exactly once to a terminal state (`success`, `failure`, `timeout`).
//! Terminal records are never mutated again, only deleted.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::errors::{FunctionError, FunctionResult};

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failure,
    Timeout,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failure => "failure",
            ExecutionStatus::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failure | ExecutionStatus::Timeout
        )
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        match (self, next) {
            (ExecutionStatus::Pending, ExecutionStatus::Running) => true,
            // A record can fail before the guest ever starts (missing version, bad setup)
            (ExecutionStatus::Pending, n) if n.is_terminal() => true,
            (ExecutionStatus::Running, n) if n.is_terminal() => true,
            _ => false,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guest log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured guest log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Terminal result written to an execution in one step
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub logs: Vec<LogEntry>,
    pub duration_ms: u64,
}

/// A recorded invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,

    pub function_id: String,

    pub function_version_id: String,

    pub status: ExecutionStatus,

    /// Masked copy of the inbound event
    #[serde(default)]
    pub event: Option<Value>,

    /// Guest return value
    #[serde(default)]
    pub output: Option<Value>,

    /// Masked log stream
    #[serde(default)]
    pub logs: Vec<LogEntry>,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub duration_ms: Option<u64>,

    /// Unix seconds; the retention clock
    pub created_at: i64,

    #[serde(default)]
    pub completed_at: Option<i64>,
}

impl Execution {
    /// Create a pending execution
    pub fn new(
        function_id: impl Into<String>,
        function_version_id: impl Into<String>,
        masked_event: Option<Value>,
    ) -> Self {
        Self {
            id: format!("exec_{}", Uuid::new_v4().simple()),
            function_id: function_id.into(),
            function_version_id: function_version_id.into(),
            status: ExecutionStatus::Pending,
            event: masked_event,
            output: None,
            logs: Vec::new(),
            error: None,
            duration_ms: None,
            created_at: Utc::now().timestamp(),
            completed_at: None,
        }
    }

    fn transition(&mut self, next: ExecutionStatus) -> FunctionResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(FunctionError::InvalidTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Move `pending -> running`
    pub fn mark_running(&mut self) -> FunctionResult<()> {
        self.transition(ExecutionStatus::Running)
    }

    /// Apply the terminal outcome; rejected if already terminal
    pub fn finalize(&mut self, outcome: ExecutionOutcome) -> FunctionResult<()> {
        if !outcome.status.is_terminal() {
            return Err(FunctionError::InvalidTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: outcome.status.to_string(),
            });
        }
        self.transition(outcome.status)?;

        self.output = outcome.output;
        self.error = outcome.error;
        self.logs = outcome.logs;
        self.duration_ms = Some(outcome.duration_ms);
        self.completed_at = Some(Utc::now().timestamp());
        Ok(())
    }
}
