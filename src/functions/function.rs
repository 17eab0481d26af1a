//! # Function Definition

use std::collections::BTreeSet;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{FunctionError, FunctionResult};

/// Retention period applied when a function has no override
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Seconds in one retention day
pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Allowed execution retention periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum RetentionDays {
    Week,
    HalfMonth,
    Month,
    Year,
}

impl RetentionDays {
    /// Number of days this period covers
    pub fn days(&self) -> u32 {
        match self {
            RetentionDays::Week => 7,
            RetentionDays::HalfMonth => 15,
            RetentionDays::Month => 30,
            RetentionDays::Year => 365,
        }
    }
}

impl TryFrom<u32> for RetentionDays {
    type Error = FunctionError;

    fn try_from(days: u32) -> FunctionResult<Self> {
        match days {
            7 => Ok(RetentionDays::Week),
            15 => Ok(RetentionDays::HalfMonth),
            30 => Ok(RetentionDays::Month),
            365 => Ok(RetentionDays::Year),
            other => Err(FunctionError::InvalidRetention(other)),
        }
    }
}

impl From<RetentionDays> for u32 {
    fn from(r: RetentionDays) -> u32 {
        r.days()
    }
}

impl fmt::Display for RetentionDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.days())
    }
}

/// A registered function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Unique function ID, also the KV/env namespace
    pub id: String,

    /// Function name (unique)
    pub name: String,

    /// Function description
    #[serde(default)]
    pub description: String,

    /// Execution retention override
    #[serde(default)]
    pub retention_days: Option<RetentionDays>,

    /// Names of the environment variables set for this function; values
    /// live in the env store only
    #[serde(default)]
    pub env_vars: BTreeSet<String>,

    /// Created timestamp (unix seconds)
    pub created_at: i64,

    /// Updated timestamp (unix seconds)
    pub updated_at: i64,
}

impl Function {
    /// Create a new function
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now().timestamp();
        Self {
            id: format!("fn_{}", Uuid::new_v4().simple()),
            name: name.into(),
            description: String::new(),
            retention_days: None,
            env_vars: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set a retention override
    pub fn with_retention(mut self, retention: RetentionDays) -> Self {
        self.retention_days = Some(retention);
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Retention in days, falling back to the default
    pub fn effective_retention_days(&self) -> u32 {
        self.retention_days
            .map(|r| r.days())
            .unwrap_or(DEFAULT_RETENTION_DAYS)
    }

    /// Oldest `created_at` kept for this function at time `now`
    pub fn retention_cutoff(&self, now: i64) -> i64 {
        now - i64::from(self.effective_retention_days()) * SECONDS_PER_DAY
    }

    /// Rename the function
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.updated_at = Utc::now().timestamp();
    }

    /// Record an environment variable name; false if it was already listed
    pub fn track_env_var(&mut self, key: impl Into<String>) -> bool {
        let added = self.env_vars.insert(key.into());
        if added {
            self.updated_at = Utc::now().timestamp();
        }
        added
    }

    /// Forget an environment variable name; false if it was not listed
    pub fn untrack_env_var(&mut self, key: &str) -> bool {
        let removed = self.env_vars.remove(key);
        if removed {
            self.updated_at = Utc::now().timestamp();
        }
        removed
    }
}

/// Immutable code snapshot of a function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionVersion {
    pub id: String,

    pub function_id: String,

    /// Per-function sequence number, starting at 1
    pub version: u32,

    pub code: String,

    #[serde(default)]
    pub commit_message: Option<String>,

    pub created_at: i64,
}

impl FunctionVersion {
    pub fn new(
        function_id: impl Into<String>,
        version: u32,
        code: impl Into<String>,
        commit_message: Option<String>,
    ) -> Self {
        Self {
            id: format!("ver_{}", Uuid::new_v4().simple()),
            function_id: function_id.into(),
            version,
            code: code.into(),
            commit_message,
            created_at: Utc::now().timestamp(),
        }
    }
}

/// Offset/limit pagination for list operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
}

impl Pagination {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// The following page
    pub fn next(&self) -> Self {
        Self {
            limit: self.limit,
            offset: self.offset + self.limit,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_creation() {
        let func = Function::new("hello");

        assert_eq!(func.name, "hello");
        assert!(func.id.starts_with("fn_"));
        assert_eq!(func.retention_days, None);
        assert_eq!(func.effective_retention_days(), 7);
    }

    #[test]
    fn test_retention_values() {
        for days in [7, 15, 30, 365] {
            let r = RetentionDays::try_from(days).unwrap();
            assert_eq!(r.days(), days);
        }
        assert!(RetentionDays::try_from(0).is_err());
        assert!(RetentionDays::try_from(14).is_err());
    }

    #[test]
    fn test_retention_cutoff() {
        let func = Function::new("yearly").with_retention(RetentionDays::Year);
        let now = 1_000_000_000;
        assert_eq!(func.retention_cutoff(now), now - 365 * SECONDS_PER_DAY);
    }

    #[test]
    fn test_retention_serde_as_number() {
        let func = Function::new("ser").with_retention(RetentionDays::Month);
        let json = serde_json::to_value(&func).unwrap();
        assert_eq!(json["retention_days"], 30);

        let mut bad = json.clone();
        bad["retention_days"] = serde_json::json!(12);
        assert!(serde_json::from_value::<Function>(bad).is_err());
    }

    #[test]
    fn test_env_var_names_tracked() {
        let mut func = Function::new("envy");
        assert!(func.track_env_var("REGION"));
        assert!(!func.track_env_var("REGION"));
        assert!(func.track_env_var("API_KEY"));
        assert_eq!(
            func.env_vars.iter().collect::<Vec<_>>(),
            vec!["API_KEY", "REGION"]
        );

        assert!(func.untrack_env_var("REGION"));
        assert!(!func.untrack_env_var("REGION"));
        assert_eq!(func.env_vars.len(), 1);
    }

    #[test]
    fn test_env_vars_default_when_absent() {
        let mut json = serde_json::to_value(Function::new("old")).unwrap();
        json.as_object_mut().unwrap().remove("env_vars");
        let func: Function = serde_json::from_value(json).unwrap();
        assert!(func.env_vars.is_empty());
    }

    #[test]
    fn test_pagination_next() {
        let page = Pagination::new(10, 0).next();
        assert_eq!(page.offset, 10);
        assert_eq!(page.limit, 10);
    }
}
