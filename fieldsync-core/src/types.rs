//! Domain types for fieldsync.
//!
//! Field values are kept as `serde_json::Value` so that strings, dates and
//! nested objects survive both the YAML config and the JSON stores unchanged.
//! All types are serializable/deserializable via serde.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// An isolation boundary (e.g. a jurisdiction code) with its own endpoint,
/// checkpoint and masking rules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(pub String);

impl PartitionId {
    /// Validate a partition id for use as a file stem.
    ///
    /// Allowed: non-empty, ASCII alphanumerics, `-` and `_`.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let valid = !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ConfigError::InvalidPartition(s.to_owned()));
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PartitionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PartitionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier assigned to a record by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RemoteId(pub String);

impl RemoteId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RemoteId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Field name → value. Ordered so that serialized payloads are stable.
pub type FieldMap = BTreeMap<String, Value>;

/// A synchronizable contact/profile record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Absent until the record has been seen by the remote system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    #[serde(default)]
    pub fields: FieldMap,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub erased: bool,
}

impl Record {
    pub fn new(remote_id: impl Into<RemoteId>, fields: FieldMap, modified_at: DateTime<Utc>) -> Self {
        Self {
            remote_id: Some(remote_id.into()),
            fields,
            modified_at,
            erased: false,
        }
    }

    /// Same fields and erasure flag; timestamps are ignored.
    pub fn same_content(&self, other: &Record) -> bool {
        self.fields == other.fields && self.erased == other.erased
    }

    /// The anonymized form kept after erasure: no fields, flag set.
    pub fn anonymized(&self, at: DateTime<Utc>) -> Record {
        Record {
            remote_id: self.remote_id.clone(),
            fields: FieldMap::new(),
            modified_at: at,
            erased: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Masking rules
// ---------------------------------------------------------------------------

/// A fidelity-reducing transform for one sensitive field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaskRule {
    /// Keep only the text before `separator` (classification fields).
    CategoryPrefix { separator: String },
    /// Keep only the year of a date.
    YearOnly,
    /// Keep only the named keys of a structured sub-object.
    KeepKeys { keys: Vec<String> },
    /// Replace the value entirely.
    Redact,
}

impl fmt::Display for MaskRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskRule::CategoryPrefix { .. } => write!(f, "category_prefix"),
            MaskRule::YearOnly => write!(f, "year_only"),
            MaskRule::KeepKeys { .. } => write!(f, "keep_keys"),
            MaskRule::Redact => write!(f, "redact"),
        }
    }
}

/// Field name → rule.
pub type RuleMap = BTreeMap<String, MaskRule>;

/// The built-in default rule set.
pub fn default_rules() -> RuleMap {
    let mut rules = RuleMap::new();
    rules.insert(
        "religion".to_string(),
        MaskRule::CategoryPrefix {
            separator: "/".to_string(),
        },
    );
    rules.insert("birth_date".to_string(), MaskRule::YearOnly);
    rules.insert(
        "address".to_string(),
        MaskRule::KeepKeys {
            keys: vec!["city".to_string(), "country".to_string()],
        },
    );
    rules
}

// ---------------------------------------------------------------------------
// Configuration documents
// ---------------------------------------------------------------------------

/// Retry budget for remote calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Delay after attempt `n` is `base_delay_ms * n`.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

/// Global settings, `~/.fieldsync/config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub version: u32,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_rules")]
    pub default_rules: RuleMap,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: 1,
            retry: RetryConfig::default(),
            default_rules: default_rules(),
        }
    }
}

/// A registered partition, `~/.fieldsync/partitions/<id>.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub id: PartitionId,
    /// Base URL of the remote record store serving this partition.
    pub endpoint: String,
    /// Overrides on top of `Settings::default_rules`.
    #[serde(default)]
    pub rules: RuleMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
