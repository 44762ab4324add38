//! fieldsync core library: domain types, config registry persistence, errors.
//!
//! - [`types`]: newtypes, records, masking rules, config documents
//! - [`error`]: [`ConfigError`]
//! - [`registry`]: settings and partition load / save / add

pub mod error;
pub mod registry;
pub mod types;

pub use error::ConfigError;
pub use types::{
    default_rules, FieldMap, MaskRule, PartitionConfig, PartitionId, Record, RemoteId,
    RetryConfig, RuleMap, Settings,
};
