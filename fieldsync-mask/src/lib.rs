//! # fieldsync-mask
//!
//! Field masking for records leaving a partition boundary.
//!
//! A [`RuleSet`] is the default rule set overlaid with a partition's own
//! rules. Masking a record replaces every ruled field with the rule's output;
//! a rule that fails drops the field instead of passing the raw value.
//!
//! ## Usage
//!
//! ```rust
//! use fieldsync_core::{default_rules, FieldMap, RuleMap};
//! use fieldsync_mask::RuleSet;
//! use serde_json::json;
//!
//! let rules = RuleSet::compose(&default_rules(), &RuleMap::new());
//! let mut fields = FieldMap::new();
//! fields.insert("religion".to_string(), json!("Catholic/RomanRite"));
//!
//! let outcome = rules.mask_fields(&fields);
//! assert_eq!(outcome.fields["religion"], json!("Catholic"));
//! assert!(outcome.dropped.is_empty());
//! ```

pub mod engine;
pub mod error;
pub mod rules;

pub use engine::{MaskOutcome, MaskedRecord, RuleSet};
pub use error::MaskError;
pub use rules::{apply_rule, REDACTED};
