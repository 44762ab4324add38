//! Error types for fieldsync-mask.
//!
//! Messages never include the value being masked.

use thiserror::Error;

/// All errors that can arise from applying a single masking rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaskError {
    /// The rule cannot be applied to this kind of JSON value.
    #[error("{rule} expects {expected}, got {found}")]
    TypeMismatch {
        rule: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// A `year_only` input that is not a date in any accepted format.
    #[error("value is not a recognisable date")]
    InvalidDate,

    /// A `category_prefix` input whose prefix is blank.
    #[error("category prefix is empty")]
    EmptyCategory,
}
