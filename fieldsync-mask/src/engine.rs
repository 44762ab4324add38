//! Rule-set composition and per-record masking.

use fieldsync_core::{FieldMap, MaskRule, PartitionConfig, Record, RuleMap, Settings};

use crate::rules::apply_rule;

/// The effective rules for one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: RuleMap,
}

/// Result of masking a field map.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskOutcome {
    pub fields: FieldMap,
    /// Names of fields whose rule failed; these are absent from `fields`.
    pub dropped: Vec<String>,
}

/// Result of masking a whole record.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedRecord {
    pub record: Record,
    pub dropped: Vec<String>,
}

impl RuleSet {
    pub fn new(rules: RuleMap) -> Self {
        Self { rules }
    }

    /// `defaults` overlaid with `overrides`; an override replaces the default
    /// rule for the same field.
    pub fn compose(defaults: &RuleMap, overrides: &RuleMap) -> Self {
        let mut rules = defaults.clone();
        rules.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { rules }
    }

    /// The rule set in force for `partition` under `settings`.
    pub fn for_partition(settings: &Settings, partition: &PartitionConfig) -> Self {
        Self::compose(&settings.default_rules, &partition.rules)
    }

    pub fn rule_for(&self, field: &str) -> Option<&MaskRule> {
        self.rules.get(field)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Mask every ruled field in `fields`. Unruled fields pass through.
    ///
    /// A failing rule drops its field; the raw value is never kept.
    pub fn mask_fields(&self, fields: &FieldMap) -> MaskOutcome {
        let mut masked = FieldMap::new();
        let mut dropped = Vec::new();

        for (name, value) in fields {
            let Some(rule) = self.rules.get(name) else {
                masked.insert(name.clone(), value.clone());
                continue;
            };
            match apply_rule(rule, value) {
                Ok(out) => {
                    masked.insert(name.clone(), out);
                }
                Err(err) => {
                    tracing::warn!(field = %name, rule = %rule, error = %err, "masking failed; field dropped");
                    dropped.push(name.clone());
                }
            }
        }

        MaskOutcome {
            fields: masked,
            dropped,
        }
    }

    /// Mask a record's fields, keeping id, timestamp and erasure flag.
    pub fn mask_record(&self, record: &Record) -> MaskedRecord {
        let outcome = self.mask_fields(&record.fields);
        MaskedRecord {
            record: Record {
                remote_id: record.remote_id.clone(),
                fields: outcome.fields,
                modified_at: record.modified_at,
                erased: record.erased,
            },
            dropped: outcome.dropped,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fieldsync_core::{default_rules, PartitionId};
    use serde_json::json;

    fn jonas() -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), json!("Jonas Jonaitis"));
        fields.insert("religion".to_string(), json!("Catholic/RomanRite"));
        fields.insert("birth_date".to_string(), json!("1985-04-12"));
        fields.insert(
            "address".to_string(),
            json!({"city": "Vilnius", "country": "LT", "street": "Gedimino pr. 1"}),
        );
        fields
    }

    #[test]
    fn default_rules_mask_sensitive_fields_and_pass_others() {
        let rules = RuleSet::new(default_rules());
        let outcome = rules.mask_fields(&jonas());

        assert!(outcome.dropped.is_empty());
        assert_eq!(outcome.fields["name"], json!("Jonas Jonaitis"));
        assert_eq!(outcome.fields["religion"], json!("Catholic"));
        assert_eq!(outcome.fields["birth_date"], json!("1985"));
        assert_eq!(outcome.fields["address"], json!({"city": "Vilnius", "country": "LT"}));
    }

    #[test]
    fn partition_override_replaces_default_rule() {
        let mut overrides = RuleMap::new();
        overrides.insert("religion".to_string(), MaskRule::Redact);
        overrides.insert("name".to_string(), MaskRule::Redact);
        let rules = RuleSet::compose(&default_rules(), &overrides);

        assert_eq!(rules.rule_for("religion"), Some(&MaskRule::Redact));
        assert_eq!(rules.rule_for("birth_date"), Some(&MaskRule::YearOnly));
        assert_eq!(rules.len(), 4);

        let outcome = rules.mask_fields(&jonas());
        assert_eq!(outcome.fields["religion"], json!(crate::REDACTED));
        assert_eq!(outcome.fields["name"], json!(crate::REDACTED));
    }

    #[test]
    fn failing_rule_drops_field_instead_of_leaking() {
        let rules = RuleSet::new(default_rules());
        let mut fields = jonas();
        fields.insert("birth_date".to_string(), json!("sometime in spring"));

        let outcome = rules.mask_fields(&fields);
        assert_eq!(outcome.dropped, vec!["birth_date".to_string()]);
        assert!(!outcome.fields.contains_key("birth_date"));
        assert_eq!(outcome.fields["religion"], json!("Catholic"));
    }

    #[test]
    fn mask_record_keeps_identity_and_flags() {
        let rules = RuleSet::new(default_rules());
        let record = Record::new("r1", jonas(), Utc::now());
        let masked = rules.mask_record(&record);
        assert_eq!(masked.record.remote_id, record.remote_id);
        assert_eq!(masked.record.modified_at, record.modified_at);
        assert!(!masked.record.erased);
    }

    #[test]
    fn for_partition_composes_settings_and_partition() {
        let now = Utc::now();
        let mut rules = RuleMap::new();
        rules.insert("name".to_string(), MaskRule::Redact);
        let partition = PartitionConfig {
            id: PartitionId::from("lt"),
            endpoint: "https://lt.example.test".to_string(),
            rules,
            created_at: now,
            updated_at: now,
        };
        let set = RuleSet::for_partition(&Settings::default(), &partition);
        assert_eq!(set.rule_for("name"), Some(&MaskRule::Redact));
        assert!(set.rule_for("religion").is_some());
    }
}
