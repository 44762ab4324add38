//! Roundtrip serialisation tests for `fieldsync-core` types.
//!
//! Each `#[case]` is isolated; no shared state.

use chrono::Utc;
use fieldsync_core::{
    default_rules, FieldMap, MaskRule, PartitionConfig, PartitionId, Record, RetryConfig,
    RuleMap, Settings,
};
use rstest::rstest;
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn minimal_partition() -> PartitionConfig {
    let now = Utc::now();
    PartitionConfig {
        id: PartitionId::from("lt"),
        endpoint: "https://lt.example.test".to_string(),
        rules: RuleMap::new(),
        created_at: now,
        updated_at: now,
    }
}

fn full_partition() -> PartitionConfig {
    let mut rules = RuleMap::new();
    rules.insert("name".to_string(), MaskRule::Redact);
    rules.insert(
        "religion".to_string(),
        MaskRule::CategoryPrefix {
            separator: "::".to_string(),
        },
    );
    PartitionConfig {
        rules,
        ..minimal_partition()
    }
}

fn unicode_partition() -> PartitionConfig {
    let mut rules = RuleMap::new();
    rules.insert(
        "vardas-пользователь-名前".to_string(),
        MaskRule::KeepKeys {
            keys: vec!["miestas".to_string(), "город".to_string()],
        },
    );
    PartitionConfig {
        endpoint: "https://ąčęėįšųūž.example.test".to_string(),
        rules,
        ..minimal_partition()
    }
}

// ---------------------------------------------------------------------------
// Parameterised roundtrip test
// ---------------------------------------------------------------------------

#[rstest]
#[case("minimal", minimal_partition())]
#[case("all_fields", full_partition())]
#[case("unicode_strings", unicode_partition())]
fn partition_roundtrip(#[case] label: &str, #[case] partition: PartitionConfig) {
    let yaml = serde_yaml::to_string(&partition)
        .unwrap_or_else(|e| panic!("[{label}] serialize failed: {e}"));
    let back: PartitionConfig = serde_yaml::from_str(&yaml)
        .unwrap_or_else(|e| panic!("[{label}] deserialize failed: {e}"));
    assert_eq!(partition, back, "[{label}]");
}

#[rstest]
#[case(MaskRule::CategoryPrefix { separator: "/".to_string() })]
#[case(MaskRule::YearOnly)]
#[case(MaskRule::KeepKeys { keys: vec!["city".to_string()] })]
#[case(MaskRule::Redact)]
fn mask_rule_roundtrip(#[case] rule: MaskRule) {
    let yaml = serde_yaml::to_string(&rule).expect("serialize");
    let back: MaskRule = serde_yaml::from_str(&yaml).expect("deserialize");
    assert_eq!(rule, back);
}

// ---------------------------------------------------------------------------
// Settings and records
// ---------------------------------------------------------------------------

#[test]
fn settings_without_optional_sections_use_defaults() {
    let settings: Settings = serde_yaml::from_str("version: 1\n").expect("deserialize");
    assert_eq!(settings.retry, RetryConfig::default());
    assert_eq!(settings.default_rules, default_rules());
}

#[test]
fn record_json_keeps_nested_values_and_omits_missing_id() {
    let mut fields = FieldMap::new();
    fields.insert("name".to_string(), json!("Jonas Jonaitis"));
    fields.insert(
        "address".to_string(),
        json!({"city": "Vilnius", "street": "Gedimino pr. 1"}),
    );
    let record = Record {
        remote_id: None,
        fields,
        modified_at: Utc::now(),
        erased: false,
    };

    let text = serde_json::to_string(&record).expect("serialize");
    assert!(!text.contains("remote_id"), "absent id must be omitted: {text}");
    let back: Record = serde_json::from_str(&text).expect("deserialize");
    assert_eq!(record, back);
}

#[test]
fn record_without_erased_flag_defaults_to_live() {
    let text = r#"{"remote_id":"r1","fields":{},"modified_at":"2024-01-01T00:00:00Z"}"#;
    let record: Record = serde_json::from_str(text).expect("deserialize");
    assert!(!record.erased);
}
