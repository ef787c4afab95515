//! Reconciliation rules, rulesets and field preferences.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Semantic,
    Pattern,
    Composite,
    Transformation,
}

impl MatchType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exact" => Some(Self::Exact),
            "fuzzy" => Some(Self::Fuzzy),
            "semantic" => Some(Self::Semantic),
            "pattern" => Some(Self::Pattern),
            "composite" => Some(Self::Composite),
            "transformation" => Some(Self::Transformation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Valid,
    Likely,
    Uncertain,
}

impl ValidationStatus {
    /// Status derived from rule confidence.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            Self::Valid
        } else if confidence >= 0.75 {
            Self::Likely
        } else {
            Self::Uncertain
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReconciliationRule {
    pub rule_id: String,
    pub rule_name: String,
    pub source_schema: String,
    pub source_table: String,
    pub source_columns: Vec<String>,
    pub target_schema: String,
    pub target_table: String,
    pub target_columns: Vec<String>,
    pub match_type: MatchType,
    pub confidence: f64,
    pub reasoning: String,
    pub validation_status: ValidationStatus,
    pub llm_generated: bool,
    pub created_at: DateTime<Utc>,
}

impl ReconciliationRule {
    /// Dedup key: same table pair + column lists + match type is one rule.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{:?}",
            self.source_table.to_lowercase(),
            self.source_columns.join(",").to_lowercase(),
            self.target_table.to_lowercase(),
            self.target_columns.join(",").to_lowercase(),
            self.match_type,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Ruleset {
    pub ruleset_id: String,
    pub name: String,
    pub kg_name: String,
    pub schemas: Vec<String>,
    pub rules: Vec<ReconciliationRule>,
    pub created_at: DateTime<Utc>,
}

/// Per-table user hints steering rule generation. Free-form JSON maps coming
/// in over HTTP are adapted into this typed form at the boundary; internal
/// code only sees `FieldPreference`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct FieldPreference {
    pub table: String,
    #[serde(default)]
    pub priority_fields: Vec<String>,
    #[serde(default)]
    pub exclude_fields: Vec<String>,
    /// seed mappings source column -> target column
    #[serde(default)]
    pub field_hints: BTreeMap<String, String>,
}

impl FieldPreference {
    /// Adapt a free-form JSON object (`{"priority_fields": [...], ...}` or a
    /// bare `{"src_col": "tgt_col"}` hint map) into the typed form.
    pub fn from_value(table: &str, value: &serde_json::Value) -> Self {
        let mut pref = FieldPreference { table: table.to_string(), ..Default::default() };
        let Some(obj) = value.as_object() else {
            return pref;
        };

        let known_keys = ["priority_fields", "exclude_fields", "field_hints"];
        if known_keys.iter().any(|k| obj.contains_key(*k)) {
            if let Some(list) = obj.get("priority_fields").and_then(|v| v.as_array()) {
                pref.priority_fields =
                    list.iter().filter_map(|v| v.as_str().map(String::from)).collect();
            }
            if let Some(list) = obj.get("exclude_fields").and_then(|v| v.as_array()) {
                pref.exclude_fields =
                    list.iter().filter_map(|v| v.as_str().map(String::from)).collect();
            }
            if let Some(hints) = obj.get("field_hints").and_then(|v| v.as_object()) {
                for (k, v) in hints {
                    if let Some(s) = v.as_str() {
                        pref.field_hints.insert(k.clone(), s.to_string());
                    }
                }
            }
        } else {
            // bare map form: every string entry is a field hint
            for (k, v) in obj {
                if let Some(s) = v.as_str() {
                    pref.field_hints.insert(k.clone(), s.to_string());
                }
            }
        }
        pref
    }
}
