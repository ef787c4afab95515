//! Short id generation for rules, rulesets and executions.

use std::collections::HashSet;
use uuid::Uuid;

/// 8 lowercase hex chars from a fresh v4 UUID.
fn short_hex() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

pub fn rule_id() -> String {
    format!("RULE_{}", short_hex())
}

pub fn ruleset_id() -> String {
    format!("RECON_{}", short_hex())
}

pub fn execution_id() -> String {
    format!("EXEC_{}", short_hex())
}

pub fn kpi_id() -> String {
    format!("KPI_{}", short_hex())
}

/// Generate a rule id that does not collide with already-assigned ids.
/// Collisions on 8 hex chars are rare but resolved by regeneration.
pub fn unique_rule_id(taken: &mut HashSet<String>) -> String {
    loop {
        let id = rule_id();
        if taken.insert(id.clone()) {
            return id;
        }
    }
}
