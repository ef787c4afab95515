//! LLM Analysis Scenarios
//!
//! Each scenario implements `LlmRequest` and owns its typed response payload.

pub mod alias;
pub mod intent;
pub mod relationship;
pub mod rules;

use serde::{Deserialize, Serialize};

use crate::models::Schema;

/// Compact schema excerpt shipped to the LLM (names only, no connection
/// details).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDigest {
    pub name: String,
    pub tables: Vec<TableDigest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDigest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub columns: Vec<String>,
}

impl SchemaDigest {
    pub fn from_schema(schema: &Schema) -> Self {
        Self {
            name: schema.name.clone(),
            tables: schema
                .tables
                .iter()
                .map(|t| TableDigest {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    columns: t.column_names(),
                })
                .collect(),
        }
    }
}

/// Stable hash for cache keys.
pub(crate) fn content_hash(parts: &[&str]) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut h = DefaultHasher::new();
    for part in parts {
        part.hash(&mut h);
    }
    format!("{:x}", h.finish())
}
