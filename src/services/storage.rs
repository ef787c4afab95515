//! File-based JSON storage
//!
//! Single-process store for every persisted artifact: KG metadata, rulesets,
//! execution results, KPI configs/results/evidence. Writes are atomic
//! (write-then-rename) and directory creation is idempotent.

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use crate::models::{
    DqcsKpi, ExecutionOutcome, KnowledgeGraph, KpiConfig, KpiEvidence, KpiKind, RcrKpi, ReiKpi,
    Ruleset,
};
use crate::utils::{EngineError, EngineResult};

pub struct FileStore {
    root: PathBuf,
    results_dir: PathBuf,
}

impl FileStore {
    /// `results_override` replaces `<root>/results` when set
    /// (`RESULT_STORAGE_DIR`).
    pub fn new(root: impl Into<PathBuf>, results_override: Option<String>) -> Self {
        let root = root.into();
        let results_dir =
            results_override.map(PathBuf::from).unwrap_or_else(|| root.join("results"));
        Self { root, results_dir }
    }

    fn kg_dir(&self, kg_name: &str) -> PathBuf {
        self.root.join("kg_storage").join(kg_name)
    }

    fn rules_dir(&self) -> PathBuf {
        self.root.join("data").join("reconciliation_rules")
    }

    fn kpi_dir(&self, sub: &str) -> PathBuf {
        self.root.join(sub)
    }

    fn timestamp() -> String {
        Utc::now().format("%Y%m%d_%H%M%S").to_string()
    }

    /// Atomic JSON write: stream-serialize to `<path>.tmp`, then rename into
    /// place. Streaming through a buffered writer keeps memory bounded for
    /// long record sets.
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> EngineResult<PathBuf> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        {
            let file = std::fs::File::create(&tmp)?;
            let mut writer = std::io::BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            use std::io::Write;
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;
        tracing::debug!("Wrote {}", path.display());
        Ok(path.to_path_buf())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> EngineResult<T> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    // ========================================================================
    // Knowledge graphs
    // ========================================================================

    /// KG document (including `table_aliases`) lives at
    /// `kg_storage/<kg_name>/metadata.json`.
    pub fn save_graph(&self, kg: &KnowledgeGraph) -> EngineResult<PathBuf> {
        let path = self.kg_dir(&kg.metadata.name).join("metadata.json");
        self.write_json(&path, kg)
    }

    pub fn load_graph(&self, kg_name: &str) -> EngineResult<KnowledgeGraph> {
        let path = self.kg_dir(kg_name).join("metadata.json");
        if !path.exists() {
            return Err(EngineError::GraphNotFound(kg_name.to_string()));
        }
        self.read_json(&path)
    }

    pub fn list_graphs(&self) -> EngineResult<Vec<String>> {
        let dir = self.root.join("kg_storage");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.path().join("metadata.json").exists()
                && let Some(name) = entry.file_name().to_str()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn delete_graph(&self, kg_name: &str) -> EngineResult<()> {
        let dir = self.kg_dir(kg_name);
        if !dir.exists() {
            return Err(EngineError::GraphNotFound(kg_name.to_string()));
        }
        std::fs::remove_dir_all(&dir)?;
        tracing::info!("Deleted knowledge graph '{}'", kg_name);
        Ok(())
    }

    // ========================================================================
    // Rulesets
    // ========================================================================

    pub fn save_ruleset(&self, ruleset: &Ruleset) -> EngineResult<PathBuf> {
        let path = self.rules_dir().join(format!("{}.json", ruleset.ruleset_id));
        self.write_json(&path, ruleset)
    }

    pub fn load_ruleset(&self, ruleset_id: &str) -> EngineResult<Ruleset> {
        let path = self.rules_dir().join(format!("{}.json", ruleset_id));
        if !path.exists() {
            return Err(EngineError::RulesetNotFound(ruleset_id.to_string()));
        }
        self.read_json(&path)
    }

    pub fn list_rulesets(&self) -> EngineResult<Vec<Ruleset>> {
        let dir = self.rules_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut rulesets = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                match self.read_json::<Ruleset>(&path) {
                    Ok(rs) => rulesets.push(rs),
                    Err(e) => tracing::warn!("Skipping unreadable ruleset {}: {}", path.display(), e),
                }
            }
        }
        rulesets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rulesets)
    }

    // ========================================================================
    // Execution results & KPIs
    // ========================================================================

    pub fn save_execution_result(&self, outcome: &ExecutionOutcome) -> EngineResult<PathBuf> {
        let path = self.results_dir.join(format!(
            "reconciliation_result_{}_{}.json",
            outcome.ruleset_id,
            Self::timestamp()
        ));
        self.write_json(&path, outcome)
    }

    pub fn save_kpi_config(&self, config: &KpiConfig) -> EngineResult<PathBuf> {
        let path = self.kpi_dir("kpi_configs").join(format!("kpi_config_{}.json", config.kpi_id));
        self.write_json(&path, config)
    }

    pub fn load_kpi_config(&self, kpi_id: &str) -> EngineResult<KpiConfig> {
        let path = self.kpi_dir("kpi_configs").join(format!("kpi_config_{}.json", kpi_id));
        if !path.exists() {
            return Err(EngineError::InvalidRequest(format!("Unknown KPI config: {}", kpi_id)));
        }
        self.read_json(&path)
    }

    pub fn save_kpi_result<T: Serialize>(
        &self,
        kind: KpiKind,
        kpi_id: &str,
        result: &T,
    ) -> EngineResult<PathBuf> {
        let path = self.kpi_dir("kpi_results").join(format!(
            "kpi_result_{}_{}_{}.json",
            kind.as_str(),
            kpi_id,
            Self::timestamp()
        ));
        self.write_json(&path, result)
    }

    pub fn save_kpi_evidence(&self, evidence: &KpiEvidence) -> EngineResult<PathBuf> {
        let path = self.kpi_dir("kpi_evidence").join(format!(
            "kpi_evidence_{}_{}.json",
            evidence.kpi_id,
            Self::timestamp()
        ));
        self.write_json(&path, evidence)
    }

    /// Persist all three KPI documents, returning their paths for lineage.
    pub fn save_kpi_bundle(
        &self,
        rcr: &RcrKpi,
        dqcs: &DqcsKpi,
        rei: &ReiKpi,
    ) -> EngineResult<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(3);
        paths.push(self.save_kpi_result(KpiKind::Rcr, &rcr.header.kpi_id, rcr)?);
        paths.push(self.save_kpi_result(KpiKind::Dqcs, &dqcs.header.kpi_id, dqcs)?);
        paths.push(self.save_kpi_result(KpiKind::Rei, &rei.header.kpi_id, rei)?);
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KnowledgeGraph;

    fn temp_store() -> (FileStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("tessera_store_{}", uuid::Uuid::new_v4()));
        (FileStore::new(&dir, None), dir)
    }

    #[test]
    fn graph_round_trip_and_not_found() {
        let (store, dir) = temp_store();
        let mut kg = KnowledgeGraph::new("demo", vec!["a".to_string()]);
        kg.add_alias("orders", "Orders");

        store.save_graph(&kg).expect("save");
        let loaded = store.load_graph("demo").expect("load");
        assert_eq!(loaded.metadata.name, "demo");
        assert_eq!(loaded.table_aliases.get("orders").unwrap(), &vec!["Orders".to_string()]);

        assert!(matches!(store.load_graph("missing"), Err(EngineError::GraphNotFound(_))));
        assert_eq!(store.list_graphs().unwrap(), vec!["demo".to_string()]);

        store.delete_graph("demo").expect("delete");
        assert!(store.list_graphs().unwrap().is_empty());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn result_dir_override_is_used() {
        let dir = std::env::temp_dir().join(format!("tessera_res_{}", uuid::Uuid::new_v4()));
        let override_dir = dir.join("custom_out");
        let store =
            FileStore::new(&dir, Some(override_dir.to_string_lossy().to_string()));

        let outcome = ExecutionOutcome {
            ruleset_id: "RECON_deadbeef".to_string(),
            execution_id: "EXEC_deadbeef".to_string(),
            execution_timestamp: Utc::now(),
            matched_count: 0,
            unmatched_source_count: 0,
            unmatched_target_count: 0,
            matched_records: vec![],
            unmatched_source: vec![],
            unmatched_target: vec![],
            execution_time_ms: 0,
            generated_sql: vec![],
            rule_match_stats: vec![],
            rule_errors: vec![],
        };
        let path = store.save_execution_result(&outcome).expect("save");
        assert!(path.starts_with(&override_dir));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("reconciliation_result_RECON_deadbeef_"));
        assert!(name.ends_with(".json"));

        let _ = std::fs::remove_dir_all(dir);
    }
}
