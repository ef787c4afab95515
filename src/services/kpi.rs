//! KPI Computer & Result Writer
//!
//! Computes RCR, DQCS and REI from execution outputs and persists the three
//! documents (plus drill-down evidence) as separate JSON artifacts sharing
//! one `ruleset_id`/`execution_id` lineage. All inputs are supplied by the
//! caller; no store is consulted during computation.

use chrono::Utc;
use std::sync::Arc;

use crate::models::{
    ConfidenceStatus, CoverageStatus, DqcsKpi, ExecutionOutcome, KpiEvidence, KpiHeader, RcrKpi,
    ReiKpi,
};
use crate::services::storage::FileStore;
use crate::utils::{EngineResult, id};

/// Rows sampled into the evidence document.
const EVIDENCE_SAMPLE_SIZE: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct KpiInputs {
    pub matched_count: usize,
    pub total_source_count: usize,
    /// (confidence, record count) pairs for matched records
    pub match_confidences: Vec<(f64, usize)>,
    pub active_rules: usize,
    pub total_rules: usize,
    pub execution_time_ms: u64,
}

impl KpiInputs {
    /// Derive KPI inputs from an execution outcome. Total source count is
    /// matched + unmatched_source; per-record confidence is the confidence
    /// of the rule that matched the record.
    pub fn from_outcome(outcome: &ExecutionOutcome, total_rules: usize) -> Self {
        let match_confidences = outcome
            .rule_match_stats
            .iter()
            .filter(|s| s.matched_count > 0)
            .map(|s| (s.rule_confidence, s.matched_count))
            .collect();
        let active_rules = outcome
            .rule_match_stats
            .iter()
            .filter(|s| s.matched_count > 0)
            .count();
        Self {
            matched_count: outcome.matched_count,
            total_source_count: outcome.matched_count + outcome.unmatched_source_count,
            match_confidences,
            active_rules,
            total_rules,
            execution_time_ms: outcome.execution_time_ms,
        }
    }
}

fn header(kpi_id: &str, ruleset_id: &str, execution_id: &str, lineage: Vec<String>) -> KpiHeader {
    KpiHeader {
        kpi_id: kpi_id.to_string(),
        ruleset_id: ruleset_id.to_string(),
        execution_id: execution_id.to_string(),
        timestamp: Utc::now(),
        lineage,
    }
}

/// Reconciliation Coverage Rate: matched / total * 100.
pub fn compute_rcr(inputs: &KpiInputs, header: KpiHeader) -> RcrKpi {
    let coverage_rate = if inputs.total_source_count == 0 || inputs.matched_count == 0 {
        0.0
    } else {
        inputs.matched_count as f64 / inputs.total_source_count as f64 * 100.0
    };
    let status = if coverage_rate >= 90.0 {
        CoverageStatus::Healthy
    } else if coverage_rate >= 80.0 {
        CoverageStatus::Warning
    } else {
        CoverageStatus::Critical
    };
    RcrKpi {
        header,
        coverage_rate,
        matched_count: inputs.matched_count,
        total_source_count: inputs.total_source_count,
        status,
    }
}

/// Data Quality Confidence Score: mean matched-record confidence with
/// high (>= 0.9) / medium ([0.8, 0.9)) / low (< 0.8) banding.
pub fn compute_dqcs(inputs: &KpiInputs, header: KpiHeader) -> DqcsKpi {
    let total: usize = inputs.match_confidences.iter().map(|(_, n)| n).sum();
    let (mut high, mut medium, mut low) = (0usize, 0usize, 0usize);
    let mut weighted_sum = 0.0;

    for &(confidence, count) in &inputs.match_confidences {
        weighted_sum += confidence * count as f64;
        if confidence >= 0.9 {
            high += count;
        } else if confidence >= 0.8 {
            medium += count;
        } else {
            low += count;
        }
    }

    let overall = if total == 0 { 0.0 } else { weighted_sum / total as f64 };
    let status = if overall >= 0.85 {
        ConfidenceStatus::Good
    } else if overall >= 0.7 {
        ConfidenceStatus::Acceptable
    } else {
        ConfidenceStatus::Poor
    };

    DqcsKpi {
        header,
        overall_confidence_score: overall,
        high_confidence_count: high,
        medium_confidence_count: medium,
        low_confidence_count: low,
        status,
    }
}

/// Reconciliation Efficiency Index:
/// `(success_rate * rule_utilization * speed_factor) / 10000`, clamped to
/// [0, 100]. Target time scales with source volume (1s per 1000 records).
pub fn compute_rei(inputs: &KpiInputs, header: KpiHeader) -> ReiKpi {
    let success_rate = if inputs.total_source_count == 0 {
        0.0
    } else {
        inputs.matched_count as f64 / inputs.total_source_count as f64 * 100.0
    };
    let rule_utilization = if inputs.total_rules == 0 {
        0.0
    } else {
        inputs.active_rules as f64 / inputs.total_rules as f64 * 100.0
    };
    let target_time_ms = (inputs.total_source_count as f64 / 1000.0) * 1000.0;
    let speed_factor = if inputs.execution_time_ms == 0 {
        100.0
    } else {
        target_time_ms / inputs.execution_time_ms as f64 * 100.0
    };

    let efficiency_index =
        ((success_rate * rule_utilization * speed_factor) / 10_000.0).clamp(0.0, 100.0);

    ReiKpi { header, efficiency_index, match_success_rate: success_rate, rule_utilization, speed_factor }
}

pub struct KpiService {
    store: Arc<FileStore>,
}

impl KpiService {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }

    /// Compute all three KPIs for an execution outcome and persist them as
    /// separate documents plus one evidence file. Returns the documents.
    pub fn compute_and_persist(
        &self,
        outcome: &ExecutionOutcome,
        total_rules: usize,
        result_path: Option<String>,
    ) -> EngineResult<(RcrKpi, DqcsKpi, ReiKpi)> {
        let inputs = KpiInputs::from_outcome(outcome, total_rules);
        self.persist(&inputs, outcome, result_path)
    }

    /// Persist KPIs computed from explicit inputs (the KPI compute API).
    pub fn persist(
        &self,
        inputs: &KpiInputs,
        outcome: &ExecutionOutcome,
        result_path: Option<String>,
    ) -> EngineResult<(RcrKpi, DqcsKpi, ReiKpi)> {
        let kpi_id = id::kpi_id();
        let mut lineage: Vec<String> = result_path.into_iter().collect();

        let evidence = KpiEvidence {
            kpi_id: kpi_id.clone(),
            ruleset_id: outcome.ruleset_id.clone(),
            execution_id: outcome.execution_id.clone(),
            timestamp: Utc::now(),
            sample_matched: outcome
                .matched_records
                .iter()
                .take(EVIDENCE_SAMPLE_SIZE)
                .cloned()
                .collect(),
            sample_unmatched_source: outcome
                .unmatched_source
                .iter()
                .take(EVIDENCE_SAMPLE_SIZE)
                .cloned()
                .collect(),
            sample_unmatched_target: outcome
                .unmatched_target
                .iter()
                .take(EVIDENCE_SAMPLE_SIZE)
                .cloned()
                .collect(),
            generated_sql: outcome
                .generated_sql
                .iter()
                .map(|g| g.source_sql.clone())
                .collect(),
        };
        let evidence_path = self.store.save_kpi_evidence(&evidence)?;
        lineage.push(evidence_path.to_string_lossy().to_string());

        let make_header =
            || header(&kpi_id, &outcome.ruleset_id, &outcome.execution_id, lineage.clone());
        let rcr = compute_rcr(inputs, make_header());
        let dqcs = compute_dqcs(inputs, make_header());
        let rei = compute_rei(inputs, make_header());

        self.store.save_kpi_bundle(&rcr, &dqcs, &rei)?;
        tracing::info!(
            "KPIs for {}: RCR={:.2} ({:?}), DQCS={:.3} ({:?}), REI={:.1}",
            outcome.execution_id,
            rcr.coverage_rate,
            rcr.status,
            dqcs.overall_confidence_score,
            dqcs.status,
            rei.efficiency_index
        );
        Ok((rcr, dqcs, rei))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs_s7() -> KpiInputs {
        KpiInputs {
            matched_count: 1247,
            total_source_count: 1300,
            match_confidences: vec![(0.95, 850), (0.85, 250), (0.75, 147)],
            active_rules: 18,
            total_rules: 22,
            execution_time_ms: 2500,
        }
    }

    fn test_header() -> KpiHeader {
        header("KPI_00000001", "RECON_00000001", "EXEC_00000001", vec![])
    }

    #[test]
    fn rcr_matches_reference_numbers() {
        let rcr = compute_rcr(&inputs_s7(), test_header());
        assert!((rcr.coverage_rate - 95.92).abs() < 0.01);
        assert_eq!(rcr.status, CoverageStatus::Healthy);
        assert_eq!(rcr.matched_count, 1247);
    }

    #[test]
    fn dqcs_weighted_mean_and_bands() {
        let dqcs = compute_dqcs(&inputs_s7(), test_header());
        // (850*0.95 + 250*0.85 + 147*0.75) / 1247
        assert!((dqcs.overall_confidence_score - 0.9064).abs() < 0.001);
        assert_eq!(dqcs.high_confidence_count, 850);
        assert_eq!(dqcs.medium_confidence_count, 250);
        assert_eq!(dqcs.low_confidence_count, 147);
        assert_eq!(dqcs.status, ConfidenceStatus::Good);
    }

    #[test]
    fn rei_matches_reference_numbers() {
        let rei = compute_rei(&inputs_s7(), test_header());
        // success 95.92, utilization 81.82, speed 52.0 -> ~40.8
        assert!((rei.match_success_rate - 95.92).abs() < 0.01);
        assert!((rei.rule_utilization - 81.82).abs() < 0.01);
        assert!((rei.speed_factor - 52.0).abs() < 0.01);
        assert!((rei.efficiency_index - 40.8).abs() < 0.5);
    }

    #[test]
    fn zero_matched_means_zero_rcr_and_dqcs() {
        let inputs = KpiInputs {
            matched_count: 0,
            total_source_count: 500,
            match_confidences: vec![],
            active_rules: 0,
            total_rules: 10,
            execution_time_ms: 100,
        };
        assert_eq!(compute_rcr(&inputs, test_header()).coverage_rate, 0.0);
        assert_eq!(compute_dqcs(&inputs, test_header()).overall_confidence_score, 0.0);
    }

    #[test]
    fn full_match_is_healthy_100() {
        let inputs = KpiInputs {
            matched_count: 500,
            total_source_count: 500,
            match_confidences: vec![(0.9, 500)],
            active_rules: 5,
            total_rules: 5,
            execution_time_ms: 100,
        };
        let rcr = compute_rcr(&inputs, test_header());
        assert_eq!(rcr.coverage_rate, 100.0);
        assert_eq!(rcr.status, CoverageStatus::Healthy);
    }

    #[test]
    fn rcr_monotonic_in_matched_count() {
        let mut previous = -1.0;
        for matched in [0usize, 100, 500, 900, 1300] {
            let inputs = KpiInputs {
                matched_count: matched,
                total_source_count: 1300,
                match_confidences: vec![],
                active_rules: 1,
                total_rules: 1,
                execution_time_ms: 100,
            };
            let rate = compute_rcr(&inputs, test_header()).coverage_rate;
            assert!(rate >= previous);
            previous = rate;
        }
    }

    #[test]
    fn rei_clamps_to_100() {
        let inputs = KpiInputs {
            matched_count: 1_000_000,
            total_source_count: 1_000_000,
            match_confidences: vec![(0.95, 1_000_000)],
            active_rules: 10,
            total_rules: 10,
            // absurdly fast execution: speed factor explodes, REI clamps
            execution_time_ms: 1,
        };
        let rei = compute_rei(&inputs, test_header());
        assert_eq!(rei.efficiency_index, 100.0);
    }

    #[test]
    fn zero_denominators_do_not_panic() {
        let inputs = KpiInputs::default();
        let rcr = compute_rcr(&inputs, test_header());
        let rei = compute_rei(&inputs, test_header());
        assert_eq!(rcr.coverage_rate, 0.0);
        assert_eq!(rcr.status, CoverageStatus::Critical);
        assert_eq!(rei.efficiency_index, 0.0);
    }
}
