//! Metrics and synthesis: turns raw crew results into typed insights,
//! synthesizes cross-crew findings, and assembles the final results object.
//!
//! Per-crew heuristics live behind the [`InsightExtractor`] trait and are
//! registered in an [`ExtractorSet`] keyed by worker id -- one strategy
//! object per crew kind instead of scattered string matching. Every crew
//! invocation yields at least one summary insight, even when no
//! crew-specific heuristic fires.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use serde_json::{json, Value};

use super::types::{
    AnalysisResult, CollaborationBreakdown, DelegationStrategy, EscalationContext,
    EscalationResults, Insight, WorkerReport, WorkerReportEntry,
};
use crate::worker::WorkerId;

/// Insights with confidence at or above this count as high-confidence in the
/// collaboration-effectiveness score.
const HIGH_CONFIDENCE: f64 = 0.8;

/// Per-crew-kind heuristic that inspects a raw result's structured fields and
/// emits zero or more typed insights.
pub trait InsightExtractor: Send + Sync {
    fn extract(
        &self,
        worker: &str,
        result: &AnalysisResult,
        context: &EscalationContext,
    ) -> Vec<Insight>;
}

/// Lookup table of insight extractors, keyed by worker id.
pub struct ExtractorSet {
    extractors: HashMap<&'static str, Box<dyn InsightExtractor>>,
}

impl Default for ExtractorSet {
    fn default() -> Self {
        let mut extractors: HashMap<&'static str, Box<dyn InsightExtractor>> = HashMap::new();
        extractors.insert("asset_intelligence_crew", Box::new(AssetIntelligence));
        extractors.insert("dependency_analysis_crew", Box::new(DependencyAnalysis));
        extractors.insert("risk_assessment_crew", Box::new(RiskAssessment));
        extractors.insert("compliance_audit_crew", Box::new(ComplianceAudit));
        extractors.insert("lifecycle_planning_crew", Box::new(LifecyclePlanning));
        ExtractorSet { extractors }
    }
}

impl ExtractorSet {
    /// Extract insights for one crew invocation.
    ///
    /// Runs the crew-specific extractor when one is registered, then always
    /// appends a summary insight describing the crew's overall outcome. A
    /// `None` result (failed or never-dispatched worker) yields a single
    /// failure summary.
    pub fn extract(
        &self,
        worker: &str,
        result: Option<&AnalysisResult>,
        context: &EscalationContext,
    ) -> Vec<Insight> {
        let Some(result) = result else {
            return vec![insight(
                "crew_summary",
                worker,
                format!("Crew `{worker}` returned no result"),
                0.0,
                json!({"worker": worker, "success": false}),
            )];
        };

        let mut insights = match self.extractors.get(worker) {
            Some(extractor) => extractor.extract(worker, result, context),
            None => Vec::new(),
        };

        insights.push(insight(
            "crew_summary",
            worker,
            format!(
                "Crew `{worker}` {}: {} findings",
                if result.success { "succeeded" } else { "reported failure" },
                result.findings.len()
            ),
            result.confidence,
            json!({
                "worker": worker,
                "success": result.success,
                "finding_count": result.findings.len(),
            }),
        ));
        insights
    }
}

/// Synthesize cross-crew insights after a collaborative run.
///
/// Any subject touched by more than one crew yields a cross-worker analysis
/// insight; a collaboration-outcome insight summarizing dispatch success and
/// the effectiveness score is always appended. Page-scoped insights carry the
/// page itself as their subject and would overlap trivially, so the page key
/// is excluded from the grouping.
pub fn synthesize(
    per_worker: &[(WorkerId, Vec<Insight>)],
    page: &str,
    dispatched: usize,
    succeeded: usize,
) -> Vec<Insight> {
    // subject -> crews that produced a non-summary insight about it.
    // BTreeMap keeps the output order deterministic.
    let mut subjects: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (worker, insights) in per_worker {
        for ins in insights {
            if ins.kind != "crew_summary" && ins.subject != page {
                subjects
                    .entry(ins.subject.as_str())
                    .or_default()
                    .insert(worker.as_str());
            }
        }
    }

    let mut synthesized: Vec<Insight> = subjects
        .iter()
        .filter(|(_, workers)| workers.len() > 1)
        .map(|(subject, workers)| {
            let crews: Vec<&str> = workers.iter().copied().collect();
            insight(
                "cross_worker_analysis",
                subject,
                format!(
                    "`{subject}` was flagged independently by {} crews: {}",
                    crews.len(),
                    crews.join(", ")
                ),
                0.85,
                json!({"workers": crews}),
            )
        })
        .collect();

    let all_insights: Vec<&Insight> = per_worker
        .iter()
        .flat_map(|(_, ins)| ins.iter())
        .chain(synthesized.iter())
        .collect();
    let score = effectiveness(&all_insights);

    synthesized.push(insight(
        "collaboration_outcome",
        "collaboration",
        format!("{succeeded} of {dispatched} dispatched crews returned results"),
        if dispatched == 0 {
            0.0
        } else {
            succeeded as f64 / dispatched as f64
        },
        json!({
            "dispatched": dispatched,
            "succeeded": succeeded,
            "effectiveness": score,
        }),
    ));
    synthesized
}

/// Collaboration effectiveness: 0.6 x insight-type diversity + 0.4 x fraction
/// of high-confidence insights, clamped to [0, 1].
pub fn effectiveness(insights: &[&Insight]) -> f64 {
    if insights.is_empty() {
        return 0.0;
    }
    let kinds: BTreeSet<&str> = insights.iter().map(|i| i.kind.as_str()).collect();
    let diversity = kinds.len() as f64 / insights.len() as f64;
    let high_confidence = insights
        .iter()
        .filter(|i| i.confidence >= HIGH_CONFIDENCE)
        .count() as f64
        / insights.len() as f64;
    (0.6 * diversity + 0.4 * high_confidence).clamp(0.0, 1.0)
}

/// Assemble the final results object attached to the escalation.
///
/// `reports` must contain one entry per dispatched worker, in dispatch order,
/// with `None` for workers that produced no result; the entries carry over
/// verbatim so joins stay complete.
pub fn build_results(
    context: &EscalationContext,
    strategy: Option<&DelegationStrategy>,
    reports: &[(WorkerId, Option<AnalysisResult>)],
    insights: Vec<Insight>,
) -> EscalationResults {
    let worker_reports: Vec<WorkerReportEntry> = reports
        .iter()
        .map(|(worker, result)| WorkerReportEntry {
            worker: worker.clone(),
            report: result.as_ref().map(WorkerReport::from_result),
        })
        .collect();

    let mut recommendations: Vec<String> = Vec::new();
    for (_, result) in reports {
        if let Some(result) = result {
            for rec in &result.recommendations {
                if !recommendations.contains(rec) {
                    recommendations.push(rec.clone());
                }
            }
        }
    }

    let succeeded = reports.iter().filter(|(_, r)| r.is_some()).count();
    let collaboration = strategy.map(|strategy| CollaborationBreakdown {
        primary: strategy.primary_worker.clone(),
        additional: strategy.additional_workers.clone(),
        pattern: strategy.pattern,
        worker_success_count: reports
            .iter()
            .filter(|(worker, result)| {
                result.is_some() && strategy.additional_workers.contains(worker)
            })
            .count(),
    });

    EscalationResults {
        summary: format!(
            "Deep analysis of `{}` finished: {} insights from {} crews ({} successful)",
            context.page,
            insights.len(),
            reports.len(),
            succeeded
        ),
        insights,
        recommendations,
        worker_reports,
        collaboration,
    }
}

fn insight(
    kind: &str,
    subject: &str,
    description: String,
    confidence: f64,
    metadata: Value,
) -> Insight {
    Insight {
        kind: kind.to_string(),
        subject: subject.to_string(),
        description,
        confidence: confidence.clamp(0.0, 1.0),
        metadata,
        timestamp: Utc::now(),
    }
}

/// Subject key of a finding: `subject`, `asset_id`, or `id`, first present.
fn finding_subject(finding: &Value) -> Option<&str> {
    ["subject", "asset_id", "id"]
        .iter()
        .find_map(|key| finding.get(*key).and_then(Value::as_str))
}

struct AssetIntelligence;

impl InsightExtractor for AssetIntelligence {
    fn extract(
        &self,
        worker: &str,
        result: &AnalysisResult,
        context: &EscalationContext,
    ) -> Vec<Insight> {
        let mut out = Vec::new();
        let unknown = result
            .metadata
            .get("unknown_devices")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if unknown > 0 {
            out.push(insight(
                "coverage_gap",
                &context.page,
                format!("{unknown} unknown devices detected in the inventory"),
                0.85,
                json!({"worker": worker, "unknown_devices": unknown}),
            ));
        }
        for finding in &result.findings {
            if finding.get("criticality").and_then(Value::as_str) == Some("high") {
                if let Some(subject) = finding_subject(finding) {
                    out.push(insight(
                        "critical_asset",
                        subject,
                        format!("Asset `{subject}` is classified as high criticality"),
                        0.8,
                        json!({"worker": worker}),
                    ));
                }
            }
        }
        out
    }
}

struct DependencyAnalysis;

impl InsightExtractor for DependencyAnalysis {
    fn extract(
        &self,
        worker: &str,
        result: &AnalysisResult,
        context: &EscalationContext,
    ) -> Vec<Insight> {
        let mut out = Vec::new();
        if result.metadata.get("complexity").and_then(Value::as_str) == Some("high") {
            out.push(insight(
                "high_complexity",
                &context.page,
                "Dependency graph complexity is high".to_string(),
                0.8,
                json!({"worker": worker}),
            ));
        }
        for finding in &result.findings {
            if finding
                .get("single_point_of_failure")
                .and_then(Value::as_bool)
                == Some(true)
            {
                if let Some(subject) = finding_subject(finding) {
                    out.push(insight(
                        "single_point_of_failure",
                        subject,
                        format!("`{subject}` is a single point of failure"),
                        0.9,
                        json!({"worker": worker}),
                    ));
                }
            }
        }
        out
    }
}

struct RiskAssessment;

impl InsightExtractor for RiskAssessment {
    fn extract(
        &self,
        worker: &str,
        result: &AnalysisResult,
        context: &EscalationContext,
    ) -> Vec<Insight> {
        let mut out = Vec::new();
        for finding in &result.findings {
            if finding.get("severity").and_then(Value::as_str) == Some("critical") {
                if let Some(subject) = finding_subject(finding) {
                    out.push(insight(
                        "critical_risk",
                        subject,
                        format!("Critical-severity risk reported for `{subject}`"),
                        0.9,
                        json!({"worker": worker}),
                    ));
                }
            }
        }
        if let Some(score) = result.metadata.get("risk_score").and_then(Value::as_f64) {
            if score > 0.7 {
                out.push(insight(
                    "elevated_risk",
                    &context.page,
                    format!("Overall risk score {score:.2} exceeds the 0.7 threshold"),
                    score,
                    json!({"worker": worker, "risk_score": score}),
                ));
            }
        }
        out
    }
}

struct ComplianceAudit;

impl InsightExtractor for ComplianceAudit {
    fn extract(
        &self,
        worker: &str,
        result: &AnalysisResult,
        _context: &EscalationContext,
    ) -> Vec<Insight> {
        result
            .findings
            .iter()
            .filter(|f| f.get("violation").and_then(Value::as_bool) == Some(true))
            .filter_map(|finding| {
                finding_subject(finding).map(|subject| {
                    let control = finding
                        .get("control")
                        .and_then(Value::as_str)
                        .unwrap_or("unspecified control");
                    insight(
                        "compliance_violation",
                        subject,
                        format!("`{subject}` violates {control}"),
                        0.85,
                        json!({"worker": worker, "control": control}),
                    )
                })
            })
            .collect()
    }
}

struct LifecyclePlanning;

impl InsightExtractor for LifecyclePlanning {
    fn extract(
        &self,
        worker: &str,
        result: &AnalysisResult,
        _context: &EscalationContext,
    ) -> Vec<Insight> {
        result
            .findings
            .iter()
            .filter(|f| f.get("end_of_life").and_then(Value::as_bool) == Some(true))
            .filter_map(|finding| {
                finding_subject(finding).map(|subject| {
                    insight(
                        "end_of_life_asset",
                        subject,
                        format!("`{subject}` has reached end of life"),
                        0.8,
                        json!({"worker": worker}),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::types::TriggerKind;

    fn context() -> EscalationContext {
        EscalationContext {
            page: "dependencies".into(),
            agent_id: "network_architecture_specialist".into(),
            trigger: TriggerKind::Think,
            flow_id: None,
            page_data: None,
        }
    }

    fn result(findings: Vec<Value>, metadata: Value, confidence: f64) -> AnalysisResult {
        AnalysisResult {
            success: true,
            summary: "test".into(),
            findings,
            recommendations: vec![],
            confidence,
            metadata,
        }
    }

    #[test]
    fn summary_insight_is_always_appended() {
        let set = ExtractorSet::default();
        let r = result(vec![], Value::Null, 0.6);
        let insights = set.extract("asset_intelligence_crew", Some(&r), &context());
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].kind, "crew_summary");
    }

    #[test]
    fn unknown_worker_still_gets_summary_insight() {
        let set = ExtractorSet::default();
        let r = result(vec![], Value::Null, 0.5);
        let insights = set.extract("mystery_crew", Some(&r), &context());
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].kind, "crew_summary");
    }

    #[test]
    fn missing_result_yields_failure_summary() {
        let set = ExtractorSet::default();
        let insights = set.extract("risk_assessment_crew", None, &context());
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].confidence, 0.0);
        assert_eq!(insights[0].metadata["success"], json!(false));
    }

    #[test]
    fn dependency_heuristics_fire_on_flags() {
        let set = ExtractorSet::default();
        let r = result(
            vec![json!({"subject": "plc-4", "single_point_of_failure": true})],
            json!({"complexity": "high"}),
            0.8,
        );
        let insights = set.extract("dependency_analysis_crew", Some(&r), &context());
        let kinds: Vec<&str> = insights.iter().map(|i| i.kind.as_str()).collect();
        assert!(kinds.contains(&"high_complexity"));
        assert!(kinds.contains(&"single_point_of_failure"));
        assert!(kinds.contains(&"crew_summary"));
    }

    #[test]
    fn risk_heuristics_fire_on_severity_and_score() {
        let set = ExtractorSet::default();
        let r = result(
            vec![json!({"subject": "plc-4", "severity": "critical"})],
            json!({"risk_score": 0.82}),
            0.9,
        );
        let insights = set.extract("risk_assessment_crew", Some(&r), &context());
        let kinds: Vec<&str> = insights.iter().map(|i| i.kind.as_str()).collect();
        assert!(kinds.contains(&"critical_risk"));
        assert!(kinds.contains(&"elevated_risk"));
    }

    #[test]
    fn shared_subject_across_crews_yields_cross_worker_insight() {
        let a = insight("critical_risk", "plc-4", "x".into(), 0.9, Value::Null);
        let b = insight("single_point_of_failure", "plc-4", "y".into(), 0.9, Value::Null);
        let per_worker = vec![
            ("risk_assessment_crew".to_string(), vec![a]),
            ("dependency_analysis_crew".to_string(), vec![b]),
        ];

        let synthesized = synthesize(&per_worker, "dependencies", 2, 2);
        let cross: Vec<&Insight> = synthesized
            .iter()
            .filter(|i| i.kind == "cross_worker_analysis")
            .collect();
        assert_eq!(cross.len(), 1);
        assert_eq!(cross[0].subject, "plc-4");
    }

    #[test]
    fn page_scoped_subjects_do_not_cross_workers() {
        // Page-level insights from different crews share the page as subject
        // but carry no entity overlap worth flagging.
        let a = insight("high_complexity", "dependencies", "x".into(), 0.8, Value::Null);
        let b = insight("elevated_risk", "dependencies", "y".into(), 0.82, Value::Null);
        let per_worker = vec![
            ("dependency_analysis_crew".to_string(), vec![a]),
            ("risk_assessment_crew".to_string(), vec![b]),
        ];

        let synthesized = synthesize(&per_worker, "dependencies", 2, 2);
        assert!(!synthesized
            .iter()
            .any(|i| i.kind == "cross_worker_analysis"));
    }

    #[test]
    fn collaboration_outcome_is_always_last() {
        let synthesized = synthesize(&[], "dependencies", 3, 1);
        let last = synthesized.last().unwrap();
        assert_eq!(last.kind, "collaboration_outcome");
        assert!(last.description.contains("1 of 3"));
        assert!(last.metadata.get("effectiveness").is_some());
    }

    #[test]
    fn effectiveness_rewards_diversity_and_confidence() {
        let uniform_low = vec![
            insight("a", "s", "d".into(), 0.2, Value::Null),
            insight("a", "s", "d".into(), 0.2, Value::Null),
        ];
        let diverse_high = vec![
            insight("a", "s", "d".into(), 0.9, Value::Null),
            insight("b", "s", "d".into(), 0.9, Value::Null),
        ];
        let low_refs: Vec<&Insight> = uniform_low.iter().collect();
        let high_refs: Vec<&Insight> = diverse_high.iter().collect();

        assert!(effectiveness(&high_refs) > effectiveness(&low_refs));
        assert_eq!(effectiveness(&[]), 0.0);
        // Fully diverse and fully high-confidence maxes out at 1.0.
        assert!((effectiveness(&high_refs) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn build_results_keeps_one_entry_per_worker() {
        let ctx = context();
        let reports = vec![
            (
                "risk_assessment_crew".to_string(),
                Some(result(vec![], Value::Null, 0.9)),
            ),
            ("compliance_audit_crew".to_string(), None),
        ];
        let results = build_results(&ctx, None, &reports, vec![]);

        assert_eq!(results.worker_reports.len(), 2);
        assert!(results.worker_reports[0].report.is_some());
        assert!(results.worker_reports[1].report.is_none());
        assert!(results.collaboration.is_none());
    }

    #[test]
    fn build_results_counts_additional_worker_successes() {
        let ctx = context();
        let strategy = DelegationStrategy {
            primary_worker: "asset_intelligence_crew".into(),
            additional_workers: vec![
                "risk_assessment_crew".into(),
                "compliance_audit_crew".into(),
            ],
            pattern: crate::escalation::types::DelegationPattern::Parallel,
            expected_outcomes: vec!["x".into()],
            resource_estimate: crate::escalation::types::ResourceEstimate {
                cpu_units: 3,
                memory_mb: 1536,
                tier: crate::escalation::types::ResourceTier::Standard,
            },
            duration_minutes: 9,
        };
        let reports = vec![
            (
                "asset_intelligence_crew".to_string(),
                Some(result(vec![], Value::Null, 0.8)),
            ),
            (
                "risk_assessment_crew".to_string(),
                Some(result(vec![], Value::Null, 0.9)),
            ),
            ("compliance_audit_crew".to_string(), None),
        ];

        let results = build_results(&ctx, Some(&strategy), &reports, vec![]);
        let collab = results.collaboration.unwrap();
        // The primary's success does not count toward the additional-worker tally.
        assert_eq!(collab.worker_success_count, 1);
        assert_eq!(collab.additional.len(), 2);
    }
}
