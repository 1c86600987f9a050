//! Policy manager: turns a (page, agent, collaboration mode) triple into a
//! delegation strategy -- primary crew, additional crews, pattern, expected
//! outcomes, and coarse resource/duration estimates.

use super::trigger::{self, KNOWN_WORKERS};
use super::types::{
    CollaborationMode, DelegationPattern, DelegationStrategy, ResourceEstimate, ResourceTier,
};
use crate::config::OrchestratorConfig;
use crate::error::ValidationError;
use crate::worker::WorkerId;

/// Build a delegation strategy for a collaborative escalation.
///
/// The primary crew comes from the trigger manager's tables; additional crews
/// come from the per-mode selection tables. The primary is always filtered
/// out of the additional list, so `validate_strategy`'s primary-overlap check
/// holds by construction.
pub fn build_strategy(
    page: &str,
    agent_id: &str,
    mode: CollaborationMode,
    config: &OrchestratorConfig,
) -> DelegationStrategy {
    let primary = trigger::select_worker(page, agent_id);
    let additional = additional_workers(page, &primary, mode);
    let pattern = pattern_for(mode);

    let total_workers = 1 + additional.len();
    let tier = if total_workers > config.worker_ceiling {
        tracing::warn!(
            page,
            mode = ?mode,
            total_workers,
            ceiling = config.worker_ceiling,
            "strategy exceeds worker ceiling; allowing at elevated tier"
        );
        ResourceTier::Elevated
    } else {
        ResourceTier::Standard
    };

    DelegationStrategy {
        primary_worker: primary,
        pattern,
        expected_outcomes: expected_outcomes(mode),
        resource_estimate: ResourceEstimate {
            cpu_units: config.per_worker_cpu_units * total_workers as u32,
            memory_mb: config.per_worker_memory_mb * total_workers as u32,
            tier,
        },
        duration_minutes: base_minutes(mode, config) + 2 * additional.len() as u32,
        additional_workers: additional,
    }
}

/// Validate a delegation strategy before acceptance.
///
/// Rejects a primary that reappears in the additional list and strategies
/// with missing required fields. Worker-count overflow is not rejected here;
/// it is surfaced as the `Elevated` resource tier at build time.
pub fn validate_strategy(strategy: &DelegationStrategy) -> Result<(), ValidationError> {
    if strategy.primary_worker.is_empty() {
        return Err(ValidationError::MissingField("primary_worker"));
    }
    if strategy.expected_outcomes.is_empty() {
        return Err(ValidationError::MissingField("expected_outcomes"));
    }
    if strategy
        .additional_workers
        .contains(&strategy.primary_worker)
    {
        return Err(ValidationError::PrimaryInAdditional {
            worker: strategy.primary_worker.clone(),
        });
    }
    Ok(())
}

fn pattern_for(mode: CollaborationMode) -> DelegationPattern {
    match mode {
        CollaborationMode::CrossAgent => DelegationPattern::Parallel,
        CollaborationMode::ExpertPanel => DelegationPattern::Sequential,
        CollaborationMode::FullCrew => DelegationPattern::Hierarchical,
    }
}

fn base_minutes(mode: CollaborationMode, config: &OrchestratorConfig) -> u32 {
    match mode {
        CollaborationMode::CrossAgent => config.base_minutes_cross_agent,
        CollaborationMode::ExpertPanel => config.base_minutes_expert_panel,
        CollaborationMode::FullCrew => config.base_minutes_full_crew,
    }
}

fn expected_outcomes(mode: CollaborationMode) -> Vec<String> {
    let outcomes: &[&str] = match mode {
        CollaborationMode::CrossAgent => &["shared_context_analysis", "complementary_findings"],
        CollaborationMode::ExpertPanel => {
            &["independent_expert_review", "consensus_recommendations"]
        }
        CollaborationMode::FullCrew => &[
            "comprehensive_assessment",
            "cross_domain_synthesis",
            "prioritized_action_plan",
        ],
    };
    outcomes.iter().map(|s| s.to_string()).collect()
}

fn additional_workers(page: &str, primary: &str, mode: CollaborationMode) -> Vec<WorkerId> {
    match mode {
        // 0-1 complementary crew from the fixed adjacency table.
        CollaborationMode::CrossAgent => complementary_worker(primary)
            .filter(|w| *w != primary)
            .map(|w| vec![w.to_string()])
            .unwrap_or_default(),
        // Two complementary crews for the page, backfilled from the known set
        // when the page panel collides with the primary.
        CollaborationMode::ExpertPanel => {
            let mut panel: Vec<WorkerId> = page_panel(page)
                .iter()
                .filter(|w| **w != primary)
                .map(|w| w.to_string())
                .collect();
            for candidate in KNOWN_WORKERS {
                if panel.len() >= 2 {
                    break;
                }
                if candidate != primary && !panel.iter().any(|w| w == candidate) {
                    panel.push(candidate.to_string());
                }
            }
            panel.truncate(2);
            panel
        }
        // Everyone except the primary.
        CollaborationMode::FullCrew => KNOWN_WORKERS
            .iter()
            .filter(|w| **w != primary)
            .map(|w| w.to_string())
            .collect(),
    }
}

/// Fixed crew adjacency for cross-agent collaboration.
fn complementary_worker(primary: &str) -> Option<&'static str> {
    match primary {
        "asset_intelligence_crew" => Some("dependency_analysis_crew"),
        "dependency_analysis_crew" => Some("asset_intelligence_crew"),
        "risk_assessment_crew" => Some("compliance_audit_crew"),
        "compliance_audit_crew" => Some("risk_assessment_crew"),
        "lifecycle_planning_crew" => Some("asset_intelligence_crew"),
        _ => None,
    }
}

/// Two complementary crews per page for expert-panel collaboration.
fn page_panel(page: &str) -> [&'static str; 2] {
    match page {
        "asset_inventory" => ["dependency_analysis_crew", "risk_assessment_crew"],
        "dependencies" => ["asset_intelligence_crew", "risk_assessment_crew"],
        "risk_register" => ["compliance_audit_crew", "dependency_analysis_crew"],
        "compliance" => ["risk_assessment_crew", "asset_intelligence_crew"],
        "lifecycle" => ["asset_intelligence_crew", "risk_assessment_crew"],
        _ => ["asset_intelligence_crew", "risk_assessment_crew"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;

    fn config() -> OrchestratorConfig {
        OrchestratorConfig::default()
    }

    #[test]
    fn full_crew_is_hierarchical_with_everyone_but_primary() {
        let strategy = build_strategy(
            "asset_inventory",
            "asset_intelligence_specialist",
            CollaborationMode::FullCrew,
            &config(),
        );

        assert_eq!(strategy.primary_worker, "asset_intelligence_crew");
        assert_eq!(strategy.pattern, DelegationPattern::Hierarchical);
        assert_eq!(strategy.additional_workers.len(), KNOWN_WORKERS.len() - 1);
        assert!(!strategy
            .additional_workers
            .contains(&strategy.primary_worker));
    }

    #[test]
    fn expert_panel_is_sequential_with_two_workers() {
        let strategy = build_strategy(
            "dependencies",
            "network_architecture_specialist",
            CollaborationMode::ExpertPanel,
            &config(),
        );

        assert_eq!(strategy.pattern, DelegationPattern::Sequential);
        assert_eq!(strategy.additional_workers.len(), 2);
        assert!(!strategy
            .additional_workers
            .contains(&strategy.primary_worker));
    }

    #[test]
    fn expert_panel_backfills_when_panel_collides_with_primary() {
        // risk_analyst on asset_inventory maps to risk_assessment_crew, which
        // is also in the asset_inventory panel.
        let strategy = build_strategy(
            "asset_inventory",
            "risk_analyst",
            CollaborationMode::ExpertPanel,
            &config(),
        );

        assert_eq!(strategy.primary_worker, "risk_assessment_crew");
        assert_eq!(strategy.additional_workers.len(), 2);
        assert!(!strategy
            .additional_workers
            .contains(&strategy.primary_worker));
    }

    #[test]
    fn cross_agent_is_parallel_with_at_most_one_worker() {
        let strategy = build_strategy(
            "risk_register",
            "risk_analyst",
            CollaborationMode::CrossAgent,
            &config(),
        );

        assert_eq!(strategy.pattern, DelegationPattern::Parallel);
        assert_eq!(strategy.additional_workers, vec!["compliance_audit_crew"]);
    }

    #[test]
    fn cross_agent_with_fallback_primary_has_no_additional_workers() {
        let strategy = build_strategy(
            "unknown_page",
            "unknown_agent",
            CollaborationMode::CrossAgent,
            &config(),
        );

        assert_eq!(strategy.primary_worker, trigger::FALLBACK_WORKER);
        assert!(strategy.additional_workers.is_empty());
    }

    #[test]
    fn duration_is_base_plus_two_per_additional_worker() {
        let cfg = config();
        let strategy = build_strategy(
            "asset_inventory",
            "asset_intelligence_specialist",
            CollaborationMode::FullCrew,
            &cfg,
        );

        let expected = cfg.base_minutes_full_crew + 2 * strategy.additional_workers.len() as u32;
        assert_eq!(strategy.duration_minutes, expected);
    }

    #[test]
    fn resource_estimate_is_linear_in_worker_count() {
        let cfg = config();
        let strategy = build_strategy(
            "dependencies",
            "network_architecture_specialist",
            CollaborationMode::ExpertPanel,
            &cfg,
        );

        // primary + 2 additional
        assert_eq!(strategy.resource_estimate.cpu_units, cfg.per_worker_cpu_units * 3);
        assert_eq!(strategy.resource_estimate.memory_mb, cfg.per_worker_memory_mb * 3);
        assert_eq!(strategy.resource_estimate.tier, ResourceTier::Standard);
    }

    #[test]
    fn ceiling_overflow_is_allowed_at_elevated_tier() {
        let mut cfg = config();
        cfg.worker_ceiling = 2;
        let strategy = build_strategy(
            "asset_inventory",
            "asset_intelligence_specialist",
            CollaborationMode::FullCrew,
            &cfg,
        );

        assert_eq!(strategy.resource_estimate.tier, ResourceTier::Elevated);
        assert!(validate_strategy(&strategy).is_ok());
    }

    #[test]
    fn validate_rejects_primary_in_additional() {
        let mut strategy = build_strategy(
            "dependencies",
            "network_architecture_specialist",
            CollaborationMode::ExpertPanel,
            &config(),
        );
        strategy
            .additional_workers
            .push(strategy.primary_worker.clone());

        let err = validate_strategy(&strategy).unwrap_err();
        assert!(matches!(err, ValidationError::PrimaryInAdditional { .. }));
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let mut strategy = build_strategy(
            "dependencies",
            "network_architecture_specialist",
            CollaborationMode::CrossAgent,
            &config(),
        );
        strategy.expected_outcomes.clear();
        assert!(matches!(
            validate_strategy(&strategy),
            Err(ValidationError::MissingField("expected_outcomes"))
        ));
    }
}
