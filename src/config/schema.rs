use serde::Deserialize;

/// The TOML file structure for crewflow.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub orchestrator: Option<OrchestratorSection>,
    pub estimates: Option<EstimatesSection>,
    pub demo: Option<DemoSection>,
}

#[derive(Debug, Deserialize)]
pub struct OrchestratorSection {
    pub worker_ceiling: Option<usize>,
    pub retention_secs: Option<u64>,
    pub sequential_pause_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct EstimatesSection {
    pub per_worker_cpu_units: Option<u32>,
    pub per_worker_memory_mb: Option<u32>,
    pub base_minutes_cross_agent: Option<u32>,
    pub base_minutes_expert_panel: Option<u32>,
    pub base_minutes_full_crew: Option<u32>,
    pub single_estimate_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DemoSection {
    pub simulated_latency_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

impl ConfigFile {
    pub fn to_partial(self) -> PartialConfig {
        let orchestrator = self.orchestrator;
        let estimates = self.estimates;
        let demo = self.demo;
        PartialConfig {
            worker_ceiling: orchestrator.as_ref().and_then(|s| s.worker_ceiling),
            retention_secs: orchestrator.as_ref().and_then(|s| s.retention_secs),
            sequential_pause_ms: orchestrator.as_ref().and_then(|s| s.sequential_pause_ms),
            per_worker_cpu_units: estimates.as_ref().and_then(|s| s.per_worker_cpu_units),
            per_worker_memory_mb: estimates.as_ref().and_then(|s| s.per_worker_memory_mb),
            base_minutes_cross_agent: estimates.as_ref().and_then(|s| s.base_minutes_cross_agent),
            base_minutes_expert_panel: estimates.as_ref().and_then(|s| s.base_minutes_expert_panel),
            base_minutes_full_crew: estimates.as_ref().and_then(|s| s.base_minutes_full_crew),
            single_estimate_minutes: estimates.as_ref().and_then(|s| s.single_estimate_minutes),
            simulated_latency_ms: demo.as_ref().and_then(|s| s.simulated_latency_ms),
            poll_interval_ms: demo.as_ref().and_then(|s| s.poll_interval_ms),
        }
    }
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Combined worker count above which a strategy is surfaced at the
    /// elevated resource tier (still allowed).
    pub worker_ceiling: usize,
    /// How long terminal escalations stay in the registry before cleanup.
    pub retention_secs: u64,
    /// Courtesy pause between sequential delegation steps.
    pub sequential_pause_ms: u64,
    pub per_worker_cpu_units: u32,
    pub per_worker_memory_mb: u32,
    pub base_minutes_cross_agent: u32,
    pub base_minutes_expert_panel: u32,
    pub base_minutes_full_crew: u32,
    /// Advisory completion estimate for single-worker escalations.
    pub single_estimate_minutes: u32,
    /// Latency of the simulated crews used by the demo binary.
    pub simulated_latency_ms: u64,
    /// Status poll interval of the demo binary.
    pub poll_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        PartialConfig::default().finalize()
    }
}

/// Partial config used during merge. All fields are Option so that missing
/// fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub worker_ceiling: Option<usize>,
    pub retention_secs: Option<u64>,
    pub sequential_pause_ms: Option<u64>,
    pub per_worker_cpu_units: Option<u32>,
    pub per_worker_memory_mb: Option<u32>,
    pub base_minutes_cross_agent: Option<u32>,
    pub base_minutes_expert_panel: Option<u32>,
    pub base_minutes_full_crew: Option<u32>,
    pub single_estimate_minutes: Option<u32>,
    pub simulated_latency_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}
