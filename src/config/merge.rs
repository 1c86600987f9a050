use super::schema::{OrchestratorConfig, PartialConfig};

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            worker_ceiling: self.worker_ceiling.or(fallback.worker_ceiling),
            retention_secs: self.retention_secs.or(fallback.retention_secs),
            sequential_pause_ms: self.sequential_pause_ms.or(fallback.sequential_pause_ms),
            per_worker_cpu_units: self.per_worker_cpu_units.or(fallback.per_worker_cpu_units),
            per_worker_memory_mb: self.per_worker_memory_mb.or(fallback.per_worker_memory_mb),
            base_minutes_cross_agent: self
                .base_minutes_cross_agent
                .or(fallback.base_minutes_cross_agent),
            base_minutes_expert_panel: self
                .base_minutes_expert_panel
                .or(fallback.base_minutes_expert_panel),
            base_minutes_full_crew: self
                .base_minutes_full_crew
                .or(fallback.base_minutes_full_crew),
            single_estimate_minutes: self
                .single_estimate_minutes
                .or(fallback.single_estimate_minutes),
            simulated_latency_ms: self.simulated_latency_ms.or(fallback.simulated_latency_ms),
            poll_interval_ms: self.poll_interval_ms.or(fallback.poll_interval_ms),
        }
    }

    /// Convert to OrchestratorConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> OrchestratorConfig {
        OrchestratorConfig {
            worker_ceiling: self.worker_ceiling.unwrap_or(4),
            retention_secs: self.retention_secs.unwrap_or(3600),
            sequential_pause_ms: self.sequential_pause_ms.unwrap_or(50),
            per_worker_cpu_units: self.per_worker_cpu_units.unwrap_or(1),
            per_worker_memory_mb: self.per_worker_memory_mb.unwrap_or(512),
            base_minutes_cross_agent: self.base_minutes_cross_agent.unwrap_or(5),
            base_minutes_expert_panel: self.base_minutes_expert_panel.unwrap_or(10),
            base_minutes_full_crew: self.base_minutes_full_crew.unwrap_or(15),
            single_estimate_minutes: self.single_estimate_minutes.unwrap_or(5),
            simulated_latency_ms: self.simulated_latency_ms.unwrap_or(25),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(200),
        }
    }
}
