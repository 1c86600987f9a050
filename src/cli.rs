use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::PartialConfig;

#[derive(Parser, Debug)]
#[command(name = "crewflow", version, about = "Escalation orchestrator for analysis crews")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single-worker escalation against one page
    Run {
        /// Page under analysis (e.g. "dependencies", "risk_register")
        #[arg(short, long)]
        page: String,

        /// Agent requesting the escalation (e.g. "network_architecture_specialist")
        #[arg(short, long)]
        agent: String,

        /// Trigger phrase: "think", "ponder_more", "automatic", or "manual"
        #[arg(short, long, default_value = "think")]
        trigger: String,

        /// Flow id to group related escalations under
        #[arg(long)]
        flow: Option<String>,

        /// Page payload as inline JSON
        #[arg(long)]
        data: Option<String>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Run a collaborative escalation across multiple crews
    Collab {
        /// Page under analysis
        #[arg(short, long)]
        page: String,

        /// Primary agent for the collaboration
        #[arg(short, long)]
        agent: String,

        /// Collaboration mode: "cross_agent", "expert_panel", or "full_crew"
        #[arg(short, long, default_value = "expert_panel")]
        mode: String,

        /// Flow id to group related escalations under
        #[arg(long)]
        flow: Option<String>,

        /// Page payload as inline JSON
        #[arg(long)]
        data: Option<String>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(clap::Args, Debug)]
pub struct CommonArgs {
    /// Path to config file (overrides default search)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Simulated crew latency in milliseconds
    #[arg(long)]
    pub latency_ms: Option<u64>,

    /// Status poll interval in milliseconds
    #[arg(long)]
    pub poll_ms: Option<u64>,
}

impl CommonArgs {
    pub fn overrides(&self) -> PartialConfig {
        PartialConfig {
            simulated_latency_ms: self.latency_ms,
            poll_interval_ms: self.poll_ms,
            ..Default::default()
        }
    }
}
