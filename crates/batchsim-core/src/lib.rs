//! batchsim: discrete-event simulator for memory-constrained batch scheduling.
//!
//! This crate provides the engine that models a single serialized execution
//! resource, a shared memory pool of capacity `M`, and jobs made of one
//! prompt step followed by unit token steps. Batch formation policies from
//! `batchsim-policies` decide what runs in each batch.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐     ┌───────────┐     ┌──────────────┐
//! │ Workload │────▶│  Engine   │────▶│   Metrics    │
//! │  (JSONL) │     │ (Events)  │     │  Collection  │
//! └──────────┘     └─────┬─────┘     └──────────────┘
//!                        │
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!    ┌──────────┐  ┌──────────┐  ┌──────────┐
//!    │  Policy  │  │   Cost   │  │ Overflow │
//!    │ + Oracle │  │  Model   │  │ Control  │
//!    └──────────┘  └──────────┘  └──────────┘
//!                        │
//!                  ┌─────┴─────┐
//!                  │ Job Arena │
//!                  └───────────┘
//! ```

pub mod arena;
pub mod clock;
pub mod config;
pub mod cost_model;
pub mod engine;
pub mod hindsight;
pub mod job;
pub mod metrics;
pub mod overflow;
pub mod projection;
pub mod semi_online;
pub mod workload;

// Re-export key types for convenience.
pub use arena::JobArena;
pub use clock::SimClock;
pub use config::{ConfigError, SimConfig};
pub use cost_model::{CostModel, LinearCostModel};
pub use engine::{SimError, SimEvent, SimulationEngine};
pub use hindsight::{
    compare_with_hindsight, Assignment, HindsightComparison, HindsightError, HindsightProblem,
    HindsightSolver,
};
pub use job::{Job, JobError, JobPhase, JobSpec};
pub use metrics::{JobOutcome, MetricsCollector, SimulationReport};
pub use overflow::OverflowController;
pub use projection::ProjectionCheck;
pub use semi_online::{schedule_semi_online, SemiOnlineBaseline};
pub use workload::{load_jobs, write_jobs_jsonl, SyntheticWorkload, WorkloadError};

use batchsim_policies::BatchPolicy;

/// Build the policy selected by `config.policy.name`.
pub fn policy_from_config(config: &SimConfig) -> Result<Box<dyn BatchPolicy>, SimError> {
    batchsim_policies::policy_by_name(&config.policy.name, &config.policy_params())
        .ok_or_else(|| SimError::UnknownPolicy(config.policy.name.clone()))
}

/// Run a complete simulation with the given config, jobs, and policy.
pub fn run_simulation(
    config: SimConfig,
    jobs: Vec<JobSpec>,
    policy: Box<dyn BatchPolicy>,
) -> Result<SimulationReport, SimError> {
    let mut engine = SimulationEngine::new(config, policy)?;
    engine.load_jobs(jobs)?;
    engine.run()
}

/// Run each named policy on its own engine over the same jobs and config.
pub fn compare_policies(
    config: &SimConfig,
    jobs: &[JobSpec],
    policy_names: &[&str],
) -> Result<Vec<SimulationReport>, SimError> {
    policy_names
        .iter()
        .map(|name| {
            let cfg = config.with_policy(name);
            let policy = policy_from_config(&cfg)?;
            run_simulation(cfg, jobs.to_vec(), policy)
        })
        .collect()
}
