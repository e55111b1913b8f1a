//! TOML configuration parsing for batchsim.
//!
//! Defines the complete configuration schema for simulation runs: memory
//! capacity, cost model coefficients, policy selection and its knobs, and
//! diagnostics.

use crate::cost_model::LinearCostModel;
use batchsim_policies::PolicyParams;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub simulation: SimulationSection,
    pub memory: MemorySection,
    #[serde(default)]
    pub cost_model: CostModelSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub diagnostics: DiagnosticsSection,
}

/// General simulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSection {
    /// Human-readable name for this simulation.
    #[serde(default = "default_sim_name")]
    pub name: String,
    /// Random seed for eviction decisions.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Stop the simulation once the clock reaches this time.
    #[serde(default)]
    pub time_limit: Option<f64>,
}

fn default_sim_name() -> String {
    "simulation".to_string()
}

fn default_seed() -> u64 {
    42
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            name: default_sim_name(),
            seed: default_seed(),
            time_limit: None,
        }
    }
}

/// Memory model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySection {
    /// Capacity M shared by all running jobs.
    pub capacity: f64,
    /// Base overhead `s` the oracle charges every active job.
    #[serde(default)]
    pub prompt_overhead: f64,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            capacity: 16492.0,
            prompt_overhead: 0.0,
        }
    }
}

/// Linear batch latency model coefficients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostModelSection {
    #[serde(default = "default_context_coeff")]
    pub context_coeff: f64,
    #[serde(default = "default_per_entry")]
    pub per_entry: f64,
    #[serde(default = "default_fixed")]
    pub fixed: f64,
    #[serde(default = "default_prompt_token")]
    pub prompt_token: f64,
    /// Divisor applied to the linear sum (ms to s by default).
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_context_coeff() -> f64 {
    0.0027
}
fn default_per_entry() -> f64 {
    0.52
}
fn default_fixed() -> f64 {
    44.6
}
fn default_prompt_token() -> f64 {
    0.378
}
fn default_scale() -> f64 {
    1000.0
}

impl Default for CostModelSection {
    fn default() -> Self {
        Self {
            context_coeff: default_context_coeff(),
            per_entry: default_per_entry(),
            fixed: default_fixed(),
            prompt_token: default_prompt_token(),
            scale: default_scale(),
        }
    }
}

impl From<CostModelSection> for LinearCostModel {
    fn from(s: CostModelSection) -> Self {
        LinearCostModel {
            context_coeff: s.context_coeff,
            per_entry: s.per_entry,
            fixed: s.fixed,
            prompt_token: s.prompt_token,
            scale: s.scale,
        }
    }
}

/// Policy selection and knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySection {
    /// "fcfs", "sjf" or "threshold".
    #[serde(default = "default_policy_name")]
    pub name: String,
    /// Threshold: fraction of capacity reserved for running jobs to grow.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Threshold: per-job eviction probability on overflow.
    #[serde(default = "default_beta")]
    pub beta: f64,
    /// Threshold: maximum entries per batch.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Threshold: also run the feasibility oracle for each admission.
    #[serde(default = "default_admission_check")]
    pub admission_check: bool,
    /// Clock advance between eviction rounds while still over capacity.
    #[serde(default = "default_overflow_backoff")]
    pub overflow_backoff: f64,
}

fn default_policy_name() -> String {
    "fcfs".to_string()
}
fn default_alpha() -> f64 {
    0.1
}
fn default_beta() -> f64 {
    0.1
}
fn default_max_batch_size() -> usize {
    256
}
fn default_admission_check() -> bool {
    true
}
fn default_overflow_backoff() -> f64 {
    1.0
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            name: default_policy_name(),
            alpha: default_alpha(),
            beta: default_beta(),
            max_batch_size: default_max_batch_size(),
            admission_check: default_admission_check(),
            overflow_backoff: default_overflow_backoff(),
        }
    }
}

/// Diagnostics that observe the run without changing decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsSection {
    /// Cross-check each admission with the average-batch-time projection.
    #[serde(default = "default_projection_check")]
    pub projection_check: bool,
    /// External average batch time estimate for the projection.
    #[serde(default)]
    pub average_batch_time: Option<f64>,
}

fn default_projection_check() -> bool {
    true
}

impl Default for DiagnosticsSection {
    fn default() -> Self {
        Self {
            projection_check: default_projection_check(),
            average_batch_time: None,
        }
    }
}

impl SimConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Validation(msg));

        let capacity = self.memory.capacity;
        if !capacity.is_finite() || capacity <= 0.0 {
            return invalid(format!("memory.capacity must be > 0, got {}", capacity));
        }
        let overhead = self.memory.prompt_overhead;
        if !overhead.is_finite() || overhead < 0.0 {
            return invalid(format!(
                "memory.prompt_overhead must be >= 0, got {}",
                overhead
            ));
        }
        if let Some(limit) = self.simulation.time_limit {
            if !limit.is_finite() || limit <= 0.0 {
                return invalid(format!("simulation.time_limit must be > 0, got {}", limit));
            }
        }

        let cm = &self.cost_model;
        for (name, value) in [
            ("context_coeff", cm.context_coeff),
            ("per_entry", cm.per_entry),
            ("fixed", cm.fixed),
            ("prompt_token", cm.prompt_token),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("cost_model.{} must be >= 0, got {}", name, value));
            }
        }
        if !cm.scale.is_finite() || cm.scale <= 0.0 {
            return invalid(format!("cost_model.scale must be > 0, got {}", cm.scale));
        }
        if cm.fixed + cm.per_entry <= 0.0 {
            return invalid("cost_model must give every batch a positive duration".to_string());
        }

        let policy = &self.policy;
        if !batchsim_policies::available_policies().contains(&policy.name.as_str()) {
            return invalid(format!(
                "Unknown policy '{}'. Available: {:?}",
                policy.name,
                batchsim_policies::available_policies()
            ));
        }
        if !(policy.alpha > 0.0 && policy.alpha < 1.0) {
            return invalid(format!("policy.alpha must be in (0, 1), got {}", policy.alpha));
        }
        if !(policy.beta > 0.0 && policy.beta <= 1.0) {
            return invalid(format!("policy.beta must be in (0, 1], got {}", policy.beta));
        }
        if policy.max_batch_size == 0 {
            return invalid("policy.max_batch_size must be > 0".to_string());
        }
        if !policy.overflow_backoff.is_finite() || policy.overflow_backoff <= 0.0 {
            return invalid(format!(
                "policy.overflow_backoff must be > 0, got {}",
                policy.overflow_backoff
            ));
        }
        if policy.name == "threshold" && self.simulation.time_limit.is_none() {
            return invalid(
                "the threshold policy requires simulation.time_limit to bound eviction cycles"
                    .to_string(),
            );
        }

        if let Some(avg) = self.diagnostics.average_batch_time {
            if !avg.is_finite() || avg <= 0.0 {
                return invalid(format!(
                    "diagnostics.average_batch_time must be > 0, got {}",
                    avg
                ));
            }
        }
        Ok(())
    }

    /// Knobs forwarded to the policy registry.
    pub fn policy_params(&self) -> PolicyParams {
        PolicyParams {
            alpha: self.policy.alpha,
            max_batch_size: self.policy.max_batch_size,
            admission_check: self.policy.admission_check,
        }
    }

    /// Convert the cost model section to the engine's cost model.
    pub fn cost_model(&self) -> LinearCostModel {
        self.cost_model.clone().into()
    }

    /// Copy of this config with a different policy selected.
    pub fn with_policy(&self, name: &str) -> Self {
        let mut config = self.clone();
        config.policy.name = name.to_string();
        config
    }
}
