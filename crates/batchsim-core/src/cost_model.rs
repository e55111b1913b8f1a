//! Batch execution cost model.
//!
//! Maps the composition of a dispatched batch to its processing duration.
//! The engine only sees the [`CostModel`] trait, so the linear fit below can
//! be swapped for any other function of batch composition.

use batchsim_policies::{BatchEntry, StepKind};
use serde::{Deserialize, Serialize};

/// Duration of one batch as a function of its entries.
pub trait CostModel: Send + Sync {
    /// Processing time of `entries` in simulation time units.
    fn batch_duration(&self, entries: &[BatchEntry]) -> f64;

    fn name(&self) -> &str;
}

/// Linear latency model:
///
/// ```text
/// duration = ((c1 * avg_context + c2) * batch_size + c3 + c4 * prompt_tokens) / scale
/// ```
///
/// `avg_context` averages every entry's context length (prompt entries
/// contribute 0); `prompt_tokens` sums input sizes over prompt entries only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearCostModel {
    /// c1: cost per unit of average context length, per entry.
    pub context_coeff: f64,
    /// c2: fixed cost per entry.
    pub per_entry: f64,
    /// c3: fixed cost per batch.
    pub fixed: f64,
    /// c4: cost per prompt token.
    pub prompt_token: f64,
    pub scale: f64,
}

impl LinearCostModel {
    /// Duration from already-aggregated batch statistics.
    pub fn duration(
        &self,
        batch_size: usize,
        average_context_length: f64,
        total_input_tokens: u64,
    ) -> f64 {
        let per_entry = self.context_coeff * average_context_length + self.per_entry;
        (per_entry * batch_size as f64 + self.fixed + self.prompt_token * total_input_tokens as f64)
            / self.scale
    }
}

impl Default for LinearCostModel {
    fn default() -> Self {
        Self {
            context_coeff: 0.0027,
            per_entry: 0.52,
            fixed: 44.6,
            prompt_token: 0.378,
            scale: 1000.0,
        }
    }
}

impl CostModel for LinearCostModel {
    fn batch_duration(&self, entries: &[BatchEntry]) -> f64 {
        if entries.is_empty() {
            return 0.0;
        }
        let total_context: u64 = entries.iter().map(|e| e.context_length as u64).sum();
        let total_input: u64 = entries
            .iter()
            .filter(|e| e.kind == StepKind::Prompt)
            .map(|e| e.prompt_tokens as u64)
            .sum();
        let average_context = total_context as f64 / entries.len() as f64;
        self.duration(entries.len(), average_context, total_input)
    }

    fn name(&self) -> &str {
        "linear"
    }
}
