//! Built-in batch formation policies for batchsim.
//!
//! This crate provides the [`BatchPolicy`] trait, the exact critical-point
//! [`FeasibilityOracle`] used for admission control, and the built-in
//! policies:
//!
//! | Policy | Waiting order | Admission rule |
//! |--------|---------------|----------------|
//! | [`Fcfs`] | Arrival time | Oracle, stop at first rejection |
//! | [`Sjf`] | Output size | Oracle, stop at first rejection |
//! | [`Threshold`] | Arrival time | Alpha headroom + batch cap, evict on overflow |

pub mod fcfs;
pub mod oracle;
pub mod sjf;
pub mod threshold;
pub mod traits;

pub use fcfs::Fcfs;
pub use oracle::{FeasibilityOracle, Span, UsagePoint};
pub use sjf::Sjf;
pub use threshold::Threshold;
pub use traits::*;

/// Knobs needed to build a policy by name.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyParams {
    pub alpha: f64,
    pub max_batch_size: usize,
    pub admission_check: bool,
}

impl Default for PolicyParams {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            max_batch_size: 256,
            admission_check: true,
        }
    }
}

/// Create a batch formation policy by name.
pub fn policy_by_name(name: &str, params: &PolicyParams) -> Option<Box<dyn BatchPolicy>> {
    match name {
        "fcfs" => Some(Box::new(Fcfs::new())),
        "sjf" => Some(Box::new(Sjf::new())),
        "threshold" => Some(Box::new(Threshold::new(
            params.alpha,
            params.max_batch_size,
            params.admission_check,
        ))),
        _ => None,
    }
}

/// List all available built-in policy names.
pub fn available_policies() -> Vec<&'static str> {
    vec!["fcfs", "sjf", "threshold"]
}
