//! Randomized overflow control for evicting policies.
//!
//! When realized memory exceeds capacity, every running job is independently
//! evicted with probability `beta`. The engine repeats eviction rounds,
//! advancing the clock by `backoff` between rounds, until usage is back under
//! capacity or the time limit is reached. Victims are drawn in id order from
//! an injected seeded generator, so runs are reproducible.

use crate::arena::JobArena;
use crate::job::JobError;
use batchsim_policies::JobId;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone)]
pub struct OverflowController {
    beta: f64,
    backoff: f64,
    rng: ChaCha8Rng,
    evictions: u64,
    rounds: u64,
}

impl OverflowController {
    pub fn new(beta: f64, backoff: f64, rng: ChaCha8Rng) -> Self {
        Self {
            beta,
            backoff,
            rng,
            evictions: 0,
            rounds: 0,
        }
    }

    /// Controller with a generator seeded from `seed`.
    pub fn seeded(beta: f64, backoff: f64, seed: u64) -> Self {
        Self::new(beta, backoff, ChaCha8Rng::seed_from_u64(seed))
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Clock advance between rounds that leave usage over capacity.
    pub fn backoff(&self) -> f64 {
        self.backoff
    }

    /// Total jobs evicted so far.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Total eviction rounds run so far.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// One eviction round over the current running set. Returns the victims.
    pub fn evict_round(&mut self, arena: &mut JobArena) -> Result<Vec<JobId>, JobError> {
        self.rounds += 1;
        let mut victims = Vec::new();
        for id in arena.running_ids() {
            if self.rng.gen::<f64>() < self.beta {
                arena.evict(id)?;
                victims.push(id);
            }
        }
        self.evictions += victims.len() as u64;
        tracing::debug!(
            evicted = victims.len(),
            memory = arena.memory_in_use(),
            "eviction round"
        );
        Ok(victims)
    }
}
