//! Exact memory feasibility oracle based on critical points.
//!
//! Each active job contributes `base + (x - start)` to memory at every instant
//! `x` in `[start, start + length]` and nothing afterwards. A job's
//! contribution only grows while it is active and drops to zero right after
//! its end, so the aggregate reaches its supremum at one of the end points.
//! Checking the sorted set of end points (the *critical points*) is therefore
//! both sufficient and exact.
//!
//! Evaluation is a sweep over the critical points: spans are sorted by start
//! and by end, and the active set is maintained incrementally as the running
//! sums `Σ(base - start)` and `count`, giving usage `Σ(base - start) + count·x`
//! in `O(k log k)` per check.

use crate::traits::JobView;
use serde::{Deserialize, Serialize};

/// Memory interval of one active job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Effective start `p`.
    pub start: f64,
    /// Output length `o`; the job is active on `[p, p + o]`.
    pub length: f64,
    /// Footprint charged at `p` and carried for the whole interval.
    pub base: f64,
}

impl Span {
    pub fn new(start: f64, length: f64, base: f64) -> Self {
        Self {
            start,
            length,
            base,
        }
    }

    /// Span of a job that has already processed `tokens_processed` steps by
    /// `round`. It started `tokens_processed` rounds ago.
    pub fn running(job: &JobView, round: u64, prompt_overhead: f64) -> Self {
        Self::new(
            round as f64 - job.tokens_processed as f64,
            job.output_size as f64,
            job.input_size as f64 + prompt_overhead,
        )
    }

    /// Span of a waiting job whose prompt would be dispatched at `round`.
    pub fn admission(job: &JobView, round: u64, prompt_overhead: f64) -> Self {
        Self::new(
            round as f64,
            job.output_size as f64,
            job.input_size as f64 + prompt_overhead,
        )
    }

    /// The critical point of this span.
    pub fn end(&self) -> f64 {
        self.start + self.length
    }

    pub fn is_active_at(&self, x: f64) -> bool {
        self.start <= x && x <= self.end()
    }

    /// Contribution of this span at instant `x`.
    pub fn usage_at(&self, x: f64) -> f64 {
        if self.is_active_at(x) {
            self.base + (x - self.start)
        } else {
            0.0
        }
    }
}

/// Aggregate usage observed at one critical point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsagePoint {
    pub time: f64,
    pub usage: f64,
}

/// Decides whether a set of spans stays within a memory ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityOracle {
    capacity: f64,
}

impl FeasibilityOracle {
    pub fn new(capacity: f64) -> Self {
        Self { capacity }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Whether adding `candidate` to `committed` keeps every critical point
    /// within capacity.
    pub fn admits(&self, committed: &[Span], candidate: Span) -> bool {
        let mut spans = Vec::with_capacity(committed.len() + 1);
        spans.extend_from_slice(committed);
        spans.push(candidate);
        self.first_violation(&spans).is_none()
    }

    /// Whether `candidate` fits when nothing else is active.
    pub fn fits_alone(&self, candidate: Span) -> bool {
        self.first_violation(&[candidate]).is_none()
    }

    pub fn is_feasible(&self, spans: &[Span]) -> bool {
        self.first_violation(spans).is_none()
    }

    /// Earliest critical point whose aggregate usage exceeds capacity.
    pub fn first_violation(&self, spans: &[Span]) -> Option<UsagePoint> {
        let mut found = None;
        sweep(spans, |point| {
            if point.usage > self.capacity {
                found = Some(point);
                false
            } else {
                true
            }
        });
        found
    }

    /// Highest aggregate usage over all critical points, if any span exists.
    pub fn peak(&self, spans: &[Span]) -> Option<UsagePoint> {
        let mut best: Option<UsagePoint> = None;
        sweep(spans, |point| {
            if best.map_or(true, |b| point.usage > b.usage) {
                best = Some(point);
            }
            true
        });
        best
    }
}

/// Sorted, de-duplicated critical points of `spans`.
pub fn critical_points(spans: &[Span]) -> Vec<f64> {
    let mut points: Vec<f64> = spans.iter().map(Span::end).collect();
    points.sort_by(f64::total_cmp);
    points.dedup();
    points
}

/// Aggregate usage at `x`, summed directly over all spans.
pub fn usage_at(spans: &[Span], x: f64) -> f64 {
    spans.iter().map(|s| s.usage_at(x)).sum()
}

/// Visit every critical point in ascending order with its aggregate usage.
/// The visitor returns `false` to stop early.
fn sweep(spans: &[Span], mut visit: impl FnMut(UsagePoint) -> bool) {
    let mut by_start: Vec<&Span> = spans.iter().collect();
    by_start.sort_by(|a, b| a.start.total_cmp(&b.start));
    let mut by_end: Vec<&Span> = spans.iter().collect();
    by_end.sort_by(|a, b| a.end().total_cmp(&b.end()));

    let mut offset = 0.0;
    let mut active = 0usize;
    let (mut next_start, mut next_end) = (0usize, 0usize);

    for x in critical_points(spans) {
        while next_start < by_start.len() && by_start[next_start].start <= x {
            let span = by_start[next_start];
            offset += span.base - span.start;
            active += 1;
            next_start += 1;
        }
        // A span ending before `x` started before `x`, so it was added above.
        while next_end < by_end.len() && by_end[next_end].end() < x {
            let span = by_end[next_end];
            offset -= span.base - span.start;
            active -= 1;
            next_end += 1;
        }
        let usage = offset + active as f64 * x;
        if !visit(UsagePoint { time: x, usage }) {
            return;
        }
    }
}
