//! Metrics collection and aggregation for simulation runs.
//!
//! Tracks per-job latency, batch statistics, the memory and active-job
//! timelines, and the counters of the overflow and diagnostics paths.

use crate::arena::JobArena;
use crate::job::{Job, JobPhase};
use batchsim_policies::JobId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-job record in the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub id: JobId,
    pub arrival_time: f64,
    pub input_size: u32,
    pub output_size: u32,
    pub start_time: Option<f64>,
    pub finish_time: Option<f64>,
    pub latency: Option<f64>,
    pub evictions: u32,
    pub phase: JobPhase,
    pub stalled: bool,
}

impl JobOutcome {
    fn from_job(job: &Job, stalled: bool) -> Self {
        Self {
            id: job.spec.id,
            arrival_time: job.spec.arrival_time,
            input_size: job.spec.input_size,
            output_size: job.spec.output_size,
            start_time: job.start_time,
            finish_time: job.finish_time,
            latency: job.latency(),
            evictions: job.evictions,
            phase: job.phase,
            stalled,
        }
    }
}

/// Percentile values for a distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Percentiles {
    /// Compute percentiles from a slice of values.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                p50: 0.0,
                p90: 0.0,
                p99: 0.0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;

        Self {
            p50: percentile_sorted(&sorted, 50.0),
            p90: percentile_sorted(&sorted, 90.0),
            p99: percentile_sorted(&sorted, 99.0),
            min: sorted[0],
            max: sorted[n - 1],
            mean,
        }
    }
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Aggregated results of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub policy: String,
    /// Clock value when the run ended.
    pub duration: f64,
    pub total_jobs: usize,
    pub completed_jobs: usize,
    /// Jobs still waiting or running at the end.
    pub unfinished_jobs: usize,
    /// Jobs that could never fit under the capacity.
    pub stalled_jobs: usize,
    /// Whether the run stopped at the time limit.
    pub truncated: bool,

    // Latency over completed jobs only
    pub total_latency: f64,
    pub average_latency: f64,
    pub latency: Percentiles,

    // Batches
    pub batches_dispatched: u64,
    pub mean_batch_size: f64,
    pub mean_batch_duration: f64,

    // Memory
    pub capacity: f64,
    pub peak_memory: u64,
    pub evictions: u64,
    pub overflow_events: u64,
    pub oracle_disagreements: u64,

    /// (time, memory in use) after each processed instant.
    pub memory_timeline: Vec<(f64, u64)>,
    /// (time, active job count) after each processed instant.
    pub active_timeline: Vec<(f64, usize)>,

    pub jobs: Vec<JobOutcome>,

    // Policy-specific metrics
    pub custom_metrics: BTreeMap<String, f64>,
}

impl SimulationReport {
    /// Outcome of one job, if present.
    pub fn job(&self, id: JobId) -> Option<&JobOutcome> {
        self.jobs.iter().find(|j| j.id == id)
    }
}

/// Collector that accumulates run statistics during simulation.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    capacity: f64,
    batch_sizes: Vec<usize>,
    batch_durations: Vec<f64>,
    memory_timeline: Vec<(f64, u64)>,
    active_timeline: Vec<(f64, usize)>,
    peak_memory: u64,
    /// Whether the last timeline entry is an overflow sample.
    overflow_sampled: bool,
    evictions: u64,
    overflow_events: u64,
    oracle_disagreements: u64,
}

impl MetricsCollector {
    pub fn new(capacity: f64) -> Self {
        Self {
            capacity,
            batch_sizes: Vec::new(),
            batch_durations: Vec::new(),
            memory_timeline: Vec::new(),
            active_timeline: Vec::new(),
            peak_memory: 0,
            overflow_sampled: false,
            evictions: 0,
            overflow_events: 0,
            oracle_disagreements: 0,
        }
    }

    /// Record a dispatched batch.
    pub fn record_batch(&mut self, size: usize, duration: f64) {
        self.batch_sizes.push(size);
        self.batch_durations.push(duration);
    }

    /// Record memory and concurrency at `time`. Samples at the same instant
    /// replace each other so the timeline keeps the settled state; an
    /// overflow sample is never replaced.
    pub fn sample(&mut self, time: f64, memory: u64, active: usize) {
        self.peak_memory = self.peak_memory.max(memory);
        let collapse = !self.overflow_sampled
            && self.memory_timeline.last().is_some_and(|last| last.0 == time);
        if collapse {
            if let Some(last) = self.memory_timeline.last_mut() {
                *last = (time, memory);
            }
            if let Some(last) = self.active_timeline.last_mut() {
                *last = (time, active);
            }
        } else {
            self.memory_timeline.push((time, memory));
            self.active_timeline.push((time, active));
        }
        self.overflow_sampled = false;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    /// Count an overflow and keep the over-capacity usage in the timeline.
    pub fn record_overflow(&mut self, time: f64, memory: u64, active: usize) {
        self.overflow_events += 1;
        self.sample(time, memory, active);
        self.overflow_sampled = true;
    }

    pub fn record_disagreement(&mut self) {
        self.oracle_disagreements += 1;
    }

    pub fn batches_dispatched(&self) -> u64 {
        self.batch_sizes.len() as u64
    }

    /// Mean duration of the batches dispatched so far.
    pub fn average_batch_time(&self) -> Option<f64> {
        if self.batch_durations.is_empty() {
            None
        } else {
            Some(self.batch_durations.iter().sum::<f64>() / self.batch_durations.len() as f64)
        }
    }

    pub fn peak_memory(&self) -> u64 {
        self.peak_memory
    }

    pub fn memory_timeline(&self) -> &[(f64, u64)] {
        &self.memory_timeline
    }

    /// Aggregate everything into a report.
    pub fn aggregate(
        &self,
        policy: &str,
        arena: &JobArena,
        duration: f64,
        truncated: bool,
        custom_metrics: BTreeMap<String, f64>,
    ) -> SimulationReport {
        let stalled = arena.stalled_ids();
        let jobs: Vec<JobOutcome> = arena
            .jobs()
            .map(|job| JobOutcome::from_job(job, stalled.contains(&job.id())))
            .collect();

        let latencies: Vec<f64> = jobs.iter().filter_map(|j| j.latency).collect();
        let completed = latencies.len();
        let total_latency: f64 = latencies.iter().sum();
        let average_latency = if completed > 0 {
            total_latency / completed as f64
        } else {
            0.0
        };

        let batches = self.batch_sizes.len();
        let mean_batch_size = if batches > 0 {
            self.batch_sizes.iter().sum::<usize>() as f64 / batches as f64
        } else {
            0.0
        };

        SimulationReport {
            policy: policy.to_string(),
            duration,
            total_jobs: jobs.len(),
            completed_jobs: completed,
            unfinished_jobs: jobs.len() - completed - stalled.len(),
            stalled_jobs: stalled.len(),
            truncated,
            total_latency,
            average_latency,
            latency: Percentiles::from_values(&latencies),
            batches_dispatched: batches as u64,
            mean_batch_size,
            mean_batch_duration: self.average_batch_time().unwrap_or(0.0),
            capacity: self.capacity,
            peak_memory: self.peak_memory,
            evictions: self.evictions,
            overflow_events: self.overflow_events,
            oracle_disagreements: self.oracle_disagreements,
            memory_timeline: self.memory_timeline.clone(),
            active_timeline: self.active_timeline.clone(),
            jobs,
            custom_metrics,
        }
    }
}

/// Format a report as a pretty-printed table string.
pub fn format_table(report: &SimulationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n{:=<70}\n",
        format!("  {} Results  ", report.policy)
    ));
    out.push_str(&format!(
        "  Duration: {:.3} | Jobs: {} ({} completed, {} unfinished, {} stalled){}\n",
        report.duration,
        report.total_jobs,
        report.completed_jobs,
        report.unfinished_jobs,
        report.stalled_jobs,
        if report.truncated { " [time limit]" } else { "" },
    ));
    out.push_str(&format!("{:-<70}\n", "  Latency  "));
    out.push_str(&format!(
        "  Total: {:.3}  Average: {:.3}\n",
        report.total_latency, report.average_latency
    ));
    out.push_str(&format!(
        "  P50={:>10.3}  P90={:>10.3}  P99={:>10.3}\n",
        report.latency.p50, report.latency.p90, report.latency.p99
    ));
    out.push_str(&format!("{:-<70}\n", "  Batches  "));
    out.push_str(&format!(
        "  Dispatched: {}  Mean size: {:.2}  Mean duration: {:.4}\n",
        report.batches_dispatched, report.mean_batch_size, report.mean_batch_duration
    ));
    out.push_str(&format!("{:-<70}\n", "  Memory  "));
    out.push_str(&format!(
        "  Peak: {} / {}  Evictions: {}  Overflows: {}  Oracle disagreements: {}\n",
        report.peak_memory,
        report.capacity,
        report.evictions,
        report.overflow_events,
        report.oracle_disagreements,
    ));
    if !report.custom_metrics.is_empty() {
        out.push_str(&format!("{:-<70}\n", "  Policy  "));
        for (name, value) in &report.custom_metrics {
            out.push_str(&format!("  {}: {}\n", name, value));
        }
    }
    out.push_str(&format!("{:=<70}\n", ""));
    out
}

/// Format a comparison table of multiple policy results.
pub fn format_comparison_table(results: &[SimulationReport]) -> String {
    if results.is_empty() {
        return String::from("No results to compare.\n");
    }

    let mut out = String::new();
    out.push_str(&format!("\n{:=<90}\n", "  Policy Comparison  "));
    out.push_str(&format!(
        "{:<12} {:>10} {:>12} {:>10} {:>10} {:>10} {:>10} {:>10}\n",
        "Policy", "Completed", "Total lat", "Avg lat", "P99 lat", "Batches", "Peak mem", "Evicted"
    ));
    out.push_str(&format!("{:-<90}\n", ""));

    for r in results {
        out.push_str(&format!(
            "{:<12} {:>10} {:>12.3} {:>10.3} {:>10.3} {:>10} {:>10} {:>10}\n",
            r.policy,
            r.completed_jobs,
            r.total_latency,
            r.average_latency,
            r.latency.p99,
            r.batches_dispatched,
            r.peak_memory,
            r.evictions,
        ));
    }
    out.push_str(&format!("{:=<90}\n", ""));
    out
}
