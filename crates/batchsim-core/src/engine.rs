//! Discrete-event simulation engine.
//!
//! The engine maintains a priority queue of [`SimEvent`]s sorted by time.
//! Each iteration advances the virtual clock to the next instant, applies
//! every event scheduled for it, handles memory overflow, and, when the
//! execution resource is idle, asks the [`BatchPolicy`] for the next batch.
//!
//! At most one batch is in flight. Its completion is an ordinary event, so
//! the loop runs until the queue is empty (or the time limit is reached).

use crate::arena::JobArena;
use crate::clock::SimClock;
use crate::config::{ConfigError, SimConfig};
use crate::cost_model::CostModel;
use crate::job::{JobError, JobSpec, StepOutcome};
use crate::metrics::{MetricsCollector, SimulationReport};
use crate::overflow::OverflowController;
use crate::projection::ProjectionCheck;
use crate::workload::{self, WorkloadError};
use batchsim_policies::{
    BatchEntry, BatchPlan, BatchPolicy, FeasibilityOracle, JobId, JobView, OverflowResponse,
    PolicyContext, Span, StepKind,
};
use std::collections::{BTreeSet, BinaryHeap};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Workload(#[from] WorkloadError),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),
    #[error("memory invariant violated at t={time}: usage {usage} exceeds capacity {capacity}")]
    InvariantViolation {
        time: f64,
        usage: u64,
        capacity: f64,
    },
}

/// Events in the discrete-event simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// A job arrives and joins the waiting pool.
    Arrival(JobId),
    /// The in-flight batch finishes.
    BatchCompletion,
}

impl SimEvent {
    /// Tie-break rank at equal times: completions before arrivals.
    fn rank(&self) -> u8 {
        match self {
            SimEvent::BatchCompletion => 0,
            SimEvent::Arrival(_) => 1,
        }
    }
}

/// A timestamped event for the priority queue.
#[derive(Debug, Clone)]
struct TimedEvent {
    time: f64,
    sequence: u64,
    event: SimEvent,
}

impl PartialEq for TimedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for TimedEvent {}

impl PartialOrd for TimedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; we want min-heap
        other
            .time
            .total_cmp(&self.time)
            .then(other.event.rank().cmp(&self.event.rank()))
            .then(other.sequence.cmp(&self.sequence))
    }
}

/// The batch currently executing.
#[derive(Debug, Clone)]
struct InFlightBatch {
    entries: Vec<BatchEntry>,
    start_time: f64,
    end_time: f64,
}

/// The main simulation engine.
pub struct SimulationEngine {
    /// Virtual clock.
    pub clock: SimClock,
    /// Event queue (min-heap by time).
    event_queue: BinaryHeap<TimedEvent>,
    /// Sequence counter for tie-breaking.
    sequence: u64,
    arena: JobArena,
    policy: Box<dyn BatchPolicy>,
    cost_model: Box<dyn CostModel>,
    overflow: OverflowController,
    oracle: FeasibilityOracle,
    projection: Option<ProjectionCheck>,
    /// Metrics collector.
    pub metrics: MetricsCollector,
    in_flight: Option<InFlightBatch>,
    /// Completed batches; the feasibility oracle's time axis.
    rounds: u64,
    /// Total events processed.
    pub events_processed: u64,
    config: SimConfig,
}

impl SimulationEngine {
    /// Create a new simulation engine from config and policy.
    pub fn new(config: SimConfig, policy: Box<dyn BatchPolicy>) -> Result<Self, SimError> {
        config.validate()?;
        let capacity = config.memory.capacity;
        let overflow = OverflowController::seeded(
            config.policy.beta,
            config.policy.overflow_backoff,
            config.simulation.seed,
        );
        let projection = config
            .diagnostics
            .projection_check
            .then(|| ProjectionCheck::new(capacity, config.memory.prompt_overhead));

        Ok(Self {
            clock: SimClock::new(),
            event_queue: BinaryHeap::new(),
            sequence: 0,
            arena: JobArena::new(),
            policy,
            cost_model: Box::new(config.cost_model()),
            overflow,
            oracle: FeasibilityOracle::new(capacity),
            projection,
            metrics: MetricsCollector::new(capacity),
            in_flight: None,
            rounds: 0,
            events_processed: 0,
            config,
        })
    }

    /// Replace the configured linear cost model.
    pub fn with_cost_model(mut self, cost_model: Box<dyn CostModel>) -> Self {
        self.cost_model = cost_model;
        self
    }

    /// Schedule an event at a given time.
    pub fn schedule_event(&mut self, time: f64, event: SimEvent) {
        self.event_queue.push(TimedEvent {
            time,
            sequence: self.sequence,
            event,
        });
        self.sequence += 1;
    }

    /// Register jobs and schedule their arrivals.
    pub fn load_jobs(&mut self, jobs: Vec<JobSpec>) -> Result<(), SimError> {
        workload::validate_jobs(&jobs)?;
        for spec in jobs {
            let (id, arrival) = (spec.id, spec.arrival_time);
            self.arena.insert(spec)?;
            self.schedule_event(arrival, SimEvent::Arrival(id));
        }
        Ok(())
    }

    pub fn arena(&self) -> &JobArena {
        &self.arena
    }

    /// Number of batches completed so far.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Get the number of pending events.
    pub fn pending_events(&self) -> usize {
        self.event_queue.len()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Run the simulation until all events are processed or the time limit
    /// is reached.
    pub fn run(&mut self) -> Result<SimulationReport, SimError> {
        let limit = self.config.simulation.time_limit;
        tracing::info!(
            policy = self.policy.name(),
            jobs = self.arena.len(),
            capacity = self.config.memory.capacity,
            "starting simulation"
        );

        let mut stopped_at_limit = false;
        while let Some(next_time) = self.event_queue.peek().map(|e| e.time) {
            if let Some(l) = limit {
                if next_time > l {
                    self.clock.advance_to(l);
                    stopped_at_limit = true;
                    break;
                }
            }
            self.clock.advance_to(next_time);
            while self
                .event_queue
                .peek()
                .is_some_and(|e| e.time <= next_time)
            {
                if let Some(timed) = self.event_queue.pop() {
                    self.process_event(timed.event)?;
                    self.events_processed += 1;
                }
            }

            self.handle_overflow()?;
            if self.clock.reached(limit) {
                stopped_at_limit = true;
                self.sample();
                break;
            }
            self.try_dispatch()?;
            self.sample();
        }

        if let Some(batch) = self.in_flight.take() {
            tracing::debug!(
                entries = batch.entries.len(),
                started = batch.start_time,
                would_end = batch.end_time,
                "discarding in-flight batch at time limit"
            );
            self.arena.release_in_flight(&batch.entries)?;
        }
        let truncated = stopped_at_limit && !self.arena.all_settled();
        if !stopped_at_limit && !self.arena.all_settled() {
            tracing::warn!(
                remaining = self.arena.len()
                    - self.arena.completed_count()
                    - self.arena.stalled_ids().len(),
                "simulation drained its events with jobs left undispatched"
            );
        }

        let report = self.metrics.aggregate(
            self.policy.name(),
            &self.arena,
            self.clock.now(),
            truncated,
            self.policy.custom_metrics(),
        );
        tracing::info!(
            policy = self.policy.name(),
            completed = report.completed_jobs,
            total = report.total_jobs,
            average_latency = report.average_latency,
            truncated,
            "simulation finished"
        );
        Ok(report)
    }

    /// Process a single event.
    fn process_event(&mut self, event: SimEvent) -> Result<(), SimError> {
        match event {
            SimEvent::Arrival(id) => {
                self.arena.admit_arrival(id)?;
                Ok(())
            }
            SimEvent::BatchCompletion => self.handle_batch_completion(),
        }
    }

    /// Apply every entry of the finished batch and free the resource.
    fn handle_batch_completion(&mut self) -> Result<(), SimError> {
        let Some(batch) = self.in_flight.take() else {
            return Ok(());
        };
        let now = self.clock.now();
        for entry in &batch.entries {
            match self.arena.apply_step(entry, now)? {
                StepOutcome::Discarded => {
                    tracing::debug!(job_id = entry.job_id, "discarding step of evicted job");
                }
                StepOutcome::Completed => {
                    tracing::trace!(job_id = entry.job_id, time = now, "job completed");
                }
                StepOutcome::Started | StepOutcome::Advanced => {}
            }
        }
        self.rounds += 1;
        Ok(())
    }

    /// React to realized memory above capacity.
    fn handle_overflow(&mut self) -> Result<(), SimError> {
        let capacity = self.config.memory.capacity;
        if self.arena.memory_in_use() as f64 <= capacity {
            return Ok(());
        }
        self.metrics.record_overflow(
            self.clock.now(),
            self.arena.memory_in_use(),
            self.arena.active_count(),
        );

        match self.policy.overflow_response() {
            OverflowResponse::Halt => {
                let usage = self.arena.memory_in_use();
                tracing::error!(
                    time = self.clock.now(),
                    usage,
                    capacity,
                    policy = self.policy.name(),
                    "memory exceeded capacity under a non-evicting policy"
                );
                Err(SimError::InvariantViolation {
                    time: self.clock.now(),
                    usage,
                    capacity,
                })
            }
            OverflowResponse::Evict => {
                let limit = self.config.simulation.time_limit;
                loop {
                    let victims = self.overflow.evict_round(&mut self.arena)?;
                    self.metrics.record_evictions(victims.len());
                    if self.arena.memory_in_use() as f64 <= capacity
                        || self.in_flight.is_some()
                        || self.clock.reached(limit)
                    {
                        return Ok(());
                    }
                    let mut next = self.clock.now() + self.overflow.backoff();
                    if let Some(l) = limit {
                        next = next.min(l);
                    }
                    self.drain_arrivals_until(next)?;
                    self.clock.advance_to(next);
                    self.sample();
                }
            }
        }
    }

    /// Apply queued arrivals up to and including `time` without running any
    /// batch.
    fn drain_arrivals_until(&mut self, time: f64) -> Result<(), SimError> {
        while self.event_queue.peek().is_some_and(|e| e.time <= time) {
            if let Some(timed) = self.event_queue.pop() {
                self.process_event(timed.event)?;
                self.events_processed += 1;
            }
        }
        Ok(())
    }

    /// Form and dispatch a batch if the resource is idle.
    fn try_dispatch(&mut self) -> Result<(), SimError> {
        if self.in_flight.is_some() {
            return Ok(());
        }
        let now = self.clock.now();
        let ready = self.arena.ready_views();
        let waiting = self.arena.waiting_views();
        let running = self.arena.running_views();
        let ctx = PolicyContext {
            now,
            round: self.rounds,
            ready_tokens: &ready,
            waiting: &waiting,
            running: &running,
            memory_in_use: self.arena.memory_in_use(),
            capacity: self.config.memory.capacity,
            prompt_overhead: self.config.memory.prompt_overhead,
        };
        let plan = self.policy.form_batch(&ctx);

        for &id in &plan.stalled {
            if self.arena.mark_stalled(id)? {
                tracing::warn!(job_id = id, "job can never fit within capacity; marking stalled");
            }
        }
        if plan.admitted_prompts() > 0 {
            self.check_projection(&running, &waiting, &plan);
        }
        if plan.is_empty() {
            return Ok(());
        }

        let duration = self.cost_model.batch_duration(&plan.entries);
        self.arena.dispatch(&plan.entries)?;
        self.metrics.record_batch(plan.len(), duration);
        tracing::debug!(
            time = now,
            round = self.rounds,
            entries = plan.len(),
            prompts = plan.admitted_prompts(),
            duration,
            "dispatching batch"
        );

        let end_time = now + duration;
        self.schedule_event(end_time, SimEvent::BatchCompletion);
        self.in_flight = Some(InFlightBatch {
            entries: plan.entries,
            start_time: now,
            end_time,
        });
        Ok(())
    }

    /// Compare the exact oracle with the average-batch-time projection on the
    /// set committed by `plan`. Disagreements are counted, never acted on.
    fn check_projection(&mut self, running: &[JobView], waiting: &[JobView], plan: &BatchPlan) {
        let Some(projection) = self.projection else {
            return;
        };
        let Some(average) = self
            .config
            .diagnostics
            .average_batch_time
            .or_else(|| self.metrics.average_batch_time())
        else {
            return;
        };

        let overhead = self.config.memory.prompt_overhead;
        let admitted: BTreeSet<JobId> = plan
            .entries
            .iter()
            .filter(|e| e.kind == StepKind::Prompt)
            .map(|e| e.job_id)
            .collect();
        let mut jobs: Vec<JobView> = running.to_vec();
        let mut spans: Vec<Span> = running
            .iter()
            .map(|job| Span::running(job, self.rounds, overhead))
            .collect();
        for job in waiting.iter().filter(|j| admitted.contains(&j.id)) {
            spans.push(Span::admission(job, self.rounds, overhead));
            jobs.push(job.clone());
        }

        let exact = self.oracle.is_feasible(&spans);
        let approximate = projection.is_feasible(&jobs, self.clock.now(), average);
        if exact != approximate {
            self.metrics.record_disagreement();
            tracing::warn!(
                time = self.clock.now(),
                exact,
                approximate,
                average_batch_time = average,
                "projection check disagrees with the exact oracle"
            );
        }
    }

    fn sample(&mut self) {
        self.metrics.sample(
            self.clock.now(),
            self.arena.memory_in_use(),
            self.arena.active_count(),
        );
    }
}
