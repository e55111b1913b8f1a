/// Integration tests for overflow handling under evicting policies.
use batchsim_core::config::SimConfig;
use batchsim_core::{JobArena, JobPhase, JobSpec, OverflowController};
use batchsim_policies::{BatchEntry, StepKind};

fn evicting_config(beta: f64, capacity: f64, time_limit: f64) -> SimConfig {
    SimConfig::from_str(&format!(
        r#"
[simulation]
seed = 11
time_limit = {}

[memory]
capacity = {}

[policy]
name = "threshold"
beta = {}
admission_check = false
overflow_backoff = 0.25
"#,
        time_limit, capacity, beta
    ))
    .unwrap()
}

fn started_arena(ids: &[u64]) -> JobArena {
    let mut arena = JobArena::new();
    for &id in ids {
        arena.insert(JobSpec::new(id, 0.0, 3, 8)).unwrap();
        arena.admit_arrival(id).unwrap();
        let prompt = BatchEntry {
            job_id: id,
            kind: StepKind::Prompt,
            context_length: 0,
            prompt_tokens: 3,
        };
        arena.dispatch(&[prompt]).unwrap();
        arena.apply_step(&prompt, 0.5).unwrap();
    }
    arena
}

#[test]
fn test_evicted_jobs_lose_progress() {
    let mut arena = started_arena(&[0, 1, 2]);
    assert_eq!(arena.memory_in_use(), 12);

    let mut controller = OverflowController::seeded(1.0, 0.25, 3);
    let victims = controller.evict_round(&mut arena).unwrap();
    assert_eq!(victims, vec![0, 1, 2]);
    assert_eq!(arena.memory_in_use(), 0);
    assert_eq!(arena.waiting_count(), 3);
    for job in arena.jobs() {
        assert_eq!(job.phase, JobPhase::Waiting);
        assert_eq!(job.tokens_processed, 0);
        assert_eq!(job.start_time, None);
        assert_eq!(job.evictions, 1);
    }
    assert_eq!(controller.rounds(), 1);
}

#[test]
fn test_unchecked_admission_overflows_then_evicts() {
    // Two prompts of 4 fit (4 + 1 each = 10); the first token step makes 12.
    let jobs = vec![JobSpec::new(0, 0.0, 4, 5), JobSpec::new(1, 0.0, 4, 5)];
    let config = evicting_config(1.0, 10.0, 1.0);
    let policy = batchsim_core::policy_from_config(&config).unwrap();
    let report = batchsim_core::run_simulation(config, jobs, policy).unwrap();

    assert!(report.overflow_events >= 1);
    assert!(report.evictions >= 2);
    // The overflowing usage is recorded before eviction clears it.
    assert_eq!(report.peak_memory, 12);
    assert!(report.truncated);
    assert_eq!(report.completed_jobs, 0);
    assert!(report.jobs.iter().all(|j| j.evictions > 0));
}

#[test]
fn test_first_overflow_evicts_every_running_job() {
    // The first overflow happens at about 0.094; the re-dispatched prompts
    // would finish after the limit.
    let jobs = vec![JobSpec::new(0, 0.0, 4, 5), JobSpec::new(1, 0.0, 4, 5)];
    let config = evicting_config(1.0, 10.0, 0.1);
    let policy = batchsim_core::policy_from_config(&config).unwrap();
    let report = batchsim_core::run_simulation(config, jobs, policy).unwrap();

    assert_eq!(report.overflow_events, 1);
    assert_eq!(report.evictions, 2);
    assert_eq!(report.peak_memory, 12);
    let overflow_at = report
        .memory_timeline
        .iter()
        .position(|&(_, m)| m == 12)
        .unwrap();
    let (time, _) = report.memory_timeline[overflow_at];
    assert!(time > 0.09 && time < 0.1);
    assert_eq!(report.memory_timeline[overflow_at + 1], (time, 0));
    assert_eq!(report.memory_timeline.last().map(|&(_, m)| m), Some(0));
    for job in &report.jobs {
        assert_eq!(job.phase, JobPhase::Waiting);
        assert_eq!(job.evictions, 1);
        assert_eq!(job.start_time, None);
    }
}

#[test]
fn test_eviction_leaves_room_for_completion() {
    // Any two jobs fit their full growth (8 each) but three overflow at the
    // third token step.
    let jobs = vec![
        JobSpec::new(0, 0.0, 4, 4),
        JobSpec::new(1, 0.0, 4, 4),
        JobSpec::new(2, 0.0, 4, 4),
    ];
    let config = evicting_config(0.5, 20.0, 200.0);
    let policy = batchsim_core::policy_from_config(&config).unwrap();
    let report = batchsim_core::run_simulation(config, jobs, policy).unwrap();

    assert_eq!(report.completed_jobs, 3);
    assert!(!report.truncated);
    assert!(report.evictions > 0);
    assert!(report.peak_memory > 20);
    assert_eq!(report.memory_timeline.last().map(|&(_, m)| m), Some(0));
}

#[test]
fn test_unchecked_admission_stalls_job_that_never_fits() {
    // 50 + 2 can never fit in 10, so evicting and retrying cannot help.
    let jobs = vec![JobSpec::new(0, 0.0, 50, 2)];
    let config = evicting_config(1.0, 10.0, 20.0);
    let policy = batchsim_core::policy_from_config(&config).unwrap();
    let report = batchsim_core::run_simulation(config, jobs, policy).unwrap();

    assert_eq!(report.stalled_jobs, 1);
    assert_eq!(report.completed_jobs, 0);
    assert_eq!(report.overflow_events, 0);
    assert_eq!(report.evictions, 0);
    assert_eq!(report.peak_memory, 0);
    assert!(!report.truncated);
}

#[test]
fn test_unchecked_admission_runs_fitting_jobs_past_a_stalled_one() {
    let jobs = vec![JobSpec::new(0, 0.0, 50, 2), JobSpec::new(1, 0.0, 4, 3)];
    let config = evicting_config(1.0, 10.0, 20.0);
    let policy = batchsim_core::policy_from_config(&config).unwrap();
    let report = batchsim_core::run_simulation(config, jobs, policy).unwrap();

    assert_eq!(report.stalled_jobs, 1);
    assert_eq!(report.completed_jobs, 1);
    assert!(report.job(1).unwrap().finish_time.is_some());
    assert_eq!(report.evictions, 0);
}

#[test]
fn test_eviction_sequence_is_seeded() {
    let jobs: Vec<JobSpec> = (0..12)
        .map(|i| JobSpec::new(i, (i % 3) as f64 * 0.01, 5, 6))
        .collect();
    let run = |seed: u64| {
        let mut config = evicting_config(0.4, 30.0, 3.0);
        config.simulation.seed = seed;
        let policy = batchsim_core::policy_from_config(&config).unwrap();
        batchsim_core::run_simulation(config, jobs.clone(), policy).unwrap()
    };

    let a = run(5);
    let b = run(5);
    assert_eq!(a.evictions, b.evictions);
    assert_eq!(a.memory_timeline, b.memory_timeline);
    let evictions_a: Vec<u32> = a.jobs.iter().map(|j| j.evictions).collect();
    let evictions_b: Vec<u32> = b.jobs.iter().map(|j| j.evictions).collect();
    assert_eq!(evictions_a, evictions_b);
}

#[test]
fn test_oracle_checked_threshold_never_overflows() {
    let jobs: Vec<JobSpec> = (0..20)
        .map(|i| JobSpec::new(i, i as f64 * 0.01, 6, 3 + (i % 4) as u32))
        .collect();
    let mut config = evicting_config(1.0, 40.0, 100.0);
    config.policy.admission_check = true;
    let policy = batchsim_core::policy_from_config(&config).unwrap();
    let report = batchsim_core::run_simulation(config, jobs, policy).unwrap();

    assert_eq!(report.overflow_events, 0);
    assert_eq!(report.evictions, 0);
    assert_eq!(report.completed_jobs, 20);
}
