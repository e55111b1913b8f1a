/// Integration tests for the built-in batch formation policies.
use batchsim_core::config::SimConfig;
use batchsim_core::JobSpec;
use batchsim_policies::*;

fn view(id: JobId, arrival_time: f64, input_size: u32, output_size: u32) -> JobView {
    JobView {
        id,
        arrival_time,
        input_size,
        output_size,
        tokens_processed: 0,
        context_length: 0,
    }
}

fn started(mut job: JobView, tokens_processed: u32) -> JobView {
    job.tokens_processed = tokens_processed;
    job.context_length = tokens_processed;
    job
}

fn ctx<'a>(
    round: u64,
    ready_tokens: &'a [JobView],
    waiting: &'a [JobView],
    running: &'a [JobView],
    capacity: f64,
    prompt_overhead: f64,
) -> PolicyContext<'a> {
    PolicyContext {
        now: round as f64,
        round,
        ready_tokens,
        waiting,
        running,
        memory_in_use: running.iter().map(JobView::footprint).sum(),
        capacity,
        prompt_overhead,
    }
}

#[test]
fn test_every_ready_token_is_dispatched() {
    let running: Vec<_> = (0..3).map(|i| started(view(i, i as f64, 5, 8), 2)).collect();
    for name in available_policies() {
        let mut policy = policy_by_name(name, &PolicyParams::default()).unwrap();
        let plan = policy.form_batch(&ctx(2, &running, &[], &running, 1_000.0, 0.0));
        let ids: Vec<_> = plan.entries.iter().map(|e| e.job_id).collect();
        assert_eq!(ids, vec![0, 1, 2], "{} dropped a token", name);
        assert!(plan.entries.iter().all(|e| e.kind == StepKind::Token));
    }
}

#[test]
fn test_admission_accounts_for_running_growth() {
    // Running job: started 2 rounds ago, base 6, ends at round 6 with 12.
    let running = vec![started(view(0, 0.0, 6, 6), 2)];
    // Candidate base 6 on [2, 6] peaks at 10; together 22 at round 6.
    let waiting = vec![view(1, 0.5, 6, 4)];

    let mut fcfs = Fcfs::new();
    let tight = fcfs.form_batch(&ctx(2, &running, &waiting, &running, 21.0, 0.0));
    assert_eq!(tight.admitted_prompts(), 0);
    assert!(tight.stalled.is_empty());

    let roomy = fcfs.form_batch(&ctx(2, &running, &waiting, &running, 22.0, 0.0));
    assert_eq!(roomy.admitted_prompts(), 1);
}

#[test]
fn test_prompt_overhead_counts_against_capacity() {
    let waiting = vec![view(0, 0.0, 4, 4)];
    let mut sjf = Sjf::new();
    assert_eq!(
        sjf.form_batch(&ctx(0, &[], &waiting, &[], 10.0, 2.0))
            .admitted_prompts(),
        1
    );
    let plan = sjf.form_batch(&ctx(0, &[], &waiting, &[], 10.0, 3.0));
    assert_eq!(plan.admitted_prompts(), 0);
    assert_eq!(plan.stalled, vec![0]);
}

#[test]
fn test_fcfs_and_sjf_differ_only_in_order() {
    let waiting = vec![view(0, 0.0, 2, 9), view(1, 0.1, 2, 1), view(2, 0.2, 2, 4)];
    let fcfs = Fcfs::new().form_batch(&ctx(0, &[], &waiting, &[], 1_000.0, 0.0));
    let sjf = Sjf::new().form_batch(&ctx(0, &[], &waiting, &[], 1_000.0, 0.0));

    let ids = |plan: &BatchPlan| plan.entries.iter().map(|e| e.job_id).collect::<Vec<_>>();
    assert_eq!(ids(&fcfs), vec![0, 1, 2]);
    assert_eq!(ids(&sjf), vec![1, 2, 0]);
}

#[test]
fn test_threshold_params_from_config() {
    let config = SimConfig::from_str(
        r#"
[simulation]
time_limit = 1000.0

[memory]
capacity = 100

[policy]
name = "threshold"
alpha = 0.5
max_batch_size = 2
admission_check = false
"#,
    )
    .unwrap();
    let mut policy = batchsim_core::policy_from_config(&config).unwrap();
    assert_eq!(policy.name(), "threshold");
    assert_eq!(policy.overflow_response(), OverflowResponse::Evict);

    let waiting: Vec<_> = (0..5).map(|i| view(i, 0.0, 30, 30)).collect();
    let plan = policy.form_batch(&ctx(0, &[], &waiting, &[], 100.0, 0.0));
    assert_eq!(plan.admitted_prompts(), 2);

    // 60 in use is above 100 * (1 - 0.5).
    let running = vec![started(view(7, 0.0, 59, 10), 1)];
    let plan = policy.form_batch(&ctx(1, &running, &waiting, &running, 100.0, 0.0));
    assert_eq!(plan.admitted_prompts(), 0);
    assert_eq!(policy.custom_metrics()["alpha_gate_closures"], 1.0);
}

#[test]
fn test_threshold_custom_metrics_reach_report() {
    let config = SimConfig::from_str(
        r#"
[simulation]
time_limit = 1000.0

[memory]
capacity = 200

[policy]
name = "threshold"
max_batch_size = 2
"#,
    )
    .unwrap();
    let jobs: Vec<JobSpec> = (0..6).map(|i| JobSpec::new(i, 0.0, 4, 3)).collect();
    let policy = batchsim_core::policy_from_config(&config).unwrap();
    let report = batchsim_core::run_simulation(config, jobs, policy).unwrap();

    assert_eq!(report.completed_jobs, 6);
    assert!(report.custom_metrics.contains_key("deferred_tokens"));
    assert!(report.custom_metrics.contains_key("alpha_gate_closures"));
    assert!(report.mean_batch_size <= 2.0);
}

#[test]
fn test_unknown_policy_name() {
    let config = SimConfig::from_str("[memory]\ncapacity = 10\n")
        .unwrap()
        .with_policy("round_robin");
    assert!(matches!(
        batchsim_core::policy_from_config(&config),
        Err(batchsim_core::SimError::UnknownPolicy(name)) if name == "round_robin"
    ));
}
