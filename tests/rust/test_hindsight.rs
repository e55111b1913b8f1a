/// Integration tests for the offline problem export and the semi-online
/// baseline.
use batchsim_core::hindsight::HindsightJob;
use batchsim_core::{
    compare_with_hindsight, schedule_semi_online, Assignment, HindsightError, HindsightProblem,
    HindsightSolver, JobSpec, SemiOnlineBaseline,
};
use batchsim_policies::FeasibilityOracle;
use std::collections::BTreeMap;

fn specs() -> Vec<JobSpec> {
    vec![
        JobSpec::new(0, 0.0, 12, 6),
        JobSpec::new(1, 0.0, 12, 2),
        JobSpec::new(2, 0.5, 12, 3),
        JobSpec::new(3, 4.0, 12, 1),
    ]
}

#[test]
fn test_export_uses_output_sizes_as_lengths() {
    let problem = HindsightProblem::from_specs(&specs(), 3.0, 20.0);
    assert_eq!(problem.jobs.len(), 4);
    assert_eq!(
        problem.jobs[&2],
        HindsightJob {
            arrival_time: 0.5,
            length: 3
        }
    );
    assert_eq!(problem.base_cost, 3.0);
    assert_eq!(problem.capacity, 20.0);
}

#[test]
fn test_semi_online_assignment_is_valid() {
    let problem = HindsightProblem::from_specs(&specs(), 3.0, 20.0);
    let assignment = schedule_semi_online(&problem).unwrap();

    assert!(problem.verify(&assignment).is_ok());
    for (id, job) in &problem.jobs {
        let start = assignment.start_times[id];
        assert!(start >= job.arrival_time);
        assert_eq!(start.fract(), 0.0);
    }
    // Shortest first: job 1 (length 2) is tried before job 0 (length 6).
    assert!(assignment.start_times[&1] <= assignment.start_times[&0]);
}

#[test]
fn test_semi_online_stays_within_capacity() {
    let specs: Vec<JobSpec> = (0..15)
        .map(|i| JobSpec::new(i, (i / 2) as f64, 1, 1 + (i * 7 % 5) as u32))
        .collect();
    let problem = HindsightProblem::from_specs(&specs, 2.0, 12.0);
    let assignment = schedule_semi_online(&problem).unwrap();
    assert!(problem.verify(&assignment).is_ok());

    // Jobs leave the ongoing set at p + o, so sample just before each end.
    let spans = problem.spans(&assignment).unwrap();
    let horizon = spans.iter().map(|s| s.end()).fold(0.0, f64::max) as i64;
    for t in 0..=horizon {
        let x = t as f64 - 1e-9;
        let usage: f64 = spans
            .iter()
            .filter(|s| s.start <= x && x < s.end())
            .map(|s| s.usage_at(x))
            .sum();
        assert!(usage <= 12.0 + 1e-6, "usage {} at {}", usage, x);
    }
}

#[test]
fn test_baseline_as_solver() {
    let problem = HindsightProblem::from_specs(&specs(), 3.0, 20.0);
    let solver: &dyn HindsightSolver = &SemiOnlineBaseline;
    assert_eq!(solver.name(), "semi_online");
    let direct = schedule_semi_online(&problem).unwrap();
    let solved = solver.solve(&problem, Some(&direct)).unwrap();
    assert_eq!(solved, direct);
}

#[test]
fn test_unschedulable_job() {
    let problem = HindsightProblem::from_specs(&[JobSpec::new(5, 0.0, 1, 30)], 1.0, 20.0);
    assert_eq!(
        schedule_semi_online(&problem),
        Err(HindsightError::Unschedulable(5))
    );
}

#[test]
fn test_verify_catches_bad_assignments() {
    let problem = HindsightProblem::from_specs(&specs(), 3.0, 20.0);

    let mut early: BTreeMap<u64, f64> = (0..4).map(|id| (id, 5.0)).collect();
    early.insert(2, 0.0);
    let assignment = problem.assignment(early).unwrap();
    assert!(matches!(
        problem.verify(&assignment),
        Err(HindsightError::StartBeforeArrival { id: 2, .. })
    ));

    let missing: BTreeMap<u64, f64> = (0..3).map(|id| (id, 5.0)).collect();
    assert_eq!(
        problem.assignment(missing),
        Err(HindsightError::MissingJob(3))
    );

    let on_time: BTreeMap<u64, f64> = (0..4).map(|id| (id, 5.0)).collect();
    let mut wrong = problem.assignment(on_time).unwrap();
    wrong.total_latency += 1.0;
    assert!(matches!(
        problem.verify(&wrong),
        Err(HindsightError::LatencyMismatch { .. })
    ));
}

#[test]
fn test_compare_online_run_with_baseline() {
    let config = batchsim_core::SimConfig::from_str("[memory]\ncapacity = 400\n").unwrap();
    let policy = batchsim_core::policy_from_config(&config).unwrap();
    let report = batchsim_core::run_simulation(config, specs(), policy).unwrap();

    let problem = HindsightProblem::from_specs(&specs(), 3.0, 20.0);
    let assignment = schedule_semi_online(&problem).unwrap();
    let comparison = compare_with_hindsight(&report, &assignment);

    assert_eq!(comparison.policy, "fcfs");
    assert_eq!(comparison.online_total_latency, report.total_latency);
    assert_eq!(comparison.hindsight_total_latency, assignment.total_latency);
    let ratio = comparison.ratio.unwrap();
    assert!((ratio - report.total_latency / assignment.total_latency).abs() < 1e-12);
    assert_eq!(comparison.unfinished_jobs, 0);

    let empty = Assignment {
        start_times: BTreeMap::new(),
        total_latency: 0.0,
    };
    assert_eq!(compare_with_hindsight(&report, &empty).ratio, None);
}

#[test]
fn test_oracle_peak_of_baseline_assignment() {
    let problem = HindsightProblem::from_specs(&specs(), 3.0, 20.0);
    let assignment = schedule_semi_online(&problem).unwrap();
    let peak = problem.peak_usage(&assignment).unwrap().unwrap();
    let oracle = FeasibilityOracle::new(f64::MAX);
    let spans = problem.spans(&assignment).unwrap();
    assert_eq!(oracle.peak(&spans), Some(peak));
}
