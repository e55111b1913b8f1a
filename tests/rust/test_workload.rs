/// Integration tests for workload files and synthetic job generation.
use batchsim_core::config::SimConfig;
use batchsim_core::workload::{self, SyntheticWorkload, WorkloadError};
use batchsim_core::JobSpec;
use batchsim_policies::Sjf;
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("batchsim_{}_{}.jsonl", name, std::process::id()))
}

#[test]
fn test_jsonl_file_round_trip() {
    let jobs = vec![
        JobSpec::new(4, 1.5, 128, 16),
        JobSpec::new(2, 0.25, 64, 8),
        JobSpec::new(9, 0.25, 32, 4),
    ];
    let path = temp_path("round_trip");
    workload::write_jobs_jsonl(&jobs, &path).unwrap();
    let loaded = workload::load_jobs(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    // Loading sorts by arrival time, then id.
    let ids: Vec<u64> = loaded.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![2, 9, 4]);
    assert_eq!(loaded[2], jobs[0]);
}

#[test]
fn test_missing_ids_follow_record_order() {
    let path = temp_path("implicit_ids");
    std::fs::write(
        &path,
        "# generated by hand\n\
         {\"arrival_time\": 2.0, \"input_size\": 10, \"output_size\": 3}\n\
         \n\
         {\"arrival_time\": 1.0, \"input_size\": 20, \"output_size\": 5}\n",
    )
    .unwrap();
    let loaded = workload::load_jobs(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].id, 1);
    assert_eq!(loaded[0].input_size, 20);
    assert_eq!(loaded[1].id, 0);
}

#[test]
fn test_malformed_line_reports_line_number() {
    let path = temp_path("malformed");
    std::fs::write(
        &path,
        "{\"id\": 0, \"arrival_time\": 0.0, \"input_size\": 1, \"output_size\": 1}\n\
         {\"id\": 1, \"arrival_time\": \"soon\"}\n",
    )
    .unwrap();
    let result = workload::load_jobs(&path);
    let _ = std::fs::remove_file(&path);

    assert!(matches!(result, Err(WorkloadError::JsonParse { line: 2, .. })));
}

#[test]
fn test_invalid_records_rejected() {
    let zero_output = [JobSpec::new(0, 0.0, 5, 0)];
    assert!(matches!(
        workload::validate_jobs(&zero_output),
        Err(WorkloadError::Invalid { id: 0, .. })
    ));

    let negative_arrival = [JobSpec::new(3, -1.0, 5, 2)];
    assert!(matches!(
        workload::validate_jobs(&negative_arrival),
        Err(WorkloadError::Invalid { id: 3, .. })
    ));

    let duplicated = [JobSpec::new(1, 0.0, 5, 2), JobSpec::new(1, 0.5, 5, 2)];
    assert!(matches!(
        workload::validate_jobs(&duplicated),
        Err(WorkloadError::DuplicateId(1))
    ));
}

#[test]
fn test_largest_output_size_rejected() {
    let largest = [JobSpec::new(0, 0.0, 1, u32::MAX)];
    assert!(matches!(
        workload::validate_jobs(&largest),
        Err(WorkloadError::Invalid { id: 0, .. })
    ));

    let path = temp_path("largest_output");
    std::fs::write(
        &path,
        "{\"id\": 6, \"arrival_time\": 0.0, \"input_size\": 1, \"output_size\": 4294967295}\n",
    )
    .unwrap();
    let result = workload::load_jobs(&path);
    let _ = std::fs::remove_file(&path);
    assert!(matches!(result, Err(WorkloadError::Invalid { id: 6, .. })));

    let just_below = [JobSpec::new(1, 0.0, 1, u32::MAX - 1)];
    assert!(workload::validate_jobs(&just_below).is_ok());
}

#[test]
fn test_missing_file_is_io_error() {
    let result = workload::load_jobs(&temp_path("does_not_exist"));
    assert!(matches!(result, Err(WorkloadError::Io(_))));
}

#[test]
fn test_synthetic_workload_is_seeded() {
    let generator = SyntheticWorkload {
        count: 50,
        rate: 10.0,
        input_mean: 40.0,
        input_spread: 20.0,
        output_mean: 12.0,
        output_spread: 6.0,
    };
    let a = generator.generate(7);
    assert_eq!(a, generator.generate(7));
    assert_ne!(a, generator.generate(8));

    assert_eq!(a.len(), 50);
    assert_eq!(a[10].arrival_time, 1.0);
    assert!(a.iter().all(|j| (20..=60).contains(&j.input_size)));
    assert!(a.iter().all(|j| (6..=18).contains(&j.output_size)));
    assert!(workload::validate_jobs(&a).is_ok());
}

#[test]
fn test_generated_file_drives_a_simulation() {
    let jobs = SyntheticWorkload {
        count: 30,
        rate: 100.0,
        input_mean: 20.0,
        input_spread: 10.0,
        output_mean: 8.0,
        output_spread: 4.0,
    }
    .generate(3);
    let path = temp_path("drive");
    workload::write_jobs_jsonl(&jobs, &path).unwrap();
    let loaded = workload::load_jobs(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    let config = SimConfig::from_str("[memory]\ncapacity = 200\n").unwrap();
    let report = batchsim_core::run_simulation(config, loaded, Box::new(Sjf::new())).unwrap();
    assert_eq!(report.total_jobs, 30);
    assert_eq!(report.completed_jobs, 30);
}
