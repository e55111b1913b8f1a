//! Job-record I/O for batchsim.
//!
//! Workloads are JSON Lines files with one job per line:
//!
//! ```text
//! {"id": 7, "arrival_time": 0.25, "input_size": 512, "output_size": 128}
//! ```
//!
//! `id` is optional and defaults to the record's position among the
//! non-empty, non-comment lines. Loaded jobs are validated and sorted by
//! arrival time, then id.

use crate::job::JobSpec;
use batchsim_policies::JobId;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("Failed to read workload file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse JSON at line {line}: {source}")]
    JsonParse {
        line: usize,
        source: serde_json::Error,
    },
    #[error("Invalid job {id}: {reason}")]
    Invalid { id: JobId, reason: String },
    #[error("Duplicate job id: {0}")]
    DuplicateId(JobId),
    #[error("Failed to serialize job record: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// One JSONL workload record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JobId>,
    pub arrival_time: f64,
    pub input_size: u32,
    pub output_size: u32,
}

/// Load a JSONL workload file.
pub fn load_jobs(path: &Path) -> Result<Vec<JobSpec>, WorkloadError> {
    let file = std::fs::File::open(path)?;
    parse_jobs_jsonl(BufReader::new(file))
}

/// Parse JSONL job records from any reader.
pub fn parse_jobs_jsonl<R: Read>(reader: BufReader<R>) -> Result<Vec<JobSpec>, WorkloadError> {
    let mut jobs = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record: JobRecord =
            serde_json::from_str(trimmed).map_err(|e| WorkloadError::JsonParse {
                line: line_num + 1,
                source: e,
            })?;
        let id = record.id.unwrap_or(jobs.len() as JobId);
        jobs.push(JobSpec::new(
            id,
            record.arrival_time,
            record.input_size,
            record.output_size,
        ));
    }

    validate_jobs(&jobs)?;
    sort_by_arrival(&mut jobs);
    Ok(jobs)
}

/// Write jobs as JSONL records with explicit ids.
pub fn write_jobs_jsonl(jobs: &[JobSpec], path: &Path) -> Result<(), WorkloadError> {
    use std::io::Write;
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);

    for job in jobs {
        let record = JobRecord {
            id: Some(job.id),
            arrival_time: job.arrival_time,
            input_size: job.input_size,
            output_size: job.output_size,
        };
        serde_json::to_writer(&mut writer, &record).map_err(WorkloadError::Serialize)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reject records the simulator cannot run: non-finite or negative arrival
/// times, zero or `u32::MAX` output size, and repeated ids.
pub fn validate_jobs(jobs: &[JobSpec]) -> Result<(), WorkloadError> {
    let mut seen = BTreeSet::new();
    for job in jobs {
        if !job.arrival_time.is_finite() || job.arrival_time < 0.0 {
            return Err(WorkloadError::Invalid {
                id: job.id,
                reason: format!("arrival_time must be finite and >= 0, got {}", job.arrival_time),
            });
        }
        if job.output_size == 0 {
            return Err(WorkloadError::Invalid {
                id: job.id,
                reason: "output_size must be > 0".to_string(),
            });
        }
        if job.output_size == u32::MAX {
            return Err(WorkloadError::Invalid {
                id: job.id,
                reason: format!("output_size must be < {}", u32::MAX),
            });
        }
        if !seen.insert(job.id) {
            return Err(WorkloadError::DuplicateId(job.id));
        }
    }
    Ok(())
}

/// Sort by arrival time, then id.
pub fn sort_by_arrival(jobs: &mut [JobSpec]) {
    jobs.sort_by(|a, b| {
        a.arrival_time
            .total_cmp(&b.arrival_time)
            .then(a.id.cmp(&b.id))
    });
}

/// Parameters of a synthetic workload with evenly spaced arrivals and
/// uniformly jittered sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticWorkload {
    pub count: u64,
    /// Arrivals per time unit.
    pub rate: f64,
    pub input_mean: f64,
    pub input_spread: f64,
    pub output_mean: f64,
    pub output_spread: f64,
}

impl Default for SyntheticWorkload {
    fn default() -> Self {
        Self {
            count: 1000,
            rate: 50.0,
            input_mean: 500.0,
            input_spread: 200.0,
            output_mean: 150.0,
            output_spread: 50.0,
        }
    }
}

impl SyntheticWorkload {
    /// Generate jobs deterministically from `seed`.
    pub fn generate(&self, seed: u64) -> Vec<JobSpec> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..self.count)
            .map(|i| {
                let arrival_time = i as f64 / self.rate;
                let input = (self.input_mean + rng.gen::<f64>() * self.input_spread * 2.0
                    - self.input_spread)
                    .max(1.0) as u32;
                let output = (self.output_mean + rng.gen::<f64>() * self.output_spread * 2.0
                    - self.output_spread)
                    .max(1.0) as u32;
                JobSpec::new(i, arrival_time, input, output)
            })
            .collect()
    }
}
