//! batchsim CLI: evaluate batch admission policies under a memory ceiling.

use batchsim_core::config::SimConfig;
use batchsim_core::hindsight::HindsightProblem;
use batchsim_core::metrics;
use batchsim_core::workload::{self, SyntheticWorkload};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "batchsim",
    about = "Simulate memory-constrained batch scheduling of variable-length jobs",
    version
)]
struct Cli {
    /// Log filter (e.g. "info", "batchsim_core=debug"). Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation with a single policy.
    Run {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: PathBuf,
        /// Path to JSONL job file.
        #[arg(short, long)]
        jobs: PathBuf,
        /// Policy name; defaults to policy.name from the config.
        #[arg(short, long)]
        policy: Option<String>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare multiple policies on the same jobs.
    Compare {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: PathBuf,
        /// Path to JSONL job file.
        #[arg(short, long)]
        jobs: PathBuf,
        /// Comma-separated list of policy names.
        #[arg(short = 'P', long, value_delimiter = ',')]
        policies: Vec<String>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Schedule jobs with the unit-time semi-online baseline.
    SemiOnline {
        /// Path to JSONL job file.
        #[arg(short, long)]
        jobs: PathBuf,
        /// Memory capacity M.
        #[arg(long)]
        capacity: f64,
        /// Per-job base cost s.
        #[arg(long, default_value = "0")]
        base_cost: f64,
        /// Output the assignment to a JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate a synthetic JSONL job file.
    GenJobs {
        /// Number of jobs.
        #[arg(long, default_value = "1000")]
        count: u64,
        /// Arrivals per time unit.
        #[arg(long, default_value = "50")]
        rate: f64,
        /// Mean input size.
        #[arg(long, default_value = "500")]
        input_mean: f64,
        /// Half-width of the uniform input size jitter.
        #[arg(long, default_value = "200")]
        input_spread: f64,
        /// Mean output size.
        #[arg(long, default_value = "150")]
        output_mean: f64,
        /// Half-width of the uniform output size jitter.
        #[arg(long, default_value = "50")]
        output_spread: f64,
        /// Random seed.
        #[arg(long, default_value = "42")]
        seed: u64,
        /// Output file path.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List available policies.
    ListPolicies,
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref());

    match cli.command {
        Commands::Run {
            config,
            jobs,
            policy,
            output,
        } => {
            let mut sim_config = load_config(&config);
            if let Some(name) = policy {
                sim_config = sim_config.with_policy(&name);
            }
            let specs = load_job_file(&jobs);
            let policy = batchsim_core::policy_from_config(&sim_config).unwrap_or_else(|e| {
                eprintln!(
                    "{}. Available: {:?}",
                    e,
                    batchsim_policies::available_policies()
                );
                std::process::exit(1);
            });

            let result = batchsim_core::run_simulation(sim_config, specs, policy)
                .unwrap_or_else(|e| {
                    eprintln!("Simulation failed: {}", e);
                    std::process::exit(1);
                });
            println!("{}", metrics::format_table(&result));
            write_json(output.as_deref(), &result);
        }
        Commands::Compare {
            config,
            jobs,
            policies,
            output,
        } => {
            let sim_config = load_config(&config);
            let specs = load_job_file(&jobs);
            let names: Vec<&str> = if policies.is_empty() {
                batchsim_policies::available_policies()
            } else {
                policies.iter().map(|s| s.as_str()).collect()
            };

            let results = batchsim_core::compare_policies(&sim_config, &specs, &names)
                .unwrap_or_else(|e| {
                    eprintln!("Comparison failed: {}", e);
                    std::process::exit(1);
                });
            println!("{}", metrics::format_comparison_table(&results));
            for result in &results {
                println!("{}", metrics::format_table(result));
            }
            write_json(output.as_deref(), &results);
        }
        Commands::SemiOnline {
            jobs,
            capacity,
            base_cost,
            output,
        } => {
            let specs = load_job_file(&jobs);
            let problem = HindsightProblem::from_specs(&specs, base_cost, capacity);
            let assignment =
                batchsim_core::schedule_semi_online(&problem).unwrap_or_else(|e| {
                    eprintln!("Scheduling failed: {}", e);
                    std::process::exit(1);
                });
            println!(
                "Scheduled {} jobs, total latency {:.1}",
                assignment.start_times.len(),
                assignment.total_latency
            );
            write_json(output.as_deref(), &assignment);
        }
        Commands::GenJobs {
            count,
            rate,
            input_mean,
            input_spread,
            output_mean,
            output_spread,
            seed,
            output,
        } => {
            let generator = SyntheticWorkload {
                count,
                rate,
                input_mean,
                input_spread,
                output_mean,
                output_spread,
            };
            let specs = generator.generate(seed);
            workload::write_jobs_jsonl(&specs, &output).unwrap_or_else(|e| {
                eprintln!("Error writing jobs: {}", e);
                std::process::exit(1);
            });
            println!("Generated {} jobs to {}", specs.len(), output.display());
        }
        Commands::ListPolicies => {
            println!("Available policies:");
            for name in batchsim_policies::available_policies() {
                println!("  - {}", name);
            }
        }
    }
}

fn setup_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> SimConfig {
    SimConfig::from_file(path).unwrap_or_else(|e| {
        eprintln!("Error loading config: {}", e);
        std::process::exit(1);
    })
}

fn load_job_file(path: &Path) -> Vec<batchsim_core::JobSpec> {
    workload::load_jobs(path).unwrap_or_else(|e| {
        eprintln!("Error loading jobs: {}", e);
        std::process::exit(1);
    })
}

fn write_json<T: Serialize>(path: Option<&Path>, value: &T) {
    let Some(path) = path else {
        return;
    };
    let written = serde_json::to_string_pretty(value)
        .map_err(|e| e.to_string())
        .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
    if let Err(e) = written {
        eprintln!("Error writing output: {}", e);
        std::process::exit(1);
    }
    println!("Results written to {}", path.display());
}
