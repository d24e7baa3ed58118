use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use jobrelay::config::Config;
use jobrelay::scheduler::HealthReport;
use jobrelay::Runtime;

#[derive(Parser)]
#[command(
    name = "jobrelay",
    about = "Resilient background job dispatch, run logging and delayed tasks",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (default: $JOBRELAY_CONFIG, then ./jobrelay.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API (job triggers, health, registry)
    Serve {
        /// Bind address (overrides [server] bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Show job health derived from recent runs
    Health {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List registered jobs and their next scheduled run
    Jobs,

    /// Inspect and manage delayed tasks
    Tasks {
        #[command(subcommand)]
        action: TasksAction,
    },
}

#[derive(Subcommand)]
enum TasksAction {
    /// List tasks whose target date has passed
    Due {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Remove a task by key
    Complete {
        /// Task key
        key: String,
    },

    /// Delete expired task records from the database
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::resolve(cli.config.as_deref())?;
    jobrelay::logging::init(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting jobrelay");
            jobrelay::serve(config).await?;
        }
        Commands::Health { json } => {
            let runtime = Runtime::open(config)?;
            let report = runtime.health_service().report().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_health(&report);
            }
        }
        Commands::Jobs => {
            let runtime = Runtime::open(config)?;
            println!("{:<24} | {:<16} | {:<22} | Label", "Job", "Schedule", "Next run (UTC)");
            println!("{:-<24}-|-{:-<16}-|-{:-<22}-|-{:-<30}", "", "", "", "");
            for (entry, next) in runtime.upcoming_runs() {
                let next = next
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<24} | {:<16} | {:<22} | {}",
                    entry.job_name, entry.schedule, next, entry.label
                );
            }
        }
        Commands::Tasks { action } => {
            let runtime = Runtime::open(config)?;
            match action {
                TasksAction::Due { json } => {
                    let due = runtime.tasks.list_due().await?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&due)?);
                    } else if due.is_empty() {
                        println!("No due tasks.");
                    } else {
                        println!("{:<24} | {:<20} | Target date", "Key", "Type");
                        println!("{:-<24}-|-{:-<20}-|-{:-<25}", "", "", "");
                        for task in due {
                            println!(
                                "{:<24} | {:<20} | {}",
                                task.task_key,
                                task.task_type,
                                task.target_date.to_rfc3339()
                            );
                        }
                    }
                }
                TasksAction::Complete { key } => {
                    runtime.tasks.complete(&key).await?;
                    println!("Completed task '{}'.", key);
                }
                TasksAction::Purge => {
                    let removed = runtime.keyed.purge_expired()?;
                    println!("Purged {} expired record(s).", removed);
                }
            }
        }
    }

    Ok(())
}

fn print_health(report: &HealthReport) {
    println!("\n=== jobrelay Job Health ===");
    println!("Overall: {:?}", report.overall);
    println!();
    println!(
        "{:<24} | {:<8} | {:<25} | {:>10} | Failures (7d)",
        "Job", "Status", "Last run", "Duration"
    );
    println!("{:-<24}-|-{:-<8}-|-{:-<25}-|-{:->10}-|-{:-<13}", "", "", "", "", "");
    for job in &report.jobs {
        let status = job
            .last_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let last_run = job
            .last_run_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        let duration = job
            .last_duration_ms
            .map(|ms| format!("{ms} ms"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} | {:<8} | {:<25} | {:>10} | {}",
            job.job_name, status, last_run, duration, job.recent_failure_count
        );
    }
    println!();
}
