use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use turnaround::config::{AppConfig, LoggingConfig, MAX_TOP_N};
use turnaround::inspect::{self, HostInspector, KillOutcome, ProcessInfo, ProcessInspector};
use turnaround::inspect::{SortKey, SortOrder};
use turnaround::monitor::{CycleParams, PredictedProcess};
use turnaround::runtime::Pid;

#[derive(Parser)]
#[command(
    name = "turnaround",
    about = "Process turnaround prediction with runtime reconciliation",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults: $TURNAROUND_CONFIG, /etc/turnaround/turnaround.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the service (REST API + live stream)
    Serve {
        /// Bind address, overrides [server] bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// List running processes
    Processes {
        #[arg(long, value_enum, default_value_t = SortKey::CpuPercent)]
        sort_by: SortKey,

        #[arg(long, value_enum, default_value_t = SortOrder::Desc)]
        order: SortOrder,

        /// Maximum rows to print
        #[arg(long, default_value = "25")]
        limit: usize,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Predict turnaround for the whole system or a single process
    Predict {
        /// Predict for this process instead of the system
        #[arg(long)]
        pid: Option<Pid>,

        /// Round-robin time quantum, in seconds
        #[arg(long, default_value = "1.0")]
        quantum: f64,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Run reconciliation cycles and print predictions as processes finish
    Watch {
        /// Processes per cycle, defaults to [stream] default_top_n
        #[arg(long)]
        top_n: Option<usize>,

        /// Time quantum, defaults to [stream] default_quantum
        #[arg(long)]
        quantum: Option<f64>,

        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },

    /// Send a termination signal to a process
    Kill {
        /// Process id
        pid: Pid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Config fallbacks log before the configured subscriber exists.
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(env_filter("warn"))
        .with_writer(std::io::stderr)
        .finish();
    let mut config =
        tracing::subscriber::with_default(bootstrap, || AppConfig::resolve(cli.config.as_deref()))?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting turnaround service");
            turnaround::serve(config).await?;
        }
        Commands::Processes {
            sort_by,
            order,
            limit,
            json,
        } => {
            let procs = tokio::task::spawn_blocking(sample_processes).await?;
            let total = procs.len();
            let top = inspect::pick_top(procs, limit, sort_by, order);
            if json {
                println!("{}", serde_json::to_string_pretty(&top)?);
            } else {
                println!(
                    "{:>8} | {:<24} | {:>7} | {:>7} | {:>10}",
                    "PID", "Name", "CPU %", "Mem %", "CPU time"
                );
                println!("{:-<8}-|-{:-<24}-|-{:-<7}-|-{:-<7}-|-{:-<10}", "", "", "", "", "");
                for p in &top {
                    println!(
                        "{:>8} | {:<24} | {:>7.1} | {:>7.2} | {:>9.1}s",
                        p.pid,
                        clip(&p.name, 24),
                        p.cpu_percent,
                        p.memory_percent,
                        p.cpu_time
                    );
                }
                println!("\n{} of {} processes", top.len(), total);
            }
        }
        Commands::Predict { pid, quantum, json } => {
            check_quantum(quantum)?;
            let monitor = turnaround::build_monitor(&config);
            match pid {
                Some(pid) => {
                    let Some(item) = monitor.predict_process(pid, quantum).await? else {
                        bail!("process {} not found or access denied", pid);
                    };
                    if json {
                        println!("{}", serde_json::to_string_pretty(&item)?);
                    } else {
                        println!("Process {} ({})", item.pid, item.name);
                        println!("  Predicted turnaround: {:.2}s", item.predicted_turnaround_time);
                        if let Some(elapsed) = item.actual_turnaround_time {
                            println!("  Running for:          {:.2}s", elapsed);
                        }
                        println!("  Status:               {}", item.turnaround_status);
                    }
                }
                None => {
                    let prediction = monitor.predict_system(quantum).await?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&prediction)?);
                    } else {
                        let f = &prediction.features;
                        println!(
                            "System turnaround: {:.2}s (quantum {:.2}s)",
                            prediction.predicted_turnaround_time, quantum
                        );
                        println!("  Processes:   {}", f.num_processes);
                        println!("  Load:        {:.2}", f.system_load);
                        println!("  Mean burst:  {:.2}s (std {:.2})", f.mean_burst, f.std_burst);
                        println!(
                            "  Mean age:    {:.0}s (std {:.0})",
                            f.mean_arrival, f.std_arrival
                        );
                    }
                }
            }
        }
        Commands::Watch {
            top_n,
            quantum,
            cycles,
        } => {
            let params = CycleParams {
                top_n: top_n.unwrap_or(config.stream.default_top_n),
                quantum: quantum.unwrap_or(config.stream.default_quantum),
                ..CycleParams::default()
            };
            if params.top_n == 0 || params.top_n > MAX_TOP_N {
                bail!("--top-n must be between 1 and {}", MAX_TOP_N);
            }
            check_quantum(params.quantum)?;
            watch(&config, params, cycles).await?;
        }
        Commands::Kill { pid } => {
            let outcome = tokio::task::spawn_blocking(move || HostInspector::new().terminate(pid))
                .await?;
            if outcome != KillOutcome::Terminated {
                bail!("{}", outcome.message(pid));
            }
            println!("{}", outcome.message(pid));
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over `level`.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_logging(logging: &LoggingConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&logging.level))
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn check_quantum(quantum: f64) -> Result<()> {
    if !quantum.is_finite() || quantum <= 0.0 {
        bail!("--quantum must be a positive number");
    }
    Ok(())
}

/// Two refreshes, so CPU percentages cover a real interval.
fn sample_processes() -> Vec<ProcessInfo> {
    let inspector = HostInspector::new();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    inspector.list()
}

async fn watch(config: &AppConfig, params: CycleParams, cycles: Option<u64>) -> Result<()> {
    let monitor = turnaround::build_monitor(config);
    let mut ticker = tokio::time::interval(Duration::from_millis(config.stream.interval_ms));
    let mut cycle = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }
        cycle += 1;

        let (system, report) = monitor.run_cycle_with_system(params).await?;

        println!(
            "\n=== Cycle {} | system turnaround {:.2}s | {} processes observed ===",
            cycle, system.predicted_turnaround_time, report.observed
        );
        print_predictions(&report.items);

        if !report.completed.is_empty() {
            let feed = monitor.tracker().completion_feed().await;
            println!("\n--- Completed ---");
            for pid in &report.completed {
                let Some(view) = feed.iter().rev().find(|v| v.pid == *pid) else {
                    continue;
                };
                println!(
                    "{:>8} | {:<24} | predicted {:>9.2}s | actual {:>10} | error {:>10}",
                    view.pid,
                    clip(&view.name, 24),
                    view.predicted_turnaround_time,
                    seconds(view.actual_turnaround_time),
                    seconds(view.duration_error)
                );
            }
        }

        if cycles.is_some_and(|limit| cycle >= limit) {
            break;
        }
    }

    let (active, completed) = monitor.tracker().counts().await;
    println!("\n{} active, {} completed", active, completed);
    Ok(())
}

fn print_predictions(items: &[PredictedProcess]) {
    println!(
        "{:>8} | {:<24} | {:>7} | {:>11} | {:>11} | Status",
        "PID", "Name", "CPU %", "Predicted", "Elapsed"
    );
    println!("{:-<8}-|-{:-<24}-|-{:-<7}-|-{:-<11}-|-{:-<11}-|-{:-<9}", "", "", "", "", "", "");
    for item in items {
        println!(
            "{:>8} | {:<24} | {:>7.1} | {:>10.1}s | {:>11} | {}",
            item.pid,
            clip(&item.name, 24),
            item.cpu_percent,
            item.predicted_turnaround_time,
            seconds(item.actual_turnaround_time),
            item.turnaround_status
        );
    }
}

fn seconds(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.1}s", v))
        .unwrap_or_else(|| "-".to_string())
}

fn clip(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        name.to_string()
    } else {
        let mut out: String = name.chars().take(width - 1).collect();
        out.push('~');
        out
    }
}
