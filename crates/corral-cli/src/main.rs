use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use corral_core::{Pool, PoolConfig, PoolStats, load_config};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "corral",
    version,
    about = "Corral worker pool CLI",
    long_about = "Drive a bounded worker pool with synthetic load and inspect pool configs."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit synthetic tasks to a pool and report occupancy while they run.
    Drill {
        /// TOML config file with a [pool] section.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pool capacity (overrides the config file; defaults to CPU count).
        #[arg(long)]
        capacity: Option<usize>,

        /// Idle seconds before a worker is reclaimed (overrides the config file).
        #[arg(long)]
        expiration_secs: Option<u64>,

        /// Number of tasks to submit.
        #[arg(long, default_value_t = 64)]
        tasks: usize,

        /// Time each task sleeps, in milliseconds.
        #[arg(long, default_value_t = 20)]
        task_ms: u64,

        /// Make every Nth task panic (0 disables).
        #[arg(long, default_value_t = 0)]
        panic_every: usize,

        /// Progress refresh interval in milliseconds.
        #[arg(long, default_value_t = 100)]
        stats_interval_ms: u64,
    },
    /// Load a config file and print the effective pool settings.
    CheckConfig {
        /// TOML config file with a [pool] section.
        path: PathBuf,
    },
}

struct DrillOptions {
    tasks: usize,
    task_duration: Duration,
    panic_every: usize,
    stats_interval: Duration,
}

fn main() {
    init_tracing();
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("corral=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Drill {
            config,
            capacity,
            expiration_secs,
            tasks,
            task_ms,
            panic_every,
            stats_interval_ms,
        } => {
            let config = resolve_config(config, capacity, expiration_secs)?;
            let options = DrillOptions {
                tasks,
                task_duration: Duration::from_millis(task_ms),
                panic_every,
                stats_interval: Duration::from_millis(stats_interval_ms.max(10)),
            };
            drill_command(&config, &options)?;
        }
        Commands::CheckConfig { path } => check_config_command(path)?,
    }

    Ok(())
}

fn resolve_config(
    path: Option<PathBuf>,
    capacity: Option<usize>,
    expiration_secs: Option<u64>,
) -> anyhow::Result<PoolConfig> {
    let mut config = match path {
        Some(path) => load_config(&path)?,
        None => PoolConfig::new(num_cpus::get()),
    };
    if let Some(capacity) = capacity {
        config.capacity = capacity;
    }
    if let Some(secs) = expiration_secs {
        config.expiration = Duration::from_secs(secs);
    }
    Ok(config)
}

fn drill_command(config: &PoolConfig, options: &DrillOptions) -> anyhow::Result<()> {
    let pool = Pool::from_config(config).context("failed to build pool")?;
    let completed = Arc::new(AtomicUsize::new(0));
    let faults = Arc::new(AtomicUsize::new(0));

    {
        let faults = Arc::clone(&faults);
        let completed = Arc::clone(&completed);
        pool.set_panic_handler(move |fault| {
            faults.fetch_add(1, Ordering::Relaxed);
            completed.fetch_add(1, Ordering::Release);
            tracing::warn!(
                worker_id = fault.worker_id,
                panic = %fault.message,
                "drill task panicked"
            );
        });
    }

    tracing::info!(
        capacity = config.capacity,
        expiration_secs = config.expiration.as_secs(),
        tasks = options.tasks,
        "starting drill"
    );

    let started_at = Instant::now();
    let mut peak_running = 0usize;
    for index in 0..options.tasks {
        let completed = Arc::clone(&completed);
        let task_duration = options.task_duration;
        let panics = options.panic_every > 0 && (index + 1) % options.panic_every == 0;
        pool.submit(move || {
            thread::sleep(task_duration);
            if panics {
                panic!("drill task {index} failed on purpose");
            }
            completed.fetch_add(1, Ordering::Release);
        })
        .with_context(|| format!("failed to submit task {index}"))?;
        peak_running = peak_running.max(pool.running());
    }
    let submit_elapsed = started_at.elapsed();

    while completed.load(Ordering::Acquire) < options.tasks {
        print_progress(&pool.stats(), completed.load(Ordering::Acquire), options.tasks);
        peak_running = peak_running.max(pool.running());
        thread::sleep(options.stats_interval);
    }
    print_progress(&pool.stats(), options.tasks, options.tasks);
    eprintln!();

    let elapsed = started_at.elapsed();
    let stats = pool.stats();
    pool.release();

    let tasks_per_sec = options.tasks as f64 / elapsed.as_secs_f64().max(1e-6);
    println!("drill complete");
    println!("  capacity: {}", stats.capacity);
    println!("  tasks: {} ({} panicked)", options.tasks, faults.load(Ordering::Relaxed));
    println!("  elapsed: {}", format_duration(elapsed));
    println!("  submit phase: {}", format_duration(submit_elapsed));
    println!("  throughput: {tasks_per_sec:.1} tasks/s");
    println!("  peak running: {peak_running}");
    println!(
        "  final: running {} | idle {} | free {} | cached slots {}",
        stats.running, stats.idle, stats.free, stats.cached_slots
    );
    let cache = pool.cache_metrics();
    println!(
        "  worker slots: {} created, {} reused",
        cache.created, cache.recycled
    );

    Ok(())
}

fn check_config_command(path: PathBuf) -> anyhow::Result<()> {
    let config = load_config(&path)?;
    config
        .validate()
        .with_context(|| format!("{} is not a usable pool config", path.display()))?;

    println!("config ok: {}", path.display());
    println!("  capacity: {}", config.capacity);
    println!("  expiration: {}", format_duration(config.expiration));
    println!("  worker cache size: {}", config.effective_cache_size());
    println!("  thread name: {}", config.thread_name);

    Ok(())
}

fn print_progress(stats: &PoolStats, completed: usize, total: usize) {
    let progress = if total > 0 {
        (completed.min(total) as f64 / total as f64) * 100.0
    } else {
        100.0
    };
    eprint!(
        "\r\x1b[2K[{progress:6.2}%] tasks {completed}/{total} | running {}/{} | idle {} | free {}",
        stats.running, stats.capacity, stats.idle, stats.free,
    );
    let _ = io::stderr().flush();
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let millis = duration.subsec_millis();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else if minutes > 0 {
        format!("{minutes:02}:{seconds:02}")
    } else {
        format!("{seconds}.{millis:03}s")
    }
}
