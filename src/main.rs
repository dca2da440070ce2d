//! Steptrack Agent CLI
//!
//! Runs the step engine in the foreground and inspects its persisted state.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use steptrack_agent::{
    collector::{replay, SampleSink},
    config::{Config, SourceConfig},
    core::ledger::read_state,
    notify::{BridgeMessage, ChannelBridge, NotificationSurface, Notifier, TracingSurface},
    stats::StatsSnapshot,
    store::JsonFileStore,
    StepService, VERSION,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "steptrack")]
#[command(version = VERSION)]
#[command(about = "Background step tracking with sensor fusion", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the step engine on JSON-lines sensor samples
    Start {
        /// Sample file, or "-" for stdin
        #[arg(long, short, default_value = "-")]
        input: String,

        /// Sensors the device provides (step_counter, accelerometer, gyroscope, or all)
        #[arg(long)]
        sources: Option<String>,
    },

    /// Show persisted totals and engine statistics
    Status,

    /// Print today's step count
    Steps,

    /// Print the per-day archive and lifetime total as JSON
    History,

    /// Add steps entered by hand
    Add {
        #[arg(allow_negative_numbers = true)]
        steps: i64,
    },

    /// Reset today's step count
    Reset,

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start { input, sources } => cmd_start(&input, sources.as_deref()),
        Commands::Status => cmd_status(),
        Commands::Steps => cmd_steps(),
        Commands::History => cmd_history(),
        Commands::Add { steps } => cmd_add(steps),
        Commands::Reset => cmd_reset(),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Print bridge events to stdout until every sender is gone.
fn spawn_printer(rx: crossbeam_channel::Receiver<BridgeMessage>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for message in rx {
            println!(
                "[{}] {} {}",
                chrono::Local::now().format("%H:%M:%S"),
                message.event,
                message.payload
            );
        }
    })
}

fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().context("Could not load configuration")?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    Ok(config)
}

/// Service over the persisted ledger, not started.
fn offline_service(config: &Config) -> StepService {
    let surface: Arc<dyn NotificationSurface> = Arc::new(TracingSurface);
    StepService::from_config(config, Arc::new(Notifier::new(surface)))
}

fn cmd_start(input: &str, sources: Option<&str>) -> anyhow::Result<()> {
    println!("Steptrack Agent v{VERSION}");
    println!();

    let mut config = load_config()?;
    if let Some(csv) = sources {
        let source_config = SourceConfig::from_csv(csv);
        if !source_config.any_enabled() {
            anyhow::bail!("At least one sensor source must be enabled");
        }
        config.sources = source_config;
    }

    let enabled = |on: bool| if on { "enabled" } else { "unavailable" };
    println!("Starting step engine...");
    println!("  Step counter: {}", enabled(config.sources.step_counter));
    println!("  Accelerometer: {}", enabled(config.sources.accelerometer));
    println!("  Gyroscope: {}", enabled(config.sources.gyroscope));
    println!("  Ledger: {:?}", config.ledger_path());

    let (tx, rx) = crossbeam_channel::bounded(1024);
    let printer = spawn_printer(rx);
    let notifier = Arc::new(Notifier::with_bridge(
        Arc::new(TracingSurface),
        Arc::new(ChannelBridge::new(tx)),
    ));
    let mut service = StepService::from_config(&config, notifier);
    service.start().context("Error starting step service")?;

    let status = service.status();
    println!("  Strategy: {}", status.strategy);
    println!("  Steps today: {}", status.daily_steps);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")?;

    let reader_done = Arc::new(AtomicBool::new(false));
    let reader = {
        let sink = service.sink();
        let running = running.clone();
        let done = reader_done.clone();
        let input = input.to_string();
        thread::spawn(move || {
            let result = feed_samples(&input, &sink, &running);
            done.store(true, Ordering::SeqCst);
            result
        })
    };

    while running.load(Ordering::SeqCst) && !reader_done.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    // The reader may still be blocked on stdin after Ctrl+C; leave it behind.
    if reader_done.load(Ordering::SeqCst) {
        match reader.join() {
            Ok(Ok(count)) => println!("Delivered {count} samples"),
            Ok(Err(e)) => eprintln!("Error reading samples: {e}"),
            Err(_) => eprintln!("Sample reader panicked"),
        }
    }

    println!();
    println!("Stopping step engine...");
    let stopped = service.stop();
    let status = service.status();

    // The notifier holds the last bridge sender; dropping the service ends the printer.
    drop(service);
    if printer.join().is_err() {
        eprintln!("Event printer panicked");
    }

    println!("Steps today: {}", status.daily_steps);
    println!();
    println!("{}", status.stats.summary());
    stopped.context("Final flush failed")?;
    Ok(())
}

/// Push samples from a file or stdin, waiting when the queue is full.
fn feed_samples(input: &str, sink: &SampleSink, running: &AtomicBool) -> anyhow::Result<usize> {
    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(std::io::stdin().lock())
    } else {
        let file = std::fs::File::open(PathBuf::from(input))
            .with_context(|| format!("Could not open {input}"))?;
        Box::new(std::io::BufReader::new(file))
    };

    let mut delivered = 0;
    for (idx, line) in reader.lines().enumerate() {
        if !running.load(Ordering::SeqCst) || !sink.is_open() {
            break;
        }
        let line = line.context("Could not read sample input")?;
        let Some(sample) = replay::parse_line(&line, idx + 1)? else {
            continue;
        };
        if !sink.accepts(sample.kind) {
            continue;
        }
        while !sink.push(sample.clone()) {
            if !running.load(Ordering::SeqCst) || !sink.is_open() {
                return Ok(delivered);
            }
            thread::sleep(Duration::from_millis(10));
        }
        delivered += 1;
    }
    Ok(delivered)
}

fn cmd_status() -> anyhow::Result<()> {
    let config = load_config()?;

    println!("Steptrack Agent Status");
    println!("======================");
    println!();

    let store = JsonFileStore::open_or_empty(config.ledger_path());
    let state = read_state(&store);
    println!("Ledger ({:?}):", config.ledger_path());
    println!("  Steps today: {}", state.daily_steps);
    match state.last_saved_date {
        Some(date) => println!("  Last saved date: {date}"),
        None => println!("  Last saved date: never"),
    }
    match state.baseline_steps {
        Some(baseline) => println!("  Counter baseline: {baseline}"),
        None => println!("  Counter baseline: not set"),
    }
    println!("  Counter total since boot: {}", state.total_steps_since_boot);
    println!("  Days archived: {}", state.history.len());
    println!();

    let stats_path = config.stats_path();
    if stats_path.exists() {
        let content = std::fs::read_to_string(&stats_path)
            .with_context(|| format!("Could not read {stats_path:?}"))?;
        match serde_json::from_str::<StatsSnapshot>(&content) {
            Ok(stats) => println!("{}", stats.summary()),
            Err(e) => eprintln!("Warning: Could not parse engine stats: {e}"),
        }
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

fn cmd_steps() -> anyhow::Result<()> {
    let config = load_config()?;
    let service = offline_service(&config);
    println!("{}", service.get_current_steps());
    Ok(())
}

fn cmd_history() -> anyhow::Result<()> {
    let config = load_config()?;
    let service = offline_service(&config);
    let history = service.get_historical_steps();
    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}

fn cmd_add(steps: i64) -> anyhow::Result<()> {
    let config = load_config()?;
    let service = offline_service(&config);
    let daily = service.add_manual_steps(steps)?;
    if let Some(warning) = service.status().persist_warning {
        eprintln!("Warning: steps not saved: {warning}");
    }
    println!("Manual steps added: {steps} ({daily} today)");
    Ok(())
}

fn cmd_reset() -> anyhow::Result<()> {
    let config = load_config()?;
    let service = offline_service(&config);
    service.reset_daily_steps();
    if let Some(warning) = service.status().persist_warning {
        eprintln!("Warning: reset not saved: {warning}");
    }
    println!("Daily steps reset");
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
