use anyhow::{anyhow, bail, Context, Result};
use crabview::config::{CrabViewConfig, DeviceEntry};
use crabview::testing::{RecordingSink, ScriptedSignaling, SyntheticEngineFactory};
use crabview::{DeviceId, FrameSink, RenderContext, SessionCoordinator, SwitchOutcome};
use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const USAGE: &str = "Usage: crabview-cli <command> [args]

Commands:
  switch <device_id> [--seconds <n>] [--force]   show one camera
  cycle [--rounds <n>] [--dwell <ms>]            flip through every camera
  config [--init]                                print or write the configuration

Options:
  --config <path>   configuration file (default: crabview.toml)
  --json            machine-readable output";

#[tokio::main]
async fn main() -> Result<()> {
    crabview::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "switch" => cmd_switch(&args).await,
        "cycle" => cmd_cycle(&args).await,
        "config" => cmd_config(&args),
        "--help" | "-h" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }
}

/// Options shared by every command
struct CommonArgs {
    config_path: PathBuf,
    json: bool,
    positional: Vec<String>,
    seconds: u64,
    rounds: usize,
    dwell_ms: u64,
    force: bool,
    init: bool,
}

fn parse_args(args: &[String]) -> Result<CommonArgs> {
    let mut parsed = CommonArgs {
        config_path: CrabViewConfig::default_path(),
        json: false,
        positional: Vec::new(),
        seconds: 3,
        rounds: 3,
        dwell_ms: 50,
        force: false,
        init: false,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                parsed.config_path = PathBuf::from(value_at(args, i, "--config")?);
            }
            "--seconds" => {
                i += 1;
                parsed.seconds = value_at(args, i, "--seconds")?.parse()?;
            }
            "--rounds" => {
                i += 1;
                parsed.rounds = value_at(args, i, "--rounds")?.parse()?;
            }
            "--dwell" => {
                i += 1;
                parsed.dwell_ms = value_at(args, i, "--dwell")?.parse()?;
            }
            "--json" => parsed.json = true,
            "--force" => parsed.force = true,
            "--init" => parsed.init = true,
            other if other.starts_with("--") => bail!("Unknown option: {}", other),
            other => parsed.positional.push(other.to_string()),
        }
        i += 1;
    }

    Ok(parsed)
}

fn value_at<'a>(args: &'a [String], index: usize, flag: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} requires a value", flag))
}

fn load_config(path: &Path) -> Result<CrabViewConfig> {
    let mut config = CrabViewConfig::load_from_file(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    if config.devices.is_empty() {
        log::info!("No devices configured, using demo cameras");
        config.devices = demo_devices();
    }
    config.validate()?;
    Ok(config)
}

fn demo_devices() -> Vec<DeviceEntry> {
    (1..=3)
        .map(|n| DeviceEntry::new(format!("cam-{n}"), "live", format!("cam{n}")))
        .collect()
}

/// Coordinator wired to the synthetic engine and the configured directory
struct Runtime {
    coordinator: Arc<SessionCoordinator>,
    engines: SyntheticEngineFactory,
    surface: Arc<RecordingSink>,
}

impl Runtime {
    fn new(config: &CrabViewConfig) -> Self {
        let synthetic = &config.synthetic;
        let engines = SyntheticEngineFactory::new()
            .with_frame_interval(synthetic.frame_interval())
            .with_frame_size(synthetic.frame_width, synthetic.frame_height);

        let coordinator = Arc::new(SessionCoordinator::new(
            Arc::new(config.device_directory()),
            Arc::new(ScriptedSignaling::new()),
            Arc::new(engines.clone()),
            RenderContext::shared(config.render.context_label.clone()),
            &config.session,
        ));

        Self {
            coordinator,
            engines,
            surface: RecordingSink::new(),
        }
    }

    fn surface(&self) -> Arc<dyn FrameSink> {
        self.surface.as_sink()
    }
}

fn interrupt_signal() -> Result<Arc<Notify>> {
    let notify = Arc::new(Notify::new());
    let handler_notify = Arc::clone(&notify);
    ctrlc::set_handler(move || handler_notify.notify_one())
        .context("installing Ctrl-C handler")?;
    Ok(notify)
}

#[derive(Serialize)]
struct SwitchReport {
    device_id: DeviceId,
    outcome: String,
    stream_id: Option<String>,
    frames_rendered: usize,
    stats: crabview::CoordinatorStats,
}

fn describe(outcome: &SwitchOutcome) -> String {
    match outcome {
        SwitchOutcome::Connected(payload) => format!("connected ({})", payload.stream_id),
        SwitchOutcome::Unchanged => "unchanged".to_string(),
        SwitchOutcome::Superseded => "superseded".to_string(),
        SwitchOutcome::Failed(e) => format!("failed: {}", e),
    }
}

async fn cmd_switch(args: &[String]) -> Result<()> {
    let opts = parse_args(args)?;
    let device_id = opts
        .positional
        .first()
        .map(|id| DeviceId::new(id.as_str()))
        .ok_or_else(|| anyhow!("Usage: crabview-cli switch <device_id>"))?;

    let config = load_config(&opts.config_path)?;
    let runtime = Runtime::new(&config);
    let interrupted = interrupt_signal()?;

    let outcome = runtime
        .coordinator
        .switch_to(device_id.clone(), opts.force)
        .await;
    runtime.coordinator.attach_renderer(&runtime.surface());

    if outcome.is_connected() {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(opts.seconds)) => {}
            _ = interrupted.notified() => log::info!("Interrupted"),
        }
    }

    runtime.coordinator.shutdown().await;

    let report = SwitchReport {
        device_id,
        stream_id: match &outcome {
            SwitchOutcome::Connected(payload) => Some(payload.stream_id.clone()),
            _ => None,
        },
        outcome: describe(&outcome),
        frames_rendered: runtime.surface.frames().len(),
        stats: runtime.coordinator.stats(),
    };

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}: {}", report.device_id, report.outcome);
        println!("Frames rendered: {}", report.frames_rendered);
        println!(
            "Frames dropped: {}  failed: {}",
            report.stats.frames.dropped, report.stats.frames.failed
        );
    }

    if let Some(e) = outcome.error() {
        bail!("switch failed: {}", e);
    }
    Ok(())
}

#[derive(Serialize)]
struct CycleReport {
    requests: usize,
    connected: usize,
    superseded: usize,
    failed: usize,
    final_device: Option<DeviceId>,
    max_live_engines: usize,
    frames_rendered: usize,
    stats: crabview::CoordinatorStats,
}

async fn cmd_cycle(args: &[String]) -> Result<()> {
    let opts = parse_args(args)?;
    let config = load_config(&opts.config_path)?;
    let runtime = Runtime::new(&config);
    let interrupted = interrupt_signal()?;
    let devices: Vec<DeviceId> = config.devices.iter().map(|d| d.id.clone()).collect();

    runtime.coordinator.attach_renderer(&runtime.surface());

    let mut handles = Vec::new();
    'rounds: for round in 0..opts.rounds {
        for device_id in &devices {
            log::debug!("Round {}: requesting {}", round + 1, device_id);
            handles.push(runtime.coordinator.request_switch(device_id.clone(), false));
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(opts.dwell_ms)) => {}
                _ = interrupted.notified() => {
                    log::info!("Interrupted");
                    break 'rounds;
                }
            }
        }
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(handle.await.context("switch task panicked")?);
    }

    // Rebind after the last switch cleared the target
    runtime.coordinator.attach_renderer(&runtime.surface());
    tokio::time::sleep(config.synthetic.frame_interval() * 3).await;
    let final_device = runtime.coordinator.current_device_id();
    runtime.coordinator.shutdown().await;

    let count = |pred: fn(&SwitchOutcome) -> bool| outcomes.iter().filter(|o| pred(o)).count();
    let report = CycleReport {
        requests: outcomes.len(),
        connected: count(|o| o.is_connected()),
        superseded: count(|o| matches!(o, SwitchOutcome::Superseded)),
        failed: count(|o| o.error().is_some()),
        final_device,
        max_live_engines: runtime.engines.max_live(),
        frames_rendered: runtime.surface.frames().len(),
        stats: runtime.coordinator.stats(),
    };

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Requests: {}  connected: {}  superseded: {}  failed: {}",
            report.requests, report.connected, report.superseded, report.failed
        );
        match &report.final_device {
            Some(device) => println!("Last connected device: {}", device),
            None => println!("Last connected device: none"),
        }
        println!("Max simultaneous engines: {}", report.max_live_engines);
        println!("Frames rendered: {}", report.frames_rendered);
    }
    Ok(())
}

fn cmd_config(args: &[String]) -> Result<()> {
    let opts = parse_args(args)?;

    if opts.init {
        if opts.config_path.exists() {
            bail!("{} already exists", opts.config_path.display());
        }
        let config = CrabViewConfig {
            devices: demo_devices(),
            ..CrabViewConfig::default()
        };
        config.save_to_file(&opts.config_path)?;
        println!("Wrote {}", opts.config_path.display());
        return Ok(());
    }

    let config = CrabViewConfig::load_from_file(&opts.config_path)?;
    config.validate()?;
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}
