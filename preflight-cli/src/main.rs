//! Preflight CLI - run the client bootstrap pipeline from the terminal.
//!
//! Resolves settings (CLI arguments over config file over defaults), wires
//! the disk store and HTTP transport into the pipeline, and ticks the
//! machine until it hands off, aborts, or stalls beyond the grace period.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use preflight::config::{BootstrapConfig, BuildInfo, LaunchMode};
use preflight::pipeline::{AbortReason, PipelineMachine, PipelineOutcome, PipelineServices};
use preflight::store::DiskResourceStore;
use preflight::transport::HttpTransport;

mod collab;
mod config_file;
mod error;

use collab::{ConsolePrompt, FileContentLoader, IndicatifProgressSink};
use config_file::ConfigFile;
use error::CliError;

/// Scheduler tick interval.
const TICK: Duration = Duration::from_millis(50);

/// Ticks a stalled state is allowed to sit on an error before the CLI
/// gives up (10 seconds at the tick interval).
const STALL_GRACE_TICKS: u64 = 200;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Skip all version and resource checks.
    Passthrough,
    /// Use the resources shipped on disk, never update.
    Package,
    /// Check the server and update resources as needed.
    Updatable,
}

impl From<ModeArg> for LaunchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Passthrough => LaunchMode::Passthrough,
            ModeArg::Package => LaunchMode::Package,
            ModeArg::Updatable => LaunchMode::Updatable,
        }
    }
}

#[derive(Parser)]
#[command(name = "preflight", version, about = "Client bootstrap and resource updater")]
struct Cli {
    /// Launch mode (overrides the config file)
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Path to config.ini
    #[arg(long)]
    config: Option<PathBuf>,

    /// Resource store directory
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Version-check URL template; `{platform}` is substituted
    #[arg(long)]
    check_url: Option<String>,

    /// Treat the network as metered and confirm before downloading
    #[arg(long)]
    metered: bool,

    /// Scene id to hand off to after preloading
    #[arg(long)]
    scene: Option<u32>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "bootstrap failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let file = load_config_file(cli.config.as_deref())?;

    let mode = cli.mode.map(LaunchMode::from).unwrap_or(file.mode);
    let store_dir = cli
        .store_dir
        .or_else(|| file.store_dir.clone())
        .or_else(|| dirs::data_dir().map(|d| d.join("preflight")))
        .unwrap_or_else(|| PathBuf::from("./preflight-data"));

    let check_version_url = match cli.check_url.or_else(|| file.check_version_url.clone()) {
        Some(url) => url,
        None if mode == LaunchMode::Updatable => {
            return Err(CliError::Config(
                "check_version_url is required in updatable mode \
                 (set it in config.ini or pass --check-url)"
                    .to_string(),
            ));
        }
        None => String::new(),
    };

    let mut config = BootstrapConfig::new(mode)
        .with_first_scene(cli.scene.unwrap_or(file.first_scene))
        .with_metered_network(cli.metered || file.metered)
        .with_max_retries(file.max_retries);
    config.timeout = Duration::from_secs(file.timeout_secs);
    config.parallel_downloads = file.parallel;

    let build_info = BuildInfo {
        version_label: env!("CARGO_PKG_VERSION").to_string(),
        internal_version: file.internal_version,
        check_version_url,
        update_url: file.update_url.clone(),
    };

    info!(
        ?mode,
        store = %store_dir.display(),
        "starting bootstrap"
    );

    let store = Arc::new(DiskResourceStore::open(&store_dir)?);
    let transport = Arc::new(
        HttpTransport::new(&config, store.clone())
            .map_err(|e| CliError::Transport(e.to_string()))?,
    );
    let preload_paths = file
        .preload_files
        .iter()
        .map(|name| store_dir.join("bundles").join(name))
        .collect();
    let loader = Arc::new(FileContentLoader::new(preload_paths));
    let sink = Arc::new(IndicatifProgressSink::new());
    let prompt = Arc::new(ConsolePrompt);

    let services = PipelineServices::new(
        transport,
        store,
        loader,
        sink.clone(),
        prompt,
        build_info,
        config,
    );
    let mut machine = PipelineMachine::new(services);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .map_err(|e| CliError::Interrupt(e.to_string()))?;
    }

    let mut last_tick = Instant::now();
    loop {
        if interrupted.load(Ordering::SeqCst) {
            machine.shutdown();
            sink.finish();
            eprintln!("interrupted");
            return Ok(ExitCode::from(130));
        }

        let dt = last_tick.elapsed();
        last_tick = Instant::now();

        if let Some(outcome) = machine.tick(dt) {
            let outcome = outcome.clone();
            sink.finish();
            return Ok(report_outcome(&outcome));
        }

        let status = machine.status();
        if status.session_fatal {
            machine.shutdown();
            sink.finish();
            eprintln!(
                "update failed: {}",
                status.stall.unwrap_or_else(|| "unknown error".to_string())
            );
            return Ok(ExitCode::FAILURE);
        }
        if let Some(stall) = &status.stall {
            if status.ticks_in_state >= STALL_GRACE_TICKS {
                machine.shutdown();
                sink.finish();
                eprintln!("bootstrap stalled: {}", stall);
                return Ok(ExitCode::FAILURE);
            }
            if status.ticks_in_state % 40 == 0 {
                warn!(state = ?status.state, error = %stall, "pipeline stalled, waiting");
            }
        }

        thread::sleep(TICK);
    }
}

fn load_config_file(path: Option<&std::path::Path>) -> Result<ConfigFile, CliError> {
    match path {
        Some(path) => ConfigFile::load(path),
        None => {
            let default = dirs::config_dir().map(|d| d.join("preflight").join("config.ini"));
            match default {
                Some(path) if path.exists() => ConfigFile::load(&path),
                _ => Ok(ConfigFile::default()),
            }
        }
    }
}

fn report_outcome(outcome: &PipelineOutcome) -> ExitCode {
    match outcome {
        PipelineOutcome::Handoff(request) => {
            println!("ready: scene {}", request.scene_id);
            ExitCode::SUCCESS
        }
        PipelineOutcome::Aborted(AbortReason::UpdateRedirect { url }) => {
            println!("a newer client is required, download it from: {}", url);
            ExitCode::SUCCESS
        }
        PipelineOutcome::Aborted(AbortReason::UserQuit) => {
            println!("cancelled");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_arg_conversion() {
        assert_eq!(
            LaunchMode::from(ModeArg::Passthrough),
            LaunchMode::Passthrough
        );
        assert_eq!(LaunchMode::from(ModeArg::Package), LaunchMode::Package);
        assert_eq!(LaunchMode::from(ModeArg::Updatable), LaunchMode::Updatable);
    }

    #[test]
    fn test_missing_check_url_is_rejected_in_updatable_mode() {
        let file = ConfigFile::default();
        assert!(file.check_version_url.is_none());
        assert_eq!(file.mode, LaunchMode::Updatable);
    }
}
