//! ear-daemon - Main entry point
//!
//! Listens until Ctrl+C / SIGTERM. Corrections can be typed on stdin as
//! `correct:Artist - Title`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use ear_common::config::{default_config_file, resolve_root_folder, ROOT_FOLDER_ENV};
use ear_common::{Clock, EventBus, SystemClock};
use ear_daemon::audio::{find_monitor_source, list_input_devices, CpalCaptureDevice};
use ear_daemon::feedback::FeedbackStore;
use ear_daemon::lyrics::{self, LyricsChain};
use ear_daemon::recognition::{self, RecognitionChain};
use ear_daemon::{DataPaths, EarConfig, Supervisor};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prefix of stdin correction commands
const CORRECT_PREFIX: &str = "correct:";

/// Command-line arguments for ear-daemon
#[derive(Parser, Debug)]
#[command(name = "ear-daemon")]
#[command(about = "Ambient audio listener: features, recognition, lyrics")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "EAR_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder for logs and state (overrides EAR_ROOT_FOLDER and config)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Input device name
    #[arg(short, long)]
    device: Option<String>,

    /// Capture system audio through a pipewire/pulse monitor source
    #[arg(short, long)]
    system: bool,

    /// List input devices and exit
    #[arg(short, long)]
    list_devices: bool,

    /// Print every event line on stdout
    #[arg(long)]
    print_events: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_file);
    let mut config = EarConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if args.list_devices {
        let devices = list_input_devices().context("Failed to list input devices")?;
        println!("Available audio inputs:");
        for name in devices {
            println!("  {}", name);
        }
        return Ok(());
    }

    if let Some(path) = &config_path {
        info!("Configuration: {}", path.display());
    }

    if args.device.is_some() {
        config.audio.device = args.device.clone();
    }
    if args.system || config.audio.use_monitor_source {
        match find_monitor_source() {
            Some(name) => {
                info!("Using system audio capture: {}", name);
                config.audio.device = Some(name);
            }
            None if args.system => bail!("No pipewire/pulse monitor source found"),
            None => warn!("No monitor source found, using configured input"),
        }
    }

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, config_path.as_deref());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let paths = DataPaths::new(&root_folder, clock.utc_now());
    paths.ensure_dirs().context("Failed to create log directory")?;

    info!("Root folder: {}", root_folder.display());
    info!(
        "Sample rate: {}Hz, channels: {}, window: {}s, tick: {}ms",
        config.audio.sample_rate,
        config.audio.channels,
        config.analysis.window_seconds,
        config.pipeline.tick_ms
    );

    let recognition = RecognitionChain::new(
        recognition::default_providers(&config.recognition).context("Failed to build recognition providers")?,
        config.recognition.cooldown(),
        config.recognition.timeout(),
        Arc::clone(&clock),
    );
    if config.lyrics.genius_api_token.is_none() {
        warn!("No GENIUS_API_TOKEN set, lyrics come from lyrics.ovh only");
    }
    let lyrics = LyricsChain::new(
        lyrics::default_providers(&config.lyrics).context("Failed to build lyric providers")?,
        config.lyrics.timeout(),
    );
    let feedback = FeedbackStore::open(&paths.feedback_file).context("Failed to load feedback history")?;

    let bus = EventBus::new(config.pipeline.event_bus_capacity);
    let supervisor = Arc::new(
        Supervisor::new(
            config,
            paths,
            Arc::new(CpalCaptureDevice::new()),
            recognition,
            lyrics,
            feedback,
            clock,
            bus,
        )
        .echo_events(args.print_events),
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));
    tokio::spawn(stdin_corrections(Arc::clone(&supervisor), spawn_stdin_reader(), cancel.clone()));

    supervisor.run(cancel).await.context("Supervisor failed")?;

    info!("Shutdown complete");
    Ok(())
}

/// Parse `correct:Artist - Title`
fn parse_correction(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim().strip_prefix(CORRECT_PREFIX)?;
    let (artist, title) = rest.split_once(" - ")?;
    Some((artist.trim(), title.trim()))
}

/// Blocking stdin reads live on a detached thread so they never hold up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("ear-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("stdin corrections disabled: {}", e);
    }
    rx
}

async fn stdin_corrections(
    supervisor: Arc<Supervisor>,
    mut lines: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return,
            line = lines.recv() => line,
        };
        let Some(line) = line else { return };

        if !line.trim().starts_with(CORRECT_PREFIX) {
            continue;
        }
        match parse_correction(&line) {
            Some((artist, title)) => {
                if let Err(e) = supervisor.correct(title, artist) {
                    warn!("Correction rejected: {}", e);
                }
            }
            None => warn!("Format: correct:Artist - Title"),
        }
    }
}

/// Cancel on Ctrl+C or SIGTERM
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
    cancel.cancel();
}
