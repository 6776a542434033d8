//! Radarwatch CLI entry point.
//!
//! Provides `run`, `recipients`, and `decode` subcommands for running the
//! bridge, resolving the Telegram recipient list once, or checking how a
//! single device line decodes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};

use radarwatch::alert::{self, AlertGate};
use radarwatch::config::{self, IgnoredOverride, RadarwatchConfig};
use radarwatch::decoder::{self, LineEvent};
use radarwatch::forwarder::accept_consumer;
use radarwatch::ingest::IngestLoop;
use radarwatch::logging;
use radarwatch::notify::{resolve_recipients, NotificationApi, Notifier, TelegramApi};
use radarwatch::source::{LineSource, SerialSource};
use radarwatch::store::{EnvFileStore, KeyValueStore, MemoryStore};

/// Radarwatch: serial radar bridge with Telegram alerts.
#[derive(Parser)]
#[command(name = "radarwatch", version, about)]
struct Cli {
    /// Config file (defaults to `$RADARWATCH_CONFIG_PATH` or `./radarwatch.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the bridge until interrupted.
    Run,
    /// Merge discovered and stored recipients, persist, and print the result.
    Recipients {
        /// Show the merged list without writing the store.
        #[arg(long)]
        dry_run: bool,
    },
    /// Decode one device line and print the result.
    Decode {
        /// Raw line, e.g. `90,42,0,1.`
        line: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run => handle_run(cli.config).await,
        Command::Recipients { dry_run } => handle_recipients(cli.config, dry_run).await,
        Command::Decode { line } => handle_decode(&line),
    }
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Load the config. Skipped overrides come back for logging once a
/// subscriber is installed.
fn load(explicit: Option<PathBuf>) -> anyhow::Result<(RadarwatchConfig, Vec<IgnoredOverride>)> {
    let path = config::config_path(explicit.as_deref(), process_env);
    config::load_config(&path, process_env)
        .with_context(|| format!("failed to load {}", path.display()))
}

fn report_ignored(ignored: &[IgnoredOverride]) {
    for skipped in ignored {
        warn!(var = skipped.var, value = %skipped.value, "ignoring invalid env override");
    }
}

/// Build the Telegram client from the token in the store.
///
/// A missing token is not fatal: the bridge still forwards frames, and
/// every send attempt will fail and be logged.
fn build_api(
    config: &RadarwatchConfig,
    store: &dyn KeyValueStore,
) -> anyhow::Result<Arc<dyn NotificationApi>> {
    let key = &config.telegram.bot_token_key;
    let token = match store.get(key) {
        Ok(Some(token)) if !token.trim().is_empty() => token,
        Ok(_) => {
            warn!(key = %key, "bot token not set, alerts will not be delivered");
            String::new()
        }
        Err(e) => {
            warn!(error = %e, key = %key, "failed to read bot token, alerts will not be delivered");
            String::new()
        }
    };

    let api = TelegramApi::new(
        &config.telegram.api_base,
        token.trim(),
        Duration::from_secs(config.telegram.request_timeout_secs),
    )
    .context("failed to build Telegram client")?;
    Ok(Arc::new(api))
}

/// Resolves when the operator interrupts the process.
async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c, running until the source ends");
        std::future::pending::<()>().await;
    }
}

/// Run the bridge.
async fn handle_run(explicit: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, ignored) = load(explicit)?;
    let _logging_guard = logging::init_production(&config.logging.dir, &config.logging.level)?;
    report_ignored(&ignored);

    info!(
        serial = %config.serial.port,
        bind = %config.forward.bind,
        cooldown_secs = config.alerts.cooldown_secs,
        "radarwatch starting"
    );

    // Recipients are fixed for the lifetime of the process.
    let mut store = EnvFileStore::new(&config.store.env_file);
    let api = build_api(&config, &store)?;
    let resolution = resolve_recipients(
        api.as_ref(),
        &mut store,
        &config.telegram.recipients_key,
        config.telegram.discover,
    )
    .await;
    let notifier = Notifier::new(Arc::clone(&api), resolution.recipients);

    let mut source = SerialSource::open(&config.serial).context("failed to open sensor link")?;

    let bind = config.bind_addr()?;
    let listener = match TcpListener::bind(bind).await {
        Ok(listener) => listener,
        Err(e) => {
            if let Err(release_err) = source.release().await {
                warn!(error = %release_err, "failed to release serial source");
            }
            return Err(e).with_context(|| format!("failed to bind visualizer socket {bind}"));
        }
    };
    info!(%bind, "waiting for visualizer connection");

    let (sink, _peer) = tokio::select! {
        accepted = accept_consumer(&listener) => {
            accepted.context("failed to accept visualizer connection")?
        }
        () = interrupt() => {
            info!("interrupted before a visualizer connected");
            if let Err(e) = source.release().await {
                warn!(error = %e, "failed to release serial source");
            }
            return Ok(());
        }
    };

    let gate = AlertGate::new(Duration::from_secs(config.alerts.cooldown_secs));
    let report = IngestLoop::new(source, sink, gate, notifier)
        .with_listener(listener)
        .run(interrupt())
        .await;

    info!(
        lines = report.stats.lines_read,
        source_ended = report.source_ended,
        "radarwatch stopped"
    );
    Ok(())
}

/// Resolve recipients once and print them.
async fn handle_recipients(explicit: Option<PathBuf>, dry_run: bool) -> anyhow::Result<()> {
    let (config, ignored) = load(explicit)?;
    logging::init_cli(&config.logging.level);
    report_ignored(&ignored);

    let key = config.telegram.recipients_key.clone();
    let mut file_store = EnvFileStore::new(&config.store.env_file);
    let api = build_api(&config, &file_store)?;

    let resolution = if dry_run {
        let mut scratch = MemoryStore::default();
        if let Some(current) = file_store
            .get(&key)
            .with_context(|| format!("failed to read {}", file_store.path().display()))?
        {
            scratch
                .set(&key, &current)
                .context("failed to stage stored recipients")?;
        }
        resolve_recipients(api.as_ref(), &mut scratch, &key, config.telegram.discover).await
    } else {
        resolve_recipients(api.as_ref(), &mut file_store, &key, config.telegram.discover).await
    };

    for recipient in &resolution.recipients {
        let marker = if resolution.newly_discovered.contains(recipient) {
            " (new)"
        } else {
            ""
        };
        println!("{recipient}{marker}");
    }
    info!(
        total = resolution.recipients.len(),
        new = resolution.newly_discovered.len(),
        persisted = resolution.persisted_changed,
        dry_run,
        "recipients resolved"
    );
    Ok(())
}

/// Decode one line the way the bridge would.
fn handle_decode(line: &str) -> anyhow::Result<()> {
    logging::init_cli("warn");

    match decoder::decode_line(line).context("line did not decode")? {
        LineEvent::Frame(frame) => {
            println!(
                "frame angle={} distance={} motion1={} motion2={}",
                frame.angle, frame.distance, frame.motion1, frame.motion2
            );
            if alert::is_triggered(&frame) {
                let coordinate = alert::polar_to_cartesian(frame.angle, frame.distance);
                println!("{}", alert::format_alert(&frame, &coordinate));
            }
        }
        LineEvent::Empty => println!("empty"),
        LineEvent::DangerText(text) => println!("danger {text}"),
    }
    Ok(())
}
