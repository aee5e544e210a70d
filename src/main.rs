#![forbid(unsafe_code)]

//! `modwatch` moderation log binary.
//!
//! Reads gateway notifications as JSON lines, attributes them through the
//! audit log, and writes one log line per event to the configured channel
//! or to stdout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use modwatch::attribution::{AuditCorrelator, CorrelatorSettings, EchoSuppressor, ReasonParser};
use modwatch::config::GlobalConfig;
use modwatch::dispatch::{AttributionDriver, DriverSettings, EventFilter, ListenerRegistry};
use modwatch::emitter::{ChannelSink, LogEmitter, LogSink, StdoutSink};
use modwatch::models::raw::RawEvent;
use modwatch::platform::{AuditFeed, GuildCache, GuildDirectory, RestClient};
use modwatch::{AppError, Result};

const EMITTER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "modwatch", about = "Moderation log with audit log attribution", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Read notifications from this file instead of stdin.
    #[arg(long)]
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("modwatch bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_credentials().await?;
    info!("configuration loaded");

    let guilds = Arc::new(GuildCache::new());
    for (guild_id, role_id) in config.mute_roles() {
        guilds.set_mute_role(guild_id, Some(role_id));
    }

    let client = Arc::new(RestClient::new(&config.platform)?);

    // ── Attribution engine ──────────────────────────────
    let settings = CorrelatorSettings::from(&config.attribution);
    let parser = if settings.reason_attribution {
        Some(ReasonParser::new()?)
    } else {
        None
    };
    let feed: Arc<dyn AuditFeed> = Arc::clone(&client) as Arc<dyn AuditFeed>;
    let directory: Arc<dyn GuildDirectory> = Arc::clone(&guilds) as Arc<dyn GuildDirectory>;
    let correlator = AuditCorrelator::with_reason_parser(feed, directory, settings, parser);
    let suppressor = EchoSuppressor::new(config.attribution.suppression_window());
    let listeners = ListenerRegistry::new();

    // ── Log emitter ─────────────────────────────────────
    let sink: Arc<dyn LogSink> = match config.log_channel_id {
        Some(channel_id) => {
            info!(%channel_id, "logging to channel");
            Arc::new(ChannelSink::new(Arc::clone(&client), channel_id))
        }
        None => {
            info!("no log channel configured; logging to stdout");
            Arc::new(StdoutSink)
        }
    };
    let (emitter, emitter_task) = LogEmitter::start(sink);
    listeners.register(EventFilter::All, Arc::new(emitter));

    let driver = AttributionDriver::new(
        correlator,
        suppressor,
        listeners,
        Arc::clone(&guilds),
        DriverSettings::from_config(config.bot_user_id, &config.attribution),
    );

    // ── Read notifications until EOF or signal ──────────
    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    let reader: Box<dyn AsyncBufRead + Send + Unpin> = match &args.input {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    read_events(reader, &driver, &ct).await?;

    if !ct.is_cancelled() {
        info!("input exhausted; waiting for outstanding lookups");
        let grace = config.attribution.default_timeout() + config.attribution.poll_interval();
        tokio::select! {
            () = tokio::time::sleep(grace) => {}
            () = ct.cancelled() => {}
        }
    }

    // ── Graceful shutdown ───────────────────────────────
    driver.shutdown();
    drop(driver);

    if tokio::time::timeout(EMITTER_FLUSH_TIMEOUT, emitter_task)
        .await
        .is_err()
    {
        warn!("log emitter did not flush in time");
    }
    info!("modwatch shut down");

    Ok(())
}

/// Feed JSON-lines notifications to the driver in order.
async fn read_events(
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
    driver: &AttributionDriver,
    ct: &CancellationToken,
) -> Result<()> {
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            () = ct.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<RawEvent>(line) {
            Ok(event) => driver.handle(event),
            Err(err) => error!(%err, "skipping malformed notification"),
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Stdout may carry the event log; diagnostics go to stderr.
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
