// Drover Daemon - Main Entry Point
// Composition root: settings, logging, SQLite transport, demo pipelines

mod demo;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use demo::DemoFactory;
use drover_core::application::TaskManager;
use drover_infra_sqlite::{create_pool, run_migrations, SqliteTransport};
use settings::{LogFormat, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_LOG_FILTER: &str = "drover=info";
const LOG_FILE_PREFIX: &str = "drover.log";

#[derive(Parser, Debug)]
#[command(name = "drover", version, about = "Elastic background queue workers")]
struct Cli {
    /// TOML settings file
    #[arg(short, long, env = "DROVER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Settings
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    // 2. Logging (guard flushes the file writer on exit)
    let _log_guard = init_tracing(&settings)?;
    info!("Drover v{} starting...", VERSION);

    // 3. Database
    if let Some(parent) = settings.database_file().as_deref().and_then(|f| f.parent()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let database_url = settings.database_url();
    info!(database = %database_url, "Initializing database...");

    let pool = create_pool(&database_url)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Transport + task roster
    let transport = Arc::new(SqliteTransport::new());
    transport
        .register(database_url, pool)
        .map_err(|e| anyhow::anyhow!("Transport setup failed: {}", e))?;

    let manager = TaskManager::<Settings>::single(Arc::new(DemoFactory::new(transport)))
        .with_stagger(settings.stagger());

    // 5. Run until a shutdown signal, then stop and dispose
    let signals = ShutdownSignals::register();
    info!("Press Ctrl+C to shutdown");
    let report = manager.serve(Some(&settings), shutdown_signal(signals)).await;

    info!(
        started = report.started,
        attempted = report.attempted,
        "Shutdown complete."
    );
    Ok(())
}

fn init_tracing(settings: &Settings) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .context("Failed to create env filter")?;

    // Optional daily file mirror, always JSON
    let (file_layer, guard) = match settings.log_dir() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().json().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    match settings.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
    }

    Ok(guard)
}

async fn shutdown_signal(signals: std::io::Result<ShutdownSignals>) {
    match signals {
        Ok(signals) => {
            signals.recv().await;
            info!("Shutdown signal received. Exiting gracefully...");
        }
        Err(e) => {
            error!(error = %e, "Signal handlers unavailable; waiting for Ctrl+C");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Ctrl+C handler failed");
            }
        }
    }
}

/// OS shutdown signals, hooked at construction so none is missed during startup
#[cfg(unix)]
struct ShutdownSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn recv(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => {},
            _ = self.terminate.recv() => {},
            _ = self.quit.recv() => {},
        }
    }
}

#[cfg(not(unix))]
struct ShutdownSignals {
    ctrl_c: tokio::signal::windows::CtrlC,
}

#[cfg(not(unix))]
impl ShutdownSignals {
    fn register() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    async fn recv(mut self) {
        self.ctrl_c.recv().await;
    }
}
