// ABOUTME: Main entry point for VacBot
// ABOUTME: Parses the CLI, initializes logging and config, and runs the dispatcher until stopped

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vacbot::config::{Config, FrontendKind};
use vacbot::frontend::TerminalFrontend;
use vacbot::responder::CannedResponder;
use vacbot_core::{Dispatcher, DispatcherConfig, Frontend, Responder};

#[derive(Parser)]
#[command(name = "vacbot")]
#[command(about = "Conversational bot that answers chat messages through a worker pool")]
#[command(version)]
struct Cli {
    /// Path to config.toml (overrides VACBOT_CONFIG_PATH and the default locations)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot until the front-end closes or a stop signal arrives
    Start,

    /// Print the resolved configuration
    Config,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; the terminal front-end owns stdout
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    dotenvy::dotenv().ok();
    let config = Config::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Config => {
            println!("{:#?}", config);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Start => start(config).await,
    }
}

async fn start(config: Config) -> Result<ExitCode> {
    tracing::info!(
        frontend = ?config.frontend.kind,
        worker_threads = config.dispatcher.worker_threads,
        max_queued_tasks = config.dispatcher.resolved_max_queued_tasks(),
        "Starting VacBot"
    );

    if let Some(addr) = config.metrics.listen {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        vacbot_core::metrics::describe();
        tracing::info!(%addr, "Metrics endpoint listening");
    }

    let dispatcher_config = config.dispatcher.to_dispatcher_config();
    let responder = CannedResponder::new()?;

    match config.frontend.kind {
        FrontendKind::Terminal => {
            serve(TerminalFrontend::stdio(), responder, dispatcher_config).await
        }
        FrontendKind::Telegram => start_telegram(&config, responder, dispatcher_config).await,
    }
}

#[cfg(feature = "telegram")]
async fn start_telegram(
    config: &Config,
    responder: CannedResponder,
    dispatcher_config: DispatcherConfig,
) -> Result<ExitCode> {
    use vacbot::frontend::{TelegramFrontend, TelegramResponder};

    let telegram = config
        .telegram
        .as_ref()
        .context("telegram section missing from configuration")?;
    let frontend = TelegramFrontend::connect(telegram).await?;
    serve(frontend, TelegramResponder::new(responder), dispatcher_config).await
}

#[cfg(not(feature = "telegram"))]
async fn start_telegram(
    _config: &Config,
    _responder: CannedResponder,
    _dispatcher_config: DispatcherConfig,
) -> Result<ExitCode> {
    anyhow::bail!("vacbot was built without the `telegram` feature")
}

/// Run the dispatch loop until the front-end closes or a stop signal arrives,
/// then stop the dispatcher and map the outcome to an exit code
async fn serve<F, R>(frontend: F, responder: R, config: DispatcherConfig) -> Result<ExitCode>
where
    F: Frontend,
    R: Responder<F::Metadata>,
{
    let dispatcher = Dispatcher::new(frontend, responder, config);

    let run = dispatcher.run();
    tokio::pin!(run);

    let outcome = tokio::select! {
        result = &mut run => {
            result?;
            tracing::info!("Front-end closed, stopping");
            dispatcher.stop().await
        }
        _ = stop_signal() => {
            tracing::info!("Stop signal received");
            // Stopping interrupts the loop; let it return instead of dropping it mid-task
            let (outcome, result) = tokio::join!(dispatcher.stop(), &mut run);
            result?;
            outcome
        }
    };

    match outcome {
        Ok(report) => {
            tracing::info!(?report, "VacBot stopped");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(error = %e, "VacBot did not stop cleanly");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM
async fn stop_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
