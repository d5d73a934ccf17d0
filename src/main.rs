use clap::Parser;
use entity_ingest::source::PipeSource;
use entity_ingest::store::{PostgresStore, StorageAdapter};
use entity_ingest::{Config, Ingestor, Result};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "entity-ingest")]
#[command(about = "Ingests person and company change records from a pipe into PostgreSQL", long_about = None)]
struct Args {
    /// Named pipe or file to read newline-delimited JSON messages from
    #[arg(value_name = "PIPE", env = "INGESTION_PIPE")]
    pipe: Option<PathBuf>,

    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, help = "Create storage tables before ingesting")]
    init_schema: bool,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting entity-ingest");

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(cfg) => {
            info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };
    if let Some(pipe) = args.pipe {
        config.source.path = pipe;
    }

    // A pipe open or read may still be parked on the blocking pool after shutdown.
    entity_ingest::runtime::block_on(config.shutdown_grace(), ingest(config, args.init_schema))?
}

async fn ingest(config: Config, init_schema: bool) -> Result<()> {
    info!(
        postgres_host = %config.postgres.host,
        postgres_port = %config.postgres.port,
        postgres_database = %config.postgres.database,
        source = ?config.source.path,
        reopen_on_eof = config.source.reopen_on_eof,
        retry_max_attempts = config.retry.max_attempts,
        "Configuration summary"
    );

    let mut store = PostgresStore::connect(&config.postgres).await?;
    if init_schema || config.postgres.create_schema {
        store.ensure_schema().await?;
    }

    let adapter = StorageAdapter::new(store, config.retry.policy());
    let mut ingestor = Ingestor::new(PipeSource::new(&config.source.path), adapter, &config.source);

    let outcome = ingestor.run(shutdown_signal()).await;

    if let Err(e) = ingestor.close(config.shutdown_grace()).await {
        warn!("Failed to close storage connection cleanly: {}", e);
    }

    match outcome {
        Ok(stats) => {
            info!(
                lines = stats.lines,
                applied = stats.applied,
                failed = stats.failed(),
                reconnects = stats.reconnects,
                "Closed connection and exiting"
            );
            Ok(())
        }
        Err(e) => {
            error!("Ingestion stopped: {}", e);
            Err(e)
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown requested, finishing current message");
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("entity_ingest=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("entity_ingest=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
