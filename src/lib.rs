// Module declarations for the application's core components
pub mod config;    // Configuration management
pub mod error;     // Protocol error taxonomy
pub mod hub;       // Snapshot fan-out to subscribers
pub mod mk2;       // MK2 protocol driver
pub mod mock;      // Synthetic snapshot source
pub mod options;   // Command line options parsing
pub mod prelude;   // Common imports and types
pub mod reporter;  // Logs snapshots
pub mod transport; // Serial and TCP stream openers

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::config::Source;
use crate::hub::Hub;
use crate::mock::Mock;
use crate::prelude::*;
use crate::reporter::Reporter;
use std::io::Write;

/// Whatever is producing snapshots, so it can be shut down the same way.
pub enum Link {
    Mk2(Connection),
    Mock(Mock),
}

impl Link {
    /// Opens the configured source. Failing to open is not retried.
    pub async fn open(config: &Config) -> Result<(Self, mpsc::Receiver<Snapshot>)> {
        let r = match config.source() {
            Source::Serial => {
                let (connection, rx) = Connection::open(crate::transport::serial(config.device())?);
                (Link::Mk2(connection), rx)
            }
            Source::Tcp => {
                let stream = crate::transport::tcp(config.host()).await?;
                let (connection, rx) = Connection::open(stream);
                (Link::Mk2(connection), rx)
            }
            Source::Mock => {
                let (mock, rx) = Mock::open();
                (Link::Mock(mock), rx)
            }
        };

        Ok(r)
    }

    pub async fn close(self) {
        match self {
            Link::Mk2(connection) => connection.close().await,
            Link::Mock(mock) => mock.close().await,
        }
    }
}

/// Sets up env_logger with `level` as the default filter. `RUST_LOG` still
/// takes precedence. Safe to call more than once; later calls are ignored.
pub fn init_logging(level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();
}

/// Main application entry point
pub async fn app() -> Result<()> {
    let options = Options::new();

    let config = match Config::load(&options.config_file) {
        Ok(config) => config,
        Err(err) => {
            init_logging("info");
            return Err(err.context("Failed to load config"));
        }
    };

    init_logging(config.loglevel());
    info!(
        "mk2-bridge {} starting with config file: {}",
        CARGO_PKG_VERSION, options.config_file
    );
    config.log();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
        }
        let _ = shutdown_tx.send(());
    });

    run(config, shutdown_rx).await
}

/// Opens the source, wires up the hub and reporter and runs until `shutdown`
/// fires.
pub async fn run(config: Config, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let (link, snapshots) = Link::open(&config).await?;
    let hub = Hub::new(snapshots);

    let reporter = if config.reporter().enabled() {
        let rx = hub.subscribe().await?;
        Some(tokio::spawn(Reporter::new(rx).start()))
    } else {
        None
    };

    info!("Waiting for shutdown signal...");
    let _ = shutdown.recv().await;
    info!("Shutdown signal received, stopping components...");

    // closing the source closes the hub, which in turn ends every subscriber
    link.close().await;
    hub.join().await;

    if let Some(handle) = reporter {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Reporter failed: {}", e),
            Err(e) => error!("Error waiting for reporter task: {}", e),
        }
    }

    info!("Shutdown complete");
    Ok(())
}
