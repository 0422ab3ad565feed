use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use radar_proto::config::Config;
use radar_proto::protocol::Product;
use radar_proto::state::StateStore;
use radar_viewer::core::{ViewerCore, ViewerEvent};
use radar_viewer::fetch::HttpMetadataSource;
use radar_viewer::http::{self, ClientConfig};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Weather-radar overlay viewer: frame sequencing, playback and control API.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Product to show first (CMAX, STEPS)
    #[arg(long)]
    product: Option<Product>,

    /// HTTP control API port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup file + stderr logging
    let data_dir = radar_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    let log_path = data_dir.join("viewer.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Allow RUST_LOG override; keep HTTP client internals quiet by default.
    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,radar_viewer=debug,hyper_util=warn,reqwest=warn",
                )
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!(
        "Config loaded from: {:?}",
        args.config.clone().unwrap_or_else(Config::config_path)
    );
    if let Some(port) = args.port {
        config.http.port = port;
    }

    let source = HttpMetadataSource::new(
        config.source.metadata_url.clone(),
        config.source.request_timeout(),
    )?;
    info!("Metadata endpoint: {}", source.url());

    let store = StateStore::new(config.daemon.state_file.clone());
    let core = ViewerCore::new(config.clone(), Arc::new(source), store, args.product);
    let view_rx = core.subscribe();

    // Event channel: every external input funnels into ViewerCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<ViewerEvent>(256);

    if config.http.enabled {
        http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            view_rx,
            event_tx.clone(),
            ClientConfig::from_config(&config),
        );
    }

    let core_task = tokio::spawn(core.run(event_rx));

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down");
    let _ = event_tx.send(ViewerEvent::Shutdown).await;
    core_task.await??;

    Ok(())
}
