use anyhow::{Context, Result};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::filter::Directive;

use xau_advisor::config::AdvisorConfig;
use xau_advisor::data::{open_source, SnapshotFiles};
use xau_advisor::types::AppState;
use xau_advisor::{api, trading_core::report::DEFAULT_INSTRUMENT};

#[derive(Parser, Debug)]
#[command(author, version, about = "XAUUSD market analysis and trade recommendation server")]
struct Args {
    /// Port to run the web server on
    #[arg(short, long, env = "XAU_PORT", default_value = "3000")]
    port: u16,

    /// Directory with <INSTRUMENT>_<tf>.csv[.zst] candle files
    #[arg(short, long, env = "XAU_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Candle cache directory (caching disabled when unset)
    #[arg(short, long, env = "XAU_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Economic calendar JSON
    #[arg(short, long, env = "XAU_EVENTS_FILE")]
    events: Option<PathBuf>,

    /// DXY/bond quotes JSON
    #[arg(short, long, env = "XAU_ALIGNMENT_FILE")]
    alignment: Option<PathBuf>,

    /// Analysis config overrides (JSON)
    #[arg(long, env = "XAU_CONFIG")]
    config: Option<PathBuf>,

    /// Instrument reported when the request names none
    #[arg(short, long, env = "XAU_INSTRUMENT", default_value = DEFAULT_INSTRUMENT)]
    instrument: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("xau_advisor=info".parse::<Directive>()?),
        )
        .init();

    let args = Args::parse();

    info!("Starting XAU advisor server");
    info!("Instrument: {}", args.instrument);
    info!("Data directory: {:?}", args.data_dir);
    info!("Cache directory: {:?}", args.cache_dir);

    let config = AdvisorConfig::load(args.config.as_deref())?;
    let source = open_source(args.data_dir, args.cache_dir);
    if source.is_none() {
        info!("No data directory configured, GET /api/report is disabled");
    }

    let state = Arc::new(AppState {
        config,
        source,
        files: SnapshotFiles {
            events: args.events,
            alignment: args.alignment,
        },
        default_instrument: args.instrument,
    });

    let app = api::router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    info!("Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
