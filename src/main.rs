mod cache;
mod chart;
mod config;
mod error;
mod fallback;
mod health;
mod indicator;
mod model;
mod normalize;
mod provider;
mod server;
mod service;
mod surface;

use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cache::file::FileCache;
use chart::feed::LiveFeed;
use chart::session::ChartSession;
use config::AppConfig;
use fallback::FallbackResolver;
use indicator::IndicatorEngine;
use model::BarRequest;
use provider::ProviderRegistry;
use server::AppState;
use service::BarService;
use surface::log::LogSurface;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("server error")]
    Server,
    #[display("bar request failed")]
    Fetch,
    #[display("chart error")]
    Chart,
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(name = "bar-gateway", about = "OHLCV bar gateway with provider fallback and live charting")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve `/bars` and `/health` over HTTP
    Serve,
    /// Load bars, compute indicators and follow the live feed, logging every update
    Watch {
        /// Source override (auto, binance, binanceus, yahoo, polygon, twelvedata)
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        symbol: Option<String>,
        /// Interval override (1m, 5m, 15m, 1h, 4h, 1d)
        #[arg(long)]
        interval: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    let registry = Arc::new(ProviderRegistry::from_config(&config.providers));
    let resolver = FallbackResolver::new(Arc::clone(&registry))
        .with_timeout(config.providers.request_timeout());
    let service = Arc::new(BarService::new(
        Arc::new(FileCache::new(&config.cache)),
        resolver,
    ));

    match cli.command {
        Command::Serve => serve(&config, service, registry).await,
        Command::Watch {
            source,
            symbol,
            interval,
        } => {
            let request = BarRequest::parse(
                source.as_deref().unwrap_or(&config.chart.source),
                symbol.as_deref().unwrap_or(&config.chart.symbol),
                interval.as_deref().unwrap_or(&config.chart.interval),
                config.chart.limit,
            )
            .change_context(AppError::Fetch)?;
            watch(&config, &service, request).await
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

async fn serve(
    config: &AppConfig,
    service: Arc<BarService>,
    registry: Arc<ProviderRegistry>,
) -> Result<(), Report<AppError>> {
    let state = AppState {
        service,
        registry,
        health_timeout: config.providers.health_timeout(),
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .change_context(AppError::Server)
        .attach_with(|| format!("addr: {addr}"))?;

    info!(addr = %addr, cache_dir = %config.cache.dir, "bar gateway listening");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("ctrl+c received, shutting down");
        })
        .await
        .change_context(AppError::Server)?;

    info!("shutdown complete");
    Ok(())
}

async fn watch(
    config: &AppConfig,
    service: &BarService,
    request: BarRequest,
) -> Result<(), Report<AppError>> {
    let engine = IndicatorEngine::from_config(&config.indicators).change_context(AppError::Chart)?;
    let mut session = ChartSession::new(
        LogSurface::new(request.symbol.clone()),
        engine,
        request.interval,
        config.chart.right_pad,
    )
    .change_context(AppError::Chart)?;

    let bars = service
        .get_bars(&request)
        .await
        .change_context(AppError::Fetch)?;
    session.load(bars, request.interval);

    if !request.source.has_live_feed() {
        info!(source = %request.source, "source has no live feed; history loaded");
        return Ok(());
    }

    let mut feed = LiveFeed::new(config.providers.binance_ws_url.clone());
    let mut rx = feed.subscribe(&request.symbol, request.interval);

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.change_context(AppError::Runtime)?;
                info!("ctrl+c received, shutting down");
                break;
            }
            bar = rx.recv() => match bar {
                Some(bar) => {
                    session.on_bar(bar);
                }
                None => {
                    info!(symbol = %request.symbol, "live feed ended");
                    break;
                }
            }
        }
    }

    feed.close();
    Ok(())
}
