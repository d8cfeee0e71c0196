use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use error_stack::Report;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::{FetchError, describe};
use crate::health;
use crate::model::{BarRequest, Interval};
use crate::provider::ProviderRegistry;
use crate::service::BarService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BarService>,
    pub registry: Arc<ProviderRegistry>,
    pub health_timeout: Duration,
}

/// Query parameters for `/bars`. Every field falls back to its default.
#[derive(Debug, Default, Deserialize)]
pub struct BarsQuery {
    pub source: Option<String>,
    pub symbol: Option<String>,
    pub interval: Option<String>,
    /// Non-numeric values are treated as absent.
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HealthQuery {
    pub symbol: Option<String>,
    pub interval: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/bars", get(get_bars))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn internal_error(report: &Report<FetchError>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: describe(report),
        }),
    )
        .into_response()
}

async fn get_bars(State(state): State<AppState>, Query(query): Query<BarsQuery>) -> Response {
    let limit = query
        .limit
        .as_deref()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(BarRequest::DEFAULT_LIMIT);

    let request = match BarRequest::parse(
        query.source.as_deref().unwrap_or(BarRequest::DEFAULT_SOURCE),
        query.symbol.as_deref().unwrap_or(BarRequest::DEFAULT_SYMBOL),
        query.interval.as_deref().unwrap_or(BarRequest::DEFAULT_INTERVAL),
        limit,
    ) {
        Ok(request) => request,
        Err(e) => return internal_error(&e),
    };

    match state.service.get_bars(&request).await {
        Ok(bars) => Json(bars).into_response(),
        Err(e) => {
            error!(
                source = %request.source,
                symbol = %request.symbol,
                interval = %request.interval,
                error = ?e,
                "bar request failed"
            );
            internal_error(&e)
        }
    }
}

async fn get_health(State(state): State<AppState>, Query(query): Query<HealthQuery>) -> Response {
    let symbol = query
        .symbol
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(BarRequest::DEFAULT_SYMBOL);
    // The report always answers; an unusable interval probes the default one.
    let interval = query
        .interval
        .as_deref()
        .and_then(Interval::from_str)
        .unwrap_or(Interval::Day1);

    let report = health::check(&state.registry, symbol, interval, state.health_timeout).await;
    Json(report).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::cache::file::FileCache;
    use crate::config::CacheConfig;
    use crate::fallback::FallbackResolver;
    use crate::model::{Bar, SourceId};
    use crate::provider::testing::{StaticProvider, daily_bars};

    fn app(dir: &std::path::Path, registry: ProviderRegistry) -> Router {
        let registry = Arc::new(registry);
        let cache = FileCache::new(&CacheConfig {
            dir: dir.to_string_lossy().into_owned(),
            ttl_secs: 300,
        });
        let service = BarService::new(Arc::new(cache), FallbackResolver::new(registry.clone()));
        router(AppState {
            service: Arc::new(service),
            registry,
            health_timeout: Duration::from_millis(200),
        })
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn auto_request_is_fetched_once_then_cached() {
        let temp_dir = tempfile::tempdir().unwrap();
        let binance = StaticProvider::ok(SourceId::Binance, daily_bars(50));
        let mut registry = ProviderRegistry::new();
        registry.register(binance.clone());
        let app = app(temp_dir.path(), registry);

        let uri = "/bars?source=auto&symbol=BTCUSDT&interval=1d&limit=10";
        let (status, first) = get(app.clone(), uri).await;
        assert_eq!(status, StatusCode::OK);

        let bars: Vec<Bar> = serde_json::from_slice(&first).unwrap();
        assert_eq!(bars.len(), 10);
        assert!(bars.windows(2).all(|w| w[0].time < w[1].time));
        assert!(bars.iter().all(|b| b.volume >= 0.0));

        let (status, second) = get(app, uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first, second);
        assert_eq!(binance.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_source_is_a_500_with_message() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (status, body) = get(
            app(temp_dir.path(), ProviderRegistry::new()),
            "/bars?source=kraken",
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "unknown source: kraken");
    }

    #[tokio::test]
    async fn auto_exhaustion_reports_last_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut registry = ProviderRegistry::new();
        registry.register(StaticProvider::failing(SourceId::Binance, 451));
        registry.register(StaticProvider::failing(SourceId::BinanceUs, 451));
        registry.register(StaticProvider::failing(SourceId::Yahoo, 404));

        let (status, body) = get(app(temp_dir.path(), registry), "/bars?source=auto").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json["error"],
            "all providers failed: yahoo returned HTTP 404"
        );
    }

    #[tokio::test]
    async fn defaults_apply_when_params_missing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let binance = StaticProvider::ok(SourceId::Binance, daily_bars(900));
        let mut registry = ProviderRegistry::new();
        registry.register(binance.clone());

        let (status, body) = get(app(temp_dir.path(), registry), "/bars?limit=abc").await;
        assert_eq!(status, StatusCode::OK);
        let bars: Vec<Bar> = serde_json::from_slice(&body).unwrap();
        assert_eq!(bars.len(), BarRequest::DEFAULT_LIMIT);
        assert_eq!(binance.symbols(), vec!["BTCUSDT".to_owned()]);
    }

    #[tokio::test]
    async fn health_lists_probed_providers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut registry = ProviderRegistry::new();
        registry.register(StaticProvider::ok(SourceId::Binance, daily_bars(10)));
        registry.register(StaticProvider::failing(SourceId::Yahoo, 503));

        let (status, body) = get(
            app(temp_dir.path(), registry),
            "/health?symbol=ETHUSDT&interval=1h",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["symbol"], "ETHUSDT");
        assert_eq!(json["interval"], "1h");
        assert_eq!(json["results"]["binance"]["ok"], true);
        assert_eq!(json["results"]["yahoo"]["ok"], false);
        assert_eq!(json["results"]["yahoo"]["error"], "yahoo returned HTTP 503");
        assert!(json["results"].get("polygon").is_none());
    }

    #[tokio::test]
    async fn health_with_unknown_interval_probes_daily() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut registry = ProviderRegistry::new();
        registry.register(StaticProvider::ok(SourceId::Binance, daily_bars(10)));

        let (status, body) = get(app(temp_dir.path(), registry), "/health?interval=7x").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["symbol"], "BTCUSDT");
        assert_eq!(json["interval"], "1d");
        assert_eq!(json["results"]["binance"]["ok"], true);
    }
}
