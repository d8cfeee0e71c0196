use std::path::Path;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::chart::viewport::MAX_RIGHT_PAD;
use crate::error::ConfigError;
use crate::model::{Interval, SourceId};
use crate::provider::binance::{BINANCE_MIRRORS, BINANCE_US_HOST, BINANCE_WS_BASE};
use crate::provider::polygon::POLYGON_KEY_VAR;
use crate::provider::twelvedata::TWELVEDATA_KEY_VAR;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    3000
}

fn default_cache_dir() -> String {
    "./.cache".into()
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_binance_hosts() -> Vec<String> {
    BINANCE_MIRRORS.map(String::from).to_vec()
}

fn default_binance_us_host() -> String {
    BINANCE_US_HOST.into()
}

fn default_binance_ws_url() -> String {
    BINANCE_WS_BASE.into()
}

fn default_user_agent() -> String {
    concat!("bar-gateway/", env!("CARGO_PKG_VERSION")).into()
}

fn default_health_timeout_secs() -> u64 {
    7
}

fn default_source() -> String {
    "binance".into()
}

fn default_symbol() -> String {
    "BTCUSDT".into()
}

fn default_interval() -> String {
    "1d".into()
}

fn default_limit() -> usize {
    800
}

fn default_right_pad() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub indicators: IndicatorConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Cache Store settings: one JSON file per key under `dir`, fresh for `ttl_secs`.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProvidersConfig {
    /// Equivalent Binance hosts, tried in order.
    #[serde(default = "default_binance_hosts")]
    pub binance_hosts: Vec<String>,
    #[serde(default = "default_binance_us_host")]
    pub binance_us_host: String,
    #[serde(default = "default_binance_ws_url")]
    pub binance_ws_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub polygon_api_key: Option<String>,
    #[serde(default)]
    pub twelvedata_api_key: Option<String>,
    /// Per-attempt bound on the bar fetch path. Absent means no bound.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
}

impl ProvidersConfig {
    pub fn polygon_key(&self) -> Option<String> {
        credential(self.polygon_api_key.as_deref(), POLYGON_KEY_VAR)
    }

    pub fn twelvedata_key(&self) -> Option<String> {
        credential(self.twelvedata_api_key.as_deref(), TWELVEDATA_KEY_VAR)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

/// Config value first, then the environment; blank counts as absent.
fn credential(configured: Option<&str>, var: &str) -> Option<String> {
    configured
        .map(str::to_owned)
        .or_else(|| std::env::var(var).ok())
        .filter(|key| !key.trim().is_empty())
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            binance_hosts: default_binance_hosts(),
            binance_us_host: default_binance_us_host(),
            binance_ws_url: default_binance_ws_url(),
            user_agent: default_user_agent(),
            polygon_api_key: None,
            twelvedata_api_key: None,
            request_timeout_secs: None,
            health_timeout_secs: default_health_timeout_secs(),
        }
    }
}

/// What `watch` loads and how the visible window behaves.
#[derive(Debug, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_right_pad")]
    pub right_pad: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            symbol: default_symbol(),
            interval: default_interval(),
            limit: default_limit(),
            right_pad: default_right_pad(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_true")]
    pub show_sma: bool,
    #[serde(default = "default_true")]
    pub show_ema: bool,
    #[serde(default)]
    pub show_rsi: bool,
    #[serde(default)]
    pub show_macd: bool,
    #[serde(default)]
    pub show_volume: bool,
    #[serde(default = "IndicatorConfig::default_sma_period")]
    pub sma_period: usize,
    #[serde(default = "IndicatorConfig::default_ema_period")]
    pub ema_period: usize,
    #[serde(default = "IndicatorConfig::default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "IndicatorConfig::default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "IndicatorConfig::default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "IndicatorConfig::default_macd_signal")]
    pub macd_signal: usize,
}

impl IndicatorConfig {
    fn default_sma_period() -> usize {
        20
    }

    fn default_ema_period() -> usize {
        50
    }

    fn default_rsi_period() -> usize {
        14
    }

    fn default_macd_fast() -> usize {
        12
    }

    fn default_macd_slow() -> usize {
        26
    }

    fn default_macd_signal() -> usize {
        9
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            show_sma: true,
            show_ema: true,
            show_rsi: false,
            show_macd: false,
            show_volume: false,
            sma_period: Self::default_sma_period(),
            ema_period: Self::default_ema_period(),
            rsi_period: Self::default_rsi_period(),
            macd_fast: Self::default_macd_fast(),
            macd_slow: Self::default_macd_slow(),
            macd_signal: Self::default_macd_signal(),
        }
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(&config.general)?;
    validate_cache(&config.cache)?;
    validate_providers(&config.providers)?;
    validate_chart(&config.chart)?;
    validate_indicators(&config.indicators)?;
    Ok(())
}

fn validate_general(general: &GeneralConfig) -> Result<(), Report<ConfigError>> {
    if !matches!(general.log_format.as_str(), "text" | "json") {
        return Err(invalid(format!(
            "general.log_format \"{}\" must be \"text\" or \"json\"",
            general.log_format
        )));
    }
    Ok(())
}

fn validate_cache(cache: &CacheConfig) -> Result<(), Report<ConfigError>> {
    if cache.ttl_secs == 0 {
        return Err(invalid("cache.ttl_secs must be > 0".into()));
    }
    if cache.dir.trim().is_empty() {
        return Err(invalid("cache.dir must not be empty".into()));
    }
    Ok(())
}

fn validate_providers(providers: &ProvidersConfig) -> Result<(), Report<ConfigError>> {
    if providers.binance_hosts.is_empty() {
        return Err(invalid("providers.binance_hosts must list at least one host".into()));
    }
    if providers.health_timeout_secs == 0 {
        return Err(invalid("providers.health_timeout_secs must be > 0".into()));
    }
    if providers.request_timeout_secs == Some(0) {
        return Err(invalid("providers.request_timeout_secs must be > 0 when set".into()));
    }
    Ok(())
}

fn validate_chart(chart: &ChartConfig) -> Result<(), Report<ConfigError>> {
    if SourceId::from_str(&chart.source).is_none() {
        return Err(invalid(format!("chart.source: unknown source \"{}\"", chart.source)));
    }
    if Interval::from_str(&chart.interval).is_none() {
        return Err(invalid(format!(
            "chart.interval: unknown interval \"{}\"",
            chart.interval
        )));
    }
    if chart.limit == 0 {
        return Err(invalid("chart.limit must be > 0".into()));
    }
    if chart.right_pad > MAX_RIGHT_PAD {
        return Err(invalid(format!(
            "chart.right_pad {} exceeds {MAX_RIGHT_PAD}",
            chart.right_pad
        )));
    }
    Ok(())
}

fn validate_indicators(indicators: &IndicatorConfig) -> Result<(), Report<ConfigError>> {
    let periods = [
        ("sma_period", indicators.sma_period),
        ("ema_period", indicators.ema_period),
        ("rsi_period", indicators.rsi_period),
        ("macd_fast", indicators.macd_fast),
        ("macd_slow", indicators.macd_slow),
        ("macd_signal", indicators.macd_signal),
    ];
    for (name, period) in periods {
        if period == 0 {
            return Err(invalid(format!("indicators.{name} must be > 0")));
        }
    }
    if indicators.macd_fast >= indicators.macd_slow {
        return Err(invalid("indicators.macd_fast must be < macd_slow".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("parse failed")
    }

    #[test]
    fn valid_full_config_parses() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"

[server]
host = "127.0.0.1"
port = 8080

[cache]
dir = "/tmp/bars"
ttl_secs = 60

[providers]
binance_hosts = ["https://api.binance.com"]
polygon_api_key = "pk"
request_timeout_secs = 15

[chart]
source = "auto"
symbol = "ETHUSDT"
interval = "1h"
right_pad = 10

[indicators]
show_rsi = true
rsi_period = 7
"#;
        let config = parse(toml);
        assert!(validate(&config).is_ok());
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cache.ttl(), Duration::from_secs(60));
        assert_eq!(config.providers.binance_hosts.len(), 1);
        assert_eq!(config.providers.polygon_key().as_deref(), Some("pk"));
        assert_eq!(config.providers.request_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.chart.right_pad, 10);
        assert!(config.indicators.show_rsi);
        assert_eq!(config.indicators.rsi_period, 7);
    }

    #[test]
    fn defaults_applied_when_sections_omitted() {
        let config = parse("");
        assert!(validate(&config).is_ok());
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "text");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.cache.dir, "./.cache");
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.providers.binance_hosts.len(), 5);
        assert_eq!(config.providers.request_timeout(), None);
        assert_eq!(config.providers.health_timeout(), Duration::from_secs(7));
        assert_eq!(config.chart.limit, 800);
        assert_eq!(config.chart.right_pad, 2);
        assert_eq!(config.indicators.sma_period, 20);
        assert_eq!(config.indicators.ema_period, 50);
        assert!(config.indicators.show_sma && !config.indicators.show_macd);
    }

    #[test]
    fn right_pad_above_limit_rejected() {
        let config = parse("[chart]\nright_pad = 51\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_source_rejected() {
        let config = parse("[chart]\nsource = \"kraken\"\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn invalid_interval_string_rejected() {
        let config = parse("[chart]\ninterval = \"2m\"\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn empty_binance_hosts_rejected() {
        let config = parse("[providers]\nbinance_hosts = []\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_ttl_rejected() {
        let config = parse("[cache]\nttl_secs = 0\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn macd_fast_must_be_below_slow() {
        let config = parse("[indicators]\nmacd_fast = 26\nmacd_slow = 12\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn blank_credential_counts_as_absent() {
        assert_eq!(credential(Some("  "), "BAR_GATEWAY_TEST_UNSET_VAR"), None);
        assert_eq!(
            credential(Some("key"), "BAR_GATEWAY_TEST_UNSET_VAR").as_deref(),
            Some("key")
        );
    }
}
