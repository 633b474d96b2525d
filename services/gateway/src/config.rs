//! Environment configuration
//!
//! `STORE_HOST`/`STORE_PORT`/`STORE_PASSWORD` describe the backing
//! store; the in-process backend accepts and logs them for parity with
//! an external deployment. The remaining knobs tune background task
//! cadence, startup data handling, and order limits.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use engine::RiskLimits;
use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub store_host: String,
    pub store_port: u16,
    pub store_password: Option<String>,
    /// Keep orders and books across restarts when set.
    pub no_clear_data: bool,
    pub match_tick: Duration,
    pub snapshot_interval: Duration,
    pub latency_interval: Duration,
    /// Write/read a store snapshot at this path on shutdown/startup.
    pub snapshot_path: Option<PathBuf>,
    pub bind_addr: SocketAddr,
    pub limits: RiskLimits,
}

impl Config {
    pub fn from_env() -> Self {
        let limits = RiskLimits {
            min_order_size: env_decimal("OES_MIN_ORDER_SIZE", RiskLimits::default().min_order_size),
            max_order_size: env_decimal("OES_MAX_ORDER_SIZE", RiskLimits::default().max_order_size),
            min_price: env_decimal("OES_MIN_PRICE", RiskLimits::default().min_price),
            max_price: env_decimal("OES_MAX_PRICE", RiskLimits::default().max_price),
            price_deviation_pct: env_decimal(
                "OES_PRICE_DEVIATION_PCT",
                RiskLimits::default().price_deviation_pct,
            ),
        };
        let port: u16 = env_parsed("OES_PORT", 8000);

        Self {
            store_host: std::env::var("STORE_HOST").unwrap_or_else(|_| "localhost".to_string()),
            store_port: env_parsed("STORE_PORT", 6379),
            store_password: std::env::var("STORE_PASSWORD").ok(),
            no_clear_data: flag_set(std::env::var("OES_NO_CLEAR_DATA").ok()),
            match_tick: Duration::from_millis(env_parsed("OES_MATCH_TICK_MS", 100)),
            snapshot_interval: Duration::from_millis(env_parsed("OES_SNAPSHOT_MS", 100)),
            latency_interval: Duration::from_millis(env_parsed("OES_LATENCY_MS", 5_000)),
            snapshot_path: std::env::var("OES_SNAPSHOT_PATH").ok().map(PathBuf::from),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            limits,
        }
    }
}

fn flag_set(raw: Option<String>) -> bool {
    matches!(raw.as_deref(), Some("1"))
}

fn env_parsed<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn env_decimal(name: &str, default: Decimal) -> Decimal {
    std::env::var(name)
        .ok()
        .and_then(|raw| Decimal::from_str(&raw).ok())
        .unwrap_or(default)
}
