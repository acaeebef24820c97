use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Main configuration for the faucet service.
///
/// Loaded once at startup and handed to components as an immutable value;
/// nothing reads ambient process state during a claim.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
    pub server: ServerConfig,
    pub faucet: FaucetConfig,
}

/// Database configuration
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Custom Debug that redacts the database URL (may contain credentials).
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .finish()
    }
}

/// On-chain ledger configuration (RPC endpoint + dispensing wallet)
#[derive(Clone, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Private key of the pool wallet that dispenses claims
    pub private_key: String,
    #[serde(default = "default_required_confirmations")]
    pub required_confirmations: u32,
    /// Bound on the wait for a transfer confirmation before the attempt
    /// is treated as failed
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    #[serde(default = "default_confirm_poll_ms")]
    pub confirm_poll_ms: u64,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("private_key", &"<redacted>")
            .field("required_confirmations", &self.required_confirmations)
            .field("confirm_timeout_secs", &self.confirm_timeout_secs)
            .field("confirm_poll_ms", &self.confirm_poll_ms)
            .finish()
    }
}

impl LedgerConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn confirm_poll(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_ms)
    }
}

/// HTTP server and request-rate guard configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-IP governor: burst size
    #[serde(default = "default_ip_burst")]
    pub ip_burst: u32,
    /// Per-IP governor: seconds to replenish one request
    #[serde(default = "default_ip_replenish_secs")]
    pub ip_replenish_secs: u64,
    /// Wallet-level fast-repeat throttle: minimum seconds between requests
    #[serde(default = "default_wallet_min_interval_secs")]
    pub wallet_min_interval_secs: u64,
}

/// Faucet behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FaucetConfig {
    /// Path to the TOML asset catalog
    #[serde(default = "default_assets_file")]
    pub assets_file: String,
    #[serde(default = "default_history_limit")]
    pub history_limit: i64,
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// How far back the reconciler scans for claims to repair
    #[serde(default = "default_reconcile_lookback_hours")]
    pub reconcile_lookback_hours: i64,
}

impl FaucetConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

/// Default functions
fn default_required_confirmations() -> u32 {
    1
}

fn default_confirm_timeout_secs() -> u64 {
    60
}

fn default_confirm_poll_ms() -> u64 {
    2000
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_ip_burst() -> u32 {
    5
}

fn default_ip_replenish_secs() -> u64 {
    2
}

fn default_wallet_min_interval_secs() -> u64 {
    10
}

fn default_assets_file() -> String {
    "assets.toml".to_string()
}

fn default_history_limit() -> i64 {
    20
}

fn default_reconcile_interval_secs() -> u64 {
    60
}

fn default_reconcile_lookback_hours() -> i64 {
    24
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env").or_else(|_| Self::load_from_env())
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    fn load_from_env() -> Result<Self> {
        let database = DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| eyre!("DATABASE_URL environment variable is required"))?,
        };

        let ledger = LedgerConfig {
            rpc_url: env::var("RPC_URL")
                .map_err(|_| eyre!("RPC_URL environment variable is required"))?,
            chain_id: env::var("CHAIN_ID")
                .map_err(|_| eyre!("CHAIN_ID environment variable is required"))?
                .parse()
                .wrap_err("CHAIN_ID must be a valid u64")?,
            private_key: env::var("POOL_PRIVATE_KEY")
                .map_err(|_| eyre!("POOL_PRIVATE_KEY environment variable is required"))?,
            required_confirmations: env::var("REQUIRED_CONFIRMATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_required_confirmations()),
            confirm_timeout_secs: env::var("CONFIRM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_confirm_timeout_secs()),
            confirm_poll_ms: env::var("CONFIRM_POLL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_confirm_poll_ms()),
        };

        let server = ServerConfig {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| default_bind_address()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_port()),
            ip_burst: env::var("IP_RATE_BURST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_ip_burst()),
            ip_replenish_secs: env::var("IP_RATE_REPLENISH_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_ip_replenish_secs()),
            wallet_min_interval_secs: env::var("WALLET_MIN_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_wallet_min_interval_secs()),
        };

        let faucet = FaucetConfig {
            assets_file: env::var("ASSETS_FILE").unwrap_or_else(|_| default_assets_file()),
            history_limit: env::var("HISTORY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_history_limit()),
            reconcile_interval_secs: env::var("RECONCILE_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_reconcile_interval_secs()),
            reconcile_lookback_hours: env::var("RECONCILE_LOOKBACK_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_reconcile_lookback_hours()),
        };

        let config = Config {
            database,
            ledger,
            server,
            faucet,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(eyre!("database.url cannot be empty"));
        }

        if self.ledger.rpc_url.is_empty() {
            return Err(eyre!("ledger.rpc_url cannot be empty"));
        }

        if self.ledger.private_key.len() != 66 || !self.ledger.private_key.starts_with("0x") {
            return Err(eyre!(
                "ledger.private_key must be 66 chars (0x + 64 hex chars)"
            ));
        }

        if self.ledger.confirm_timeout_secs == 0 {
            return Err(eyre!("ledger.confirm_timeout_secs must be positive"));
        }

        if self.ledger.confirm_poll_ms == 0 {
            return Err(eyre!("ledger.confirm_poll_ms must be positive"));
        }

        if self.faucet.assets_file.is_empty() {
            return Err(eyre!("faucet.assets_file cannot be empty"));
        }

        if self.faucet.history_limit <= 0 || self.faucet.history_limit > 500 {
            return Err(eyre!("faucet.history_limit must be in 1..=500"));
        }

        if self.faucet.reconcile_lookback_hours <= 0 {
            return Err(eyre!("faucet.reconcile_lookback_hours must be positive"));
        }

        Ok(())
    }
}
