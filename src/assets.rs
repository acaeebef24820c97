//! Asset catalog for the faucet
//!
//! Claimable assets are seeded from a TOML catalog file at startup. The
//! registry is a read-mostly in-process map; administrative updates go
//! through `upsert`/`set_active` and never mutate an in-flight claim (the
//! orchestrator snapshots the asset before dispatching).

use std::collections::BTreeMap;
use std::time::Duration;

use bigdecimal::BigDecimal;
use eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::types::AssetSymbol;

/// Where a claim for this asset is dispensed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "address")]
pub enum PoolRef {
    /// The chain's native coin, dispensed from the pool wallet balance
    Native,
    /// An ERC-20 token contract, dispensed from the pool wallet's token balance
    Token(String),
}

/// A claimable asset.
///
/// `amount` is a fixed-point decimal string ("0.1", not 0.1f64); arithmetic
/// on it goes through BigDecimal so precision is exact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Asset {
    pub symbol: AssetSymbol,
    pub name: String,
    pub amount: String,
    pub decimals: u8,
    pub cooldown_secs: u64,
    pub pool: PoolRef,
    pub active: bool,
}

impl Asset {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Parse the configured claim amount as an exact decimal.
    pub fn amount_decimal(&self) -> Result<BigDecimal> {
        self.amount
            .parse::<BigDecimal>()
            .wrap_err_with(|| format!("Asset {} has a non-decimal amount", self.symbol))
    }

    fn validate(&self) -> Result<()> {
        let amount = self.amount_decimal()?;
        if amount <= BigDecimal::from(0) {
            return Err(eyre!("Asset {} amount must be positive", self.symbol));
        }
        if self.decimals > 36 {
            return Err(eyre!("Asset {} decimals must be <= 36", self.symbol));
        }
        if self.cooldown_secs == 0 {
            return Err(eyre!("Asset {} cooldown must be positive", self.symbol));
        }
        if let PoolRef::Token(ref address) = self.pool {
            if address.len() != 42 || !address.starts_with("0x") {
                return Err(eyre!(
                    "Asset {} token address must be a 42-char 0x hex address",
                    self.symbol
                ));
            }
        }
        Ok(())
    }
}

/// Result of resolving a symbol: unknown and known-but-inactive are the same
/// to callers (claim not supported) but distinguished for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetLookup {
    Active(Asset),
    Inactive,
    Unknown,
}

/// One entry in the TOML catalog file.
#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    symbol: String,
    name: String,
    amount: String,
    decimals: u8,
    cooldown_secs: u64,
    /// "native" or an ERC-20 contract address
    pool: String,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    assets: Vec<CatalogEntry>,
}

impl CatalogEntry {
    fn into_asset(self) -> Result<Asset> {
        let symbol = AssetSymbol::parse(&self.symbol)
            .map_err(|e| eyre!("Invalid symbol {:?} in asset catalog: {}", self.symbol, e))?;
        let pool = if self.pool.eq_ignore_ascii_case("native") {
            PoolRef::Native
        } else {
            PoolRef::Token(self.pool.to_lowercase())
        };
        let asset = Asset {
            symbol,
            name: self.name,
            amount: self.amount,
            decimals: self.decimals,
            cooldown_secs: self.cooldown_secs,
            pool,
            active: self.active,
        };
        asset.validate()?;
        Ok(asset)
    }
}

/// In-process catalog of claimable assets, keyed by normalized symbol.
pub struct AssetRegistry {
    inner: RwLock<BTreeMap<AssetSymbol, Asset>>,
}

impl AssetRegistry {
    /// Load the catalog from a TOML file.
    pub fn from_catalog_file(path: &str) -> Result<Self> {
        let file: CatalogFile = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .wrap_err_with(|| format!("Failed to read asset catalog from {}", path))?
            .try_deserialize()
            .wrap_err_with(|| format!("Malformed asset catalog in {}", path))?;

        let assets = file
            .assets
            .into_iter()
            .map(CatalogEntry::into_asset)
            .collect::<Result<Vec<_>>>()?;
        Self::from_assets(assets)
    }

    /// Build a registry from already-constructed assets.
    pub fn from_assets(assets: Vec<Asset>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for asset in assets {
            asset.validate()?;
            if map.insert(asset.symbol.clone(), asset.clone()).is_some() {
                return Err(eyre!("Duplicate asset symbol {} in catalog", asset.symbol));
            }
        }
        if map.is_empty() {
            return Err(eyre!("Asset catalog contains no assets"));
        }
        Ok(Self {
            inner: RwLock::new(map),
        })
    }

    /// Resolve a symbol, distinguishing unknown from known-but-inactive.
    pub async fn lookup(&self, symbol: &AssetSymbol) -> AssetLookup {
        let map = self.inner.read().await;
        match map.get(symbol) {
            Some(asset) if asset.active => AssetLookup::Active(asset.clone()),
            Some(_) => AssetLookup::Inactive,
            None => AssetLookup::Unknown,
        }
    }

    /// Active assets in deterministic symbol-ascending order.
    pub async fn list_active(&self) -> Vec<Asset> {
        let map = self.inner.read().await;
        map.values().filter(|a| a.active).cloned().collect()
    }

    /// Insert or replace an asset (administrative path).
    pub async fn upsert(&self, asset: Asset) -> Result<()> {
        asset.validate()?;
        let mut map = self.inner.write().await;
        map.insert(asset.symbol.clone(), asset);
        Ok(())
    }

    /// Flip an asset's active flag; returns false for an unknown symbol.
    pub async fn set_active(&self, symbol: &AssetSymbol, active: bool) -> bool {
        let mut map = self.inner.write().await;
        match map.get_mut(symbol) {
            Some(asset) => {
                asset.active = active;
                true
            }
            None => false,
        }
    }
}
