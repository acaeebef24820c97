//! Cooldown ledger
//!
//! Durable mapping of (wallet, asset) to the last successful claim time.
//! The eligibility comparison is strict: a wallet standing exactly at the
//! cooldown boundary is still within the cooldown; it becomes eligible only
//! when the elapsed time strictly exceeds the configured duration.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db;
use crate::store::StoreError;
use crate::types::{AssetSymbol, WalletAddress};

/// Eligibility given the last successful claim time.
pub fn is_eligible(last_claim_at: Option<DateTime<Utc>>, cooldown: Duration, now: DateTime<Utc>) -> bool {
    match last_claim_at {
        None => true,
        Some(last) => {
            let elapsed = now.signed_duration_since(last);
            elapsed > cooldown_chrono(cooldown)
        }
    }
}

/// Time left until the wallet becomes eligible again; zero when eligible.
pub fn remaining(
    last_claim_at: Option<DateTime<Utc>>,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> Duration {
    match last_claim_at {
        None => Duration::ZERO,
        Some(last) => {
            let elapsed = now.signed_duration_since(last);
            match cooldown_chrono(cooldown).checked_sub(&elapsed) {
                Some(left) => left.to_std().unwrap_or(Duration::ZERO),
                None => Duration::ZERO,
            }
        }
    }
}

fn cooldown_chrono(cooldown: Duration) -> chrono::Duration {
    chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX)
}

/// Durable store of last-claim timestamps, keyed (wallet, asset).
///
/// `mark_claimed` is an idempotent last-writer-wins upsert. Concurrent calls
/// for the same key never race here because the orchestrator serializes them
/// behind the per-key lock.
#[async_trait]
pub trait CooldownLedger: Send + Sync {
    async fn last_claim_at(
        &self,
        wallet: &WalletAddress,
        asset: &AssetSymbol,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn mark_claimed(
        &self,
        wallet: &WalletAddress,
        asset: &AssetSymbol,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Like `mark_claimed`, but never moves an existing entry backwards.
    /// Used by the reconciler, which runs outside the per-key lock.
    async fn mark_claimed_at_least(
        &self,
        wallet: &WalletAddress,
        asset: &AssetSymbol,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn is_eligible(
        &self,
        wallet: &WalletAddress,
        asset: &AssetSymbol,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let last = self.last_claim_at(wallet, asset).await?;
        Ok(is_eligible(last, cooldown, now))
    }

    async fn remaining(
        &self,
        wallet: &WalletAddress,
        asset: &AssetSymbol,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Result<Duration, StoreError> {
        let last = self.last_claim_at(wallet, asset).await?;
        Ok(remaining(last, cooldown, now))
    }
}

/// Postgres-backed cooldown ledger
pub struct PgCooldownLedger {
    pool: PgPool,
}

impl PgCooldownLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CooldownLedger for PgCooldownLedger {
    async fn last_claim_at(
        &self,
        wallet: &WalletAddress,
        asset: &AssetSymbol,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        db::get_cooldown(&self.pool, wallet.as_str(), asset.as_str())
            .await
            .map_err(StoreError::unavailable)
    }

    async fn mark_claimed(
        &self,
        wallet: &WalletAddress,
        asset: &AssetSymbol,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        db::upsert_cooldown(&self.pool, wallet.as_str(), asset.as_str(), at)
            .await
            .map_err(StoreError::unavailable)
    }

    async fn mark_claimed_at_least(
        &self,
        wallet: &WalletAddress,
        asset: &AssetSymbol,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        db::raise_cooldown(&self.pool, wallet.as_str(), asset.as_str(), at)
            .await
            .map_err(StoreError::unavailable)
    }
}
