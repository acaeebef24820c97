//! Claim record store
//!
//! Append-style log of claim attempts with a mutable status field, reached
//! through a narrow trait so the orchestrator never sees SQL. Transitions
//! are guarded: a claim already in a terminal state is reported as a
//! conflict, never overwritten, which keeps the audit trail intact.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;

use crate::db::{self, Claim};
use crate::types::{AssetSymbol, WalletAddress};

/// Storage failure at the store seam. Unrecoverable for the current attempt;
/// the orchestrator surfaces it as a "try again later" outcome.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Result of a guarded status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The claim was already in a terminal state; nothing was changed.
    AlreadyTerminal,
}

/// Why an attempt was rejected at admission (audited, but not a claim).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Cooldown,
    UnsupportedAsset,
    InsufficientPool,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Cooldown => "cooldown",
            RejectReason::UnsupportedAsset => "unsupported_asset",
            RejectReason::InsufficientPool => "insufficient_pool",
        }
    }
}

/// Durable claim log with guarded single-row transitions.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Create a claim in `pending` with the amount snapshot.
    async fn create(
        &self,
        wallet: &WalletAddress,
        asset: &AssetSymbol,
        amount: &str,
    ) -> Result<Claim, StoreError>;

    /// Record the transfer reference on a still-pending claim at submission.
    async fn set_transfer_ref(&self, id: i64, transfer_ref: &str) -> Result<(), StoreError>;

    async fn transition_to_confirmed(
        &self,
        id: i64,
        transfer_ref: &str,
    ) -> Result<Transition, StoreError>;

    async fn transition_to_failed(&self, id: i64) -> Result<Transition, StoreError>;

    /// Reconciliation-only upgrade of a failed claim whose submitted transfer
    /// later proved to have landed; guarded by the exact transfer reference.
    async fn upgrade_stray_success(
        &self,
        id: i64,
        transfer_ref: &str,
    ) -> Result<Transition, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Claim>, StoreError>;

    /// A wallet's claims, most recent first.
    async fn history_for(
        &self,
        wallet: &WalletAddress,
        limit: i64,
    ) -> Result<Vec<Claim>, StoreError>;

    /// Record an admission rejection as a lightweight audit event.
    async fn record_rejection(
        &self,
        wallet: &WalletAddress,
        asset: &AssetSymbol,
        reason: RejectReason,
    ) -> Result<(), StoreError>;

    /// Confirmed claims whose cooldown entry is missing or older than the
    /// claim itself (partial-failure window).
    async fn confirmed_missing_cooldown(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Claim>, StoreError>;

    /// Failed claims that carry a transfer reference (submission went out,
    /// no confirmation arrived within the bound).
    async fn failed_with_transfer_ref(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Claim>, StoreError>;
}

/// Postgres-backed claim store
pub struct PgClaimStore {
    pool: PgPool,
}

impl PgClaimStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClaimStore for PgClaimStore {
    async fn create(
        &self,
        wallet: &WalletAddress,
        asset: &AssetSymbol,
        amount: &str,
    ) -> Result<Claim, StoreError> {
        db::insert_claim(&self.pool, wallet.as_str(), asset.as_str(), amount)
            .await
            .map_err(StoreError::unavailable)
    }

    async fn set_transfer_ref(&self, id: i64, transfer_ref: &str) -> Result<(), StoreError> {
        db::set_claim_transfer_ref(&self.pool, id, transfer_ref)
            .await
            .map_err(StoreError::unavailable)
    }

    async fn transition_to_confirmed(
        &self,
        id: i64,
        transfer_ref: &str,
    ) -> Result<Transition, StoreError> {
        let applied = db::mark_claim_confirmed(&self.pool, id, transfer_ref)
            .await
            .map_err(StoreError::unavailable)?;
        Ok(if applied {
            Transition::Applied
        } else {
            Transition::AlreadyTerminal
        })
    }

    async fn transition_to_failed(&self, id: i64) -> Result<Transition, StoreError> {
        let applied = db::mark_claim_failed(&self.pool, id)
            .await
            .map_err(StoreError::unavailable)?;
        Ok(if applied {
            Transition::Applied
        } else {
            Transition::AlreadyTerminal
        })
    }

    async fn upgrade_stray_success(
        &self,
        id: i64,
        transfer_ref: &str,
    ) -> Result<Transition, StoreError> {
        let applied = db::upgrade_failed_claim(&self.pool, id, transfer_ref)
            .await
            .map_err(StoreError::unavailable)?;
        Ok(if applied {
            Transition::Applied
        } else {
            Transition::AlreadyTerminal
        })
    }

    async fn get(&self, id: i64) -> Result<Option<Claim>, StoreError> {
        db::get_claim(&self.pool, id)
            .await
            .map_err(StoreError::unavailable)
    }

    async fn history_for(
        &self,
        wallet: &WalletAddress,
        limit: i64,
    ) -> Result<Vec<Claim>, StoreError> {
        db::get_claims_for_wallet(&self.pool, wallet.as_str(), limit)
            .await
            .map_err(StoreError::unavailable)
    }

    async fn record_rejection(
        &self,
        wallet: &WalletAddress,
        asset: &AssetSymbol,
        reason: RejectReason,
    ) -> Result<(), StoreError> {
        db::insert_rejection(&self.pool, wallet.as_str(), asset.as_str(), reason.as_str())
            .await
            .map_err(StoreError::unavailable)
    }

    async fn confirmed_missing_cooldown(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Claim>, StoreError> {
        db::get_confirmed_claims_missing_cooldown(&self.pool, since)
            .await
            .map_err(StoreError::unavailable)
    }

    async fn failed_with_transfer_ref(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Claim>, StoreError> {
        db::get_failed_claims_with_transfer_ref(&self.pool, since)
            .await
            .map_err(StoreError::unavailable)
    }
}
