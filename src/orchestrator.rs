//! Claim orchestrator — the core state machine
//!
//! Admission control and dispatch for one claim attempt, executed under a
//! per-(wallet, asset) lock so calls for the same key are totally ordered:
//! resolve asset (before the lock), check cooldown, check pool balance,
//! create the pending claim, submit the transfer, wait a bounded time for
//! confirmation, and finalize. A failed or timed-out transfer never touches
//! the cooldown, so the wallet may retry immediately.
//!
//! Nothing here crashes the process on a failed attempt: every path comes
//! back as a typed `ClaimOutcome`. Storage unavailability is the one
//! condition surfaced as `RetryLater` rather than a terminal claim state.

use std::sync::Arc;
use std::time::Duration;

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::assets::{Asset, AssetLookup, AssetRegistry};
use crate::cooldown::CooldownLedger;
use crate::db::Claim;
use crate::keylock::KeyedLocks;
use crate::ledger::{LedgerClient, TransferStatus};
use crate::metrics;
use crate::store::{ClaimStore, RejectReason, StoreError, Transition};
use crate::types::{AssetSymbol, WalletAddress};

/// Outcome of one `attempt_claim` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClaimOutcome {
    Success {
        claim_id: i64,
        amount: String,
        transfer_ref: String,
        next_eligible_at: DateTime<Utc>,
    },
    CooldownActive {
        remaining_secs: u64,
    },
    InsufficientPoolBalance,
    UnsupportedAsset,
    TransferFailed {
        claim_id: i64,
    },
    ConcurrencyConflict,
    /// Storage or ledger-read unavailability; nothing was dispatched for
    /// this attempt unless a claim_id-bearing outcome says otherwise.
    RetryLater,
}

impl ClaimOutcome {
    /// Stable label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ClaimOutcome::Success { .. } => "success",
            ClaimOutcome::CooldownActive { .. } => "cooldown",
            ClaimOutcome::InsufficientPoolBalance => "insufficient_pool",
            ClaimOutcome::UnsupportedAsset => "unsupported_asset",
            ClaimOutcome::TransferFailed { .. } => "transfer_failed",
            ClaimOutcome::ConcurrencyConflict => "conflict",
            ClaimOutcome::RetryLater => "retry_later",
        }
    }
}

/// Orchestrates claim attempts against the registry, stores and ledger.
///
/// Construction takes everything as explicit immutable values; no ambient
/// state is read during a claim.
pub struct ClaimOrchestrator {
    registry: Arc<AssetRegistry>,
    claims: Arc<dyn ClaimStore>,
    cooldowns: Arc<dyn CooldownLedger>,
    ledger: Arc<dyn LedgerClient>,
    locks: KeyedLocks,
    confirm_timeout: Duration,
    confirm_poll: Duration,
}

impl ClaimOrchestrator {
    pub fn new(
        registry: Arc<AssetRegistry>,
        claims: Arc<dyn ClaimStore>,
        cooldowns: Arc<dyn CooldownLedger>,
        ledger: Arc<dyn LedgerClient>,
        confirm_timeout: Duration,
        confirm_poll: Duration,
    ) -> Self {
        Self {
            registry,
            claims,
            cooldowns,
            ledger,
            locks: KeyedLocks::new(),
            confirm_timeout,
            confirm_poll,
        }
    }

    /// Attempt one claim of `symbol` for `wallet`.
    ///
    /// A single transfer attempt per call; retrying a failed transfer is the
    /// caller's decision (safe, because a failed claim never advances the
    /// cooldown).
    pub async fn attempt_claim(
        &self,
        wallet: &WalletAddress,
        symbol: &AssetSymbol,
    ) -> ClaimOutcome {
        // Resolve the asset before taking the lock: unsupported symbols pay
        // no contention cost.
        let asset = match self.registry.lookup(symbol).await {
            AssetLookup::Active(asset) => asset,
            AssetLookup::Inactive => {
                debug!(%wallet, %symbol, "Claim for inactive asset");
                return self.reject_unsupported(wallet, symbol).await;
            }
            AssetLookup::Unknown => {
                debug!(%wallet, %symbol, "Claim for unknown asset");
                return self.reject_unsupported(wallet, symbol).await;
            }
        };

        let _guard = self.locks.acquire(wallet, symbol).await;

        let outcome = match self.admit_and_dispatch(wallet, symbol, &asset).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(%wallet, %symbol, error = %err, "Claim attempt aborted on storage failure");
                ClaimOutcome::RetryLater
            }
        };

        metrics::record_claim(symbol.as_str(), outcome.label());
        outcome
    }

    /// Everything that runs inside the per-key critical section.
    async fn admit_and_dispatch(
        &self,
        wallet: &WalletAddress,
        symbol: &AssetSymbol,
        asset: &Asset,
    ) -> Result<ClaimOutcome, StoreError> {
        let now = Utc::now();
        let cooldown = asset.cooldown();

        if !self
            .cooldowns
            .is_eligible(wallet, symbol, cooldown, now)
            .await?
        {
            let remaining = self.cooldowns.remaining(wallet, symbol, cooldown, now).await?;
            self.audit_rejection(wallet, symbol, RejectReason::Cooldown).await;
            return Ok(ClaimOutcome::CooldownActive {
                remaining_secs: remaining.as_secs(),
            });
        }

        // Pool balance comes after the cooldown check (cheaper check first)
        // and before any claim record, so shortfalls never orphan a pending row.
        let amount = match asset.amount_decimal() {
            Ok(amount) => amount,
            Err(err) => {
                error!(%symbol, error = %err, "Configured asset amount failed to parse");
                return Ok(ClaimOutcome::RetryLater);
            }
        };
        let balance = match self.ledger.pool_balance(asset).await {
            Ok(balance) => balance,
            Err(err) => {
                warn!(%symbol, error = %err, "Pool balance query failed");
                return Ok(ClaimOutcome::RetryLater);
            }
        };
        if let Some(gauge) = balance.to_f64() {
            metrics::set_pool_balance(symbol.as_str(), gauge);
        }
        if balance < amount {
            info!(%wallet, %symbol, %balance, %amount, "Pool balance below claim amount");
            self.audit_rejection(wallet, symbol, RejectReason::InsufficientPool).await;
            return Ok(ClaimOutcome::InsufficientPoolBalance);
        }

        // Funds-intent is committed from here: the attempt runs to a terminal
        // state regardless of the caller.
        let claim = self.claims.create(wallet, symbol, &asset.amount).await?;
        debug!(claim_id = claim.id, %wallet, %symbol, "Claim created, dispatching transfer");

        self.dispatch_transfer(&claim, asset, wallet, symbol, &amount)
            .await
    }

    async fn dispatch_transfer(
        &self,
        claim: &Claim,
        asset: &Asset,
        wallet: &WalletAddress,
        symbol: &AssetSymbol,
        amount: &BigDecimal,
    ) -> Result<ClaimOutcome, StoreError> {
        let started = std::time::Instant::now();

        let transfer_ref = match self.ledger.submit_transfer(asset, wallet, amount).await {
            Ok(transfer_ref) => transfer_ref,
            Err(err) => {
                warn!(claim_id = claim.id, %symbol, error = %err, "Transfer submission failed");
                metrics::record_transfer_submitted(symbol.as_str(), false);
                return self.fail_claim(claim.id).await;
            }
        };
        metrics::record_transfer_submitted(symbol.as_str(), true);

        // Record the reference while the claim is still pending so the
        // reconciler can match a late-arriving confirmation against it.
        self.claims.set_transfer_ref(claim.id, &transfer_ref).await?;

        let status = self.await_confirmation(&transfer_ref).await;
        metrics::record_transfer_latency(symbol.as_str(), started.elapsed().as_secs_f64());

        match status {
            TransferStatus::Confirmed => {
                match self
                    .claims
                    .transition_to_confirmed(claim.id, &transfer_ref)
                    .await?
                {
                    Transition::Applied => {}
                    Transition::AlreadyTerminal => {
                        warn!(claim_id = claim.id, "Claim already terminal on confirmation");
                        return Ok(ClaimOutcome::ConcurrencyConflict);
                    }
                }

                let claimed_at = Utc::now();
                if let Err(err) = self.cooldowns.mark_claimed(wallet, symbol, claimed_at).await {
                    // Conservative direction: the wallet has the funds but the
                    // cooldown is not yet recorded. The reconciler repairs the
                    // ledger from the confirmed claim; the attempt is not
                    // reported as a success.
                    error!(
                        claim_id = claim.id,
                        %wallet,
                        %symbol,
                        error = %err,
                        "Cooldown write failed after confirmed transfer"
                    );
                    return Ok(ClaimOutcome::RetryLater);
                }

                info!(
                    claim_id = claim.id,
                    %wallet,
                    %symbol,
                    transfer_ref = %transfer_ref,
                    "Claim confirmed"
                );
                let next_eligible_at = chrono::Duration::from_std(asset.cooldown())
                    .ok()
                    .and_then(|cooldown| claimed_at.checked_add_signed(cooldown))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                Ok(ClaimOutcome::Success {
                    claim_id: claim.id,
                    amount: claim.amount.clone(),
                    transfer_ref,
                    next_eligible_at,
                })
            }
            TransferStatus::Failed => {
                warn!(claim_id = claim.id, transfer_ref = %transfer_ref, "Transfer failed on-chain");
                self.fail_claim(claim.id).await
            }
            TransferStatus::Pending => {
                // No confirmation within the bound: terminal `failed` for this
                // attempt. The real transfer may still land later; the
                // reconciler upgrades it by transfer reference if it does.
                warn!(
                    claim_id = claim.id,
                    transfer_ref = %transfer_ref,
                    timeout_secs = self.confirm_timeout.as_secs(),
                    "No transfer confirmation within bound"
                );
                self.fail_claim(claim.id).await
            }
        }
    }

    async fn fail_claim(&self, claim_id: i64) -> Result<ClaimOutcome, StoreError> {
        match self.claims.transition_to_failed(claim_id).await? {
            Transition::Applied => Ok(ClaimOutcome::TransferFailed { claim_id }),
            Transition::AlreadyTerminal => {
                warn!(claim_id, "Claim already terminal on failure transition");
                Ok(ClaimOutcome::ConcurrencyConflict)
            }
        }
    }

    /// Poll the ledger until the transfer resolves or the bound elapses.
    /// Poll errors are treated as still-pending; only the deadline ends the wait.
    async fn await_confirmation(&self, transfer_ref: &str) -> TransferStatus {
        let deadline = tokio::time::Instant::now() + self.confirm_timeout;
        loop {
            match self.ledger.transfer_status(transfer_ref).await {
                Ok(TransferStatus::Confirmed) => return TransferStatus::Confirmed,
                Ok(TransferStatus::Failed) => return TransferStatus::Failed,
                Ok(TransferStatus::Pending) => {}
                Err(err) => {
                    debug!(transfer_ref = %transfer_ref, error = %err, "Transfer status poll failed");
                }
            }
            if tokio::time::Instant::now() + self.confirm_poll > deadline {
                return TransferStatus::Pending;
            }
            tokio::time::sleep(self.confirm_poll).await;
        }
    }

    /// Fail fast for an unknown or inactive symbol; no claim state is created.
    async fn reject_unsupported(
        &self,
        wallet: &WalletAddress,
        symbol: &AssetSymbol,
    ) -> ClaimOutcome {
        self.audit_rejection(wallet, symbol, RejectReason::UnsupportedAsset)
            .await;
        let outcome = ClaimOutcome::UnsupportedAsset;
        metrics::record_claim(symbol.as_str(), outcome.label());
        outcome
    }

    /// Best-effort audit of an admission rejection; a failed audit write must
    /// not turn an expected rejection into an error.
    async fn audit_rejection(
        &self,
        wallet: &WalletAddress,
        symbol: &AssetSymbol,
        reason: RejectReason,
    ) {
        if let Err(err) = self.claims.record_rejection(wallet, symbol, reason).await {
            warn!(%wallet, %symbol, reason = reason.as_str(), error = %err, "Failed to audit rejection");
        }
    }
}
