//! Reconciliation of partial failures
//!
//! Two idempotent passes over recent claims, run on a poll loop:
//!
//! 1. **Cooldown repair** — a transfer confirmed but the cooldown write was
//!    lost. The ledger is raised to the claim's creation time (never moved
//!    backwards) so the wallet cannot double-draw the window.
//! 2. **Stray successes** — a claim was marked failed because no confirmation
//!    arrived within the bound, but its submitted transfer later landed. The
//!    claim is upgraded by its exact transfer reference and the cooldown is
//!    recorded.
//!
//! This is the one place where eventual consistency is acceptable; the
//! orchestrator itself never retries.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use eyre::Result;
use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::cooldown::CooldownLedger;
use crate::ledger::{LedgerClient, TransferStatus};
use crate::metrics;
use crate::store::{ClaimStore, StoreError, Transition};
use crate::types::{AssetSymbol, WalletAddress};

pub struct Reconciler {
    claims: Arc<dyn ClaimStore>,
    cooldowns: Arc<dyn CooldownLedger>,
    ledger: Arc<dyn LedgerClient>,
    interval: Duration,
    lookback: chrono::Duration,
}

impl Reconciler {
    pub fn new(
        claims: Arc<dyn ClaimStore>,
        cooldowns: Arc<dyn CooldownLedger>,
        ledger: Arc<dyn LedgerClient>,
        interval: Duration,
        lookback_hours: i64,
    ) -> Self {
        Self {
            claims,
            cooldowns,
            ledger,
            interval,
            lookback: chrono::Duration::hours(lookback_hours),
        }
    }

    /// Run the reconciliation loop until a shutdown signal arrives.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            lookback_hours = self.lookback.num_hours(),
            "Starting reconciler"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, stopping reconciler");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(err) = self.run_once().await {
                        error!(error = %err, "Reconciliation pass failed");
                    }
                }
            }
        }
    }

    /// One full reconciliation pass. Idempotent; safe to run concurrently
    /// with live claims.
    pub async fn run_once(&self) -> Result<(), StoreError> {
        let since = Utc::now() - self.lookback;
        self.repair_cooldowns(since).await?;
        self.resolve_stray_successes(since).await?;
        Ok(())
    }

    /// Pass 1: confirmed claims whose cooldown entry is missing or older
    /// than the claim.
    async fn repair_cooldowns(&self, since: chrono::DateTime<Utc>) -> Result<(), StoreError> {
        let orphaned = self.claims.confirmed_missing_cooldown(since).await?;
        for claim in orphaned {
            let (wallet, symbol) = match parse_claim_key(&claim.wallet, &claim.asset) {
                Some(key) => key,
                None => {
                    warn!(claim_id = claim.id, "Skipping claim with unparseable key");
                    continue;
                }
            };
            self.cooldowns
                .mark_claimed_at_least(&wallet, &symbol, claim.created_at)
                .await?;
            metrics::record_cooldown_repaired();
            info!(
                claim_id = claim.id,
                wallet = %wallet,
                asset = %symbol,
                "Repaired missing cooldown for confirmed claim"
            );
        }
        Ok(())
    }

    /// Pass 2: failed claims with a transfer reference whose transfer did
    /// in fact confirm.
    async fn resolve_stray_successes(
        &self,
        since: chrono::DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let candidates = self.claims.failed_with_transfer_ref(since).await?;
        if candidates.is_empty() {
            return Ok(());
        }

        let statuses = join_all(candidates.iter().map(|claim| async {
            match claim.transfer_ref.as_deref() {
                Some(transfer_ref) => self.ledger.transfer_status(transfer_ref).await.ok(),
                None => None,
            }
        }))
        .await;

        for (claim, status) in candidates.iter().zip(statuses) {
            let transfer_ref = match claim.transfer_ref.as_deref() {
                Some(transfer_ref) => transfer_ref,
                None => continue,
            };
            match status {
                Some(TransferStatus::Confirmed) => {
                    if self
                        .claims
                        .upgrade_stray_success(claim.id, transfer_ref)
                        .await?
                        == Transition::Applied
                    {
                        let (wallet, symbol) = match parse_claim_key(&claim.wallet, &claim.asset) {
                            Some(key) => key,
                            None => {
                                warn!(claim_id = claim.id, "Skipping claim with unparseable key");
                                continue;
                            }
                        };
                        self.cooldowns
                            .mark_claimed_at_least(&wallet, &symbol, claim.created_at)
                            .await?;
                        metrics::record_stray_success_resolved();
                        info!(
                            claim_id = claim.id,
                            transfer_ref = %transfer_ref,
                            "Upgraded stray success to confirmed"
                        );
                    }
                }
                Some(TransferStatus::Failed) | Some(TransferStatus::Pending) => {}
                None => {
                    debug!(
                        claim_id = claim.id,
                        transfer_ref = %transfer_ref,
                        "Transfer status unavailable; will re-check next pass"
                    );
                }
            }
        }
        Ok(())
    }
}

fn parse_claim_key(wallet: &str, asset: &str) -> Option<(WalletAddress, AssetSymbol)> {
    // Stored values are already normalized; a parse failure means a corrupted row.
    Some((
        WalletAddress::parse(wallet).ok()?,
        AssetSymbol::parse(asset).ok()?,
    ))
}
