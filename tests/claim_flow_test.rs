//! Integration tests for the claim orchestration engine
//!
//! Drives the orchestrator and reconciler against in-memory stores and a
//! scriptable ledger client, so every admission, dispatch, and reconciliation
//! path runs without external infrastructure.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use faucet::assets::{Asset, AssetRegistry, PoolRef};
use faucet::orchestrator::{ClaimOrchestrator, ClaimOutcome};
use faucet::reconcile::Reconciler;
use faucet::store::{ClaimStore, Transition};
use faucet::types::{AssetSymbol, ClaimStatus, WalletAddress};

mod fakes {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use chrono::{DateTime, Utc};

    use faucet::assets::Asset;
    use faucet::cooldown::CooldownLedger;
    use faucet::db::Claim;
    use faucet::ledger::{LedgerClient, LedgerError, TransferStatus};
    use faucet::store::{ClaimStore, RejectReason, StoreError, Transition};
    use faucet::types::{AssetSymbol, ClaimStatus, WalletAddress};

    #[derive(Default)]
    struct MemInner {
        claims: Vec<Claim>,
        cooldowns: HashMap<(String, String), DateTime<Utc>>,
        rejections: Vec<(String, String, &'static str)>,
        next_id: i64,
        fail_cooldown_writes: bool,
    }

    /// In-memory store backing both the claim store and the cooldown ledger,
    /// with the same guarded-transition semantics as the Postgres queries.
    #[derive(Default)]
    pub struct MemStore {
        inner: Mutex<MemInner>,
    }

    impl MemStore {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn claims(&self) -> Vec<Claim> {
            self.inner.lock().unwrap().claims.clone()
        }

        pub fn claim_count(&self) -> usize {
            self.inner.lock().unwrap().claims.len()
        }

        pub fn rejection_reasons(&self) -> Vec<&'static str> {
            self.inner
                .lock()
                .unwrap()
                .rejections
                .iter()
                .map(|(_, _, reason)| *reason)
                .collect()
        }

        pub fn cooldown_for(
            &self,
            wallet: &WalletAddress,
            asset: &AssetSymbol,
        ) -> Option<DateTime<Utc>> {
            self.inner
                .lock()
                .unwrap()
                .cooldowns
                .get(&(wallet.as_str().to_string(), asset.as_str().to_string()))
                .copied()
        }

        pub fn set_cooldown(&self, wallet: &WalletAddress, asset: &AssetSymbol, at: DateTime<Utc>) {
            self.inner.lock().unwrap().cooldowns.insert(
                (wallet.as_str().to_string(), asset.as_str().to_string()),
                at,
            );
        }

        pub fn set_fail_cooldown_writes(&self, fail: bool) {
            self.inner.lock().unwrap().fail_cooldown_writes = fail;
        }
    }

    #[async_trait]
    impl ClaimStore for MemStore {
        async fn create(
            &self,
            wallet: &WalletAddress,
            asset: &AssetSymbol,
            amount: &str,
        ) -> Result<Claim, StoreError> {
            let mut inner = self.inner.lock().unwrap();
            inner.next_id += 1;
            let now = Utc::now();
            let claim = Claim {
                id: inner.next_id,
                wallet: wallet.as_str().to_string(),
                asset: asset.as_str().to_string(),
                amount: amount.to_string(),
                transfer_ref: None,
                status: ClaimStatus::Pending,
                created_at: now,
                updated_at: now,
            };
            inner.claims.push(claim.clone());
            Ok(claim)
        }

        async fn set_transfer_ref(&self, id: i64, transfer_ref: &str) -> Result<(), StoreError> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(claim) = inner
                .claims
                .iter_mut()
                .find(|c| c.id == id && c.status == ClaimStatus::Pending)
            {
                claim.transfer_ref = Some(transfer_ref.to_string());
                claim.updated_at = Utc::now();
            }
            Ok(())
        }

        async fn transition_to_confirmed(
            &self,
            id: i64,
            transfer_ref: &str,
        ) -> Result<Transition, StoreError> {
            let mut inner = self.inner.lock().unwrap();
            match inner
                .claims
                .iter_mut()
                .find(|c| c.id == id && c.status == ClaimStatus::Pending)
            {
                Some(claim) => {
                    claim.status = ClaimStatus::Confirmed;
                    claim.transfer_ref = Some(transfer_ref.to_string());
                    claim.updated_at = Utc::now();
                    Ok(Transition::Applied)
                }
                None => Ok(Transition::AlreadyTerminal),
            }
        }

        async fn transition_to_failed(&self, id: i64) -> Result<Transition, StoreError> {
            let mut inner = self.inner.lock().unwrap();
            match inner
                .claims
                .iter_mut()
                .find(|c| c.id == id && c.status == ClaimStatus::Pending)
            {
                Some(claim) => {
                    claim.status = ClaimStatus::Failed;
                    claim.updated_at = Utc::now();
                    Ok(Transition::Applied)
                }
                None => Ok(Transition::AlreadyTerminal),
            }
        }

        async fn upgrade_stray_success(
            &self,
            id: i64,
            transfer_ref: &str,
        ) -> Result<Transition, StoreError> {
            let mut inner = self.inner.lock().unwrap();
            match inner.claims.iter_mut().find(|c| {
                c.id == id
                    && c.status == ClaimStatus::Failed
                    && c.transfer_ref.as_deref() == Some(transfer_ref)
            }) {
                Some(claim) => {
                    claim.status = ClaimStatus::Confirmed;
                    claim.updated_at = Utc::now();
                    Ok(Transition::Applied)
                }
                None => Ok(Transition::AlreadyTerminal),
            }
        }

        async fn get(&self, id: i64) -> Result<Option<Claim>, StoreError> {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .claims
                .iter()
                .find(|c| c.id == id)
                .cloned())
        }

        async fn history_for(
            &self,
            wallet: &WalletAddress,
            limit: i64,
        ) -> Result<Vec<Claim>, StoreError> {
            let inner = self.inner.lock().unwrap();
            let mut claims: Vec<Claim> = inner
                .claims
                .iter()
                .filter(|c| c.wallet == wallet.as_str())
                .cloned()
                .collect();
            claims.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            claims.truncate(limit as usize);
            Ok(claims)
        }

        async fn record_rejection(
            &self,
            wallet: &WalletAddress,
            asset: &AssetSymbol,
            reason: RejectReason,
        ) -> Result<(), StoreError> {
            self.inner.lock().unwrap().rejections.push((
                wallet.as_str().to_string(),
                asset.as_str().to_string(),
                reason.as_str(),
            ));
            Ok(())
        }

        async fn confirmed_missing_cooldown(
            &self,
            since: DateTime<Utc>,
        ) -> Result<Vec<Claim>, StoreError> {
            let inner = self.inner.lock().unwrap();
            Ok(inner
                .claims
                .iter()
                .filter(|c| c.status == ClaimStatus::Confirmed && c.created_at >= since)
                .filter(|c| {
                    let key = (c.wallet.clone(), c.asset.clone());
                    inner
                        .cooldowns
                        .get(&key)
                        .map_or(true, |at| *at < c.created_at)
                })
                .cloned()
                .collect())
        }

        async fn failed_with_transfer_ref(
            &self,
            since: DateTime<Utc>,
        ) -> Result<Vec<Claim>, StoreError> {
            let inner = self.inner.lock().unwrap();
            Ok(inner
                .claims
                .iter()
                .filter(|c| {
                    c.status == ClaimStatus::Failed
                        && c.transfer_ref.is_some()
                        && c.created_at >= since
                })
                .cloned()
                .collect())
        }
    }

    #[async_trait]
    impl CooldownLedger for MemStore {
        async fn last_claim_at(
            &self,
            wallet: &WalletAddress,
            asset: &AssetSymbol,
        ) -> Result<Option<DateTime<Utc>>, StoreError> {
            Ok(self.cooldown_for(wallet, asset))
        }

        async fn mark_claimed(
            &self,
            wallet: &WalletAddress,
            asset: &AssetSymbol,
            at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_cooldown_writes {
                return Err(StoreError::unavailable("injected cooldown write failure"));
            }
            inner.cooldowns.insert(
                (wallet.as_str().to_string(), asset.as_str().to_string()),
                at,
            );
            Ok(())
        }

        async fn mark_claimed_at_least(
            &self,
            wallet: &WalletAddress,
            asset: &AssetSymbol,
            at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_cooldown_writes {
                return Err(StoreError::unavailable("injected cooldown write failure"));
            }
            let key = (wallet.as_str().to_string(), asset.as_str().to_string());
            let entry = inner.cooldowns.entry(key).or_insert(at);
            if *entry < at {
                *entry = at;
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SubmitBehavior {
        Succeed,
        Fail,
    }

    struct LedgerInner {
        balance: BigDecimal,
        fail_balance_queries: bool,
        submit_behavior: SubmitBehavior,
        submitted: u64,
        default_status: TransferStatus,
        statuses: HashMap<String, TransferStatus>,
    }

    /// Scriptable ledger client: balance, submission behavior and per-ref
    /// confirmation status are all controlled by the test.
    pub struct MockLedger {
        inner: Mutex<LedgerInner>,
    }

    impl MockLedger {
        pub fn new(balance: &str) -> Arc<Self> {
            Arc::new(Self {
                inner: Mutex::new(LedgerInner {
                    balance: balance.parse().unwrap(),
                    fail_balance_queries: false,
                    submit_behavior: SubmitBehavior::Succeed,
                    submitted: 0,
                    default_status: TransferStatus::Confirmed,
                    statuses: HashMap::new(),
                }),
            })
        }

        pub fn set_balance(&self, balance: &str) {
            self.inner.lock().unwrap().balance = balance.parse().unwrap();
        }

        pub fn set_fail_balance_queries(&self, fail: bool) {
            self.inner.lock().unwrap().fail_balance_queries = fail;
        }

        pub fn set_submit_behavior(&self, behavior: SubmitBehavior) {
            self.inner.lock().unwrap().submit_behavior = behavior;
        }

        pub fn set_default_status(&self, status: TransferStatus) {
            self.inner.lock().unwrap().default_status = status;
        }

        pub fn set_status(&self, transfer_ref: &str, status: TransferStatus) {
            self.inner
                .lock()
                .unwrap()
                .statuses
                .insert(transfer_ref.to_string(), status);
        }

        pub fn submitted_count(&self) -> u64 {
            self.inner.lock().unwrap().submitted
        }
    }

    #[async_trait]
    impl LedgerClient for MockLedger {
        async fn pool_balance(&self, _asset: &Asset) -> Result<BigDecimal, LedgerError> {
            let inner = self.inner.lock().unwrap();
            if inner.fail_balance_queries {
                return Err(LedgerError::Rpc("injected balance failure".to_string()));
            }
            Ok(inner.balance.clone())
        }

        async fn submit_transfer(
            &self,
            _asset: &Asset,
            _to: &WalletAddress,
            _amount: &BigDecimal,
        ) -> Result<String, LedgerError> {
            let mut inner = self.inner.lock().unwrap();
            match inner.submit_behavior {
                SubmitBehavior::Fail => {
                    Err(LedgerError::Submit("injected network error".to_string()))
                }
                SubmitBehavior::Succeed => {
                    inner.submitted += 1;
                    Ok(format!("0xmock{:064x}", inner.submitted))
                }
            }
        }

        async fn transfer_status(&self, transfer_ref: &str) -> Result<TransferStatus, LedgerError> {
            let inner = self.inner.lock().unwrap();
            Ok(inner
                .statuses
                .get(transfer_ref)
                .copied()
                .unwrap_or(inner.default_status))
        }
    }
}

use fakes::{MemStore, MockLedger, SubmitBehavior};

const EIGHT_HOURS: u64 = 8 * 60 * 60;

fn bone() -> Asset {
    Asset {
        symbol: AssetSymbol::parse("BONE").unwrap(),
        name: "Bone ShibaSwap".to_string(),
        amount: "0.1".to_string(),
        decimals: 18,
        cooldown_secs: EIGHT_HOURS,
        pool: PoolRef::Native,
        active: true,
    }
}

fn treat() -> Asset {
    Asset {
        symbol: AssetSymbol::parse("TREAT").unwrap(),
        name: "Treat".to_string(),
        amount: "5".to_string(),
        decimals: 18,
        cooldown_secs: EIGHT_HOURS,
        pool: PoolRef::Token("0x9a26e6d24df036b0b015016d1b55011c19e76c87".to_string()),
        active: true,
    }
}

fn leash_inactive() -> Asset {
    Asset {
        symbol: AssetSymbol::parse("LEASH").unwrap(),
        name: "Doge Killer".to_string(),
        amount: "0.01".to_string(),
        decimals: 18,
        cooldown_secs: EIGHT_HOURS,
        pool: PoolRef::Native,
        active: false,
    }
}

fn wallet() -> WalletAddress {
    WalletAddress::parse("0xabc0000000000000000000000000000000000abc").unwrap()
}

fn symbol(s: &str) -> AssetSymbol {
    AssetSymbol::parse(s).unwrap()
}

struct Harness {
    orchestrator: Arc<ClaimOrchestrator>,
    registry: Arc<AssetRegistry>,
    store: Arc<MemStore>,
    ledger: Arc<MockLedger>,
}

fn harness(assets: Vec<Asset>, balance: &str) -> Harness {
    let registry = Arc::new(AssetRegistry::from_assets(assets).unwrap());
    let store = MemStore::new();
    let ledger = MockLedger::new(balance);
    let orchestrator = Arc::new(ClaimOrchestrator::new(
        registry.clone(),
        store.clone(),
        store.clone(),
        ledger.clone(),
        Duration::from_millis(200),
        Duration::from_millis(10),
    ));
    Harness {
        orchestrator,
        registry,
        store,
        ledger,
    }
}

fn reconciler(h: &Harness) -> Reconciler {
    Reconciler::new(
        h.store.clone(),
        h.store.clone(),
        h.ledger.clone(),
        Duration::from_secs(60),
        24,
    )
}

#[tokio::test]
async fn test_successful_claim_confirms_and_starts_cooldown() {
    let h = harness(vec![bone()], "100");
    let before = Utc::now();

    let outcome = h.orchestrator.attempt_claim(&wallet(), &symbol("BONE")).await;

    let (claim_id, amount, transfer_ref, next_eligible_at) = match outcome {
        ClaimOutcome::Success {
            claim_id,
            amount,
            transfer_ref,
            next_eligible_at,
        } => (claim_id, amount, transfer_ref, next_eligible_at),
        other => panic!("expected Success, got {:?}", other),
    };

    assert_eq!(amount, "0.1");
    assert!(transfer_ref.starts_with("0xmock"));
    assert!(next_eligible_at >= before + chrono::Duration::seconds(EIGHT_HOURS as i64));

    let claims = h.store.claims();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].id, claim_id);
    assert_eq!(claims[0].status, ClaimStatus::Confirmed);
    assert_eq!(claims[0].transfer_ref.as_deref(), Some(transfer_ref.as_str()));

    // Immediately after a confirmed claim the wallet is on cooldown with the
    // full window remaining.
    let last = h.store.cooldown_for(&wallet(), &symbol("BONE")).unwrap();
    let now = Utc::now();
    assert!(!faucet::cooldown::is_eligible(
        Some(last),
        Duration::from_secs(EIGHT_HOURS),
        now
    ));
    let remaining =
        faucet::cooldown::remaining(Some(last), Duration::from_secs(EIGHT_HOURS), now);
    assert!(remaining > Duration::from_secs(EIGHT_HOURS - 5));
}

#[tokio::test]
async fn test_second_claim_within_window_is_rejected() {
    let h = harness(vec![bone()], "100");

    let first = h.orchestrator.attempt_claim(&wallet(), &symbol("BONE")).await;
    assert!(matches!(first, ClaimOutcome::Success { .. }));

    let second = h.orchestrator.attempt_claim(&wallet(), &symbol("BONE")).await;
    match second {
        ClaimOutcome::CooldownActive { remaining_secs } => {
            assert!(remaining_secs > EIGHT_HOURS - 5 && remaining_secs <= EIGHT_HOURS);
        }
        other => panic!("expected CooldownActive, got {:?}", other),
    }

    // The rejection is audited but creates no claim record.
    assert_eq!(h.store.claim_count(), 1);
    assert_eq!(h.store.rejection_reasons(), vec!["cooldown"]);
}

#[tokio::test]
async fn test_eligible_again_after_window_elapses() {
    let h = harness(vec![bone()], "100");

    // A claim from just inside the window is still blocked...
    h.store.set_cooldown(
        &wallet(),
        &symbol("BONE"),
        Utc::now() - chrono::Duration::seconds(EIGHT_HOURS as i64 - 60),
    );
    let blocked = h.orchestrator.attempt_claim(&wallet(), &symbol("BONE")).await;
    assert!(matches!(blocked, ClaimOutcome::CooldownActive { .. }));

    // ...and one from past the window goes through.
    h.store.set_cooldown(
        &wallet(),
        &symbol("BONE"),
        Utc::now() - chrono::Duration::seconds(EIGHT_HOURS as i64 + 60),
    );
    let allowed = h.orchestrator.attempt_claim(&wallet(), &symbol("BONE")).await;
    assert!(matches!(allowed, ClaimOutcome::Success { .. }));
}

#[tokio::test]
async fn test_failed_submission_leaves_cooldown_untouched_and_retry_succeeds() {
    let h = harness(vec![bone()], "100");
    h.ledger.set_submit_behavior(SubmitBehavior::Fail);

    let outcome = h.orchestrator.attempt_claim(&wallet(), &symbol("BONE")).await;
    let claim_id = match outcome {
        ClaimOutcome::TransferFailed { claim_id } => claim_id,
        other => panic!("expected TransferFailed, got {:?}", other),
    };

    let claims = h.store.claims();
    assert_eq!(claims[0].id, claim_id);
    assert_eq!(claims[0].status, ClaimStatus::Failed);
    assert!(claims[0].transfer_ref.is_none());
    assert!(h.store.cooldown_for(&wallet(), &symbol("BONE")).is_none());

    // The wallet may retry immediately.
    h.ledger.set_submit_behavior(SubmitBehavior::Succeed);
    let retry = h.orchestrator.attempt_claim(&wallet(), &symbol("BONE")).await;
    assert!(matches!(retry, ClaimOutcome::Success { .. }));
    assert_eq!(h.store.claim_count(), 2);
}

#[tokio::test]
async fn test_onchain_failure_marks_claim_failed() {
    let h = harness(vec![bone()], "100");
    h.ledger
        .set_default_status(faucet::ledger::TransferStatus::Failed);

    let outcome = h.orchestrator.attempt_claim(&wallet(), &symbol("BONE")).await;
    assert!(matches!(outcome, ClaimOutcome::TransferFailed { .. }));

    let claims = h.store.claims();
    assert_eq!(claims[0].status, ClaimStatus::Failed);
    assert!(h.store.cooldown_for(&wallet(), &symbol("BONE")).is_none());
}

#[tokio::test]
async fn test_unsupported_and_inactive_assets_create_no_state() {
    let h = harness(vec![bone(), leash_inactive()], "100");

    let unknown = h.orchestrator.attempt_claim(&wallet(), &symbol("DOGE")).await;
    assert_eq!(unknown, ClaimOutcome::UnsupportedAsset);

    let inactive = h.orchestrator.attempt_claim(&wallet(), &symbol("LEASH")).await;
    assert_eq!(inactive, ClaimOutcome::UnsupportedAsset);

    assert_eq!(h.store.claim_count(), 0);
    assert_eq!(
        h.store.rejection_reasons(),
        vec!["unsupported_asset", "unsupported_asset"]
    );
    assert_eq!(h.ledger.submitted_count(), 0);
}

#[tokio::test]
async fn test_insufficient_pool_balance_rejected_before_any_record() {
    let h = harness(vec![treat()], "4");

    let outcome = h.orchestrator.attempt_claim(&wallet(), &symbol("TREAT")).await;
    assert_eq!(outcome, ClaimOutcome::InsufficientPoolBalance);

    assert_eq!(h.store.claim_count(), 0);
    assert!(h.store.cooldown_for(&wallet(), &symbol("TREAT")).is_none());
    assert_eq!(h.store.rejection_reasons(), vec!["insufficient_pool"]);
    assert_eq!(h.ledger.submitted_count(), 0);

    // Balance equal to the claim amount is enough.
    h.ledger.set_balance("5");
    let outcome = h.orchestrator.attempt_claim(&wallet(), &symbol("TREAT")).await;
    assert!(matches!(outcome, ClaimOutcome::Success { .. }));
}

#[tokio::test]
async fn test_balance_query_failure_creates_no_state() {
    let h = harness(vec![bone()], "100");
    h.ledger.set_fail_balance_queries(true);

    let outcome = h.orchestrator.attempt_claim(&wallet(), &symbol("BONE")).await;
    assert_eq!(outcome, ClaimOutcome::RetryLater);
    assert_eq!(h.store.claim_count(), 0);
    assert!(h.store.cooldown_for(&wallet(), &symbol("BONE")).is_none());
}

#[tokio::test]
async fn test_claim_amount_is_snapshot_at_creation() {
    let h = harness(vec![bone()], "100");

    let outcome = h.orchestrator.attempt_claim(&wallet(), &symbol("BONE")).await;
    assert!(matches!(outcome, ClaimOutcome::Success { .. }));

    // Mutating the registry afterwards must not touch the recorded claim.
    let mut richer = bone();
    richer.amount = "25".to_string();
    h.registry.upsert(richer).await.unwrap();

    let claims = h.store.claims();
    assert_eq!(claims[0].amount, "0.1");

    // A later claim picks up the new configured amount.
    h.store.set_cooldown(
        &wallet(),
        &symbol("BONE"),
        Utc::now() - chrono::Duration::seconds(EIGHT_HOURS as i64 + 60),
    );
    let outcome = h.orchestrator.attempt_claim(&wallet(), &symbol("BONE")).await;
    match outcome {
        ClaimOutcome::Success { amount, .. } => assert_eq!(amount, "25"),
        other => panic!("expected Success, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_claims_yield_exactly_one_success() {
    let h = harness(vec![bone()], "1000000");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = h.orchestrator.clone();
        let wallet = wallet();
        let sym = symbol("BONE");
        handles.push(tokio::spawn(async move {
            orchestrator.attempt_claim(&wallet, &sym).await
        }));
    }

    let mut successes = 0;
    let mut cooldowns = 0;
    for handle in handles {
        match handle.await.unwrap() {
            ClaimOutcome::Success { .. } => successes += 1,
            ClaimOutcome::CooldownActive { .. } => cooldowns += 1,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(cooldowns, 7);
    assert_eq!(h.store.claim_count(), 1);
    assert_eq!(h.ledger.submitted_count(), 1);
}

#[tokio::test]
async fn test_confirmation_timeout_fails_claim_but_keeps_transfer_ref() {
    let h = harness(vec![bone()], "100");
    h.ledger
        .set_default_status(faucet::ledger::TransferStatus::Pending);

    let outcome = h.orchestrator.attempt_claim(&wallet(), &symbol("BONE")).await;
    assert!(matches!(outcome, ClaimOutcome::TransferFailed { .. }));

    let claims = h.store.claims();
    assert_eq!(claims[0].status, ClaimStatus::Failed);
    // The submitted reference is retained so the reconciler can match a late
    // confirmation against it.
    assert!(claims[0].transfer_ref.is_some());
    assert!(h.store.cooldown_for(&wallet(), &symbol("BONE")).is_none());
}

#[tokio::test]
async fn test_reconciler_repairs_missing_cooldown() {
    let h = harness(vec![bone()], "100");
    h.store.set_fail_cooldown_writes(true);

    // Transfer confirms but the cooldown write fails: conservative direction,
    // not reported as a success.
    let outcome = h.orchestrator.attempt_claim(&wallet(), &symbol("BONE")).await;
    assert_eq!(outcome, ClaimOutcome::RetryLater);

    let claims = h.store.claims();
    assert_eq!(claims[0].status, ClaimStatus::Confirmed);
    assert!(h.store.cooldown_for(&wallet(), &symbol("BONE")).is_none());

    // The reconciliation pass repairs the ledger once storage recovers.
    h.store.set_fail_cooldown_writes(false);
    reconciler(&h).run_once().await.unwrap();

    let repaired = h.store.cooldown_for(&wallet(), &symbol("BONE")).unwrap();
    assert_eq!(repaired, claims[0].created_at);

    // Idempotent: a second pass changes nothing.
    reconciler(&h).run_once().await.unwrap();
    assert_eq!(
        h.store.cooldown_for(&wallet(), &symbol("BONE")).unwrap(),
        repaired
    );
}

#[tokio::test]
async fn test_reconciler_upgrades_stray_success() {
    let h = harness(vec![bone()], "100");
    h.ledger
        .set_default_status(faucet::ledger::TransferStatus::Pending);

    let outcome = h.orchestrator.attempt_claim(&wallet(), &symbol("BONE")).await;
    assert!(matches!(outcome, ClaimOutcome::TransferFailed { .. }));

    let claims = h.store.claims();
    let transfer_ref = claims[0].transfer_ref.clone().unwrap();

    // The transfer lands after the orchestrator gave up on it.
    h.ledger
        .set_status(&transfer_ref, faucet::ledger::TransferStatus::Confirmed);
    reconciler(&h).run_once().await.unwrap();

    let claims = h.store.claims();
    assert_eq!(claims[0].status, ClaimStatus::Confirmed);
    assert!(h.store.cooldown_for(&wallet(), &symbol("BONE")).is_some());

    // Idempotent: re-running leaves the single upgraded claim untouched.
    reconciler(&h).run_once().await.unwrap();
    assert_eq!(h.store.claim_count(), 1);
    assert_eq!(h.store.claims()[0].status, ClaimStatus::Confirmed);
}

#[tokio::test]
async fn test_terminal_transitions_report_conflicts() {
    let h = harness(vec![bone()], "100");
    let store: Arc<dyn ClaimStore> = h.store.clone();

    let claim = store
        .create(&wallet(), &symbol("BONE"), "0.1")
        .await
        .unwrap();

    assert_eq!(
        store.transition_to_failed(claim.id).await.unwrap(),
        Transition::Applied
    );
    // A terminal claim is never overwritten.
    assert_eq!(
        store
            .transition_to_confirmed(claim.id, "0xdeadbeef")
            .await
            .unwrap(),
        Transition::AlreadyTerminal
    );
    assert_eq!(
        store.transition_to_failed(claim.id).await.unwrap(),
        Transition::AlreadyTerminal
    );

    let stored = store.get(claim.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ClaimStatus::Failed);
    assert!(stored.transfer_ref.is_none());
}

#[tokio::test]
async fn test_history_is_most_recent_first() {
    let h = harness(vec![bone()], "100");
    let store: Arc<dyn ClaimStore> = h.store.clone();

    for _ in 0..3 {
        store
            .create(&wallet(), &symbol("BONE"), "0.1")
            .await
            .unwrap();
    }

    let history = store.history_for(&wallet(), 2).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].id > history[1].id);
}

#[tokio::test]
async fn test_claims_for_different_assets_are_independent() {
    let h = harness(vec![bone(), treat()], "1000000");

    let first = h.orchestrator.attempt_claim(&wallet(), &symbol("BONE")).await;
    assert!(matches!(first, ClaimOutcome::Success { .. }));

    // The BONE cooldown does not block a TREAT claim for the same wallet.
    let second = h.orchestrator.attempt_claim(&wallet(), &symbol("TREAT")).await;
    assert!(matches!(second, ClaimOutcome::Success { .. }));

    assert_eq!(h.store.claim_count(), 2);
}
