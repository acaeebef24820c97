//! Per-(wallet, asset) lock registry
//!
//! Serializes claim attempts for the same key so two requests can never both
//! observe "eligible" and both dispatch a transfer. Locks are created on
//! first use and evicted opportunistically once uncontended, so the map does
//! not grow with every wallet ever seen.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::{AssetSymbol, WalletAddress};

type Key = (WalletAddress, AssetSymbol);

#[derive(Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<Key, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for (wallet, asset), waiting behind any holder of the
    /// same key. Calls for different keys proceed fully in parallel.
    pub async fn acquire(
        &self,
        wallet: &WalletAddress,
        asset: &AssetSymbol,
    ) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().await;
            // An entry whose Arc is only held by the map has no holder and
            // no waiter; drop it before (possibly) re-creating this key.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry((wallet.clone(), asset.clone()))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }

    /// Number of live lock entries (contended or held).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
