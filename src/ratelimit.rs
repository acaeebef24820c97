//! Wallet-level fast-repeat throttle
//!
//! A bounded map of wallet → last-request time with TTL and max-size
//! eviction, applied in the HTTP layer before the orchestrator. This is a
//! commodity pre-filter, not core admission logic: the cooldown ledger is
//! what actually protects the claim window.
//!
//! The map is bounded so adversarial request volume cannot grow it without
//! limit; when full, the oldest entry is evicted on insert.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::types::WalletAddress;

const DEFAULT_MAX_ENTRIES: usize = 100_000;

pub struct WalletThrottle {
    map: Mutex<HashMap<WalletAddress, Instant>>,
    min_interval: Duration,
    max_entries: usize,
}

impl WalletThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_capacity(min_interval, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(min_interval: Duration, max_entries: usize) -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
            min_interval,
            max_entries,
        }
    }

    /// Returns true when the wallet may proceed, recording this request.
    /// Returns false when a request from the same wallet arrived within the
    /// minimum interval.
    pub async fn check(&self, wallet: &WalletAddress) -> bool {
        let now = Instant::now();
        let mut map = self.map.lock().await;

        // Entries older than the interval no longer block anything.
        map.retain(|_, &mut t| now.duration_since(t) < self.min_interval);

        if map.contains_key(wallet) {
            return false;
        }

        while map.len() >= self.max_entries && !map.is_empty() {
            let oldest = map
                .iter()
                .min_by_key(|(_, t)| *t)
                .map(|(w, _)| w.clone());
            if let Some(w) = oldest {
                map.remove(&w);
            } else {
                break;
            }
        }
        map.insert(wallet.clone(), now);
        true
    }

    pub async fn len(&self) -> usize {
        self.map.lock().await.len()
    }
}
