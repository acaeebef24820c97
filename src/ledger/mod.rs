//! Ledger client: the external transfer transport
//!
//! Models the call-and-confirm pattern as two explicit phases: `submit_transfer`
//! returns a transfer reference immediately, `transfer_status` reports whether
//! that reference has confirmed, failed, or is still pending. The orchestrator
//! bounds its wait on the second phase; the reconciler re-checks stray
//! references later.

use async_trait::async_trait;
use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use thiserror::Error;

use alloy::primitives::U256;

use crate::assets::Asset;
use crate::types::WalletAddress;

pub mod evm;

pub use evm::EvmLedgerClient;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("transfer submission failed: {0}")]
    Submit(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

/// Observed state of a submitted transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Not yet confirmed (no receipt, or not enough confirmation blocks)
    Pending,
    Confirmed,
    /// The transfer landed on-chain but reverted
    Failed,
}

/// Transport capable of dispensing an asset and reporting the pool balance.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current pool balance for the asset, in display units.
    async fn pool_balance(&self, asset: &Asset) -> Result<BigDecimal, LedgerError>;

    /// Submit a transfer of `amount` (display units) to `to`; returns the
    /// transfer reference. One submission per call, no internal retries.
    async fn submit_transfer(
        &self,
        asset: &Asset,
        to: &WalletAddress,
        amount: &BigDecimal,
    ) -> Result<String, LedgerError>;

    /// Check whether a previously submitted transfer has confirmed.
    async fn transfer_status(&self, transfer_ref: &str) -> Result<TransferStatus, LedgerError>;
}

/// Convert a display-unit decimal to base units (10^decimals).
///
/// Rejects amounts with more fractional digits than the asset carries —
/// truncating would silently change what the user is owed.
pub fn to_base_units(amount: &BigDecimal, decimals: u8) -> Result<U256, LedgerError> {
    if amount < &BigDecimal::from(0) {
        return Err(LedgerError::InvalidAmount(format!(
            "amount {} is negative",
            amount
        )));
    }
    // 10^decimals expressed as a decimal with a negative scale
    let factor = BigDecimal::new(BigInt::from(1), -(decimals as i64));
    let scaled = amount * factor;
    if !scaled.is_integer() {
        return Err(LedgerError::InvalidAmount(format!(
            "amount {} has more than {} fractional digits",
            amount, decimals
        )));
    }
    let digits = scaled.with_scale(0).to_string();
    digits
        .parse::<U256>()
        .map_err(|e| LedgerError::InvalidAmount(format!("amount {} out of range: {}", amount, e)))
}

/// Convert base units back to a display-unit decimal.
pub fn from_base_units(raw: U256, decimals: u8) -> BigDecimal {
    let digits = raw.to_string();
    // The string is plain decimal digits, so this parse cannot fail.
    let int = digits.parse::<BigInt>().unwrap_or_default();
    BigDecimal::new(int, decimals as i64)
}
