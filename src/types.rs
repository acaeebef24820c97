//! Common types for the faucet service
//!
//! Wallet addresses and asset symbols are normalized newtypes so the rest of
//! the service never handles raw, mixed-case input. The claim status enum has
//! a sqlx::Type derive for database integration.

use serde::{Deserialize, Serialize};
use std::fmt;

use thiserror::Error;

/// Validation failures for request inputs
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidInput {
    #[error("wallet address must be 0x followed by 40 hex characters")]
    BadWalletAddress,
    #[error("asset symbol must be 1-16 alphanumeric characters")]
    BadAssetSymbol,
}

/// A wallet address, normalized to lower-case 0x-prefixed hex.
///
/// All lookups (cooldown ledger, claim store, lock registry) key on this
/// normalized form, so `0xABC…` and `0xabc…` are the same wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Parse and normalize a wallet address (case-insensitive input).
    pub fn parse(input: &str) -> Result<Self, InvalidInput> {
        let trimmed = input.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or(InvalidInput::BadWalletAddress)?;

        if hex_part.len() != 40 {
            return Err(InvalidInput::BadWalletAddress);
        }
        hex::decode(hex_part).map_err(|_| InvalidInput::BadWalletAddress)?;

        Ok(WalletAddress(format!("0x{}", hex_part.to_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An asset symbol, normalized to upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetSymbol(String);

impl AssetSymbol {
    /// Parse and normalize an asset symbol (case-insensitive input).
    pub fn parse(input: &str) -> Result<Self, InvalidInput> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.len() > 16 {
            return Err(InvalidInput::BadAssetSymbol);
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(InvalidInput::BadAssetSymbol);
        }
        Ok(AssetSymbol(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a claim.
///
/// `Confirmed` and `Failed` are terminal; the store's guarded transitions
/// report a conflict instead of overwriting a terminal row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Confirmed,
    Failed,
}

impl ClaimStatus {
    /// Get the status as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Confirmed => "confirmed",
            ClaimStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ClaimStatus::Confirmed | ClaimStatus::Failed)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_address_normalizes_case() {
        let upper = WalletAddress::parse("0xDEAD000000000000000000000000000000000001").unwrap();
        let lower = WalletAddress::parse("0xdead000000000000000000000000000000000001").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(
            upper.as_str(),
            "0xdead000000000000000000000000000000000001"
        );
    }

    #[test]
    fn test_wallet_address_rejects_bad_input() {
        assert!(WalletAddress::parse("dead000000000000000000000000000000000001").is_err());
        assert!(WalletAddress::parse("0xdead").is_err());
        assert!(WalletAddress::parse("0xzz00000000000000000000000000000000000001").is_err());
        assert!(WalletAddress::parse("").is_err());
    }

    #[test]
    fn test_asset_symbol_normalizes_case() {
        let sym = AssetSymbol::parse("bone").unwrap();
        assert_eq!(sym.as_str(), "BONE");
        assert_eq!(sym, AssetSymbol::parse("Bone").unwrap());
    }

    #[test]
    fn test_asset_symbol_rejects_bad_input() {
        assert!(AssetSymbol::parse("").is_err());
        assert!(AssetSymbol::parse("WAY-TOO-LONG-SYMBOL-123").is_err());
        assert!(AssetSymbol::parse("BO NE").is_err());
        assert!(AssetSymbol::parse("BONE!").is_err());
    }

    #[test]
    fn test_status_as_str() {
        assert_eq!(ClaimStatus::Pending.as_str(), "pending");
        assert_eq!(ClaimStatus::Confirmed.as_str(), "confirmed");
        assert_eq!(ClaimStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_status_terminal() {
        assert!(!ClaimStatus::Pending.is_terminal());
        assert!(ClaimStatus::Confirmed.is_terminal());
        assert!(ClaimStatus::Failed.is_terminal());
    }
}
