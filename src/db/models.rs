#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::ClaimStatus;

// Note: We use String for amount fields to avoid BigDecimal/sqlx version conflicts.
// The database stores amounts as NUMERIC(38,18). When inserting, we cast the text
// value in the SQL query ($3::NUMERIC). When reading, we cast back with
// amount::TEXT so sqlx returns a String.

/// One claim attempt by a wallet for one asset.
///
/// The amount is a snapshot of the asset's configured amount at creation
/// time; it is never re-read from the registry afterwards.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Claim {
    pub id: i64,
    pub wallet: String,
    pub asset: String,
    pub amount: String,
    /// Set when the transfer is submitted; required for a confirmed claim
    pub transfer_ref: Option<String>,
    pub status: ClaimStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One cooldown ledger entry: last successful claim for (wallet, asset).
#[derive(Debug, Clone, FromRow)]
pub struct CooldownEntry {
    pub wallet: String,
    pub asset: String,
    pub last_claim_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audit event for an admission rejection (not a claim).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClaimRejection {
    pub id: i64,
    pub wallet: String,
    pub asset: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
