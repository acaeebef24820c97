use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};

pub mod models;

pub use models::*;

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to database")
}

/// Run pending migrations (uses the migration files in migrations/)
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .wrap_err("Failed to run database migrations")?;
    Ok(())
}

/// SQL SELECT columns for the claims table (casting NUMERIC to TEXT)
const CLAIM_SELECT: &str = r#"id, wallet, asset, amount::TEXT as amount, transfer_ref,
    status, created_at, updated_at"#;

/// Insert a new pending claim and return the full row
pub async fn insert_claim(pool: &PgPool, wallet: &str, asset: &str, amount: &str) -> Result<Claim> {
    let query = format!(
        r#"INSERT INTO claims (wallet, asset, amount)
           VALUES ($1, $2, $3::NUMERIC)
           RETURNING {}"#,
        CLAIM_SELECT
    );
    let claim = sqlx::query_as::<_, Claim>(&query)
        .bind(wallet)
        .bind(asset)
        .bind(amount)
        .fetch_one(pool)
        .await
        .wrap_err("Failed to insert claim")?;

    Ok(claim)
}

/// Record the transfer reference on a still-pending claim at submission time
pub async fn set_claim_transfer_ref(pool: &PgPool, id: i64, transfer_ref: &str) -> Result<()> {
    sqlx::query(
        r#"UPDATE claims SET transfer_ref = $1, updated_at = NOW() WHERE id = $2 AND status = 'pending'"#,
    )
    .bind(transfer_ref)
    .bind(id)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to set transfer_ref on claim {}", id))?;

    Ok(())
}

/// Transition a pending claim to confirmed. Returns false when the claim was
/// already terminal (guarded transition; the row is never overwritten).
pub async fn mark_claim_confirmed(pool: &PgPool, id: i64, transfer_ref: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"UPDATE claims SET status = 'confirmed', transfer_ref = $1, updated_at = NOW()
           WHERE id = $2 AND status = 'pending'"#,
    )
    .bind(transfer_ref)
    .bind(id)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to mark claim {} confirmed", id))?;

    Ok(result.rows_affected() == 1)
}

/// Transition a pending claim to failed. Returns false when already terminal.
pub async fn mark_claim_failed(pool: &PgPool, id: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"UPDATE claims SET status = 'failed', updated_at = NOW()
           WHERE id = $1 AND status = 'pending'"#,
    )
    .bind(id)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to mark claim {} failed", id))?;

    Ok(result.rows_affected() == 1)
}

/// Upgrade a failed claim whose submitted transfer later proved to have
/// landed. Guarded by the exact transfer reference so the pass is idempotent
/// and can never touch a claim that failed before submission.
pub async fn upgrade_failed_claim(pool: &PgPool, id: i64, transfer_ref: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"UPDATE claims SET status = 'confirmed', updated_at = NOW()
           WHERE id = $1 AND status = 'failed' AND transfer_ref = $2"#,
    )
    .bind(id)
    .bind(transfer_ref)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to upgrade failed claim {}", id))?;

    Ok(result.rows_affected() == 1)
}

/// Get a claim by id
pub async fn get_claim(pool: &PgPool, id: i64) -> Result<Option<Claim>> {
    let query = format!("SELECT {} FROM claims WHERE id = $1", CLAIM_SELECT);
    let claim = sqlx::query_as::<_, Claim>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
        .wrap_err_with(|| format!("Failed to get claim {}", id))?;

    Ok(claim)
}

/// Get a wallet's claims, most recent first
pub async fn get_claims_for_wallet(pool: &PgPool, wallet: &str, limit: i64) -> Result<Vec<Claim>> {
    let query = format!(
        "SELECT {} FROM claims WHERE wallet = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        CLAIM_SELECT
    );
    let claims = sqlx::query_as::<_, Claim>(&query)
        .bind(wallet)
        .bind(limit)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to get claims for wallet")?;

    Ok(claims)
}

/// Count claims in a given status (for the health endpoint)
pub async fn count_claims_with_status(pool: &PgPool, status: &str) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM claims WHERE status = $1"#)
        .bind(status)
        .fetch_one(pool)
        .await
        .wrap_err("Failed to count claims")?;

    Ok(row.0)
}

/// Record an admission rejection audit event
pub async fn insert_rejection(pool: &PgPool, wallet: &str, asset: &str, reason: &str) -> Result<()> {
    sqlx::query(r#"INSERT INTO claim_rejections (wallet, asset, reason) VALUES ($1, $2, $3)"#)
        .bind(wallet)
        .bind(asset)
        .bind(reason)
        .execute(pool)
        .await
        .wrap_err("Failed to insert claim rejection")?;

    Ok(())
}

/// Get the last successful claim time for (wallet, asset), if any
pub async fn get_cooldown(
    pool: &PgPool,
    wallet: &str,
    asset: &str,
) -> Result<Option<DateTime<Utc>>> {
    let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
        r#"SELECT last_claim_at FROM cooldowns WHERE wallet = $1 AND asset = $2"#,
    )
    .bind(wallet)
    .bind(asset)
    .fetch_optional(pool)
    .await
    .wrap_err("Failed to get cooldown entry")?;

    Ok(row.map(|r| r.0))
}

/// Upsert the cooldown timestamp for (wallet, asset). Last-writer-wins; the
/// orchestrator's per-key lock serializes callers for the same key.
pub async fn upsert_cooldown(
    pool: &PgPool,
    wallet: &str,
    asset: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cooldowns (wallet, asset, last_claim_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (wallet, asset) DO UPDATE SET last_claim_at = EXCLUDED.last_claim_at, updated_at = NOW()
        "#,
    )
    .bind(wallet)
    .bind(asset)
    .bind(at)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to upsert cooldown for ({}, {})", wallet, asset))?;

    Ok(())
}

/// Upsert the cooldown timestamp without ever moving it backwards. Used by
/// the reconciler, which may be racing a fresh confirmed claim for the key.
pub async fn raise_cooldown(
    pool: &PgPool,
    wallet: &str,
    asset: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cooldowns (wallet, asset, last_claim_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (wallet, asset) DO UPDATE
            SET last_claim_at = GREATEST(cooldowns.last_claim_at, EXCLUDED.last_claim_at),
                updated_at = NOW()
        "#,
    )
    .bind(wallet)
    .bind(asset)
    .bind(at)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to raise cooldown for ({}, {})", wallet, asset))?;

    Ok(())
}

// ============ Reconciliation Queries ============

/// Confirmed claims whose cooldown entry is missing or older than the claim
/// (the partial-failure window: transfer confirmed, cooldown write lost).
pub async fn get_confirmed_claims_missing_cooldown(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<Claim>> {
    let query = format!(
        r#"SELECT {} FROM claims c
           WHERE c.status = 'confirmed'
             AND c.created_at >= $1
             AND NOT EXISTS (
                 SELECT 1 FROM cooldowns cd
                 WHERE cd.wallet = c.wallet AND cd.asset = c.asset
                   AND cd.last_claim_at >= c.created_at
             )
           ORDER BY c.created_at ASC"#,
        CLAIM_SELECT
    );
    let claims = sqlx::query_as::<_, Claim>(&query)
        .bind(since)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to get confirmed claims missing cooldown")?;

    Ok(claims)
}

/// Failed claims that carry a transfer reference: a submission went out but
/// no confirmation arrived within the bound. Candidates for the
/// stray-success upgrade.
pub async fn get_failed_claims_with_transfer_ref(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<Claim>> {
    let query = format!(
        r#"SELECT {} FROM claims
           WHERE status = 'failed' AND transfer_ref IS NOT NULL AND created_at >= $1
           ORDER BY created_at ASC"#,
        CLAIM_SELECT
    );
    let claims = sqlx::query_as::<_, Claim>(&query)
        .bind(since)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to get failed claims with transfer_ref")?;

    Ok(claims)
}
