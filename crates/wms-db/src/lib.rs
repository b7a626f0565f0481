//! wms-db
//!
//! PostgreSQL persistence for fulfillment. Every public operation runs in one
//! database transaction: it loads what it needs under row locks, applies the
//! pure rules from `wms-fulfillment`, writes the result together with its
//! ledger and audit rows, and commits. Errors roll the whole operation back.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod claim;
mod error;
mod ledger;
mod ops;
mod orders;
mod reaper;
mod rows;

pub use claim::{claim_order, unclaim_all_for_picker, unclaim_order};
pub use error::StorageContext;
pub use ledger::{
    adjust_stock, apply_op, list_skus, list_transactions, list_units, receive_stock,
    reconcile_sku,
};
pub use ops::{
    approve_exception, cancel_exception, cancel_order, claim_packing, complete_packing,
    complete_picking, log_exception, record_pick, reject_exception, resolve_exception,
    ship_order, skip_task, start_review, verify_item, Committed, PickScan,
};
pub use orders::{create_order, get_order, list_state_changes};
pub use reaper::{reap_stale_claims, ReapedClaim, REAPER_ACTOR, REAPER_REASON};

pub const ENV_DB_URL: &str = "WMS_DATABASE_URL";

/// Connect to Postgres using WMS_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, 10).await
}

pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Connectivity plus schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='orders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_orders_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}

/// Orders currently held in PICKING, for the CLI guard on migrations.
pub async fn count_orders_in_picking(pool: &PgPool) -> Result<i64> {
    if !status(pool).await?.has_orders_table {
        return Ok(0);
    }
    let (n,): (i64,) =
        sqlx::query_as::<_, (i64,)>("select count(*)::bigint from orders where status = 'PICKING'")
            .fetch_one(pool)
            .await
            .context("count_orders_in_picking failed")?;
    Ok(n)
}
