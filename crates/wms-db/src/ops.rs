//! Order and exception operations. Each one is a single transaction:
//! lock the order row, apply the rule to the loaded aggregate, persist the
//! aggregate with its ledger and audit effects, commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;
use wms_fulfillment::{
    Effects, ExceptionReport, OrderAggregate, ResolutionRequest, ShortPickTolerance,
};
use wms_schemas::{InventoryTransaction, OrderException, OrderStateChange, WmsError};

use crate::error::StorageContext;
use crate::orders::{load_aggregate, order_id_for_exception, order_id_for_item, persist};

/// Outcome of a committed operation.
#[derive(Clone, Debug, Serialize)]
pub struct Committed {
    pub aggregate: OrderAggregate,
    pub state_changes: Vec<OrderStateChange>,
    pub transactions: Vec<InventoryTransaction>,
}

/// One scanned pick against a task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickScan {
    pub task_id: Uuid,
    pub sku: String,
    pub bin_location: String,
    pub quantity: i64,
}

pub(crate) async fn mutate<F>(
    pool: &PgPool,
    order_id: Uuid,
    actor: &str,
    op: F,
) -> Result<Committed, WmsError>
where
    F: FnOnce(&mut OrderAggregate, DateTime<Utc>) -> Result<Effects, WmsError>,
{
    let at = Utc::now();
    let mut tx = pool.begin().await.ctx("begin failed")?;
    let mut agg = load_aggregate(&mut tx, order_id, true).await?;
    let prior_version = agg.order.version;

    let effects = op(&mut agg, at)?;
    let transactions = persist(&mut tx, &mut agg, prior_version, &effects, actor, at).await?;
    tx.commit().await.ctx("commit failed")?;

    for c in &effects.state_changes {
        info!(
            order_id = %c.order_id,
            from = %c.from_status,
            to = %c.to_status,
            actor = %c.actor,
            "order status changed"
        );
    }
    debug!(
        order_id = %order_id,
        ledger_entries = transactions.len(),
        version = agg.order.version,
        "order persisted"
    );

    Ok(Committed {
        aggregate: agg,
        state_changes: effects.state_changes,
        transactions,
    })
}

// ---------------------------------------------------------------------------
// Picking
// ---------------------------------------------------------------------------

pub async fn record_pick(
    pool: &PgPool,
    order_id: Uuid,
    picker_id: &str,
    scan: &PickScan,
) -> Result<Committed, WmsError> {
    mutate(pool, order_id, picker_id, |agg, at| {
        agg.record_pick(
            scan.task_id,
            picker_id,
            &scan.sku,
            &scan.bin_location,
            scan.quantity,
            at,
        )
    })
    .await
}

pub async fn skip_task(
    pool: &PgPool,
    order_id: Uuid,
    task_id: Uuid,
    actor: &str,
    reason: &str,
) -> Result<Committed, WmsError> {
    mutate(pool, order_id, actor, |agg, at| {
        agg.skip_task(task_id, actor, reason, at)
    })
    .await
}

pub async fn complete_picking(
    pool: &PgPool,
    order_id: Uuid,
    picker_id: &str,
) -> Result<Committed, WmsError> {
    mutate(pool, order_id, picker_id, |agg, at| {
        agg.complete_picking(picker_id, at)
    })
    .await
}

/// PENDING/PICKING → CANCELLED, releasing every reservation the order holds.
pub async fn cancel_order(
    pool: &PgPool,
    order_id: Uuid,
    actor: &str,
    reason: &str,
) -> Result<Committed, WmsError> {
    mutate(pool, order_id, actor, |agg, at| agg.cancel(actor, reason, at)).await
}

// ---------------------------------------------------------------------------
// Packing and shipping
// ---------------------------------------------------------------------------

pub async fn claim_packing(
    pool: &PgPool,
    order_id: Uuid,
    packer_id: &str,
) -> Result<Committed, WmsError> {
    mutate(pool, order_id, packer_id, |agg, at| {
        agg.claim_packing(packer_id, at)
    })
    .await
}

pub async fn verify_item(
    pool: &PgPool,
    order_id: Uuid,
    item_id: Uuid,
    packer_id: &str,
    quantity: i64,
) -> Result<Committed, WmsError> {
    mutate(pool, order_id, packer_id, |agg, at| {
        agg.verify_item(item_id, packer_id, quantity, at)
    })
    .await
}

pub async fn complete_packing(
    pool: &PgPool,
    order_id: Uuid,
    packer_id: &str,
) -> Result<Committed, WmsError> {
    mutate(pool, order_id, packer_id, |agg, at| {
        agg.complete_packing(packer_id, at)
    })
    .await
}

pub async fn ship_order(
    pool: &PgPool,
    order_id: Uuid,
    actor: &str,
    tracking_number: Option<&str>,
) -> Result<Committed, WmsError> {
    mutate(pool, order_id, actor, |agg, at| {
        agg.ship(actor, tracking_number, at)
    })
    .await
}

// ---------------------------------------------------------------------------
// Exceptions
// ---------------------------------------------------------------------------

/// Log an exception against a line of a PICKING order.
pub async fn log_exception(
    pool: &PgPool,
    report: &ExceptionReport,
    tolerance: &ShortPickTolerance,
) -> Result<OrderException, WmsError> {
    let order_id = order_id_for_item(pool, report.order_item_id).await?;
    let mut logged = None;
    mutate(pool, order_id, &report.reported_by, |agg, at| {
        logged = Some(agg.log_exception(report, tolerance, at)?);
        Ok(Effects::default())
    })
    .await?;
    let ex = logged.ok_or_else(|| WmsError::fatal("exception logged without a record"))?;
    info!(
        exception_id = %ex.id,
        order_id = %ex.order_id,
        exception_type = %ex.exception_type,
        quantity_short = ex.quantity_short,
        "exception logged"
    );
    Ok(ex)
}

pub async fn start_review(
    pool: &PgPool,
    exception_id: Uuid,
    reviewer: &str,
) -> Result<Committed, WmsError> {
    let order_id = order_id_for_exception(pool, exception_id).await?;
    mutate(pool, order_id, reviewer, |agg, at| {
        agg.start_review(exception_id, reviewer, at)?;
        Ok(Effects::default())
    })
    .await
}

pub async fn approve_exception(
    pool: &PgPool,
    exception_id: Uuid,
    reviewer: &str,
) -> Result<Committed, WmsError> {
    let order_id = order_id_for_exception(pool, exception_id).await?;
    mutate(pool, order_id, reviewer, |agg, at| {
        agg.approve_exception(exception_id, reviewer, at)?;
        Ok(Effects::default())
    })
    .await
}

pub async fn reject_exception(
    pool: &PgPool,
    exception_id: Uuid,
    reviewer: &str,
    notes: Option<&str>,
) -> Result<Committed, WmsError> {
    let order_id = order_id_for_exception(pool, exception_id).await?;
    mutate(pool, order_id, reviewer, |agg, at| {
        agg.reject_exception(exception_id, reviewer, notes, at)?;
        Ok(Effects::default())
    })
    .await
}

pub async fn cancel_exception(
    pool: &PgPool,
    exception_id: Uuid,
    actor: &str,
) -> Result<Committed, WmsError> {
    let order_id = order_id_for_exception(pool, exception_id).await?;
    mutate(pool, order_id, actor, |agg, at| {
        agg.cancel_exception(exception_id, actor, at)?;
        Ok(Effects::default())
    })
    .await
}

/// Apply a supervisor resolution. Its ledger effects, line changes and any
/// order transition commit together or not at all.
pub async fn resolve_exception(
    pool: &PgPool,
    exception_id: Uuid,
    request: &ResolutionRequest,
    resolved_by: &str,
) -> Result<Committed, WmsError> {
    let order_id = order_id_for_exception(pool, exception_id).await?;
    let committed = mutate(pool, order_id, resolved_by, |agg, at| {
        agg.resolve_exception(exception_id, request, resolved_by, at)
    })
    .await?;
    info!(
        exception_id = %exception_id,
        order_id = %order_id,
        resolution = %request.resolution,
        ledger_entries = committed.transactions.len(),
        "exception resolved"
    );
    Ok(committed)
}
