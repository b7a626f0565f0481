//! Order claim protocol.
//!
//! The claim itself is one conditional UPDATE; its affected-row count is the
//! verdict, so two pickers racing for the same order get exactly one winner.
//! Task generation for a first claim runs in the same transaction.

use std::collections::BTreeSet;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;
use wms_fulfillment::{stock_snapshot, AllocationPolicy};
use wms_schemas::{OrderStateChange, OrderStatus, WmsError};

use crate::error::StorageContext;
use crate::ledger::lock_units;
use crate::ops::{mutate, Committed};
use crate::orders::{insert_state_change, load_aggregate, persist};

/// PENDING with no picker → PICKING owned by `picker_id`, generating and
/// reserving pick tasks if the order has none yet.
pub async fn claim_order(
    pool: &PgPool,
    order_id: Uuid,
    picker_id: &str,
    policy: &AllocationPolicy,
) -> Result<Committed, WmsError> {
    if picker_id.trim().is_empty() {
        return Err(WmsError::validation("picker_id must not be empty"));
    }
    let at = Utc::now();
    let mut tx = pool.begin().await.ctx("begin failed")?;

    let res = sqlx::query(
        r#"
        update orders
           set status = 'PICKING',
               picker_id = $2,
               claimed_at = $3,
               last_activity_at = $3,
               version = version + 1
         where id = $1
           and status = 'PENDING'
           and picker_id is null
        "#,
    )
    .bind(order_id)
    .bind(picker_id)
    .bind(at)
    .execute(&mut *tx)
    .await
    .ctx("claim update failed")?;

    if res.rows_affected() != 1 {
        let current: Option<(String, Option<String>)> =
            sqlx::query_as("select status, picker_id from orders where id = $1")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await
                .ctx("claim read-back failed")?;
        return Err(match current {
            None => WmsError::not_found("order", order_id),
            Some((status, picker)) => WmsError::conflict(format!(
                "order {order_id} is not claimable (status {status}, picker {picker:?})"
            )),
        });
    }

    let change = OrderStateChange {
        id: Uuid::now_v7(),
        order_id,
        from_status: OrderStatus::Pending,
        to_status: OrderStatus::Picking,
        actor: picker_id.to_string(),
        reason: None,
        changed_at: at,
    };
    insert_state_change(&mut tx, &change).await?;

    let mut agg = load_aggregate(&mut tx, order_id, true).await?;
    let mut transactions = Vec::new();
    if agg.order.tasks_generated_at.is_none() {
        let skus: Vec<String> = agg
            .items
            .iter()
            .map(|i| i.sku.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let units = lock_units(&mut tx, &skus).await?;
        let prior_version = agg.order.version;
        let effects = agg.generate_tasks(&stock_snapshot(&units), policy, picker_id, at)?;
        transactions = persist(&mut tx, &mut agg, prior_version, &effects, picker_id, at).await?;
    }
    tx.commit().await.ctx("commit failed")?;

    info!(
        order_id = %order_id,
        picker_id = %picker_id,
        tasks = agg.tasks.len(),
        open_exceptions = agg.open_exception_count(),
        "order claimed"
    );
    Ok(Committed {
        aggregate: agg,
        state_changes: vec![change],
        transactions,
    })
}

/// PICKING → PENDING. Tasks return to PENDING; reservations stay with the
/// order.
pub async fn unclaim_order(
    pool: &PgPool,
    order_id: Uuid,
    actor: &str,
    reason: &str,
) -> Result<Committed, WmsError> {
    mutate(pool, order_id, actor, |agg, at| agg.unclaim(actor, reason, at)).await
}

/// Release every order `picker_id` holds. Used on logout; an order the
/// picker lost in the meantime is skipped.
pub async fn unclaim_all_for_picker(
    pool: &PgPool,
    picker_id: &str,
    reason: &str,
) -> Result<Vec<Uuid>, WmsError> {
    let held: Vec<(Uuid,)> = sqlx::query_as(
        "select id from orders where status = 'PICKING' and picker_id = $1 order by id",
    )
    .bind(picker_id)
    .fetch_all(pool)
    .await
    .ctx("list held orders failed")?;

    let mut released = Vec::with_capacity(held.len());
    for (order_id,) in held {
        let outcome = mutate(pool, order_id, picker_id, |agg, at| {
            if agg.order.picker_id.as_deref() != Some(picker_id) {
                return Err(WmsError::conflict(format!(
                    "order {order_id} no longer held by {picker_id}"
                )));
            }
            agg.unclaim(picker_id, reason, at)
        })
        .await;
        match outcome {
            Ok(_) => released.push(order_id),
            Err(WmsError::Conflict(msg)) => {
                warn!(order_id = %order_id, picker_id = %picker_id, %msg, "unclaim skipped")
            }
            Err(e) => return Err(e),
        }
    }
    if !released.is_empty() {
        info!(picker_id = %picker_id, orders = released.len(), "picker session claims released");
    }
    Ok(released)
}
