//! Loading and persisting the order aggregate.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;
use wms_fulfillment::{Effects, OrderAggregate};
use wms_schemas::{
    InventoryTransaction, NewOrder, OrderException, OrderItem, OrderStateChange, PickTask,
    WmsError,
};

use crate::error::{is_unique_violation, StorageContext};
use crate::ledger::apply_all;
use crate::rows::{
    convert_all, OrderExceptionRow, OrderItemRow, OrderRow, OrderStateChangeRow, PickTaskRow,
    EXCEPTION_COLUMNS, ITEM_COLUMNS, ORDER_COLUMNS, STATE_CHANGE_COLUMNS, TASK_COLUMNS,
};

/// Insert a new PENDING order and its numbered lines.
pub async fn create_order(pool: &PgPool, new: &NewOrder) -> Result<OrderAggregate, WmsError> {
    let agg = OrderAggregate::intake(new, Utc::now())?;

    let mut tx = pool.begin().await.ctx("begin failed")?;
    let o = &agg.order;
    let inserted = sqlx::query(
        r#"
        insert into orders
          (id, order_number, customer_id, customer_name, priority, status, progress,
           version, created_at)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(o.id)
    .bind(&o.order_number)
    .bind(&o.customer_id)
    .bind(&o.customer_name)
    .bind(o.priority.as_str())
    .bind(o.status.as_str())
    .bind(i16::from(o.progress))
    .bind(o.version)
    .bind(o.created_at)
    .execute(&mut *tx)
    .await;

    if let Err(e) = inserted {
        if is_unique_violation(&e, "uq_orders_order_number") {
            return Err(WmsError::conflict(format!(
                "order_number {} already exists",
                o.order_number
            )));
        }
        return Err(WmsError::Storage(format!("insert order failed: {e}")));
    }

    for item in &agg.items {
        upsert_item(&mut tx, item).await?;
    }
    tx.commit().await.ctx("commit failed")?;

    info!(
        order_id = %o.id,
        order_number = %o.order_number,
        items = agg.items.len(),
        "order created"
    );
    Ok(agg)
}

/// Order with its lines, tasks and exceptions.
pub async fn get_order(pool: &PgPool, order_id: Uuid) -> Result<OrderAggregate, WmsError> {
    let mut conn = pool.acquire().await.ctx("acquire connection failed")?;
    load_aggregate(&mut conn, order_id, false).await
}

/// Status audit rows for one order, oldest first.
pub async fn list_state_changes(
    pool: &PgPool,
    order_id: Uuid,
) -> Result<Vec<OrderStateChange>, WmsError> {
    let rows = sqlx::query_as::<_, OrderStateChangeRow>(&format!(
        "select {STATE_CHANGE_COLUMNS} from order_state_changes \
         where order_id = $1 order by changed_at, id"
    ))
    .bind(order_id)
    .fetch_all(pool)
    .await
    .ctx("list order_state_changes failed")?;
    convert_all(rows)
}

/// Read the whole aggregate. With `lock`, the order row is held FOR UPDATE
/// until the caller's transaction ends; every writer of an order's children
/// takes this lock first.
pub(crate) async fn load_aggregate(
    conn: &mut PgConnection,
    order_id: Uuid,
    lock: bool,
) -> Result<OrderAggregate, WmsError> {
    let lock_clause = if lock { " for update" } else { "" };
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "select {ORDER_COLUMNS} from orders where id = $1{lock_clause}"
    ))
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await
    .ctx("load order failed")?
    .ok_or_else(|| WmsError::not_found("order", order_id))?;

    let items: Vec<OrderItem> = convert_all(
        sqlx::query_as::<_, OrderItemRow>(&format!(
            "select {ITEM_COLUMNS} from order_items where order_id = $1 order by line_no"
        ))
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await
        .ctx("load order_items failed")?,
    )?;

    let tasks: Vec<PickTask> = convert_all(
        sqlx::query_as::<_, PickTaskRow>(&format!(
            "select {TASK_COLUMNS} from pick_tasks where order_id = $1 order by sequence"
        ))
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await
        .ctx("load pick_tasks failed")?,
    )?;

    let exceptions: Vec<OrderException> = convert_all(
        sqlx::query_as::<_, OrderExceptionRow>(&format!(
            "select {EXCEPTION_COLUMNS} from order_exceptions \
             where order_id = $1 order by reported_at, id"
        ))
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await
        .ctx("load order_exceptions failed")?,
    )?;

    Ok(OrderAggregate::new(row.try_into()?, items, tasks, exceptions))
}

/// Order id owning an exception. Ownership never changes, so the lookup runs
/// outside the operation's transaction.
pub(crate) async fn order_id_for_exception(
    pool: &PgPool,
    exception_id: Uuid,
) -> Result<Uuid, WmsError> {
    let row: Option<(Uuid,)> =
        sqlx::query_as("select order_id from order_exceptions where id = $1")
            .bind(exception_id)
            .fetch_optional(pool)
            .await
            .ctx("lookup exception failed")?;
    row.map(|(id,)| id)
        .ok_or_else(|| WmsError::not_found("exception", exception_id))
}

pub(crate) async fn order_id_for_item(pool: &PgPool, item_id: Uuid) -> Result<Uuid, WmsError> {
    let row: Option<(Uuid,)> = sqlx::query_as("select order_id from order_items where id = $1")
        .bind(item_id)
        .fetch_optional(pool)
        .await
        .ctx("lookup order_item failed")?;
    row.map(|(id,)| id)
        .ok_or_else(|| WmsError::not_found("order_item", item_id))
}

/// Write a mutated aggregate and its effects.
///
/// Ledger operations go first so a stock failure aborts before any order row
/// is touched. The order row update is guarded by `prior_version`; on success
/// the aggregate carries the new version.
pub(crate) async fn persist(
    conn: &mut PgConnection,
    agg: &mut OrderAggregate,
    prior_version: i64,
    effects: &Effects,
    actor: &str,
    at: DateTime<Utc>,
) -> Result<Vec<InventoryTransaction>, WmsError> {
    let journal = apply_all(conn, &effects.ledger, Some(agg.order.id), actor, at).await?;

    update_order(conn, agg, prior_version).await?;
    agg.order.version = prior_version + 1;

    for item in &agg.items {
        upsert_item(conn, item).await?;
    }
    for task in &agg.tasks {
        upsert_task(conn, task).await?;
    }
    for ex in &agg.exceptions {
        upsert_exception(conn, ex).await?;
    }
    for change in &effects.state_changes {
        insert_state_change(conn, change).await?;
    }
    Ok(journal)
}

async fn update_order(
    conn: &mut PgConnection,
    agg: &OrderAggregate,
    prior_version: i64,
) -> Result<(), WmsError> {
    let o = &agg.order;
    let res = sqlx::query(
        r#"
        update orders set
          status = $3, picker_id = $4, packer_id = $5, progress = $6,
          tracking_number = $7, cancel_reason = $8, tasks_generated_at = $9,
          last_activity_at = $10, claimed_at = $11, picked_at = $12,
          packing_started_at = $13, packed_at = $14, shipped_at = $15,
          cancelled_at = $16, backordered_at = $17,
          version = version + 1
        where id = $1 and version = $2
        "#,
    )
    .bind(o.id)
    .bind(prior_version)
    .bind(o.status.as_str())
    .bind(&o.picker_id)
    .bind(&o.packer_id)
    .bind(i16::from(o.progress))
    .bind(&o.tracking_number)
    .bind(&o.cancel_reason)
    .bind(o.tasks_generated_at)
    .bind(o.last_activity_at)
    .bind(o.claimed_at)
    .bind(o.picked_at)
    .bind(o.packing_started_at)
    .bind(o.packed_at)
    .bind(o.shipped_at)
    .bind(o.cancelled_at)
    .bind(o.backordered_at)
    .execute(&mut *conn)
    .await
    .ctx("update order failed")?;

    if res.rows_affected() == 0 {
        return Err(WmsError::conflict(format!(
            "order {} was modified concurrently (expected version {prior_version})",
            o.id
        )));
    }
    Ok(())
}

async fn upsert_item(conn: &mut PgConnection, it: &OrderItem) -> Result<(), WmsError> {
    sqlx::query(
        r#"
        insert into order_items
          (id, order_id, line_no, sku, bin_location, quantity, picked_quantity,
           verified_quantity, status)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        on conflict (id) do update set
          quantity = excluded.quantity,
          picked_quantity = excluded.picked_quantity,
          verified_quantity = excluded.verified_quantity,
          status = excluded.status
        "#,
    )
    .bind(it.id)
    .bind(it.order_id)
    .bind(it.line_no)
    .bind(&it.sku)
    .bind(&it.bin_location)
    .bind(it.quantity)
    .bind(it.picked_quantity)
    .bind(it.verified_quantity)
    .bind(it.status.as_str())
    .execute(&mut *conn)
    .await
    .ctx("upsert order_item failed")?;
    Ok(())
}

async fn upsert_task(conn: &mut PgConnection, t: &PickTask) -> Result<(), WmsError> {
    sqlx::query(
        r#"
        insert into pick_tasks
          (id, order_id, order_item_id, sequence, sku, bin_location, quantity,
           picked_quantity, reserved_quantity, status, picker_id, started_at,
           completed_at, skipped_at, skip_reason)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        on conflict (id) do update set
          quantity = excluded.quantity,
          picked_quantity = excluded.picked_quantity,
          reserved_quantity = excluded.reserved_quantity,
          status = excluded.status,
          picker_id = excluded.picker_id,
          started_at = excluded.started_at,
          completed_at = excluded.completed_at,
          skipped_at = excluded.skipped_at,
          skip_reason = excluded.skip_reason
        "#,
    )
    .bind(t.id)
    .bind(t.order_id)
    .bind(t.order_item_id)
    .bind(t.sequence)
    .bind(&t.sku)
    .bind(&t.bin_location)
    .bind(t.quantity)
    .bind(t.picked_quantity)
    .bind(t.reserved_quantity)
    .bind(t.status.as_str())
    .bind(&t.picker_id)
    .bind(t.started_at)
    .bind(t.completed_at)
    .bind(t.skipped_at)
    .bind(&t.skip_reason)
    .execute(&mut *conn)
    .await
    .ctx("upsert pick_task failed")?;
    Ok(())
}

async fn upsert_exception(conn: &mut PgConnection, e: &OrderException) -> Result<(), WmsError> {
    sqlx::query(
        r#"
        insert into order_exceptions
          (id, order_id, order_item_id, sku, bin_location, exception_type, status,
           expected_quantity, actual_quantity, quantity_short, reported_by, reported_at,
           notes, reviewed_by, reviewed_at, resolution, resolution_notes, resolved_by,
           resolved_at)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19)
        on conflict (id) do update set
          status = excluded.status,
          reviewed_by = excluded.reviewed_by,
          reviewed_at = excluded.reviewed_at,
          resolution = excluded.resolution,
          resolution_notes = excluded.resolution_notes,
          resolved_by = excluded.resolved_by,
          resolved_at = excluded.resolved_at
        "#,
    )
    .bind(e.id)
    .bind(e.order_id)
    .bind(e.order_item_id)
    .bind(&e.sku)
    .bind(&e.bin_location)
    .bind(e.exception_type.as_str())
    .bind(e.status.as_str())
    .bind(e.expected_quantity)
    .bind(e.actual_quantity)
    .bind(e.quantity_short)
    .bind(&e.reported_by)
    .bind(e.reported_at)
    .bind(&e.notes)
    .bind(&e.reviewed_by)
    .bind(e.reviewed_at)
    .bind(e.resolution.map(|r| r.as_str()))
    .bind(&e.resolution_notes)
    .bind(&e.resolved_by)
    .bind(e.resolved_at)
    .execute(&mut *conn)
    .await
    .ctx("upsert order_exception failed")?;
    Ok(())
}

pub(crate) async fn insert_state_change(
    conn: &mut PgConnection,
    c: &OrderStateChange,
) -> Result<(), WmsError> {
    sqlx::query(
        r#"
        insert into order_state_changes
          (id, order_id, from_status, to_status, actor, reason, changed_at)
        values ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(c.id)
    .bind(c.order_id)
    .bind(c.from_status.as_str())
    .bind(c.to_status.as_str())
    .bind(&c.actor)
    .bind(&c.reason)
    .bind(c.changed_at)
    .execute(&mut *conn)
    .await
    .ctx("insert order_state_change failed")?;
    Ok(())
}
