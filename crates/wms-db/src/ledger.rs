//! The Inventory Ledger in SQL. Each operation is one guarded UPDATE whose
//! WHERE clause is the invariant, plus one journal row, inside the caller's
//! transaction.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};
use uuid::Uuid;
use wms_ledger::{reconcile, transaction_effect, Balance, LedgerError, LedgerOp, ReconcileReport};
use wms_schemas::{InventoryTransaction, InventoryUnit, WmsError};

use crate::error::StorageContext;
use crate::rows::{convert_all, InventoryTransactionRow, InventoryUnitRow, TRANSACTION_COLUMNS};

fn validate(op: &LedgerOp) -> Result<(), WmsError> {
    let err = match op {
        LedgerOp::Adjust { delta, .. } if *delta == 0 => Some(LedgerError::ZeroAdjustment),
        LedgerOp::Reserve { qty, .. }
        | LedgerOp::Deduct { qty, .. }
        | LedgerOp::Release { qty, .. }
        | LedgerOp::Receive { qty, .. }
            if *qty <= 0 =>
        {
            Some(LedgerError::NonPositiveQty { qty: *qty })
        }
        _ => None,
    };
    match err {
        Some(e) => Err(e.into_wms(op.sku(), op.bin_location())),
        None => Ok(()),
    }
}

/// Apply one ledger operation and journal it.
///
/// Stock that only grows (receipt, positive adjustment) upserts the row.
/// Everything else is a conditional update that matches only when the
/// post-state keeps `0 <= reserved <= quantity`; when it matches nothing the
/// current balance is read back to report why.
pub async fn apply_op(
    conn: &mut PgConnection,
    op: &LedgerOp,
    order_id: Option<Uuid>,
    actor: &str,
    at: DateTime<Utc>,
) -> Result<InventoryTransaction, WmsError> {
    validate(op)?;
    let (sku, bin) = (op.sku(), op.bin_location());
    let (d_on_hand, d_reserved) = transaction_effect(op.tx_type(), op.signed_quantity());

    let updated: Option<(i64, i64)> = if d_reserved == 0 && d_on_hand > 0 {
        sqlx::query_as::<_, (i64, i64)>(
            r#"
            insert into inventory_units (sku, bin_location, quantity, reserved, updated_at)
            values ($1, $2, $3, 0, $4)
            on conflict (sku, bin_location) do update
              set quantity = inventory_units.quantity + excluded.quantity,
                  updated_at = excluded.updated_at
            returning quantity, reserved
            "#,
        )
        .bind(sku)
        .bind(bin)
        .bind(d_on_hand)
        .bind(at)
        .fetch_optional(&mut *conn)
        .await
        .ctx("inventory upsert failed")?
    } else {
        sqlx::query_as::<_, (i64, i64)>(
            r#"
            update inventory_units
               set quantity = quantity + $3,
                   reserved = reserved + $4,
                   updated_at = $5
             where sku = $1 and bin_location = $2
               and reserved + $4 >= 0
               and quantity + $3 >= reserved + $4
            returning quantity, reserved
            "#,
        )
        .bind(sku)
        .bind(bin)
        .bind(d_on_hand)
        .bind(d_reserved)
        .bind(at)
        .fetch_optional(&mut *conn)
        .await
        .ctx("inventory conditional update failed")?
    };

    if updated.is_none() {
        return Err(explain_rejection(conn, op).await);
    }

    let tx = InventoryTransaction {
        id: Uuid::now_v7(),
        tx_type: op.tx_type(),
        sku: sku.to_string(),
        bin_location: bin.to_string(),
        quantity: op.signed_quantity(),
        order_id,
        actor: actor.to_string(),
        reason: op.reason().map(str::to_string),
        created_at: at,
    };
    sqlx::query(
        r#"
        insert into inventory_transactions
          (id, tx_type, sku, bin_location, quantity, order_id, actor, reason, created_at)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(tx.id)
    .bind(tx.tx_type.as_str())
    .bind(&tx.sku)
    .bind(&tx.bin_location)
    .bind(tx.quantity)
    .bind(tx.order_id)
    .bind(&tx.actor)
    .bind(&tx.reason)
    .bind(tx.created_at)
    .execute(&mut *conn)
    .await
    .ctx("insert inventory_transaction failed")?;

    Ok(tx)
}

/// Re-run the rejected operation against the stored balance to name the
/// violated invariant.
async fn explain_rejection(conn: &mut PgConnection, op: &LedgerOp) -> WmsError {
    let row = sqlx::query_as::<_, (i64, i64)>(
        "select quantity, reserved from inventory_units where sku = $1 and bin_location = $2",
    )
    .bind(op.sku())
    .bind(op.bin_location())
    .fetch_optional(&mut *conn)
    .await;

    let mut balance = match row {
        Ok(Some((q, r))) => Balance::new(q, r),
        Ok(None) => Balance::default(),
        Err(e) => return WmsError::Storage(format!("inventory read-back failed: {e}")),
    };
    match op.apply(&mut balance) {
        Err(e) => e.into_wms(op.sku(), op.bin_location()),
        Ok(()) => WmsError::conflict(format!(
            "inventory row {} @ {} changed concurrently; retry",
            op.sku(),
            op.bin_location()
        )),
    }
}

/// Apply several operations in order inside the caller's transaction.
pub(crate) async fn apply_all(
    conn: &mut PgConnection,
    ops: &[LedgerOp],
    order_id: Option<Uuid>,
    actor: &str,
    at: DateTime<Utc>,
) -> Result<Vec<InventoryTransaction>, WmsError> {
    let mut out = Vec::with_capacity(ops.len());
    for op in ops {
        out.push(apply_op(conn, op, order_id, actor, at).await?);
    }
    Ok(out)
}

async fn apply_standalone(
    pool: &PgPool,
    op: &LedgerOp,
    actor: &str,
) -> Result<InventoryTransaction, WmsError> {
    let mut tx = pool.begin().await.ctx("begin failed")?;
    let row = apply_op(&mut tx, op, None, actor, Utc::now()).await?;
    tx.commit().await.ctx("commit failed")?;
    info!(
        sku = %row.sku,
        bin = %row.bin_location,
        tx_type = %row.tx_type,
        quantity = row.quantity,
        actor = %row.actor,
        "inventory journal entry"
    );
    Ok(row)
}

/// Goods in. Creates the (SKU, bin) row on first receipt.
pub async fn receive_stock(
    pool: &PgPool,
    sku: &str,
    bin_location: &str,
    qty: i64,
    actor: &str,
    reason: &str,
) -> Result<InventoryTransaction, WmsError> {
    require_key(sku, bin_location)?;
    apply_standalone(pool, &LedgerOp::receive(sku, bin_location, qty, reason), actor).await
}

/// Signed on-hand correction (cycle count). Never below what is reserved.
pub async fn adjust_stock(
    pool: &PgPool,
    sku: &str,
    bin_location: &str,
    delta: i64,
    actor: &str,
    reason: &str,
) -> Result<InventoryTransaction, WmsError> {
    require_key(sku, bin_location)?;
    if reason.trim().is_empty() {
        return Err(WmsError::validation("adjustment reason must not be empty"));
    }
    apply_standalone(pool, &LedgerOp::adjust(sku, bin_location, delta, reason), actor).await
}

fn require_key(sku: &str, bin_location: &str) -> Result<(), WmsError> {
    if sku.trim().is_empty() || bin_location.trim().is_empty() {
        return Err(WmsError::validation("sku and bin_location must not be empty"));
    }
    Ok(())
}

/// Lock every row for the given SKUs, in key order so concurrent allocators
/// cannot deadlock, and return them.
pub(crate) async fn lock_units(
    conn: &mut PgConnection,
    skus: &[String],
) -> Result<Vec<InventoryUnit>, WmsError> {
    let rows = sqlx::query_as::<_, InventoryUnitRow>(
        r#"
        select sku, bin_location, quantity, reserved, updated_at
          from inventory_units
         where sku = any($1)
         order by sku, bin_location
         for update
        "#,
    )
    .bind(skus)
    .fetch_all(&mut *conn)
    .await
    .ctx("lock inventory_units failed")?;
    Ok(rows.into_iter().map(InventoryUnit::from).collect())
}

pub async fn list_units(pool: &PgPool, sku: &str) -> Result<Vec<InventoryUnit>, WmsError> {
    let rows = sqlx::query_as::<_, InventoryUnitRow>(
        r#"
        select sku, bin_location, quantity, reserved, updated_at
          from inventory_units
         where sku = $1
         order by bin_location
        "#,
    )
    .bind(sku)
    .fetch_all(pool)
    .await
    .ctx("list inventory_units failed")?;
    Ok(rows.into_iter().map(InventoryUnit::from).collect())
}

/// Journal rows for one SKU, oldest first.
pub async fn list_transactions(
    pool: &PgPool,
    sku: &str,
) -> Result<Vec<InventoryTransaction>, WmsError> {
    let rows = sqlx::query_as::<_, InventoryTransactionRow>(&format!(
        "select {TRANSACTION_COLUMNS} from inventory_transactions \
         where sku = $1 order by created_at, id"
    ))
    .bind(sku)
    .fetch_all(pool)
    .await
    .ctx("list inventory_transactions failed")?;
    convert_all(rows)
}

pub async fn list_skus(pool: &PgPool) -> Result<Vec<String>, WmsError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        select sku from inventory_units
        union
        select sku from inventory_transactions
        order by 1
        "#,
    )
    .fetch_all(pool)
    .await
    .ctx("list skus failed")?;
    Ok(rows.into_iter().map(|(s,)| s).collect())
}

/// Compare live rows for `sku` with the replayed journal, reading both from
/// one snapshot.
pub async fn reconcile_sku(pool: &PgPool, sku: &str) -> Result<ReconcileReport, WmsError> {
    let mut tx = pool.begin().await.ctx("begin failed")?;
    sqlx::query("set transaction isolation level repeatable read, read only")
        .execute(&mut *tx)
        .await
        .ctx("set isolation failed")?;

    let units: Vec<InventoryUnit> = sqlx::query_as::<_, InventoryUnitRow>(
        r#"
        select sku, bin_location, quantity, reserved, updated_at
          from inventory_units
         where sku = $1
         order by bin_location
        "#,
    )
    .bind(sku)
    .fetch_all(&mut *tx)
    .await
    .ctx("reconcile read inventory_units failed")?
    .into_iter()
    .map(InventoryUnit::from)
    .collect();

    let journal: Vec<InventoryTransaction> = convert_all(
        sqlx::query_as::<_, InventoryTransactionRow>(&format!(
            "select {TRANSACTION_COLUMNS} from inventory_transactions \
             where sku = $1 order by created_at, id"
        ))
        .bind(sku)
        .fetch_all(&mut *tx)
        .await
        .ctx("reconcile read inventory_transactions failed")?,
    )?;
    tx.commit().await.ctx("commit failed")?;

    let report = reconcile(sku, &units, &journal);
    if !report.is_clean() {
        warn!(sku = %sku, diffs = ?report.diffs, "inventory drift detected");
    }
    Ok(report)
}
