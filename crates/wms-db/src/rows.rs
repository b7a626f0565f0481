//! Row types as stored, and their conversion into domain entities. Text
//! codes that match no variant are a contract failure (`Fatal`).

use chrono::{DateTime, Utc};
use uuid::Uuid;
use wms_schemas::{
    ExceptionStatus, ExceptionType, InventoryTransaction, InventoryUnit, Order, OrderException,
    OrderItem, OrderItemStatus, OrderStateChange, OrderStatus, PickTask, Priority, Resolution,
    TaskStatus, TransactionType, WmsError,
};

pub(crate) const ORDER_COLUMNS: &str = "id, order_number, customer_id, customer_name, priority, \
    status, picker_id, packer_id, progress, version, tracking_number, cancel_reason, \
    tasks_generated_at, last_activity_at, created_at, claimed_at, picked_at, \
    packing_started_at, packed_at, shipped_at, cancelled_at, backordered_at";

pub(crate) const ITEM_COLUMNS: &str = "id, order_id, line_no, sku, bin_location, quantity, \
    picked_quantity, verified_quantity, status";

pub(crate) const TASK_COLUMNS: &str = "id, order_id, order_item_id, sequence, sku, bin_location, \
    quantity, picked_quantity, reserved_quantity, status, picker_id, started_at, completed_at, \
    skipped_at, skip_reason";

pub(crate) const EXCEPTION_COLUMNS: &str = "id, order_id, order_item_id, sku, bin_location, \
    exception_type, status, expected_quantity, actual_quantity, quantity_short, reported_by, \
    reported_at, notes, reviewed_by, reviewed_at, resolution, resolution_notes, resolved_by, \
    resolved_at";

pub(crate) const TRANSACTION_COLUMNS: &str =
    "id, tx_type, sku, bin_location, quantity, order_id, actor, reason, created_at";

pub(crate) const STATE_CHANGE_COLUMNS: &str =
    "id, order_id, from_status, to_status, actor, reason, changed_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderRow {
    id: Uuid,
    order_number: String,
    customer_id: String,
    customer_name: String,
    priority: String,
    status: String,
    picker_id: Option<String>,
    packer_id: Option<String>,
    progress: i16,
    version: i64,
    tracking_number: Option<String>,
    cancel_reason: Option<String>,
    tasks_generated_at: Option<DateTime<Utc>>,
    last_activity_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    picked_at: Option<DateTime<Utc>>,
    packing_started_at: Option<DateTime<Utc>>,
    packed_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    backordered_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = WmsError;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let progress = u8::try_from(r.progress)
            .map_err(|_| WmsError::fatal(format!("order {} progress {} out of range", r.id, r.progress)))?;
        Ok(Order {
            id: r.id,
            order_number: r.order_number,
            customer_id: r.customer_id,
            customer_name: r.customer_name,
            priority: Priority::parse(&r.priority)?,
            status: OrderStatus::parse(&r.status)?,
            picker_id: r.picker_id,
            packer_id: r.packer_id,
            progress,
            version: r.version,
            tracking_number: r.tracking_number,
            cancel_reason: r.cancel_reason,
            tasks_generated_at: r.tasks_generated_at,
            last_activity_at: r.last_activity_at,
            created_at: r.created_at,
            claimed_at: r.claimed_at,
            picked_at: r.picked_at,
            packing_started_at: r.packing_started_at,
            packed_at: r.packed_at,
            shipped_at: r.shipped_at,
            cancelled_at: r.cancelled_at,
            backordered_at: r.backordered_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    line_no: i32,
    sku: String,
    bin_location: String,
    quantity: i64,
    picked_quantity: i64,
    verified_quantity: i64,
    status: String,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = WmsError;

    fn try_from(r: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(OrderItem {
            id: r.id,
            order_id: r.order_id,
            line_no: r.line_no,
            sku: r.sku,
            bin_location: r.bin_location,
            quantity: r.quantity,
            picked_quantity: r.picked_quantity,
            verified_quantity: r.verified_quantity,
            status: OrderItemStatus::parse(&r.status)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PickTaskRow {
    id: Uuid,
    order_id: Uuid,
    order_item_id: Uuid,
    sequence: i32,
    sku: String,
    bin_location: String,
    quantity: i64,
    picked_quantity: i64,
    reserved_quantity: i64,
    status: String,
    picker_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    skipped_at: Option<DateTime<Utc>>,
    skip_reason: Option<String>,
}

impl TryFrom<PickTaskRow> for PickTask {
    type Error = WmsError;

    fn try_from(r: PickTaskRow) -> Result<Self, Self::Error> {
        Ok(PickTask {
            id: r.id,
            order_id: r.order_id,
            order_item_id: r.order_item_id,
            sequence: r.sequence,
            sku: r.sku,
            bin_location: r.bin_location,
            quantity: r.quantity,
            picked_quantity: r.picked_quantity,
            reserved_quantity: r.reserved_quantity,
            status: TaskStatus::parse(&r.status)?,
            picker_id: r.picker_id,
            started_at: r.started_at,
            completed_at: r.completed_at,
            skipped_at: r.skipped_at,
            skip_reason: r.skip_reason,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct InventoryUnitRow {
    sku: String,
    bin_location: String,
    quantity: i64,
    reserved: i64,
    updated_at: DateTime<Utc>,
}

impl From<InventoryUnitRow> for InventoryUnit {
    fn from(r: InventoryUnitRow) -> Self {
        InventoryUnit {
            sku: r.sku,
            bin_location: r.bin_location,
            quantity: r.quantity,
            reserved: r.reserved,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct InventoryTransactionRow {
    id: Uuid,
    tx_type: String,
    sku: String,
    bin_location: String,
    quantity: i64,
    order_id: Option<Uuid>,
    actor: String,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<InventoryTransactionRow> for InventoryTransaction {
    type Error = WmsError;

    fn try_from(r: InventoryTransactionRow) -> Result<Self, Self::Error> {
        Ok(InventoryTransaction {
            id: r.id,
            tx_type: TransactionType::parse(&r.tx_type)?,
            sku: r.sku,
            bin_location: r.bin_location,
            quantity: r.quantity,
            order_id: r.order_id,
            actor: r.actor,
            reason: r.reason,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderExceptionRow {
    id: Uuid,
    order_id: Uuid,
    order_item_id: Uuid,
    sku: String,
    bin_location: String,
    exception_type: String,
    status: String,
    expected_quantity: i64,
    actual_quantity: i64,
    quantity_short: i64,
    reported_by: String,
    reported_at: DateTime<Utc>,
    notes: Option<String>,
    reviewed_by: Option<String>,
    reviewed_at: Option<DateTime<Utc>>,
    resolution: Option<String>,
    resolution_notes: Option<String>,
    resolved_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderExceptionRow> for OrderException {
    type Error = WmsError;

    fn try_from(r: OrderExceptionRow) -> Result<Self, Self::Error> {
        Ok(OrderException {
            id: r.id,
            order_id: r.order_id,
            order_item_id: r.order_item_id,
            sku: r.sku,
            bin_location: r.bin_location,
            exception_type: ExceptionType::parse(&r.exception_type)?,
            status: ExceptionStatus::parse(&r.status)?,
            expected_quantity: r.expected_quantity,
            actual_quantity: r.actual_quantity,
            quantity_short: r.quantity_short,
            reported_by: r.reported_by,
            reported_at: r.reported_at,
            notes: r.notes,
            reviewed_by: r.reviewed_by,
            reviewed_at: r.reviewed_at,
            resolution: r.resolution.as_deref().map(Resolution::parse).transpose()?,
            resolution_notes: r.resolution_notes,
            resolved_by: r.resolved_by,
            resolved_at: r.resolved_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderStateChangeRow {
    id: Uuid,
    order_id: Uuid,
    from_status: String,
    to_status: String,
    actor: String,
    reason: Option<String>,
    changed_at: DateTime<Utc>,
}

impl TryFrom<OrderStateChangeRow> for OrderStateChange {
    type Error = WmsError;

    fn try_from(r: OrderStateChangeRow) -> Result<Self, Self::Error> {
        Ok(OrderStateChange {
            id: r.id,
            order_id: r.order_id,
            from_status: OrderStatus::parse(&r.from_status)?,
            to_status: OrderStatus::parse(&r.to_status)?,
            actor: r.actor,
            reason: r.reason,
            changed_at: r.changed_at,
        })
    }
}

/// Convert every row, stopping at the first bad code.
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, WmsError>
where
    T: TryFrom<R, Error = WmsError>,
{
    rows.into_iter().map(T::try_from).collect()
}
