use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{
    ExceptionStatus, ExceptionType, ItemContext, ItemStatusView, OrderItemStatus, OrderStatus,
    Priority, Resolution, TaskStatus, TransactionType,
};

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// One customer fulfillment unit.
///
/// `progress` is derived from the items and is only ever written by the
/// recompute step; `version` increments on every persisted mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: String,
    pub customer_name: String,
    pub priority: Priority,
    pub status: OrderStatus,
    pub picker_id: Option<String>,
    pub packer_id: Option<String>,
    pub progress: u8,
    pub version: i64,
    pub tracking_number: Option<String>,
    pub cancel_reason: Option<String>,
    pub tasks_generated_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub picked_at: Option<DateTime<Utc>>,
    pub packing_started_at: Option<DateTime<Utc>>,
    pub packed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub backordered_at: Option<DateTime<Utc>>,
}

impl Order {
    /// A fresh PENDING order as produced by intake.
    pub fn new_pending(
        id: Uuid,
        order_number: impl Into<String>,
        customer_id: impl Into<String>,
        customer_name: impl Into<String>,
        priority: Priority,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_number: order_number.into(),
            customer_id: customer_id.into(),
            customer_name: customer_name.into(),
            priority,
            status: OrderStatus::Pending,
            picker_id: None,
            packer_id: None,
            progress: 0,
            version: 0,
            tracking_number: None,
            cancel_reason: None,
            tasks_generated_at: None,
            last_activity_at: None,
            created_at,
            claimed_at: None,
            picked_at: None,
            packing_started_at: None,
            packed_at: None,
            shipped_at: None,
            cancelled_at: None,
            backordered_at: None,
        }
    }
}

/// Intake payload for a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_number: String,
    pub customer_id: String,
    pub customer_name: String,
    pub priority: Priority,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub sku: String,
    /// Primary bin to pick from. Allocation may fall back to other bins.
    pub bin_location: String,
    pub quantity: i64,
}

// ---------------------------------------------------------------------------
// OrderItem
// ---------------------------------------------------------------------------

/// One SKU line within an order. `0 <= picked_quantity <= quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub line_no: i32,
    pub sku: String,
    pub bin_location: String,
    pub quantity: i64,
    pub picked_quantity: i64,
    pub verified_quantity: i64,
    pub status: OrderItemStatus,
}

impl OrderItem {
    pub fn is_fully_picked(&self) -> bool {
        self.picked_quantity >= self.quantity
    }

    /// Units ordered but not yet picked.
    pub fn outstanding(&self) -> i64 {
        (self.quantity - self.picked_quantity).max(0)
    }

    /// Re-derive `status` from the quantities.
    pub fn refresh_status(&mut self) {
        self.status = OrderItemStatus::from_quantities(self.picked_quantity, self.quantity);
    }

    /// Status of this line in the phase the caller names.
    ///
    /// In the picking phase the line's status is the rollup of its pick tasks;
    /// afterwards it is the line's own [`OrderItemStatus`].
    pub fn status_view(&self, ctx: ItemContext, tasks: &[PickTask]) -> ItemStatusView {
        match ctx {
            ItemContext::PostPick => ItemStatusView::PostPick(self.status),
            ItemContext::Picking => {
                let mine: Vec<&PickTask> =
                    tasks.iter().filter(|t| t.order_item_id == self.id).collect();
                ItemStatusView::Picking(rollup_task_status(&mine))
            }
        }
    }
}

fn rollup_task_status(tasks: &[&PickTask]) -> TaskStatus {
    if tasks.is_empty() {
        return TaskStatus::Pending;
    }
    if tasks.iter().all(|t| t.status == TaskStatus::Completed) {
        return TaskStatus::Completed;
    }
    if tasks.iter().all(|t| t.status == TaskStatus::Skipped) {
        return TaskStatus::Skipped;
    }
    if tasks.iter().any(|t| t.status != TaskStatus::Pending) {
        return TaskStatus::InProgress;
    }
    TaskStatus::Pending
}

// ---------------------------------------------------------------------------
// PickTask
// ---------------------------------------------------------------------------

/// Atomic unit of picking work bound to one (SKU, bin, quantity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickTask {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub sequence: i32,
    pub sku: String,
    pub bin_location: String,
    pub quantity: i64,
    pub picked_quantity: i64,
    /// Units the ledger still holds reserved for this task.
    /// `reserved_quantity <= quantity - picked_quantity`.
    pub reserved_quantity: i64,
    pub status: TaskStatus,
    pub picker_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub skipped_at: Option<DateTime<Utc>>,
    pub skip_reason: Option<String>,
}

impl PickTask {
    pub fn remaining(&self) -> i64 {
        (self.quantity - self.picked_quantity).max(0)
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Stock of one SKU at one bin. `0 <= reserved <= quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryUnit {
    pub sku: String,
    pub bin_location: String,
    pub quantity: i64,
    pub reserved: i64,
    pub updated_at: DateTime<Utc>,
}

impl InventoryUnit {
    pub fn available(&self) -> i64 {
        self.quantity - self.reserved
    }
}

/// Append-only ledger entry. `quantity` is signed with the effect on the
/// counter the entry type moves (see `wms_ledger::signed_quantity`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: Uuid,
    pub tx_type: TransactionType,
    pub sku: String,
    pub bin_location: String,
    pub quantity: i64,
    pub order_id: Option<Uuid>,
    pub actor: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Exceptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderException {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub sku: String,
    pub bin_location: String,
    pub exception_type: ExceptionType,
    pub status: ExceptionStatus,
    pub expected_quantity: i64,
    pub actual_quantity: i64,
    pub quantity_short: i64,
    pub reported_by: String,
    pub reported_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub resolution: Option<Resolution>,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// One row per order status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStateChange {
    pub id: Uuid,
    pub order_id: Uuid,
    pub from_status: OrderStatus,
    pub to_status: OrderStatus,
    pub actor: String,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}
