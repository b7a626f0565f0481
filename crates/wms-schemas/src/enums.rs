text_enum! {
    /// Fulfillment priority of an order.
    pub enum Priority {
        Low => "LOW",
        Normal => "NORMAL",
        High => "HIGH",
        Urgent => "URGENT",
    }
}

text_enum! {
    /// Order lifecycle status.
    ///
    /// `PENDING → PICKING → PICKED → PACKING → PACKED → SHIPPED`, with
    /// `CANCELLED` reachable from PENDING/PICKING and `BACKORDER` reachable
    /// from PICKING via exception resolution.
    pub enum OrderStatus {
        Pending => "PENDING",
        Picking => "PICKING",
        Picked => "PICKED",
        Packing => "PACKING",
        Packed => "PACKED",
        Shipped => "SHIPPED",
        Cancelled => "CANCELLED",
        Backorder => "BACKORDER",
    }
}

impl OrderStatus {
    /// Terminal statuses accept no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Shipped | OrderStatus::Cancelled | OrderStatus::Backorder
        )
    }
}

text_enum! {
    /// Post-pick status of an order line.
    pub enum OrderItemStatus {
        Pending => "PENDING",
        PartialPicked => "PARTIAL_PICKED",
        FullyPicked => "FULLY_PICKED",
    }
}

impl OrderItemStatus {
    /// Derive the line status from its quantities. A line only counts as
    /// fully picked when `picked >= quantity`.
    pub fn from_quantities(picked: i64, quantity: i64) -> Self {
        if picked >= quantity {
            OrderItemStatus::FullyPicked
        } else if picked > 0 {
            OrderItemStatus::PartialPicked
        } else {
            OrderItemStatus::Pending
        }
    }
}

text_enum! {
    /// Status of one atomic pick task.
    pub enum TaskStatus {
        Pending => "PENDING",
        InProgress => "IN_PROGRESS",
        Completed => "COMPLETED",
        Skipped => "SKIPPED",
    }
}

impl TaskStatus {
    /// Pending or in progress: work remains on the task.
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

text_enum! {
    /// Kind of an inventory ledger entry.
    pub enum TransactionType {
        Reservation => "RESERVATION",
        Deduction => "DEDUCTION",
        Cancellation => "CANCELLATION",
        Adjustment => "ADJUSTMENT",
        Receipt => "RECEIPT",
    }
}

text_enum! {
    pub enum ExceptionType {
        ShortPick => "SHORT_PICK",
        ShortPickBackorder => "SHORT_PICK_BACKORDER",
        Damage => "DAMAGE",
        Defective => "DEFECTIVE",
        WrongItem => "WRONG_ITEM",
        OutOfStock => "OUT_OF_STOCK",
        BarcodeMismatch => "BARCODE_MISMATCH",
        QuantityMismatch => "QUANTITY_MISMATCH",
        Other => "OTHER",
    }
}

text_enum! {
    /// `OPEN → REVIEWING → {APPROVED|REJECTED} → RESOLVED`, or `OPEN → CANCELLED`.
    pub enum ExceptionStatus {
        Open => "OPEN",
        Reviewing => "REVIEWING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
        Resolved => "RESOLVED",
        Cancelled => "CANCELLED",
    }
}

impl ExceptionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExceptionStatus::Resolved | ExceptionStatus::Cancelled)
    }

    /// Any non-terminal exception blocks PICKING → PICKED.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }
}

text_enum! {
    /// Supervisor decision applied when an exception is resolved.
    pub enum Resolution {
        Backorder => "BACKORDER",
        Substitute => "SUBSTITUTE",
        CancelItem => "CANCEL_ITEM",
        CancelOrder => "CANCEL_ORDER",
        AdjustQuantity => "ADJUST_QUANTITY",
        ReturnToStock => "RETURN_TO_STOCK",
        WriteOff => "WRITE_OFF",
        TransferBin => "TRANSFER_BIN",
        ManualOverride => "MANUAL_OVERRIDE",
    }
}

text_enum! {
    pub enum UserRole {
        Picker => "PICKER",
        Packer => "PACKER",
        Supervisor => "SUPERVISOR",
        Admin => "ADMIN",
    }
}

/// Which phase of the order the caller is looking at an item from.
///
/// The pick phase and the post-pick phase use unrelated status vocabularies;
/// the caller states which one it wants instead of it being inferred from the
/// order's current status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemContext {
    Picking,
    PostPick,
}

/// Item status as seen from one [`ItemContext`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "phase", content = "status", rename_all = "snake_case")]
pub enum ItemStatusView {
    Picking(TaskStatus),
    PostPick(OrderItemStatus),
}
