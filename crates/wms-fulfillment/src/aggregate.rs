use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wms_ledger::LedgerOp;
use wms_schemas::{
    ExceptionStatus, ExceptionType, NewOrder, Order, OrderException, OrderItem, OrderItemStatus,
    OrderStateChange, OrderStatus, PickTask, TaskStatus, WmsError,
};

use crate::allocator::{plan_item, split_tasks, ItemAllocation, StockSnapshot};
use crate::exceptions::new_exception;
use crate::policy::AllocationPolicy;
use crate::progress::compute_progress;
use crate::state_machine::check_transition;

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Side effects an operation asks the caller to persist alongside the
/// mutated aggregate, in the same transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Effects {
    /// Applied in order; any failure aborts the whole operation.
    pub ledger: Vec<LedgerOp>,
    pub state_changes: Vec<OrderStateChange>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty() && self.state_changes.is_empty()
    }

    fn transition(change: OrderStateChange) -> Self {
        Self {
            ledger: Vec::new(),
            state_changes: vec![change],
        }
    }
}

// ---------------------------------------------------------------------------
// OrderAggregate
// ---------------------------------------------------------------------------

/// An order with everything its rules read: lines, pick tasks, exceptions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAggregate {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub tasks: Vec<PickTask>,
    pub exceptions: Vec<OrderException>,
}

impl OrderAggregate {
    pub fn new(
        order: Order,
        items: Vec<OrderItem>,
        tasks: Vec<PickTask>,
        exceptions: Vec<OrderException>,
    ) -> Self {
        Self {
            order,
            items,
            tasks,
            exceptions,
        }
    }

    /// Build a PENDING order from an intake payload.
    pub fn intake(new: &NewOrder, at: DateTime<Utc>) -> Result<Self, WmsError> {
        require_text(&new.order_number, "order_number")?;
        require_text(&new.customer_id, "customer_id")?;
        if new.items.is_empty() {
            return Err(WmsError::validation("order must have at least one item"));
        }
        for (i, it) in new.items.iter().enumerate() {
            require_text(&it.sku, "sku")?;
            require_text(&it.bin_location, "bin_location")?;
            if it.quantity <= 0 {
                return Err(WmsError::validation(format!(
                    "item {} quantity must be > 0, got {}",
                    i + 1,
                    it.quantity
                )));
            }
        }

        let order = Order::new_pending(
            Uuid::now_v7(),
            new.order_number.trim(),
            new.customer_id.trim(),
            new.customer_name.trim(),
            new.priority,
            at,
        );
        let items = new
            .items
            .iter()
            .enumerate()
            .map(|(i, it)| OrderItem {
                id: Uuid::now_v7(),
                order_id: order.id,
                line_no: i as i32 + 1,
                sku: it.sku.trim().to_string(),
                bin_location: it.bin_location.trim().to_string(),
                quantity: it.quantity,
                picked_quantity: 0,
                verified_quantity: 0,
                status: OrderItemStatus::Pending,
            })
            .collect();

        Ok(Self::new(order, items, Vec::new(), Vec::new()))
    }

    // -----------------------------------------------------------------------
    // Claim protocol
    // -----------------------------------------------------------------------

    /// PENDING with no picker → PICKING owned by `picker_id`.
    ///
    /// The persisted form of this check is a single conditional update; this
    /// method is the rule it encodes.
    pub fn claim(&mut self, picker_id: &str, at: DateTime<Utc>) -> Result<Effects, WmsError> {
        require_text(picker_id, "picker_id")?;
        self.atomically(|agg| {
            if agg.order.status != OrderStatus::Pending || agg.order.picker_id.is_some() {
                return Err(WmsError::conflict(format!(
                    "order {} is not claimable (status {}, picker {:?})",
                    agg.order.id, agg.order.status, agg.order.picker_id
                )));
            }
            let change = agg.transition(OrderStatus::Picking, picker_id, None, at)?;
            agg.order.picker_id = Some(picker_id.to_string());
            agg.order.claimed_at = Some(at);
            agg.order.last_activity_at = Some(at);
            Ok(Effects::transition(change))
        })
    }

    /// PICKING → PENDING. The picker is cleared and every in-flight task goes
    /// back to PENDING with no picker. Reservations stay with the order.
    pub fn unclaim(
        &mut self,
        actor: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Effects, WmsError> {
        require_text(reason, "reason")?;
        self.atomically(|agg| {
            agg.require_status(OrderStatus::Picking, "unclaim")?;
            let change = agg.transition(OrderStatus::Pending, actor, Some(reason), at)?;
            agg.order.picker_id = None;
            agg.order.claimed_at = None;
            agg.order.last_activity_at = Some(at);
            for t in agg.tasks.iter_mut().filter(|t| t.status.is_open()) {
                t.status = TaskStatus::Pending;
                t.picker_id = None;
                t.started_at = None;
            }
            Ok(Effects::transition(change))
        })
    }

    // -----------------------------------------------------------------------
    // Allocation
    // -----------------------------------------------------------------------

    /// Reserve stock and emit pick tasks for every line.
    ///
    /// A no-op once tasks have been generated for this order. A line whose
    /// quantity cannot be covered gets an OUT_OF_STOCK exception and no task;
    /// no task is ever emitted for unreserved stock.
    pub fn generate_tasks(
        &mut self,
        stock: &StockSnapshot,
        policy: &AllocationPolicy,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Effects, WmsError> {
        if self.order.tasks_generated_at.is_some() {
            return Ok(Effects::default());
        }
        self.atomically(|agg| {
            if !matches!(agg.order.status, OrderStatus::Pending | OrderStatus::Picking) {
                return Err(WmsError::conflict(format!(
                    "cannot generate tasks for order in status {}",
                    agg.order.status
                )));
            }

            let mut working = stock.clone();
            let mut ledger = Vec::new();
            let mut new_tasks = Vec::new();
            let mut new_exceptions = Vec::new();

            for item in &agg.items {
                match plan_item(&item.sku, &item.bin_location, item.quantity, &working, policy) {
                    ItemAllocation::Allocated(portions) => {
                        for p in portions {
                            let op = LedgerOp::reserve(&item.sku, &p.bin_location, p.qty);
                            let key = (item.sku.clone(), p.bin_location.clone());
                            let bal = working.entry(key).or_default();
                            op.apply(bal)
                                .map_err(|e| e.into_wms(&item.sku, &p.bin_location))?;
                            ledger.push(op);
                            for qty in split_tasks(p.qty, policy.split_mode) {
                                new_tasks.push(new_task(item, &p.bin_location, qty));
                            }
                        }
                    }
                    ItemAllocation::Short {
                        requested,
                        available,
                    } => {
                        new_exceptions.push(new_exception(
                            item,
                            &item.bin_location,
                            ExceptionType::OutOfStock,
                            requested,
                            available,
                            actor,
                            Some("insufficient available stock at allocation".to_string()),
                            at,
                        ));
                    }
                }
            }

            new_tasks.sort_by(|a, b| {
                a.bin_location
                    .cmp(&b.bin_location)
                    .then(a.sku.cmp(&b.sku))
            });
            let base = agg.tasks.iter().map(|t| t.sequence).max().unwrap_or(0);
            for (i, t) in new_tasks.iter_mut().enumerate() {
                t.sequence = base + i as i32 + 1;
            }

            agg.tasks.extend(new_tasks);
            agg.exceptions.extend(new_exceptions);
            agg.order.tasks_generated_at = Some(at);
            Ok(Effects {
                ledger,
                state_changes: Vec::new(),
            })
        })
    }

    // -----------------------------------------------------------------------
    // Picking
    // -----------------------------------------------------------------------

    /// Record `qty` units picked against one task. Deducts the reserved stock
    /// and recomputes progress.
    pub fn record_pick(
        &mut self,
        task_id: Uuid,
        picker_id: &str,
        sku: &str,
        bin_location: &str,
        qty: i64,
        at: DateTime<Utc>,
    ) -> Result<Effects, WmsError> {
        if qty <= 0 {
            return Err(WmsError::validation(format!(
                "pick quantity must be > 0, got {qty}"
            )));
        }
        require_text(picker_id, "picker_id")?;
        self.atomically(|agg| {
            agg.require_status(OrderStatus::Picking, "pick")?;
            agg.require_picker(picker_id)?;
            let ti = agg.task_index(task_id)?;

            let (item_id, remaining, reserved) = {
                let t = &agg.tasks[ti];
                if t.sku != sku {
                    return Err(WmsError::validation(format!(
                        "scanned sku {sku} does not match task sku {}",
                        t.sku
                    )));
                }
                if t.bin_location != bin_location {
                    return Err(WmsError::validation(format!(
                        "scanned bin {bin_location} does not match task bin {}",
                        t.bin_location
                    )));
                }
                if !t.status.is_open() {
                    return Err(WmsError::conflict(format!(
                        "pick task {task_id} is {}",
                        t.status
                    )));
                }
                (t.order_item_id, t.remaining(), t.reserved_quantity)
            };
            if qty > remaining {
                return Err(WmsError::validation(format!(
                    "pick of {qty} exceeds remaining {remaining} on task {task_id}"
                )));
            }
            if qty > reserved {
                return Err(WmsError::fatal(format!(
                    "task {task_id} holds {reserved} reserved units, cannot deduct {qty}"
                )));
            }
            let ii = agg.item_index(item_id)?;

            {
                let t = &mut agg.tasks[ti];
                t.picked_quantity += qty;
                t.reserved_quantity -= qty;
                t.picker_id = Some(picker_id.to_string());
                t.started_at.get_or_insert(at);
                if t.remaining() == 0 {
                    t.status = TaskStatus::Completed;
                    t.completed_at = Some(at);
                } else {
                    t.status = TaskStatus::InProgress;
                }
            }
            {
                let it = &mut agg.items[ii];
                it.picked_quantity += qty;
                if it.picked_quantity > it.quantity {
                    return Err(WmsError::fatal(format!(
                        "item {} picked {} exceeds ordered {}",
                        it.id, it.picked_quantity, it.quantity
                    )));
                }
            }
            agg.recompute_progress();
            agg.order.last_activity_at = Some(at);

            Ok(Effects {
                ledger: vec![LedgerOp::deduct(sku, bin_location, qty)],
                state_changes: Vec::new(),
            })
        })
    }

    /// Mark a task SKIPPED. Its picked quantity always ends at 0: units
    /// already picked from it are returned to the bin and re-reserved, so the
    /// task again holds its full quantity in reserve until a resolution.
    pub fn skip_task(
        &mut self,
        task_id: Uuid,
        actor: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Effects, WmsError> {
        require_text(reason, "reason")?;
        self.atomically(|agg| {
            agg.require_status(OrderStatus::Picking, "skip task")?;
            let ti = agg.task_index(task_id)?;
            let (item_id, prior, sku, bin) = {
                let t = &agg.tasks[ti];
                if !t.status.is_open() {
                    return Err(WmsError::conflict(format!(
                        "pick task {task_id} is {}",
                        t.status
                    )));
                }
                (
                    t.order_item_id,
                    t.picked_quantity,
                    t.sku.clone(),
                    t.bin_location.clone(),
                )
            };
            let ii = agg.item_index(item_id)?;

            let mut ledger = Vec::new();
            if prior > 0 {
                ledger.push(LedgerOp::adjust(
                    &sku,
                    &bin,
                    prior,
                    format!("skip of task {task_id}: picked units returned to bin"),
                ));
                ledger.push(LedgerOp::reserve(&sku, &bin, prior));
                agg.items[ii].picked_quantity -= prior;
            }

            {
                let t = &mut agg.tasks[ti];
                t.picked_quantity = 0;
                t.reserved_quantity += prior;
                t.status = TaskStatus::Skipped;
                t.skipped_at = Some(at);
                t.completed_at = None;
                t.skip_reason = Some(reason.trim().to_string());
                t.picker_id.get_or_insert_with(|| actor.to_string());
            }
            agg.recompute_progress();
            agg.order.last_activity_at = Some(at);

            Ok(Effects {
                ledger,
                state_changes: Vec::new(),
            })
        })
    }

    /// PICKING → PICKED.
    ///
    /// Guard: every task is COMPLETED, or SKIPPED on an item that has a
    /// RESOLVED exception; and no exception is still open. Reservations held
    /// by tasks that will never be picked are released.
    pub fn complete_picking(
        &mut self,
        picker_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Effects, WmsError> {
        self.atomically(|agg| {
            agg.require_status(OrderStatus::Picking, "complete picking")?;
            agg.require_picker(picker_id)?;

            let open = agg.exceptions.iter().filter(|e| e.status.is_open()).count();
            if open > 0 {
                return Err(WmsError::conflict(format!(
                    "order {} has {open} open exception(s)",
                    agg.order.id
                )));
            }
            let unresolved = agg
                .tasks
                .iter()
                .filter(|t| match t.status {
                    TaskStatus::Completed => false,
                    TaskStatus::Skipped => !agg.item_has_resolved_exception(t.order_item_id),
                    TaskStatus::Pending | TaskStatus::InProgress => true,
                })
                .count();
            if unresolved > 0 {
                return Err(WmsError::conflict(format!(
                    "order {} has {unresolved} pick task(s) not completed or resolved",
                    agg.order.id
                )));
            }

            let ledger = agg.release_outstanding();
            let change = agg.transition(OrderStatus::Picked, picker_id, None, at)?;
            agg.order.last_activity_at = Some(at);
            Ok(Effects {
                ledger,
                state_changes: vec![change],
            })
        })
    }

    /// PENDING/PICKING → CANCELLED. Every outstanding reservation is released
    /// and open exceptions are closed.
    pub fn cancel(
        &mut self,
        actor: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Effects, WmsError> {
        require_text(actor, "user_id")?;
        require_text(reason, "reason")?;
        self.atomically(|agg| agg.cancel_inner(actor, reason, at))
    }

    pub(crate) fn cancel_inner(
        &mut self,
        actor: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Effects, WmsError> {
        let change = self.transition(OrderStatus::Cancelled, actor, Some(reason), at)?;
        self.order.cancel_reason = Some(reason.trim().to_string());
        self.order.last_activity_at = Some(at);
        let ledger = self.release_outstanding();
        self.close_open_exceptions(actor, at);
        Ok(Effects {
            ledger,
            state_changes: vec![change],
        })
    }

    // -----------------------------------------------------------------------
    // Packing and shipping
    // -----------------------------------------------------------------------

    /// PICKED with no packer → PACKING owned by `packer_id`.
    pub fn claim_packing(
        &mut self,
        packer_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Effects, WmsError> {
        require_text(packer_id, "packer_id")?;
        self.atomically(|agg| {
            if agg.order.status != OrderStatus::Picked || agg.order.packer_id.is_some() {
                return Err(WmsError::conflict(format!(
                    "order {} is not available for packing (status {}, packer {:?})",
                    agg.order.id, agg.order.status, agg.order.packer_id
                )));
            }
            let change = agg.transition(OrderStatus::Packing, packer_id, None, at)?;
            agg.order.packer_id = Some(packer_id.to_string());
            agg.order.last_activity_at = Some(at);
            Ok(Effects::transition(change))
        })
    }

    /// Count `qty` more units of one line as verified at the packing bench.
    pub fn verify_item(
        &mut self,
        item_id: Uuid,
        packer_id: &str,
        qty: i64,
        at: DateTime<Utc>,
    ) -> Result<Effects, WmsError> {
        if qty <= 0 {
            return Err(WmsError::validation(format!(
                "verify quantity must be > 0, got {qty}"
            )));
        }
        self.atomically(|agg| {
            agg.require_status(OrderStatus::Packing, "verify item")?;
            agg.require_packer(packer_id)?;
            let ii = agg.item_index(item_id)?;
            let it = &mut agg.items[ii];
            if it.verified_quantity + qty > it.picked_quantity {
                return Err(WmsError::validation(format!(
                    "verifying {qty} more of item {item_id} exceeds picked {} (verified {})",
                    it.picked_quantity, it.verified_quantity
                )));
            }
            it.verified_quantity += qty;
            agg.order.last_activity_at = Some(at);
            Ok(Effects::default())
        })
    }

    /// PACKING → PACKED once every picked line is fully verified.
    pub fn complete_packing(
        &mut self,
        packer_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Effects, WmsError> {
        self.atomically(|agg| {
            agg.require_status(OrderStatus::Packing, "complete packing")?;
            agg.require_packer(packer_id)?;
            let unverified = agg
                .items
                .iter()
                .filter(|i| i.picked_quantity > 0 && i.verified_quantity != i.picked_quantity)
                .count();
            if unverified > 0 {
                return Err(WmsError::conflict(format!(
                    "order {} has {unverified} item(s) not fully verified",
                    agg.order.id
                )));
            }
            let change = agg.transition(OrderStatus::Packed, packer_id, None, at)?;
            agg.order.last_activity_at = Some(at);
            Ok(Effects::transition(change))
        })
    }

    /// PACKED → SHIPPED.
    pub fn ship(
        &mut self,
        actor: &str,
        tracking_number: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Effects, WmsError> {
        require_text(actor, "actor")?;
        self.atomically(|agg| {
            let change = agg.transition(OrderStatus::Shipped, actor, None, at)?;
            agg.order.tracking_number = tracking_number.map(|t| t.trim().to_string());
            agg.order.last_activity_at = Some(at);
            Ok(Effects::transition(change))
        })
    }

    // -----------------------------------------------------------------------
    // Derived state
    // -----------------------------------------------------------------------

    /// Re-derive line statuses and `progress` from item quantities.
    ///
    /// Reads items only and writes only derived fields, so it never feeds
    /// back into another item mutation.
    pub fn recompute_progress(&mut self) {
        for it in &mut self.items {
            it.refresh_status();
        }
        self.order.progress = compute_progress(&self.items);
    }

    /// Units still reserved by this order's tasks, per (sku, bin).
    pub fn outstanding_reservations(&self) -> BTreeMap<(String, String), i64> {
        let mut out = BTreeMap::new();
        for t in self.tasks.iter().filter(|t| t.reserved_quantity > 0) {
            *out.entry((t.sku.clone(), t.bin_location.clone()))
                .or_insert(0) += t.reserved_quantity;
        }
        out
    }

    pub fn open_exception_count(&self) -> usize {
        self.exceptions.iter().filter(|e| e.status.is_open()).count()
    }

    // -----------------------------------------------------------------------
    // Internals shared with the exception workflow
    // -----------------------------------------------------------------------

    /// Run `f` against a scratch copy and keep the result only on success.
    pub(crate) fn atomically<F>(&mut self, f: F) -> Result<Effects, WmsError>
    where
        F: FnOnce(&mut Self) -> Result<Effects, WmsError>,
    {
        let mut scratch = self.clone();
        let effects = f(&mut scratch)?;
        *self = scratch;
        Ok(effects)
    }

    pub(crate) fn transition(
        &mut self,
        to: OrderStatus,
        actor: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<OrderStateChange, WmsError> {
        let from = self.order.status;
        check_transition(from, to)?;
        self.order.status = to;
        match to {
            OrderStatus::Pending => {}
            OrderStatus::Picking => self.order.claimed_at = Some(at),
            OrderStatus::Picked => self.order.picked_at = Some(at),
            OrderStatus::Packing => self.order.packing_started_at = Some(at),
            OrderStatus::Packed => self.order.packed_at = Some(at),
            OrderStatus::Shipped => self.order.shipped_at = Some(at),
            OrderStatus::Cancelled => self.order.cancelled_at = Some(at),
            OrderStatus::Backorder => self.order.backordered_at = Some(at),
        }
        Ok(OrderStateChange {
            id: Uuid::now_v7(),
            order_id: self.order.id,
            from_status: from,
            to_status: to,
            actor: actor.to_string(),
            reason: reason.map(|r| r.trim().to_string()),
            changed_at: at,
        })
    }

    pub(crate) fn require_status(&self, status: OrderStatus, op: &str) -> Result<(), WmsError> {
        if self.order.status != status {
            return Err(WmsError::conflict(format!(
                "{op} requires order status {status}, order {} is {}",
                self.order.id, self.order.status
            )));
        }
        Ok(())
    }

    fn require_picker(&self, picker_id: &str) -> Result<(), WmsError> {
        if self.order.picker_id.as_deref() != Some(picker_id) {
            return Err(WmsError::conflict(format!(
                "order {} is claimed by {:?}, not {picker_id}",
                self.order.id, self.order.picker_id
            )));
        }
        Ok(())
    }

    fn require_packer(&self, packer_id: &str) -> Result<(), WmsError> {
        if self.order.packer_id.as_deref() != Some(packer_id) {
            return Err(WmsError::conflict(format!(
                "order {} is being packed by {:?}, not {packer_id}",
                self.order.id, self.order.packer_id
            )));
        }
        Ok(())
    }

    pub(crate) fn task_index(&self, id: Uuid) -> Result<usize, WmsError> {
        self.tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| WmsError::not_found("pick_task", id))
    }

    pub(crate) fn item_index(&self, id: Uuid) -> Result<usize, WmsError> {
        self.items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| WmsError::not_found("order_item", id))
    }

    pub(crate) fn item_has_resolved_exception(&self, item_id: Uuid) -> bool {
        self.exceptions
            .iter()
            .any(|e| e.order_item_id == item_id && e.status == ExceptionStatus::Resolved)
    }

    /// Zero every task's reservation and return the matching releases.
    pub(crate) fn release_outstanding(&mut self) -> Vec<LedgerOp> {
        let ops = self
            .outstanding_reservations()
            .into_iter()
            .map(|((sku, bin), qty)| LedgerOp::release(sku, bin, qty))
            .collect();
        for t in &mut self.tasks {
            t.reserved_quantity = 0;
        }
        ops
    }

    pub(crate) fn close_open_exceptions(&mut self, actor: &str, at: DateTime<Utc>) {
        for e in self.exceptions.iter_mut().filter(|e| e.status.is_open()) {
            e.status = ExceptionStatus::Cancelled;
            e.resolved_by = Some(actor.to_string());
            e.resolved_at = Some(at);
        }
    }
}

pub(crate) fn new_task(item: &OrderItem, bin_location: &str, qty: i64) -> PickTask {
    PickTask {
        id: Uuid::now_v7(),
        order_id: item.order_id,
        order_item_id: item.id,
        sequence: 0,
        sku: item.sku.clone(),
        bin_location: bin_location.to_string(),
        quantity: qty,
        picked_quantity: 0,
        reserved_quantity: qty,
        status: TaskStatus::Pending,
        picker_id: None,
        started_at: None,
        completed_at: None,
        skipped_at: None,
        skip_reason: None,
    }
}

pub(crate) fn require_text(value: &str, field: &str) -> Result<(), WmsError> {
    if value.trim().is_empty() {
        return Err(WmsError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}
