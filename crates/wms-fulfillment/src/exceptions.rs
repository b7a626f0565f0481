use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wms_ledger::LedgerOp;
use wms_schemas::{
    ExceptionStatus, ExceptionType, OrderException, OrderItem, OrderItemStatus, OrderStatus,
    Resolution, TaskStatus, WmsError,
};

use crate::aggregate::{new_task, require_text, Effects, OrderAggregate};
use crate::policy::ShortPickTolerance;

/// A picker's report of a problem on one line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionReport {
    pub order_item_id: Uuid,
    pub exception_type: ExceptionType,
    pub expected_quantity: i64,
    pub actual_quantity: i64,
    pub reported_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A supervisor's chosen resolution for one exception.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub resolution: Resolution,
    /// Required for SUBSTITUTE.
    #[serde(default)]
    pub substitute_sku: Option<String>,
    /// Required for TRANSFER_BIN and SUBSTITUTE.
    #[serde(default)]
    pub target_bin: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ResolutionRequest {
    pub fn of(resolution: Resolution) -> Self {
        Self {
            resolution,
            substitute_sku: None,
            target_bin: None,
            notes: None,
        }
    }

    fn validate(&self) -> Result<(), WmsError> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        match self.resolution {
            Resolution::Substitute => {
                if !present(&self.substitute_sku) {
                    return Err(WmsError::validation("SUBSTITUTE requires substitute_sku"));
                }
                if !present(&self.target_bin) {
                    return Err(WmsError::validation("SUBSTITUTE requires target_bin"));
                }
            }
            Resolution::TransferBin => {
                if !present(&self.target_bin) {
                    return Err(WmsError::validation("TRANSFER_BIN requires target_bin"));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn new_exception(
    item: &OrderItem,
    bin_location: &str,
    exception_type: ExceptionType,
    expected: i64,
    actual: i64,
    reported_by: &str,
    notes: Option<String>,
    at: DateTime<Utc>,
) -> OrderException {
    OrderException {
        id: Uuid::now_v7(),
        order_id: item.order_id,
        order_item_id: item.id,
        sku: item.sku.clone(),
        bin_location: bin_location.to_string(),
        exception_type,
        status: ExceptionStatus::Open,
        expected_quantity: expected,
        actual_quantity: actual,
        quantity_short: expected - actual,
        reported_by: reported_by.to_string(),
        reported_at: at,
        notes,
        reviewed_by: None,
        reviewed_at: None,
        resolution: None,
        resolution_notes: None,
        resolved_by: None,
        resolved_at: None,
    }
}

impl OrderAggregate {
    /// Record an exception against one line of a PICKING order.
    ///
    /// A SHORT_PICK whose shortfall exceeds `tolerance` is stored as
    /// SHORT_PICK_BACKORDER. The exception starts OPEN and blocks completion
    /// until it is resolved or cancelled.
    pub fn log_exception(
        &mut self,
        report: &ExceptionReport,
        tolerance: &ShortPickTolerance,
        at: DateTime<Utc>,
    ) -> Result<OrderException, WmsError> {
        require_text(&report.reported_by, "reported_by")?;
        if report.actual_quantity < 0 || report.expected_quantity < report.actual_quantity {
            return Err(WmsError::validation(format!(
                "expected {} / actual {} must satisfy expected >= actual >= 0",
                report.expected_quantity, report.actual_quantity
            )));
        }
        self.require_status(OrderStatus::Picking, "log exception")?;
        let ii = self.item_index(report.order_item_id)?;
        let item = &self.items[ii];

        let short = report.expected_quantity - report.actual_quantity;
        let exception_type = match report.exception_type {
            ExceptionType::ShortPick if tolerance.exceeded(report.expected_quantity, short) => {
                ExceptionType::ShortPickBackorder
            }
            other => other,
        };
        let bin = self
            .tasks
            .iter()
            .filter(|t| t.order_item_id == item.id && t.status != TaskStatus::Completed)
            .min_by_key(|t| t.sequence)
            .map(|t| t.bin_location.clone())
            .unwrap_or_else(|| item.bin_location.clone());

        let ex = new_exception(
            item,
            &bin,
            exception_type,
            report.expected_quantity,
            report.actual_quantity,
            report.reported_by.trim(),
            report.notes.clone(),
            at,
        );
        self.exceptions.push(ex.clone());
        self.order.last_activity_at = Some(at);
        Ok(ex)
    }

    /// OPEN → REVIEWING.
    pub fn start_review(
        &mut self,
        exception_id: Uuid,
        reviewer: &str,
        at: DateTime<Utc>,
    ) -> Result<(), WmsError> {
        require_text(reviewer, "reviewer")?;
        let ex = self.exception_mut(exception_id)?;
        expect_exception_status(ex, &[ExceptionStatus::Open], "start review")?;
        ex.status = ExceptionStatus::Reviewing;
        ex.reviewed_by = Some(reviewer.to_string());
        ex.reviewed_at = Some(at);
        Ok(())
    }

    /// OPEN/REVIEWING → APPROVED.
    pub fn approve_exception(
        &mut self,
        exception_id: Uuid,
        reviewer: &str,
        at: DateTime<Utc>,
    ) -> Result<(), WmsError> {
        self.review_decision(exception_id, reviewer, ExceptionStatus::Approved, "approve", None, at)
    }

    /// OPEN/REVIEWING → REJECTED. The exception still needs a resolution.
    pub fn reject_exception(
        &mut self,
        exception_id: Uuid,
        reviewer: &str,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), WmsError> {
        self.review_decision(exception_id, reviewer, ExceptionStatus::Rejected, "reject", notes, at)
    }

    /// Withdraw an exception that was logged in error.
    pub fn cancel_exception(
        &mut self,
        exception_id: Uuid,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<(), WmsError> {
        require_text(actor, "actor")?;
        let ex = self.exception_mut(exception_id)?;
        if ex.status.is_terminal() {
            return Err(WmsError::conflict(format!(
                "exception {exception_id} is already {}",
                ex.status
            )));
        }
        ex.status = ExceptionStatus::Cancelled;
        ex.resolved_by = Some(actor.to_string());
        ex.resolved_at = Some(at);
        Ok(())
    }

    fn review_decision(
        &mut self,
        exception_id: Uuid,
        reviewer: &str,
        to: ExceptionStatus,
        op: &str,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), WmsError> {
        require_text(reviewer, "reviewer")?;
        let ex = self.exception_mut(exception_id)?;
        expect_exception_status(
            ex,
            &[ExceptionStatus::Open, ExceptionStatus::Reviewing],
            op,
        )?;
        ex.status = to;
        ex.reviewed_by = Some(reviewer.to_string());
        ex.reviewed_at = Some(at);
        if let Some(n) = notes {
            ex.resolution_notes = Some(n.to_string());
        }
        Ok(())
    }

    /// Apply a supervisor's resolution to a non-terminal exception.
    ///
    /// Every [`Resolution`] maps to exactly one set of order, item, task and
    /// ledger effects:
    ///
    /// | resolution        | effect                                                    |
    /// |-------------------|-----------------------------------------------------------|
    /// | `BACKORDER`       | release all reservations, order → BACKORDER               |
    /// | `CANCEL_ORDER`    | release all reservations, order → CANCELLED               |
    /// | `CANCEL_ITEM`     | item quantity := picked, release the item's reservations  |
    /// | `ADJUST_QUANTITY` | item quantity −= short, release the dropped reservation   |
    /// | `RETURN_TO_STOCK` | as ADJUST_QUANTITY, plus on-hand += removed, per bin      |
    /// | `WRITE_OFF`       | as ADJUST_QUANTITY, plus on-hand −= removed, per bin      |
    /// | `SUBSTITUTE`      | as ADJUST_QUANTITY, plus a new line for the substitute    |
    /// | `TRANSFER_BIN`    | move `short` units of the line's tasks to another bin     |
    /// | `MANUAL_OVERRIDE` | no stock or line change                                   |
    ///
    /// Units are removed from the bin the exception was reported at before
    /// any other bin, so stock adjustments land where the reservation was.
    pub fn resolve_exception(
        &mut self,
        exception_id: Uuid,
        request: &ResolutionRequest,
        resolved_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Effects, WmsError> {
        require_text(resolved_by, "resolved_by")?;
        request.validate()?;
        self.atomically(|agg| {
            let ei = agg.exception_index(exception_id)?;
            let ex = agg.exceptions[ei].clone();
            if ex.status.is_terminal() {
                return Err(WmsError::conflict(format!(
                    "exception {exception_id} is already {}",
                    ex.status
                )));
            }
            agg.require_status(OrderStatus::Picking, "resolve exception")?;

            {
                let e = &mut agg.exceptions[ei];
                e.status = ExceptionStatus::Resolved;
                e.resolution = Some(request.resolution);
                e.resolution_notes = request.notes.clone().or(e.resolution_notes.take());
                e.resolved_by = Some(resolved_by.to_string());
                e.resolved_at = Some(at);
            }

            let reason = format!("exception {exception_id} resolved with {}", request.resolution);
            let short = ex.quantity_short;
            let mut effects = Effects::default();

            match request.resolution {
                Resolution::Backorder => {
                    effects.ledger = agg.release_outstanding();
                    effects.state_changes.push(agg.transition(
                        OrderStatus::Backorder,
                        resolved_by,
                        Some(&reason),
                        at,
                    )?);
                    agg.close_open_exceptions(resolved_by, at);
                }
                Resolution::CancelOrder => {
                    effects = agg.cancel_inner(resolved_by, &reason, at)?;
                }
                Resolution::CancelItem => {
                    let cut = agg.shrink_item(ex.order_item_id, i64::MAX, &ex.bin_location, at)?;
                    effects.ledger = cut.releases;
                }
                Resolution::AdjustQuantity => {
                    let cut = agg.shrink_item(ex.order_item_id, short, &ex.bin_location, at)?;
                    effects.ledger = cut.releases;
                    effects.ledger.extend(agg.reopen_item(ex.order_item_id)?);
                }
                Resolution::ReturnToStock => {
                    let cut = agg.shrink_item(ex.order_item_id, short, &ex.bin_location, at)?;
                    effects.ledger = cut.releases;
                    for (bin, n) in &cut.taken {
                        effects.ledger.push(LedgerOp::adjust(&ex.sku, bin, *n, &reason));
                    }
                    effects.ledger.extend(agg.reopen_item(ex.order_item_id)?);
                }
                Resolution::WriteOff => {
                    let cut = agg.shrink_item(ex.order_item_id, short, &ex.bin_location, at)?;
                    effects.ledger = cut.releases;
                    for (bin, n) in &cut.taken {
                        effects.ledger.push(LedgerOp::adjust(&ex.sku, bin, -n, &reason));
                    }
                    effects.ledger.extend(agg.reopen_item(ex.order_item_id)?);
                }
                Resolution::Substitute => {
                    let sku = required(&request.substitute_sku, "substitute_sku")?;
                    let bin = required(&request.target_bin, "target_bin")?;
                    let cut = agg.shrink_item(ex.order_item_id, short, &ex.bin_location, at)?;
                    effects.ledger = cut.releases;
                    effects.ledger.extend(agg.reopen_item(ex.order_item_id)?);
                    if cut.removed > 0 {
                        effects.ledger.push(agg.add_line(&sku, &bin, cut.removed));
                    }
                }
                Resolution::TransferBin => {
                    let bin = required(&request.target_bin, "target_bin")?;
                    let cut = agg.shrink_item(ex.order_item_id, short, &ex.bin_location, at)?;
                    effects.ledger = cut.releases;
                    if cut.removed > 0 {
                        let ii = agg.item_index(ex.order_item_id)?;
                        agg.items[ii].quantity += cut.removed;
                        effects.ledger.push(agg.add_task(ex.order_item_id, &bin, cut.removed)?);
                    }
                    effects.ledger.extend(agg.reopen_item(ex.order_item_id)?);
                }
                Resolution::ManualOverride => {}
            }

            agg.recompute_progress();
            agg.order.last_activity_at = Some(at);
            Ok(effects)
        })
    }

    pub(crate) fn exception_index(&self, id: Uuid) -> Result<usize, WmsError> {
        self.exceptions
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| WmsError::not_found("order_exception", id))
    }

    fn exception_mut(&mut self, id: Uuid) -> Result<&mut OrderException, WmsError> {
        let ei = self.exception_index(id)?;
        Ok(&mut self.exceptions[ei])
    }

    /// Remove up to `short` unpicked units from a line and its tasks.
    ///
    /// Tasks at `from_bin` give up units first, skipped before open; then the
    /// rest of the line, skipped first and from the back of the route.
    fn shrink_item(
        &mut self,
        item_id: Uuid,
        short: i64,
        from_bin: &str,
        at: DateTime<Utc>,
    ) -> Result<Shrink, WmsError> {
        let ii = self.item_index(item_id)?;
        let amount = short.min(self.items[ii].outstanding());
        if amount <= 0 {
            return Ok(Shrink::default());
        }

        let mut idx: Vec<usize> = (0..self.tasks.len())
            .filter(|&i| {
                let t = &self.tasks[i];
                t.order_item_id == item_id && t.status != TaskStatus::Completed
            })
            .collect();
        idx.sort_by_key(|&i| {
            let t = &self.tasks[i];
            (
                t.bin_location != from_bin,
                t.status != TaskStatus::Skipped,
                Reverse(t.sequence),
            )
        });

        let mut left = amount;
        let mut taken: BTreeMap<String, i64> = BTreeMap::new();
        let mut releases: BTreeMap<(String, String), i64> = BTreeMap::new();
        for i in idx {
            if left == 0 {
                break;
            }
            let t = &mut self.tasks[i];
            let take = left.min(t.remaining());
            if take == 0 {
                continue;
            }
            t.quantity -= take;
            *taken.entry(t.bin_location.clone()).or_insert(0) += take;
            let freed = take.min(t.reserved_quantity);
            t.reserved_quantity -= freed;
            if freed > 0 {
                *releases
                    .entry((t.sku.clone(), t.bin_location.clone()))
                    .or_insert(0) += freed;
            }
            if t.remaining() == 0 {
                if t.picked_quantity > 0 {
                    t.status = TaskStatus::Completed;
                    t.completed_at = Some(at);
                } else {
                    t.status = TaskStatus::Skipped;
                    t.skipped_at.get_or_insert(at);
                    t.skip_reason
                        .get_or_insert_with(|| "quantity removed by resolution".to_string());
                }
            }
            left -= take;
        }

        let item = &mut self.items[ii];
        item.quantity -= amount;
        item.refresh_status();

        Ok(Shrink {
            removed: amount,
            taken,
            releases: releases
                .into_iter()
                .map(|((sku, bin), qty)| LedgerOp::release(sku, bin, qty))
                .collect(),
        })
    }

    /// Put a line back into pickable shape after its quantity changed.
    ///
    /// Skipped tasks that still have units to pick go back to PENDING. If the
    /// line's open tasks cover less than what is outstanding (a line that was
    /// never allocated), a task for the gap is added at the line's bin.
    fn reopen_item(&mut self, item_id: Uuid) -> Result<Vec<LedgerOp>, WmsError> {
        for t in self
            .tasks
            .iter_mut()
            .filter(|t| t.order_item_id == item_id && t.status == TaskStatus::Skipped)
        {
            if t.remaining() > 0 {
                t.status = TaskStatus::Pending;
                t.skipped_at = None;
                t.skip_reason = None;
            }
        }

        let ii = self.item_index(item_id)?;
        let tasked: i64 = self
            .tasks
            .iter()
            .filter(|t| t.order_item_id == item_id && t.status.is_open())
            .map(|t| t.remaining())
            .sum();
        let gap = self.items[ii].outstanding() - tasked;
        if gap <= 0 {
            return Ok(Vec::new());
        }
        let bin = self.items[ii].bin_location.clone();
        Ok(vec![self.add_task(item_id, &bin, gap)?])
    }

    /// Append a reserved task for `qty` units of an existing line.
    fn add_task(&mut self, item_id: Uuid, bin_location: &str, qty: i64) -> Result<LedgerOp, WmsError> {
        let ii = self.item_index(item_id)?;
        let mut task = new_task(&self.items[ii], bin_location, qty);
        task.sequence = self.next_sequence();
        let op = LedgerOp::reserve(&task.sku, &task.bin_location, qty);
        self.tasks.push(task);
        Ok(op)
    }

    /// Append a new line with one reserved task.
    fn add_line(&mut self, sku: &str, bin_location: &str, qty: i64) -> LedgerOp {
        let line_no = self.items.iter().map(|i| i.line_no).max().unwrap_or(0) + 1;
        let item = OrderItem {
            id: Uuid::now_v7(),
            order_id: self.order.id,
            line_no,
            sku: sku.to_string(),
            bin_location: bin_location.to_string(),
            quantity: qty,
            picked_quantity: 0,
            verified_quantity: 0,
            status: OrderItemStatus::Pending,
        };
        let mut task = new_task(&item, bin_location, qty);
        task.sequence = self.next_sequence();
        self.items.push(item);
        self.tasks.push(task);
        LedgerOp::reserve(sku, bin_location, qty)
    }

    fn next_sequence(&self) -> i32 {
        self.tasks.iter().map(|t| t.sequence).max().unwrap_or(0) + 1
    }
}

/// Units cut from a line by `shrink_item`.
#[derive(Debug, Default)]
struct Shrink {
    removed: i64,
    /// Units removed per bin.
    taken: BTreeMap<String, i64>,
    releases: Vec<LedgerOp>,
}

fn expect_exception_status(
    ex: &OrderException,
    allowed: &[ExceptionStatus],
    op: &str,
) -> Result<(), WmsError> {
    if !allowed.contains(&ex.status) {
        return Err(WmsError::conflict(format!(
            "cannot {op} exception {} in status {}",
            ex.id, ex.status
        )));
    }
    Ok(())
}

fn required(value: &Option<String>, field: &str) -> Result<String, WmsError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| WmsError::validation(format!("{field} is required")))
}
