//! wms-fulfillment
//!
//! Order fulfillment rules on a loaded order aggregate:
//! - lifecycle transitions and their guards
//! - progress recompute (`round(100 * fully picked items / items)`)
//! - task allocation against a stock snapshot, all-or-nothing per item
//! - claim / unclaim, pick, skip, complete, cancel, pack, ship
//! - exception logging, review and the resolution mapping
//!
//! Operations mutate the aggregate in place and return [`Effects`]: the
//! ledger operations and audit rows the caller must persist in the same
//! transaction. A failing operation returns before touching the aggregate's
//! persisted fields, so the caller can simply drop it.
//!
//! Deterministic, pure logic. No IO. Callers pass the clock in.

mod aggregate;
mod allocator;
mod exceptions;
mod policy;
mod progress;
mod state_machine;

pub use aggregate::{Effects, OrderAggregate};
pub use allocator::{
    plan_item, stock_snapshot, split_tasks, BinAllocation, ItemAllocation, StockSnapshot,
};
pub use exceptions::{ExceptionReport, ResolutionRequest};
pub use policy::{AllocationPolicy, ShortPickTolerance, SplitMode};
pub use progress::compute_progress;
pub use state_machine::{can_transition, check_transition, TRANSITIONS};
