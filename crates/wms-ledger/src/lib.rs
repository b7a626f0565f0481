//! wms-ledger
//!
//! Inventory ledger rules for one (SKU, bin) balance:
//! - `reserve` needs `available >= qty`
//! - `deduct` consumes reserved stock (on-hand and reserved both drop)
//! - `release` returns reserved stock to availability
//! - `adjust` / `receive` correct on-hand, never below what is reserved
//!
//! Every change is described by a [`LedgerOp`] and recorded as an
//! append-only `InventoryTransaction`. [`reconcile`] replays the log and
//! reports drift against the live balances.
//!
//! Deterministic, pure logic. No IO. Persistence lives in `wms-db`.

mod balance;
mod book;
mod ops;
mod replay;

pub use balance::{Balance, LedgerError};
pub use book::StockBook;
pub use ops::{signed_quantity, transaction_effect, LedgerOp};
pub use replay::{reconcile, replay, ReconcileAction, ReconcileDiff, ReconcileReport};
