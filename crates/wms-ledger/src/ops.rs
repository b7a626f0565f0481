use serde::{Deserialize, Serialize};
use wms_schemas::TransactionType;

use crate::balance::{Balance, LedgerError};

/// One ledger mutation against a single (SKU, bin).
///
/// Other components never write stock counts directly; they describe the
/// change as a `LedgerOp` and hand it to the ledger writer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LedgerOp {
    Reserve {
        sku: String,
        bin_location: String,
        qty: i64,
    },
    Deduct {
        sku: String,
        bin_location: String,
        qty: i64,
    },
    Release {
        sku: String,
        bin_location: String,
        qty: i64,
    },
    Adjust {
        sku: String,
        bin_location: String,
        delta: i64,
        reason: String,
    },
    Receive {
        sku: String,
        bin_location: String,
        qty: i64,
        reason: String,
    },
}

impl LedgerOp {
    pub fn reserve(sku: impl Into<String>, bin: impl Into<String>, qty: i64) -> Self {
        LedgerOp::Reserve {
            sku: sku.into(),
            bin_location: bin.into(),
            qty,
        }
    }

    pub fn deduct(sku: impl Into<String>, bin: impl Into<String>, qty: i64) -> Self {
        LedgerOp::Deduct {
            sku: sku.into(),
            bin_location: bin.into(),
            qty,
        }
    }

    pub fn release(sku: impl Into<String>, bin: impl Into<String>, qty: i64) -> Self {
        LedgerOp::Release {
            sku: sku.into(),
            bin_location: bin.into(),
            qty,
        }
    }

    pub fn adjust(
        sku: impl Into<String>,
        bin: impl Into<String>,
        delta: i64,
        reason: impl Into<String>,
    ) -> Self {
        LedgerOp::Adjust {
            sku: sku.into(),
            bin_location: bin.into(),
            delta,
            reason: reason.into(),
        }
    }

    pub fn receive(
        sku: impl Into<String>,
        bin: impl Into<String>,
        qty: i64,
        reason: impl Into<String>,
    ) -> Self {
        LedgerOp::Receive {
            sku: sku.into(),
            bin_location: bin.into(),
            qty,
            reason: reason.into(),
        }
    }

    pub fn sku(&self) -> &str {
        match self {
            LedgerOp::Reserve { sku, .. }
            | LedgerOp::Deduct { sku, .. }
            | LedgerOp::Release { sku, .. }
            | LedgerOp::Adjust { sku, .. }
            | LedgerOp::Receive { sku, .. } => sku,
        }
    }

    pub fn bin_location(&self) -> &str {
        match self {
            LedgerOp::Reserve { bin_location, .. }
            | LedgerOp::Deduct { bin_location, .. }
            | LedgerOp::Release { bin_location, .. }
            | LedgerOp::Adjust { bin_location, .. }
            | LedgerOp::Receive { bin_location, .. } => bin_location,
        }
    }

    pub fn tx_type(&self) -> TransactionType {
        match self {
            LedgerOp::Reserve { .. } => TransactionType::Reservation,
            LedgerOp::Deduct { .. } => TransactionType::Deduction,
            LedgerOp::Release { .. } => TransactionType::Cancellation,
            LedgerOp::Adjust { .. } => TransactionType::Adjustment,
            LedgerOp::Receive { .. } => TransactionType::Receipt,
        }
    }

    /// Signed quantity as stored on the transaction row.
    pub fn signed_quantity(&self) -> i64 {
        match self {
            LedgerOp::Reserve { qty, .. }
            | LedgerOp::Deduct { qty, .. }
            | LedgerOp::Release { qty, .. }
            | LedgerOp::Receive { qty, .. } => signed_quantity(self.tx_type(), *qty),
            LedgerOp::Adjust { delta, .. } => *delta,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            LedgerOp::Adjust { reason, .. } | LedgerOp::Receive { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Apply to a balance, enforcing the invariants of the operation.
    pub fn apply(&self, balance: &mut Balance) -> Result<(), LedgerError> {
        match self {
            LedgerOp::Reserve { qty, .. } => balance.reserve(*qty),
            LedgerOp::Deduct { qty, .. } => balance.deduct(*qty),
            LedgerOp::Release { qty, .. } => balance.release(*qty),
            LedgerOp::Adjust { delta, .. } => balance.adjust(*delta),
            LedgerOp::Receive { qty, .. } => {
                if *qty <= 0 {
                    return Err(LedgerError::NonPositiveQty { qty: *qty });
                }
                balance.adjust(*qty)
            }
        }
    }
}

/// Sign convention for a transaction of `magnitude` units:
/// RESERVATION and RECEIPT are positive, DEDUCTION and CANCELLATION are
/// negative, ADJUSTMENT carries its own sign.
pub fn signed_quantity(tx_type: TransactionType, magnitude: i64) -> i64 {
    match tx_type {
        TransactionType::Reservation | TransactionType::Receipt => magnitude.abs(),
        TransactionType::Deduction | TransactionType::Cancellation => -magnitude.abs(),
        TransactionType::Adjustment => magnitude,
    }
}

/// `(Δon_hand, Δreserved)` a stored transaction row contributes on replay.
pub fn transaction_effect(tx_type: TransactionType, signed_qty: i64) -> (i64, i64) {
    match tx_type {
        TransactionType::Reservation => (0, signed_qty),
        TransactionType::Deduction => (signed_qty, signed_qty),
        TransactionType::Cancellation => (0, signed_qty),
        TransactionType::Adjustment | TransactionType::Receipt => (signed_qty, 0),
    }
}
