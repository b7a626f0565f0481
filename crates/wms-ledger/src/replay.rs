use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use wms_schemas::{InventoryTransaction, InventoryUnit};

use crate::balance::Balance;
use crate::ops::transaction_effect;

/// What the caller should do with the report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileAction {
    Clean,
    Drift,
}

/// Evidence of a mismatch between the live rows and the replayed log.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "diff", rename_all = "snake_case")]
pub enum ReconcileDiff {
    OnHandMismatch {
        bin_location: String,
        live: i64,
        derived: i64,
    },
    ReservedMismatch {
        bin_location: String,
        live: i64,
        derived: i64,
    },
    /// The replayed log drives a counter negative or reserved above on-hand.
    DerivedInvariantBroken {
        bin_location: String,
        on_hand: i64,
        reserved: i64,
    },
}

/// Drift report for one SKU across all of its bins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub sku: String,
    pub action: ReconcileAction,
    /// Live aggregate over every bin row.
    pub on_hand: i64,
    pub reserved: i64,
    pub live_available: i64,
    /// Aggregate rebuilt from the transaction log alone.
    pub derived_reserved: i64,
    pub derived_available: i64,
    /// Net on-hand movement of every transaction (the replayed on-hand).
    pub transaction_sum: i64,
    pub transaction_count: usize,
    pub diffs: Vec<ReconcileDiff>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.action == ReconcileAction::Clean
    }
}

/// Rebuild per-bin balances from ledger rows. Rows are folded in the order
/// given; the effect of each row is independent of position so order does
/// not change the result.
pub fn replay<'a, I>(txs: I) -> BTreeMap<String, Balance>
where
    I: IntoIterator<Item = &'a InventoryTransaction>,
{
    let mut out: BTreeMap<String, Balance> = BTreeMap::new();
    for tx in txs {
        let (dq, dr) = transaction_effect(tx.tx_type, tx.quantity);
        let b = out.entry(tx.bin_location.clone()).or_default();
        b.on_hand += dq;
        b.reserved += dr;
    }
    out
}

/// Compare the live `InventoryUnit` rows of `sku` against a replay of its
/// transaction log. Rows and transactions for other SKUs are ignored.
pub fn reconcile(
    sku: &str,
    live: &[InventoryUnit],
    txs: &[InventoryTransaction],
) -> ReconcileReport {
    let sku_txs: Vec<&InventoryTransaction> = txs.iter().filter(|t| t.sku == sku).collect();
    let derived = replay(sku_txs.iter().copied());

    let live_by_bin: BTreeMap<String, Balance> = live
        .iter()
        .filter(|u| u.sku == sku)
        .map(|u| (u.bin_location.clone(), Balance::new(u.quantity, u.reserved)))
        .collect();

    let mut bins: BTreeSet<&String> = BTreeSet::new();
    bins.extend(live_by_bin.keys());
    bins.extend(derived.keys());

    let mut diffs = Vec::new();
    for bin in bins {
        let l = live_by_bin.get(bin).copied().unwrap_or_default();
        let d = derived.get(bin).copied().unwrap_or_default();
        if l.on_hand != d.on_hand {
            diffs.push(ReconcileDiff::OnHandMismatch {
                bin_location: bin.clone(),
                live: l.on_hand,
                derived: d.on_hand,
            });
        }
        if l.reserved != d.reserved {
            diffs.push(ReconcileDiff::ReservedMismatch {
                bin_location: bin.clone(),
                live: l.reserved,
                derived: d.reserved,
            });
        }
        if d.reserved < 0 || d.on_hand < 0 || d.reserved > d.on_hand {
            diffs.push(ReconcileDiff::DerivedInvariantBroken {
                bin_location: bin.clone(),
                on_hand: d.on_hand,
                reserved: d.reserved,
            });
        }
    }
    diffs.sort();

    let on_hand: i64 = live_by_bin.values().map(|b| b.on_hand).sum();
    let reserved: i64 = live_by_bin.values().map(|b| b.reserved).sum();
    let transaction_sum: i64 = derived.values().map(|b| b.on_hand).sum();
    let derived_reserved: i64 = derived.values().map(|b| b.reserved).sum();

    ReconcileReport {
        sku: sku.to_string(),
        action: if diffs.is_empty() {
            ReconcileAction::Clean
        } else {
            ReconcileAction::Drift
        },
        on_hand,
        reserved,
        live_available: on_hand - reserved,
        derived_reserved,
        derived_available: transaction_sum - derived_reserved,
        transaction_sum,
        transaction_count: sku_txs.len(),
        diffs,
    }
}
