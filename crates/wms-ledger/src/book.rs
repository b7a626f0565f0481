use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use wms_schemas::{InventoryTransaction, InventoryUnit};

use crate::balance::{Balance, LedgerError};
use crate::ops::LedgerOp;
use crate::replay::{reconcile, ReconcileReport};

/// In-memory stock book: live balances plus the transaction journal.
///
/// Applies one [`LedgerOp`] at a time; a failing op leaves both the balance
/// and the journal untouched. Used by deterministic harnesses and as the
/// reference model the SQL ledger is checked against.
#[derive(Clone, Debug, Default)]
pub struct StockBook {
    balances: BTreeMap<(String, String), Balance>,
    journal: Vec<InventoryTransaction>,
}

impl StockBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(
        &mut self,
        op: &LedgerOp,
        order_id: Option<Uuid>,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<InventoryTransaction, LedgerError> {
        let key = (op.sku().to_string(), op.bin_location().to_string());
        let mut next = self.balances.get(&key).copied().unwrap_or_default();
        op.apply(&mut next)?;
        self.balances.insert(key, next);

        let tx = InventoryTransaction {
            id: Uuid::now_v7(),
            tx_type: op.tx_type(),
            sku: op.sku().to_string(),
            bin_location: op.bin_location().to_string(),
            quantity: op.signed_quantity(),
            order_id,
            actor: actor.to_string(),
            reason: op.reason().map(str::to_string),
            created_at: at,
        };
        self.journal.push(tx.clone());
        Ok(tx)
    }

    /// Apply every op or none of them.
    pub fn apply_all(
        &mut self,
        ops: &[LedgerOp],
        order_id: Option<Uuid>,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<InventoryTransaction>, (usize, LedgerError)> {
        let mut scratch = self.clone();
        let mut out = Vec::with_capacity(ops.len());
        for (i, op) in ops.iter().enumerate() {
            out.push(scratch.apply(op, order_id, actor, at).map_err(|e| (i, e))?);
        }
        *self = scratch;
        Ok(out)
    }

    pub fn balance(&self, sku: &str, bin_location: &str) -> Balance {
        self.balances
            .get(&(sku.to_string(), bin_location.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Every (sku, bin) balance the book holds.
    pub fn balances(&self) -> &BTreeMap<(String, String), Balance> {
        &self.balances
    }

    /// Live rows for one SKU, bins ascending.
    pub fn units(&self, sku: &str, at: DateTime<Utc>) -> Vec<InventoryUnit> {
        self.balances
            .iter()
            .filter(|((s, _), _)| s == sku)
            .map(|((s, bin), b)| InventoryUnit {
                sku: s.clone(),
                bin_location: bin.clone(),
                quantity: b.on_hand,
                reserved: b.reserved,
                updated_at: at,
            })
            .collect()
    }

    pub fn journal(&self) -> &[InventoryTransaction] {
        &self.journal
    }

    pub fn reconcile(&self, sku: &str) -> ReconcileReport {
        reconcile(sku, &self.units(sku, Utc::now()), &self.journal)
    }
}
