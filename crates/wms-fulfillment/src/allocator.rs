use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use wms_ledger::Balance;
use wms_schemas::InventoryUnit;

use crate::policy::{AllocationPolicy, SplitMode};

/// Working view of stock keyed by `(sku, bin_location)`.
pub type StockSnapshot = BTreeMap<(String, String), Balance>;

pub fn stock_snapshot(units: &[InventoryUnit]) -> StockSnapshot {
    units
        .iter()
        .map(|u| {
            (
                (u.sku.clone(), u.bin_location.clone()),
                Balance::new(u.quantity, u.reserved),
            )
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinAllocation {
    pub bin_location: String,
    pub qty: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemAllocation {
    /// Portions summing exactly to the requested quantity, primary bin first.
    Allocated(Vec<BinAllocation>),
    /// Not enough available stock across eligible bins; nothing reserved.
    Short { requested: i64, available: i64 },
}

/// Plan where `qty` units of `sku` come from.
///
/// The primary bin is drained first. When it is short and the policy allows,
/// the remaining bins holding the SKU follow in order of most available
/// first (bin code breaks ties). Allocation is all-or-nothing: a partial
/// plan is never returned.
pub fn plan_item(
    sku: &str,
    primary_bin: &str,
    qty: i64,
    stock: &StockSnapshot,
    policy: &AllocationPolicy,
) -> ItemAllocation {
    let mut candidates: Vec<(&str, i64)> = Vec::new();
    let primary_avail = stock
        .get(&(sku.to_string(), primary_bin.to_string()))
        .map(|b| b.available())
        .unwrap_or(0);
    candidates.push((primary_bin, primary_avail));

    if policy.alternate_bins {
        let mut alternates: Vec<(&str, i64)> = stock
            .iter()
            .filter(|((s, bin), b)| s == sku && bin != primary_bin && b.available() > 0)
            .map(|((_, bin), b)| (bin.as_str(), b.available()))
            .collect();
        alternates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        candidates.extend(alternates);
    }

    let mut need = qty;
    let mut portions = Vec::new();
    for (bin, avail) in &candidates {
        if need == 0 {
            break;
        }
        let take = need.min(*avail);
        if take > 0 {
            portions.push(BinAllocation {
                bin_location: bin.to_string(),
                qty: take,
            });
            need -= take;
        }
    }

    if need > 0 {
        let available = candidates.iter().map(|(_, a)| (*a).max(0)).sum();
        return ItemAllocation::Short {
            requested: qty,
            available,
        };
    }
    ItemAllocation::Allocated(portions)
}

/// Task quantities for one bin portion.
pub fn split_tasks(portion_qty: i64, mode: SplitMode) -> Vec<i64> {
    match mode {
        SplitMode::PerLine => vec![portion_qty],
        SplitMode::PerUnit => vec![1; portion_qty.max(0) as usize],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock(rows: &[(&str, &str, i64, i64)]) -> StockSnapshot {
        rows.iter()
            .map(|(s, b, q, r)| ((s.to_string(), b.to_string()), Balance::new(*q, *r)))
            .collect()
    }

    #[test]
    fn primary_bin_covers_the_line() {
        let s = stock(&[("A", "A-01", 10, 2), ("A", "A-02", 50, 0)]);
        let plan = plan_item("A", "A-01", 5, &s, &AllocationPolicy::default());
        assert_eq!(
            plan,
            ItemAllocation::Allocated(vec![BinAllocation {
                bin_location: "A-01".to_string(),
                qty: 5
            }])
        );
    }

    #[test]
    fn falls_back_to_alternates_most_available_first() {
        let s = stock(&[
            ("A", "A-01", 3, 1),
            ("A", "A-02", 4, 0),
            ("A", "A-03", 9, 0),
            ("B", "A-04", 100, 0),
        ]);
        let plan = plan_item("A", "A-01", 12, &s, &AllocationPolicy::default());
        assert_eq!(
            plan,
            ItemAllocation::Allocated(vec![
                BinAllocation {
                    bin_location: "A-01".to_string(),
                    qty: 2
                },
                BinAllocation {
                    bin_location: "A-03".to_string(),
                    qty: 9
                },
                BinAllocation {
                    bin_location: "A-02".to_string(),
                    qty: 1
                },
            ])
        );
    }

    #[test]
    fn short_is_all_or_nothing() {
        let s = stock(&[("A", "A-01", 3, 0), ("A", "A-02", 1, 0)]);
        let plan = plan_item("A", "A-01", 5, &s, &AllocationPolicy::default());
        assert_eq!(
            plan,
            ItemAllocation::Short {
                requested: 5,
                available: 4
            }
        );
    }

    #[test]
    fn alternates_disabled_only_uses_primary() {
        let s = stock(&[("A", "A-01", 3, 0), ("A", "A-02", 10, 0)]);
        let policy = AllocationPolicy {
            split_mode: SplitMode::PerLine,
            alternate_bins: false,
        };
        assert!(matches!(
            plan_item("A", "A-01", 5, &s, &policy),
            ItemAllocation::Short { available: 3, .. }
        ));
    }

    #[test]
    fn unknown_primary_bin_counts_as_empty() {
        let s = stock(&[("A", "A-09", 6, 0)]);
        let plan = plan_item("A", "Z-99", 6, &s, &AllocationPolicy::default());
        assert_eq!(
            plan,
            ItemAllocation::Allocated(vec![BinAllocation {
                bin_location: "A-09".to_string(),
                qty: 6
            }])
        );
    }

    #[test]
    fn per_unit_split() {
        assert_eq!(split_tasks(3, SplitMode::PerUnit), vec![1, 1, 1]);
        assert_eq!(split_tasks(3, SplitMode::PerLine), vec![3]);
    }
}
