use wms_schemas::{OrderStatus, WmsError};

use OrderStatus::*;

/// Every permitted order status edge. Guards beyond the edge itself are
/// enforced by the aggregate operation that requests the transition.
pub const TRANSITIONS: &[(OrderStatus, OrderStatus)] = &[
    (Pending, Picking),
    // unclaim
    (Picking, Pending),
    (Picking, Picked),
    (Picked, Packing),
    (Packing, Packed),
    (Packed, Shipped),
    (Pending, Cancelled),
    (Picking, Cancelled),
    (Picking, Backorder),
];

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    TRANSITIONS.iter().any(|(f, t)| *f == from && *t == to)
}

/// `Conflict` when the edge is not in [`TRANSITIONS`]: the order is not in
/// the status the operation requires.
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<(), WmsError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(WmsError::conflict(format!(
            "order status {from} cannot transition to {to}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        for s in OrderStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for t in OrderStatus::ALL {
                assert!(!can_transition(*s, *t), "{s} -> {t}");
            }
        }
    }

    #[test]
    fn cancel_only_from_pending_or_picking() {
        for s in OrderStatus::ALL {
            let allowed = matches!(s, Pending | Picking);
            assert_eq!(can_transition(*s, Cancelled), allowed, "{s}");
        }
    }

    #[test]
    fn backorder_only_from_picking() {
        assert!(can_transition(Picking, Backorder));
        assert!(!can_transition(Pending, Backorder));
        assert!(!can_transition(Picked, Backorder));
    }

    #[test]
    fn skipping_a_stage_is_a_conflict() {
        let err = check_transition(Pending, Picked).unwrap_err();
        assert_eq!(err.kind(), "CONFLICT");
        assert!(check_transition(Packed, Shipped).is_ok());
    }
}
