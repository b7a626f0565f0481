use serde::{Deserialize, Serialize};
use wms_schemas::WmsError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Invariant violations a [`Balance`] can surface. The balance is never
/// mutated when one is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Reserve/deduct/release/receive quantities must be > 0.
    NonPositiveQty { qty: i64 },
    /// An adjustment of zero records nothing.
    ZeroAdjustment,
    /// `available < requested` on reserve.
    InsufficientStock { requested: i64, available: i64 },
    /// Deduct without a matching reservation. Caller contract failure.
    ReservationShortfall { requested: i64, reserved: i64 },
    /// Release of more than is reserved. Caller contract failure.
    ReleaseShortfall { requested: i64, reserved: i64 },
    /// Adjustment would push on-hand below the reserved quantity.
    BelowReserved { on_hand_after: i64, reserved: i64 },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveQty { qty } => {
                write!(f, "ledger invariant: qty must be > 0, got {qty}")
            }
            Self::ZeroAdjustment => write!(f, "ledger invariant: adjustment delta must be non-zero"),
            Self::InsufficientStock {
                requested,
                available,
            } => write!(
                f,
                "insufficient stock: requested {requested}, available {available}"
            ),
            Self::ReservationShortfall {
                requested,
                reserved,
            } => write!(
                f,
                "deduct of {requested} exceeds reserved {reserved} (reserve before deduct)"
            ),
            Self::ReleaseShortfall {
                requested,
                reserved,
            } => write!(f, "release of {requested} exceeds reserved {reserved}"),
            Self::BelowReserved {
                on_hand_after,
                reserved,
            } => write!(
                f,
                "adjustment leaves on-hand {on_hand_after} below reserved {reserved}"
            ),
        }
    }
}

impl std::error::Error for LedgerError {}

impl LedgerError {
    /// Lift into the shared taxonomy, attaching the (SKU, bin) the failed
    /// operation targeted.
    pub fn into_wms(self, sku: &str, bin_location: &str) -> WmsError {
        match self {
            LedgerError::NonPositiveQty { .. } | LedgerError::ZeroAdjustment => {
                WmsError::Validation(format!("{self} ({sku} @ {bin_location})"))
            }
            LedgerError::InsufficientStock {
                requested,
                available,
            } => WmsError::Inventory {
                sku: sku.to_string(),
                bin_location: bin_location.to_string(),
                requested,
                available,
            },
            LedgerError::BelowReserved {
                on_hand_after,
                reserved,
            } => WmsError::Inventory {
                sku: sku.to_string(),
                bin_location: bin_location.to_string(),
                requested: reserved,
                available: on_hand_after,
            },
            LedgerError::ReservationShortfall { .. } | LedgerError::ReleaseShortfall { .. } => {
                WmsError::Fatal(format!("{self} ({sku} @ {bin_location})"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Balance
// ---------------------------------------------------------------------------

/// On-hand and reserved counters for one (SKU, bin).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub on_hand: i64,
    pub reserved: i64,
}

impl Balance {
    pub fn new(on_hand: i64, reserved: i64) -> Self {
        Self { on_hand, reserved }
    }

    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }

    pub fn reserve(&mut self, qty: i64) -> Result<(), LedgerError> {
        positive(qty)?;
        if self.available() < qty {
            return Err(LedgerError::InsufficientStock {
                requested: qty,
                available: self.available(),
            });
        }
        self.reserved += qty;
        Ok(())
    }

    pub fn deduct(&mut self, qty: i64) -> Result<(), LedgerError> {
        positive(qty)?;
        if self.reserved < qty {
            return Err(LedgerError::ReservationShortfall {
                requested: qty,
                reserved: self.reserved,
            });
        }
        self.on_hand -= qty;
        self.reserved -= qty;
        Ok(())
    }

    pub fn release(&mut self, qty: i64) -> Result<(), LedgerError> {
        positive(qty)?;
        if self.reserved < qty {
            return Err(LedgerError::ReleaseShortfall {
                requested: qty,
                reserved: self.reserved,
            });
        }
        self.reserved -= qty;
        Ok(())
    }

    /// Signed on-hand correction (cycle count, receipt, write-off).
    pub fn adjust(&mut self, delta: i64) -> Result<(), LedgerError> {
        if delta == 0 {
            return Err(LedgerError::ZeroAdjustment);
        }
        let after = self.on_hand + delta;
        if after < self.reserved {
            return Err(LedgerError::BelowReserved {
                on_hand_after: after,
                reserved: self.reserved,
            });
        }
        self.on_hand = after;
        Ok(())
    }
}

fn positive(qty: i64) -> Result<(), LedgerError> {
    if qty <= 0 {
        return Err(LedgerError::NonPositiveQty { qty });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_then_deduct_consumes_reserved_stock() {
        let mut b = Balance::new(10, 0);
        b.reserve(4).unwrap();
        assert_eq!(b.available(), 6);
        b.deduct(3).unwrap();
        assert_eq!(b, Balance::new(7, 1));
        assert_eq!(b.available(), 6);
    }

    #[test]
    fn reserve_fails_without_side_effect_when_short() {
        let mut b = Balance::new(3, 1);
        let err = b.reserve(3).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                requested: 3,
                available: 2
            }
        );
        assert_eq!(b, Balance::new(3, 1));
    }

    #[test]
    fn deduct_without_reservation_is_reported_not_clamped() {
        let mut b = Balance::new(5, 1);
        let err = b.deduct(2).unwrap_err();
        assert!(matches!(err, LedgerError::ReservationShortfall { .. }));
        assert_eq!(b, Balance::new(5, 1));
        assert_eq!(err.into_wms("A", "B1").kind(), "FATAL");
    }

    #[test]
    fn release_returns_stock_to_availability_only() {
        let mut b = Balance::new(8, 4);
        b.release(4).unwrap();
        assert_eq!(b, Balance::new(8, 0));
    }

    #[test]
    fn adjust_cannot_go_below_reserved() {
        let mut b = Balance::new(5, 4);
        let err = b.adjust(-2).unwrap_err();
        assert_eq!(
            err,
            LedgerError::BelowReserved {
                on_hand_after: 3,
                reserved: 4
            }
        );
        b.adjust(-1).unwrap();
        assert_eq!(b.available(), 0);
        assert_eq!(b.adjust(0), Err(LedgerError::ZeroAdjustment));
    }

    #[test]
    fn non_positive_quantities_are_validation_errors() {
        let mut b = Balance::new(5, 0);
        let err = b.reserve(-1).unwrap_err();
        assert_eq!(err.into_wms("A", "B1").kind(), "VALIDATION");
    }
}
