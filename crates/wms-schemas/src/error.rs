use std::fmt;

use crate::codes::UnknownCode;

/// Error taxonomy shared by every fulfillment operation.
///
/// No operation partially applies its effects: when one of these is returned
/// the enclosing transaction has been rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WmsError {
    /// Malformed input (e.g. a non-positive quantity). Rejected before any
    /// mutation.
    Validation(String),
    /// Lost claim race, or the entity is not in the status the operation
    /// requires. Safe to retry after re-reading state.
    Conflict(String),
    /// Not enough available stock at the (SKU, bin). Never partially filled.
    Inventory {
        sku: String,
        bin_location: String,
        requested: i64,
        available: i64,
    },
    NotFound { entity: &'static str, id: String },
    /// Programming-contract failure (deduct without reservation, a stored
    /// code with no variant, a resolution with no mapping). Aborts the
    /// operation.
    Fatal(String),
    /// The storage backend failed.
    Storage(String),
}

impl WmsError {
    pub fn validation(msg: impl Into<String>) -> Self {
        WmsError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        WmsError::Conflict(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        WmsError::Fatal(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        WmsError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable kind code.
    pub fn kind(&self) -> &'static str {
        match self {
            WmsError::Validation(_) => "VALIDATION",
            WmsError::Conflict(_) => "CONFLICT",
            WmsError::Inventory { .. } => "INVENTORY",
            WmsError::NotFound { .. } => "NOT_FOUND",
            WmsError::Fatal(_) => "FATAL",
            WmsError::Storage(_) => "STORAGE",
        }
    }

    /// True for the classes that indicate a defect or an outage rather than a
    /// caller mistake.
    pub fn is_internal(&self) -> bool {
        matches!(self, WmsError::Fatal(_) | WmsError::Storage(_))
    }
}

impl fmt::Display for WmsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WmsError::Validation(m) => write!(f, "validation failed: {m}"),
            WmsError::Conflict(m) => write!(f, "conflict: {m}"),
            WmsError::Inventory {
                sku,
                bin_location,
                requested,
                available,
            } => write!(
                f,
                "insufficient stock for {sku} at {bin_location}: requested {requested}, available {available}"
            ),
            WmsError::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            WmsError::Fatal(m) => write!(f, "fatal: {m}"),
            WmsError::Storage(m) => write!(f, "storage error: {m}"),
        }
    }
}

impl std::error::Error for WmsError {}

impl From<UnknownCode> for WmsError {
    fn from(e: UnknownCode) -> Self {
        WmsError::Fatal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(WmsError::validation("x").kind(), "VALIDATION");
        assert_eq!(WmsError::not_found("order", 7).kind(), "NOT_FOUND");
        assert!(WmsError::fatal("boom").is_internal());
        assert!(!WmsError::conflict("lost").is_internal());
    }

    #[test]
    fn unknown_stored_code_is_fatal() {
        let e: WmsError = UnknownCode {
            kind: "OrderStatus",
            code: "??".to_string(),
        }
        .into();
        assert_eq!(e.kind(), "FATAL");
    }
}
