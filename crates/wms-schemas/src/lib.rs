//! wms-schemas
//!
//! Shared entity shapes for the fulfillment core: orders, items, pick tasks,
//! inventory units and their append-only ledger, exceptions and the order
//! status audit trail. Every closed enum has a stable upper-case text code
//! that is used both on the wire and in the database CHECK constraints.
//!
//! No IO and no business rules live here; see `wms-fulfillment` and
//! `wms-ledger` for the rules and `wms-db` for persistence.

#[macro_use]
mod codes;
mod entities;
mod enums;
mod error;

pub use codes::UnknownCode;
pub use entities::*;
pub use enums::*;
pub use error::WmsError;
