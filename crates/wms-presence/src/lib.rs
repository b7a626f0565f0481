//! wms-presence
//!
//! Picker presence as a projection of UI navigation events.
//!
//! - One entry per user: last view label and when it was reported.
//! - ACTIVE only when the last view is a working screen for the user's role
//!   and was reported within the activity window; otherwise IDLE.
//! - Holding an order in PICKING is not activity. Order state is not an input.
//!
//! Advisory data for dashboards and the stale-claim reaper's operators. Nothing
//! here gates claim or pick operations.
//!
//! Pure deterministic logic. No IO, no wall-clock. Callers pass `now`.

mod policy;
mod tracker;

pub use policy::PresencePolicy;
pub use tracker::{ActivityStatus, PresenceEntry, PresenceTracker, PresenceView};
