//! Request and response types for all wms-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wms_fulfillment::ResolutionRequest;
use wms_schemas::InventoryUnit;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    pub config_hash: String,
    pub uptime_secs: u64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable code: VALIDATION | CONFLICT | INVENTORY | NOT_FOUND | FATAL | STORAGE
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Picking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub picker_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnclaimRequest {
    pub user_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickRequest {
    pub picker_id: String,
    pub pick_task_id: Uuid,
    pub sku: String,
    pub quantity: i64,
    pub bin_location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipTaskRequest {
    pub user_id: String,
    pub pick_task_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletePickingRequest {
    pub picker_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderRequest {
    pub user_id: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Packing and shipping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackerRequest {
    pub packer_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyItemRequest {
    pub packer_id: String,
    pub order_item_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipRequest {
    pub user_id: String,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

// ---------------------------------------------------------------------------
// Exceptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub reviewer: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub resolved_by: String,
    #[serde(flatten)]
    pub resolution: ResolutionRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelExceptionRequest {
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// Identity comes from the `x-user-id` / `x-user-role` headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentViewRequest {
    pub view: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub user_id: String,
    pub released_orders: Vec<Uuid>,
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryResponse {
    pub sku: String,
    pub on_hand: i64,
    pub reserved: i64,
    pub available: i64,
    pub bins: Vec<InventoryUnit>,
}

impl InventoryResponse {
    pub fn from_units(sku: &str, bins: Vec<InventoryUnit>) -> Self {
        let on_hand = bins.iter().map(|u| u.quantity).sum();
        let reserved = bins.iter().map(|u| u.reserved).sum();
        Self {
            sku: sku.to_string(),
            on_hand,
            reserved,
            available: on_hand - reserved,
            bins,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveRequest {
    pub sku: String,
    pub bin_location: String,
    pub quantity: i64,
    pub actor: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustRequest {
    pub sku: String,
    pub bin_location: String,
    pub delta: i64,
    pub actor: String,
    pub reason: String,
}
