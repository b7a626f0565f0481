//! Shared runtime state for wms-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The pool and the
//! presence projection are the only shared mutable resources.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info};
use uuid::Uuid;
use wms_config::FulfillmentConfig;
use wms_presence::PresenceTracker;
use wms_schemas::{OrderStateChange, OrderStatus};

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    OrderStatus(OrderStatusEvent),
    LogLine { level: String, msg: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusEvent {
    pub order_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: String,
    pub at: DateTime<Utc>,
}

impl From<&OrderStateChange> for OrderStatusEvent {
    fn from(c: &OrderStateChange) -> Self {
        Self {
            order_id: c.order_id,
            from: c.from_status,
            to: c.to_status,
            actor: c.actor.clone(),
            at: c.changed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub pool: PgPool,
    pub config: Arc<FulfillmentConfig>,
    /// SHA-256 of the canonical config the daemon booted with.
    pub config_hash: String,
    /// Advisory only; never consulted by claim or pick handlers.
    pub presence: Arc<RwLock<PresenceTracker>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: FulfillmentConfig, config_hash: String) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        let presence = PresenceTracker::new(config.presence.clone());
        Self {
            bus,
            build: BuildInfo {
                service: "wms-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            pool,
            config: Arc::new(config),
            config_hash,
            presence: Arc::new(RwLock::new(presence)),
        }
    }

    /// Broadcast committed status transitions. No subscribers is fine.
    pub fn publish_changes(&self, changes: &[OrderStateChange]) {
        for c in changes {
            let _ = self.bus.send(BusMsg::OrderStatus(c.into()));
        }
    }

    pub fn log_line(&self, level: &str, msg: impl Into<String>) {
        let _ = self.bus.send(BusMsg::LogLine {
            level: level.to_string(),
            msg: msg.into(),
        });
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Seconds since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Spawn the stale-claim reaper.
///
/// Every `claims.reaper_interval_secs` it unclaims PICKING orders idle for
/// longer than `claims.stale_after_secs`, broadcasting one `order_status`
/// event and one WARN log line per released order. A failed sweep is logged
/// and retried on the next tick.
pub fn spawn_stale_claim_reaper(state: Arc<AppState>) {
    let interval = Duration::from_secs(state.config.claims.reaper_interval_secs);
    let stale_after = chrono::Duration::seconds(state.config.claims.stale_after_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // the first tick fires immediately; skip it so boot is quiet
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match wms_db::reap_stale_claims(&state.pool, stale_after).await {
                Ok(reaped) => {
                    if !reaped.is_empty() {
                        info!(count = reaped.len(), "reaper sweep released claims");
                    }
                    let now = Utc::now();
                    for r in reaped {
                        let _ = state.bus.send(BusMsg::OrderStatus(OrderStatusEvent {
                            order_id: r.order_id,
                            from: OrderStatus::Picking,
                            to: OrderStatus::Pending,
                            actor: wms_db::REAPER_ACTOR.to_string(),
                            at: now,
                        }));
                        state.log_line(
                            "WARN",
                            format!(
                                "stale claim reaped: order {} held by {}",
                                r.order_id, r.picker_id
                            ),
                        );
                    }
                }
                Err(e) => {
                    error!(error = %e, "reaper sweep failed");
                    state.log_line("ERROR", format!("reaper sweep failed: {e}"));
                }
            }
        }
    });
}
