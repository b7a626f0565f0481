//! Stale-claim reaper: force-unclaims PICKING orders with no recent activity.
//! Advisory cleanup; a picker re-claiming afterwards is a normal race.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wms_schemas::{OrderStatus, WmsError};

use crate::error::StorageContext;
use crate::ops::mutate;

pub const REAPER_ACTOR: &str = "system:reaper";
pub const REAPER_REASON: &str = "stale claim reaped";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReapedClaim {
    pub order_id: Uuid,
    pub picker_id: String,
    pub last_activity_at: DateTime<Utc>,
}

/// Unclaim every PICKING order whose last activity is older than
/// `now - stale_after`, one transaction per order. Staleness is re-checked
/// under the row lock, so an order touched since the scan is left alone.
pub async fn reap_stale_claims(
    pool: &PgPool,
    stale_after: Duration,
) -> Result<Vec<ReapedClaim>, WmsError> {
    let cutoff = Utc::now() - stale_after;
    let candidates: Vec<(Uuid, Option<String>, DateTime<Utc>)> = sqlx::query_as(
        r#"
        select id, picker_id, coalesce(last_activity_at, claimed_at, created_at)
          from orders
         where status = 'PICKING'
           and coalesce(last_activity_at, claimed_at, created_at) < $1
         order by 3
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await
    .ctx("select stale claims failed")?;

    let mut reaped = Vec::new();
    for (order_id, picker, seen_at) in candidates {
        let outcome = mutate(pool, order_id, REAPER_ACTOR, |agg, at| {
            let last = agg
                .order
                .last_activity_at
                .or(agg.order.claimed_at)
                .unwrap_or(agg.order.created_at);
            if agg.order.status != OrderStatus::Picking || last >= cutoff {
                return Err(WmsError::conflict(format!(
                    "order {order_id} no longer stale"
                )));
            }
            agg.unclaim(REAPER_ACTOR, REAPER_REASON, at)
        })
        .await;

        match outcome {
            Ok(_) => {
                let picker_id = picker.unwrap_or_default();
                info!(
                    order_id = %order_id,
                    picker_id = %picker_id,
                    last_activity_at = %seen_at,
                    "stale claim reaped"
                );
                reaped.push(ReapedClaim {
                    order_id,
                    picker_id,
                    last_activity_at: seen_at,
                });
            }
            Err(WmsError::Conflict(msg)) => debug!(order_id = %order_id, %msg, "reap skipped"),
            Err(e) => warn!(order_id = %order_id, error = %e, "reap failed"),
        }
    }
    Ok(reaped)
}
