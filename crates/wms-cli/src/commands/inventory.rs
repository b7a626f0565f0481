//! `wms inventory ...`: receive, adjust, show, reconcile.

use anyhow::{bail, Result};
use sqlx::PgPool;
use tracing::{info, warn};

pub async fn receive(
    pool: &PgPool,
    sku: &str,
    bin_location: &str,
    qty: i64,
    actor: &str,
    reason: &str,
) -> Result<()> {
    let tx = wms_db::receive_stock(pool, sku, bin_location, qty, actor, reason).await?;
    println!("{}", serde_json::to_string(&tx)?);
    Ok(())
}

pub async fn adjust(
    pool: &PgPool,
    sku: &str,
    bin_location: &str,
    delta: i64,
    actor: &str,
    reason: &str,
) -> Result<()> {
    let tx = wms_db::adjust_stock(pool, sku, bin_location, delta, actor, reason).await?;
    println!("{}", serde_json::to_string(&tx)?);
    Ok(())
}

pub async fn show(pool: &PgPool, sku: &str) -> Result<()> {
    let units = wms_db::list_units(pool, sku).await?;
    if units.is_empty() {
        println!("sku={} bins=0", sku);
        return Ok(());
    }
    for u in &units {
        println!(
            "sku={} bin={} on_hand={} reserved={} available={}",
            u.sku,
            u.bin_location,
            u.quantity,
            u.reserved,
            u.quantity - u.reserved
        );
    }
    Ok(())
}

/// One JSON report per SKU on stdout; fails after printing all of them if
/// any SKU drifted.
pub async fn reconcile(pool: &PgPool, sku: Option<&str>) -> Result<()> {
    let skus = match sku {
        Some(s) => vec![s.to_string()],
        None => wms_db::list_skus(pool).await?,
    };

    let mut drifted = Vec::new();
    for s in &skus {
        let report = wms_db::reconcile_sku(pool, s).await?;
        println!("{}", serde_json::to_string(&report)?);
        if !report.is_clean() {
            drifted.push(s.clone());
        }
    }

    if !drifted.is_empty() {
        warn!(drifted = drifted.len(), skus = skus.len(), "reconcile found drift");
        bail!(
            "INVENTORY_DRIFT: {} of {} sku(s) disagree with the transaction log: {}",
            drifted.len(),
            skus.len(),
            drifted.join(",")
        );
    }
    info!(skus = skus.len(), "reconcile clean");
    Ok(())
}
