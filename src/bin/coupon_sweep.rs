//! Coupon expiry sweep.
//!
//! Run with: cargo run --bin coupon-sweep
//!
//! Meant to be invoked periodically by an external scheduler (cron or
//! similar). Soft-deactivates coupons whose expiry lies beyond the grace
//! period, then walks the notification window so one `CouponExpiringSoon`
//! event is emitted per coupon about to lapse. Both windows come from the
//! regular configuration (`expired_coupon_grace_days`,
//! `expiring_coupon_window_days`).

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use promo_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db = Arc::new(api::db::establish_connection_from_app_config(&cfg).await?);
    if cfg.auto_migrate {
        api::db::run_migrations(&db).await?;
    }

    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = Arc::new(api::events::EventSender::new(event_tx));
    let event_task = tokio::spawn(api::events::process_events(event_rx));

    let services =
        api::handlers::AppServices::new(db, api::clock::system_clock(), Some(event_sender));

    let deactivated = services
        .coupons
        .deactivate_expired(cfg.expired_coupon_grace_days)
        .await?;
    let expiring = services
        .coupons
        .find_expiring_soon(cfg.expiring_coupon_window_days)
        .await?;

    info!(
        deactivated,
        expiring = expiring.len(),
        "Coupon sweep finished"
    );

    // Dropping the services closes the event channel; wait for the consumer
    // to drain what the sweep emitted before exiting.
    drop(services);
    let _ = event_task.await;

    Ok(())
}
