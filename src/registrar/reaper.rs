//! Background sweep that retires proxies which stop heartbeating.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::FleetRegistrar;

/// Spawns a task that calls [`FleetRegistrar::reap`] on a fixed interval,
/// ticking at `min(stale_seconds, retire_seconds) / 4` so a proxy is never
/// more than a quarter of its own threshold late to be marked stale or
/// retired. Exits as soon as `shutdown` reports `true`.
pub fn spawn(
    registrar: Arc<FleetRegistrar>,
    stale_seconds: i64,
    retire_seconds: i64,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let tick_seconds = (stale_seconds.min(retire_seconds) / 4).max(1) as u64;
    let mut interval = tokio::time::interval(Duration::from_secs(tick_seconds));

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match registrar.reap(Utc::now()).await {
                        Ok(changed) if changed > 0 => info!(changed, "fleet reaper retired stale proxies"),
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "fleet reaper sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("fleet reaper shutting down");
                        break;
                    }
                }
            }
        }
    })
}
