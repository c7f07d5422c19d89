//! Background task that pings the license issuer on a fixed interval,
//! backing off exponentially while the issuer is unreachable.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use super::backoff::Backoff;
use super::LicenseEnforcer;
use crate::config::settings::LicenseConfig;

pub fn spawn(enforcer: Arc<LicenseEnforcer>, config: LicenseConfig, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = Backoff::new();
        loop {
            let wait = tokio::select! {
                result = enforcer.keepalive() => {
                    match result {
                        Ok(()) => {
                            backoff.reset();
                            config.keepalive_interval()
                        }
                        Err(e) => {
                            let delay = backoff.next_delay();
                            error!(error = %e, retry_in_seconds = delay.as_secs(), "license keepalive failed");
                            delay
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("license keepalive loop shutting down");
                        break;
                    }
                    continue;
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("license keepalive loop shutting down");
                        break;
                    }
                }
            }
        }
    })
}
