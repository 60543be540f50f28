//! Periodic physical deletion of expired tickets.
//!
//! Correctness never depends on this task: [`TicketStore::retrieve`] already hides expired
//! records. The sweeper only keeps the backing store from growing without bound.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::ticket_store::TicketStore;

pub async fn run_ticket_sweeper(store: TicketStore, sweep_interval: Duration, shutdown: CancellationToken) {
    info!(sweep_interval = ?sweep_interval, "Starting expired ticket sweeper");

    let mut interval = tokio::time::interval(sweep_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Expired ticket sweeper shutting down");
                break;
            }
            _ = interval.tick() => {
                match store.purge_expired().await {
                    Ok(0) => debug!("No expired tickets to purge"),
                    Ok(purged) => info!(purged, "Purged expired tickets"),
                    Err(e) => warn!(error = %e, "Expired ticket sweep failed, retrying next interval"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{
            ticket::{AuthTicket, Principal, TicketItems},
            ticket_format::TicketFormat,
            ticket_store::MemorySessionBackend,
        },
        clock::ManualClock,
    };
    use chrono::Utc;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sweeper_purges_and_stops_on_cancel() {
        let now = Utc::now();
        let backend = Arc::new(MemorySessionBackend::new());
        let clock = Arc::new(ManualClock::new(now));
        let store = TicketStore::new(backend.clone(), TicketFormat::default(), Duration::from_secs(1), clock.clone());

        let ticket = AuthTicket::issue(
            Principal::new("alice", vec![]),
            "Cookies",
            now,
            chrono::Duration::minutes(5),
            false,
            TicketItems::default(),
        )
        .unwrap();
        store.create(&ticket).await.unwrap();
        clock.advance(chrono::Duration::minutes(10));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_ticket_sweeper(store, Duration::from_millis(10), shutdown.clone()));

        // the first tick fires immediately
        for _ in 0..100 {
            if backend.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(backend.is_empty());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
