//! Background reclamation of expired authorization records.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use toolgate_core::authorization::AuthorizationBroker;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Spawn a task that purges expired records every `interval`.
///
/// Expired records are already invisible to every broker operation; the
/// sweep only frees their memory. Abort the returned handle to stop it.
pub fn spawn_sweeper(broker: Arc<AuthorizationBroker>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = broker.purge_expired().await {
                tracing::warn!(error = %e, "expired request sweep failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolgate_core::authorization::NewAuthorization;
    use toolgate_core::ToolArgs;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_reclaims_expired_records() {
        let broker = Arc::new(AuthorizationBroker::new().with_ttl(Duration::from_secs(5)));
        broker
            .request_authorization(NewAuthorization::new("s1", "rm", ToolArgs::new()))
            .await
            .unwrap();

        let sweeper = spawn_sweeper(broker.clone(), Duration::from_secs(10));
        assert_eq!(broker.health().await.unwrap().pending, 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(broker.health().await.unwrap().pending, 0);
        // Already reclaimed by the sweeper
        assert_eq!(broker.purge_expired().await.unwrap(), 0);

        sweeper.abort();
    }
}
