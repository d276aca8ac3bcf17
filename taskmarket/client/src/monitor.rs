use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing_futures::Instrument;

use crate::api::ApiClient;
use crate::config::ClientConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// No probe has finished yet.
    Unknown,
    Online,
    Offline,
}

/// Periodically probes the health endpoint through the client's fallback
/// logic and publishes whether any endpoint is reachable.
pub struct NetworkMonitor {
    client: ApiClient,
    sender: Arc<watch::Sender<NetworkStatus>>,
    receiver: watch::Receiver<NetworkStatus>,
    handle: Option<JoinHandle<()>>,
}

impl NetworkMonitor {
    /// Starts probing every `interval`. The first probe runs immediately.
    pub fn spawn(client: ApiClient, interval: Duration) -> Self {
        // `interval` panics on a zero period.
        let interval = interval.max(Duration::from_millis(1));
        let (sender, receiver) = watch::channel(NetworkStatus::Unknown);
        let sender = Arc::new(sender);

        let task_client = client.clone();
        let task_sender = sender.clone();
        let handle = tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    probe(&task_client, &task_sender).await;
                }
            }
            .instrument(tracing::info_span!(
                "network_monitor",
                interval_ms = interval.as_millis() as u64
            )),
        );

        Self {
            client,
            sender,
            receiver,
            handle: Some(handle),
        }
    }

    /// Starts probing at the configured `monitor_interval_ms`.
    pub fn spawn_with_config(client: ApiClient, config: &ClientConfig) -> Self {
        Self::spawn(client, config.monitor_interval())
    }

    pub fn status(&self) -> NetworkStatus {
        *self.receiver.borrow()
    }

    /// Receiver that sees every status change.
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.sender.subscribe()
    }

    /// Probes right away instead of waiting for the next tick.
    pub async fn check_now(&self) -> NetworkStatus {
        probe(&self.client, &self.sender).await
    }

    /// Stops the probe loop. The last status stays readable.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn probe(client: &ApiClient, sender: &watch::Sender<NetworkStatus>) -> NetworkStatus {
    let status = match client.health().await {
        Ok(()) => NetworkStatus::Online,
        Err(err) => {
            tracing::debug!(error = %err, "Health probe failed");
            NetworkStatus::Offline
        }
    };
    let previous = sender.send_replace(status);
    if previous != status {
        let endpoint = client.active_endpoint().await;
        tracing::info!(?previous, current = ?status, %endpoint, "Network status changed");
    }
    status
}
