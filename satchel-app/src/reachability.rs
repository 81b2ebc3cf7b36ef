//! Network-reachability polling that gates the cloud-sync affordances.

use std::cell::Cell;
use std::time::Duration;

/// The interval screens poll at. Anything between 5 and 10 seconds keeps the
/// sync button honest without hammering the host.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(7);

/// Polls a probe URL on a fixed interval for the lifetime of a screen. Drop
/// the `run` future on unmount to tear the loop down; in-flight probes are
/// simply abandoned.
pub struct ReachabilityMonitor {
    client: reqwest::Client,
    probe_url: String,
    interval: Duration,
    online: Cell<bool>,
}

impl ReachabilityMonitor {
    pub fn new(client: reqwest::Client, probe_url: impl Into<String>, interval: Duration) -> Self {
        Self {
            client,
            probe_url: probe_url.into(),
            interval,
            online: Cell::new(false),
        }
    }

    /// Last observed reachability. Starts pessimistic until the first probe
    /// completes.
    pub fn online(&self) -> bool {
        self.online.get()
    }

    /// One reachability check.
    pub async fn probe(&self) -> bool {
        let reachable = match self.client.head(&self.probe_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                log::info!("reachability probe failed: {e}");
                false
            }
        };
        self.online.set(reachable);
        reachable
    }

    /// Polls forever, reporting transitions through `on_change`.
    pub async fn run(&self, on_change: impl Fn(bool)) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last = self.online.get();
        loop {
            ticker.tick().await;
            let now = self.probe().await;
            if now != last {
                log::info!("reachability changed: {last} -> {now}");
                on_change(now);
                last = now;
            }
        }
    }
}
