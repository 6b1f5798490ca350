use address_controller_core::{RouterManagement, RouterStatus};
use futures::future;
use prometheus_client::{metrics::counter::Counter, registry::Registry};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    sync::{watch, Notify},
    time,
};

/// Periodically collects the status of every router and publishes the latest
/// results as an immutable snapshot.
pub struct RouterStatusCache {
    management: Arc<dyn RouterManagement>,
    interval: time::Duration,
    check_router_links: AtomicBool,
    wakeup: Notify,
    tx: watch::Sender<Arc<Vec<RouterStatus>>>,
    metrics: RouterStatusMetrics,
}

#[derive(Clone, Debug, Default)]
pub struct RouterStatusMetrics {
    polls: Counter,
    failures: Counter,
}

// === impl RouterStatusCache ===

impl RouterStatusCache {
    pub fn new(
        management: Arc<dyn RouterManagement>,
        interval: time::Duration,
        metrics: RouterStatusMetrics,
    ) -> Arc<Self> {
        let (tx, _) = watch::channel(Arc::new(Vec::new()));
        Arc::new(Self {
            management,
            interval,
            check_router_links: AtomicBool::new(false),
            wakeup: Notify::new(),
            tx,
            metrics,
        })
    }

    /// The results of the most recent poll.
    pub fn latest(&self) -> Arc<Vec<RouterStatus>> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<RouterStatus>>> {
        self.tx.subscribe()
    }

    /// Triggers a poll without waiting for the next interval.
    pub fn wakeup(&self) {
        self.wakeup.notify_one();
    }

    /// Controls whether subsequent polls also collect router links.
    pub fn set_check_router_links(&self, check: bool) {
        self.check_router_links.store(check, Ordering::Release);
    }

    /// Polls after each interval or wakeup. The first poll is expected to
    /// have been made before this is spawned.
    pub async fn run(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = time::sleep(self.interval) => {}
                _ = self.wakeup.notified() => {
                    tracing::debug!("Woken up");
                }
            }
            self.poll().await;
        }
    }

    /// Queries all routers and publishes the statuses of those that answered.
    /// A failure to list routers keeps the previous snapshot.
    pub async fn poll(&self) {
        self.metrics.polls.inc();
        let routers = match self.management.routers().await {
            Ok(routers) => routers,
            Err(error) => {
                self.metrics.failures.inc();
                tracing::warn!(%error, "Failed to list routers");
                return;
            }
        };

        let include_links = self.check_router_links.load(Ordering::Acquire);
        let results = future::join_all(
            routers
                .iter()
                .map(|router| self.management.query(router, include_links)),
        )
        .await;

        let mut statuses = Vec::with_capacity(results.len());
        for (router, result) in routers.iter().zip(results) {
            match result {
                Ok(status) => statuses.push(status),
                Err(error) => {
                    self.metrics.failures.inc();
                    tracing::warn!(router = %router.router_id, host = %router.host, %error, "Failed to check router status");
                }
            }
        }
        tracing::debug!(routers = statuses.len(), include_links, "Collected router statuses");
        self.tx.send_replace(Arc::new(statuses));
    }
}

// === impl RouterStatusMetrics ===

impl RouterStatusMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let polls = Counter::default();
        reg.register(
            "router_status_polls",
            "Count of router status collection rounds",
            polls.clone(),
        );

        let failures = Counter::default();
        reg.register(
            "router_status_failures",
            "Count of failed router status checks",
            failures.clone(),
        );

        Self { polls, failures }
    }

    pub fn failures(&self) -> u64 {
        self.failures.get()
    }
}
