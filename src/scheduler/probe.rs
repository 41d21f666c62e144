//! Reachability probe scheduling
//!
//! One long-lived task drains the probe queue. It parks on the queue's
//! notification while the queue is idle and sleeps until the earliest retry
//! while every queued probe is waiting out its spacing.

use super::report::{ReportItem, ReportScheduler};
use crate::queue::{BoundedRetryQueue, DrainOutcome, InsertOutcome, QueueConfig, WorkItem};
use crate::transport::Prober;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wake_shared::{settings, MacAddress};

/// A reachability check waiting for its next attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeItem {
    pub mac: MacAddress,
    pub ip: IpAddr,
    /// Where the final result is reported
    pub topic: String,
    pub attempts: u32,
}

impl ProbeItem {
    pub fn new(mac: MacAddress, ip: IpAddr, topic: impl Into<String>, attempts: u32) -> Self {
        Self {
            mac,
            ip,
            topic: topic.into(),
            attempts,
        }
    }
}

impl WorkItem for ProbeItem {
    fn is_duplicate_of(&self, other: &Self) -> bool {
        self.ip == other.ip
    }

    fn attempt_budget(&self) -> Option<u32> {
        Some(self.attempts)
    }
}

/// Probe queue, the prober it drives and the report queue it feeds
#[derive(Clone)]
pub struct ProbeScheduler {
    queue: Arc<BoundedRetryQueue<ProbeItem>>,
    prober: Arc<dyn Prober>,
    reports: ReportScheduler,
}

impl ProbeScheduler {
    pub fn new(prober: Arc<dyn Prober>, reports: ReportScheduler) -> Self {
        Self::with_config(
            QueueConfig {
                name: "PROBE",
                capacity: settings::PROBE_QUEUE_CAPACITY,
                retry_delay: Duration::from_millis(settings::PROBE_RETRY_DELAY_MS),
                full_backoff: Duration::from_millis(settings::QUEUE_FULL_BACKOFF_MS),
            },
            prober,
            reports,
        )
    }

    pub fn with_config(
        config: QueueConfig,
        prober: Arc<dyn Prober>,
        reports: ReportScheduler,
    ) -> Self {
        Self {
            queue: Arc::new(BoundedRetryQueue::new(config)),
            prober,
            reports,
        }
    }

    /// Queue a probe, waiting while the queue is full
    pub async fn enqueue(&self, item: ProbeItem) -> InsertOutcome {
        let outcome = self.queue.insert(item.clone()).await;
        match outcome {
            InsertOutcome::DuplicateIgnored => {
                info!("[PROBE] {} already being probed, ignoring", item.ip)
            }
            _ => debug!(
                "[PROBE] queued {} ({}) with {} attempt(s)",
                item.ip, item.mac, item.attempts
            ),
        }
        outcome
    }

    #[cfg(test)]
    pub async fn try_enqueue(&self, item: ProbeItem) -> InsertOutcome {
        self.queue.try_insert(item).await
    }

    #[cfg(test)]
    pub async fn pending(&self) -> usize {
        self.queue.busy_count().await
    }

    /// Spawn the drain loop
    pub fn start(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run().await })
    }

    async fn run(&self) {
        info!("[PROBE] scheduler started");
        loop {
            self.wait_until_due().await;

            let capacity = self.queue.capacity().await;
            for _ in 0..capacity {
                let outcome = self
                    .queue
                    .drain_step(Instant::now(), |item| self.probe_once(item))
                    .await;
                self.handle_outcome(outcome);
            }
        }
    }

    /// Return once some slot may be due
    async fn wait_until_due(&self) {
        loop {
            if self.queue.is_idle().await {
                debug!("[PROBE] queue empty, suspending");
                self.queue.wait_for_work().await;
                continue;
            }

            match self.queue.next_due().await {
                Some(due) if due > Instant::now() => {
                    // A fresh insert is due immediately.
                    tokio::select! {
                        _ = tokio::time::sleep_until(due) => return,
                        _ = self.queue.wait_for_work() => return,
                    }
                }
                Some(_) => return,
                // Everything queued is in flight.
                None => self.queue.wait_for_work().await,
            }
        }
    }

    async fn probe_once(&self, item: ProbeItem) -> bool {
        match self.prober.probe(item.ip).await {
            Ok(reachable) => {
                debug!("[PROBE] {} reachable={}", item.ip, reachable);
                reachable
            }
            Err(e) => {
                warn!("[PROBE] probe of {} failed: {:#}", item.ip, e);
                false
            }
        }
    }

    fn handle_outcome(&self, outcome: DrainOutcome<ProbeItem>) {
        let (item, reachable) = match outcome {
            DrainOutcome::Succeeded(item) => (item, true),
            DrainOutcome::Exhausted(item) => (item, false),
            DrainOutcome::Rescheduled { remaining } => {
                debug!("[PROBE] no answer, {:?} attempt(s) left", remaining);
                return;
            }
            _ => return,
        };

        info!(
            "[PROBE] {} ({}) resolved: reachable={}",
            item.ip, item.mac, reachable
        );

        let report = match ReportItem::probe_result(item.topic, item.mac, reachable) {
            Ok(report) => report,
            Err(e) => {
                warn!("[PROBE] dropping result for {}: {}", item.ip, e);
                return;
            }
        };

        // Handed off so a full report queue never stalls probing.
        let reports = self.reports.clone();
        tokio::spawn(async move {
            reports.enqueue(report).await;
        });
    }
}
