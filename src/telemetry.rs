//! Periodic self-report to the device shadow

use crate::queue::InsertOutcome;
use crate::scheduler::{ReportItem, ReportScheduler};
use crate::transport::Link;
use std::time::Duration;
use sysinfo::System;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wake_shared::ShadowReport;

/// Host figures that go into a shadow report
pub trait SystemStats: Send {
    /// Bytes of memory available for new allocations
    fn free_memory(&mut self) -> u64;
}

/// [`SystemStats`] read through sysinfo
pub struct SysinfoStats {
    sys: System,
}

impl SysinfoStats {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for SysinfoStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemStats for SysinfoStats {
    fn free_memory(&mut self) -> u64 {
        self.sys.refresh_memory();
        self.sys.available_memory()
    }
}

/// Queues a shadow report every interval while the channel is up
pub struct ShadowReporter<S: SystemStats = SysinfoStats> {
    topic: String,
    interval: Duration,
    retry: Duration,
    started: Instant,
    next_due: Instant,
    stats: S,
}

impl<S: SystemStats> ShadowReporter<S> {
    /// The first report is due immediately
    pub fn new(topic: impl Into<String>, interval: Duration, retry: Duration, stats: S) -> Self {
        let now = Instant::now();
        Self {
            topic: topic.into(),
            interval,
            retry,
            started: now,
            next_due: now,
            stats,
        }
    }

    #[cfg(test)]
    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn report(&mut self, link: &dyn Link, now: Instant) -> ShadowReport {
        let network_id = link.network_id().unwrap_or_default();
        let up_time = now.saturating_duration_since(self.started).as_secs();
        ShadowReport::new(network_id, self.stats.free_memory(), up_time)
    }

    /// Queue a report if one is due
    ///
    /// Never waits on the report queue: when it is full the next attempt is
    /// moved to `now + retry`. Returns whether a report was queued.
    pub async fn tick(&mut self, now: Instant, link: &dyn Link, reports: &ReportScheduler) -> bool {
        if now < self.next_due {
            return false;
        }

        let report = self.report(link, now);
        let item = match ReportItem::shadow(self.topic.as_str(), &report) {
            Ok(item) => item,
            Err(e) => {
                warn!("[SHADOW] cannot encode report: {}", e);
                self.next_due = now + self.interval;
                return false;
            }
        };

        let payload = item.payload.clone();
        match reports.try_enqueue(item).await {
            InsertOutcome::Full => {
                warn!(
                    "[SHADOW] report queue full, retrying in {}s",
                    self.retry.as_secs()
                );
                self.next_due = now + self.retry;
                false
            }
            _ => {
                info!("[SHADOW] queued {}", payload);
                debug!("[SHADOW] next report in {}s", self.interval.as_secs());
                self.next_due = now + self.interval;
                true
            }
        }
    }
}
