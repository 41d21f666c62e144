//! Outbound report scheduling
//!
//! Reports are drained one slot per main-loop iteration while the channel is
//! ready. A failed publish is retried after a fixed delay with no attempt cap.

use crate::connection::ConnectionStatus;
use crate::queue::{BoundedRetryQueue, DrainOutcome, InsertOutcome, QueueConfig, WorkItem};
use crate::transport::CommandChannel;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wake_shared::codec::encode_report;
use wake_shared::{settings, CodecError, MacAddress, ProbeReport, ShadowReport};

/// One report waiting to be published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportItem {
    pub topic: String,
    pub payload: String,
}

impl ReportItem {
    /// `{"MAC":..,"pingResult":..}` for the requester's topic
    pub fn probe_result(
        topic: impl Into<String>,
        mac: MacAddress,
        reachable: bool,
    ) -> Result<Self, CodecError> {
        let payload = encode_report(&ProbeReport {
            mac,
            ping_result: reachable,
        })?;
        Ok(Self {
            topic: topic.into(),
            payload,
        })
    }

    pub fn shadow(topic: impl Into<String>, report: &ShadowReport) -> Result<Self, CodecError> {
        Ok(Self {
            topic: topic.into(),
            payload: encode_report(report)?,
        })
    }
}

// No dedup, unbounded retries.
impl WorkItem for ReportItem {}

/// Report queue plus its drain policy
#[derive(Debug, Clone)]
pub struct ReportScheduler {
    queue: Arc<BoundedRetryQueue<ReportItem>>,
}

impl Default for ReportScheduler {
    fn default() -> Self {
        Self::with_config(QueueConfig {
            name: "REPORT",
            capacity: settings::REPORT_QUEUE_CAPACITY,
            retry_delay: Duration::from_millis(settings::REPORT_RETRY_DELAY_MS),
            full_backoff: Duration::from_millis(settings::QUEUE_FULL_BACKOFF_MS),
        })
    }
}

impl ReportScheduler {
    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            queue: Arc::new(BoundedRetryQueue::new(config)),
        }
    }

    /// Queue a report, waiting while the queue is full
    pub async fn enqueue(&self, item: ReportItem) -> InsertOutcome {
        debug!("[REPORT] queueing report for {}", item.topic);
        self.queue.insert(item).await
    }

    /// Queue a report unless the queue is full
    pub async fn try_enqueue(&self, item: ReportItem) -> InsertOutcome {
        self.queue.try_insert(item).await
    }

    #[cfg(test)]
    pub async fn pending(&self) -> usize {
        self.queue.busy_count().await
    }

    /// Publish the report at the cursor if it is due
    ///
    /// Returns `None` without touching the queue while the channel is not ready.
    pub async fn drain_step(
        &self,
        status: &ConnectionStatus,
        channel: &dyn CommandChannel,
    ) -> Option<DrainOutcome<ReportItem>> {
        if !status.is_channel_ready() {
            return None;
        }

        let outcome = self
            .queue
            .drain_step(Instant::now(), |item| async move {
                match channel.publish(&item.topic, item.payload.as_bytes()).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("[REPORT] publish to {} failed: {:#}", item.topic, e);
                        false
                    }
                }
            })
            .await;

        match &outcome {
            DrainOutcome::Succeeded(item) => {
                info!("[REPORT] published {} -> {}", item.payload, item.topic)
            }
            DrainOutcome::Rescheduled { .. } => debug!(
                "[REPORT] retrying in {}ms",
                settings::REPORT_RETRY_DELAY_MS
            ),
            _ => {}
        }

        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChannel;
    use std::sync::atomic::Ordering;
    use tokio::sync::watch;
    use wake_shared::ConnectionState;

    fn ready() -> (watch::Sender<ConnectionState>, ConnectionStatus) {
        let (tx, rx) = watch::channel(ConnectionState::ChannelConnected);
        (tx, ConnectionStatus::new(rx))
    }

    fn mac() -> MacAddress {
        "AA:BB:CC:DD:EE:FF".parse().unwrap()
    }

    #[test]
    fn test_probe_result_payload() {
        let item = ReportItem::probe_result("t1", mac(), true).unwrap();
        assert_eq!(item.topic, "t1");
        assert_eq!(item.payload, r#"{"MAC":"AA:BB:CC:DD:EE:FF","pingResult":true}"#);
    }

    #[tokio::test]
    async fn test_no_drain_while_channel_not_ready() {
        let reports = ReportScheduler::default();
        let channel = MockChannel::connected();
        let (tx, status) = ready();
        tx.send_replace(ConnectionState::LinkUp);

        reports
            .try_enqueue(ReportItem::probe_result("t1", mac(), false).unwrap())
            .await;

        assert!(reports.drain_step(&status, &channel).await.is_none());
        assert_eq!(reports.pending().await, 1);
        assert!(channel.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_retried_after_repeated_failures() {
        let reports = ReportScheduler::default();
        let channel = MockChannel::connected();
        let (_tx, status) = ready();
        const FAILURES: u32 = 5;
        channel.publish_failures.store(FAILURES, Ordering::SeqCst);

        let item = ReportItem::probe_result("t1", mac(), true).unwrap();
        reports.try_enqueue(item.clone()).await;

        let mut failures = 0;
        let published = loop {
            match reports.drain_step(&status, &channel).await.unwrap() {
                DrainOutcome::Rescheduled { remaining } => {
                    assert_eq!(remaining, None);
                    failures += 1;
                }
                DrainOutcome::Succeeded(item) => break item,
                DrainOutcome::NotDue | DrainOutcome::Empty => {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        };

        assert_eq!(failures, FAILURES);
        assert_eq!(published, item);
        assert_eq!(channel.published(), vec![(item.topic, item.payload)]);
        assert_eq!(reports.pending().await, 0);
    }
}
