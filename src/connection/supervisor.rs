//! Connection supervisor: keeps the link, wall-clock time and command channel up

use crate::transport::{CommandChannel, Link, TimeSync};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use wake_shared::{
    settings, ConnectionEvent, ConnectionState, ConnectionStateMachine, TimeSyncPolicy,
    TransitionResult,
};

/// Read-only view of the supervisor's state
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    rx: watch::Receiver<ConnectionState>,
}

impl ConnectionStatus {
    pub fn new(rx: watch::Receiver<ConnectionState>) -> Self {
        Self { rx }
    }

    pub fn state(&self) -> ConnectionState {
        *self.rx.borrow()
    }

    /// Session open and command topic subscribed
    pub fn is_channel_ready(&self) -> bool {
        self.state() == ConnectionState::ChannelConnected
    }
}

/// Supervisor timing and identity
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub command_topic: String,
    /// Spacing of channel, time sync and link reconnect attempts
    pub retry_delay: Duration,
    /// How often [`ConnectionSupervisor::run`] polls
    pub poll_interval: Duration,
    pub time_policy: TimeSyncPolicy,
}

impl SupervisorConfig {
    pub fn new(command_topic: impl Into<String>) -> Self {
        Self {
            command_topic: command_topic.into(),
            retry_delay: Duration::from_millis(settings::CHANNEL_RETRY_DELAY_MS),
            poll_interval: Duration::from_millis(settings::CONTROL_LOOP_INTERVAL_MS),
            time_policy: TimeSyncPolicy::default(),
        }
    }
}

pub struct ConnectionSupervisor {
    config: SupervisorConfig,
    fsm: ConnectionStateMachine,
    link: Arc<dyn Link>,
    channel: Arc<dyn CommandChannel>,
    clock: Arc<dyn TimeSync>,
    state_tx: watch::Sender<ConnectionState>,
    next_channel_attempt: Instant,
    next_time_attempt: Instant,
    next_link_attempt: Instant,
}

impl ConnectionSupervisor {
    pub fn new(
        config: SupervisorConfig,
        link: Arc<dyn Link>,
        channel: Arc<dyn CommandChannel>,
        clock: Arc<dyn TimeSync>,
    ) -> Self {
        let fsm = ConnectionStateMachine::new(config.time_policy);
        let (state_tx, _) = watch::channel(fsm.state());
        let now = Instant::now();

        Self {
            config,
            fsm,
            link,
            channel,
            clock,
            state_tx,
            next_channel_attempt: now,
            next_time_attempt: now,
            next_link_attempt: now,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::new(self.state_tx.subscribe())
    }

    #[cfg(test)]
    pub fn state(&self) -> ConnectionState {
        self.fsm.state()
    }

    #[cfg(test)]
    pub fn is_time_established(&self) -> bool {
        self.fsm.is_time_established()
    }

    /// Poll forever
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            "[CONN] supervisor started (time policy {:?})",
            self.config.time_policy
        );
        loop {
            ticker.tick().await;
            self.step(Instant::now()).await;
        }
    }

    /// Observe the link and channel once and advance the state machine
    pub async fn step(&mut self, now: Instant) -> ConnectionState {
        if !self.link.is_connected() {
            if self.fsm.state() != ConnectionState::Disconnected {
                self.on_link_lost(now).await;
            } else if now >= self.next_link_attempt {
                self.request_link(now).await;
            }
            return self.publish();
        }

        if self.fsm.state() == ConnectionState::Disconnected {
            self.apply(ConnectionEvent::LinkConnected);
            info!(
                "[CONN] link up ({})",
                self.link.network_id().unwrap_or_else(|| "unaddressed".into())
            );
            self.next_channel_attempt = now;
            if !self.fsm.is_time_established() {
                self.establish_time(now).await;
            }
            return self.publish();
        }

        if self.fsm.is_channel_ready() {
            if !self.channel.is_connected() {
                warn!("[CONN] {} session lost", self.channel.name());
                self.apply(ConnectionEvent::ChannelLost);
                self.next_channel_attempt = now;
            }
        } else if self.fsm.can_attempt_channel() {
            if now >= self.next_channel_attempt {
                self.open_channel(now).await;
            }
        } else if now >= self.next_time_attempt {
            self.establish_time(now).await;
        }

        self.publish()
    }

    fn publish(&self) -> ConnectionState {
        let state = self.fsm.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        state
    }

    fn apply(&mut self, event: ConnectionEvent) {
        match self.fsm.process_event(event) {
            TransitionResult::Success(state) => debug!("[CONN] {:?} -> {:?}", event, state),
            TransitionResult::Invalid { from, event } => {
                error!("[CONN] invalid transition {:?} in {:?}", event, from)
            }
            TransitionResult::LinkLost { from, time_cleared } => info!(
                "[CONN] link lost in {:?}{}",
                from,
                if time_cleared { ", time must be re-established" } else { "" }
            ),
        }
    }

    async fn establish_time(&mut self, now: Instant) {
        match self.clock.sync().await {
            Ok(()) => self.apply(ConnectionEvent::TimeEstablished),
            Err(e) => {
                warn!("[CONN] time sync failed: {:#}", e);
                self.next_time_attempt = now + self.config.retry_delay;
            }
        }
    }

    /// Connect and subscribe; either failure retries the whole attempt later
    async fn open_channel(&mut self, now: Instant) {
        let name = self.channel.name();

        if let Err(e) = self.channel.connect().await {
            warn!("[CONN] {} connect failed: {:#}", name, e);
            self.next_channel_attempt = now + self.config.retry_delay;
            return;
        }

        if let Err(e) = self.channel.subscribe(&self.config.command_topic).await {
            warn!(
                "[CONN] {} subscribe to {} failed: {:#}",
                name, self.config.command_topic, e
            );
            if let Err(e) = self.channel.disconnect().await {
                debug!("[CONN] {} disconnect after failed subscribe: {:#}", name, e);
            }
            self.next_channel_attempt = now + self.config.retry_delay;
            return;
        }

        self.apply(ConnectionEvent::ChannelConnected);
        info!(
            "[CONN] {} connected, subscribed to {}",
            name, self.config.command_topic
        );
    }

    async fn on_link_lost(&mut self, now: Instant) {
        if self.channel.is_connected() {
            if let Err(e) = self.channel.disconnect().await {
                debug!("[CONN] channel disconnect on link loss: {:#}", e);
            }
        }
        self.apply(ConnectionEvent::LinkLost);
        self.request_link(now).await;
    }

    async fn request_link(&mut self, now: Instant) {
        if let Err(e) = self.link.reconnect().await {
            warn!("[CONN] link reconnect request failed: {:#}", e);
        }
        self.next_link_attempt = now + self.config.retry_delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockChannel, MockLink, MockTimeSync};
    use std::sync::atomic::Ordering;

    struct Rig {
        link: Arc<MockLink>,
        channel: Arc<MockChannel>,
        clock: Arc<MockTimeSync>,
        supervisor: ConnectionSupervisor,
    }

    fn rig(policy: TimeSyncPolicy) -> Rig {
        let link = Arc::new(MockLink::up());
        let channel = Arc::new(MockChannel::default());
        let clock = Arc::new(MockTimeSync::default());
        let config = SupervisorConfig {
            time_policy: policy,
            ..SupervisorConfig::new("wake/agent/command")
        };
        let supervisor =
            ConnectionSupervisor::new(config, link.clone(), channel.clone(), clock.clone());
        Rig {
            link,
            channel,
            clock,
            supervisor,
        }
    }

    #[tokio::test]
    async fn test_repeated_subscribe_failure_stays_link_up() {
        let mut rig = rig(TimeSyncPolicy::EveryLink);
        rig.channel.fail_subscribe.store(true, Ordering::SeqCst);
        let t0 = Instant::now();
        let delay = Duration::from_millis(settings::CHANNEL_RETRY_DELAY_MS);

        assert_eq!(rig.supervisor.step(t0).await, ConnectionState::LinkUp);
        assert!(rig.supervisor.is_time_established());

        assert_eq!(rig.supervisor.step(t0).await, ConnectionState::LinkUp);
        assert_eq!(rig.channel.connect_calls.load(Ordering::SeqCst), 1);

        // Not retried before the delay elapses.
        rig.supervisor.step(t0 + delay / 2).await;
        assert_eq!(rig.channel.connect_calls.load(Ordering::SeqCst), 1);

        assert_eq!(rig.supervisor.step(t0 + delay).await, ConnectionState::LinkUp);
        assert_eq!(rig.channel.connect_calls.load(Ordering::SeqCst), 2);
        assert!(rig.channel.subscriptions().is_empty());
        assert!(!rig.supervisor.status().is_channel_ready());
    }

    #[tokio::test]
    async fn test_success_connects_and_resubscribes_after_loss() {
        let mut rig = rig(TimeSyncPolicy::EveryLink);
        let status = rig.supervisor.status();
        let t0 = Instant::now();

        rig.supervisor.step(t0).await;
        assert_eq!(
            rig.supervisor.step(t0).await,
            ConnectionState::ChannelConnected
        );
        assert!(status.is_channel_ready());
        assert_eq!(rig.channel.subscriptions(), vec!["wake/agent/command"]);

        rig.channel.drop_session();
        assert_eq!(rig.supervisor.step(t0).await, ConnectionState::LinkUp);
        assert!(!status.is_channel_ready());

        assert_eq!(
            rig.supervisor.step(t0).await,
            ConnectionState::ChannelConnected
        );
        assert_eq!(rig.channel.subscriptions().len(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_recovers_after_failures() {
        let mut rig = rig(TimeSyncPolicy::EveryLink);
        rig.channel.fail_subscribe.store(true, Ordering::SeqCst);
        let t0 = Instant::now();
        let delay = Duration::from_millis(settings::CHANNEL_RETRY_DELAY_MS);

        rig.supervisor.step(t0).await;
        rig.supervisor.step(t0).await;
        rig.supervisor.step(t0 + delay).await;
        assert_eq!(rig.supervisor.state(), ConnectionState::LinkUp);

        rig.channel.fail_subscribe.store(false, Ordering::SeqCst);
        assert_eq!(
            rig.supervisor.step(t0 + delay * 2).await,
            ConnectionState::ChannelConnected
        );
        assert_eq!(rig.channel.subscriptions(), vec!["wake/agent/command"]);
    }

    #[tokio::test]
    async fn test_channel_waits_for_time() {
        let mut rig = rig(TimeSyncPolicy::EveryLink);
        rig.clock.ok.store(false, Ordering::SeqCst);
        let t0 = Instant::now();

        rig.supervisor.step(t0).await;
        rig.supervisor.step(t0).await;
        assert_eq!(rig.supervisor.state(), ConnectionState::LinkUp);
        assert_eq!(rig.channel.connect_calls.load(Ordering::SeqCst), 0);
        // Time sync retries wait out the delay too.
        assert_eq!(rig.clock.calls.load(Ordering::SeqCst), 1);

        rig.clock.ok.store(true, Ordering::SeqCst);
        rig.supervisor.step(t0 + Duration::from_secs(5)).await;
        assert!(rig.supervisor.is_time_established());
        assert_eq!(
            rig.supervisor.step(t0 + Duration::from_secs(5)).await,
            ConnectionState::ChannelConnected
        );
    }

    #[tokio::test]
    async fn test_link_loss_requests_reconnect_and_resyncs_time() {
        let mut rig = rig(TimeSyncPolicy::EveryLink);
        let t0 = Instant::now();
        rig.supervisor.step(t0).await;
        rig.supervisor.step(t0).await;
        assert_eq!(rig.clock.calls.load(Ordering::SeqCst), 1);

        rig.link.up.store(false, Ordering::SeqCst);
        assert_eq!(
            rig.supervisor.step(t0).await,
            ConnectionState::Disconnected
        );
        assert_eq!(rig.link.reconnect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(rig.channel.disconnect_calls.load(Ordering::SeqCst), 1);
        assert!(!rig.supervisor.is_time_established());

        rig.link.up.store(true, Ordering::SeqCst);
        assert_eq!(rig.supervisor.step(t0).await, ConnectionState::LinkUp);
        assert_eq!(rig.clock.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            rig.supervisor.step(t0).await,
            ConnectionState::ChannelConnected
        );
    }

    #[tokio::test]
    async fn test_once_policy_keeps_time_across_link_loss() {
        let mut rig = rig(TimeSyncPolicy::Once);
        let t0 = Instant::now();
        rig.supervisor.step(t0).await;

        rig.link.up.store(false, Ordering::SeqCst);
        rig.supervisor.step(t0).await;
        assert!(rig.supervisor.is_time_established());

        rig.link.up.store(true, Ordering::SeqCst);
        rig.supervisor.step(t0).await;
        assert_eq!(rig.clock.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_link_reconnect_requests_are_spaced() {
        let mut rig = rig(TimeSyncPolicy::EveryLink);
        rig.link.up.store(false, Ordering::SeqCst);
        let t0 = Instant::now();

        rig.supervisor.step(t0).await;
        rig.supervisor.step(t0 + Duration::from_secs(1)).await;
        assert_eq!(rig.link.reconnect_calls.load(Ordering::SeqCst), 1);

        rig.supervisor.step(t0 + Duration::from_secs(5)).await;
        assert_eq!(rig.link.reconnect_calls.load(Ordering::SeqCst), 2);
    }
}
