//! Connection State Machine
//!
//! Tracks the link and the command channel:
//! ```text
//! Disconnected --link up--> LinkUp --channel connected--> ChannelConnected
//!      ^                      ^  |                              |
//!      |                      |  +--------channel lost----------+
//!      +------ link lost (from any state) ----------------------+
//! ```
//! The channel may only be attempted once local time is established.

/// Connectivity of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    LinkUp,
    ChannelConnected,
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Link associated and addressed
    LinkConnected,
    /// Local clock synchronized
    TimeEstablished,
    /// Channel session opened and command topic subscribed
    ChannelConnected,
    /// Channel session dropped while the link stayed up
    ChannelLost,
    /// Link dropped
    LinkLost,
}

/// When time has to be synchronized again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeSyncPolicy {
    /// Re-sync after every link recovery
    #[default]
    EveryLink,
    /// Sync once per process lifetime
    Once,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid; carries the resulting state
    Success(ConnectionState),
    /// Transition was invalid from current state
    Invalid {
        from: ConnectionState,
        event: ConnectionEvent,
    },
    /// Link lost: the link layer must be asked to reconnect
    LinkLost {
        from: ConnectionState,
        time_cleared: bool,
    },
}

#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    current_state: ConnectionState,
    time_established: bool,
    policy: TimeSyncPolicy,
}

impl ConnectionStateMachine {
    /// Create a new state machine in Disconnected state
    pub fn new(policy: TimeSyncPolicy) -> Self {
        Self {
            current_state: ConnectionState::Disconnected,
            time_established: false,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.current_state
    }

    pub fn is_time_established(&self) -> bool {
        self.time_established
    }

    pub fn is_channel_ready(&self) -> bool {
        self.current_state == ConnectionState::ChannelConnected
    }

    /// Whether a channel connect attempt is allowed right now
    pub fn can_attempt_channel(&self) -> bool {
        self.current_state == ConnectionState::LinkUp && self.time_established
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: ConnectionEvent) -> TransitionResult {
        use ConnectionEvent as E;
        use ConnectionState as S;

        let from = self.current_state;

        if event == E::LinkLost {
            self.current_state = S::Disconnected;
            let time_cleared = self.policy == TimeSyncPolicy::EveryLink && self.time_established;
            if time_cleared {
                self.time_established = false;
            }
            return TransitionResult::LinkLost { from, time_cleared };
        }

        let next = match (from, event) {
            (S::Disconnected | S::LinkUp, E::LinkConnected) => Some(S::LinkUp),
            (S::ChannelConnected, E::LinkConnected) => Some(S::ChannelConnected),

            (S::LinkUp | S::ChannelConnected, E::TimeEstablished) => {
                self.time_established = true;
                Some(from)
            }

            (S::LinkUp, E::ChannelConnected) if self.time_established => {
                Some(S::ChannelConnected)
            }

            (S::ChannelConnected | S::LinkUp, E::ChannelLost) => Some(S::LinkUp),

            _ => None,
        };

        match next {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid { from, event },
        }
    }
}
