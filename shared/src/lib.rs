//! Wake Agent Shared Types
//!
//! This crate provides the command and report types, the JSON codec, the
//! connection state machine and the tuning constants shared by the wake agent
//! and its tests.

pub mod codec;
pub mod command;
pub mod mac;
pub mod report;
pub mod state_machine;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types at crate root
pub use codec::CodecError;
pub use command::{Command, StatusRequest, Verification, WakeRequest, CMD_STATUS, CMD_WAKE};
pub use mac::{MacAddress, MacParseError, SecureOnPassword};
pub use report::{ProbeReport, ShadowReport};
pub use state_machine::{
    ConnectionEvent, ConnectionState, ConnectionStateMachine, TimeSyncPolicy, TransitionResult,
};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Tuning constants for the agent
pub mod settings {
    /// Probe attempts for a post-wake verification (12 x 10s == 2 minutes)
    pub const PROBE_MAX_ATTEMPTS: u32 = 12;

    /// Spacing between two probes of the same target
    pub const PROBE_RETRY_DELAY_MS: u64 = 10_000;

    /// Delay before a failed report publish is tried again
    pub const REPORT_RETRY_DELAY_MS: u64 = 5_000;

    /// Sleep between two insert attempts on a full queue
    pub const QUEUE_FULL_BACKOFF_MS: u64 = 5_000;

    /// Delay between two channel connect attempts
    pub const CHANNEL_RETRY_DELAY_MS: u64 = 5_000;

    /// Shadow report interval (90 minutes)
    pub const SHADOW_INTERVAL_MS: u64 = 900_000 * 6;

    /// Shadow report retry when it could not be queued
    pub const SHADOW_RETRY_DELAY_MS: u64 = 10_000;

    /// Slots in the probe queue
    pub const PROBE_QUEUE_CAPACITY: usize = 8;

    /// Slots in the report queue
    pub const REPORT_QUEUE_CAPACITY: usize = 12;

    /// Largest serialized report accepted into the report queue
    pub const MAX_REPORT_PAYLOAD: usize = 256;

    /// Largest inbound command document
    pub const MAX_COMMAND_SIZE: usize = 2048;

    /// Default UDP port for magic packets
    pub const DEFAULT_WAKE_PORT: u16 = 9;

    /// How many times each magic packet is sent (at least 1)
    pub const MAGIC_PACKET_REPEAT: u32 = 3;

    /// Delay between two repeated magic packets
    pub const MAGIC_PACKET_REPEAT_DELAY_MS: u64 = 100;

    /// Uptime after which the agent restarts itself (7 days)
    pub const SCHEDULED_RESTART_SECS: u64 = 86_400 * 7;

    /// Clock values before this instant (2024-01-01T00:00:00Z) mean time is not set yet
    pub const TIME_SANITY_EPOCH_SECS: u64 = 1_704_067_200;

    /// Per-port timeout of a reachability probe
    pub const PROBE_CONNECT_TIMEOUT_MS: u64 = 1_000;

    /// Main control loop period
    pub const CONTROL_LOOP_INTERVAL_MS: u64 = 100;
}
