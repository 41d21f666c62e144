//! Agent configuration
//!
//! Defaults come from [`wake_shared::settings`]; a handful of environment
//! variables override identity, broker and topics.

use crate::transport::{MqttSettings, TlsFiles};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;
use wake_shared::{settings, TimeSyncPolicy};

pub const ENV_THING_NAME: &str = "WAKE_AGENT_THING_NAME";
pub const ENV_BROKER_HOST: &str = "WAKE_AGENT_BROKER_HOST";
pub const ENV_BROKER_PORT: &str = "WAKE_AGENT_BROKER_PORT";
pub const ENV_COMMAND_TOPIC: &str = "WAKE_AGENT_COMMAND_TOPIC";
pub const ENV_SHADOW_TOPIC: &str = "WAKE_AGENT_SHADOW_TOPIC";
pub const ENV_CA_PATH: &str = "WAKE_AGENT_CA_PATH";
pub const ENV_CERT_PATH: &str = "WAKE_AGENT_CERT_PATH";
pub const ENV_KEY_PATH: &str = "WAKE_AGENT_KEY_PATH";
pub const ENV_BROADCAST: &str = "WAKE_AGENT_BROADCAST";
pub const ENV_INTERFACE: &str = "WAKE_AGENT_INTERFACE";

const DEFAULT_THING_NAME: &str = "wake-agent";
const MQTT_TLS_PORT: u16 = 8883;

pub fn command_topic(thing: &str) -> String {
    format!("wake/{}/command", thing)
}

pub fn shadow_topic(thing: &str) -> String {
    format!("$aws/things/{}/shadow/update", thing)
}

/// Everything the agent needs to start
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Device identity; also the MQTT client id
    pub thing_name: String,
    pub mqtt: MqttSettings,
    pub command_topic: String,
    pub shadow_topic: String,
    /// Magic packet destination; the link's broadcast address when unset
    pub broadcast: Option<Ipv4Addr>,
    /// Watch only this interface instead of the first addressed one
    pub interface: Option<String>,
    /// Probe attempts after a wake with verification
    pub verify_attempts: u32,
    pub shadow_interval: Duration,
    pub shadow_retry: Duration,
    pub restart_after: Duration,
    pub time_policy: TimeSyncPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            thing_name: DEFAULT_THING_NAME.into(),
            mqtt: MqttSettings {
                client_id: DEFAULT_THING_NAME.into(),
                ..Default::default()
            },
            command_topic: command_topic(DEFAULT_THING_NAME),
            shadow_topic: shadow_topic(DEFAULT_THING_NAME),
            broadcast: None,
            interface: None,
            verify_attempts: settings::PROBE_MAX_ATTEMPTS,
            shadow_interval: Duration::from_millis(settings::SHADOW_INTERVAL_MS),
            shadow_retry: Duration::from_millis(settings::SHADOW_RETRY_DELAY_MS),
            restart_after: Duration::from_secs(settings::SCHEDULED_RESTART_SECS),
            time_policy: TimeSyncPolicy::EveryLink,
        }
    }
}

impl AgentConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides taken from `lookup`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();

        if let Some(thing) = get(ENV_THING_NAME) {
            config.command_topic = command_topic(&thing);
            config.shadow_topic = shadow_topic(&thing);
            config.mqtt.client_id = thing.clone();
            config.thing_name = thing;
        }

        if let Some(host) = get(ENV_BROKER_HOST) {
            config.mqtt.host = host;
        }
        if let Some(topic) = get(ENV_COMMAND_TOPIC) {
            config.command_topic = topic;
        }
        if let Some(topic) = get(ENV_SHADOW_TOPIC) {
            config.shadow_topic = topic;
        }

        match (get(ENV_CA_PATH), get(ENV_CERT_PATH), get(ENV_KEY_PATH)) {
            (Some(ca), Some(cert), Some(key)) => {
                config.mqtt.tls = Some(TlsFiles {
                    ca: PathBuf::from(ca),
                    cert: PathBuf::from(cert),
                    key: PathBuf::from(key),
                });
                config.mqtt.port = MQTT_TLS_PORT;
            }
            (None, None, None) => {}
            _ => warn!(
                "TLS needs all of {}, {} and {}; connecting without TLS",
                ENV_CA_PATH, ENV_CERT_PATH, ENV_KEY_PATH
            ),
        }

        if let Some(port) = get(ENV_BROKER_PORT) {
            match port.parse::<u16>() {
                Ok(port) if port > 0 => config.mqtt.port = port,
                _ => warn!("Invalid {}={:?}, keeping {}", ENV_BROKER_PORT, port, config.mqtt.port),
            }
        }

        config.interface = get(ENV_INTERFACE);

        if let Some(addr) = get(ENV_BROADCAST) {
            match addr.parse::<Ipv4Addr>() {
                Ok(addr) => config.broadcast = Some(addr),
                Err(_) => warn!("Invalid {}={:?}, using the link broadcast", ENV_BROADCAST, addr),
            }
        }

        config
    }
}
