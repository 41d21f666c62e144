//! Outbound report documents

use crate::mac::MacAddress;
use serde::Serialize;

/// Result of a reachability check, published to the requester's topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    #[serde(rename = "MAC")]
    pub mac: MacAddress,
    #[serde(rename = "pingResult")]
    pub ping_result: bool,
}

/// Device shadow update: `{"state":{"reported":{...}}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShadowReport {
    pub state: ShadowState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShadowState {
    pub reported: DeviceTelemetry,
}

/// Self-telemetry of the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceTelemetry {
    /// `<network address>/<prefix length>` of the active link
    pub network_id: String,
    /// Available memory in bytes
    pub free_memory: u64,
    /// Seconds since the agent started
    pub up_time: u64,
}

impl ShadowReport {
    pub fn new(network_id: impl Into<String>, free_memory: u64, up_time: u64) -> Self {
        Self {
            state: ShadowState {
                reported: DeviceTelemetry {
                    network_id: network_id.into(),
                    free_memory,
                    up_time,
                },
            },
        }
    }
}
