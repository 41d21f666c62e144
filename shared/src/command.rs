//! Inbound command documents
//!
//! A command is a JSON object with an integer `id` selecting its shape:
//! ```text
//! { "id": 1, "MAC": "..", "port": 9, "retrieveStatus": true, "channel": "..", "ip": "..",
//!   "secureOn": true, "secureOnPassword": ".." }
//! { "id": 2, "channel": "..", "device": { "MAC": "..", "IP": ".." } }
//! ```
//! `topic` is accepted wherever `channel` is.

use crate::codec::CodecError;
use crate::mac::{MacAddress, SecureOnPassword};
use crate::settings;
use serde::Deserialize;
use serde_json::Value;
use std::net::IpAddr;

/// Wake a host, optionally verifying it came up
pub const CMD_WAKE: i64 = 1;

/// Probe a host once and report the result
pub const CMD_STATUS: i64 = 2;

/// A validated inbound command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Wake(WakeRequest),
    Status(StatusRequest),
    /// Well-formed document with an id this agent does not handle
    Unknown(i64),
}

/// Parameters of a wake command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeRequest {
    pub mac: MacAddress,
    pub port: u16,
    pub verify: Option<Verification>,
    pub secure_on: Option<SecureOnPassword>,
}

/// Post-wake reachability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub topic: String,
    pub ip: IpAddr,
}

/// Parameters of a status command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRequest {
    pub topic: String,
    pub mac: MacAddress,
    pub ip: IpAddr,
}

#[derive(Debug, Deserialize)]
struct RawCommand {
    #[serde(rename = "MAC")]
    mac: Option<String>,
    port: Option<u16>,
    #[serde(rename = "retrieveStatus")]
    retrieve_status: Option<bool>,
    channel: Option<String>,
    topic: Option<String>,
    ip: Option<String>,
    #[serde(rename = "secureOn")]
    secure_on: Option<bool>,
    #[serde(rename = "secureOnPassword")]
    secure_on_password: Option<String>,
    device: Option<RawDevice>,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    #[serde(rename = "MAC")]
    mac: Option<String>,
    #[serde(rename = "IP")]
    ip: Option<String>,
}

impl RawCommand {
    fn result_topic(&mut self) -> Option<String> {
        self.topic.take().or_else(|| self.channel.take())
    }
}

fn parse_mac(value: &str) -> Result<MacAddress, CodecError> {
    value.parse().map_err(|_| CodecError::InvalidField {
        field: "MAC",
        value: value.to_string(),
    })
}

fn parse_ip(field: &'static str, value: &str) -> Result<IpAddr, CodecError> {
    value.trim().parse().map_err(|_| CodecError::InvalidField {
        field,
        value: value.to_string(),
    })
}

impl Command {
    /// Validate a decoded JSON document
    pub fn from_value(value: Value) -> Result<Self, CodecError> {
        let obj = value.as_object().ok_or(CodecError::NotAnObject)?;
        let id = obj
            .get("id")
            .and_then(Value::as_i64)
            .ok_or(CodecError::MissingId)?;

        match id {
            CMD_WAKE => {
                let raw: RawCommand = serde_json::from_value(value)?;
                Self::wake_from_raw(raw).map(Command::Wake)
            }
            CMD_STATUS => {
                let raw: RawCommand = serde_json::from_value(value)?;
                Self::status_from_raw(raw).map(Command::Status)
            }
            other => Ok(Command::Unknown(other)),
        }
    }

    fn wake_from_raw(mut raw: RawCommand) -> Result<WakeRequest, CodecError> {
        let mac = raw.mac.take().ok_or(CodecError::MissingField {
            id: CMD_WAKE,
            field: "MAC",
        })?;
        let mac = parse_mac(&mac)?;

        // Verification needs the full triple; a partial one is ignored.
        let topic = raw.result_topic();
        let verify = match (raw.retrieve_status, topic, raw.ip.take()) {
            (Some(true), Some(topic), Some(ip)) => Some(Verification {
                topic,
                ip: parse_ip("ip", &ip)?,
            }),
            _ => None,
        };

        let secure_on = match (raw.secure_on, raw.secure_on_password.as_deref()) {
            (Some(true), Some(pw)) => Some(pw.parse().map_err(|_| CodecError::InvalidField {
                field: "secureOnPassword",
                value: "<redacted>".into(),
            })?),
            _ => None,
        };

        Ok(WakeRequest {
            mac,
            port: raw.port.unwrap_or(settings::DEFAULT_WAKE_PORT),
            verify,
            secure_on,
        })
    }

    fn status_from_raw(mut raw: RawCommand) -> Result<StatusRequest, CodecError> {
        let missing = |field| CodecError::MissingField {
            id: CMD_STATUS,
            field,
        };

        let topic = raw.result_topic().ok_or_else(|| missing("channel"))?;
        let device = raw.device.take().ok_or_else(|| missing("device"))?;
        let mac = device.mac.ok_or_else(|| missing("device.MAC"))?;
        let ip = device.ip.ok_or_else(|| missing("device.IP"))?;

        Ok(StatusRequest {
            topic,
            mac: parse_mac(&mac)?,
            ip: parse_ip("device.IP", &ip)?,
        })
    }
}
