//! Capability traits for the collaborators the agent drives

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::net::IpAddr;
use wake_shared::{MacAddress, SecureOnPassword};

/// A message received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Secured publish/subscribe session carrying commands and reports
///
/// Inbound messages are not part of the trait: each implementation hands out
/// an mpsc receiver when it is constructed.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Open the session; resolves once the broker accepted it
    async fn connect(&self) -> Result<()>;

    /// Subscribe to a topic on the open session
    async fn subscribe(&self, topic: &str) -> Result<()>;

    async fn unsubscribe(&self, topic: &str) -> Result<()>;

    /// Hand a payload to the session for delivery
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;

    /// Close the session
    async fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Human-readable name for this channel
    fn name(&self) -> &'static str;
}

/// The single network link of the device
#[async_trait]
pub trait Link: Send + Sync {
    /// Associated and addressed
    fn is_connected(&self) -> bool;

    /// Ask the link layer to bring the link back
    async fn reconnect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// `<network address>/<prefix length>` of the link, if addressed
    fn network_id(&self) -> Option<String>;
}

/// Wake-on-LAN primitive
#[async_trait]
pub trait WakeSender: Send + Sync {
    /// Send a magic packet; `Ok(false)` means nothing went out
    async fn send_wake(
        &self,
        mac: MacAddress,
        port: u16,
        secure_on: Option<SecureOnPassword>,
    ) -> Result<bool>;
}

/// Reachability primitive: one round trip to `address`
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, address: IpAddr) -> Result<bool>;
}

/// Local time establishment
#[async_trait]
pub trait TimeSync: Send + Sync {
    /// Succeeds once wall-clock time can be trusted
    async fn sync(&self) -> Result<()>;
}
