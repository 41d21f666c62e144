//! Host network link
//!
//! On a host the operating system owns association and addressing, so the
//! link is "up" whenever a non-loopback IPv4 interface has an address.

use crate::transport::traits::Link;
use anyhow::Result;
use async_trait::async_trait;
use if_addrs::{IfAddr, Ifv4Addr};
use std::net::Ipv4Addr;
use tracing::{info, warn};

/// [`Link`] backed by the host's interface table
#[derive(Debug, Clone, Default)]
pub struct HostLink {
    /// Restrict to one interface name (e.g. "wlan0")
    interface: Option<String>,
}

impl HostLink {
    pub fn new(interface: Option<String>) -> Self {
        Self { interface }
    }

    fn primary_v4(&self) -> Option<Ifv4Addr> {
        let interfaces = match if_addrs::get_if_addrs() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!("[LINK] failed to list interfaces: {}", e);
                return None;
            }
        };

        interfaces
            .into_iter()
            .filter(|iface| !iface.is_loopback())
            .filter(|iface| {
                self.interface
                    .as_deref()
                    .map_or(true, |wanted| iface.name == wanted)
            })
            .find_map(|iface| match iface.addr {
                IfAddr::V4(v4) => Some(v4),
                IfAddr::V6(_) => None,
            })
    }

    /// Directed broadcast address of the link
    pub fn broadcast(&self) -> Option<Ipv4Addr> {
        self.primary_v4()
            .map(|v4| v4.broadcast.unwrap_or_else(|| broadcast_address(v4.ip, v4.netmask)))
    }
}

/// Prefix length of a contiguous netmask
pub fn prefix_len(mask: Ipv4Addr) -> u32 {
    u32::from(mask).leading_ones()
}

/// `<ip & mask>/<prefix>`
pub fn network_id(ip: Ipv4Addr, mask: Ipv4Addr) -> String {
    let network = Ipv4Addr::from(u32::from(ip) & u32::from(mask));
    format!("{}/{}", network, prefix_len(mask))
}

pub fn broadcast_address(ip: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(mask))
}

#[async_trait]
impl Link for HostLink {
    fn is_connected(&self) -> bool {
        self.primary_v4().is_some()
    }

    async fn reconnect(&self) -> Result<()> {
        info!("[LINK] reconnect requested; waiting for the OS to restore the link");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        info!("[LINK] released");
        Ok(())
    }

    fn network_id(&self) -> Option<String> {
        self.primary_v4().map(|v4| network_id(v4.ip, v4.netmask))
    }
}
