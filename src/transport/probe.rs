//! TCP reachability probe
//!
//! ICMP needs raw sockets, so a host counts as reachable when any of a few
//! common ports answers a TCP connect, either by accepting or by refusing it.

use crate::transport::traits::Prober;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::select_ok;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;
use wake_shared::settings;

/// Ports tried by default: ssh, http, netbios, https, smb, rdp
pub const DEFAULT_PROBE_PORTS: [u16; 6] = [22, 80, 139, 443, 445, 3389];

/// [`Prober`] racing TCP connects to a set of ports
#[derive(Debug, Clone)]
pub struct TcpProber {
    ports: Vec<u16>,
    timeout: Duration,
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new(
            DEFAULT_PROBE_PORTS.to_vec(),
            Duration::from_millis(settings::PROBE_CONNECT_TIMEOUT_MS),
        )
    }
}

impl TcpProber {
    pub fn new(ports: Vec<u16>, timeout: Duration) -> Self {
        Self { ports, timeout }
    }
}

async fn knock(addr: SocketAddr, limit: Duration) -> Result<()> {
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => Ok(()),
        // A RST is still an answer from the host.
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => Ok(()),
        Ok(Err(e)) => Err(anyhow!("{}: {}", addr, e)),
        Err(_) => Err(anyhow!("{}: timed out", addr)),
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, address: IpAddr) -> Result<bool> {
        if self.ports.is_empty() {
            return Err(anyhow!("no probe ports configured"));
        }

        let attempts = self
            .ports
            .iter()
            .map(|&port| Box::pin(knock(SocketAddr::new(address, port), self.timeout)));

        match select_ok(attempts).await {
            Ok(_) => Ok(true),
            Err(e) => {
                debug!("[PROBE] {} unreachable: {}", address, e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_port_is_reachable() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let prober = TcpProber::new(vec![port], Duration::from_secs(1));
        assert!(prober.probe(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap());
    }

    #[tokio::test]
    async fn test_refused_port_is_reachable() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let prober = TcpProber::new(vec![port], Duration::from_secs(1));
        assert!(prober.probe(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_ports_is_an_error() {
        let prober = TcpProber::new(vec![], Duration::from_secs(1));
        assert!(prober.probe(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.is_err());
    }
}
