//! Wake-on-LAN magic packets over UDP broadcast

use crate::transport::traits::WakeSender;
use anyhow::Result;
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};
use wake_shared::{settings, MacAddress, SecureOnPassword};

/// 6 x 0xFF, 16 x MAC
pub const MAGIC_PACKET_LEN: usize = 102;

/// Magic packet followed by a 6-byte SecureOn password
pub const SECURE_MAGIC_PACKET_LEN: usize = MAGIC_PACKET_LEN + 6;

/// Build a magic packet; returns the buffer and the number of bytes used
pub fn magic_packet(
    mac: MacAddress,
    secure_on: Option<SecureOnPassword>,
) -> ([u8; SECURE_MAGIC_PACKET_LEN], usize) {
    let mut pkt = [0u8; SECURE_MAGIC_PACKET_LEN];
    pkt[..6].fill(0xFF);

    let octets = mac.octets();
    for chunk in pkt[6..MAGIC_PACKET_LEN].chunks_exact_mut(6) {
        chunk.copy_from_slice(&octets);
    }

    match secure_on {
        Some(password) => {
            pkt[MAGIC_PACKET_LEN..].copy_from_slice(&password.octets());
            (pkt, SECURE_MAGIC_PACKET_LEN)
        }
        None => (pkt, MAGIC_PACKET_LEN),
    }
}

/// [`WakeSender`] broadcasting magic packets from an ephemeral UDP socket
#[derive(Debug, Clone)]
pub struct UdpWakeSender {
    broadcast: Ipv4Addr,
    repeat: u32,
    repeat_delay: Duration,
}

impl UdpWakeSender {
    pub fn new(broadcast: Ipv4Addr) -> Self {
        Self {
            broadcast,
            repeat: settings::MAGIC_PACKET_REPEAT,
            repeat_delay: Duration::from_millis(settings::MAGIC_PACKET_REPEAT_DELAY_MS),
        }
    }

    /// Override how often each packet is sent
    #[cfg(test)]
    pub fn with_repeat(mut self, repeat: u32, delay: Duration) -> Self {
        self.repeat = repeat.max(1);
        self.repeat_delay = delay;
        self
    }
}

#[async_trait]
impl WakeSender for UdpWakeSender {
    async fn send_wake(
        &self,
        mac: MacAddress,
        port: u16,
        secure_on: Option<SecureOnPassword>,
    ) -> Result<bool> {
        let (pkt, len) = magic_packet(mac, secure_on);
        let target = SocketAddrV4::new(self.broadcast, port);

        let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        sock.set_broadcast(true)?;

        let mut sent = 0u32;
        for attempt in 0..self.repeat {
            if attempt > 0 {
                tokio::time::sleep(self.repeat_delay).await;
            }
            match sock.send_to(&pkt[..len], target).await {
                Ok(_) => sent += 1,
                Err(e) => warn!("[WOL] send to {} failed: {}", target, e),
            }
        }

        debug!("[WOL] {} -> {} ({}/{} sent)", mac, target, sent, self.repeat);
        Ok(sent > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_packet_layout() {
        let mac: MacAddress = "01:23:45:67:89:AB".parse().unwrap();
        let (pkt, len) = magic_packet(mac, None);

        assert_eq!(len, MAGIC_PACKET_LEN);
        assert!(pkt[..6].iter().all(|&b| b == 0xFF));
        for i in 0..16 {
            let base = 6 + i * 6;
            assert_eq!(&pkt[base..base + 6], &mac.octets());
        }
    }

    #[test]
    fn test_secure_magic_packet_appends_password() {
        let mac: MacAddress = "01:23:45:67:89:AB".parse().unwrap();
        let password: SecureOnPassword = "DE:AD:BE:EF:00:01".parse().unwrap();
        let (pkt, len) = magic_packet(mac, Some(password));

        assert_eq!(len, SECURE_MAGIC_PACKET_LEN);
        assert_eq!(&pkt[MAGIC_PACKET_LEN..], &[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);
    }

    #[tokio::test]
    async fn test_send_to_loopback_listener() {
        let listener = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let sender =
            UdpWakeSender::new(Ipv4Addr::LOCALHOST).with_repeat(2, Duration::from_millis(1));
        let mac: MacAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert!(sender.send_wake(mac, port, None).await.unwrap());

        let mut buf = [0u8; 256];
        let (n, _) = listener.recv_from(&mut buf).await.unwrap();
        assert_eq!(n, MAGIC_PACKET_LEN);
        assert_eq!(&buf[6..12], &mac.octets());
    }
}
