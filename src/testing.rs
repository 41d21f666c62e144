//! In-memory doubles for the transport seams

use crate::transport::traits::{CommandChannel, Link, Prober, TimeSync, WakeSender};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use wake_shared::{MacAddress, SecureOnPassword};

#[derive(Debug, Default)]
pub struct MockChannel {
    pub connected: AtomicBool,
    pub connect_calls: AtomicU32,
    pub fail_connect: AtomicBool,
    /// Every subscribe fails while set
    pub fail_subscribe: AtomicBool,
    /// The next N publishes fail
    pub publish_failures: AtomicU32,
    pub subscriptions: Mutex<Vec<String>>,
    pub unsubscriptions: Mutex<Vec<String>>,
    pub published: Mutex<Vec<(String, String)>>,
    pub disconnect_calls: AtomicU32,
}

impl MockChannel {
    pub fn connected() -> Self {
        let channel = Self::default();
        channel.connected.store(true, Ordering::SeqCst);
        channel
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Simulate the broker dropping the session
    pub fn drop_session(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommandChannel for MockChannel {
    async fn connect(&self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(anyhow!("broker unreachable"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(anyhow!("subscribe rejected"));
        }
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.unsubscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let pending = self.publish_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.publish_failures.store(pending - 1, Ordering::SeqCst);
            return Err(anyhow!("publish timed out"));
        }
        self.published.lock().unwrap().push((
            topic.to_string(),
            String::from_utf8_lossy(payload).into_owned(),
        ));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[derive(Debug, Default)]
pub struct MockLink {
    pub up: AtomicBool,
    pub reconnect_calls: AtomicU32,
    pub disconnect_calls: AtomicU32,
}

impl MockLink {
    pub fn up() -> Self {
        let link = Self::default();
        link.up.store(true, Ordering::SeqCst);
        link
    }
}

#[async_trait]
impl Link for MockLink {
    fn is_connected(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<()> {
        self.reconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.up.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn network_id(&self) -> Option<String> {
        self.is_connected().then(|| "192.168.1.0/24".to_string())
    }
}

#[derive(Debug, Default)]
pub struct MockWake {
    pub calls: Mutex<Vec<(MacAddress, u16, bool)>>,
}

impl MockWake {
    pub fn calls(&self) -> Vec<(MacAddress, u16, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WakeSender for MockWake {
    async fn send_wake(
        &self,
        mac: MacAddress,
        port: u16,
        secure_on: Option<SecureOnPassword>,
    ) -> Result<bool> {
        self.calls
            .lock()
            .unwrap()
            .push((mac, port, secure_on.is_some()));
        Ok(true)
    }
}

/// Prober answering from a script, then with `fallback`
#[derive(Debug, Default)]
pub struct MockProber {
    pub script: Mutex<VecDeque<Result<bool, String>>>,
    pub fallback: AtomicBool,
    pub calls: Mutex<Vec<IpAddr>>,
}

impl MockProber {
    pub fn always(reachable: bool) -> Self {
        let prober = Self::default();
        prober.fallback.store(reachable, Ordering::SeqCst);
        prober
    }

    pub fn scripted(answers: Vec<Result<bool, String>>) -> Self {
        let prober = Self::default();
        *prober.script.lock().unwrap() = answers.into();
        prober
    }

    pub fn calls(&self) -> Vec<IpAddr> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prober for MockProber {
    async fn probe(&self, address: IpAddr) -> Result<bool> {
        self.calls.lock().unwrap().push(address);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(reachable)) => Ok(reachable),
            Some(Err(e)) => Err(anyhow!(e)),
            None => Ok(self.fallback.load(Ordering::SeqCst)),
        }
    }
}

#[derive(Debug)]
pub struct MockTimeSync {
    pub ok: AtomicBool,
    pub calls: AtomicU32,
}

impl Default for MockTimeSync {
    fn default() -> Self {
        Self {
            ok: AtomicBool::new(true),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl TimeSync for MockTimeSync {
    async fn sync(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(anyhow!("no time source"))
        }
    }
}
