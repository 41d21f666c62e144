//! MQTT command channel on top of rumqttc
//!
//! The rumqttc event loop is driven by a background task that only polls
//! while a connection is wanted. The connection supervisor decides when to
//! connect; a transport error parks the driver until the next
//! [`CommandChannel::connect`].

use crate::transport::traits::{CommandChannel, InboundMessage};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS,
    SubscribeReasonCode, TlsConfiguration, Transport,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Capacity of the request queue between client and event loop
const REQUEST_CAPACITY: usize = 10;

/// Inbound messages buffered before new ones are dropped
const INBOUND_CAPACITY: usize = 16;

/// Client certificate material for mutual TLS
#[derive(Debug, Clone)]
pub struct TlsFiles {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    /// Bound on a connect or disconnect handshake
    pub connect_timeout: Duration,
    pub tls: Option<TlsFiles>,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            client_id: "wake-agent".into(),
            host: "localhost".into(),
            port: 1883,
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            tls: None,
        }
    }
}

impl MqttSettings {
    fn options(&self) -> Result<MqttOptions> {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);

        if let Some(tls) = &self.tls {
            let ca = std::fs::read(&tls.ca)
                .with_context(|| format!("Failed to read CA from {}", tls.ca.display()))?;
            let cert = std::fs::read(&tls.cert)
                .with_context(|| format!("Failed to read cert from {}", tls.cert.display()))?;
            let key = std::fs::read(&tls.key)
                .with_context(|| format!("Failed to read key from {}", tls.key.display()))?;

            options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: Some((cert, key)),
            }));
        }

        Ok(options)
    }
}

/// State shared between the channel handle and its driver task
#[derive(Debug)]
struct Shared {
    connected: AtomicBool,
    /// Whether the driver should keep polling the event loop
    wanted: watch::Sender<bool>,
    /// Pinged on every connect, disconnect and transport error
    changed: Notify,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn set_error(&self, message: String) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(message);
        }
    }

    fn take_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|mut last| last.take())
    }
}

/// MQTT implementation of [`CommandChannel`]
pub struct MqttChannel {
    client: AsyncClient,
    shared: Arc<Shared>,
    connect_timeout: Duration,
}

impl MqttChannel {
    /// Create the channel and start its driver task
    ///
    /// Returns the receiver on which inbound publishes are delivered.
    pub fn new(settings: &MqttSettings) -> Result<(Self, mpsc::Receiver<InboundMessage>)> {
        let options = settings.options()?;
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (wanted, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            connected: AtomicBool::new(false),
            wanted,
            changed: Notify::new(),
            last_error: Mutex::new(None),
        });

        let driver_shared = shared.clone();
        tokio::spawn(async move {
            drive(eventloop, driver_shared, inbound_tx).await;
        });

        info!(
            "[MQTT] channel ready for {}:{} as {}",
            settings.host, settings.port, settings.client_id
        );

        Ok((
            Self {
                client,
                shared,
                connect_timeout: settings.connect_timeout,
            },
            inbound_rx,
        ))
    }
}

/// Drop the session while nobody polls it
///
/// `connected` must never read true while the driver is parked.
fn park(eventloop: &mut EventLoop, shared: &Shared) {
    if shared.connected.swap(false, Ordering::SeqCst) {
        shared.changed.notify_waiters();
    }
    eventloop.clean();
    // The next session is clean; the supervisor resubscribes.
    eventloop.pending.clear();
}

/// Poll the event loop while a connection is wanted
async fn drive(
    mut eventloop: EventLoop,
    shared: Arc<Shared>,
    inbound_tx: mpsc::Sender<InboundMessage>,
) {
    let mut wanted = shared.wanted.subscribe();

    loop {
        if !*wanted.borrow_and_update() {
            park(&mut eventloop, &shared);
            if wanted.changed().await.is_err() {
                debug!("[MQTT] channel dropped, driver exiting");
                return;
            }
            continue;
        }

        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                if !*wanted.borrow() {
                    debug!("[MQTT] CONNACK after connect gave up, dropping session");
                    continue;
                }
                if ack.code == ConnectReturnCode::Success {
                    shared.connected.store(true, Ordering::SeqCst);
                    info!("[MQTT] connected");
                } else {
                    shared.set_error(format!("connection refused: {:?}", ack.code));
                    shared.wanted.send_replace(false);
                }
                shared.changed.notify_waiters();
            }
            Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    // Forces the supervisor through a fresh connect-and-subscribe.
                    error!("[MQTT] subscription rejected by broker (pkid={})", ack.pkid);
                    shared.set_error("subscription rejected".into());
                    shared.connected.store(false, Ordering::SeqCst);
                    shared.wanted.send_replace(false);
                    shared.changed.notify_waiters();
                }
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.clone(),
                };
                if let Err(e) = inbound_tx.try_send(message) {
                    warn!("[MQTT] inbound message dropped: {}", e);
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                shared.connected.store(false, Ordering::SeqCst);
                shared.wanted.send_replace(false);
                shared.changed.notify_waiters();
                info!("[MQTT] disconnected");
            }
            Ok(_) => {}
            Err(e) => {
                if shared.connected.swap(false, Ordering::SeqCst) {
                    warn!("[MQTT] connection lost: {}", e);
                } else {
                    debug!("[MQTT] connection error: {}", e);
                }
                shared.set_error(e.to_string());
                shared.wanted.send_replace(false);
                shared.changed.notify_waiters();
            }
        }
    }
}

#[async_trait]
impl CommandChannel for MqttChannel {
    async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let changed = self.shared.changed.notified();
        tokio::pin!(changed);
        changed.as_mut().enable();

        self.shared.take_error();
        self.shared.wanted.send_replace(true);

        let _ = timeout(self.connect_timeout, changed).await;
        if self.is_connected() {
            return Ok(());
        }

        self.shared.wanted.send_replace(false);
        let reason = self
            .shared
            .take_error()
            .unwrap_or_else(|| "timed out waiting for CONNACK".into());
        Err(anyhow!("MQTT connect failed: {}", reason))
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(anyhow!("MQTT subscribe on closed session"));
        }
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| anyhow!("MQTT subscribe failed: {}", e))
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.client
            .unsubscribe(topic)
            .await
            .map_err(|e| anyhow!("MQTT unsubscribe failed: {}", e))
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(anyhow!("MQTT publish on closed session"));
        }
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .map_err(|e| anyhow!("MQTT publish failed: {}", e))
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.is_connected() {
            self.shared.wanted.send_replace(false);
            return Ok(());
        }

        let changed = self.shared.changed.notified();
        tokio::pin!(changed);
        changed.as_mut().enable();

        self.client
            .disconnect()
            .await
            .map_err(|e| anyhow!("MQTT disconnect failed: {}", e))?;

        let _ = timeout(self.connect_timeout, changed).await;
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.wanted.send_replace(false);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "MQTT"
    }
}
