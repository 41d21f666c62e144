mod command;
mod config;
mod connection;
mod lifecycle;
mod queue;
mod scheduler;
mod telemetry;
#[cfg(test)]
mod testing;
mod transport;

use anyhow::Result;
use command::{handlers::HandlerContext, CommandDispatcher, DispatchOutcome};
use config::AgentConfig;
use connection::{ConnectionSupervisor, SupervisorConfig};
use lifecycle::ExitReason;
use scheduler::{ProbeScheduler, ReportScheduler};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{ShadowReporter, SysinfoStats};
use tokio::time::Instant;
use transport::{
    CommandChannel, HostLink, MqttChannel, SystemClockSync, TcpProber, UdpWakeSender,
};
use wake_shared::settings;

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    if let Err(e) = run().await {
        error!("[LIFECYCLE] fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = AgentConfig::from_env();

    info!("Wake agent starting: {}", config.thing_name);
    info!("  Broker: {}:{}", config.mqtt.host, config.mqtt.port);
    info!("  Command topic: {}", config.command_topic);
    info!("  Shadow topic: {}", config.shadow_topic);

    let link = Arc::new(HostLink::new(config.interface.clone()));
    let broadcast = config
        .broadcast
        .or_else(|| link.broadcast())
        .unwrap_or(Ipv4Addr::BROADCAST);
    info!("  Wake broadcast: {}", broadcast);

    let (mqtt, mut inbound) = MqttChannel::new(&config.mqtt)?;
    let channel: Arc<dyn CommandChannel> = Arc::new(mqtt);

    // Queues and their background work
    let reports = ReportScheduler::default();
    let probes = ProbeScheduler::new(Arc::new(TcpProber::default()), reports.clone());
    let _probe_task = probes.start();

    let dispatcher = CommandDispatcher::new(
        config.command_topic.clone(),
        HandlerContext {
            wake: Arc::new(UdpWakeSender::new(broadcast)),
            probes: probes.clone(),
            verify_attempts: config.verify_attempts,
        },
    );

    let supervisor = ConnectionSupervisor::new(
        SupervisorConfig {
            time_policy: config.time_policy,
            ..SupervisorConfig::new(config.command_topic.clone())
        },
        link.clone(),
        channel.clone(),
        Arc::new(SystemClockSync::default()),
    );
    let status = supervisor.status();
    let supervisor_task = tokio::spawn(supervisor.run());

    let mut shadow = ShadowReporter::new(
        config.shadow_topic.clone(),
        config.shadow_interval,
        config.shadow_retry,
        SysinfoStats::new(),
    );

    let restart_at = Instant::now() + config.restart_after;
    let mut ticker = tokio::time::interval(Duration::from_millis(settings::CONTROL_LOOP_INTERVAL_MS));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = lifecycle::shutdown_signal();
    tokio::pin!(shutdown);

    // Main control loop
    let reason = loop {
        tokio::select! {
            _ = &mut shutdown => break ExitReason::Signal,
            _ = tokio::time::sleep_until(restart_at) => {
                info!("[LIFECYCLE] scheduled restart after {}s", config.restart_after.as_secs());
                break ExitReason::ScheduledRestart;
            }
            Some(message) = inbound.recv() => {
                match dispatcher.dispatch(&message.topic, &message.payload) {
                    DispatchOutcome::Dispatched { kind, task } => {
                        debug!("[CMD] {:?} handed to a background task", kind);
                        tokio::spawn(async move {
                            if let Err(e) = task.await {
                                error!("[CMD] {:?} handler aborted: {}", kind, e);
                            }
                        });
                    }
                    DispatchOutcome::Rejected(e) => warn!("[CMD] rejected command: {}", e),
                    DispatchOutcome::Unhandled(id) => info!("[CMD] ignoring unknown command id {}", id),
                    DispatchOutcome::Ignored => {}
                }
            }
            _ = ticker.tick() => {
                if status.is_channel_ready() {
                    let now = Instant::now();
                    shadow.tick(now, link.as_ref(), &reports).await;
                    reports.drain_step(&status, channel.as_ref()).await;
                }
            }
        }
    };

    supervisor_task.abort();
    lifecycle::shutdown(channel.as_ref(), link.as_ref(), &config.command_topic).await;

    if reason == ExitReason::ScheduledRestart {
        lifecycle::restart()?;
    }

    info!("Wake agent stopped");
    Ok(())
}
