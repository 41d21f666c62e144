//! Transport seams and their host implementations

pub mod clock;
pub mod link;
pub mod mqtt;
pub mod probe;
pub mod traits;
pub mod wol;

pub use clock::SystemClockSync;
pub use link::HostLink;
pub use mqtt::{MqttChannel, MqttSettings, TlsFiles};
pub use probe::TcpProber;
pub use traits::{CommandChannel, Link, Prober, TimeSync, WakeSender};
pub use wol::UdpWakeSender;
