//! Connection supervision
//!
//! This module handles:
//! - Watching the network link and requesting reconnection on loss
//! - Establishing wall-clock time before the channel is attempted
//! - Connecting and subscribing the command channel with a fixed retry delay
//! - Publishing the connection state to the rest of the agent

mod supervisor;

pub use supervisor::{ConnectionStatus, ConnectionSupervisor, SupervisorConfig};
