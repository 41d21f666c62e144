//! Command handlers for the recognized command ids

mod status;
mod wake;

pub use status::handle_status_request;
pub use wake::handle_wake;

use crate::scheduler::ProbeScheduler;
use crate::transport::WakeSender;
use std::sync::Arc;

/// Context passed to command handlers
#[derive(Clone)]
pub struct HandlerContext {
    pub wake: Arc<dyn WakeSender>,
    pub probes: ProbeScheduler,
    /// Probe attempts for a post-wake verification
    pub verify_attempts: u32,
}
