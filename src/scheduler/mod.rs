//! Background work scheduling on top of the bounded retry queue
//!
//! - Probe scheduling: reachability checks with a per-item attempt budget
//! - Report scheduling: outbound publishes retried until they go out

mod probe;
mod report;

pub use probe::{ProbeItem, ProbeScheduler};
pub use report::{ReportItem, ReportScheduler};
