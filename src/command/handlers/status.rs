//! Status request command handler

use super::HandlerContext;
use crate::command::CommandResult;
use crate::queue::InsertOutcome;
use crate::scheduler::ProbeItem;
use wake_shared::StatusRequest;

/// Handle a status request (id 2): one probe, reported either way
pub async fn handle_status_request(ctx: &HandlerContext, request: StatusRequest) -> CommandResult {
    let ip = request.ip;
    let item = ProbeItem::new(request.mac, ip, request.topic, 1);

    let message = match ctx.probes.enqueue(item).await {
        InsertOutcome::DuplicateIgnored => format!("Probe of {} already pending", ip),
        _ => format!("Status check of {} queued", ip),
    };
    CommandResult::Completed { message }
}
