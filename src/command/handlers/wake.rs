//! Wake command handler

use super::HandlerContext;
use crate::command::CommandResult;
use crate::scheduler::ProbeItem;
use tracing::{info, warn};
use wake_shared::WakeRequest;

/// Handle a wake command (id 1)
///
/// The verification probe is queued whether or not the packet went out; an
/// unreachable target is reported as such.
pub async fn handle_wake(ctx: &HandlerContext, request: WakeRequest) -> CommandResult {
    info!(
        "[WOL] waking {} on port {}{}",
        request.mac,
        request.port,
        if request.secure_on.is_some() { " (SecureOn)" } else { "" }
    );

    let sent = match ctx
        .wake
        .send_wake(request.mac, request.port, request.secure_on)
        .await
    {
        Ok(sent) => sent,
        Err(e) => {
            warn!("[WOL] wake of {} failed: {:#}", request.mac, e);
            false
        }
    };

    if let Some(verify) = request.verify {
        let item = ProbeItem::new(request.mac, verify.ip, verify.topic, ctx.verify_attempts);
        ctx.probes.enqueue(item).await;
    }

    if sent {
        CommandResult::Completed {
            message: format!("Magic packet sent to {}", request.mac),
        }
    } else {
        CommandResult::Failed {
            message: format!("No magic packet sent to {}", request.mac),
        }
    }
}
