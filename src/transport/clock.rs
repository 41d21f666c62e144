//! Wall-clock establishment
//!
//! The host keeps its own clock in sync (NTP, RTC), so time counts as
//! established once the system clock reads past a sanity epoch.

use crate::transport::traits::TimeSync;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::info;
use wake_shared::{now_ms, settings};

/// [`TimeSync`] that trusts the system clock once it looks plausible
#[derive(Debug, Clone)]
pub struct SystemClockSync {
    sanity_epoch_secs: u64,
}

impl Default for SystemClockSync {
    fn default() -> Self {
        Self::with_epoch(settings::TIME_SANITY_EPOCH_SECS)
    }
}

impl SystemClockSync {
    pub fn with_epoch(sanity_epoch_secs: u64) -> Self {
        Self { sanity_epoch_secs }
    }
}

#[async_trait]
impl TimeSync for SystemClockSync {
    async fn sync(&self) -> Result<()> {
        let now_secs = now_ms() / 1000;
        if now_secs < self.sanity_epoch_secs {
            return Err(anyhow!(
                "system clock not set ({}s < {}s)",
                now_secs,
                self.sanity_epoch_secs
            ));
        }
        info!("[CONN] time established at {}s", now_secs);
        Ok(())
    }
}
