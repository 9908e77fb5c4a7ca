//! Background tasks.
//!
//! The overdue sweep is a safety net behind the per-activity timers: it draws any
//! `active` activity whose deadline has passed without a live timer (for example
//! a timer task that died with its runtime). Call `spawn_all` once during startup.

use std::time::Duration;

use crate::services::DrawScheduler;

/// Spawn all background tasks. Detaches via `tokio::spawn`; does not block.
pub fn spawn_all(scheduler: DrawScheduler, sweep_interval: Duration) {
    // 过期未开奖巡检
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(sweep_interval).await;
            match scheduler.sweep_overdue().await {
                Ok(n) if n > 0 => log::warn!("Overdue sweep drew {n} activities"),
                Ok(_) => {}
                Err(e) => log::error!("Overdue sweep failed: {e:?}"),
            }
        }
    });
}
