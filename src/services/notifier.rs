//! Result notification hook.
//!
//! The scheduler hands every completed draw and every cancellation to a
//! [`RaffleNotifier`]. Rendering and delivering the chat message belongs to the
//! embedding application; the notifiers here only log or forward the event.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::RaffleEvent;

#[async_trait]
pub trait RaffleNotifier: Send + Sync {
    async fn notify(&self, event: &RaffleEvent) -> AppResult<()>;
}

/// 只写日志
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl RaffleNotifier for LogNotifier {
    async fn notify(&self, event: &RaffleEvent) -> AppResult<()> {
        match event {
            RaffleEvent::Drawn {
                activity,
                participant_count,
                winners,
            } => {
                log::info!(
                    "Activity {} ({}) drawn: {} participants, {} winners",
                    activity.id,
                    activity.name,
                    participant_count,
                    winners.len()
                );
                for w in winners {
                    log::debug!("  {} -> {}", w.display_name, w.prize_name);
                }
            }
            RaffleEvent::Cancelled {
                activity,
                participant_count,
            } => {
                log::info!(
                    "Activity {} ({}) cancelled with {} participants",
                    activity.id,
                    activity.name,
                    participant_count
                );
            }
        }
        Ok(())
    }
}

/// 依次调用多个通知方；单个失败只记日志，不影响其它通知方
#[derive(Clone, Default)]
pub struct CompositeNotifier {
    notifiers: Vec<Arc<dyn RaffleNotifier>>,
}

impl CompositeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Arc<dyn RaffleNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }
}

#[async_trait]
impl RaffleNotifier for CompositeNotifier {
    async fn notify(&self, event: &RaffleEvent) -> AppResult<()> {
        for n in &self.notifiers {
            if let Err(e) = n.notify(event).await {
                log::error!(
                    "Failed to deliver {} notification for activity {}: {e:?}",
                    event.kind(),
                    event.activity().id
                );
            }
        }
        Ok(())
    }
}
