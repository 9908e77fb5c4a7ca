//! Activity state machine.
//!
//! ```text
//! pending ──> active ──> drawn
//!                │
//!                └─────> cancelled
//! ```
//!
//! `drawn` and `cancelled` are terminal.

use crate::entities::ActivityState;
use crate::error::{AppError, AppResult};

/// 需要特定源状态的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Activate,
    Join,
    Draw,
    Cancel,
    Delete,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Activate => "activate",
            LifecycleAction::Join => "join",
            LifecycleAction::Draw => "draw",
            LifecycleAction::Cancel => "cancel",
            LifecycleAction::Delete => "delete",
        }
    }

    /// 进入目标状态所对应的操作
    pub fn for_target(to: ActivityState) -> Self {
        match to {
            ActivityState::Pending | ActivityState::Active => LifecycleAction::Activate,
            ActivityState::Drawn => LifecycleAction::Draw,
            ActivityState::Cancelled => LifecycleAction::Cancel,
        }
    }
}

impl ActivityState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActivityState::Drawn | ActivityState::Cancelled)
    }

    pub fn can_transition_to(&self, next: ActivityState) -> bool {
        matches!(
            (self, next),
            (ActivityState::Pending, ActivityState::Active)
                | (ActivityState::Active, ActivityState::Drawn)
                | (ActivityState::Active, ActivityState::Cancelled)
        )
    }
}

/// The state an action must start from. Deletion has its own rule, see
/// [`ensure_deletable`].
fn required_state(action: LifecycleAction) -> Option<ActivityState> {
    match action {
        LifecycleAction::Activate => Some(ActivityState::Pending),
        LifecycleAction::Join | LifecycleAction::Draw | LifecycleAction::Cancel => {
            Some(ActivityState::Active)
        }
        LifecycleAction::Delete => None,
    }
}

/// 校验当前状态允许执行该操作
pub fn ensure_can(action: LifecycleAction, current: ActivityState) -> AppResult<()> {
    match required_state(action) {
        Some(required) if current != required => {
            Err(AppError::conflict(action.as_str(), current))
        }
        Some(_) => Ok(()),
        None => ensure_deletable(current),
    }
}

/// Validates a raw `from -> to` transition, naming the action in the error.
pub fn ensure_transition(from: ActivityState, to: ActivityState) -> AppResult<()> {
    if from.can_transition_to(to) {
        return Ok(());
    }
    Err(AppError::conflict(
        LifecycleAction::for_target(to).as_str(),
        from,
    ))
}

/// 公告引用只能挂在未结束的活动上
pub fn ensure_annotatable(current: ActivityState) -> AppResult<()> {
    if current.is_terminal() {
        return Err(AppError::conflict("attach announcement to", current));
    }
    Ok(())
}

/// 只有活动不处于 active 时才能删除（pending 残留可清理）
pub fn ensure_deletable(current: ActivityState) -> AppResult<()> {
    if current == ActivityState::Active {
        return Err(AppError::conflict(LifecycleAction::Delete.as_str(), current));
    }
    Ok(())
}
