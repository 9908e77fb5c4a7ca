//! Activity persistence.
//!
//! `ActivityStore` is the durable contract the raffle engine runs on. Every write is
//! atomic with respect to the invariant it guards:
//! - `append_participant` checks the open state and the (activity, user) uniqueness
//!   together with the insert;
//! - `draw_exclusive` holds the activity exclusively (row lock / per-activity mutex)
//!   while it reads prize lines and participants, runs the allocation, writes the
//!   winner rows and flips the state to `drawn`. A join either completes before it
//!   or observes `drawn`;
//! - `set_state` is a compare-and-set on the current state.
//!
//! Two engines implement it: [`DbActivityStore`] (sea-orm / PostgreSQL) and
//! [`MemoryActivityStore`].

mod db;
mod memory;

pub use db::DbActivityStore;
pub use memory::MemoryActivityStore;

use crate::entities::ActivityState;
use crate::error::AppResult;
use crate::models::{Activity, ActivityDetail, NewActivity, PrizeLine, WinnerRecord};
use async_trait::async_trait;
use uuid::Uuid;

/// 报名写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    AlreadyPresent,
    NotOpen(ActivityState),
}

/// 在存储的排他锁内执行的分配函数，入参为锁内读到的活动数据
pub type DrawFn<'a> = Box<dyn FnOnce(&ActivityDetail) -> Vec<WinnerRecord> + Send + 'a>;

/// 开奖提交结果
#[derive(Debug, Clone)]
pub enum DrawCommit {
    /// 已开奖；携带开奖后的活动、锁内参与抽取的报名列表与中奖记录
    Drawn(ActivityDetail),
    NotActive(ActivityState),
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// 在同一事务内写入活动与奖品行，状态为 pending
    async fn create_activity(
        &self,
        activity: NewActivity,
        prize_lines: Vec<PrizeLine>,
    ) -> AppResult<Activity>;

    async fn get_activity(&self, id: Uuid) -> AppResult<Option<ActivityDetail>>;

    async fn list_activities(
        &self,
        group_id: &str,
        state: Option<ActivityState>,
    ) -> AppResult<Vec<Activity>>;

    async fn list_by_state(&self, state: ActivityState) -> AppResult<Vec<Activity>>;

    /// 已结束（drawn / cancelled）的活动，按创建时间倒序分页；返回 (当前页, 总数)
    async fn list_history(
        &self,
        group_id: &str,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<Activity>, i64)>;

    /// active 且带有开奖失败标记的活动
    async fn list_flagged(&self) -> AppResult<Vec<Activity>>;

    /// Compare-and-set state transition. Fails with `Conflict` naming the current
    /// state when it is not `from`.
    async fn set_state(
        &self,
        id: Uuid,
        from: ActivityState,
        to: ActivityState,
    ) -> AppResult<Activity>;

    async fn append_participant(
        &self,
        id: Uuid,
        user_id: &str,
        display_name: &str,
    ) -> AppResult<AppendOutcome>;

    async fn has_participant(&self, id: Uuid, user_id: &str) -> AppResult<bool>;

    /// Draws the activity while holding it exclusively. `draw` runs at most once,
    /// only when the activity is `active`, on the prize lines and participants read
    /// under the lock.
    async fn draw_exclusive(&self, id: Uuid, draw: DrawFn<'_>) -> AppResult<DrawCommit>;

    async fn flag_draw_failure(&self, id: Uuid, attempts: i32, error: &str) -> AppResult<()>;

    async fn clear_draw_failure(&self, id: Uuid) -> AppResult<()>;

    async fn set_announcement(&self, id: Uuid, message_ref: &str) -> AppResult<Activity>;

    /// 删除活动及其全部子记录
    async fn delete_activity_cascade(&self, id: Uuid) -> AppResult<()>;
}
