#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use raffle_backend::config::SchedulerConfig;
use raffle_backend::entities::ActivityState;
use raffle_backend::error::{AppError, AppResult};
use raffle_backend::models::*;
use raffle_backend::services::{DrawScheduler, RaffleNotifier, RaffleService};
use raffle_backend::store::{
    ActivityStore, AppendOutcome, DrawCommit, DrawFn, MemoryActivityStore,
};

/// 收集所有事件，供断言使用
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<RaffleEvent>>,
}

impl RecordingNotifier {
    pub async fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(|e| e.kind()).collect()
    }
}

#[async_trait]
impl RaffleNotifier for RecordingNotifier {
    async fn notify(&self, event: &RaffleEvent) -> AppResult<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// 前 N 次 draw_exclusive 返回数据库错误，其余操作委托给内存存储
pub struct FlakyStore {
    inner: MemoryActivityStore,
    failures_left: AtomicU32,
}

impl FlakyStore {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: MemoryActivityStore::new(),
            failures_left: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl ActivityStore for FlakyStore {
    async fn create_activity(
        &self,
        activity: NewActivity,
        prize_lines: Vec<PrizeLine>,
    ) -> AppResult<Activity> {
        self.inner.create_activity(activity, prize_lines).await
    }

    async fn get_activity(&self, id: Uuid) -> AppResult<Option<ActivityDetail>> {
        self.inner.get_activity(id).await
    }

    async fn list_activities(
        &self,
        group_id: &str,
        state: Option<ActivityState>,
    ) -> AppResult<Vec<Activity>> {
        self.inner.list_activities(group_id, state).await
    }

    async fn list_by_state(&self, state: ActivityState) -> AppResult<Vec<Activity>> {
        self.inner.list_by_state(state).await
    }

    async fn list_history(
        &self,
        group_id: &str,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<Activity>, i64)> {
        self.inner.list_history(group_id, offset, limit).await
    }

    async fn list_flagged(&self) -> AppResult<Vec<Activity>> {
        self.inner.list_flagged().await
    }

    async fn set_state(
        &self,
        id: Uuid,
        from: ActivityState,
        to: ActivityState,
    ) -> AppResult<Activity> {
        self.inner.set_state(id, from, to).await
    }

    async fn append_participant(
        &self,
        id: Uuid,
        user_id: &str,
        display_name: &str,
    ) -> AppResult<AppendOutcome> {
        self.inner.append_participant(id, user_id, display_name).await
    }

    async fn has_participant(&self, id: Uuid, user_id: &str) -> AppResult<bool> {
        self.inner.has_participant(id, user_id).await
    }

    async fn draw_exclusive(&self, id: Uuid, draw: DrawFn<'_>) -> AppResult<DrawCommit> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AppError::DatabaseError(sea_orm::DbErr::Custom(
                "connection reset".into(),
            )));
        }
        self.inner.draw_exclusive(id, draw).await
    }

    async fn flag_draw_failure(&self, id: Uuid, attempts: i32, error: &str) -> AppResult<()> {
        self.inner.flag_draw_failure(id, attempts, error).await
    }

    async fn clear_draw_failure(&self, id: Uuid) -> AppResult<()> {
        self.inner.clear_draw_failure(id).await
    }

    async fn set_announcement(&self, id: Uuid, message_ref: &str) -> AppResult<Activity> {
        self.inner.set_announcement(id, message_ref).await
    }

    async fn delete_activity_cascade(&self, id: Uuid) -> AppResult<()> {
        self.inner.delete_activity_cascade(id).await
    }
}

/// 每次读取活动之后、每次开奖加锁之前都插入一个新报名，
/// 模拟报名流量持续不断地落在开奖的读取与提交之间
pub struct JoinStormStore {
    inner: MemoryActivityStore,
    joins: AtomicU32,
}

impl JoinStormStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryActivityStore::new(),
            joins: AtomicU32::new(0),
        }
    }

    pub fn injected(&self) -> u32 {
        self.joins.load(Ordering::SeqCst)
    }

    async fn inject_join(&self, id: Uuid) -> AppResult<()> {
        let n = self.joins.fetch_add(1, Ordering::SeqCst);
        self.inner
            .append_participant(id, &format!("storm-{n}"), "Storm")
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for JoinStormStore {
    async fn create_activity(
        &self,
        activity: NewActivity,
        prize_lines: Vec<PrizeLine>,
    ) -> AppResult<Activity> {
        self.inner.create_activity(activity, prize_lines).await
    }

    async fn get_activity(&self, id: Uuid) -> AppResult<Option<ActivityDetail>> {
        let detail = self.inner.get_activity(id).await?;
        if detail.is_some() {
            self.inject_join(id).await?;
        }
        Ok(detail)
    }

    async fn list_activities(
        &self,
        group_id: &str,
        state: Option<ActivityState>,
    ) -> AppResult<Vec<Activity>> {
        self.inner.list_activities(group_id, state).await
    }

    async fn list_by_state(&self, state: ActivityState) -> AppResult<Vec<Activity>> {
        self.inner.list_by_state(state).await
    }

    async fn list_history(
        &self,
        group_id: &str,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<Activity>, i64)> {
        self.inner.list_history(group_id, offset, limit).await
    }

    async fn list_flagged(&self) -> AppResult<Vec<Activity>> {
        self.inner.list_flagged().await
    }

    async fn set_state(
        &self,
        id: Uuid,
        from: ActivityState,
        to: ActivityState,
    ) -> AppResult<Activity> {
        self.inner.set_state(id, from, to).await
    }

    async fn append_participant(
        &self,
        id: Uuid,
        user_id: &str,
        display_name: &str,
    ) -> AppResult<AppendOutcome> {
        self.inner.append_participant(id, user_id, display_name).await
    }

    async fn has_participant(&self, id: Uuid, user_id: &str) -> AppResult<bool> {
        self.inner.has_participant(id, user_id).await
    }

    async fn draw_exclusive(&self, id: Uuid, draw: DrawFn<'_>) -> AppResult<DrawCommit> {
        self.inject_join(id).await?;
        self.inner.draw_exclusive(id, draw).await
    }

    async fn flag_draw_failure(&self, id: Uuid, attempts: i32, error: &str) -> AppResult<()> {
        self.inner.flag_draw_failure(id, attempts, error).await
    }

    async fn clear_draw_failure(&self, id: Uuid) -> AppResult<()> {
        self.inner.clear_draw_failure(id).await
    }

    async fn set_announcement(&self, id: Uuid, message_ref: &str) -> AppResult<Activity> {
        self.inner.set_announcement(id, message_ref).await
    }

    async fn delete_activity_cascade(&self, id: Uuid) -> AppResult<()> {
        self.inner.delete_activity_cascade(id).await
    }
}

pub fn fast_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        max_draw_attempts: 3,
        retry_backoff_ms: 10,
        sweep_interval_secs: 60,
    }
}

pub struct Harness {
    pub store: Arc<dyn ActivityStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub scheduler: DrawScheduler,
    pub service: RaffleService,
}

impl Harness {
    pub fn with_store(store: Arc<dyn ActivityStore>) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = DrawScheduler::new(store.clone(), notifier.clone(), fast_scheduler_config());
        let service = RaffleService::new(store.clone(), scheduler.clone());
        Self {
            store,
            notifier,
            scheduler,
            service,
        }
    }

    pub fn memory() -> Self {
        Self::with_store(Arc::new(MemoryActivityStore::new()))
    }

    /// 模拟进程重启：同一存储上的全新调度器
    pub fn restart(&self) -> Self {
        Self::with_store(self.store.clone())
    }
}

pub fn create_request(name: &str, deadline: DateTime<Utc>, prizes: Vec<PrizeLine>) -> CreateActivityRequest {
    CreateActivityRequest {
        name: name.into(),
        group_id: "group-1".into(),
        deadline,
        prize_lines: prizes,
        keyword: None,
        gesture_id: None,
    }
}

/// 直接写入存储的 active 活动，截止时间可以是过去
pub async fn seed_active(
    store: &Arc<dyn ActivityStore>,
    deadline: DateTime<Utc>,
    prizes: Vec<PrizeLine>,
) -> Activity {
    let activity = store
        .create_activity(
            NewActivity {
                name: "Seeded".into(),
                group_id: "group-1".into(),
                deadline,
                creator_id: "owner".into(),
                keyword: None,
                gesture_id: None,
            },
            prizes,
        )
        .await
        .unwrap();
    store
        .set_state(activity.id, ActivityState::Pending, ActivityState::Active)
        .await
        .unwrap()
}

pub fn in_minutes(m: i64) -> DateTime<Utc> {
    Utc::now() + Duration::minutes(m)
}

pub fn minutes_ago(m: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(m)
}
