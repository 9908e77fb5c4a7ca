//! Draw scheduler.
//!
//! Holds one cancellable in-memory timer per `active` activity and fires the draw
//! at its deadline. Timers are volatile; the persisted activity state is the source
//! of truth for "has this been drawn", so [`DrawScheduler::recover_on_startup`]
//! re-arms pending deadlines and immediately draws the ones missed while the
//! process was down.
//!
//! Draw sequence for one activity:
//! 1. take the activity exclusively in the store (joins wait or see `drawn`)
//! 2. re-read prize lines and participants, verify the state is still `active`
//! 3. run the allocator
//! 4. persist winners and the `drawn` state, release the activity
//! 5. drop the timer handle
//! 6. emit the notification

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::{Mutex, oneshot};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::entities::ActivityState;
use crate::error::{AppError, AppResult};
use crate::models::{Activity, ActivityDetail, RaffleEvent};
use crate::services::allocator::allocate;
use crate::services::lifecycle::{self, LifecycleAction};
use crate::services::notifier::RaffleNotifier;
use crate::store::{ActivityStore, DrawCommit};

/// 单次开奖执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawOutcome {
    Drawn { participants: usize, winners: usize },
    /// 活动已不是 active（已开奖 / 已取消），本次不抽
    Skipped { state: ActivityState },
    /// 同一活动的开奖正在执行
    InProgress,
    /// 重试耗尽，活动已打失败标记等待运维处理
    Failed { attempts: u32, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleOutcome {
    Armed { deadline: DateTime<Utc> },
    /// 截止时间已过，调用方返回前已同步执行开奖
    Fired(DrawOutcome),
}

/// 启动恢复统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub armed: usize,
    pub fired: usize,
    pub failed: usize,
}

struct TimerEntry {
    generation: u64,
    deadline: DateTime<Utc>,
    // 丢弃即取消对应的定时任务
    _cancel: oneshot::Sender<()>,
}

struct SchedulerInner {
    store: Arc<dyn ActivityStore>,
    notifier: Arc<dyn RaffleNotifier>,
    config: SchedulerConfig,
    timers: Mutex<HashMap<Uuid, TimerEntry>>,
    in_flight: Mutex<HashSet<Uuid>>,
    generation: AtomicU64,
}

#[derive(Clone)]
pub struct DrawScheduler {
    inner: Arc<SchedulerInner>,
}

impl DrawScheduler {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        notifier: Arc<dyn RaffleNotifier>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                notifier,
                config,
                timers: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashSet::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Arms (or replaces) the timer for an activity. A deadline that has already
    /// passed is drawn right away and the outcome returned to the caller.
    pub async fn schedule_draw(
        &self,
        activity_id: Uuid,
        deadline: DateTime<Utc>,
    ) -> AppResult<ScheduleOutcome> {
        if deadline <= Utc::now() {
            self.cancel_timer(activity_id).await;
            let outcome = self.run_draw_inner(activity_id, None).await?;
            return Ok(ScheduleOutcome::Fired(outcome));
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        {
            let mut timers = self.inner.timers.lock().await;
            let entry = TimerEntry {
                generation,
                deadline,
                _cancel: cancel_tx,
            };
            // 替换旧定时器（旧 sender 被丢弃即取消），不会叠加两个
            if timers.insert(activity_id, entry).is_some() {
                log::debug!("Replaced existing draw timer for activity {activity_id}");
            }
        }

        let delay = (deadline - Utc::now()).to_std().unwrap_or_default();
        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    this.fire(activity_id, generation).await;
                }
                _ = cancel_rx => {
                    log::debug!("Draw timer for activity {activity_id} cancelled");
                }
            }
        });

        log::info!("Draw for activity {activity_id} scheduled at {deadline}");
        Ok(ScheduleOutcome::Armed { deadline })
    }

    /// Removes the pending timer, if any. Returns whether one existed.
    pub async fn cancel_timer(&self, activity_id: Uuid) -> bool {
        self.inner
            .timers
            .lock()
            .await
            .remove(&activity_id)
            .is_some()
    }

    /// 停机时清空全部定时器
    pub async fn clear_all(&self) -> usize {
        let mut timers = self.inner.timers.lock().await;
        let n = timers.len();
        timers.clear();
        if n > 0 {
            log::info!("Cleared {n} draw timers");
        }
        n
    }

    pub async fn has_timer(&self, activity_id: Uuid) -> bool {
        self.inner.timers.lock().await.contains_key(&activity_id)
    }

    pub async fn timer_deadline(&self, activity_id: Uuid) -> Option<DateTime<Utc>> {
        self.inner
            .timers
            .lock()
            .await
            .get(&activity_id)
            .map(|t| t.deadline)
    }

    pub async fn timer_count(&self) -> usize {
        self.inner.timers.lock().await.len()
    }

    /// 启动时调用：为所有 active 活动重建定时器，已过期的立即开奖
    pub async fn recover_on_startup(&self) -> AppResult<RecoveryReport> {
        let stuck = self
            .inner
            .store
            .list_by_state(ActivityState::Pending)
            .await?;
        if !stuck.is_empty() {
            log::warn!(
                "{} activities are stuck in pending state and will not be drawn",
                stuck.len()
            );
        }

        let active = self
            .inner
            .store
            .list_by_state(ActivityState::Active)
            .await?;

        let mut report = RecoveryReport::default();
        for activity in active {
            match self.schedule_draw(activity.id, activity.deadline).await {
                Ok(ScheduleOutcome::Armed { .. }) => report.armed += 1,
                Ok(ScheduleOutcome::Fired(DrawOutcome::Failed { .. })) => report.failed += 1,
                Ok(ScheduleOutcome::Fired(_)) => report.fired += 1,
                Err(e) => {
                    log::error!("Failed to recover draw for activity {}: {e:?}", activity.id);
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Scheduler recovered: {} armed, {} drawn on startup, {} failed",
            report.armed,
            report.fired,
            report.failed
        );
        Ok(report)
    }

    /// Draws every overdue `active` activity that has no live timer and no
    /// operator flag. Returns how many were drawn.
    pub async fn sweep_overdue(&self) -> AppResult<usize> {
        let now = Utc::now();
        let active = self
            .inner
            .store
            .list_by_state(ActivityState::Active)
            .await?;

        let mut drawn = 0;
        for activity in active {
            if !activity.is_overdue(now) || activity.draw_error.is_some() {
                continue;
            }
            if self.has_timer(activity.id).await {
                continue;
            }
            log::warn!(
                "Activity {} passed its deadline without a live timer, drawing now",
                activity.id
            );
            match self.run_draw(activity.id).await {
                Ok(DrawOutcome::Drawn { .. }) => drawn += 1,
                Ok(_) => {}
                Err(e) => log::error!("Sweep draw for activity {} failed: {e:?}", activity.id),
            }
        }
        Ok(drawn)
    }

    /// Runs the draw sequence now, outside any timer.
    pub async fn run_draw(&self, activity_id: Uuid) -> AppResult<DrawOutcome> {
        self.run_draw_inner(activity_id, None).await
    }

    /// 取消后的收尾：移除定时器并发出取消通知
    pub async fn on_cancelled(&self, activity: Activity, participant_count: usize) {
        self.cancel_timer(activity.id).await;
        let event = RaffleEvent::Cancelled {
            activity,
            participant_count,
        };
        self.emit(&event).await;
    }

    async fn fire(&self, activity_id: Uuid, generation: u64) {
        // 已被替换或取消的定时器不执行
        let current = {
            let timers = self.inner.timers.lock().await;
            timers
                .get(&activity_id)
                .is_some_and(|t| t.generation == generation)
        };
        if !current {
            return;
        }

        match self.run_draw_inner(activity_id, Some(generation)).await {
            Ok(outcome) => log::debug!("Timer draw for activity {activity_id}: {outcome:?}"),
            Err(e) => log::error!("Timer draw for activity {activity_id} failed: {e:?}"),
        }
    }

    async fn run_draw_inner(
        &self,
        activity_id: Uuid,
        generation: Option<u64>,
    ) -> AppResult<DrawOutcome> {
        if !self.inner.in_flight.lock().await.insert(activity_id) {
            return Ok(DrawOutcome::InProgress);
        }

        let result = self.draw_with_retry(activity_id).await;

        self.inner.in_flight.lock().await.remove(&activity_id);
        if let Some(generation) = generation {
            let mut timers = self.inner.timers.lock().await;
            if timers
                .get(&activity_id)
                .is_some_and(|t| t.generation == generation)
            {
                timers.remove(&activity_id);
            }
        }

        let (outcome, event) = result?;
        if let Some(event) = event {
            self.emit(&event).await;
        }
        Ok(outcome)
    }

    async fn draw_with_retry(
        &self,
        activity_id: Uuid,
    ) -> AppResult<(DrawOutcome, Option<RaffleEvent>)> {
        let max_attempts = self.inner.config.max_draw_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.try_draw(activity_id).await {
                Ok(done) => return Ok(done),
                Err(AppError::NotFound(msg)) => return Err(AppError::NotFound(msg)),
                Err(e) => {
                    log::error!(
                        "Draw attempt {attempt}/{max_attempts} for activity {activity_id} failed: {e}"
                    );
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        let backoff = self.inner.config.retry_backoff_ms * attempt as u64;
                        tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                    }
                }
            }
        }

        log::error!(
            "Draw for activity {activity_id} gave up after {max_attempts} attempts and needs an operator: {last_error}"
        );
        if let Err(e) = self
            .inner
            .store
            .flag_draw_failure(activity_id, max_attempts as i32, &last_error)
            .await
        {
            log::error!("Failed to flag activity {activity_id} for operator attention: {e:?}");
        }

        Ok((
            DrawOutcome::Failed {
                attempts: max_attempts,
                error: last_error,
            },
            None,
        ))
    }

    async fn try_draw(&self, activity_id: Uuid) -> AppResult<(DrawOutcome, Option<RaffleEvent>)> {
        let store = &self.inner.store;

        // 快速路径：已结束的活动不进入排他开奖
        let current = store
            .get_activity(activity_id)
            .await?
            .ok_or_else(|| AppError::activity_not_found(activity_id))?;
        let state = current.activity.state;
        if lifecycle::ensure_can(LifecycleAction::Draw, state).is_err() {
            log::debug!("Activity {activity_id} is {state}, skipping draw");
            return Ok((DrawOutcome::Skipped { state }, None));
        }

        let won_at = Utc::now();
        let allocate_locked = move |detail: &ActivityDetail| {
            let mut rng = StdRng::from_entropy();
            allocate(
                activity_id,
                &detail.prize_lines,
                &detail.participants,
                won_at,
                &mut rng,
            )
            .winners
        };

        match store
            .draw_exclusive(activity_id, Box::new(allocate_locked))
            .await?
        {
            DrawCommit::Drawn(detail) => {
                let participants = detail.participants.len();
                let winners = detail.winners.len();
                log::info!(
                    "Activity {activity_id} drawn: {winners} winners among {participants} participants"
                );
                let outcome = DrawOutcome::Drawn {
                    participants,
                    winners,
                };
                let event = RaffleEvent::Drawn {
                    activity: detail.activity,
                    participant_count: participants,
                    winners: detail.winners,
                };
                Ok((outcome, Some(event)))
            }
            DrawCommit::NotActive(state) => {
                log::debug!("Activity {activity_id} became {state} before the draw committed");
                Ok((DrawOutcome::Skipped { state }, None))
            }
        }
    }

    async fn emit(&self, event: &RaffleEvent) {
        if let Err(e) = self.inner.notifier.notify(event).await {
            log::error!(
                "Failed to emit {} notification for activity {}: {e:?}",
                event.kind(),
                event.activity().id
            );
        }
    }
}
