use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{ActivityStore, AppendOutcome, DrawCommit, DrawFn};
use crate::entities::ActivityState;
use crate::error::{AppError, AppResult};
use crate::models::{Activity, ActivityDetail, NewActivity, Participant, PrizeLine};
use crate::services::lifecycle::{self, LifecycleAction};

/// 单个活动的全部数据，由自己的互斥锁保护
#[derive(Debug)]
struct ActivityRecord {
    detail: ActivityDetail,
    deleted: bool,
}

/// 进程内存储：每个活动一把 async 互斥锁，报名与开奖在同一活动上串行，
/// 不同活动之间互不阻塞。
#[derive(Default)]
pub struct MemoryActivityStore {
    activities: RwLock<HashMap<Uuid, Arc<Mutex<ActivityRecord>>>>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, id: Uuid) -> AppResult<Arc<Mutex<ActivityRecord>>> {
        self.activities
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::activity_not_found(id))
    }

    async fn snapshot_all(&self) -> Vec<Activity> {
        let records: Vec<Arc<Mutex<ActivityRecord>>> =
            self.activities.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(records.len());
        for r in records {
            let guard = r.lock().await;
            if !guard.deleted {
                out.push(guard.detail.activity.clone());
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }
}

#[async_trait]
impl ActivityStore for MemoryActivityStore {
    async fn create_activity(
        &self,
        activity: NewActivity,
        prize_lines: Vec<PrizeLine>,
    ) -> AppResult<Activity> {
        let now = Utc::now();
        let created = Activity {
            id: Uuid::now_v7(),
            name: activity.name,
            group_id: activity.group_id,
            deadline: activity.deadline,
            state: ActivityState::Pending,
            creator_id: activity.creator_id,
            created_at: now,
            keyword: activity.keyword,
            gesture_id: activity.gesture_id,
            announcement_ref: None,
            participant_count: 0,
            drawn_at: None,
            cancelled_at: None,
            draw_attempts: 0,
            draw_error: None,
        };
        let record = ActivityRecord {
            detail: ActivityDetail {
                activity: created.clone(),
                prize_lines,
                participants: vec![],
                winners: vec![],
            },
            deleted: false,
        };
        self.activities
            .write()
            .await
            .insert(created.id, Arc::new(Mutex::new(record)));
        Ok(created)
    }

    async fn get_activity(&self, id: Uuid) -> AppResult<Option<ActivityDetail>> {
        let Some(record) = self.activities.read().await.get(&id).cloned() else {
            return Ok(None);
        };
        let guard = record.lock().await;
        if guard.deleted {
            return Ok(None);
        }
        Ok(Some(guard.detail.clone()))
    }

    async fn list_activities(
        &self,
        group_id: &str,
        state: Option<ActivityState>,
    ) -> AppResult<Vec<Activity>> {
        Ok(self
            .snapshot_all()
            .await
            .into_iter()
            .filter(|a| a.group_id == group_id)
            .filter(|a| state.is_none_or(|s| a.state == s))
            .collect())
    }

    async fn list_by_state(&self, state: ActivityState) -> AppResult<Vec<Activity>> {
        Ok(self
            .snapshot_all()
            .await
            .into_iter()
            .filter(|a| a.state == state)
            .collect())
    }

    async fn list_history(
        &self,
        group_id: &str,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<Activity>, i64)> {
        let mut finished: Vec<Activity> = self
            .snapshot_all()
            .await
            .into_iter()
            .filter(|a| a.group_id == group_id && a.state.is_terminal())
            .collect();
        finished.reverse();
        let total = finished.len() as i64;
        let page = finished
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_flagged(&self) -> AppResult<Vec<Activity>> {
        Ok(self
            .snapshot_all()
            .await
            .into_iter()
            .filter(|a| a.needs_operator())
            .collect())
    }

    async fn set_state(
        &self,
        id: Uuid,
        from: ActivityState,
        to: ActivityState,
    ) -> AppResult<Activity> {
        lifecycle::ensure_transition(from, to)?;
        let record = self.record(id).await?;
        let mut guard = record.lock().await;
        if guard.deleted {
            return Err(AppError::activity_not_found(id));
        }
        let activity = &mut guard.detail.activity;
        if activity.state != from {
            return Err(AppError::conflict(
                LifecycleAction::for_target(to).as_str(),
                activity.state,
            ));
        }
        let now = Utc::now();
        activity.state = to;
        match to {
            ActivityState::Cancelled => activity.cancelled_at = Some(now),
            ActivityState::Drawn => activity.drawn_at = Some(now),
            _ => {}
        }
        Ok(activity.clone())
    }

    async fn append_participant(
        &self,
        id: Uuid,
        user_id: &str,
        display_name: &str,
    ) -> AppResult<AppendOutcome> {
        let record = self.record(id).await?;
        let mut guard = record.lock().await;
        if guard.deleted {
            return Err(AppError::activity_not_found(id));
        }
        let detail = &mut guard.detail;
        if lifecycle::ensure_can(LifecycleAction::Join, detail.activity.state).is_err() {
            return Ok(AppendOutcome::NotOpen(detail.activity.state));
        }
        if detail.participants.iter().any(|p| p.user_id == user_id) {
            return Ok(AppendOutcome::AlreadyPresent);
        }
        detail.participants.push(Participant {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            joined_at: Utc::now(),
        });
        detail.activity.participant_count += 1;
        Ok(AppendOutcome::Appended)
    }

    async fn has_participant(&self, id: Uuid, user_id: &str) -> AppResult<bool> {
        let record = self.record(id).await?;
        let guard = record.lock().await;
        Ok(guard
            .detail
            .participants
            .iter()
            .any(|p| p.user_id == user_id))
    }

    async fn draw_exclusive(&self, id: Uuid, draw: DrawFn<'_>) -> AppResult<DrawCommit> {
        let record = self.record(id).await?;
        // 整个读取-分配-提交过程持有同一把锁，报名只能排在前面或看到 drawn
        let mut guard = record.lock().await;
        if guard.deleted {
            return Err(AppError::activity_not_found(id));
        }
        let detail = &mut guard.detail;
        if detail.activity.state != ActivityState::Active {
            return Ok(DrawCommit::NotActive(detail.activity.state));
        }
        detail.winners = draw(&*detail);
        detail.activity.state = ActivityState::Drawn;
        detail.activity.drawn_at = Some(Utc::now());
        detail.activity.draw_error = None;
        Ok(DrawCommit::Drawn(detail.clone()))
    }

    async fn flag_draw_failure(&self, id: Uuid, attempts: i32, error: &str) -> AppResult<()> {
        let record = self.record(id).await?;
        let mut guard = record.lock().await;
        let activity = &mut guard.detail.activity;
        if activity.state == ActivityState::Active {
            activity.draw_attempts += attempts;
            activity.draw_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn clear_draw_failure(&self, id: Uuid) -> AppResult<()> {
        let record = self.record(id).await?;
        let mut guard = record.lock().await;
        guard.detail.activity.draw_error = None;
        Ok(())
    }

    async fn set_announcement(&self, id: Uuid, message_ref: &str) -> AppResult<Activity> {
        let record = self.record(id).await?;
        let mut guard = record.lock().await;
        if guard.deleted {
            return Err(AppError::activity_not_found(id));
        }
        lifecycle::ensure_annotatable(guard.detail.activity.state)?;
        guard.detail.activity.announcement_ref = Some(message_ref.to_string());
        Ok(guard.detail.activity.clone())
    }

    async fn delete_activity_cascade(&self, id: Uuid) -> AppResult<()> {
        let record = self
            .activities
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| AppError::activity_not_found(id))?;
        // 持有旧引用的并发操作会看到 deleted 标记
        record.lock().await.deleted = true;
        Ok(())
    }
}
