use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::entities::ActivityState;
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::lifecycle::{self, LifecycleAction};
use crate::services::registry::ParticipantRegistry;
use crate::services::scheduler::{DrawScheduler, ScheduleOutcome};
use crate::store::ActivityStore;

const MAX_NAME_LEN: usize = 200;

#[derive(Clone)]
pub struct RaffleService {
    store: Arc<dyn ActivityStore>,
    registry: ParticipantRegistry,
    scheduler: DrawScheduler,
}

impl RaffleService {
    pub fn new(store: Arc<dyn ActivityStore>, scheduler: DrawScheduler) -> Self {
        Self {
            registry: ParticipantRegistry::new(store.clone()),
            store,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &DrawScheduler {
        &self.scheduler
    }

    /// 创建活动：校验 -> 写入(pending) -> 激活 -> 挂定时器
    pub async fn create_activity(
        &self,
        request: CreateActivityRequest,
        creator_id: &str,
    ) -> AppResult<Activity> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("Activity name is required".into()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::ValidationError(format!(
                "Activity name must be at most {MAX_NAME_LEN} characters"
            )));
        }
        if request.group_id.trim().is_empty() {
            return Err(AppError::ValidationError("Group id is required".into()));
        }
        if creator_id.trim().is_empty() {
            return Err(AppError::ValidationError("Creator id is required".into()));
        }
        if request.deadline <= Utc::now() {
            return Err(AppError::ValidationError(
                "Deadline must be in the future".into(),
            ));
        }
        if request.prize_lines.is_empty() {
            return Err(AppError::ValidationError(
                "At least one prize line is required".into(),
            ));
        }
        for line in &request.prize_lines {
            if line.name.trim().is_empty() {
                return Err(AppError::ValidationError("Prize name is required".into()));
            }
            if line.count <= 0 {
                return Err(AppError::ValidationError(format!(
                    "Prize '{}' must have a positive count",
                    line.name.trim()
                )));
            }
        }

        let prize_lines = request
            .prize_lines
            .into_iter()
            .map(|p| PrizeLine::new(p.name.trim(), p.description.trim(), p.count))
            .collect();

        let new_activity = NewActivity {
            name: name.to_string(),
            group_id: request.group_id.trim().to_string(),
            deadline: request.deadline,
            creator_id: creator_id.trim().to_string(),
            keyword: non_blank(request.keyword),
            gesture_id: non_blank(request.gesture_id),
        };

        let created = self.store.create_activity(new_activity, prize_lines).await?;
        let activity = self
            .store
            .set_state(created.id, ActivityState::Pending, ActivityState::Active)
            .await?;

        log::info!(
            "Activity {} created by {} in group {}, draw at {}",
            activity.id,
            activity.creator_id,
            activity.group_id,
            activity.deadline
        );

        // deadline 已在上面校验过，正常情况下只会挂上定时器
        if let ScheduleOutcome::Fired(outcome) = self
            .scheduler
            .schedule_draw(activity.id, activity.deadline)
            .await?
        {
            log::warn!(
                "Deadline of activity {} passed during creation, drawn immediately: {outcome:?}",
                activity.id
            );
        }

        Ok(activity)
    }

    pub async fn join(
        &self,
        activity_id: Uuid,
        user_id: &str,
        display_name: &str,
    ) -> AppResult<JoinResult> {
        self.registry.join(activity_id, user_id, display_name).await
    }

    pub async fn has_joined(&self, activity_id: Uuid, user_id: &str) -> AppResult<HasJoinedResponse> {
        let participant_count = self.registry.count(activity_id).await?;
        let joined = self.registry.has_joined(activity_id, user_id).await?;
        Ok(HasJoinedResponse {
            joined,
            participant_count,
        })
    }

    pub async fn list_open_activities(&self, group_id: &str) -> AppResult<Vec<Activity>> {
        self.store
            .list_activities(group_id, Some(ActivityState::Active))
            .await
    }

    pub async fn list_activities(
        &self,
        group_id: &str,
        state: Option<ActivityState>,
    ) -> AppResult<Vec<Activity>> {
        self.store.list_activities(group_id, state).await
    }

    pub async fn get_activity_detail(&self, activity_id: Uuid) -> AppResult<Option<ActivityDetail>> {
        self.store.get_activity(activity_id).await
    }

    /// 取消活动，仅创建者可操作。
    ///
    /// 状态以 CAS 方式从 active 切到 cancelled；如果定时器已经开奖，CAS 失败并返回
    /// Conflict(drawn)。
    pub async fn cancel(&self, activity_id: Uuid, requester_id: &str) -> AppResult<Activity> {
        let detail = self
            .store
            .get_activity(activity_id)
            .await?
            .ok_or_else(|| AppError::activity_not_found(activity_id))?;

        if detail.activity.creator_id != requester_id {
            return Err(AppError::Forbidden(
                "Only the creator can cancel this activity".into(),
            ));
        }
        lifecycle::ensure_can(LifecycleAction::Cancel, detail.activity.state)?;

        let activity = self
            .store
            .set_state(activity_id, ActivityState::Active, ActivityState::Cancelled)
            .await?;
        // 以 CAS 之后的计数为准
        let participant_count = activity.participant_count.max(0) as usize;

        log::info!("Activity {activity_id} cancelled by {requester_id}");
        self.scheduler
            .on_cancelled(activity.clone(), participant_count)
            .await;

        Ok(activity)
    }

    pub async fn attach_announcement(
        &self,
        activity_id: Uuid,
        message_ref: &str,
    ) -> AppResult<Activity> {
        let message_ref = message_ref.trim();
        if message_ref.is_empty() {
            return Err(AppError::ValidationError("Message reference is required".into()));
        }
        self.store.set_announcement(activity_id, message_ref).await
    }

    pub async fn list_history(
        &self,
        query: &ActivityHistoryQuery,
    ) -> AppResult<PaginatedResponse<Activity>> {
        let params = PaginationParams::new(query.page, query.per_page);
        let (items, total) = self
            .store
            .list_history(
                &query.group_id,
                params.get_offset() as u64,
                params.get_limit() as u64,
            )
            .await?;

        Ok(PaginatedResponse::new(
            items,
            params.get_page(),
            params.get_limit(),
            total,
        ))
    }

    /// 按口令（去空白、忽略大小写）或手势查找群内进行中的活动
    pub async fn match_join(
        &self,
        group_id: &str,
        keyword: Option<&str>,
        gesture_id: Option<&str>,
    ) -> AppResult<Vec<Activity>> {
        let keyword = keyword.map(str::trim).filter(|k| !k.is_empty());
        let gesture_id = gesture_id.map(str::trim).filter(|g| !g.is_empty());
        if keyword.is_none() && gesture_id.is_none() {
            return Ok(Vec::new());
        }

        let open = self.list_open_activities(group_id).await?;
        let matched = open
            .into_iter()
            .filter(|a| {
                let by_keyword = matches!(
                    (keyword, a.keyword.as_deref()),
                    (Some(k), Some(ak)) if ak.trim().eq_ignore_ascii_case(k)
                );
                let by_gesture = matches!(
                    (gesture_id, a.gesture_id.as_deref()),
                    (Some(g), Some(ag)) if ag == g
                );
                by_keyword || by_gesture
            })
            .collect();
        Ok(matched)
    }

    pub async fn list_failed_draws(&self) -> AppResult<Vec<Activity>> {
        self.store.list_flagged().await
    }

    /// 运维重新触发开奖：清除失败标记后立即执行（未到期则重新挂定时器）
    pub async fn retrigger_draw(&self, activity_id: Uuid) -> AppResult<ScheduleOutcome> {
        let detail = self
            .store
            .get_activity(activity_id)
            .await?
            .ok_or_else(|| AppError::activity_not_found(activity_id))?;
        lifecycle::ensure_can(LifecycleAction::Draw, detail.activity.state)?;

        self.store.clear_draw_failure(activity_id).await?;
        log::info!("Draw for activity {activity_id} re-triggered by operator");
        self.scheduler
            .schedule_draw(activity_id, detail.activity.deadline)
            .await
    }

    /// 删除活动及其子记录，仅创建者可操作，进行中的活动不可删除
    pub async fn delete_activity(&self, activity_id: Uuid, requester_id: &str) -> AppResult<()> {
        let detail = self
            .store
            .get_activity(activity_id)
            .await?
            .ok_or_else(|| AppError::activity_not_found(activity_id))?;

        if detail.activity.creator_id != requester_id {
            return Err(AppError::Forbidden(
                "Only the creator can delete this activity".into(),
            ));
        }
        lifecycle::ensure_deletable(detail.activity.state)?;

        self.scheduler.cancel_timer(activity_id).await;
        self.store.delete_activity_cascade(activity_id).await?;
        log::info!("Activity {activity_id} deleted by {requester_id}");
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::services::notifier::LogNotifier;
    use crate::store::MemoryActivityStore;
    use chrono::Duration;

    fn service() -> RaffleService {
        let store: Arc<dyn ActivityStore> = Arc::new(MemoryActivityStore::new());
        let scheduler = DrawScheduler::new(
            store.clone(),
            Arc::new(LogNotifier),
            SchedulerConfig::default(),
        );
        RaffleService::new(store, scheduler)
    }

    fn request(name: &str) -> CreateActivityRequest {
        CreateActivityRequest {
            name: name.into(),
            group_id: "group-1".into(),
            deadline: Utc::now() + Duration::hours(1),
            prize_lines: vec![PrizeLine::new("Gold", "gold coin", 1)],
            keyword: Some("  Lucky ".into()),
            gesture_id: Some("🎉".into()),
        }
    }

    #[tokio::test]
    async fn test_create_activity_validation() {
        let svc = service();

        let mut req = request("   ");
        assert!(matches!(
            svc.create_activity(req, "owner").await,
            Err(AppError::ValidationError(_))
        ));

        req = request("Giveaway");
        req.deadline = Utc::now() - Duration::seconds(1);
        assert!(matches!(
            svc.create_activity(req, "owner").await,
            Err(AppError::ValidationError(_))
        ));

        req = request("Giveaway");
        req.prize_lines.clear();
        assert!(matches!(
            svc.create_activity(req, "owner").await,
            Err(AppError::ValidationError(_))
        ));

        req = request("Giveaway");
        req.prize_lines.push(PrizeLine::new("Silver", "", 0));
        assert!(matches!(
            svc.create_activity(req, "owner").await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_create_activity_arms_timer() {
        let svc = service();
        let activity = svc.create_activity(request("Giveaway"), "owner").await.unwrap();

        assert_eq!(activity.state, ActivityState::Active);
        assert_eq!(activity.keyword.as_deref(), Some("Lucky"));
        assert!(svc.scheduler().has_timer(activity.id).await);
        assert_eq!(
            svc.scheduler().timer_deadline(activity.id).await,
            Some(activity.deadline)
        );
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let svc = service();
        let activity = svc.create_activity(request("Giveaway"), "owner").await.unwrap();

        let err = svc.cancel(activity.id, "someone-else").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let cancelled = svc.cancel(activity.id, "owner").await.unwrap();
        assert_eq!(cancelled.state, ActivityState::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert!(!svc.scheduler().has_timer(activity.id).await);

        let err = svc.cancel(activity.id, "owner").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Conflict {
                state: ActivityState::Cancelled,
                ..
            }
        ));

        let err = svc.cancel(Uuid::now_v7(), "owner").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_match_join() {
        let svc = service();
        let activity = svc.create_activity(request("Giveaway"), "owner").await.unwrap();

        let found = svc
            .match_join("group-1", Some(" lucky "), None)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, activity.id);

        let found = svc.match_join("group-1", None, Some("🎉")).await.unwrap();
        assert_eq!(found.len(), 1);

        assert!(svc.match_join("group-1", Some("unlucky"), None).await.unwrap().is_empty());
        assert!(svc.match_join("group-2", Some("lucky"), None).await.unwrap().is_empty());
        assert!(svc.match_join("group-1", None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let svc = service();
        let activity = svc.create_activity(request("Giveaway"), "owner").await.unwrap();

        let err = svc.delete_activity(activity.id, "owner").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Conflict {
                state: ActivityState::Active,
                ..
            }
        ));

        svc.cancel(activity.id, "owner").await.unwrap();
        let err = svc.delete_activity(activity.id, "intruder").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        svc.delete_activity(activity.id, "owner").await.unwrap();
        assert!(svc.get_activity_detail(activity.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_only_lists_terminal_activities() {
        let svc = service();
        let open = svc.create_activity(request("Open"), "owner").await.unwrap();
        let closed = svc.create_activity(request("Closed"), "owner").await.unwrap();
        svc.cancel(closed.id, "owner").await.unwrap();

        let page = svc
            .list_history(&ActivityHistoryQuery {
                group_id: "group-1".into(),
                page: None,
                per_page: None,
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].id, closed.id);
        assert!(page.data.iter().all(|a| a.id != open.id));
    }

    #[tokio::test]
    async fn test_attach_announcement() {
        let svc = service();
        let activity = svc.create_activity(request("Giveaway"), "owner").await.unwrap();

        let updated = svc.attach_announcement(activity.id, "msg-42").await.unwrap();
        assert_eq!(updated.announcement_ref.as_deref(), Some("msg-42"));

        assert!(matches!(
            svc.attach_announcement(activity.id, "  ").await,
            Err(AppError::ValidationError(_))
        ));
    }
}
