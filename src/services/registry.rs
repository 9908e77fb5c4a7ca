use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::JoinResult;
use crate::store::{ActivityStore, AppendOutcome};

/// 报名登记：一个用户在一个活动内最多报名一次。
///
/// 去重和开放状态检查由存储层在写入时原子完成，这里只做结果翻译，
/// 不做先读后写的判断。
#[derive(Clone)]
pub struct ParticipantRegistry {
    store: Arc<dyn ActivityStore>,
}

impl ParticipantRegistry {
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self { store }
    }

    pub async fn join(
        &self,
        activity_id: Uuid,
        user_id: &str,
        display_name: &str,
    ) -> AppResult<JoinResult> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::ValidationError("User id is required".into()));
        }
        // 显示名为空时退回用户ID
        let display_name = match display_name.trim() {
            "" => user_id,
            name => name,
        };

        let outcome = self
            .store
            .append_participant(activity_id, user_id, display_name)
            .await?;

        let result = match outcome {
            AppendOutcome::Appended => {
                log::info!("User {user_id} joined activity {activity_id}");
                JoinResult::Joined
            }
            AppendOutcome::AlreadyPresent => JoinResult::AlreadyJoined,
            AppendOutcome::NotOpen(state) => {
                log::debug!("Join by {user_id} refused, activity {activity_id} is {state}");
                JoinResult::ActivityNotOpen { state }
            }
        };
        Ok(result)
    }

    pub async fn count(&self, activity_id: Uuid) -> AppResult<i64> {
        let detail = self
            .store
            .get_activity(activity_id)
            .await?
            .ok_or_else(|| AppError::activity_not_found(activity_id))?;
        Ok(detail.participants.len() as i64)
    }

    pub async fn has_joined(&self, activity_id: Uuid, user_id: &str) -> AppResult<bool> {
        self.store.has_participant(activity_id, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ActivityState;
    use crate::models::{NewActivity, PrizeLine};
    use crate::store::MemoryActivityStore;
    use chrono::{Duration, Utc};

    async fn setup() -> (ParticipantRegistry, Arc<MemoryActivityStore>, Uuid) {
        let store = Arc::new(MemoryActivityStore::new());
        let activity = store
            .create_activity(
                NewActivity {
                    name: "Giveaway".into(),
                    group_id: "g".into(),
                    deadline: Utc::now() + Duration::minutes(5),
                    creator_id: "owner".into(),
                    keyword: None,
                    gesture_id: None,
                },
                vec![PrizeLine::new("Gold", "", 1)],
            )
            .await
            .unwrap();
        store
            .set_state(activity.id, ActivityState::Pending, ActivityState::Active)
            .await
            .unwrap();
        (ParticipantRegistry::new(store.clone()), store, activity.id)
    }

    #[tokio::test]
    async fn test_join_outcomes() {
        let (registry, store, id) = setup().await;

        assert_eq!(registry.join(id, "u1", "One").await.unwrap(), JoinResult::Joined);
        assert_eq!(
            registry.join(id, "u1", "One").await.unwrap(),
            JoinResult::AlreadyJoined
        );
        assert_eq!(registry.count(id).await.unwrap(), 1);
        assert!(registry.has_joined(id, "u1").await.unwrap());

        store
            .set_state(id, ActivityState::Active, ActivityState::Cancelled)
            .await
            .unwrap();
        assert_eq!(
            registry.join(id, "u2", "Two").await.unwrap(),
            JoinResult::ActivityNotOpen {
                state: ActivityState::Cancelled
            }
        );
        assert_eq!(registry.count(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blank_display_name_falls_back_to_user_id() {
        let (registry, store, id) = setup().await;
        registry.join(id, "u9", "   ").await.unwrap();
        let detail = store.get_activity(id).await.unwrap().unwrap();
        assert_eq!(detail.participants[0].display_name, "u9");
    }

    #[tokio::test]
    async fn test_unknown_activity_is_not_found() {
        let (registry, _store, _id) = setup().await;
        let err = registry.join(Uuid::now_v7(), "u1", "One").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
