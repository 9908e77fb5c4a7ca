use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use super::{ActivityStore, AppendOutcome, DrawCommit, DrawFn};
use crate::entities::{
    ActivityState, activity_entity as activities, participant_entity as participants,
    prize_line_entity as prize_lines, winner_entity as winners,
};
use crate::error::{AppError, AppResult};
use crate::models::{Activity, ActivityDetail, NewActivity, PrizeLine};
use crate::services::lifecycle::{self, LifecycleAction};

/// PostgreSQL 存储
///
/// 并发控制全部落在 raffle_activities 行上：
/// - 报名: `UPDATE ... SET participant_count = participant_count + 1 WHERE state = 'active'`
///   与插入报名记录在同一事务，唯一索引兜底去重
/// - 开奖: `SELECT ... FOR UPDATE` 锁住活动行后，在同一事务内读取奖品行与报名、
///   分配、写入中奖记录并切换为 drawn。报名的计数 UPDATE 需要同一行锁，
///   因此要么在开奖前提交，要么在开奖后看到 drawn
pub struct DbActivityStore {
    pool: DatabaseConnection,
}

impl DbActivityStore {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    async fn find_model(&self, id: Uuid) -> AppResult<activities::Model> {
        activities::Entity::find_by_id(id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::activity_not_found(id))
    }
}

#[async_trait]
impl ActivityStore for DbActivityStore {
    async fn create_activity(
        &self,
        activity: NewActivity,
        lines: Vec<PrizeLine>,
    ) -> AppResult<Activity> {
        let txn = self.pool.begin().await?;
        let now = Utc::now();

        let model = activities::ActiveModel {
            id: Set(Uuid::now_v7()),
            name: Set(activity.name),
            group_id: Set(activity.group_id),
            deadline: Set(activity.deadline),
            state: Set(ActivityState::Pending),
            creator_id: Set(activity.creator_id),
            keyword: Set(activity.keyword),
            gesture_id: Set(activity.gesture_id),
            announcement_ref: Set(None),
            participant_count: Set(0),
            draw_attempts: Set(0),
            draw_error: Set(None),
            drawn_at: Set(None),
            cancelled_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        if !lines.is_empty() {
            prize_lines::Entity::insert_many(lines.into_iter().enumerate().map(|(i, line)| {
                prize_lines::ActiveModel {
                    activity_id: Set(model.id),
                    position: Set(i as i32),
                    name: Set(line.name),
                    description: Set(line.description),
                    count: Set(line.count),
                    ..Default::default()
                }
            }))
            .exec(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(model.into())
    }

    async fn get_activity(&self, id: Uuid) -> AppResult<Option<ActivityDetail>> {
        let Some(model) = activities::Entity::find_by_id(id).one(&self.pool).await? else {
            return Ok(None);
        };

        let lines = prize_lines::Entity::find()
            .filter(prize_lines::Column::ActivityId.eq(id))
            .order_by_asc(prize_lines::Column::Position)
            .all(&self.pool)
            .await?;

        let joined = participants::Entity::find()
            .filter(participants::Column::ActivityId.eq(id))
            .order_by_asc(participants::Column::Id)
            .all(&self.pool)
            .await?;

        let won = winners::Entity::find()
            .filter(winners::Column::ActivityId.eq(id))
            .order_by_asc(winners::Column::Id)
            .all(&self.pool)
            .await?;

        Ok(Some(ActivityDetail {
            activity: model.into(),
            prize_lines: lines.into_iter().map(Into::into).collect(),
            participants: joined.into_iter().map(Into::into).collect(),
            winners: won.into_iter().map(Into::into).collect(),
        }))
    }

    async fn list_activities(
        &self,
        group_id: &str,
        state: Option<ActivityState>,
    ) -> AppResult<Vec<Activity>> {
        let mut query =
            activities::Entity::find().filter(activities::Column::GroupId.eq(group_id));
        if let Some(state) = state {
            query = query.filter(activities::Column::State.eq(state));
        }
        let list = query
            .order_by_asc(activities::Column::CreatedAt)
            .all(&self.pool)
            .await?;
        Ok(list.into_iter().map(Into::into).collect())
    }

    async fn list_by_state(&self, state: ActivityState) -> AppResult<Vec<Activity>> {
        let list = activities::Entity::find()
            .filter(activities::Column::State.eq(state))
            .order_by_asc(activities::Column::Deadline)
            .all(&self.pool)
            .await?;
        Ok(list.into_iter().map(Into::into).collect())
    }

    async fn list_history(
        &self,
        group_id: &str,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<Activity>, i64)> {
        let base_query = activities::Entity::find()
            .filter(activities::Column::GroupId.eq(group_id))
            .filter(
                Condition::any()
                    .add(activities::Column::State.eq(ActivityState::Drawn))
                    .add(activities::Column::State.eq(ActivityState::Cancelled)),
            );

        let total = base_query.clone().count(&self.pool).await? as i64;

        let items = base_query
            .order_by_desc(activities::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&self.pool)
            .await?;

        Ok((items.into_iter().map(Into::into).collect(), total))
    }

    async fn list_flagged(&self) -> AppResult<Vec<Activity>> {
        let list = activities::Entity::find()
            .filter(activities::Column::State.eq(ActivityState::Active))
            .filter(activities::Column::DrawError.is_not_null())
            .order_by_asc(activities::Column::Deadline)
            .all(&self.pool)
            .await?;
        Ok(list.into_iter().map(Into::into).collect())
    }

    async fn set_state(
        &self,
        id: Uuid,
        from: ActivityState,
        to: ActivityState,
    ) -> AppResult<Activity> {
        lifecycle::ensure_transition(from, to)?;

        let now = Utc::now();
        let mut am = activities::ActiveModel {
            state: Set(to),
            updated_at: Set(now),
            ..Default::default()
        };
        match to {
            ActivityState::Cancelled => am.cancelled_at = Set(Some(now)),
            ActivityState::Drawn => am.drawn_at = Set(Some(now)),
            _ => {}
        }

        // CAS: 仅当当前状态仍为 from 时更新
        let result = activities::Entity::update_many()
            .set(am)
            .filter(activities::Column::Id.eq(id))
            .filter(activities::Column::State.eq(from))
            .exec(&self.pool)
            .await?;

        let current = self.find_model(id).await?;
        if result.rows_affected == 0 {
            return Err(AppError::conflict(
                LifecycleAction::for_target(to).as_str(),
                current.state,
            ));
        }
        Ok(current.into())
    }

    async fn append_participant(
        &self,
        id: Uuid,
        user_id: &str,
        display_name: &str,
    ) -> AppResult<AppendOutcome> {
        let txn = self.pool.begin().await?;

        // 先占住活动行（行锁），与开奖提交串行；状态不是 active 时不计数
        let bumped = activities::Entity::update_many()
            .col_expr(
                activities::Column::ParticipantCount,
                Expr::col(activities::Column::ParticipantCount).add(1),
            )
            .col_expr(activities::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(activities::Column::Id.eq(id))
            .filter(activities::Column::State.eq(ActivityState::Active))
            .exec(&txn)
            .await?;

        if bumped.rows_affected == 0 {
            let current = activities::Entity::find_by_id(id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::activity_not_found(id))?;
            return Ok(AppendOutcome::NotOpen(current.state));
        }

        let inserted = participants::Entity::insert(participants::ActiveModel {
            activity_id: Set(id),
            user_id: Set(user_id.to_string()),
            display_name: Set(display_name.to_string()),
            joined_at: Set(Utc::now()),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([
                participants::Column::ActivityId,
                participants::Column::UserId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

        if inserted == 0 {
            // 已报名：回滚计数
            txn.rollback().await?;
            return Ok(AppendOutcome::AlreadyPresent);
        }

        txn.commit().await?;
        Ok(AppendOutcome::Appended)
    }

    async fn has_participant(&self, id: Uuid, user_id: &str) -> AppResult<bool> {
        let count = participants::Entity::find()
            .filter(participants::Column::ActivityId.eq(id))
            .filter(participants::Column::UserId.eq(user_id))
            .count(&self.pool)
            .await?;
        if count > 0 {
            return Ok(true);
        }
        self.find_model(id).await?;
        Ok(false)
    }

    async fn draw_exclusive(&self, id: Uuid, draw: DrawFn<'_>) -> AppResult<DrawCommit> {
        let txn = self.pool.begin().await?;

        let model = activities::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::activity_not_found(id))?;
        if model.state != ActivityState::Active {
            txn.rollback().await?;
            return Ok(DrawCommit::NotActive(model.state));
        }

        let lines = prize_lines::Entity::find()
            .filter(prize_lines::Column::ActivityId.eq(id))
            .order_by_asc(prize_lines::Column::Position)
            .all(&txn)
            .await?;
        let joined = participants::Entity::find()
            .filter(participants::Column::ActivityId.eq(id))
            .order_by_asc(participants::Column::Id)
            .all(&txn)
            .await?;

        let mut detail = ActivityDetail {
            activity: model.into(),
            prize_lines: lines.into_iter().map(Into::into).collect(),
            participants: joined.into_iter().map(Into::into).collect(),
            winners: vec![],
        };
        detail.winners = draw(&detail);

        if !detail.winners.is_empty() {
            winners::Entity::insert_many(detail.winners.iter().cloned().map(|w| {
                winners::ActiveModel {
                    activity_id: Set(w.activity_id),
                    user_id: Set(w.user_id),
                    display_name: Set(w.display_name),
                    prize_name: Set(w.prize_name),
                    won_at: Set(w.won_at),
                    ..Default::default()
                }
            }))
            .exec_without_returning(&txn)
            .await?;
        }

        let now = Utc::now();
        activities::Entity::update_many()
            .set(activities::ActiveModel {
                state: Set(ActivityState::Drawn),
                drawn_at: Set(Some(now)),
                draw_error: Set(None),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(activities::Column::Id.eq(id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        detail.activity.state = ActivityState::Drawn;
        detail.activity.drawn_at = Some(now);
        detail.activity.draw_error = None;
        Ok(DrawCommit::Drawn(detail))
    }

    async fn flag_draw_failure(&self, id: Uuid, attempts: i32, error: &str) -> AppResult<()> {
        activities::Entity::update_many()
            .col_expr(
                activities::Column::DrawAttempts,
                Expr::col(activities::Column::DrawAttempts).add(attempts),
            )
            .col_expr(
                activities::Column::DrawError,
                Expr::value(Some(error.to_string())),
            )
            .col_expr(activities::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(activities::Column::Id.eq(id))
            .filter(activities::Column::State.eq(ActivityState::Active))
            .exec(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_draw_failure(&self, id: Uuid) -> AppResult<()> {
        activities::Entity::update_many()
            .col_expr(activities::Column::DrawError, Expr::value(None::<String>))
            .col_expr(activities::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(activities::Column::Id.eq(id))
            .exec(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_announcement(&self, id: Uuid, message_ref: &str) -> AppResult<Activity> {
        let model = self.find_model(id).await?;
        lifecycle::ensure_annotatable(model.state)?;
        let mut am = model.into_active_model();
        am.announcement_ref = Set(Some(message_ref.to_string()));
        am.updated_at = Set(Utc::now());
        let updated = am.update(&self.pool).await?;
        Ok(updated.into())
    }

    async fn delete_activity_cascade(&self, id: Uuid) -> AppResult<()> {
        // 子表外键 ON DELETE CASCADE，单条语句即原子删除
        let result = activities::Entity::delete_by_id(id)
            .exec(&self.pool)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::activity_not_found(id));
        }
        Ok(())
    }
}
