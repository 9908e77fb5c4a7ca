use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 活动状态
/// - pending: 创建中（奖品行尚未挂载完成）
/// - active: 可报名，调度器持有定时器
/// - drawn: 已开奖（终态）
/// - cancelled: 已取消（终态）
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    ToSchema,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "raffle_state")]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "drawn")]
    Drawn,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl std::fmt::Display for ActivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityState::Pending => write!(f, "pending"),
            ActivityState::Active => write!(f, "active"),
            ActivityState::Drawn => write!(f, "drawn"),
            ActivityState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// 抽奖活动实体
/// - id 使用 UUID v7（按时间有序）
/// - deadline 创建后不可修改，取消只改变状态
/// - participant_count 与报名记录在同一事务内维护；报名的计数 UPDATE 与开奖的 FOR UPDATE 争用同一行锁
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "raffle_activities")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub group_id: String,
    pub deadline: DateTime<Utc>,
    pub state: ActivityState,
    pub creator_id: String,
    pub keyword: Option<String>,
    pub gesture_id: Option<String>,
    pub announcement_ref: Option<String>,
    pub participant_count: i32,
    /// 开奖持久化失败次数
    pub draw_attempts: i32,
    /// 最近一次开奖失败原因（非空即为待运维处理）
    pub draw_error: Option<String>,
    pub drawn_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
