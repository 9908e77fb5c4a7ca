use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 活动奖品行
/// - position: 创建时的顺序，开奖按此顺序消耗
/// - count: 可中奖人数（> 0，数据库有 CHECK 约束）
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "raffle_prize_lines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub activity_id: Uuid,
    pub position: i32,
    pub name: String,
    pub description: String,
    pub count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
