use sea_orm_migration::prelude::extension::postgres::Type;
use sea_orm_migration::prelude::*;

/// Raffle Activities (抽奖活动)
#[derive(DeriveIden)]
enum RaffleActivities {
    Table,
    Id,
    Name,
    GroupId,
    Deadline,
    State,
    CreatorId,
    Keyword,
    GestureId,
    AnnouncementRef,
    ParticipantCount,
    DrawnAt,
    CancelledAt,
    CreatedAt,
    UpdatedAt,
}

/// Raffle Prize Lines (活动奖品行)
#[derive(DeriveIden)]
enum RafflePrizeLines {
    Table,
    Id,
    ActivityId,
    Position,
    Name,
    Description,
    Count,
}

/// Raffle Participants (报名用户)
#[derive(DeriveIden)]
enum RaffleParticipants {
    Table,
    Id,
    ActivityId,
    UserId,
    DisplayName,
    JoinedAt,
}

/// Raffle Winners (中奖记录)
#[derive(DeriveIden)]
enum RaffleWinners {
    Table,
    Id,
    ActivityId,
    UserId,
    DisplayName,
    PrizeName,
    WonAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

/// 子表全部 ON DELETE CASCADE：删除活动时奖品行、报名、中奖记录一起清除
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(Alias::new("raffle_state"))
                    .values(vec![
                        Alias::new("pending"),
                        Alias::new("active"),
                        Alias::new("drawn"),
                        Alias::new("cancelled"),
                    ])
                    .to_owned(),
            )
            .await?;

        // 活动表
        manager
            .create_table(
                Table::create()
                    .table(RaffleActivities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RaffleActivities::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RaffleActivities::Name)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RaffleActivities::GroupId)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RaffleActivities::Deadline)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RaffleActivities::State)
                            .custom(Alias::new("raffle_state"))
                            .not_null()
                            .default(Expr::cust("'pending'::raffle_state")),
                    )
                    .col(
                        ColumnDef::new(RaffleActivities::CreatorId)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RaffleActivities::Keyword)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RaffleActivities::GestureId)
                            .string_len(128)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RaffleActivities::AnnouncementRef)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RaffleActivities::ParticipantCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RaffleActivities::DrawnAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RaffleActivities::CancelledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RaffleActivities::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(RaffleActivities::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        // 按群组 + 状态查询
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_raffle_activities_group_state")
                    .table(RaffleActivities::Table)
                    .col(RaffleActivities::GroupId)
                    .col(RaffleActivities::State)
                    .to_owned(),
            )
            .await?;

        // 启动恢复时按状态扫描
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_raffle_activities_state_deadline")
                    .table(RaffleActivities::Table)
                    .col(RaffleActivities::State)
                    .col(RaffleActivities::Deadline)
                    .to_owned(),
            )
            .await?;

        // 奖品行
        manager
            .create_table(
                Table::create()
                    .table(RafflePrizeLines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RafflePrizeLines::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RafflePrizeLines::ActivityId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RafflePrizeLines::Position)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RafflePrizeLines::Name)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RafflePrizeLines::Description)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(RafflePrizeLines::Count)
                            .integer()
                            .not_null()
                            .check(Expr::col(RafflePrizeLines::Count).gt(0)),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_raffle_prize_line_activity")
                            .from(RafflePrizeLines::Table, RafflePrizeLines::ActivityId)
                            .to(RaffleActivities::Table, RaffleActivities::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_raffle_prize_lines_activity")
                    .table(RafflePrizeLines::Table)
                    .col(RafflePrizeLines::ActivityId)
                    .col(RafflePrizeLines::Position)
                    .to_owned(),
            )
            .await?;

        // 报名表
        manager
            .create_table(
                Table::create()
                    .table(RaffleParticipants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RaffleParticipants::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RaffleParticipants::ActivityId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RaffleParticipants::UserId)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RaffleParticipants::DisplayName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RaffleParticipants::JoinedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_raffle_participant_activity")
                            .from(RaffleParticipants::Table, RaffleParticipants::ActivityId)
                            .to(RaffleActivities::Table, RaffleActivities::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // (activity_id, user_id) 唯一：报名去重的最终保证
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_raffle_participants_activity_user_unique")
                    .table(RaffleParticipants::Table)
                    .col(RaffleParticipants::ActivityId)
                    .col(RaffleParticipants::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 中奖记录
        manager
            .create_table(
                Table::create()
                    .table(RaffleWinners::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RaffleWinners::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RaffleWinners::ActivityId).uuid().not_null())
                    .col(
                        ColumnDef::new(RaffleWinners::UserId)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RaffleWinners::DisplayName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RaffleWinners::PrizeName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RaffleWinners::WonAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_raffle_winner_activity")
                            .from(RaffleWinners::Table, RaffleWinners::ActivityId)
                            .to(RaffleActivities::Table, RaffleActivities::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 同一活动内一个用户最多中奖一次
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_raffle_winners_activity_user_unique")
                    .table(RaffleWinners::Table)
                    .col(RaffleWinners::ActivityId)
                    .col(RaffleWinners::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 删除顺序：子表 -> 活动 -> 枚举类型
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(RaffleWinners::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(RaffleParticipants::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(RafflePrizeLines::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(RaffleActivities::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_type(
                Type::drop()
                    .if_exists()
                    .name(Alias::new("raffle_state"))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}
