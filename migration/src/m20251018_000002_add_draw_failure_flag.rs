use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum RaffleActivities {
    Table,
    DrawAttempts,
    DrawError,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

/// 开奖持久化多次失败后给活动打标记，供运维发现并手动重新开奖
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if !manager
            .has_column("raffle_activities", "draw_attempts")
            .await?
        {
            manager
                .alter_table(
                    Table::alter()
                        .table(RaffleActivities::Table)
                        .add_column(
                            ColumnDef::new(RaffleActivities::DrawAttempts)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;
        }

        if !manager.has_column("raffle_activities", "draw_error").await? {
            manager
                .alter_table(
                    Table::alter()
                        .table(RaffleActivities::Table)
                        .add_column(ColumnDef::new(RaffleActivities::DrawError).text().null())
                        .to_owned(),
                )
                .await?;
        }

        // Partial index: only flagged activities are ever looked up by this column
        let stmt = sea_orm::Statement::from_string(
            manager.get_database_backend(),
            "CREATE INDEX IF NOT EXISTS idx_raffle_activities_draw_error ON raffle_activities(id) WHERE draw_error IS NOT NULL".to_owned(),
        );
        manager.get_connection().execute(stmt).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let stmt = sea_orm::Statement::from_string(
            manager.get_database_backend(),
            "DROP INDEX IF EXISTS idx_raffle_activities_draw_error".to_owned(),
        );
        manager.get_connection().execute(stmt).await?;

        manager
            .alter_table(
                Table::alter()
                    .table(RaffleActivities::Table)
                    .drop_column(RaffleActivities::DrawError)
                    .drop_column(RaffleActivities::DrawAttempts)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}
