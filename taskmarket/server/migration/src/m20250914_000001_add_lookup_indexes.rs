use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Tasks {
    Table,
    Status,
    PosterId,
}

#[derive(DeriveIden)]
enum Offers {
    Table,
    TaskId,
}

#[derive(DeriveIden)]
enum Messages {
    Table,
    ChatId,
}

#[derive(DeriveIden)]
enum Reviews {
    Table,
    RevieweeId,
}

const IDX_TASKS_STATUS: &str = "idx-tasks-status";
const IDX_TASKS_POSTER: &str = "idx-tasks-poster_id";
const IDX_OFFERS_TASK: &str = "idx-offers-task_id";
const IDX_MESSAGES_CHAT: &str = "idx-messages-chat_id";
const IDX_REVIEWS_REVIEWEE: &str = "idx-reviews-reviewee_id";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name(IDX_TASKS_STATUS)
                    .table(Tasks::Table)
                    .col(Tasks::Status)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name(IDX_TASKS_POSTER)
                    .table(Tasks::Table)
                    .col(Tasks::PosterId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name(IDX_OFFERS_TASK)
                    .table(Offers::Table)
                    .col(Offers::TaskId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name(IDX_MESSAGES_CHAT)
                    .table(Messages::Table)
                    .col(Messages::ChatId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name(IDX_REVIEWS_REVIEWEE)
                    .table(Reviews::Table)
                    .col(Reviews::RevieweeId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name(IDX_REVIEWS_REVIEWEE)
                    .table(Reviews::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name(IDX_MESSAGES_CHAT)
                    .table(Messages::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name(IDX_OFFERS_TASK)
                    .table(Offers::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name(IDX_TASKS_POSTER)
                    .table(Tasks::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name(IDX_TASKS_STATUS)
                    .table(Tasks::Table)
                    .to_owned(),
            )
            .await
    }
}
