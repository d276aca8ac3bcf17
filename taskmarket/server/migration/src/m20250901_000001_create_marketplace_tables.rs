use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Username,
    Email,
    PasswordHash,
    DisplayName,
    Bio,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Tasks {
    Table,
    Id,
    Title,
    Description,
    Category,
    BudgetCents,
    Location,
    Status,
    PosterId,
    AssigneeId,
    DueDate,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Offers {
    Table,
    Id,
    TaskId,
    BidderId,
    AmountCents,
    Message,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Chats {
    Table,
    Id,
    TaskId,
    PosterId,
    ParticipantId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Messages {
    Table,
    Id,
    ChatId,
    SenderId,
    Body,
    CreatedAt,
    ReadAt,
}

#[derive(DeriveIden)]
enum Reviews {
    Table,
    Id,
    TaskId,
    ReviewerId,
    RevieweeId,
    Rating,
    Comment,
    CreatedAt,
}

const FK_TASKS_POSTER: &str = "fk-tasks-poster_id";
const FK_TASKS_ASSIGNEE: &str = "fk-tasks-assignee_id";
const FK_OFFERS_TASK: &str = "fk-offers-task_id";
const FK_OFFERS_BIDDER: &str = "fk-offers-bidder_id";
const FK_CHATS_TASK: &str = "fk-chats-task_id";
const FK_CHATS_POSTER: &str = "fk-chats-poster_id";
const FK_CHATS_PARTICIPANT: &str = "fk-chats-participant_id";
const FK_MESSAGES_CHAT: &str = "fk-messages-chat_id";
const FK_MESSAGES_SENDER: &str = "fk-messages-sender_id";
const FK_REVIEWS_TASK: &str = "fk-reviews-task_id";
const FK_REVIEWS_REVIEWER: &str = "fk-reviews-reviewer_id";
const FK_REVIEWS_REVIEWEE: &str = "fk-reviews-reviewee_id";
const UQ_CHATS_TASK_PARTICIPANT: &str = "uq-chats-task_id-participant_id";
const UQ_REVIEWS_TASK_REVIEWER: &str = "uq-reviews-task_id-reviewer_id";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(string_len_uniq(Users::Username, 32))
                    .col(string_uniq(Users::Email))
                    .col(string(Users::PasswordHash))
                    .col(string_len(Users::DisplayName, 64))
                    .col(text_null(Users::Bio))
                    .col(timestamp_with_time_zone(Users::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Tasks::Table)
                    .if_not_exists()
                    .col(pk_auto(Tasks::Id))
                    .col(string_len(Tasks::Title, 120))
                    .col(text(Tasks::Description))
                    .col(string_len(Tasks::Category, 40))
                    .col(big_integer(Tasks::BudgetCents))
                    .col(string_len_null(Tasks::Location, 120))
                    .col(string_len(Tasks::Status, 16))
                    .col(integer(Tasks::PosterId))
                    .col(integer_null(Tasks::AssigneeId))
                    .col(timestamp_with_time_zone_null(Tasks::DueDate))
                    .col(timestamp_with_time_zone(Tasks::CreatedAt))
                    .col(timestamp_with_time_zone(Tasks::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name(FK_TASKS_POSTER)
                            .from(Tasks::Table, Tasks::PosterId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name(FK_TASKS_ASSIGNEE)
                            .from(Tasks::Table, Tasks::AssigneeId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Offers::Table)
                    .if_not_exists()
                    .col(pk_auto(Offers::Id))
                    .col(integer(Offers::TaskId))
                    .col(integer(Offers::BidderId))
                    .col(big_integer(Offers::AmountCents))
                    .col(text(Offers::Message))
                    .col(string_len(Offers::Status, 16))
                    .col(timestamp_with_time_zone(Offers::CreatedAt))
                    .col(timestamp_with_time_zone(Offers::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name(FK_OFFERS_TASK)
                            .from(Offers::Table, Offers::TaskId)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name(FK_OFFERS_BIDDER)
                            .from(Offers::Table, Offers::BidderId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Chats::Table)
                    .if_not_exists()
                    .col(pk_auto(Chats::Id))
                    .col(integer(Chats::TaskId))
                    .col(integer(Chats::PosterId))
                    .col(integer(Chats::ParticipantId))
                    .col(timestamp_with_time_zone(Chats::CreatedAt))
                    .col(timestamp_with_time_zone(Chats::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name(FK_CHATS_TASK)
                            .from(Chats::Table, Chats::TaskId)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name(FK_CHATS_POSTER)
                            .from(Chats::Table, Chats::PosterId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name(FK_CHATS_PARTICIPANT)
                            .from(Chats::Table, Chats::ParticipantId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(UQ_CHATS_TASK_PARTICIPANT)
                    .table(Chats::Table)
                    .col(Chats::TaskId)
                    .col(Chats::ParticipantId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Messages::Table)
                    .if_not_exists()
                    .col(pk_auto(Messages::Id))
                    .col(integer(Messages::ChatId))
                    .col(integer(Messages::SenderId))
                    .col(text(Messages::Body))
                    .col(timestamp_with_time_zone(Messages::CreatedAt))
                    .col(timestamp_with_time_zone_null(Messages::ReadAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name(FK_MESSAGES_CHAT)
                            .from(Messages::Table, Messages::ChatId)
                            .to(Chats::Table, Chats::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name(FK_MESSAGES_SENDER)
                            .from(Messages::Table, Messages::SenderId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Reviews::Table)
                    .if_not_exists()
                    .col(pk_auto(Reviews::Id))
                    .col(integer(Reviews::TaskId))
                    .col(integer(Reviews::ReviewerId))
                    .col(integer(Reviews::RevieweeId))
                    .col(small_integer(Reviews::Rating))
                    .col(text(Reviews::Comment))
                    .col(timestamp_with_time_zone(Reviews::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name(FK_REVIEWS_TASK)
                            .from(Reviews::Table, Reviews::TaskId)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name(FK_REVIEWS_REVIEWER)
                            .from(Reviews::Table, Reviews::ReviewerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name(FK_REVIEWS_REVIEWEE)
                            .from(Reviews::Table, Reviews::RevieweeId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(UQ_REVIEWS_TASK_REVIEWER)
                    .table(Reviews::Table)
                    .col(Reviews::TaskId)
                    .col(Reviews::ReviewerId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Reviews::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Messages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Chats::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Offers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tasks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}
