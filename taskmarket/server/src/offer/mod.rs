use crate::entities::offer::OfferStatus;
use crate::entities::task::TaskStatus;
use crate::entities::*;
use crate::task::{InvalidTransition, TaskAction, TaskServiceError, find_task, transition_task};
use crate::validation::{ValidationError, optional_text, positive_cents};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;

pub mod api;

const MAX_MESSAGE_LEN: usize = 1000;

/// A bid on an open task.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Offer {
    pub id: i32,
    pub task_id: i32,
    pub bidder_id: i32,
    pub amount_cents: i64,
    pub message: String,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<offer::Model> for Offer {
    fn from(model: offer::Model) -> Self {
        Self {
            id: model.id,
            task_id: model.task_id,
            bidder_id: model.bidder_id,
            amount_cents: model.amount_cents,
            message: model.message,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Input for [`OfferService::submit_offer`].
#[derive(Debug, Clone)]
pub struct NewOffer {
    pub amount_cents: i64,
    pub message: Option<String>,
}

/// Error type for OfferService operations.
#[derive(Debug, thiserror::Error)]
pub enum OfferServiceError {
    #[error("Offer with ID {0} not found")]
    OfferNotFound(i32),
    #[error("Task with ID {0} not found")]
    TaskNotFound(i32),
    #[error("Task {} is not open for offers (it is {})", .0, .1.phrase())]
    TaskNotOpen(i32, TaskStatus),
    #[error("You already have a pending offer on task {0}")]
    DuplicateOffer(i32),
    #[error("Offer {0} is no longer pending")]
    OfferNotPending(i32),
    #[error(transparent)]
    InvalidTransition(InvalidTransition),
    #[error("{0}")]
    Forbidden(String),
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl From<TaskServiceError> for OfferServiceError {
    fn from(err: TaskServiceError) -> Self {
        match err {
            TaskServiceError::TaskNotFound(id) => OfferServiceError::TaskNotFound(id),
            TaskServiceError::InvalidTransition(transition) => {
                OfferServiceError::InvalidTransition(transition)
            }
            TaskServiceError::NotEditable(id, status) => OfferServiceError::TaskNotOpen(id, status),
            TaskServiceError::Forbidden(message) => OfferServiceError::Forbidden(message),
            TaskServiceError::Validation(validation) => OfferServiceError::Validation(validation),
            TaskServiceError::Database(db) => OfferServiceError::Database(db),
        }
    }
}

pub struct OfferService<'a> {
    db: &'a DatabaseConnection,
}

impl OfferService<'_> {
    pub fn new(db: &DatabaseConnection) -> OfferService<'_> {
        OfferService { db }
    }

    /// Places a bid on an open task. A bidder may hold at most one pending offer per task.
    #[tracing::instrument(skip(self, new_offer))]
    pub async fn submit_offer(
        &self,
        task_id: i32,
        bidder_id: i32,
        new_offer: NewOffer,
    ) -> Result<Offer, OfferServiceError> {
        let amount_cents = positive_cents("amount_cents", new_offer.amount_cents)?;
        let message = optional_text("message", new_offer.message.as_deref(), MAX_MESSAGE_LEN)?
            .unwrap_or_default();

        let task = find_task(self.db, task_id).await?;
        if task.status != TaskStatus::Open {
            return Err(OfferServiceError::TaskNotOpen(task_id, task.status));
        }
        if task.poster_id == bidder_id {
            return Err(OfferServiceError::Forbidden(
                "You cannot make an offer on your own task".to_string(),
            ));
        }
        let has_pending = offer::Entity::find()
            .filter(offer::Column::TaskId.eq(task_id))
            .filter(offer::Column::BidderId.eq(bidder_id))
            .filter(offer::Column::Status.eq(OfferStatus::Pending))
            .one(self.db)
            .await?
            .is_some();
        if has_pending {
            return Err(OfferServiceError::DuplicateOffer(task_id));
        }

        let now = Utc::now();
        let active_model = offer::ActiveModel {
            task_id: ActiveValue::Set(task_id),
            bidder_id: ActiveValue::Set(bidder_id),
            amount_cents: ActiveValue::Set(amount_cents),
            message: ActiveValue::Set(message),
            status: ActiveValue::Set(OfferStatus::Pending),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        };
        let created = active_model.insert(self.db).await?;
        tracing::info!(offer_id = created.id, "Offer submitted");
        Ok(Offer::from(created))
    }

    /// Lists offers on a task, oldest first. The poster sees every offer; anyone
    /// else only sees their own.
    #[tracing::instrument(skip(self))]
    pub async fn list_offers_for_task(
        &self,
        task_id: i32,
        viewer_id: i32,
    ) -> Result<Vec<Offer>, OfferServiceError> {
        let task = find_task(self.db, task_id).await?;
        let mut query = offer::Entity::find().filter(offer::Column::TaskId.eq(task_id));
        if task.poster_id != viewer_id {
            query = query.filter(offer::Column::BidderId.eq(viewer_id));
        }
        let offers = query
            .order_by_asc(offer::Column::Id)
            .all(self.db)
            .await?
            .into_iter()
            .map(Offer::from)
            .collect();
        Ok(offers)
    }

    /// Lists the offers a user has made, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_offers_by_bidder(
        &self,
        bidder_id: i32,
    ) -> Result<Vec<Offer>, OfferServiceError> {
        let offers = offer::Entity::find()
            .filter(offer::Column::BidderId.eq(bidder_id))
            .order_by_desc(offer::Column::Id)
            .all(self.db)
            .await?
            .into_iter()
            .map(Offer::from)
            .collect();
        Ok(offers)
    }

    /// Accepts a pending offer: the bidder becomes the task's assignee, the
    /// other pending offers are rejected and a chat between the two sides is opened.
    #[tracing::instrument(skip(self))]
    pub async fn accept_offer(
        &self,
        offer_id: i32,
        user_id: i32,
    ) -> Result<Offer, OfferServiceError> {
        let txn = self.db.begin().await?;
        let existing = find_offer(&txn, offer_id).await?;
        let task = find_task(&txn, existing.task_id).await?;
        if task.poster_id != user_id {
            return Err(OfferServiceError::Forbidden(
                "Only the poster can accept offers on this task".to_string(),
            ));
        }
        if existing.status != OfferStatus::Pending {
            return Err(OfferServiceError::OfferNotPending(offer_id));
        }
        if task.status != TaskStatus::Open {
            return Err(OfferServiceError::TaskNotOpen(task.id, task.status));
        }

        let accepted = settle_offer(&txn, &existing, OfferStatus::Accepted).await?;
        transition_task(&txn, &task, TaskAction::Accept, Some(existing.bidder_id)).await?;
        settle_pending_offers(&txn, task.id, None).await?;
        crate::chat::ensure_chat(&txn, task.id, task.poster_id, existing.bidder_id).await?;
        txn.commit().await?;

        tracing::info!(offer_id, task_id = task.id, "Offer accepted");
        Ok(Offer::from(accepted))
    }

    /// Withdraws a pending offer. Only the bidder may do this.
    #[tracing::instrument(skip(self))]
    pub async fn withdraw_offer(
        &self,
        offer_id: i32,
        user_id: i32,
    ) -> Result<Offer, OfferServiceError> {
        let existing = find_offer(self.db, offer_id).await?;
        if existing.bidder_id != user_id {
            return Err(OfferServiceError::Forbidden(
                "Only the bidder can withdraw this offer".to_string(),
            ));
        }
        if existing.status != OfferStatus::Pending {
            return Err(OfferServiceError::OfferNotPending(offer_id));
        }

        let withdrawn = settle_offer(self.db, &existing, OfferStatus::Withdrawn).await?;
        tracing::info!(offer_id, "Offer withdrawn");
        Ok(Offer::from(withdrawn))
    }
}

async fn find_offer<C: ConnectionTrait>(
    conn: &C,
    offer_id: i32,
) -> Result<offer::Model, OfferServiceError> {
    offer::Entity::find_by_id(offer_id)
        .one(conn)
        .await?
        .ok_or(OfferServiceError::OfferNotFound(offer_id))
}

/// Moves a pending offer to `next` with a conditional update. An offer that
/// was settled since it was read reports `OfferNotPending`.
pub(crate) async fn settle_offer<C: ConnectionTrait>(
    conn: &C,
    offer: &offer::Model,
    next: OfferStatus,
) -> Result<offer::Model, OfferServiceError> {
    let result = offer::Entity::update_many()
        .col_expr(offer::Column::Status, Expr::value(next))
        .col_expr(offer::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(offer::Column::Id.eq(offer.id))
        .filter(offer::Column::Status.eq(OfferStatus::Pending))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        tracing::warn!(offer_id = offer.id, "Offer was settled concurrently");
        return Err(OfferServiceError::OfferNotPending(offer.id));
    }
    find_offer(conn, offer.id).await
}

/// Resolves every pending offer on a task once it leaves the Open state. The
/// winning bidder's offer is accepted and all others are rejected.
pub(crate) async fn settle_pending_offers<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
    winning_bidder: Option<i32>,
) -> Result<(), DbErr> {
    let now = Utc::now();
    if let Some(bidder_id) = winning_bidder {
        offer::Entity::update_many()
            .col_expr(offer::Column::Status, Expr::value(OfferStatus::Accepted))
            .col_expr(offer::Column::UpdatedAt, Expr::value(now))
            .filter(offer::Column::TaskId.eq(task_id))
            .filter(offer::Column::BidderId.eq(bidder_id))
            .filter(offer::Column::Status.eq(OfferStatus::Pending))
            .exec(conn)
            .await?;
    }
    offer::Entity::update_many()
        .col_expr(offer::Column::Status, Expr::value(OfferStatus::Rejected))
        .col_expr(offer::Column::UpdatedAt, Expr::value(now))
        .filter(offer::Column::TaskId.eq(task_id))
        .filter(offer::Column::Status.eq(OfferStatus::Pending))
        .exec(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{insert_offer, insert_task, insert_user, memory_db};

    #[tokio::test]
    async fn cannot_withdraw_offer_accepted_after_read() {
        let db = memory_db().await;
        let poster = insert_user(&db, "poster").await;
        let bidder = insert_user(&db, "bidder").await;
        let task = insert_task(&db, poster.id).await;
        let stale = insert_offer(&db, task.id, bidder.id).await;

        let accepted = settle_offer(&db, &stale, OfferStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(accepted.status, OfferStatus::Accepted);

        let err = settle_offer(&db, &stale, OfferStatus::Withdrawn)
            .await
            .unwrap_err();
        assert!(matches!(err, OfferServiceError::OfferNotPending(id) if id == stale.id));
        let offer = find_offer(&db, stale.id).await.unwrap();
        assert_eq!(offer.status, OfferStatus::Accepted);
    }

    #[tokio::test]
    async fn accepting_withdrawn_offer_leaves_task_open() {
        let db = memory_db().await;
        let poster = insert_user(&db, "poster").await;
        let bidder = insert_user(&db, "bidder").await;
        let task = insert_task(&db, poster.id).await;
        let offer = insert_offer(&db, task.id, bidder.id).await;
        settle_offer(&db, &offer, OfferStatus::Withdrawn)
            .await
            .unwrap();

        let err = OfferService::new(&db)
            .accept_offer(offer.id, poster.id)
            .await
            .unwrap_err();
        assert!(matches!(err, OfferServiceError::OfferNotPending(_)));
        let task = find_task(&db, task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Open);
        assert_eq!(task.assignee_id, None);
    }
}
