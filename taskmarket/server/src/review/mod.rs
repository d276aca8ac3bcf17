use crate::entities::task::TaskStatus;
use crate::entities::*;
use crate::validation::{ValidationError, optional_text};
use chrono::{DateTime, Utc};
use sea_orm::*;

pub mod api;

const MAX_COMMENT_LEN: usize = 1000;

/// Feedback left by one side of a completed task about the other.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Review {
    pub id: i32,
    pub task_id: i32,
    pub reviewer_id: i32,
    pub reviewee_id: i32,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl From<review::Model> for Review {
    fn from(model: review::Model) -> Self {
        Self {
            id: model.id,
            task_id: model.task_id,
            reviewer_id: model.reviewer_id,
            reviewee_id: model.reviewee_id,
            rating: model.rating.clamp(0, u8::MAX as i16) as u8,
            comment: model.comment,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub rating: u8,
    pub comment: Option<String>,
}

/// Aggregate rating of a user.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct RatingSummary {
    pub count: u64,
    /// Mean rating rounded to two decimals; `None` without reviews.
    pub average: Option<f64>,
}

impl RatingSummary {
    pub fn from_ratings(ratings: &[u8]) -> Self {
        if ratings.is_empty() {
            return Self {
                count: 0,
                average: None,
            };
        }
        let total: u64 = ratings.iter().map(|&r| u64::from(r)).sum();
        let mean = total as f64 / ratings.len() as f64;
        Self {
            count: ratings.len() as u64,
            average: Some((mean * 100.0).round() / 100.0),
        }
    }
}

/// Error type for ReviewService operations.
#[derive(Debug, thiserror::Error)]
pub enum ReviewServiceError {
    #[error("Task with ID {0} not found")]
    TaskNotFound(i32),
    #[error("Task {0} has not been completed yet")]
    TaskNotCompleted(i32),
    #[error("You have already reviewed task {0}")]
    DuplicateReview(i32),
    #[error("Only the poster and the assignee can review task {0}")]
    NotAParticipant(i32),
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct ReviewService<'a> {
    db: &'a DatabaseConnection,
}

impl ReviewService<'_> {
    pub fn new(db: &DatabaseConnection) -> ReviewService<'_> {
        ReviewService { db }
    }

    /// Leaves a review on a completed task. The reviewee is the other side of the task.
    #[tracing::instrument(skip(self, new_review))]
    pub async fn create_review(
        &self,
        task_id: i32,
        reviewer_id: i32,
        new_review: NewReview,
    ) -> Result<Review, ReviewServiceError> {
        if !(1..=5).contains(&new_review.rating) {
            return Err(ValidationError::new("rating", "must be between 1 and 5").into());
        }
        let comment = optional_text("comment", new_review.comment.as_deref(), MAX_COMMENT_LEN)?
            .unwrap_or_default();

        let task = task::Entity::find_by_id(task_id)
            .one(self.db)
            .await?
            .ok_or(ReviewServiceError::TaskNotFound(task_id))?;
        if task.status != TaskStatus::Completed {
            return Err(ReviewServiceError::TaskNotCompleted(task_id));
        }
        let reviewee_id = match task.assignee_id {
            Some(assignee_id) if reviewer_id == task.poster_id => assignee_id,
            Some(assignee_id) if reviewer_id == assignee_id => task.poster_id,
            _ => return Err(ReviewServiceError::NotAParticipant(task_id)),
        };

        let already_reviewed = review::Entity::find()
            .filter(review::Column::TaskId.eq(task_id))
            .filter(review::Column::ReviewerId.eq(reviewer_id))
            .one(self.db)
            .await?
            .is_some();
        if already_reviewed {
            return Err(ReviewServiceError::DuplicateReview(task_id));
        }

        let created = review::ActiveModel {
            task_id: ActiveValue::Set(task_id),
            reviewer_id: ActiveValue::Set(reviewer_id),
            reviewee_id: ActiveValue::Set(reviewee_id),
            rating: ActiveValue::Set(i16::from(new_review.rating)),
            comment: ActiveValue::Set(comment),
            created_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.db)
        .await
        .map_err(|err| match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                ReviewServiceError::DuplicateReview(task_id)
            }
            _ => ReviewServiceError::Database(err),
        })?;
        Ok(Review::from(created))
    }

    /// Lists the reviews a user has received, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_reviews_for_user(
        &self,
        user_id: i32,
    ) -> Result<Vec<Review>, ReviewServiceError> {
        let reviews = review::Entity::find()
            .filter(review::Column::RevieweeId.eq(user_id))
            .order_by_desc(review::Column::Id)
            .all(self.db)
            .await?
            .into_iter()
            .map(Review::from)
            .collect();
        Ok(reviews)
    }

    #[tracing::instrument(skip(self))]
    pub async fn rating_summary(&self, user_id: i32) -> Result<RatingSummary, ReviewServiceError> {
        let ratings: Vec<u8> = self
            .list_reviews_for_user(user_id)
            .await?
            .into_iter()
            .map(|review| review.rating)
            .collect();
        Ok(RatingSummary::from_ratings(&ratings))
    }
}
