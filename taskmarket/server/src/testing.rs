//! Fixtures for unit tests that need rows in a real database.

use crate::entities::offer::OfferStatus;
use crate::entities::task::TaskStatus;
use crate::entities::*;
use chrono::Utc;
use migration::MigratorTrait;
use sea_orm::*;

/// Migrated in-memory SQLite database on a single connection.
pub(crate) async fn memory_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("Failed to open database");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to migrate database");
    db
}

pub(crate) async fn insert_user(db: &DatabaseConnection, username: &str) -> user::Model {
    user::ActiveModel {
        username: ActiveValue::Set(username.to_string()),
        email: ActiveValue::Set(format!("{username}@example.com")),
        password_hash: ActiveValue::Set("unused".to_string()),
        display_name: ActiveValue::Set(username.to_string()),
        bio: ActiveValue::Set(None),
        created_at: ActiveValue::Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert user")
}

pub(crate) async fn insert_task(db: &DatabaseConnection, poster_id: i32) -> task::Model {
    let now = Utc::now();
    task::ActiveModel {
        title: ActiveValue::Set("Paint a fence".to_string()),
        description: ActiveValue::Set("Twenty metres, white".to_string()),
        category: ActiveValue::Set("garden".to_string()),
        budget_cents: ActiveValue::Set(6000),
        location: ActiveValue::Set(None),
        status: ActiveValue::Set(TaskStatus::Open),
        poster_id: ActiveValue::Set(poster_id),
        assignee_id: ActiveValue::Set(None),
        due_date: ActiveValue::Set(None),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert task")
}

pub(crate) async fn insert_offer(
    db: &DatabaseConnection,
    task_id: i32,
    bidder_id: i32,
) -> offer::Model {
    let now = Utc::now();
    offer::ActiveModel {
        task_id: ActiveValue::Set(task_id),
        bidder_id: ActiveValue::Set(bidder_id),
        amount_cents: ActiveValue::Set(5500),
        message: ActiveValue::Set(String::new()),
        status: ActiveValue::Set(OfferStatus::Pending),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert offer")
}
