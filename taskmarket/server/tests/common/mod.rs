#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::Value;
use taskmarket_server::config::Config;
use taskmarket_server::task::{NewTask, Task, TaskService};
use taskmarket_server::user::{NewUser, User, UserService};
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use testcontainers_modules::{postgres, testcontainers};
use tower::ServiceExt;

pub const PASSWORD: &str = "correct-horse";

pub fn test_config() -> Config {
    Config {
        db_url: "sqlite::memory:".to_string(),
        port: 0,
        jwt_secret: "test-secret".to_string(),
        token_ttl_hours: 1,
    }
}

/// Fresh, migrated in-memory database. A single pooled connection keeps every
/// query on the same SQLite memory database.
pub async fn setup_db() -> anyhow::Result<DatabaseConnection> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();

    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

pub async fn setup_container() -> anyhow::Result<testcontainers::ContainerAsync<postgres::Postgres>>
{
    let container = postgres::Postgres::default().start().await?;
    Ok(container)
}

pub async fn setup_postgres_db(
    container: &testcontainers::ContainerAsync<postgres::Postgres>,
) -> anyhow::Result<DatabaseConnection> {
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let db_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);
    let db = Database::connect(&db_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

pub async fn register_user(db: &DatabaseConnection, username: &str) -> User {
    UserService::new(db)
        .register(NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: PASSWORD.to_string(),
            display_name: None,
        })
        .await
        .expect("Failed to register user")
}

pub fn new_task(title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: format!("Details about {title}"),
        category: "moving".to_string(),
        budget_cents: 5000,
        location: None,
        due_date: None,
    }
}

pub async fn post_task(db: &DatabaseConnection, poster_id: i32, title: &str) -> Task {
    TaskService::new(db)
        .create_task(poster_id, new_task(title))
        .await
        .expect("Failed to create task")
}

/// Full application over a fresh database.
pub async fn setup_app() -> anyhow::Result<(Router, DatabaseConnection)> {
    let db = setup_db().await?;
    let app = taskmarket_server::web::build_app(&test_config(), db.clone());
    Ok((app, db))
}

/// Sends a JSON request and returns the status with the parsed body
/// (`Value::Null` for empty bodies, `Value::String` for non-JSON ones).
pub async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

/// Registers through the API and returns the bearer token and user ID.
pub async fn register_via_api(app: &Router, username: &str) -> (String, i64) {
    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/v1/register",
        None,
        Some(serde_json::json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": PASSWORD,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    let token = body["token"].as_str().unwrap().to_string();
    let id = body["user"]["id"].as_i64().unwrap();
    (token, id)
}

pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
