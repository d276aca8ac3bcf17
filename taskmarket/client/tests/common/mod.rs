#![allow(dead_code)]

use axum::Router;
use axum::http::StatusCode;
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use taskmarket_client::model::{NewTask, Registration};
use taskmarket_client::{ApiClient, ClientConfig};
use taskmarket_server::config::Config;
use tokio::net::TcpListener;

pub const PASSWORD: &str = "correct-horse";

fn init_tracing() {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

async fn serve(app: Router) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

/// Runs the marketplace server on a random port with a fresh in-memory
/// database and returns its base URL.
pub async fn spawn_server() -> anyhow::Result<String> {
    init_tracing();
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;

    let config = Config {
        db_url: "sqlite::memory:".to_string(),
        port: 0,
        jwt_secret: "test-secret".to_string(),
        token_ttl_hours: 1,
    };
    serve(taskmarket_server::web::build_app(&config, db)).await
}

/// A URL nothing listens on.
pub fn dead_url() -> anyhow::Result<String> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}"))
}

/// Server that answers every request with 503 and counts them.
pub async fn spawn_failing_server() -> anyhow::Result<(String, Arc<AtomicUsize>)> {
    init_tracing();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().fallback(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance")
        }
    });
    Ok((serve(app).await?, hits))
}

/// Client with short timings so failing cases finish quickly.
pub fn client_for<S: Into<String>>(urls: impl IntoIterator<Item = S>) -> ApiClient {
    let mut config = ClientConfig::with_urls(urls);
    config.request_timeout_ms = 2000;
    config.retry_backoff_ms = 10;
    ApiClient::new(&config).expect("Failed to build client")
}

pub fn registration(username: &str) -> Registration {
    Registration {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password: PASSWORD.to_string(),
        display_name: None,
    }
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
