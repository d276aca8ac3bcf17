use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use taskmarket_server::auth::{AUTH_COOKIE, encode_jwt};
use taskmarket_server::task::TaskService;
use tower::ServiceExt;

mod common;

use common::{body_text, post_task, register_user, setup_app, test_config};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn can_check_health_endpoint() -> anyhow::Result<()> {
    let (app, _db) = setup_app().await?;
    let response = app.oneshot(get("/health")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
    Ok(())
}

#[tokio::test]
async fn board_lists_open_tasks() -> anyhow::Result<()> {
    let (app, db) = setup_app().await?;
    let poster = register_user(&db, "poster").await;
    post_task(&db, poster.id, "Paint the garage").await;
    let done = post_task(&db, poster.id, "Sweep the yard").await;
    TaskService::new(&db).cancel_task(done.id, poster.id).await?;

    let response = app.clone().oneshot(get("/")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Paint the garage"));
    assert!(html.contains("$50.00"));
    assert!(!html.contains("Sweep the yard"));
    assert!(html.contains("Log in"));

    let response = app.oneshot(get("/?status=cancelled")).await?;
    let html = body_text(response).await;
    assert!(html.contains("Sweep the yard"));
    assert!(!html.contains("Paint the garage"));
    Ok(())
}

#[tokio::test]
async fn task_page_shows_details_and_poster() -> anyhow::Result<()> {
    let (app, db) = setup_app().await?;
    let poster = register_user(&db, "poster").await;
    let task = post_task(&db, poster.id, "Hang curtains").await;

    let response = app.oneshot(get(&format!("/tasks/{}", task.id))).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Hang curtains"));
    assert!(html.contains("Details about Hang curtains"));
    assert!(html.contains("poster"));
    Ok(())
}

#[tokio::test]
async fn missing_task_page_is_not_found() -> anyhow::Result<()> {
    let (app, _db) = setup_app().await?;
    let response = app.oneshot(get("/tasks/12345")).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("Task 12345 does not exist."));
    Ok(())
}

#[tokio::test]
async fn unknown_page_is_not_found() -> anyhow::Result<()> {
    let (app, _db) = setup_app().await?;
    let response = app.oneshot(get("/no/such/page")).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn my_tasks_redirects_anonymous_users() -> anyhow::Result<()> {
    let (app, _db) = setup_app().await?;
    let response = app.oneshot(get("/my/tasks")).await?;
    assert!(response.status().is_redirection());
    assert_eq!(response.headers()[header::LOCATION], "/login");
    Ok(())
}

#[tokio::test]
async fn my_tasks_lists_posted_tasks_for_cookie_user() -> anyhow::Result<()> {
    let (app, db) = setup_app().await?;
    let poster = register_user(&db, "poster").await;
    post_task(&db, poster.id, "Clean windows").await;
    let config = test_config();
    let token = encode_jwt(poster.id, &poster.username, &config.jwt_secret, 1)?;

    let request = Request::builder()
        .uri("/my/tasks")
        .header(header::COOKIE, format!("{AUTH_COOKIE}={token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Clean windows"));
    assert!(html.contains("Signed in as poster"));
    Ok(())
}
