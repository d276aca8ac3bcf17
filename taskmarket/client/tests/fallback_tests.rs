use reqwest::Method;
use std::sync::atomic::Ordering;
use taskmarket_client::ClientError;

mod common;

use common::{client_for, dead_url, registration, spawn_failing_server, spawn_server};

#[tokio::test]
async fn can_skip_dead_endpoint_and_remember_the_live_one() -> anyhow::Result<()> {
    let dead = dead_url()?;
    let live = spawn_server().await?;
    let client = client_for([dead.clone(), live.clone()]);
    assert_eq!(client.active_endpoint().await, dead);

    client.health().await?;
    assert_eq!(client.active_endpoint().await, live);
    assert_eq!(client.session().active_endpoint().await, 1);

    client.register(&registration("mover")).await?;
    assert_eq!(client.active_endpoint().await, live);
    Ok(())
}

#[tokio::test]
async fn can_fall_back_past_server_errors() -> anyhow::Result<()> {
    let (failing, hits) = spawn_failing_server().await?;
    let live = spawn_server().await?;
    let client = client_for([failing, live.clone()]);

    client.health().await?;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(client.active_endpoint().await, live);

    // The live endpoint is tried first from now on.
    client.health().await?;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn gives_up_after_every_round() -> anyhow::Result<()> {
    let (failing, hits) = spawn_failing_server().await?;
    let dead = dead_url()?;
    let client = client_for([failing, dead]);

    let err = client.health().await.unwrap_err();
    match err {
        ClientError::AllEndpointsFailed {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 4);
            assert!(!last_error.is_empty());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn does_not_retry_client_errors() -> anyhow::Result<()> {
    let live = spawn_server().await?;
    let (failing, hits) = spawn_failing_server().await?;
    let client = client_for([live, failing]);

    let err = client.login("nobody", "wrong-password").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    match err {
        ClientError::Api { code, .. } => assert_eq!(code, "INVALID_CREDENTIALS"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(!client.session().is_authenticated().await);
    Ok(())
}

#[tokio::test]
async fn can_send_raw_requests_with_session_token() -> anyhow::Result<()> {
    let live = spawn_server().await?;
    let client = client_for([live]);
    client.register(&registration("raw")).await?;

    let response = client
        .request::<()>(Method::GET, "/api/v1/me", None)
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["username"], "raw");

    client.logout().await;
    let response = client
        .request::<()>(Method::GET, "/api/v1/me", None)
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn cannot_call_protected_operations_logged_out() -> anyhow::Result<()> {
    let dead = dead_url()?;
    let client = client_for([dead]);
    assert!(matches!(client.me().await, Err(ClientError::NotAuthenticated)));
    assert!(matches!(
        client.list_chats().await,
        Err(ClientError::NotAuthenticated)
    ));
    Ok(())
}
