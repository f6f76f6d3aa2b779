mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use common::TestServer;

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let server = TestServer::start().await?;

    let res = server.client().get(server.url("/health")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<Value>().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["store"], "ok");
    Ok(())
}

#[tokio::test]
async fn root_describes_endpoints() -> Result<()> {
    let server = TestServer::start().await?;

    let body = server.client().get(server.url("/")).send().await?.json::<Value>().await?;
    assert_eq!(body["success"], true);
    assert!(body["data"]["endpoints"]["whatsapp"].is_string());
    Ok(())
}

#[tokio::test]
async fn login_returns_token_and_user_without_password() -> Result<()> {
    let server = TestServer::start().await?;

    let res = server
        .client()
        .post(server.url("/api/auth/login"))
        .json(&json!({ "username": "ana", "password": "s3cret" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<Value>().await?;
    assert_eq!(body["success"], true);
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["user"]["username"], "ana");
    assert_eq!(body["user"]["key"], "tenant-1");
    assert!(body["user"].get("password").is_none(), "password leaked: {}", body);
    Ok(())
}

#[tokio::test]
async fn login_rejects_bad_credentials() -> Result<()> {
    let server = TestServer::start().await?;

    for payload in [
        json!({ "username": "ana", "password": "wrong" }),
        json!({ "username": "nobody", "password": "s3cret" }),
    ] {
        let res = server.client().post(server.url("/api/auth/login")).json(&payload).send().await?;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body = res.json::<Value>().await?;
        assert_eq!(body["success"], false);
    }
    Ok(())
}

#[tokio::test]
async fn login_requires_both_fields() -> Result<()> {
    let server = TestServer::start().await?;

    let res = server
        .client()
        .post(server.url("/api/auth/login"))
        .json(&json!({ "username": "ana" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>().await?["code"], "VALIDATION_ERROR");
    Ok(())
}

#[tokio::test]
async fn profile_needs_a_valid_token() -> Result<()> {
    let server = TestServer::start().await?;

    let res = server.client().get(server.url("/api/auth/profile")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = server.get("/api/auth/profile", "not-a-jwt").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = server.login("ana").await?;
    let (status, body) = server.get("/api/auth/profile", &token).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], "1");
    assert!(body["user"]["last_conexion"].is_string());
    assert!(body["user"].get("password").is_none());
    Ok(())
}

#[tokio::test]
async fn logout_is_acknowledged() -> Result<()> {
    let server = TestServer::start().await?;

    let res = server.client().post(server.url("/api/auth/logout")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(body["success"], true);
    assert!(body["message"].is_string());
    Ok(())
}
