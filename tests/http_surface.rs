mod common;

use anyhow::Result;
use axum::extract::FromRequestParts;
use axum::http::{header, Request, StatusCode};
use common::{asha, body_json, with_field, TestApp};
use registration_backend::auth::AdminSession;

#[tokio::test]
async fn health_reports_ok() -> Result<()> {
    let app = TestApp::offline();
    let response = app.get("/api/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response.into_body()).await?["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn admin_routes_require_a_session_cookie() -> Result<()> {
    let app = TestApp::offline();
    let id = uuid::Uuid::new_v4();

    for path in [
        "/api/admin/auth",
        "/api/admin/registrations",
        "/api/admin/registrations/export",
        "/api/admin/stats",
    ] {
        let response = app.get(path, None).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(body_json(response.into_body()).await?["error"], "unauthorized");
    }

    for action in ["verify", "reject", "checkin"] {
        let path = format!("/api/admin/{action}/{id}");
        let response = app.post(&path, None).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
    }

    let response = app
        .get("/api/admin/registrations", Some("other_cookie=1"))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn register_reports_the_first_invalid_field() -> Result<()> {
    let app = TestApp::offline();

    let missing: Vec<_> = asha().into_iter().filter(|(name, _)| *name != "utr").collect();
    let response = app.register(&missing, None).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response.into_body()).await?["error"], "utr is required");

    let blank = with_field(&asha(), "name", "   ");
    let response = app.register(&blank, None).await?;
    assert_eq!(body_json(response.into_body()).await?["error"], "name is required");

    let bad_email = with_field(&asha(), "email", "asha@x");
    let response = app.register(&bad_email, None).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response.into_body()).await?["error"],
        "Invalid email address"
    );

    let bad_phone = with_field(&asha(), "phone", "98765");
    let response = app.register(&bad_phone, None).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response.into_body()).await?;
    assert!(body["error"].as_str().unwrap_or_default().contains("phone"));

    assert!(app.notifier().sent().await.is_empty());
    assert_eq!(app.storage().object_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn register_rejects_unknown_form_fields() -> Result<()> {
    let app = TestApp::offline();
    let mut fields = asha();
    fields.push(("is_admin", "true"));

    let response = app.register(&fields, None).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response.into_body()).await?;
    assert_eq!(body["error"], "unexpected form field 'is_admin'");
    Ok(())
}

#[tokio::test]
async fn login_requires_both_credentials() -> Result<()> {
    let app = TestApp::offline();
    let response = app.login("", "").await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    Ok(())
}

#[tokio::test]
async fn logout_without_a_session_still_clears_the_cookie() -> Result<()> {
    let app = TestApp::offline();
    let response = app.post("/api/admin/logout", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.starts_with("admin_session=;"));
    assert!(cookie.contains("Max-Age=0"));
    assert_eq!(body_json(response.into_body()).await?["success"], true);
    Ok(())
}

#[tokio::test]
async fn malformed_login_body_gets_a_json_error() -> Result<()> {
    let app = TestApp::offline();
    let response = app
        .post_bytes("/api/admin/login", "application/json", b"{\"email\": ")
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let body = body_json(response.into_body()).await?;
    assert!(body["error"].as_str().is_some_and(|message| !message.is_empty()));
    Ok(())
}

#[tokio::test]
async fn resolved_admin_session_is_reused_within_a_request() -> Result<()> {
    let app = TestApp::offline();
    let admin_id = uuid::Uuid::new_v4();

    let (mut parts, ()) = Request::builder()
        .uri("/api/admin/stats")
        .extension(AdminSession { admin_id })
        .body(())?
        .into_parts();
    let session = AdminSession::from_request_parts(&mut parts, &app.state)
        .await
        .map_err(|err| anyhow::anyhow!("session rejected: {}", err.message()))?;
    assert_eq!(session.admin_id, admin_id);

    let (mut parts, ()) = Request::builder()
        .uri("/api/admin/stats")
        .body(())?
        .into_parts();
    let rejected = AdminSession::from_request_parts(&mut parts, &app.state).await;
    assert!(rejected.is_err());
    Ok(())
}
