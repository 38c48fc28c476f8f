mod common;

use serde_json::{json, Value};

use common::{error_code, spawn_app, PASSWORD};

const NEW_PASSWORD: &str = "a brand new passphrase";

async fn request_reset(app: &common::TestApp, email: &str) -> reqwest::Response {
    app.post_json("/auth/password/forgot", &json!({ "email": email })).await
}

#[tokio::test]
async fn password_reset_flow_replaces_password_and_ends_sessions() {
    let app = spawn_app().await;
    app.register_verified("ann").await;
    let (_, session) = app.login("ann").await;

    assert_eq!(200, request_reset(&app, "ann@example.com").await.status().as_u16());
    let token = app.mailer.reset_token("ann@example.com").await.unwrap();

    let check = app
        .post_json("/auth/password/verify-reset-token", &json!({ "token": token }))
        .await;
    assert_eq!(200, check.status().as_u16());

    let reset = app
        .post_json(
            "/auth/password/reset",
            &json!({ "token": token, "newPassword": NEW_PASSWORD }),
        )
        .await;
    assert_eq!(200, reset.status().as_u16());

    assert_eq!(401, app.login_raw("ann", PASSWORD, false).await.status().as_u16());
    assert_eq!(200, app.login_raw("ann", NEW_PASSWORD, false).await.status().as_u16());
    assert_eq!("INVALID_SESSION", error_code(app.refresh(&session.header()).await).await);
}

#[tokio::test]
async fn reset_token_cannot_be_reused() {
    let app = spawn_app().await;
    app.register_verified("ann").await;
    request_reset(&app, "ann@example.com").await;
    let token = app.mailer.reset_token("ann@example.com").await.unwrap();

    let body = json!({ "token": token, "newPassword": NEW_PASSWORD });
    assert_eq!(200, app.post_json("/auth/password/reset", &body).await.status().as_u16());

    let again = app.post_json("/auth/password/reset", &body).await;
    assert_eq!(400, again.status().as_u16());
    assert_eq!("INVALID_TOKEN", error_code(again).await);

    let check = app
        .post_json("/auth/password/verify-reset-token", &json!({ "token": token }))
        .await;
    assert_eq!("INVALID_TOKEN", error_code(check).await);
}

#[tokio::test]
async fn verification_token_cannot_reset_password() {
    let app = spawn_app().await;
    app.register("ann").await;
    let token = app.mailer.verification_token("ann@example.com").await.unwrap();

    let response = app
        .post_json(
            "/auth/password/reset",
            &json!({ "token": token, "newPassword": NEW_PASSWORD }),
        )
        .await;

    assert_eq!("INVALID_TOKEN", error_code(response).await);
}

#[tokio::test]
async fn forgot_password_does_not_reveal_accounts() {
    let app = spawn_app().await;
    app.register_verified("ann").await;
    let sent_before = app.mailer.count().await;

    let known = request_reset(&app, "ann@example.com").await;
    let unknown = request_reset(&app, "nobody@example.com").await;

    assert_eq!(200, known.status().as_u16());
    assert_eq!(200, unknown.status().as_u16());
    let a: Value = known.json().await.unwrap();
    let b: Value = unknown.json().await.unwrap();
    assert_eq!(a["message"], b["message"]);
    assert_eq!(sent_before + 1, app.mailer.count().await);
}

#[tokio::test]
async fn reset_rejects_short_password() {
    let app = spawn_app().await;
    app.register_verified("ann").await;
    request_reset(&app, "ann@example.com").await;
    let token = app.mailer.reset_token("ann@example.com").await.unwrap();

    let response = app
        .post_json("/auth/password/reset", &json!({ "token": token, "newPassword": "short" }))
        .await;

    assert_eq!(422, response.status().as_u16());
    // token survives a rejected attempt
    let check = app
        .post_json("/auth/password/verify-reset-token", &json!({ "token": token }))
        .await;
    assert_eq!(200, check.status().as_u16());
}
