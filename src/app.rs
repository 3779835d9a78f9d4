use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{admin, auth, listings, saved};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(listings::router())
                .merge(auth::router())
                .merge(saved::router())
                .merge(admin::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::notifier::RecordingNotifier;
    use crate::auth::notifier::LogNotifier;
    use crate::state::test_config;
    use crate::store::Store;

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        call_with_token(app, method, uri, body, None).await
    }

    async fn call_with_token(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let app = build_app(AppState::fake());
        let (status, body) = call(&app, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("ok".into()));
    }

    #[tokio::test]
    async fn listing_crud_over_http() {
        let app = build_app(AppState::fake());

        let (status, body) = call(&app, Method::GET, "/api/properties", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (status, created) = call(
            &app,
            Method::POST,
            "/api/properties",
            Some(json!({ "title": "Loft", "price": "1500000", "type": "Buy", "tags": ["Pool"] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["price"], json!(1500000.0));
        assert_eq!(created["type"], "Sale");
        let id = created["id"].as_str().unwrap().to_string();

        let (status, fetched) = call(&app, Method::GET, &format!("/api/properties/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, created);

        let (status, updated) = call(
            &app,
            Method::PUT,
            &format!("/api/properties/{id}"),
            Some(json!({ "beds": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["beds"], 3);
        assert_eq!(updated["title"], "Loft");

        let (status, body) = call(&app, Method::DELETE, &format!("/api/properties/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));

        let (status, body) = call(&app, Method::GET, &format!("/api/properties/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Property not found" }));
    }

    #[tokio::test]
    async fn listing_validation_errors_are_400() {
        let app = build_app(AppState::fake());

        let (status, body) = call(&app, Method::POST, "/api/properties", Some(json!({ "title": "Loft" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/properties")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::GET, "/api/properties?type=Lease", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_login_reset_scenario() {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::from_parts(Arc::new(test_config()), Store::memory(), notifier.clone());
        let app = build_app(state);

        let (status, user) = call(
            &app,
            Method::POST,
            "/api/auth/register",
            Some(json!({ "email": "bob@x.com", "password": "secret1", "name": "Bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(user.get("password").is_none());
        assert!(user.get("passwordHash").is_none());

        let (status, again) = call(
            &app,
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "bob@x.com", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["id"], user["id"]);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/auth/reset-request",
            Some(json!({ "email": "bob@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["message"],
            "If an account exists with this email, a reset link has been sent."
        );

        let token = notifier.last_token().unwrap();
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/auth/reset-password",
            Some(json!({ "token": token, "password": "newpass1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "bob@x.com", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Invalid email or password" }));

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "bob@x.com", "password": "newpass1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/auth/reset-password",
            Some(json!({ "token": token, "password": "another1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn duplicate_registration_is_400() {
        let app = build_app(AppState::fake());
        let body = json!({ "email": "a@b.com", "password": "secret1", "name": "A" });
        let (status, _) = call(&app, Method::POST, "/api/auth/register", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);

        let body = json!({ "email": "A@B.COM", "password": "secret1", "name": "A" });
        let (status, _) = call(&app, Method::POST, "/api/auth/register", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::POST, "/api/auth/login", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn saved_toggle_over_http() {
        let app = build_app(AppState::fake());
        let (_, created) = call(
            &app,
            Method::POST,
            "/api/properties",
            Some(json!({ "title": "Loft", "price": 100 })),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();

        let toggle = json!({ "userId": "u1", "propertyId": id });
        let (status, body) = call(&app, Method::POST, "/api/saved", Some(toggle.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "saved": true }));

        let (_, body) = call(&app, Method::GET, &format!("/api/saved?userId=u1&propertyId={id}"), None).await;
        assert_eq!(body, json!({ "saved": true }));

        let (_, body) = call(&app, Method::GET, "/api/saved?userId=u1", None).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));

        let (_, body) = call(&app, Method::POST, "/api/saved", Some(toggle)).await;
        assert_eq!(body, json!({ "saved": false }));

        let (status, _) = call(&app, Method::GET, "/api/saved", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::POST, "/api/saved", Some(json!({ "userId": "u1" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let missing = json!({ "userId": "u1", "propertyId": "nope" });
        let (status, _) = call(&app, Method::POST, "/api/saved", Some(missing)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_gate_and_secret_creation() {
        let app = build_app(AppState::fake());

        let (status, body) = call(&app, Method::POST, "/api/admin/auth", Some(json!({ "secret": "wrong" }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/admin/auth",
            Some(json!({ "secret": "bootstrap-secret" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["bootstrap"], true);
        let token = body["token"].as_str().unwrap().to_string();

        let secret = json!({ "label": "ops", "secret": "long-enough-secret" });
        let (status, _) = call(&app, Method::POST, "/api/admin/secrets", Some(secret.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, record) =
            call_with_token(&app, Method::POST, "/api/admin/secrets", Some(secret), Some(&token)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(record["label"], "ops");
        assert!(record.get("secretHash").is_none());

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/admin/auth",
            Some(json!({ "secret": "bootstrap-secret" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/admin/auth",
            Some(json!({ "secret": "long-enough-secret" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bootstrap"], false);
    }

    #[tokio::test]
    async fn bootstrap_token_stops_working_once_a_secret_exists() {
        let mut config = test_config();
        config.admin.require_token_for_writes = true;
        let app = build_app(AppState::from_parts(
            Arc::new(config),
            Store::memory(),
            Arc::new(LogNotifier),
        ));

        let (_, body) = call(
            &app,
            Method::POST,
            "/api/admin/auth",
            Some(json!({ "secret": "bootstrap-secret" })),
        )
        .await;
        let bootstrap = body["token"].as_str().unwrap().to_string();

        let (status, _) = call_with_token(
            &app,
            Method::POST,
            "/api/admin/secrets",
            Some(json!({ "label": "ops", "secret": "long-enough-secret" })),
            Some(&bootstrap),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = call_with_token(
            &app,
            Method::POST,
            "/api/admin/secrets",
            Some(json!({ "label": "rogue", "secret": "another-long-secret" })),
            Some(&bootstrap),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, created) = call(
            &app,
            Method::POST,
            "/api/properties",
            Some(json!({ "title": "Loft", "price": 100 })),
        )
        .await;
        let uri = format!("/api/properties/{}", created["id"].as_str().unwrap());
        let (status, _) = call_with_token(&app, Method::DELETE, &uri, None, Some(&bootstrap)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, body) = call(
            &app,
            Method::POST,
            "/api/admin/auth",
            Some(json!({ "secret": "long-enough-secret" })),
        )
        .await;
        let regular = body["token"].as_str().unwrap().to_string();
        let (status, _) = call_with_token(&app, Method::DELETE, &uri, None, Some(&regular)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn listing_writes_need_token_when_enforced() {
        let mut config = test_config();
        config.admin.require_token_for_writes = true;
        let app = build_app(AppState::from_parts(
            Arc::new(config),
            Store::memory(),
            Arc::new(LogNotifier),
        ));

        let (_, created) = call(
            &app,
            Method::POST,
            "/api/properties",
            Some(json!({ "title": "Loft", "price": 100 })),
        )
        .await;
        let uri = format!("/api/properties/{}", created["id"].as_str().unwrap());

        let (status, _) = call(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, body) = call(
            &app,
            Method::POST,
            "/api/admin/auth",
            Some(json!({ "secret": "bootstrap-secret" })),
        )
        .await;
        let token = body["token"].as_str().unwrap().to_string();

        let (status, _) = call_with_token(&app, Method::DELETE, &uri, None, Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
    }
}
