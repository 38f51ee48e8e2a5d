use std::net::SocketAddr;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api", auth::router())
        .with_state(state)
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
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.expect("infallible");
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn register(app: &Router, email: &str) -> Value {
        let (status, body) = send(
            app,
            post(
                "/api/auth/register",
                json!({"email": email, "password": "Secret123!", "name": "A"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }

    #[tokio::test]
    async fn register_returns_tokens_and_public_user() {
        let app = build_app(AppState::fake());
        let body = register(&app, "a@x.com").await;

        assert_eq!(body["accessToken"].as_str().unwrap().split('.').count(), 3);
        assert!(body["refreshToken"].as_str().unwrap().len() >= 30);
        assert!(body["expiresAt"].is_string());
        assert_eq!(body["user"]["email"], "a@x.com");
        assert_eq!(body["user"]["name"], "A");
        assert!(body["user"].get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn duplicate_register_is_bad_request() {
        let app = build_app(AppState::fake());
        register(&app, "a@x.com").await;

        let (status, body) = send(
            &app,
            post(
                "/api/auth/register",
                json!({"email": "A@X.com", "password": "Other456!", "name": "B"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "email already registered");
    }

    #[tokio::test]
    async fn login_failures_share_one_response() {
        let app = build_app(AppState::fake());
        register(&app, "a@x.com").await;

        let wrong = send(
            &app,
            post("/api/auth/login", json!({"email": "a@x.com", "password": "nope-nope"})),
        )
        .await;
        let unknown = send(
            &app,
            post("/api/auth/login", json!({"email": "b@x.com", "password": "Secret123!"})),
        )
        .await;

        assert_eq!(wrong.0, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong, unknown);
    }

    #[tokio::test]
    async fn refresh_logout_cycle() {
        let app = build_app(AppState::fake());
        register(&app, "a@x.com").await;

        let (status, login) = send(
            &app,
            post(
                "/api/auth/login",
                json!({"email": "a@x.com", "password": "Secret123!", "rememberMe": true}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let old_refresh = login["refreshToken"].as_str().unwrap().to_string();

        let (status, renewed) = send(
            &app,
            post("/api/auth/refresh", json!({"refreshToken": old_refresh})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(renewed["accessToken"], login["accessToken"]);
        assert_ne!(renewed["refreshToken"], login["refreshToken"]);

        let (status, body) = send(
            &app,
            post("/api/auth/refresh", json!({"refreshToken": old_refresh})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid refresh token");

        let user_id = login["user"]["id"].as_str().unwrap();
        let (status, body) = send(
            &app,
            Request::post(format!("/api/auth/logout/{user_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].is_string());

        let (status, _) = send(
            &app,
            post("/api/auth/refresh", json!({"refreshToken": renewed["refreshToken"]})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_of_unknown_user_still_succeeds() {
        let app = build_app(AppState::fake());
        let (status, _) = send(
            &app,
            Request::post(format!("/api/auth/logout/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn me_requires_a_valid_access_token() {
        let app = build_app(AppState::fake());
        let registered = register(&app, "a@x.com").await;
        let token = registered["accessToken"].as_str().unwrap();

        let (status, body) = send(
            &app,
            Request::get("/api/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "a@x.com");

        let (status, _) = send(
            &app,
            Request::get("/api/auth/me").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // refresh tokens are not access tokens
        let refresh = registered["refreshToken"].as_str().unwrap();
        let (status, _) = send(
            &app,
            Request::get("/api/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {refresh}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_reports_service() {
        let app = build_app(AppState::fake());
        let (status, body) = send(
            &app,
            Request::get("/api/auth/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }
}
