//! 可观测性模块集成测试
//!
//! 通过真实的 axum Router 验证请求 ID 和请求追踪中间件的行为。

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
};
use labsit_shared::observability::middleware::{http_tracing, request_id};
use tower::ServiceExt;

fn test_app() -> Router {
    Router::new()
        .route("/ping", get(|| async { "pong" }))
        .layer(middleware::from_fn(http_tracing))
        .layer(middleware::from_fn(request_id))
}

#[tokio::test]
async fn test_request_id_generated_when_missing() {
    let app = test_app();

    let response = app
        .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("响应应包含 x-request-id 头");
    // 生成的请求 ID 是 UUID 格式
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn test_request_id_passthrough() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/ping")
                .header("x-request-id", "trace-abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // 调用方提供的请求 ID 原样透传
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "trace-abc-123"
    );
}

#[tokio::test]
async fn test_tracing_middleware_does_not_alter_response() {
    let app = test_app();

    let response = app
        .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"pong");
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
