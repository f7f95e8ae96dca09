//! Router-level tests: drive the HTTP API end to end with tower's oneshot.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use assess_backend::routes::build_router;
use assess_backend::state::AppState;

async fn body_json(res: axum::response::Response) -> serde_json::Value {
  let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
    .await
    .expect("read body");
  serde_json::from_slice(&bytes).expect("json body")
}

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
  Request::builder()
    .method("POST")
    .uri(uri)
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from(body.to_string()))
    .expect("request")
}

#[tokio::test]
async fn health_reports_ok() {
  let app = build_router(Arc::new(AppState::new()));
  let res = app
    .oneshot(
      Request::builder()
        .uri("/api/v1/health")
        .body(Body::empty())
        .expect("request"),
    )
    .await
    .expect("response");
  assert_eq!(res.status(), StatusCode::OK);
  let body = body_json(res).await;
  assert_eq!(body["ok"], serde_json::json!(true));
}

#[tokio::test]
async fn render_and_score_round_trip_over_http() {
  let app = build_router(Arc::new(AppState::new()));

  let res = app
    .clone()
    .oneshot(post(
      "/api/v1/render",
      serde_json::json!({
        "state": { "seeds": { "0": 42 }, "question_sets": { "0": "seed-sum" } },
        "qn": 0
      }),
    ))
    .await
    .expect("response");
  assert_eq!(res.status(), StatusCode::OK);
  let body = body_json(res).await;
  let html = body["html"].as_str().expect("html");
  assert!(html.contains("Compute"));
  assert!(!html.contains("<script"));

  let res = app
    .oneshot(post(
      "/api/v1/score",
      serde_json::json!({
        "state": { "seeds": { "0": 42 }, "question_sets": { "0": "seed-sum" } },
        "qn": 0,
        "answers": { "qn0": "7" }
      }),
    ))
    .await
    .expect("response");
  assert_eq!(res.status(), StatusCode::OK);
  let body = body_json(res).await;
  // The mutated record comes back for the caller to persist.
  assert_eq!(
    body["state"]["part_attempts"]["0"]["0"],
    serde_json::json!(1)
  );
  assert!(body["raw"]["0"].is_number());
  assert_eq!(body["all_parts_scored"], serde_json::json!(true));
}

#[tokio::test]
async fn unknown_question_set_maps_to_not_found() {
  let app = build_router(Arc::new(AppState::new()));
  let res = app
    .oneshot(post(
      "/api/v1/render",
      serde_json::json!({
        "state": { "seeds": { "0": 1 }, "question_sets": { "0": "no-such-set" } },
        "qn": 0
      }),
    ))
    .await
    .expect("response");
  assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
