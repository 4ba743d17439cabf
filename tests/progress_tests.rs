use axum::http::StatusCode;
use futures::future::join_all;
use serde_json::json;

mod common;

use common::{count_rows, insert_module, insert_resources, insert_user, module_status, pulse_uri, TestApp};

async fn seeded(resources: &[&str]) -> TestApp {
    let app = TestApp::new().await;
    insert_user(&app, "learner-1", "learner").await;
    insert_module(&app, "m1", false, false).await;
    insert_resources(&app, "m1", resources).await;
    app
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deltas_are_all_counted() {
    let app = seeded(&["r1"]).await;
    let uri = pulse_uri("m1", "r1");

    let pulses = (0..10).map(|_| app.post_json(&uri, "learner-1", json!({ "duration_delta": 15 })));
    for (status, body) in join_all(pulses).await {
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let watched: i64 = sqlx::query_scalar(
        r#"SELECT "watch_time_seconds" FROM "resource_progress" WHERE "user_id" = 'learner-1' AND "resource_id" = 'r1'"#,
    )
    .fetch_one(app.pool())
    .await
    .unwrap();
    assert_eq!(watched, 150);

    assert_eq!(count_rows(&app, r#"SELECT COUNT(*) FROM "learning_sessions""#).await, 1);
    let focus: i64 = sqlx::query_scalar(r#"SELECT SUM("focus_duration_seconds") FROM "learning_sessions""#)
        .fetch_one(app.pool())
        .await
        .unwrap();
    assert_eq!(focus, 150);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_pulses_create_one_progress_row() {
    let app = seeded(&["r1", "r2"]).await;
    let app = &app;

    let pulses = (0..5).map(|i| {
        let resource = if i % 2 == 0 { "r1" } else { "r2" };
        let uri = pulse_uri("m1", resource);
        async move { app.post_json(&uri, "learner-1", json!({ "last_position": 3 })).await }
    });
    for (status, _) in join_all(pulses).await {
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(count_rows(app, r#"SELECT COUNT(*) FROM "module_progress""#).await, 1);
    assert_eq!(count_rows(app, r#"SELECT COUNT(*) FROM "resource_progress""#).await, 2);
}

#[tokio::test]
async fn absolute_watch_time_overwrites() {
    let app = seeded(&["r1"]).await;
    let uri = pulse_uri("m1", "r1");

    for _ in 0..2 {
        let (status, body) = app.post_json(&uri, "learner-1", json!({ "watch_time": 100 })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["watch_time_seconds"], 100);
        assert_eq!(body["status"], "synchronized");
    }
}

#[tokio::test]
async fn repeated_completion_keeps_first_timestamp() {
    let app = seeded(&["r1", "r2"]).await;
    let uri = pulse_uri("m1", "r1");

    let (status, body) = app.post_json(&uri, "learner-1", json!({ "completed": true })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resource_completed"], true);

    let first: Option<i64> = sqlx::query_scalar(
        r#"SELECT "completed_at" FROM "resource_progress" WHERE "resource_id" = 'r1'"#,
    )
    .fetch_one(app.pool())
    .await
    .unwrap();
    assert!(first.is_some());

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (status, _) = app.post_json(&uri, "learner-1", json!({ "completed": true })).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.post_json(&uri, "learner-1", json!({ "completed": false })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resource_completed"], true);

    let second: Option<i64> = sqlx::query_scalar(
        r#"SELECT "completed_at" FROM "resource_progress" WHERE "resource_id" = 'r1'"#,
    )
    .fetch_one(app.pool())
    .await
    .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn negative_values_are_rejected_without_writes() {
    let app = seeded(&["r1"]).await;
    let (status, body) = app
        .post_json(&pulse_uri("m1", "r1"), "learner-1", json!({ "duration_delta": -5 }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(count_rows(&app, r#"SELECT COUNT(*) FROM "resource_progress""#).await, 0);
    assert_eq!(count_rows(&app, r#"SELECT COUNT(*) FROM "learning_sessions""#).await, 0);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let app = seeded(&["r1"]).await;
    let (status, _) = app
        .post_raw(&pulse_uri("m1", "r1"), "learner-1", "{not json".to_string())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_resource_is_not_found() {
    let app = seeded(&["r1"]).await;

    let (status, _) = app
        .post_json(&pulse_uri("m1", "missing"), "learner-1", json!({ "duration_delta": 5 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post_json(&pulse_uri("nope", "r1"), "learner-1", json!({ "duration_delta": 5 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pulses_require_a_token() {
    let app = seeded(&["r1"]).await;
    let request = axum::http::Request::builder()
        .method("POST")
        .uri(pulse_uri("m1", "r1"))
        .header("content-type", "application/json")
        .body(axum::body::Body::from(r#"{"duration_delta":5}"#))
        .unwrap();

    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_secret_is_service_unavailable() {
    let app = TestApp::with_secret(None).await;
    insert_user(&app, "learner-1", "learner").await;

    let (status, _) = app.get("/api/modules/m1/progress", Some("learner-1")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn pulses_within_idle_window_share_a_session() {
    let app = seeded(&["r1"]).await;
    let uri = pulse_uri("m1", "r1");

    app.post_json(&uri, "learner-1", json!({ "duration_delta": 10 })).await;
    app.post_json(&uri, "learner-1", json!({ "duration_delta": 20 })).await;
    assert_eq!(count_rows(&app, r#"SELECT COUNT(*) FROM "learning_sessions""#).await, 1);

    // Push the only session outside the idle window.
    sqlx::query(r#"UPDATE "learning_sessions" SET "last_ping_at" = "last_ping_at" - ?"#)
        .bind(2 * common::HOUR_MS)
        .execute(app.pool())
        .await
        .unwrap();

    app.post_json(&uri, "learner-1", json!({ "duration_delta": 5 })).await;
    assert_eq!(count_rows(&app, r#"SELECT COUNT(*) FROM "learning_sessions""#).await, 2);
}

#[tokio::test]
async fn progress_report_reflects_pulses() {
    let app = seeded(&["r1", "r2", "r3"]).await;

    for resource in ["r1", "r2"] {
        app.post_json(&pulse_uri("m1", resource), "learner-1", json!({ "completed": true }))
            .await;
    }
    assert_eq!(module_status(&app, "learner-1", "m1").await.as_deref(), Some("in_progress"));

    let (status, body) = app.get("/api/modules/m1/progress", Some("learner-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_complete"], false);
    assert_eq!(body["status"], "in_progress");
}

#[tokio::test]
async fn oversized_delta_is_rejected() {
    let app = seeded(&["r1"]).await;
    let (status, body) = app
        .post_json(&pulse_uri("m1", "r1"), "learner-1", json!({ "duration_delta": i64::MAX - 10 }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(count_rows(&app, r#"SELECT COUNT(*) FROM "resource_progress""#).await, 0);
}

#[tokio::test]
async fn counters_saturate_instead_of_wrapping() {
    let app = seeded(&["r1"]).await;
    let uri = pulse_uri("m1", "r1");
    let near_max = i64::MAX - 50;

    let (status, _) = app.post_json(&uri, "learner-1", json!({ "watch_time": near_max })).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.post_json(&uri, "learner-1", json!({ "duration_delta": 10 })).await;
    assert_eq!(status, StatusCode::OK);

    sqlx::query(r#"UPDATE "learning_sessions" SET "focus_duration_seconds" = ?"#)
        .bind(near_max)
        .execute(app.pool())
        .await
        .unwrap();

    let (status, body) = app.post_json(&uri, "learner-1", json!({ "duration_delta": 100 })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["watch_time_seconds"], near_max + 10);

    let kind: String = sqlx::query_scalar(
        r#"SELECT typeof("watch_time_seconds") FROM "resource_progress" WHERE "resource_id" = 'r1'"#,
    )
    .fetch_one(app.pool())
    .await
    .unwrap();
    assert_eq!(kind, "integer");

    let (focus, focus_kind): (i64, String) = sqlx::query_as(
        r#"SELECT "focus_duration_seconds", typeof("focus_duration_seconds") FROM "learning_sessions""#,
    )
    .fetch_one(app.pool())
    .await
    .unwrap();
    assert_eq!(focus, near_max);
    assert_eq!(focus_kind, "integer");
}
