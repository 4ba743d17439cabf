use axum::http::StatusCode;
use serde_json::json;

mod common;

use common::{
    insert_assignment, insert_module, insert_note, insert_resources, insert_session, insert_single_question_quiz,
    insert_user, now_ms, pulse_uri, TestApp, HOUR_MS,
};

const DAY_MS: i64 = 24 * HOUR_MS;

fn trigger_codes(body: &serde_json::Value) -> Vec<String> {
    body["triggers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["code"].as_str().unwrap().to_string())
        .collect()
}

async fn team() -> TestApp {
    let app = TestApp::new().await;
    insert_user(&app, "boss", "manager").await;
    insert_user(&app, "learner-1", "learner").await;
    insert_user(&app, "learner-2", "learner").await;
    app
}

#[tokio::test]
async fn manager_routes_reject_learners_and_anonymous_callers() {
    let app = team().await;

    let (status, body) = app.get("/api/analytics/manager/team-summary", Some("learner-1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = app.get("/api/analytics/manager/team-summary", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/analytics/intelligence/overview", Some("learner-2")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn team_summary_averages_recent_sessions() {
    let app = team().await;
    let now = now_ms();
    insert_session(&app, "learner-1", now - HOUR_MS, now - 10_000, 1800).await;
    insert_session(&app, "learner-2", now - 2 * HOUR_MS, now - 20_000, 3600).await;

    let (status, body) = app.get("/api/analytics/manager/team-summary", Some("boss")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["active_24h"], 2);
    assert_eq!(body["avg_focus_mins"], 45.0);
    assert!(body["computed_at"].is_string());
}

#[tokio::test]
async fn learner_list_reports_lifetime_focus() {
    let app = team().await;
    insert_module(&app, "m1", false, false).await;
    insert_resources(&app, "m1", &["r1"]).await;

    for _ in 0..4 {
        let (status, _) = app
            .post_json(&pulse_uri("m1", "r1"), "learner-1", json!({ "duration_delta": 15 }))
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = app
        .post_json(&pulse_uri("m1", "r1"), "learner-1", json!({ "completed": true }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/api/analytics/manager/learners", Some("boss")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let learners = body.as_array().unwrap();
    assert_eq!(learners.len(), 2, "managers are not listed");

    let learner = learners.iter().find(|l| l["id"] == "learner-1").unwrap();
    assert_eq!(learner["total_focus_mins"], 1.0);
    assert_eq!(learner["modules_completed"], 1);
    assert_eq!(learner["current_module"], "Module m1");

    let idle = learners.iter().find(|l| l["id"] == "learner-2").unwrap();
    assert_eq!(idle["total_focus_mins"], 0.0);
    assert_eq!(idle["modules_completed"], 0);
}

#[tokio::test]
async fn intelligence_overview_counts_every_learner() {
    let app = team().await;

    let (status, body) = app.get("/api/analytics/intelligence/overview", Some("boss")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["summary"]["total_learners"], 2);
    assert_eq!(body["nodes"].as_array().map(Vec::len), Some(2));
    assert!(body["computed_at"].is_string());
}

#[tokio::test]
async fn cognitive_profile_is_visible_to_self_and_managers_only() {
    let app = team().await;

    let (status, body) = app.get("/api/analytics/manager/learner-1/cognitive", Some("learner-1")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["learner_id"], "learner-1");
    assert!(body["state"].is_string());

    let (status, _) = app.get("/api/analytics/manager/learner-1/cognitive", Some("learner-2")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/api/analytics/manager/learner-1/cognitive", Some("boss")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/api/analytics/manager/ghost/cognitive", Some("boss")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn details_and_risk_resolve_learners() {
    let app = team().await;

    let (status, body) = app.get("/api/analytics/manager/learner-2/details", Some("boss")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["computed_at"].is_string());

    let (status, body) = app.get("/api/analytics/manager/learner-2/risk", Some("boss")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["triggers"].is_array());

    let (status, _) = app.get("/api/analytics/manager/ghost/risk", Some("boss")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reconcile_flags_status_drift() {
    let app = team().await;
    insert_module(&app, "m1", false, false).await;
    insert_resources(&app, "m1", &["r1", "r2"]).await;

    sqlx::query(
        r#"INSERT INTO "module_progress" ("id", "user_id", "module_id", "status", "last_accessed", "completed_at")
           VALUES ('mp-1', 'learner-1', 'm1', 'completed', ?, ?)"#,
    )
    .bind(now_ms())
    .bind(now_ms())
    .execute(app.pool())
    .await
    .unwrap();

    let (status, body) = app.get("/api/analytics/reconcile", Some("boss")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["rows_checked"], 1);
    let mismatches = body["mismatches"].as_array().unwrap();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0]["user_id"], "learner-1");
    assert_eq!(mismatches[0]["policy_complete"], false);
}

#[tokio::test]
async fn dashboard_feeds_answer_for_managers() {
    let app = team().await;

    for uri in [
        "/api/analytics/team-stats",
        "/api/analytics/stuck-learners",
        "/api/analytics/module-stats",
        "/api/analytics/recent-activity",
    ] {
        let (status, body) = app.get(uri, Some("boss")).await;
        assert_eq!(status, StatusCode::OK, "{uri}: {body}");
    }

    let (_, body) = app.get("/api/analytics/team-stats", Some("boss")).await;
    assert_eq!(body["timeline"].as_array().map(Vec::len), Some(7));
}

#[tokio::test]
async fn health_and_unknown_routes() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/health/live", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = app.get("/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/api/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

/// Four learners, one per risk shape:
/// - `stale`: last session five days ago
/// - `failing`: two failed quizzes and a past-due open assignment
/// - `late`: assignment explicitly marked overdue
/// - `steady`: active today, nothing outstanding
async fn risk_roster() -> TestApp {
    let app = TestApp::new().await;
    let now = now_ms();
    insert_user(&app, "boss", "manager").await;
    for id in ["stale", "failing", "late", "steady"] {
        insert_user(&app, id, "learner").await;
    }
    insert_module(&app, "m1", true, true).await;
    insert_single_question_quiz(&app, "m1", "quiz-1").await;

    insert_session(&app, "stale", now - 5 * DAY_MS, now - 5 * DAY_MS, 600).await;
    for id in ["failing", "late", "steady"] {
        insert_session(&app, id, now - HOUR_MS, now - 60_000, 600).await;
    }

    for _ in 0..2 {
        let (status, body) = app
            .post_json("/api/quiz/m1/submit", "failing", json!({ "answers": { "q1": "a-wrong" } }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["passed"], false);
    }
    insert_assignment(&app, "failing", "m1", "pending", Some(now - DAY_MS)).await;
    insert_assignment(&app, "late", "m1", "overdue", None).await;
    app
}

#[tokio::test]
async fn risk_triggers_and_levels() {
    let app = risk_roster().await;

    let (status, body) = app.get("/api/analytics/manager/stale/risk", Some("boss")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(trigger_codes(&body), vec!["STAGNANT"]);
    assert_eq!(body["level"], "Medium");

    let (_, body) = app.get("/api/analytics/manager/failing/risk", Some("boss")).await;
    assert_eq!(trigger_codes(&body), vec!["REPEATED_FAIL", "OVERDUE"]);
    assert_eq!(body["level"], "High");

    let (_, body) = app.get("/api/analytics/manager/late/risk", Some("boss")).await;
    assert_eq!(trigger_codes(&body), vec!["OVERDUE"]);
    assert_eq!(body["level"], "Medium");

    let (_, body) = app.get("/api/analytics/manager/steady/risk", Some("boss")).await;
    assert!(trigger_codes(&body).is_empty());
    assert_eq!(body["level"], "Low");
}

#[tokio::test]
async fn completed_assignments_are_never_overdue() {
    let app = TestApp::new().await;
    let now = now_ms();
    insert_user(&app, "boss", "manager").await;
    insert_user(&app, "done", "learner").await;
    insert_module(&app, "m1", false, true).await;
    insert_session(&app, "done", now - HOUR_MS, now - 60_000, 600).await;
    insert_assignment(&app, "done", "m1", "completed", Some(now - DAY_MS)).await;

    let (_, body) = app.get("/api/analytics/manager/done/risk", Some("boss")).await;
    assert!(trigger_codes(&body).is_empty(), "{body}");
}

#[tokio::test]
async fn team_summary_counts_high_risk_learners() {
    let app = risk_roster().await;

    let (status, body) = app.get("/api/analytics/manager/team-summary", Some("boss")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["at_risk_count"], 1);
    assert_eq!(body["active_24h"], 3);

    let (_, body) = app.get("/api/analytics/manager/learners", Some("boss")).await;
    let failing = body.as_array().unwrap().iter().find(|l| l["id"] == "failing").unwrap();
    assert_eq!(failing["risk_level"], "High");
    assert_eq!(failing["action_needed"], true);
    assert_eq!(failing["status"], "Stuck");
}

#[tokio::test]
async fn details_report_note_counts_without_content() {
    let app = team().await;
    insert_note(&app, "learner-1", "private reflection about my manager").await;
    insert_note(&app, "learner-1", "second private thought").await;

    let (status, body) = app.get("/api/analytics/manager/learner-1/details", Some("boss")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["notes"]["count"], 2);
    assert!(body["notes"]["last_update"].is_string());

    let raw = body.to_string();
    assert!(!raw.contains("private reflection"));
    assert!(!raw.contains("second private thought"));
}

#[tokio::test]
async fn classifier_window_can_be_requested() {
    let app = team().await;

    let (status, body) = app
        .get("/api/analytics/manager/learner-1/cognitive?window_days=30", Some("learner-1"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["window_days"], 30);

    let (_, body) = app
        .get("/api/analytics/manager/learner-1/cognitive?window_days=5000", Some("boss"))
        .await;
    assert_eq!(body["window_days"], 365);

    let (_, body) = app.get("/api/analytics/manager/learner-1/cognitive", Some("boss")).await;
    assert_eq!(body["window_days"], 7);

    let (status, body) = app
        .get("/api/analytics/intelligence/overview?window_days=14", Some("boss"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app
        .get("/api/analytics/intelligence/overview?window_days=soon", Some("boss"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}
