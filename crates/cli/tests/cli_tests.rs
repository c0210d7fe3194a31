//! CLI integration tests

use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};

/// Run the CLI with an isolated home directory and no API URL from the env
fn harmonia(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_harmonia"))
        .args(args)
        .env("HOME", home)
        .env_remove("HARMONIA_API_URL")
        .output()
        .expect("Failed to execute command")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let home = tempfile::tempdir().unwrap();
    let output = harmonia(home.path(), &["--help"]);

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Harmonia"), "Should show app name");
    for command in ["recommend", "health", "actions", "features", "classify"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("HARMONIA_API_URL"), "Should show env var");
    assert!(stdout.contains("--format"), "Should show format option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let home = tempfile::tempdir().unwrap();
    let output = harmonia(home.path(), &["--version"]);

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("harmonia"), "Should show binary name");
}

#[test]
fn test_recommend_help() {
    let home = tempfile::tempdir().unwrap();
    let output = harmonia(home.path(), &["recommend", "--help"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("--token"), "Should show token option");
}

#[test]
fn test_builtin_actions_as_json() {
    let home = tempfile::tempdir().unwrap();
    let output = harmonia(home.path(), &["--format", "json", "actions"]);

    assert!(output.status.success());
    let table = stdout_json(&output);
    let templates = table["templates"].as_object().unwrap();
    assert_eq!(templates.len(), 11);
    assert_eq!(templates["5"]["details"]["title"], "Mindfulness Break");
    assert_eq!(templates["10"]["action"], "draft_email");
    assert_eq!(templates["10"]["details"]["to"], "manager@company.com");
}

#[test]
fn test_builtin_actions_as_table() {
    let home = tempfile::tempdir().unwrap();
    let output = harmonia(home.path(), &["actions"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("create_break_event"));
    assert!(stdout.contains("Wellness Break"));
}

#[test]
fn test_incomplete_action_table_is_rejected() {
    let home = tempfile::tempdir().unwrap();
    let table = home.path().join("actions.json");
    std::fs::write(
        &table,
        r#"{"version": 2, "templates": {"0": {"action": "send_slack_notification", "details": {"message": "hi"}}}}"#,
    )
    .unwrap();

    let output = harmonia(
        home.path(),
        &["actions", "--table", table.to_str().unwrap()],
    );

    assert!(!output.status.success(), "Incomplete table should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing levels"), "stderr: {}", stderr);
}

#[test]
fn test_features_from_saved_aggregate() {
    let home = tempfile::tempdir().unwrap();
    let telemetry = home.path().join("aggregate.json");
    std::fs::write(
        &telemetry,
        r#"{
            "calendar_events": [
                {
                    "summary": "Planning",
                    "start": {"dateTime": "2026-03-10T09:00:00Z"},
                    "end": {"dateTime": "2026-03-10T11:30:00Z"}
                },
                {"summary": "Reply to urgent email from legal"}
            ],
            "heart_rate_data": [
                {"value": [{"fpVal": 80.0}, {"intVal": 90}]}
            ]
        }"#,
    )
    .unwrap();

    let output = harmonia(
        home.path(),
        &[
            "--format",
            "json",
            "features",
            telemetry.to_str().unwrap(),
            "--at",
            "2026-03-10T12:00:00Z",
        ],
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report = stdout_json(&output);
    let features = &report["features"];
    assert_eq!(features["HeartRate_Avg"], 85.0);
    assert_eq!(features["Steps_Last_24h"], 8000.0);
    assert_eq!(features["Calendar_Busy_Hours"], 2.5);
    assert_eq!(features["Sleep_Duration"], 7.0);
    assert_eq!(features["Urgent_Emails_Flag"], 1.0);
    assert_eq!(report["urgency_backend"], "keyword");
}

#[test]
fn test_features_rejects_bad_timestamp() {
    let home = tempfile::tempdir().unwrap();
    let telemetry = home.path().join("aggregate.json");
    std::fs::write(&telemetry, "{}").unwrap();

    let output = harmonia(
        home.path(),
        &["features", telemetry.to_str().unwrap(), "--at", "yesterday"],
    );

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--at"));
}

#[test]
fn test_classify_keyword_fallback() {
    let home = tempfile::tempdir().unwrap();
    let output = harmonia(
        home.path(),
        &[
            "--format",
            "json",
            "classify",
            "URGENT: deadline today",
            "Lunch on Friday?",
        ],
    );

    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["backend"], "keyword");
    assert_eq!(report["urgent_emails_flag"], 1.0);
    assert_eq!(report["texts"][0]["urgent"], true);
    assert_eq!(report["texts"][1]["urgent"], false);
}

#[test]
fn test_recommend_against_service() {
    let home = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/api/v1/recommend")
        .match_body(mockito::Matcher::PartialJson(
            serde_json::json!({"user_token": "tok"}),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "status": "success",
                "recommendation": "Action dispatched: create_break_event",
                "stress_level": 5,
                "action_taken": "create_break_event",
                "action_details": {"title": "Mindfulness Break", "duration": 20},
                "features_used": {"HeartRate_Avg": 70.0},
                "action_service_response": {"status": "success"},
                "timestamp": "2026-03-10T12:00:00Z"
            }"#,
        )
        .create();

    let url = server.url();
    let output = harmonia(
        home.path(),
        &["--api-url", &url, "recommend", "--token", "tok"],
    );

    mock.assert();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("Action dispatched: create_break_event"));
    assert!(stdout.contains("Mindfulness Break"));
}

#[test]
fn test_health_exits_nonzero_when_unhealthy() {
    let home = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/health")
        .with_status(503)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "status": "unhealthy",
                "service": "assistant",
                "timestamp": "2026-03-10T12:00:00Z",
                "checks": {
                    "ml_model": {"status": "unhealthy", "message": "ML model not loaded", "last_check_timestamp": 0},
                    "integrations_service": {"status": "healthy", "response_time_ms": 4.2, "last_check_timestamp": 0}
                }
            }"#,
        )
        .create();

    let url = server.url();
    let output = harmonia(home.path(), &["--api-url", &url, "health"]);

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ml_model"));
    assert!(stdout.contains("ML model not loaded"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unhealthy"));
}

/// Test missing token error handling
#[test]
fn test_recommend_without_token() {
    let home = tempfile::tempdir().unwrap();
    let output = harmonia(home.path(), &["recommend"]);

    assert!(!output.status.success(), "Missing token should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--token"), "Should explain how to pass a token");
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let home = tempfile::tempdir().unwrap();
    let output = harmonia(home.path(), &["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}
