use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use server::config::ServerConfig;
use server::{create_router, state::AppState};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup_test_server() -> (TestServer, MockServer) {
    let mock_agent = MockServer::start().await;

    let mut config = ServerConfig::default();
    config.server.agent_url = mock_agent.uri();
    config.server.vnc_url = "vnc://test:5900".to_string();
    config.retry.base_delay_ms = 10;
    config.retry.jitter = false;

    let state = AppState::new(config);
    let app = create_router(state);

    let server = TestServer::new(app).expect("Failed to create test server");

    (server, mock_agent)
}

async fn mock_agent_session(agent: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "session_id": "s-1" })))
        .mount(agent)
        .await;

    Mock::given(method("DELETE"))
        .and(path_regex(r"^/sessions/[^/]+$"))
        .respond_with(ResponseTemplate::new(204))
        .mount(agent)
        .await;
}

/// Two completed steps, then `{"found": true}`.
async fn mock_search_agent(agent: &MockServer) {
    mock_agent_session(agent).await;

    for (index, action) in [(0, "open search page"), (1, "submit query")] {
        Mock::given(method("POST"))
            .and(path("/sessions/s-1/steps"))
            .and(wiremock::matchers::body_json(json!({ "step_index": index })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "type": "step", "action": action })),
            )
            .mount(agent)
            .await;
    }

    Mock::given(method("POST"))
        .and(path("/sessions/s-1/steps"))
        .and(wiremock::matchers::body_json(json!({ "step_index": 2 })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "type": "finished", "result": { "found": true } })),
        )
        .mount(agent)
        .await;
}

async fn post_count(agent: &MockServer) -> usize {
    agent
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.method.as_str() == "POST")
        .count()
}

async fn wait_for_status(server: &TestServer, task_id: &str, wanted: &[&str]) -> Value {
    for _ in 0..300 {
        let body: Value = server.get(&format!("/api/tasks/{}", task_id)).await.json();
        if wanted.iter().any(|status| body["status"] == *status) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {} never reached {:?}", task_id, wanted);
}

mod health {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let (server, _agent) = setup_test_server().await;

        let response = server.get("/health").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_tasks"], 0);
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let (server, _agent) = setup_test_server().await;

        let response = server.get("/api/openapi.json").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert!(body["paths"]["/api/tasks"].is_object());
        assert!(body["paths"]["/api/events"].is_object());
    }
}

mod tasks_lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_create_task_runs_to_completion() {
        let (server, agent) = setup_test_server().await;
        mock_search_agent(&agent).await;

        let response = server
            .post("/api/tasks")
            .json(&json!({ "task_description": "search X", "task_id": "t1" }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["task_id"], "t1");
        assert_eq!(body["status"], "pending");
        assert_eq!(body["message"], "Task created successfully");
        assert_eq!(body["vnc_url"], "vnc://test:5900");
        assert_eq!(body["websocket_url"], "/ws/t1");

        let task = wait_for_status(&server, "t1", &["completed", "failed"]).await;
        assert_eq!(task["status"], "completed");
        assert_eq!(task["result"], json!({ "found": true }));
        assert_eq!(task["from_cache"], false);
        assert_eq!(task["config"]["browser"]["headless"], false);

        let steps: Value = server.get("/api/tasks/t1/steps").await.json();
        let steps = steps.as_array().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0]["index"], 0);
        assert_eq!(steps[0]["action"], "open search page");
        assert_eq!(steps[1]["index"], 1);
        assert_eq!(steps[1]["status"], "completed");
    }

    #[tokio::test]
    async fn test_repeat_task_served_from_cache() {
        let (server, agent) = setup_test_server().await;
        mock_search_agent(&agent).await;

        server
            .post("/api/tasks")
            .json(&json!({ "task_description": "search X", "task_id": "first" }))
            .await
            .assert_status(StatusCode::CREATED);
        wait_for_status(&server, "first", &["completed"]).await;

        let calls_before = post_count(&agent).await;

        server
            .post("/api/tasks")
            .json(&json!({ "task_description": "search X", "task_id": "second" }))
            .await
            .assert_status(StatusCode::CREATED);
        let task = wait_for_status(&server, "second", &["completed"]).await;

        assert_eq!(task["from_cache"], true);
        assert_eq!(task["steps"].as_array().unwrap().len(), 0);
        assert_eq!(post_count(&agent).await, calls_before);
    }

    #[tokio::test]
    async fn test_disable_vnc_runs_headless() {
        let (server, agent) = setup_test_server().await;
        mock_search_agent(&agent).await;

        let response = server
            .post("/api/tasks")
            .json(&json!({
                "task_description": "search X",
                "task_id": "headless",
                "enable_vnc": false
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert!(body.get("vnc_url").is_none());

        let task: Value = server.get("/api/tasks/headless").await.json();
        assert_eq!(task["config"]["browser"]["headless"], true);
    }

    #[tokio::test]
    async fn test_named_config_with_overrides() {
        let (server, agent) = setup_test_server().await;
        mock_search_agent(&agent).await;

        server
            .post("/api/tasks")
            .json(&json!({
                "task_description": "search X",
                "task_id": "tuned",
                "config_name": "fast_automation",
                "custom_config": { "performance": { "max_steps": 7 } }
            }))
            .await
            .assert_status(StatusCode::CREATED);

        let task: Value = server.get("/api/tasks/tuned").await.json();
        assert_eq!(task["config"]["name"], "fast_automation");
        assert_eq!(task["config"]["performance"]["max_steps"], 7);
    }

    #[tokio::test]
    async fn test_agent_failure_is_classified() {
        let (server, agent) = setup_test_server().await;
        mock_agent_session(&agent).await;

        Mock::given(method("POST"))
            .and(path("/sessions/s-1/steps"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "failed",
                "message": "Authentication required: login failed"
            })))
            .mount(&agent)
            .await;

        server
            .post("/api/tasks")
            .json(&json!({ "task_description": "check account", "task_id": "auth" }))
            .await
            .assert_status(StatusCode::CREATED);

        let task = wait_for_status(&server, "auth", &["failed", "completed"]).await;
        assert_eq!(task["status"], "failed");
        assert_eq!(task["error"]["category"], "authentication");
        assert!(task.get("result").is_none());
    }

    #[tokio::test]
    async fn test_transient_agent_errors_are_retried() {
        let (server, agent) = setup_test_server().await;
        mock_agent_session(&agent).await;

        Mock::given(method("POST"))
            .and(path("/sessions/s-1/steps"))
            .respond_with(ResponseTemplate::new(503).set_body_string("agent busy"))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&agent)
            .await;

        Mock::given(method("POST"))
            .and(path("/sessions/s-1/steps"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "type": "finished", "result": { "ok": true } })),
            )
            .mount(&agent)
            .await;

        server
            .post("/api/tasks")
            .json(&json!({ "task_description": "flaky page", "task_id": "flaky" }))
            .await
            .assert_status(StatusCode::CREATED);

        let task = wait_for_status(&server, "flaky", &["completed", "failed"]).await;
        assert_eq!(task["status"], "completed");

        let stats: Value = server.get("/api/performance").await.json();
        assert_eq!(stats["step_execution"]["total_calls"], 3);
        assert_eq!(stats["step_execution"]["error_count"], 2);
        assert_eq!(stats["task_execution"]["success_count"], 1);
    }

    #[tokio::test]
    async fn test_custom_schema_rejects_incomplete_result() {
        let (server, agent) = setup_test_server().await;
        mock_search_agent(&agent).await;

        server
            .post("/api/tasks")
            .json(&json!({
                "task_description": "search X",
                "task_id": "strict",
                "custom_schema": { "type": "object", "required": ["price"] }
            }))
            .await
            .assert_status(StatusCode::CREATED);

        let task = wait_for_status(&server, "strict", &["failed", "completed"]).await;
        assert_eq!(task["status"], "failed");
        assert_eq!(task["error"]["category"], "validation");
        assert_eq!(task["schema"]["name"], "custom");
    }
}

mod tasks_validation {
    use super::*;

    #[tokio::test]
    async fn test_empty_description_rejected() {
        let (server, _agent) = setup_test_server().await;

        let response = server
            .post("/api/tasks")
            .json(&json!({ "task_description": "   " }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn test_unknown_config_rejected() {
        let (server, _agent) = setup_test_server().await;

        let response = server
            .post("/api/tasks")
            .json(&json!({ "task_description": "search X", "config_name": "turbo" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert!(body["message"].as_str().unwrap().contains("turbo"));
    }

    #[tokio::test]
    async fn test_unknown_schema_rejected() {
        let (server, _agent) = setup_test_server().await;

        let response = server
            .post("/api/tasks")
            .json(&json!({ "task_description": "search X", "schema_name": "nope" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bad_overrides_rejected() {
        let (server, _agent) = setup_test_server().await;

        let response = server
            .post("/api/tasks")
            .json(&json!({ "task_description": "search X", "custom_config": [1, 2] }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_duplicate_task_id_conflicts() {
        let (server, agent) = setup_test_server().await;
        mock_search_agent(&agent).await;

        server
            .post("/api/tasks")
            .json(&json!({ "task_description": "search X", "task_id": "dup" }))
            .await
            .assert_status(StatusCode::CREATED);

        let response = server
            .post("/api/tasks")
            .json(&json!({ "task_description": "search Y", "task_id": "dup" }))
            .await;

        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["error"], "conflict");
    }

    #[tokio::test]
    async fn test_unknown_task_not_found() {
        let (server, _agent) = setup_test_server().await;

        server
            .get("/api/tasks/missing")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .get("/api/tasks/missing/steps")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .delete("/api/tasks/missing")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}

mod tasks_listing {
    use super::*;

    #[tokio::test]
    async fn test_list_tasks() {
        let (server, agent) = setup_test_server().await;
        mock_search_agent(&agent).await;

        for id in ["a", "b"] {
            server
                .post("/api/tasks")
                .json(&json!({ "task_description": format!("search {}", id), "task_id": id }))
                .await
                .assert_status(StatusCode::CREATED);
        }

        let response = server.get("/api/tasks").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["count"], 2);
        let ids: Vec<&str> = body["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|task| task["id"].as_str().unwrap())
            .collect();
        assert!(ids.contains(&"a"));
        assert!(ids.contains(&"b"));
        assert!(body["active_count"].is_number());
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn test_cancel_running_task() {
        let (server, agent) = setup_test_server().await;
        mock_agent_session(&agent).await;

        Mock::given(method("POST"))
            .and(path("/sessions/s-1/steps"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "type": "step", "action": "scroll" }))
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&agent)
            .await;

        server
            .post("/api/tasks")
            .json(&json!({
                "task_description": "endless feed",
                "task_id": "endless",
                "custom_config": { "performance": { "max_steps": 100000 } }
            }))
            .await
            .assert_status(StatusCode::CREATED);
        wait_for_status(&server, "endless", &["running"]).await;

        let response = server.delete("/api/tasks/endless").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["task"]["status"], "cancelled");
        assert_eq!(body["message"], "Task cancelled successfully");

        let steps_at_cancel = body["task"]["steps"].as_array().unwrap().len();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let steps: Value = server.get("/api/tasks/endless/steps").await.json();
        assert_eq!(steps.as_array().unwrap().len(), steps_at_cancel);
    }

    #[tokio::test]
    async fn test_cancel_finished_task_conflicts() {
        let (server, agent) = setup_test_server().await;
        mock_search_agent(&agent).await;

        server
            .post("/api/tasks")
            .json(&json!({ "task_description": "search X", "task_id": "done" }))
            .await
            .assert_status(StatusCode::CREATED);
        wait_for_status(&server, "done", &["completed"]).await;

        server
            .delete("/api/tasks/done")
            .await
            .assert_status(StatusCode::CONFLICT);
    }
}

mod catalog {
    use super::*;

    #[tokio::test]
    async fn test_list_configs() {
        let (server, _agent) = setup_test_server().await;

        let response = server.get("/api/configs").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert!(body["default"].is_string());
        assert!(body["fast_automation"].is_string());
    }

    #[tokio::test]
    async fn test_list_schemas() {
        let (server, _agent) = setup_test_server().await;

        let response = server.get("/api/schemas").await;

        response.assert_status_ok();
        let body: Value = response.json();
        let schemas = body["schemas"].as_array().unwrap();
        assert_eq!(body["count"], schemas.len());
        assert!(schemas.iter().any(|name| name == "comprehensive_automation"));
    }
}
