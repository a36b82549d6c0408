use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use automation_core::{AutomationConfig, ResultSchema, Step, Task, TaskStatus, TaskSummary};
use orchestrator::TaskOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

const CUSTOM_SCHEMA_NAME: &str = "custom";

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    pub task_description: String,
    /// Named template; takes precedence over recommendation
    #[serde(default)]
    pub config_name: Option<String>,
    /// Overrides merged into the selected configuration
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub custom_config: Option<Value>,
    #[serde(default)]
    pub schema_name: Option<String>,
    /// JSON schema document; its `required` array is enforced
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub custom_schema: Option<Value>,
    #[serde(default = "default_true")]
    pub enable_vnc: bool,
    #[serde(default = "default_true")]
    pub stream_output: bool,
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateTaskResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vnc_url: Option<String>,
    pub websocket_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskSummary>,
    pub count: usize,
    pub active_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelTaskResponse {
    pub message: String,
    pub task: Task,
}

fn resolve_config(state: &AppState, payload: &CreateTaskRequest) -> Result<AutomationConfig, AppError> {
    let base = match (&payload.config_name, &payload.custom_config) {
        (Some(name), _) => state.configs.get(name)?,
        (None, Some(_)) => AutomationConfig::default(),
        (None, None) => state.configs.recommend(&payload.task_description),
    };

    let mut config = match &payload.custom_config {
        Some(overrides) => base.with_overrides(overrides)?,
        None => base,
    };
    config.browser.headless = !payload.enable_vnc;
    Ok(config)
}

fn resolve_schema(
    state: &AppState,
    payload: &CreateTaskRequest,
) -> Result<Option<ResultSchema>, AppError> {
    if let Some(name) = &payload.schema_name {
        return Ok(Some(state.schemas.get(name)?));
    }

    let Some(document) = &payload.custom_schema else {
        return Ok(None);
    };
    let Some(object) = document.as_object() else {
        return Err(AppError::BadRequest(
            "custom_schema must be a JSON object".to_string(),
        ));
    };

    let required: Vec<&str> = match object.get("required") {
        None => Vec::new(),
        Some(Value::Array(fields)) => fields.iter().filter_map(Value::as_str).collect(),
        Some(_) => {
            return Err(AppError::BadRequest(
                "custom_schema.required must be an array of field names".to_string(),
            ))
        }
    };
    let name = object
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(CUSTOM_SCHEMA_NAME);

    Ok(Some(
        ResultSchema::new(name, &required).with_document(document.clone()),
    ))
}

#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created and started", body = CreateTaskResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 409, description = "Task ID already in use", body = crate::error::ErrorResponse),
    ),
    tag = "tasks"
)]
pub async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<CreateTaskResponse>), AppError> {
    if payload.task_description.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Task description cannot be empty".to_string(),
        ));
    }

    let config = resolve_config(&state, &payload)?;
    let schema = resolve_schema(&state, &payload)?;
    let task_id = payload
        .task_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let task = state.registry.create_with_options(
        &task_id,
        &payload.task_description,
        config,
        TaskOptions {
            schema,
            stream_output: payload.stream_output,
        },
    )?;

    // Detached: progress is reported through the event streams.
    drop(state.registry.spawn(&task.id, None));

    let vnc_url = payload
        .enable_vnc
        .then(|| state.config.server.vnc_url.clone());

    Ok((
        StatusCode::CREATED,
        Json(CreateTaskResponse {
            websocket_url: format!("/ws/{}", task.id),
            task_id: task.id,
            status: task.status,
            message: "Task created successfully".to_string(),
            vnc_url,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/tasks",
    responses(
        (status = 200, description = "All tasks, oldest first", body = TaskListResponse),
    ),
    tag = "tasks"
)]
pub async fn list_tasks(State(state): State<AppState>) -> Json<TaskListResponse> {
    let tasks = state.registry.list();
    Json(TaskListResponse {
        count: tasks.len(),
        active_count: state.registry.active_count(),
        tasks,
    })
}

#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    params(("id" = String, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task snapshot", body = Task),
        (status = 404, description = "Task not found", body = crate::error::ErrorResponse),
    ),
    tag = "tasks"
)]
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(state.registry.status(&id)?))
}

#[utoipa::path(
    get,
    path = "/api/tasks/{id}/steps",
    params(("id" = String, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Steps in execution order", body = Vec<Step>),
        (status = 404, description = "Task not found", body = crate::error::ErrorResponse),
    ),
    tag = "tasks"
)]
pub async fn get_task_steps(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Step>>, AppError> {
    Ok(Json(state.registry.steps(&id)?))
}

#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    params(("id" = String, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task stopped", body = CancelTaskResponse),
        (status = 404, description = "Task not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Task is not running", body = crate::error::ErrorResponse),
    ),
    tag = "tasks"
)]
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelTaskResponse>, AppError> {
    let task = state.registry.cancel(&id).await?;

    let message = if task.status == TaskStatus::Cancelled {
        "Task cancelled successfully".to_string()
    } else {
        format!("Task finished as {} before it could be cancelled", task.status)
    };

    Ok(Json(CancelTaskResponse { message, task }))
}
