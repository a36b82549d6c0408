pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Automation Studio API",
        version = "0.1.0",
        description = "Browser automation task orchestration with live event streaming"
    ),
    paths(
        routes::health_check,
        routes::create_task,
        routes::list_tasks,
        routes::get_task,
        routes::get_task_steps,
        routes::cancel_task,
        routes::get_performance,
        routes::list_configs,
        routes::list_schemas,
        routes::sse::events_stream,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::CreateTaskRequest,
        routes::CreateTaskResponse,
        routes::TaskListResponse,
        routes::CancelTaskResponse,
        routes::SchemaListResponse,
        error::ErrorResponse,
        orchestrator::OperationStats,
        automation_core::Task,
        automation_core::TaskStatus,
        automation_core::TaskSummary,
        automation_core::TaskError,
        automation_core::Step,
        automation_core::StepStatus,
        automation_core::AutomationConfig,
        automation_core::ResultSchema,
        automation_core::ErrorCategory,
        events::EventEnvelope,
        events::Event,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "tasks", description = "Automation task endpoints"),
        (name = "monitoring", description = "Performance statistics"),
        (name = "catalog", description = "Configuration templates and result schemas"),
        (name = "events", description = "Real-time event streaming (SSE)"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health_check))
        .route(
            "/api/tasks",
            get(routes::list_tasks).post(routes::create_task),
        )
        .route(
            "/api/tasks/{id}",
            get(routes::get_task).delete(routes::cancel_task),
        )
        .route("/api/tasks/{id}/steps", get(routes::get_task_steps))
        .route("/api/performance", get(routes::get_performance))
        .route("/api/configs", get(routes::list_configs))
        .route("/api/schemas", get(routes::list_schemas))
        .route("/api/events", get(routes::sse::events_stream))
        .route("/ws/{client_id}", get(routes::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
