//! Task registry and execution loop.
//!
//! The registry owns every task. Running a task claims it, checks the result
//! cache, and otherwise asks the step executor for steps until it finishes,
//! fails, is cancelled or runs out of time. Each task is written to only by
//! the execution unit running it; everyone else reads snapshots.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use automation_core::{
    EndReason, ErrorCategory, ExecutionRequest, ResultSchema, Step, StepExecutor, StepOutcome,
    StepStatus, Task, TaskError, TaskStatus, TaskSummary,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use events::{Event, EventBus};
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{ResultCache, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use crate::error::{ExecutionFailure, OrchestratorError, Result};
use crate::metrics::PerformanceMonitor;
use crate::retry::{RetryEngine, RetryError, RetryPolicy};
use crate::state_machine::TaskStateMachine;

/// Operation name under which whole task runs are recorded.
pub const TASK_EXECUTION_OPERATION: &str = "task_execution";
const SESSION_START_OPERATION: &str = "session_start";
const STEP_EXECUTION_OPERATION: &str = "step_execution";

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub max_concurrent_tasks: usize,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    /// Template for per-task policies; `max_attempts` comes from each task's config.
    pub retry: RetryPolicy,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 5,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskOptions {
    pub schema: Option<ResultSchema>,
    /// Publish `step_update` events for this task
    pub stream_output: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            schema: None,
            stream_output: true,
        }
    }
}

struct TaskHandle {
    task: RwLock<Task>,
    cancel: CancellationToken,
    status: watch::Sender<TaskStatus>,
}

impl TaskHandle {
    fn new(task: Task) -> Self {
        let (status, _) = watch::channel(task.status);
        Self {
            task: RwLock::new(task),
            cancel: CancellationToken::new(),
            status,
        }
    }

    fn snapshot(&self) -> Task {
        self.read(Task::clone)
    }

    fn read<R>(&self, f: impl FnOnce(&Task) -> R) -> R {
        let guard = self.task.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Task) -> R) -> R {
        let mut guard = self
            .task
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// Validate and apply a status change, then notify status watchers.
    fn transition(&self, to: TaskStatus, apply: impl FnOnce(&mut Task)) -> Result<Task> {
        let snapshot = self.write(|task| {
            TaskStateMachine::validate_transition(&task.status, &to)?;
            task.status = to;
            apply(task);
            Ok::<_, OrchestratorError>(task.clone())
        })?;
        self.status.send_replace(to);
        Ok(snapshot)
    }
}

/// How an executed (non-cached) run ended, before the terminal transition.
enum RunEnd {
    Finished(Value),
    Failed(ExecutionFailure),
    Cancelled,
}

struct RegistryInner {
    tasks: DashMap<String, Arc<TaskHandle>>,
    executor: Arc<dyn StepExecutor>,
    events: EventBus,
    cache: ResultCache,
    monitor: PerformanceMonitor,
    retry: RetryEngine,
    permits: Semaphore,
    settings: RegistrySettings,
}

/// Owns tasks and runs them. Cheap to clone.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<RegistryInner>,
}

impl TaskRegistry {
    pub fn new(
        executor: Arc<dyn StepExecutor>,
        events: EventBus,
        settings: RegistrySettings,
    ) -> Self {
        let cache = ResultCache::new(settings.cache_capacity);
        let monitor = PerformanceMonitor::new();
        Self::with_components(executor, events, cache, monitor, settings)
    }

    /// Build a registry around an existing cache and monitor.
    pub fn with_components(
        executor: Arc<dyn StepExecutor>,
        events: EventBus,
        cache: ResultCache,
        monitor: PerformanceMonitor,
        settings: RegistrySettings,
    ) -> Self {
        let permits = Semaphore::new(settings.max_concurrent_tasks.max(1));
        Self {
            inner: Arc::new(RegistryInner {
                tasks: DashMap::new(),
                executor,
                events,
                retry: RetryEngine::new(monitor.clone()),
                cache,
                monitor,
                permits,
                settings,
            }),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn cache(&self) -> &ResultCache {
        &self.inner.cache
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.inner.monitor
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.inner.settings
    }

    fn handle(&self, id: &str) -> Result<Arc<TaskHandle>> {
        self.inner
            .tasks
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))
    }

    pub fn create(
        &self,
        id: &str,
        description: &str,
        config: automation_core::AutomationConfig,
    ) -> Result<Task> {
        self.create_with_options(id, description, config, TaskOptions::default())
    }

    pub fn create_with_options(
        &self,
        id: &str,
        description: &str,
        config: automation_core::AutomationConfig,
        options: TaskOptions,
    ) -> Result<Task> {
        if id.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "task id must not be empty".to_string(),
            ));
        }
        if description.trim().is_empty() {
            return Err(OrchestratorError::Validation(
                "task description must not be empty".to_string(),
            ));
        }

        let task = Task::new(id, description, config)
            .with_schema(options.schema)
            .with_stream_output(options.stream_output);

        match self.inner.tasks.entry(id.to_string()) {
            Entry::Occupied(_) => Err(OrchestratorError::DuplicateTask(id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(TaskHandle::new(task.clone())));
                info!(
                    task_id = %id,
                    config = %task.config.name,
                    "Task created"
                );
                Ok(task)
            }
        }
    }

    /// Run a pending task to a terminal state and return its final snapshot.
    pub async fn run(&self, id: &str, schema: Option<ResultSchema>) -> Result<Task> {
        let handle = self.handle(id)?;
        ensure_status(&handle, TaskStatus::Pending, TaskStatus::Running)?;

        let _permit = self
            .inner
            .permits
            .acquire()
            .await
            .map_err(|_| OrchestratorError::ShuttingDown)?;

        let (description, config, stored_schema) = handle.read(|task| {
            (
                task.description.clone(),
                task.config.clone(),
                task.schema.clone(),
            )
        });
        let fingerprint = ResultCache::fingerprint(&description, &config);

        if let Some(result) = self.inner.cache.get(&fingerprint) {
            return self.complete_from_cache(&handle, id, result);
        }

        let started = Instant::now();
        handle.transition(TaskStatus::Running, |task| {
            task.started_at = Some(Utc::now());
        })?;
        info!(task_id = %id, fingerprint = %fingerprint, "Task started");
        self.inner.events.publish(Event::TaskStarted {
            task_id: id.to_string(),
        });

        let request = ExecutionRequest {
            task_id: id.to_string(),
            description,
            config,
            schema: schema.or(stored_schema),
        };

        let timeout = Duration::from_secs(request.config.performance.timeout_secs);
        let execution = AssertUnwindSafe(self.execute(&handle, &request)).catch_unwind();
        let end = match tokio::time::timeout(timeout, execution).await {
            Ok(Ok(end)) => end,
            Ok(Err(panic)) => {
                let message = format!("Executor panicked: {}", panic_message(panic.as_ref()));
                RunEnd::Failed(self.failure(ErrorCategory::Unknown, message))
            }
            Err(_) => {
                let message = format!(
                    "Task timed out after {}s",
                    request.config.performance.timeout_secs
                );
                RunEnd::Failed(self.failure(ErrorCategory::Timeout, message))
            }
        };

        let end = match end {
            RunEnd::Finished(result) => match &request.schema {
                Some(schema) => match schema.validate(&result) {
                    Ok(()) => RunEnd::Finished(result),
                    Err(e) => RunEnd::Failed(self.failure(ErrorCategory::Validation, e.to_string())),
                },
                None => RunEnd::Finished(result),
            },
            other => other,
        };

        let (snapshot, reason) = match end {
            RunEnd::Finished(result) => {
                self.inner
                    .cache
                    .set(fingerprint, result.clone(), self.inner.settings.cache_ttl);
                (self.finish_completed(&handle, id, result)?, EndReason::Completed)
            }
            RunEnd::Failed(failure) => (self.finish_failed(&handle, id, failure)?, EndReason::Failed),
            RunEnd::Cancelled => (self.finish_cancelled(&handle, id)?, EndReason::Cancelled),
        };

        self.inner.monitor.record(
            TASK_EXECUTION_OPERATION,
            started.elapsed(),
            snapshot.status == TaskStatus::Completed,
        );
        self.inner.executor.end(id, reason).await;

        Ok(snapshot)
    }

    /// Run the task on its own tokio task.
    pub fn spawn(&self, id: &str, schema: Option<ResultSchema>) -> JoinHandle<Result<Task>> {
        let registry = self.clone();
        let id = id.to_string();
        tokio::spawn(async move { registry.run(&id, schema).await })
    }

    /// Signal a running task to stop and wait until it acknowledges.
    ///
    /// If the task reaches another terminal state first, that final snapshot
    /// is returned unchanged.
    pub async fn cancel(&self, id: &str) -> Result<Task> {
        let handle = self.handle(id)?;
        ensure_status(&handle, TaskStatus::Running, TaskStatus::Cancelled)?;

        let mut status = handle.status.subscribe();
        handle.cancel.cancel();
        info!(task_id = %id, "Cancellation requested");

        // The sender lives in the handle we hold, so this only ends on a terminal status.
        let _ = status.wait_for(|status| status.is_terminal()).await;
        Ok(handle.snapshot())
    }

    /// Stop admitting runs and cancel every running task.
    ///
    /// Runs still waiting for a concurrency slot, and any run started
    /// afterwards, fail with [`OrchestratorError::ShuttingDown`].
    pub fn shutdown(&self) {
        self.inner.permits.close();
        let mut cancelled = 0;
        for entry in self.inner.tasks.iter() {
            let handle = entry.value();
            if handle.read(|task| task.status == TaskStatus::Running) {
                handle.cancel.cancel();
                cancelled += 1;
            }
        }
        info!(cancelled, "Task registry shutting down");
    }

    pub fn status(&self, id: &str) -> Result<Task> {
        Ok(self.handle(id)?.snapshot())
    }

    pub fn steps(&self, id: &str) -> Result<Vec<Step>> {
        Ok(self.handle(id)?.read(|task| task.steps.clone()))
    }

    /// Summaries of every task, oldest first.
    pub fn list(&self) -> Vec<TaskSummary> {
        let mut summaries: Vec<TaskSummary> = self
            .inner
            .tasks
            .iter()
            .map(|entry| entry.value().read(Task::summary))
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        summaries
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .tasks
            .iter()
            .filter(|entry| entry.value().read(|task| task.status == TaskStatus::Running))
            .count()
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.is_empty()
    }

    fn policy_for(&self, request: &ExecutionRequest) -> RetryPolicy {
        self.inner
            .settings
            .retry
            .clone()
            .with_max_attempts(request.config.performance.retry_attempts)
    }

    fn failure(&self, category: ErrorCategory, message: String) -> ExecutionFailure {
        ExecutionFailure {
            category,
            suggestion: self.inner.retry.classifier().suggest(category).to_string(),
            message,
            attempts: 1,
        }
    }

    fn classified_failure(&self, message: String) -> ExecutionFailure {
        let category = self.inner.retry.classifier().categorize(&message);
        self.failure(category, message)
    }

    async fn execute(&self, handle: &TaskHandle, request: &ExecutionRequest) -> RunEnd {
        let executor = self.inner.executor.as_ref();
        let retry = &self.inner.retry;
        let cancel = &handle.cancel;
        let policy = self.policy_for(request);
        let max_steps = request.config.performance.max_steps;
        let task_id = request.task_id.as_str();

        if let Err(e) = retry
            .execute(SESSION_START_OPERATION, &policy, cancel, |_| {
                executor.begin(request)
            })
            .await
        {
            return retry_end(e);
        }

        let mut next_index: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return RunEnd::Cancelled;
            }

            let step_index = next_index;
            let outcome = match retry
                .execute(STEP_EXECUTION_OPERATION, &policy, cancel, |_| {
                    executor.next_step(request, step_index)
                })
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => return retry_end(e),
            };

            match outcome {
                StepOutcome::Step(report) => {
                    if next_index >= max_steps {
                        return RunEnd::Failed(self.classified_failure(format!(
                            "Task exceeded the limit of {max_steps} steps"
                        )));
                    }

                    let step = handle.write(|task| {
                        let mut step = Step::new(next_index, report.action, report.status)
                            .with_detail(report.detail);
                        if let Some(last) = task.steps.last() {
                            if step.timestamp < last.timestamp {
                                step.timestamp = last.timestamp;
                            }
                        }
                        task.steps.push(step.clone());
                        step
                    });
                    next_index += 1;

                    debug!(
                        task_id = %task_id,
                        step = step.index,
                        action = %step.action,
                        status = step.status.as_str(),
                        "Step reported"
                    );
                    self.publish_step(handle, task_id, step);
                }
                StepOutcome::StepResolved { status, detail } => {
                    let resolved = handle.write(|task| {
                        let step = task.steps.last_mut()?;
                        step.resolve(status).ok()?;
                        if detail.is_some() {
                            step.detail = detail;
                        }
                        Some(step.clone())
                    });

                    match resolved {
                        Some(step) => {
                            debug!(
                                task_id = %task_id,
                                step = step.index,
                                status = step.status.as_str(),
                                "Step resolved"
                            );
                            self.publish_step(handle, task_id, step);
                        }
                        None => {
                            warn!(task_id = %task_id, "Executor resolved a step that is not running");
                        }
                    }
                }
                StepOutcome::Finished { result } => return RunEnd::Finished(result),
                StepOutcome::Failed { message } => {
                    return RunEnd::Failed(self.classified_failure(message));
                }
            }
        }
    }

    fn publish_step(&self, handle: &TaskHandle, task_id: &str, step: Step) {
        if handle.read(|task| task.stream_output) {
            self.inner.events.publish(Event::StepUpdate {
                task_id: task_id.to_string(),
                step,
            });
        }
    }

    fn complete_from_cache(&self, handle: &TaskHandle, id: &str, result: Value) -> Result<Task> {
        let snapshot = handle.transition(TaskStatus::Completed, |task| {
            let now = Utc::now();
            task.started_at = Some(now);
            task.ended_at = Some(now);
            task.result = Some(result.clone());
            task.from_cache = true;
        })?;

        info!(task_id = %id, "Task completed from cache");
        self.inner.events.publish(Event::TaskCompleted {
            task_id: id.to_string(),
            result,
            from_cache: true,
        });
        self.inner
            .monitor
            .record(TASK_EXECUTION_OPERATION, Duration::ZERO, true);
        Ok(snapshot)
    }

    fn finish_completed(&self, handle: &TaskHandle, id: &str, result: Value) -> Result<Task> {
        let snapshot = handle.transition(TaskStatus::Completed, |task| {
            task.ended_at = Some(Utc::now());
            task.result = Some(result.clone());
        })?;

        info!(
            task_id = %id,
            steps = snapshot.steps.len(),
            duration_secs = snapshot.duration_secs(),
            "Task completed"
        );
        self.inner.events.publish(Event::TaskCompleted {
            task_id: id.to_string(),
            result,
            from_cache: false,
        });
        Ok(snapshot)
    }

    fn finish_failed(&self, handle: &TaskHandle, id: &str, failure: ExecutionFailure) -> Result<Task> {
        let task_error: TaskError = failure.clone().into();
        let snapshot = handle.transition(TaskStatus::Failed, |task| {
            task.ended_at = Some(Utc::now());
            task.error = Some(task_error);
            fail_running_step(task);
        })?;

        error!(
            task_id = %id,
            category = %failure.category,
            attempts = failure.attempts,
            error = %failure.message,
            "Task failed"
        );
        self.inner.events.publish(Event::TaskFailed {
            task_id: id.to_string(),
            error: failure.message,
            category: failure.category,
            suggestion: Some(failure.suggestion),
        });
        Ok(snapshot)
    }

    fn finish_cancelled(&self, handle: &TaskHandle, id: &str) -> Result<Task> {
        let snapshot = handle.transition(TaskStatus::Cancelled, |task| {
            task.ended_at = Some(Utc::now());
            fail_running_step(task);
        })?;

        info!(task_id = %id, steps = snapshot.steps.len(), "Task cancelled");
        self.inner.events.publish(Event::TaskCancelled {
            task_id: id.to_string(),
        });
        Ok(snapshot)
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.len())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

fn ensure_status(handle: &TaskHandle, expected: TaskStatus, to: TaskStatus) -> Result<()> {
    let current = handle.read(|task| task.status);
    if current == expected {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidTransition {
            from: current.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

/// A step left running when its task ends did not complete.
fn fail_running_step(task: &mut Task) {
    if let Some(step) = task.steps.last_mut() {
        if step.status == StepStatus::Running {
            step.status = StepStatus::Failed;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

fn retry_end(error: RetryError) -> RunEnd {
    match error {
        RetryError::Exhausted(failure) => RunEnd::Failed(failure),
        RetryError::Cancelled { .. } => RunEnd::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use automation_core::{AutomationConfig, ExecutorError};
    use serde_json::json;

    /// Finishes immediately with a fixed result.
    struct Immediate;

    #[async_trait]
    impl StepExecutor for Immediate {
        async fn next_step(
            &self,
            _request: &ExecutionRequest,
            _step_index: u32,
        ) -> std::result::Result<StepOutcome, ExecutorError> {
            Ok(StepOutcome::Finished {
                result: json!({ "ok": true }),
            })
        }
    }

    fn registry() -> TaskRegistry {
        TaskRegistry::new(
            Arc::new(Immediate),
            EventBus::new(),
            RegistrySettings::default(),
        )
    }

    #[test]
    fn test_create_validates_input() {
        let registry = registry();
        assert!(matches!(
            registry.create("", "search", AutomationConfig::default()),
            Err(OrchestratorError::Validation(_))
        ));
        assert!(matches!(
            registry.create("t1", "   ", AutomationConfig::default()),
            Err(OrchestratorError::Validation(_))
        ));
    }

    #[test]
    fn test_create_rejects_duplicates() {
        let registry = registry();
        let task = registry
            .create("t1", "search X", AutomationConfig::default())
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);

        assert!(matches!(
            registry.create("t1", "other", AutomationConfig::default()),
            Err(OrchestratorError::DuplicateTask(id)) if id == "t1"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_task() {
        let registry = registry();
        assert!(matches!(
            registry.status("missing"),
            Err(OrchestratorError::NotFound(_))
        ));
        assert!(matches!(
            registry.steps("missing"),
            Err(OrchestratorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let registry = registry();
        registry
            .create("t1", "search X", AutomationConfig::default())
            .unwrap();

        let task = registry.run("t1", None).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);

        assert!(matches!(
            registry.run("t1", None).await,
            Err(OrchestratorError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_requires_running() {
        let registry = registry();
        registry
            .create("t1", "search X", AutomationConfig::default())
            .unwrap();

        assert!(matches!(
            registry.cancel("t1").await,
            Err(OrchestratorError::InvalidTransition { from, .. }) if from == "pending"
        ));
        assert!(matches!(
            registry.cancel("missing").await,
            Err(OrchestratorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_and_active_count() {
        let registry = registry();
        registry
            .create("a", "first", AutomationConfig::default())
            .unwrap();
        registry
            .create("b", "second", AutomationConfig::default())
            .unwrap();
        registry.run("a", None).await.unwrap();

        let summaries = registry.list();
        assert_eq!(summaries.len(), 2);
        assert_eq!(registry.active_count(), 0);
        assert!(summaries
            .iter()
            .any(|s| s.id == "a" && s.status == TaskStatus::Completed));
    }
}
