mod step;
mod task;

pub use step::{Step, StepStatus};
pub use task::{Task, TaskError, TaskStatus, TaskSummary};
