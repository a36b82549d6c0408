use automation_core::TaskStatus;

use crate::error::{OrchestratorError, Result};

pub struct TaskStateMachine;

impl TaskStateMachine {
    pub fn validate_transition(from: &TaskStatus, to: &TaskStatus) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &TaskStatus) -> Vec<TaskStatus> {
        match from {
            // Completed directly from Pending on a cache hit
            TaskStatus::Pending => vec![TaskStatus::Running, TaskStatus::Completed],
            TaskStatus::Running => vec![
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::Cancelled,
            ],
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn can_transition(from: &TaskStatus, to: &TaskStatus) -> bool {
        TaskStateMachine::validate_transition(from, to).is_ok()
    }

    #[test]
    fn test_valid_transitions() {
        assert!(can_transition(
            &TaskStatus::Pending,
            &TaskStatus::Running
        ));
        assert!(can_transition(
            &TaskStatus::Pending,
            &TaskStatus::Completed
        ));
        assert!(can_transition(
            &TaskStatus::Running,
            &TaskStatus::Cancelled
        ));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!can_transition(
            &TaskStatus::Pending,
            &TaskStatus::Failed
        ));
        assert!(!can_transition(
            &TaskStatus::Running,
            &TaskStatus::Pending
        ));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            for to in [
                TaskStatus::Pending,
                TaskStatus::Running,
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::Cancelled,
            ] {
                assert!(!can_transition(&terminal, &to));
            }
        }
    }

    #[test]
    fn test_error_names_states() {
        let err =
            TaskStateMachine::validate_transition(&TaskStatus::Failed, &TaskStatus::Running)
                .unwrap_err();
        assert!(err.to_string().contains("failed"));
        assert!(err.to_string().contains("running"));
    }
}
