//! Task lifecycle rules.

use crate::entities::task::TaskStatus;
use std::fmt;

/// Something a user can do to move a task through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Accept,
    Complete,
    Cancel,
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            TaskAction::Accept => "accept",
            TaskAction::Complete => "complete",
            TaskAction::Cancel => "cancel",
        };
        f.write_str(verb)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Cannot {action} a task that is {}", .from.phrase())]
pub struct InvalidTransition {
    pub from: TaskStatus,
    pub action: TaskAction,
}

impl TaskStatus {
    /// Returns the status reached by applying `action`, or the rejected transition.
    pub fn apply(self, action: TaskAction) -> Result<TaskStatus, InvalidTransition> {
        match (self, action) {
            (TaskStatus::Open, TaskAction::Accept) => Ok(TaskStatus::InProgress),
            (TaskStatus::InProgress, TaskAction::Complete) => Ok(TaskStatus::Completed),
            (TaskStatus::Open | TaskStatus::InProgress, TaskAction::Cancel) => {
                Ok(TaskStatus::Cancelled)
            }
            (from, action) => Err(InvalidTransition { from, action }),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// Lower-case name for use inside sentences.
    pub fn phrase(self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Title-cased name for display in pages.
    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Open => "Open",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Completed",
            TaskStatus::Cancelled => "Cancelled",
        }
    }
}
