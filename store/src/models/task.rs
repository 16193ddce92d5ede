//! The Task model: a single dispatched job run against a template

use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The lifecycle state of a dispatched [`Task`]
///
/// Transitions: SCHEDULED -> WAITING -> RUNNING -> {SUCCEEDED, FAILED, TLE,
/// MLE}, with DELETING reachable from any non-terminal state on external
/// request.
#[derive(Serialize, Deserialize, ToSql, FromSql, Debug, Clone, Copy, PartialEq, Eq)]
#[postgres(name = "task_status")]
pub enum TaskStatus {
    /// Created but not yet handed to the Job Dispatcher
    #[postgres(name = "scheduled")]
    Scheduled,
    /// Handed to the dispatcher, waiting on a pool lease or Job admission
    #[postgres(name = "waiting")]
    Waiting,
    /// The backing Job's pod has been scheduled but has not started running
    #[postgres(name = "pending")]
    Pending,
    /// The backing Job's pod is running
    #[postgres(name = "running")]
    Running,
    /// The Job's container exited zero
    #[postgres(name = "succeeded")]
    Succeeded,
    /// The Job's container exited nonzero (other than 124/137)
    #[postgres(name = "failed")]
    Failed,
    /// The Job's container was killed for exceeding its time limit (exit 124)
    #[postgres(name = "tle")]
    TimeLimitExceeded,
    /// The Job's container was killed for exceeding its memory limit (exit 137)
    #[postgres(name = "mle")]
    MemoryLimitExceeded,
    /// Deletion was requested externally; cleanup is in flight
    #[postgres(name = "deleting")]
    Deleting,
}

impl TaskStatus {
    /// True once a task has reached a state the Job Watcher will not advance
    /// further on its own
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded
                | TaskStatus::Failed
                | TaskStatus::TimeLimitExceeded
                | TaskStatus::MemoryLimitExceeded
        )
    }

    /// Map a container's exit code to the terminal status it implies
    ///
    /// Exit 124 is the convention for a `timeout`-killed process and 137 is
    /// 128 + SIGKILL(9), the signal the kubelet sends a pod that exceeds its
    /// memory limit.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => TaskStatus::Succeeded,
            124 => TaskStatus::TimeLimitExceeded,
            137 => TaskStatus::MemoryLimitExceeded,
            _ => TaskStatus::Failed,
        }
    }
}

/// A single dispatched run of a [`crate::models::TaskTemplate`]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Task {
    /// The unique id for this task
    pub uuid: Uuid,
    /// The template this task was dispatched from
    pub template_uuid: Uuid,
    /// The user this task runs on behalf of
    pub user_id: i64,
    /// The current lifecycle state
    pub status: TaskStatus,
    /// The name of the Kubernetes Job backing this task, once dispatched
    pub job_name: Option<String>,
    /// The container exit code, once the Job has completed
    pub exit_code: Option<i32>,
    /// When this task was created
    pub create_time: DateTime<Utc>,
    /// When this task last changed status
    pub update_time: DateTime<Utc>,
    /// Accumulated stdout/stderr from the task's container, plus any
    /// system-appended failure message
    pub logs: String,
    /// True once the backing pod's logs have been harvested
    pub logs_get: bool,
}

impl Task {
    /// Build a freshly scheduled task row, not yet persisted
    pub fn new(template_uuid: Uuid, user_id: i64) -> Self {
        let now = Utc::now();
        Task {
            uuid: Uuid::new_v4(),
            template_uuid,
            user_id,
            status: TaskStatus::Scheduled,
            job_name: None,
            exit_code: None,
            create_time: now,
            update_time: now,
            logs: String::new(),
            logs_get: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_maps_to_status() {
        assert_eq!(TaskStatus::from_exit_code(0), TaskStatus::Succeeded);
        assert_eq!(TaskStatus::from_exit_code(124), TaskStatus::TimeLimitExceeded);
        assert_eq!(TaskStatus::from_exit_code(137), TaskStatus::MemoryLimitExceeded);
        assert_eq!(TaskStatus::from_exit_code(1), TaskStatus::Failed);
    }

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::TimeLimitExceeded.is_terminal());
        assert!(TaskStatus::MemoryLimitExceeded.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Deleting.is_terminal());
    }

    #[test]
    fn new_task_starts_scheduled() {
        let task = Task::new(Uuid::new_v4(), 42);
        assert_eq!(task.status, TaskStatus::Scheduled);
        assert!(task.job_name.is_none());
    }
}
