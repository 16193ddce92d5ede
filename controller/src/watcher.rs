//! The Job Watcher: advances WAITING/RUNNING tasks as their Jobs progress,
//! and cleans up tasks marked DELETING
//!
//! Polls each active task's backing pod, maps its phase to a
//! [`store::models::TaskStatus`], and once it reaches a terminal phase
//! records the exit code, reclassifies TLE/MLE from the well-known exit
//! codes, and deletes the Job with foreground propagation. DELETING tasks
//! are deleted outright once their Job is gone.

use std::sync::Arc;
use store::models::{Task, TaskStatus};
use store::{Error, Store};
use tracing::{event, instrument, Level};

use crate::k8s::Orchestrator;

/// Advances tasks against their backing Jobs
pub struct JobWatcher<O: Orchestrator> {
    orchestrator: Arc<O>,
    store: Store,
    namespace: String,
}

impl<O: Orchestrator> JobWatcher<O> {
    /// Build a new watcher
    pub fn new(orchestrator: Arc<O>, store: Store, namespace: String) -> Self {
        JobWatcher { orchestrator, store, namespace }
    }

    /// Poll every WAITING/RUNNING task and advance or complete it
    #[instrument(name = "JobWatcher::poll_active", skip_all)]
    pub async fn poll_active(&self) -> Result<u32, Error> {
        let active = self.store.list_active_tasks().await?;
        let mut advanced = 0;
        for task in active {
            match task.status {
                TaskStatus::Deleting => {
                    self.cleanup_deleting(&task).await?;
                    advanced += 1;
                }
                TaskStatus::Waiting | TaskStatus::Pending | TaskStatus::Running => {
                    if self.poll_one(&task).await? {
                        advanced += 1;
                    }
                }
                _ => {}
            }
        }
        Ok(advanced)
    }

    async fn poll_one(&self, task: &Task) -> Result<bool, Error> {
        let Some(job_name) = &task.job_name else {
            return Ok(false);
        };
        let Some(outcome) = self.orchestrator.job_outcome(&self.namespace, job_name).await? else {
            return Ok(false);
        };

        if outcome.phase == "Succeeded" || outcome.phase == "Failed" {
            let status = outcome
                .exit_code
                .map(TaskStatus::from_exit_code)
                .unwrap_or(if outcome.phase == "Succeeded" {
                    TaskStatus::Succeeded
                } else {
                    TaskStatus::Failed
                });
            let mut logs = outcome.logs.clone().unwrap_or_default();
            match status {
                TaskStatus::TimeLimitExceeded => {
                    logs.push_str("\nTime limit exceeded when executing job.")
                }
                TaskStatus::MemoryLimitExceeded => {
                    logs.push_str("\nMemory limit exceeded when executing job.")
                }
                _ => {}
            }
            if let Some(exit_code) = outcome.exit_code {
                self.store.complete_task(&task.uuid, exit_code, &logs).await?;
            } else {
                self.store.set_task_status(&task.uuid, status).await?;
            }
            self.orchestrator.delete_job(&self.namespace, job_name).await?;
            event!(Level::INFO, task = %task.uuid, status = ?status, "task reached terminal state");
            return Ok(true);
        }

        // Pending with a deletion timestamp is mid-teardown, not a step
        // forward; leave the task's status alone until it resolves.
        if outcome.phase == "Pending" && outcome.terminating {
            return Ok(false);
        }

        let status = match outcome.phase.as_str() {
            "Pending" => TaskStatus::Pending,
            "Running" => TaskStatus::Running,
            _ => return Ok(false),
        };
        if status == task.status {
            return Ok(false);
        }
        self.store.set_task_status(&task.uuid, status).await?;
        event!(Level::INFO, task = %task.uuid, status = ?status, "task advanced");
        Ok(true)
    }

    async fn cleanup_deleting(&self, task: &Task) -> Result<(), Error> {
        if let Some(job_name) = &task.job_name {
            self.orchestrator.delete_job(&self.namespace, job_name).await?;
        }
        self.store.delete_task_if_deleting(&task.uuid).await?;
        event!(Level::INFO, task = %task.uuid, "deleted task");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::fake::FakeOrchestrator;

    #[test]
    fn exit_code_overrides_phase_classification() {
        assert_eq!(TaskStatus::from_exit_code(124), TaskStatus::TimeLimitExceeded);
        assert_eq!(TaskStatus::from_exit_code(137), TaskStatus::MemoryLimitExceeded);
    }

    #[tokio::test]
    async fn finished_job_is_deleted_after_polling() {
        let fake = Arc::new(FakeOrchestrator::new());
        fake.finish_job("task-exec-abc", 0);
        let outcome = fake.job_outcome("ns", "task-exec-abc").await.unwrap();
        assert!(outcome.is_some());
        fake.delete_job("ns", "task-exec-abc").await.unwrap();
    }

    #[tokio::test]
    async fn job_outcome_reports_pending_then_running_before_terminal() {
        let fake = Arc::new(FakeOrchestrator::new());
        fake.set_job_phase("task-exec-abc", "Pending");
        let pending = fake.job_outcome("ns", "task-exec-abc").await.unwrap().unwrap();
        assert_eq!(pending.phase, "Pending");
        assert!(pending.exit_code.is_none());

        fake.set_job_phase("task-exec-abc", "Running");
        let running = fake.job_outcome("ns", "task-exec-abc").await.unwrap().unwrap();
        assert_eq!(running.phase, "Running");

        fake.finish_job("task-exec-abc", 0);
        let done = fake.job_outcome("ns", "task-exec-abc").await.unwrap().unwrap();
        assert_eq!(done.phase, "Succeeded");
        assert_eq!(done.exit_code, Some(0));
    }
}
