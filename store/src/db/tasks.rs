//! CRUD for [`Task`] rows

use chrono::Utc;
use uuid::Uuid;

use super::Store;
use crate::error::Error;
use crate::models::{Task, TaskStatus};

impl Store {
    /// Insert a freshly scheduled task
    pub async fn insert_task(&self, task: &Task) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO tasks
                    (uuid, template_uuid, user_id, status, job_name, exit_code, create_time, update_time, logs, logs_get)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                &[
                    &task.uuid,
                    &task.template_uuid,
                    &task.user_id,
                    &task.status,
                    &task.job_name,
                    &task.exit_code,
                    &task.create_time,
                    &task.update_time,
                    &task.logs,
                    &task.logs_get,
                ],
            )
            .await?;
        Ok(())
    }

    /// Fetch a single task by uuid
    pub async fn get_task(&self, uuid: &Uuid) -> Result<Task, Error> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT * FROM tasks WHERE uuid = $1", &[uuid])
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {uuid} not found")))?;
        Ok(task_from_row(&row))
    }

    /// List every task still in a non-terminal state, ordered oldest first
    ///
    /// Backs the Job Dispatcher and Job Watcher: both drive off the
    /// scheduled/waiting/running/deleting frontier rather than the full
    /// history of completed tasks.
    pub async fn list_active_tasks(&self) -> Result<Vec<Task>, Error> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT * FROM tasks
                 WHERE status IN ('scheduled', 'waiting', 'pending', 'running', 'deleting')
                 ORDER BY create_time ASC",
                &[],
            )
            .await?;
        Ok(rows.iter().map(task_from_row).collect())
    }

    /// List every task currently SCHEDULED, ordered oldest first
    ///
    /// Backs the Job Dispatcher's intake: it only ever claims work from this
    /// set.
    pub async fn list_scheduled_tasks(&self) -> Result<Vec<Task>, Error> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT * FROM tasks WHERE status = 'scheduled' ORDER BY create_time ASC",
                &[],
            )
            .await?;
        Ok(rows.iter().map(task_from_row).collect())
    }

    /// Update a task's status, touching `update_time`
    pub async fn set_task_status(&self, uuid: &Uuid, status: TaskStatus) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE tasks SET status = $2, update_time = $3 WHERE uuid = $1",
                &[uuid, &status, &Utc::now()],
            )
            .await?;
        Ok(())
    }

    /// Record the Job name a task was dispatched under, moving it to WAITING
    pub async fn set_task_dispatched(&self, uuid: &Uuid, job_name: &str) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE tasks SET status = 'waiting', job_name = $2, update_time = $3 WHERE uuid = $1",
                &[uuid, &job_name, &Utc::now()],
            )
            .await?;
        Ok(())
    }

    /// Delete a task row, but only if it is currently DELETING
    ///
    /// Guards against a race where a task finished naturally between being
    /// listed and the watcher processing its deletion.
    pub async fn delete_task_if_deleting(&self, uuid: &Uuid) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .execute(
                "DELETE FROM tasks WHERE uuid = $1 AND status = 'deleting'",
                &[uuid],
            )
            .await?;
        Ok(())
    }

    /// Request deletion of a task, moving it to DELETING regardless of its
    /// current state
    pub async fn request_task_deletion(&self, uuid: &Uuid) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE tasks SET status = 'deleting', update_time = $2 WHERE uuid = $1",
                &[uuid, &Utc::now()],
            )
            .await?;
        Ok(())
    }

    /// Record a task's terminal outcome from its container exit code,
    /// persisting the harvested pod logs alongside it
    pub async fn complete_task(&self, uuid: &Uuid, exit_code: i32, logs: &str) -> Result<(), Error> {
        let status = TaskStatus::from_exit_code(exit_code);
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE tasks SET status = $2, exit_code = $3, update_time = $4, logs = $5, logs_get = true WHERE uuid = $1",
                &[uuid, &status, &exit_code, &Utc::now(), &logs],
            )
            .await?;
        Ok(())
    }

    /// Fail a task outright with a human-readable message, for dispatch-time
    /// failures that never reach a backing pod (invalid config, unreadable
    /// user space storage)
    pub async fn fail_task(&self, uuid: &Uuid, message: &str) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE tasks SET status = 'failed', update_time = $2, logs = $3, logs_get = true WHERE uuid = $1",
                &[uuid, &Utc::now(), &message],
            )
            .await?;
        Ok(())
    }
}

fn task_from_row(row: &tokio_postgres::Row) -> Task {
    Task {
        uuid: row.get("uuid"),
        template_uuid: row.get("template_uuid"),
        user_id: row.get("user_id"),
        status: row.get("status"),
        job_name: row.get("job_name"),
        exit_code: row.get("exit_code"),
        create_time: row.get("create_time"),
        update_time: row.get("update_time"),
        logs: row.get("logs"),
        logs_get: row.get("logs_get"),
    }
}
