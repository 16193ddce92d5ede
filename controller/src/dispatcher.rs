//! The Job Dispatcher: turns SCHEDULED tasks into Kubernetes Jobs
//!
//! Claims every scheduled task oldest first, assembles a `mkdir`/`cp`/
//! `chmod`/`timeout` command chain, and dispatches a Job with the
//! template's `time_limit` baked into the in-container `timeout` call and
//! the controller-wide `global_task_time_limit` as the Job's hard
//! `active_deadline_seconds` ceiling.

use std::sync::Arc;
use store::models::{Task, TaskTemplate, UserRef};
use store::{Error, Store};
use tracing::{event, instrument, Level};

use crate::k8s::{JobSpec, Orchestrator};

/// Assemble the in-container command line as a list of shell fragments
/// before joining them with `;`
fn command_line(conf: &store::models::ContainerConfig, time_limit: u64, userspace_root: &str) -> String {
    let mut commands = vec![
        format!("mkdir -p {}", conf.working_path),
        format!("cp -r {}/* {}", userspace_root, conf.working_path),
        format!(
            "cp -r {}/{}/* {}",
            conf.persistent_volume.mount_path, conf.task_script_path, conf.working_path
        ),
        format!("chmod -R +x {}", conf.working_path),
        format!("cd {}", conf.working_path),
    ];
    let body = conf.commands.join(";");
    commands.push(format!(
        "timeout --signal TERM {time_limit} {} -c '{body}'",
        conf.shell
    ));
    commands.join(";")
}

/// Dispatches SCHEDULED tasks as Jobs
pub struct JobDispatcher<O: Orchestrator> {
    orchestrator: Arc<O>,
    store: Store,
    namespace: String,
    userspace_pvc: String,
    storage_class: String,
    global_task_time_limit: u64,
}

impl<O: Orchestrator> JobDispatcher<O> {
    /// Build a new dispatcher
    pub fn new(
        orchestrator: Arc<O>,
        store: Store,
        namespace: String,
        userspace_pvc: String,
        storage_class: String,
        global_task_time_limit: u64,
    ) -> Self {
        JobDispatcher { orchestrator, store, namespace, userspace_pvc, storage_class, global_task_time_limit }
    }

    /// Claim and dispatch every SCHEDULED task, oldest first
    ///
    /// Returns the number of tasks dispatched this pass.
    #[instrument(name = "JobDispatcher::dispatch_pending", skip_all)]
    pub async fn dispatch_pending(&self) -> Result<u32, Error> {
        let scheduled = self.store.list_scheduled_tasks().await?;
        let mut dispatched = 0;
        for task in scheduled {
            match self.dispatch_one(&task).await {
                Ok(true) => dispatched += 1,
                Ok(false) => {}
                Err(err) => {
                    event!(Level::WARN, task = %task.uuid, error = %err, "failed to dispatch task");
                    self.store.set_task_status(&task.uuid, store::models::TaskStatus::Failed).await?;
                }
            }
        }
        Ok(dispatched)
    }

    /// Dispatch a single task, returning whether a Job was actually created
    ///
    /// `Ok(false)` means the task was already moved to FAILED with a specific
    /// message (invalid config, unreadable user space storage) and the
    /// caller's generic failure handling should not run again.
    async fn dispatch_one(&self, task: &Task) -> Result<bool, Error> {
        let template: TaskTemplate = self.store.get_template(&task.template_uuid).await?;
        let conf = match template.config() {
            Ok(conf) => conf,
            Err(_) => {
                let message = format!("Invalid config for TaskSettings: {}", template.uuid);
                self.store.fail_task(&task.uuid, &message).await?;
                return Ok(false);
            }
        };
        let user: UserRef = self.store.get_user(task.user_id).await?;

        self.orchestrator.ensure_namespace(&self.namespace).await?;
        self.orchestrator
            .ensure_userspace_pvc(&self.namespace, &self.userspace_pvc, &self.storage_class)
            .await?;
        if !self.orchestrator.userspace_pvc_ready(&self.namespace, &self.userspace_pvc).await {
            self.store.fail_task(&task.uuid, "Failed to get user space storage").await?;
            return Ok(false);
        }

        let job_name = format!("task-exec-{}", task.uuid);
        let userspace_root = "/cloud_scheduler_userspace/".to_string();
        let userspace_sub_path = format!("user_{}_task_{}", task.user_id, template.uuid);

        let spec = JobSpec {
            job_name: job_name.clone(),
            image: conf.image.clone(),
            shell: conf.shell.clone(),
            command_line: command_line(&conf, template.time_limit, &userspace_root),
            memory_limit: conf.memory_limit.clone(),
            shared_pvc: conf.persistent_volume.name.clone(),
            shared_mount_path: conf.persistent_volume.mount_path.clone(),
            userspace_pvc: self.userspace_pvc.clone(),
            userspace_sub_path,
            active_deadline_seconds: self.global_task_time_limit as i64,
            username: user.username.clone(),
            user_uuid: user.uuid.to_string(),
        };

        self.orchestrator.create_job(&self.namespace, &spec).await?;
        self.store.set_task_dispatched(&task.uuid, &job_name).await?;
        event!(Level::INFO, task = %task.uuid, job = job_name.as_str(), "dispatched task");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf() -> store::models::ContainerConfig {
        store::models::ContainerConfig {
            image: "img".into(),
            shell: "/bin/bash".into(),
            memory_limit: None,
            commands: vec!["echo hi".into(), "echo bye".into()],
            working_path: "/work".into(),
            task_script_path: "script".into(),
            task_initial_file_path: "seed".into(),
            persistent_volume: store::models::PersistentVolumeConfig {
                name: "shared-pvc".into(),
                mount_path: "/mnt/shared".into(),
            },
        }
    }

    #[test]
    fn command_line_chains_setup_then_timeout() {
        let line = command_line(&conf(), 30, "/cloud_scheduler_userspace/");
        assert!(line.contains("mkdir -p /work"));
        assert!(line.contains("timeout --signal TERM 30 /bin/bash -c 'echo hi;echo bye'"));
        assert!(line.starts_with("mkdir -p /work;cp -r /cloud_scheduler_userspace/"));
    }
}
