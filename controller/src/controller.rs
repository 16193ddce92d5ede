//! The top level controller wiring together all five subsystems
//!
//! One struct owning every subsystem and a single tick loop driving them
//! all, with per-template cadence handled by
//! [`crate::schedule::TemplateSchedule`].

use chrono::Utc;
use std::sync::Arc;
use store::{Conf, Error, Store};
use tracing::{event, instrument, Level};

use crate::dispatcher::JobDispatcher;
use crate::ipc::IpcService;
use crate::k8s::{K8sOrchestrator, Orchestrator};
use crate::lease::LeaseManager;
use crate::pool::{PoolAction, PoolReconciler};
use crate::reaper::Reaper;
use crate::schedule::TemplateSchedule;
use crate::watcher::JobWatcher;

/// Owns every subsystem and drives the controller's tick loop
pub struct Controller<O: Orchestrator + 'static> {
    conf: Conf,
    store: Store,
    orchestrator: Arc<O>,
    pool: PoolReconciler<O>,
    dispatcher: JobDispatcher<O>,
    watcher: JobWatcher<O>,
    reaper: Reaper<O>,
    lease_manager: Arc<LeaseManager<O>>,
    schedule: TemplateSchedule,
}

impl Controller<K8sOrchestrator> {
    /// Build a controller backed by a live cluster and relational store
    pub async fn connect(conf: Conf, context_name: Option<&str>) -> Result<Self, Error> {
        let store = Store::connect(&conf.database).await?;
        store.migrate().await?;
        let orchestrator = Arc::new(K8sOrchestrator::connect(context_name).await?);
        orchestrator
            .bootstrap(
                &conf.controller.kubernetes_namespace,
                &conf.controller.userspace_name,
                &conf.controller.ceph_storage_class_name,
            )
            .await?;
        Ok(Self::new(conf, store, orchestrator))
    }
}

impl<O: Orchestrator + 'static> Controller<O> {
    /// Wire up every subsystem against an already connected store and
    /// orchestrator, for use in tests against [`crate::k8s::fake::FakeOrchestrator`]
    pub fn new(conf: Conf, store: Store, orchestrator: Arc<O>) -> Self {
        let namespace = conf.controller.kubernetes_namespace.clone();
        let pool = PoolReconciler::new(
            orchestrator.clone(),
            namespace.clone(),
            conf.controller.user_webshell_docker_image.clone(),
        );
        let dispatcher = JobDispatcher::new(
            orchestrator.clone(),
            store.clone(),
            namespace.clone(),
            conf.controller.userspace_name.clone(),
            conf.controller.ceph_storage_class_name.clone(),
            conf.controller.global_task_time_limit,
        );
        let watcher = JobWatcher::new(orchestrator.clone(), store.clone(), namespace.clone());
        let reaper = Reaper::new(orchestrator.clone(), store.clone(), namespace.clone());
        let lease_manager = Arc::new(LeaseManager::new(
            orchestrator.clone(),
            store.clone(),
            namespace,
            "/cloud_scheduler_userspace/".to_string(),
            conf.controller.user_space_pod_timeout,
        ));
        Controller {
            conf,
            store,
            orchestrator,
            pool,
            dispatcher,
            watcher,
            reaper,
            lease_manager,
            schedule: TemplateSchedule::new(),
        }
    }

    /// Start the IPC service on its own task, returning its join handle
    pub fn spawn_ipc(&self) -> tokio::task::JoinHandle<()> {
        let service = Arc::new(IpcService::new(self.store.clone(), self.lease_manager.clone()));
        let port = self.conf.controller.ipc_port;
        tokio::spawn(async move {
            if let Err(err) = service.serve(port).await {
                event!(Level::ERROR, error = %err, "ipc service exited");
            }
        })
    }

    /// Prime the schedule with every currently defined template
    #[instrument(name = "Controller::prime_schedule", skip_all)]
    pub async fn prime_schedule(&mut self) -> Result<(), Error> {
        let templates = self.store.list_templates().await?;
        let now = Utc::now();
        for template in templates {
            if template.config().is_ok() {
                self.schedule.schedule_at(now, template.uuid, 0);
            } else {
                event!(Level::WARN, template = %template.uuid, "template has invalid settings, skipping");
            }
        }
        Ok(())
    }

    /// Run one full tick: reconcile every due template's pool, dispatch
    /// pending jobs, poll active jobs and reap expired leases
    #[instrument(name = "Controller::tick", skip_all)]
    pub async fn tick(&mut self) -> Result<(), Error> {
        let now = Utc::now();
        for template_uuid in self.schedule.pop_due(now) {
            match self.store.get_template(&template_uuid).await {
                Ok(template) => {
                    let interval = template.ttl_interval;
                    match self.pool.reconcile(&template).await {
                        Ok(PoolAction::Abort) => {
                            self.schedule.clear(&template_uuid);
                        }
                        Ok(_) => {
                            self.schedule.schedule_at(now, template_uuid, interval);
                        }
                        Err(err) => {
                            event!(Level::WARN, template = %template_uuid, error = %err, "pool reconcile failed");
                            self.schedule.schedule_at(now, template_uuid, interval);
                        }
                    }
                }
                Err(err) if err.is_not_found() => {
                    self.schedule.clear(&template_uuid);
                }
                Err(err) => {
                    event!(Level::WARN, template = %template_uuid, error = %err, "failed to load template");
                    self.schedule.schedule_at(now, template_uuid, 30);
                }
            }
        }

        self.dispatcher.dispatch_pending().await?;
        self.watcher.poll_active().await?;
        self.reaper.sweep_workspaces().await?;
        self.reaper.sweep_vnc_workspaces().await?;
        Ok(())
    }

    /// Run the controller's tick loop forever
    pub async fn run(&mut self) -> Result<(), Error> {
        self.prime_schedule().await?;
        self.spawn_ipc();
        loop {
            self.tick().await?;
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::fake::FakeOrchestrator;
    use serde_json::json;
    use store::models::TaskTemplate;
    use uuid::Uuid;

    fn test_conf() -> Conf {
        serde_yaml::from_str(
            r#"
controller:
  kubernetes_namespace: test-ns
  ceph_storage_class_name: ceph
  global_task_time_limit: 3600
  user_space_pod_timeout: 300
  ipc_port: 9999
  user_webshell_docker_image: webshell:latest
  userspace_name: userspace-pvc
  vnc:
    docker_image: vnc:latest
    port: 5900
    ws_port: 6080
    host: vnc.example.com
database:
  host: localhost
  user: controller
  password: secret
  dbname: controller
"#,
        )
        .unwrap()
    }

    #[test]
    fn prime_schedule_skips_invalid_templates() {
        let template = TaskTemplate {
            uuid: Uuid::new_v4(),
            container_config: json!({"not": "valid"}),
            replica: 1,
            max_sharing_users: 1,
            ttl_interval: 30,
            time_limit: 60,
        };
        assert!(template.config().is_err());
    }

    #[test]
    fn config_parses_for_tick_scheduling() {
        let _ = test_conf();
    }
}
