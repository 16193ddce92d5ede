//! Kubernetes wrappers for the task execution controller
//!
//! Each subsystem talks to the cluster through the [`Orchestrator`] trait
//! rather than `kube` directly. This keeps the reconciliation logic in
//! [`crate::pool`], [`crate::lease`], [`crate::reaper`], [`crate::dispatcher`]
//! and [`crate::watcher`] testable against [`fake::FakeOrchestrator`] without
//! a live cluster.

mod bootstrap;
pub mod fake;
mod jobs;
mod pods;
mod vnc;

use async_trait::async_trait;
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::convert::TryFrom;
use store::Error;

pub use jobs::{JobOutcome, JobSpec};
pub use pods::PoolPod;
pub use vnc::VncSpec;

/// The orchestrator operations every task execution controller subsystem
/// needs, regardless of whether they run against a live cluster or a fake
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// List the pool pods currently running for a template
    async fn list_pool_pods(&self, namespace: &str, template_uuid: &str) -> Result<Vec<PoolPod>, Error>;

    /// Create a new warm pool pod for a template
    async fn create_pool_pod(&self, namespace: &str, pod: &PoolPod) -> Result<(), Error>;

    /// Delete a pool pod by name
    async fn delete_pool_pod(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Patch a pool pod's `occupied` label to a new value
    async fn set_pod_occupied(&self, namespace: &str, name: &str, occupied: u32) -> Result<(), Error>;

    /// Run the provisioning command inside a pool pod via `exec`
    async fn exec_provision(
        &self,
        namespace: &str,
        pod_name: &str,
        command: &[String],
    ) -> Result<(), Error>;

    /// Dispatch a Job for a task
    async fn create_job(&self, namespace: &str, spec: &JobSpec) -> Result<(), Error>;

    /// Delete a Job and its pods (foreground propagation)
    async fn delete_job(&self, namespace: &str, job_name: &str) -> Result<(), Error>;

    /// Poll a dispatched Job's outcome, if it has reached a terminal state
    async fn job_outcome(&self, namespace: &str, job_name: &str) -> Result<Option<JobOutcome>, Error>;

    /// Provision a per-user VNC deployment, service and ingress rule
    async fn create_vnc_workspace(&self, namespace: &str, spec: &VncSpec) -> Result<(), Error>;

    /// Tear down a per-user VNC deployment, service and ingress rule
    async fn delete_vnc_workspace(&self, namespace: &str, deployment_name: &str) -> Result<(), Error>;

    /// Create the controller's namespace if it does not already exist
    async fn ensure_namespace(&self, namespace: &str) -> Result<(), Error>;

    /// Create the shared userspace PVC if it does not already exist
    async fn ensure_userspace_pvc(&self, namespace: &str, name: &str, storage_class: &str) -> Result<(), Error>;

    /// Check whether the shared userspace PVC exists and is reachable
    async fn userspace_pvc_ready(&self, namespace: &str, name: &str) -> bool;
}

/// The live Kubernetes orchestrator, backed by a [`kube::Client`]
pub struct K8sOrchestrator {
    client: kube::Client,
}

impl K8sOrchestrator {
    /// Build a client from the environment, preferring a kubeconfig context
    /// when one is configured and falling back to the in-cluster service
    /// account.
    pub async fn connect(context_name: Option<&str>) -> Result<Self, Error> {
        let client = match Kubeconfig::from_env().map_err(|err| Error::K8s(err.to_string()))? {
            Some(kube_conf) => {
                let mut opts = KubeConfigOptions::default();
                opts.context = context_name.map(str::to_owned);
                let cluster_conf = kube::Config::from_custom_kubeconfig(kube_conf, &opts)
                    .await
                    .map_err(|err| Error::K8s(err.to_string()))?;
                kube::Client::try_from(cluster_conf).map_err(|err| Error::K8s(err.to_string()))?
            }
            None => kube::Client::try_default()
                .await
                .map_err(|err| Error::K8s(err.to_string()))?,
        };
        Ok(K8sOrchestrator { client })
    }

    /// Run the namespace and userspace PVC bootstrap
    pub async fn bootstrap(&self, namespace: &str, userspace_pvc: &str, storage_class: &str) -> Result<(), Error> {
        bootstrap::ensure_namespace(&self.client, namespace).await?;
        bootstrap::ensure_userspace_pvc(&self.client, namespace, userspace_pvc, storage_class).await
    }
}

#[async_trait]
impl Orchestrator for K8sOrchestrator {
    async fn list_pool_pods(&self, namespace: &str, template_uuid: &str) -> Result<Vec<PoolPod>, Error> {
        pods::list_pool_pods(&self.client, namespace, template_uuid).await
    }

    async fn create_pool_pod(&self, namespace: &str, pod: &PoolPod) -> Result<(), Error> {
        pods::create_pool_pod(&self.client, namespace, pod).await
    }

    async fn delete_pool_pod(&self, namespace: &str, name: &str) -> Result<(), Error> {
        pods::delete_pod(&self.client, namespace, name).await
    }

    async fn set_pod_occupied(&self, namespace: &str, name: &str, occupied: u32) -> Result<(), Error> {
        pods::set_pod_occupied(&self.client, namespace, name, occupied).await
    }

    async fn exec_provision(
        &self,
        namespace: &str,
        pod_name: &str,
        command: &[String],
    ) -> Result<(), Error> {
        pods::exec_provision(&self.client, namespace, pod_name, command).await
    }

    async fn create_job(&self, namespace: &str, spec: &JobSpec) -> Result<(), Error> {
        jobs::create_job(&self.client, namespace, spec).await
    }

    async fn delete_job(&self, namespace: &str, job_name: &str) -> Result<(), Error> {
        jobs::delete_job(&self.client, namespace, job_name).await
    }

    async fn job_outcome(&self, namespace: &str, job_name: &str) -> Result<Option<JobOutcome>, Error> {
        jobs::job_outcome(&self.client, namespace, job_name).await
    }

    async fn create_vnc_workspace(&self, namespace: &str, spec: &VncSpec) -> Result<(), Error> {
        vnc::create_vnc_workspace(&self.client, namespace, spec).await
    }

    async fn delete_vnc_workspace(&self, namespace: &str, deployment_name: &str) -> Result<(), Error> {
        vnc::delete_vnc_workspace(&self.client, namespace, deployment_name).await
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<(), Error> {
        bootstrap::ensure_namespace(&self.client, namespace).await
    }

    async fn ensure_userspace_pvc(&self, namespace: &str, name: &str, storage_class: &str) -> Result<(), Error> {
        bootstrap::ensure_userspace_pvc(&self.client, namespace, name, storage_class).await
    }

    async fn userspace_pvc_ready(&self, namespace: &str, name: &str) -> bool {
        bootstrap::userspace_pvc_ready(&self.client, namespace, name).await
    }
}
