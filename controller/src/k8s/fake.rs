//! An in-memory [`Orchestrator`] for exercising reconciliation logic without
//! a live cluster
//!
//! A `Mutex`-guarded pretend cluster that the real subsystems drive exactly
//! the way they'd drive `K8sOrchestrator`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use store::Error;

use super::{JobOutcome, JobSpec, Orchestrator, PoolPod, VncSpec};

/// A pretend VNC workspace recorded by [`FakeOrchestrator`]
#[derive(Debug, Clone)]
pub struct FakeVncWorkspace {
    /// The ingress path this workspace was provisioned under
    pub ingress_path: String,
    /// Whether the workspace has been deleted
    pub deleted: bool,
}

/// A pretend dispatched Job recorded by [`FakeOrchestrator`]
#[derive(Debug, Clone)]
pub struct FakeJob {
    /// The outcome this job will report once told to finish
    pub outcome: Option<JobOutcome>,
    /// Whether the job has been deleted
    pub deleted: bool,
}

/// An in-memory stand-in for a Kubernetes cluster
#[derive(Default)]
pub struct FakeOrchestrator {
    pods: Mutex<HashMap<String, PoolPod>>,
    jobs: Mutex<HashMap<String, FakeJob>>,
    vnc: Mutex<HashMap<String, FakeVncWorkspace>>,
    exec_log: Mutex<Vec<(String, Vec<String>)>>,
    userspace_pvc_unready: Mutex<bool>,
}

impl FakeOrchestrator {
    /// Build an empty pretend cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a pretend pod as having reached `Running`
    pub fn set_pod_running(&self, name: &str) {
        if let Some(pod) = self.pods.lock().unwrap().get_mut(name) {
            pod.phase = Some("Running".to_string());
        }
    }

    /// Report a pretend job's pod as sitting at a non-terminal phase, as if
    /// it had just been scheduled or started running
    pub fn set_job_phase(&self, job_name: &str, phase: &str) {
        self.jobs.lock().unwrap().insert(
            job_name.to_string(),
            FakeJob {
                outcome: Some(JobOutcome {
                    phase: phase.to_string(),
                    terminating: false,
                    exit_code: None,
                    logs: None,
                }),
                deleted: false,
            },
        );
    }

    /// Resolve a pretend job with a given exit code, as if its pod finished
    pub fn finish_job(&self, job_name: &str, exit_code: i32) {
        let phase = if exit_code == 0 { "Succeeded" } else { "Failed" };
        self.jobs.lock().unwrap().insert(
            job_name.to_string(),
            FakeJob {
                outcome: Some(JobOutcome {
                    phase: phase.to_string(),
                    terminating: false,
                    exit_code: Some(exit_code),
                    logs: Some(String::new()),
                }),
                deleted: false,
            },
        );
    }

    /// The provisioning commands that have been exec'd so far, in order
    pub fn exec_log(&self) -> Vec<(String, Vec<String>)> {
        self.exec_log.lock().unwrap().clone()
    }

    /// Make the pretend userspace PVC report as unready, simulating storage
    /// that has not finished provisioning
    pub fn set_userspace_pvc_unready(&self) {
        *self.userspace_pvc_unready.lock().unwrap() = true;
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn list_pool_pods(&self, _namespace: &str, template_uuid: &str) -> Result<Vec<PoolPod>, Error> {
        Ok(self
            .pods
            .lock()
            .unwrap()
            .values()
            .filter(|pod| pod.template_uuid == template_uuid)
            .cloned()
            .collect())
    }

    async fn create_pool_pod(&self, _namespace: &str, pod: &PoolPod) -> Result<(), Error> {
        let mut pod = pod.clone();
        pod.phase = Some("Pending".to_string());
        self.pods.lock().unwrap().insert(pod.name.clone(), pod);
        Ok(())
    }

    async fn delete_pool_pod(&self, _namespace: &str, name: &str) -> Result<(), Error> {
        self.pods.lock().unwrap().remove(name);
        Ok(())
    }

    async fn set_pod_occupied(&self, _namespace: &str, name: &str, occupied: u32) -> Result<(), Error> {
        let mut pods = self.pods.lock().unwrap();
        let pod = pods
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("pod {name} not found")))?;
        pod.occupied = occupied;
        Ok(())
    }

    async fn exec_provision(&self, _namespace: &str, pod_name: &str, command: &[String]) -> Result<(), Error> {
        self.exec_log
            .lock()
            .unwrap()
            .push((pod_name.to_string(), command.to_vec()));
        Ok(())
    }

    async fn create_job(&self, _namespace: &str, spec: &JobSpec) -> Result<(), Error> {
        self.jobs.lock().unwrap().insert(
            spec.job_name.clone(),
            FakeJob { outcome: None, deleted: false },
        );
        Ok(())
    }

    async fn delete_job(&self, _namespace: &str, job_name: &str) -> Result<(), Error> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(job_name) {
            job.deleted = true;
        }
        Ok(())
    }

    async fn job_outcome(&self, _namespace: &str, job_name: &str) -> Result<Option<JobOutcome>, Error> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .get(job_name)
            .and_then(|job| job.outcome.clone()))
    }

    async fn create_vnc_workspace(&self, _namespace: &str, spec: &VncSpec) -> Result<(), Error> {
        self.vnc.lock().unwrap().insert(
            spec.deployment_name.clone(),
            FakeVncWorkspace {
                ingress_path: spec.ingress_path.clone(),
                deleted: false,
            },
        );
        Ok(())
    }

    async fn delete_vnc_workspace(&self, _namespace: &str, deployment_name: &str) -> Result<(), Error> {
        if let Some(vnc) = self.vnc.lock().unwrap().get_mut(deployment_name) {
            vnc.deleted = true;
        }
        Ok(())
    }

    async fn ensure_namespace(&self, _namespace: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn ensure_userspace_pvc(&self, _namespace: &str, _name: &str, _storage_class: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn userspace_pvc_ready(&self, _namespace: &str, _name: &str) -> bool {
        !*self.userspace_pvc_unready.lock().unwrap()
    }
}
