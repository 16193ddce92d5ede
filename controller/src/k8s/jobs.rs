//! Job dispatch and outcome polling
//!
//! Job spec construction and phase/exit-code polling, expressed with
//! `k8s-openapi`/`kube`'s typed object builders.

use k8s_openapi::api::batch::v1::{Job, JobSpec as K8sJobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PersistentVolumeClaimVolumeSource, Pod, PodSpec, PodTemplateSpec,
    ResourceRequirements, Volume, VolumeMount,
};
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, PostParams, Preconditions, PropagationPolicy};
use std::collections::BTreeMap;
use store::Error;

/// Everything needed to dispatch a single task as a Kubernetes Job
pub struct JobSpec {
    /// The name to give the Job (and the `task-exec` label value)
    pub job_name: String,
    /// The image to run the task's container with
    pub image: String,
    /// The shell used to invoke the assembled command line
    pub shell: String,
    /// The fully assembled `sh -c` command line (mkdir/cp/chmod/timeout chain)
    pub command_line: String,
    /// An optional container memory limit, e.g. `"2Gi"`
    pub memory_limit: Option<String>,
    /// The shared template PVC to mount read-only
    pub shared_pvc: String,
    /// The path inside the container to mount the shared PVC at
    pub shared_mount_path: String,
    /// The userspace PVC to mount read-only
    pub userspace_pvc: String,
    /// The sub-path within the userspace PVC unique to this user+template
    pub userspace_sub_path: String,
    /// The hard wall-clock ceiling applied to the whole Job
    pub active_deadline_seconds: i64,
    /// The username exposed to the task via environment variables
    pub username: String,
    /// The user's external uuid, exposed the same way
    pub user_uuid: String,
}

/// A dispatched Job's pod state, as observed by one watcher poll
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    /// The pod's current phase (`"Pending"`, `"Running"`, `"Succeeded"` or
    /// `"Failed"`)
    pub phase: String,
    /// True if the pod has a deletion timestamp set (mid-teardown)
    pub terminating: bool,
    /// The container's exit code, once the pod has reached a terminal phase
    pub exit_code: Option<i32>,
    /// The pod's log output, once the pod has reached a terminal phase
    pub logs: Option<String>,
}

/// Create a Job for a task, tolerating it already existing
pub async fn create_job(client: &kube::Client, namespace: &str, spec: &JobSpec) -> Result<(), Error> {
    let api: Api<Job> = Api::namespaced(client.clone(), namespace);

    let mut labels = BTreeMap::new();
    labels.insert("task-exec".to_string(), spec.job_name.clone());

    let mut container_settings = Container {
        name: "task-container".to_string(),
        image: Some(spec.image.clone()),
        command: Some(vec![spec.shell.clone()]),
        args: Some(vec!["-c".to_string(), spec.command_line.clone()]),
        volume_mounts: Some(vec![
            VolumeMount {
                name: "shared".to_string(),
                mount_path: spec.shared_mount_path.clone(),
                read_only: Some(true),
                ..Default::default()
            },
            VolumeMount {
                name: "userspace".to_string(),
                mount_path: "/cloud_scheduler_userspace/".to_string(),
                sub_path: Some(spec.userspace_sub_path.clone()),
                read_only: Some(true),
                ..Default::default()
            },
        ]),
        env: Some(vec![
            EnvVar {
                name: "CLOUD_SCHEDULER_USER".to_string(),
                value: Some(spec.username.clone()),
                ..Default::default()
            },
            EnvVar {
                name: "CLOUD_SCHEDULER_USER_UUID".to_string(),
                value: Some(spec.user_uuid.clone()),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };
    if let Some(limit) = &spec.memory_limit {
        let mut limits = BTreeMap::new();
        limits.insert("memory".to_string(), k8s_openapi::apimachinery::pkg::api::resource::Quantity(limit.clone()));
        container_settings.resources = Some(ResourceRequirements {
            limits: Some(limits),
            ..Default::default()
        });
    }

    let job = Job {
        metadata: ObjectMeta {
            name: Some(spec.job_name.clone()),
            ..Default::default()
        },
        spec: Some(K8sJobSpec {
            backoff_limit: Some(0),
            active_deadline_seconds: Some(spec.active_deadline_seconds),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    containers: vec![container_settings],
                    volumes: Some(vec![
                        Volume {
                            name: "shared".to_string(),
                            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                                claim_name: spec.shared_pvc.clone(),
                                read_only: Some(true),
                            }),
                            ..Default::default()
                        },
                        Volume {
                            name: "userspace".to_string(),
                            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                                claim_name: spec.userspace_pvc.clone(),
                                read_only: Some(true),
                            }),
                            ..Default::default()
                        },
                    ]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    };

    match api.create(&PostParams::default(), &job).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(()),
        Err(err) => Err(Error::K8s(err.to_string())),
    }
}

/// Delete a Job with foreground propagation, tolerating it already being gone
pub async fn delete_job(client: &kube::Client, namespace: &str, job_name: &str) -> Result<(), Error> {
    let api: Api<Job> = Api::namespaced(client.clone(), namespace);
    let params = DeleteParams {
        propagation_policy: Some(PropagationPolicy::Foreground),
        grace_period_seconds: Some(3),
        preconditions: None::<Preconditions>,
        dry_run: false,
    };
    match api.delete(job_name, &params).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
        Err(err) => Err(Error::K8s(err.to_string())),
    }
}

/// Poll a dispatched Job's pod for its current phase
///
/// Returns `None` if the Job's pod has not been scheduled yet (the task
/// stays `WAITING`). Otherwise reports the pod's phase every poll, terminal
/// or not, so the watcher can promote `WAITING` -> `PENDING` -> `RUNNING` as
/// well as detect completion.
pub async fn job_outcome(client: &kube::Client, namespace: &str, job_name: &str) -> Result<Option<JobOutcome>, Error> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let params = ListParams::default().labels(&format!("task-exec={job_name}"));
    let found = pods.list(&params).await.map_err(|err| Error::K8s(err.to_string()))?;
    let Some(pod) = found.items.into_iter().next() else {
        return Ok(None);
    };
    let terminating = pod.metadata.deletion_timestamp.is_some();
    let phase = pod
        .status
        .as_ref()
        .and_then(|status| status.phase.clone())
        .unwrap_or_else(|| "Pending".to_string());
    if phase != "Succeeded" && phase != "Failed" {
        return Ok(Some(JobOutcome { phase, terminating, exit_code: None, logs: None }));
    }
    let exit_code = pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref())
        .and_then(|statuses| statuses.first())
        .and_then(|status| status.state.as_ref())
        .and_then(|state| state.terminated.as_ref())
        .map(|terminated| terminated.exit_code);
    let pod_name = pod.metadata.name.clone().unwrap_or_default();
    let logs = pods.logs(&pod_name, &Default::default()).await.ok();
    Ok(Some(JobOutcome { phase, terminating, exit_code, logs }))
}
