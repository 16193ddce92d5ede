//! Pool pod operations
//!
//! List pods by label selector, classify by phase, patch labels with an
//! `Api::patch` merge patch. Provisioning commands run through `kube`'s pod
//! exec support, needed here to run the user-account setup sequence inside
//! an already-running pool pod.

use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use kube::api::{Api, AttachParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams};
use std::collections::BTreeMap;
use store::Error;
use tokio::io::AsyncReadExt;

/// A warm pool pod belonging to a template
#[derive(Debug, Clone, PartialEq)]
pub struct PoolPod {
    /// The pod's name
    pub name: String,
    /// The template this pod belongs to
    pub template_uuid: String,
    /// The image to run
    pub image: String,
    /// How many leases are currently occupying this pod
    pub occupied: u32,
    /// The current k8s phase, if known (absent for a pod not yet created)
    pub phase: Option<String>,
}

impl PoolPod {
    /// Build a freshly intended pool pod, not yet created in the cluster
    pub fn new(name: String, template_uuid: String, image: String) -> Self {
        PoolPod {
            name,
            template_uuid,
            image,
            occupied: 0,
            phase: None,
        }
    }

    /// True once the cluster reports this pod as ready to accept leases
    pub fn is_running(&self) -> bool {
        self.phase.as_deref() == Some("Running")
    }
}

fn pod_from_resource(pod: &Pod) -> Option<PoolPod> {
    let name = pod.metadata.name.clone()?;
    let labels = pod.metadata.labels.as_ref()?;
    let template_uuid = labels.get("task")?.clone();
    let occupied = labels
        .get("occupied")
        .and_then(|val| val.parse::<u32>().ok())
        .unwrap_or(0);
    let image = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.containers.first())
        .and_then(|container| container.image.clone())
        .unwrap_or_default();
    let phase = pod.status.as_ref().and_then(|status| status.phase.clone());
    Some(PoolPod {
        name,
        template_uuid,
        image,
        occupied,
        phase,
    })
}

/// List every pool pod labeled with a template's uuid
pub async fn list_pool_pods(
    client: &kube::Client,
    namespace: &str,
    template_uuid: &str,
) -> Result<Vec<PoolPod>, Error> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let params = ListParams::default().labels(&format!("task={template_uuid}"));
    let pods = api
        .list(&params)
        .await
        .map_err(|err| Error::K8s(err.to_string()))?;
    Ok(pods.items.iter().filter_map(pod_from_resource).collect())
}

/// Create a new pool pod, labeled so it can be found by [`list_pool_pods`]
pub async fn create_pool_pod(client: &kube::Client, namespace: &str, pod: &PoolPod) -> Result<(), Error> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let mut labels = BTreeMap::new();
    labels.insert("task".to_string(), pod.template_uuid.clone());
    labels.insert("occupied".to_string(), "0".to_string());
    let resource = Pod {
        metadata: ObjectMeta {
            name: Some(pod.name.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "workspace".to_string(),
                image: Some(pod.image.clone()),
                command: Some(vec!["/bin/sh".to_string(), "-c".to_string(), "sleep infinity".to_string()]),
                ..Default::default()
            }],
            restart_policy: Some("Always".to_string()),
            ..Default::default()
        }),
        status: None,
    };
    match api.create(&PostParams::default(), &resource).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(()),
        Err(err) => Err(Error::K8s(err.to_string())),
    }
}

/// Delete a pod by name, tolerating it already being gone
pub async fn delete_pod(client: &kube::Client, namespace: &str, name: &str) -> Result<(), Error> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    match api.delete(name, &Default::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
        Err(err) => Err(Error::K8s(err.to_string())),
    }
}

/// Patch a pool pod's `occupied` label to a new count
///
/// A targeted label merge patch avoids racing on unrelated fields. Two
/// concurrent patches can still race on `occupied` itself and silently
/// overwrite one another; that lost-update window is accepted, since the
/// reaper's decrements and pool expansion restore correctness over time.
pub async fn set_pod_occupied(
    client: &kube::Client,
    namespace: &str,
    name: &str,
    occupied: u32,
) -> Result<(), Error> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({
        "metadata": { "labels": { "occupied": occupied.to_string() } }
    });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(|err| Error::K8s(err.to_string()))?;
    Ok(())
}

/// Run a provisioning command inside a pool pod over the exec channel
pub async fn exec_provision(
    client: &kube::Client,
    namespace: &str,
    pod_name: &str,
    command: &[String],
) -> Result<(), Error> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let attach = AttachParams::default().stderr(true).stdout(true).stdin(false);
    let mut process = api
        .exec(pod_name, command, &attach)
        .await
        .map_err(|err| Error::K8s(err.to_string()))?;
    let mut output = String::new();
    if let Some(mut stdout) = process.stdout() {
        let _ = stdout.read_to_string(&mut output).await;
    }
    let status = process
        .take_status()
        .ok_or_else(|| Error::K8s("exec stream closed without a status".into()))?;
    if let Some(status) = status.await {
        if status.status.as_deref() == Some("Failure") {
            return Err(Error::K8s(format!(
                "provisioning command in {pod_name} failed: {}",
                status.message.unwrap_or_default()
            )));
        }
    }
    let _ = process.join().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PodSpec, PodStatus};

    fn pod(name: &str, template: &str, occupied: &str, phase: &str) -> Pod {
        let mut labels = BTreeMap::new();
        labels.insert("task".to_string(), template.to_string());
        labels.insert("occupied".to_string(), occupied.to_string());
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "workspace".to_string(),
                    image: Some("webshell:latest".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn parses_labels_into_pool_pod() {
        let resource = pod("pool-a", "tmpl-1", "2", "Running");
        let parsed = pod_from_resource(&resource).unwrap();
        assert_eq!(parsed.template_uuid, "tmpl-1");
        assert_eq!(parsed.occupied, 2);
        assert!(parsed.is_running());
    }

    #[test]
    fn missing_task_label_is_ignored() {
        let mut resource = pod("pool-a", "tmpl-1", "0", "Running");
        resource.metadata.labels.as_mut().unwrap().remove("task");
        assert!(pod_from_resource(&resource).is_none());
    }
}
