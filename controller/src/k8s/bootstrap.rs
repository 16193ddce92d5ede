//! One-time cluster bootstrap: the shared namespace and userspace PVC
//!
//! Ensures the namespace and the global userspace PVC exist. The controller
//! runs this once at startup rather than before every dispatch, since none
//! of these resources are ever expected to disappear once created.

use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ObjectMeta, PostParams};
use std::collections::BTreeMap;
use store::Error;

/// Create the controller's namespace if it does not already exist
pub async fn ensure_namespace(client: &kube::Client, namespace: &str) -> Result<(), Error> {
    let api: Api<Namespace> = Api::all(client.clone());
    let mut labels = BTreeMap::new();
    labels.insert("name".to_string(), namespace.to_string());
    let resource = Namespace {
        metadata: ObjectMeta {
            name: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: None,
        status: None,
    };
    match api.create(&PostParams::default(), &resource).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(()),
        Err(err) => Err(Error::K8s(err.to_string())),
    }
}

/// Create the shared userspace PVC if it does not already exist
pub async fn ensure_userspace_pvc(
    client: &kube::Client,
    namespace: &str,
    name: &str,
    storage_class: &str,
) -> Result<(), Error> {
    let api: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), namespace);
    let mut requests = BTreeMap::new();
    requests.insert("storage".to_string(), Quantity("1024Gi".to_string()));
    let resource = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteMany".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            storage_class_name: Some(storage_class.to_string()),
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

/// Check whether the shared userspace PVC exists and is reachable
pub async fn userspace_pvc_ready(client: &kube::Client, namespace: &str, name: &str) -> bool {
    let api: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), namespace);
    api.get(name).await.is_ok()
}
