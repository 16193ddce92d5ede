//! Per-user VNC workspace provisioning: Deployment, Service and Ingress
//!
//! Earlier deployments of this system targeted the long-removed
//! `extensions/v1beta1` Ingress API; this expresses the same rules (single
//! host, path-per-user, long-lived proxy timeouts for the VNC websocket)
//! against `networking.k8s.io/v1`, the only Ingress API version this
//! `k8s-openapi` feature set vendors.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Service,
    ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend,
    IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams, PostParams};
use std::collections::BTreeMap;
use store::Error;

/// The proxy timeout, in seconds, applied to the VNC ingress path
///
/// VNC sessions hold a long-lived websocket open; nginx's default proxy
/// timeouts would tear it down mid-session.
const VNC_PROXY_TIMEOUT_SECONDS: &str = "86400";

/// Everything needed to stand up (or find) a user's VNC workspace
pub struct VncSpec {
    /// The name to give the Deployment (also used to derive the Service name)
    pub deployment_name: String,
    /// The label selector value tying the Deployment, Service and pods together
    pub selector: String,
    /// The path segment this user's ingress rule is mounted under
    pub ingress_path: String,
    /// The headless VNC image to run
    pub image: String,
    /// The VNC server port inside the pod
    pub port: u16,
    /// The websocket proxy port inside the pod
    pub ws_port: u16,
    /// The ingress host all VNC workspaces share
    pub ingress_host: String,
    /// The TLS secret for the shared ingress host, if any
    pub tls_secret: Option<String>,
    /// The shared template PVC to mount read-only
    pub shared_pvc: String,
    /// The path inside the container to mount the shared PVC at
    pub shared_mount_path: String,
    /// The userspace PVC to mount
    pub userspace_pvc: String,
    /// The sub-path within the userspace PVC unique to this user+template
    pub userspace_sub_path: String,
    /// The password to set for the VNC session
    pub vnc_password: String,
    /// The command sequence provisioning the user inside the VNC container
    pub provision_commands: Vec<String>,
}

/// Create the Deployment, Service and Ingress backing a user's VNC workspace
///
/// All three creates tolerate already existing, since the VNC workspace is
/// looked up by name before provisioning runs.
pub async fn create_vnc_workspace(client: &kube::Client, namespace: &str, spec: &VncSpec) -> Result<(), Error> {
    create_deployment(client, namespace, spec).await?;
    create_service(client, namespace, spec).await?;
    create_ingress(client, namespace, spec).await?;
    Ok(())
}

async fn create_deployment(client: &kube::Client, namespace: &str, spec: &VncSpec) -> Result<(), Error> {
    let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), spec.selector.clone());

    let container = Container {
        name: "headless-vnc".to_string(),
        image: Some(spec.image.clone()),
        command: Some(vec!["/bin/bash".to_string()]),
        args: Some(vec!["-c".to_string(), spec.provision_commands.join(";")]),
        env: Some(vec![EnvVar {
            name: "VNC_PW".to_string(),
            value: Some(spec.vnc_password.clone()),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![
            VolumeMount {
                name: "shared".to_string(),
                mount_path: spec.shared_mount_path.clone(),
                read_only: Some(true),
                ..Default::default()
            },
            VolumeMount {
                name: "userspace".to_string(),
                mount_path: "/cloud_scheduler_userspace".to_string(),
                sub_path: Some(spec.userspace_sub_path.clone()),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    let deployment = Deployment {
        metadata: ObjectMeta {
            name: Some(spec.deployment_name.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
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
                                read_only: Some(false),
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

    match api.create(&PostParams::default(), &deployment).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(()),
        Err(err) => Err(Error::K8s(err.to_string())),
    }
}

async fn create_service(client: &kube::Client, namespace: &str, spec: &VncSpec) -> Result<(), Error> {
    let api: Api<Service> = Api::namespaced(client.clone(), namespace);
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), spec.selector.clone());

    let service = Service {
        metadata: ObjectMeta {
            name: Some(spec.selector.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels),
            type_: Some("ClusterIP".to_string()),
            ports: Some(vec![ServicePort {
                name: Some("websocket-port".to_string()),
                port: spec.ws_port as i32,
                target_port: Some(k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(
                    spec.port as i32,
                )),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    };

    match api.create(&PostParams::default(), &service).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(()),
        Err(err) => Err(Error::K8s(err.to_string())),
    }
}

async fn create_ingress(client: &kube::Client, namespace: &str, spec: &VncSpec) -> Result<(), Error> {
    let api: Api<Ingress> = Api::namespaced(client.clone(), namespace);
    let mut annotations = BTreeMap::new();
    annotations.insert("kubernetes.io/ingress.class".to_string(), "nginx".to_string());
    annotations.insert(
        "nginx.ingress.kubernetes.io/proxy-read-timeout".to_string(),
        VNC_PROXY_TIMEOUT_SECONDS.to_string(),
    );
    annotations.insert(
        "nginx.ingress.kubernetes.io/proxy-send-timeout".to_string(),
        VNC_PROXY_TIMEOUT_SECONDS.to_string(),
    );

    let ingress = Ingress {
        metadata: ObjectMeta {
            name: Some(spec.selector.clone()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(spec.ingress_host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(format!("/{}", spec.ingress_path)),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: spec.selector.clone(),
                                port: Some(ServiceBackendPort {
                                    number: Some(spec.ws_port as i32),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            tls: spec.tls_secret.as_ref().map(|secret| {
                vec![IngressTLS {
                    hosts: Some(vec![spec.ingress_host.clone()]),
                    secret_name: Some(secret.clone()),
                }]
            }),
            ..Default::default()
        }),
        status: None,
    };

    match api.create(&PostParams::default(), &ingress).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 409 => {
            api.patch(
                &spec.selector,
                &PatchParams::default(),
                &Patch::Merge(&ingress),
            )
            .await
            .map_err(|err| Error::K8s(err.to_string()))?;
            Ok(())
        }
        Err(err) => Err(Error::K8s(err.to_string())),
    }
}

/// Tear down a VNC workspace's Deployment, Service and Ingress
///
/// The Service and Ingress are keyed off the same `selector` name the
/// original derives from `task-{uuid}-user-{id}-vnc`; this uses
/// `deployment_name` to look the Deployment up directly and relies on the
/// caller also knowing the selector to clean up the rest.
pub async fn delete_vnc_workspace(client: &kube::Client, namespace: &str, deployment_name: &str) -> Result<(), Error> {
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    match deployments.delete(deployment_name, &DeleteParams::default()).await {
        Ok(_) => {}
        Err(kube::Error::Api(resp)) if resp.code == 404 => {}
        Err(err) => return Err(Error::K8s(err.to_string())),
    }
    Ok(())
}
