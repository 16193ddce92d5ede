//! The shared config for the task execution controller

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Error;

/// Helps serde default a value to `true`
fn default_true() -> bool {
    true
}

/// Connection settings for the relational store
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Database {
    /// The host to connect to
    pub host: String,
    /// The port to connect to
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// The user to authenticate as
    pub user: String,
    /// The password to authenticate with
    pub password: String,
    /// The database name to connect to
    pub dbname: String,
    /// The max number of pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_db_port() -> u16 {
    5432
}

fn default_pool_size() -> usize {
    16
}

/// The settings for the Kubernetes VNC workspace deployments
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Vnc {
    /// The image to use for headless VNC workspace deployments
    pub docker_image: String,
    /// The port the VNC server listens on inside the pod
    pub port: u16,
    /// The port the VNC websocket proxy listens on inside the pod
    pub ws_port: u16,
    /// The ingress host to expose VNC workspaces under
    pub host: String,
    /// The TLS secret to use for the VNC ingress, if any
    #[serde(default)]
    pub tls_secret: Option<String>,
}

/// The settings for the task execution controller
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Controller {
    /// The number of worker threads reconciling pools concurrently
    #[serde(default = "default_daemon_workers")]
    pub daemon_workers: usize,
    /// The Kubernetes namespace all orchestrator resources live in
    pub kubernetes_namespace: String,
    /// The storage class to use for the shared user-space PVC
    pub ceph_storage_class_name: String,
    /// The hard `active_deadline_seconds` ceiling applied to every Job
    pub global_task_time_limit: u64,
    /// How long a leased workspace pod stays leased without renewal, in seconds
    pub user_space_pod_timeout: i64,
    /// The local TCP port the IPC service listens on
    pub ipc_port: u16,
    /// The image used for pool workspace pods
    pub user_webshell_docker_image: String,
    /// The name of the shared user-space PVC
    pub userspace_name: String,
    /// VNC workspace settings
    pub vnc: Vnc,
    /// Whether to enable cluster TLS certificate validation
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

fn default_daemon_workers() -> usize {
    4
}

/// Top level config for the task execution controller
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Conf {
    /// Controller settings
    pub controller: Controller,
    /// Relational store connection settings
    pub database: Database,
}

impl Conf {
    /// Creates a new [`Conf`] object
    ///
    /// Loads from a YAML file on disk and overlays any `CONTROLLER__`
    /// prefixed environment variables on top.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to read the config file from
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let conf: Conf = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Yaml))
            .add_source(
                config::Environment::with_prefix("controller")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        Ok(conf)
    }
}
