//! The TaskTemplate model: a reusable task definition keyed by uuid

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// The persistent volume mount a template's containers share
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PersistentVolumeConfig {
    /// The name of the PVC to mount
    pub name: String,
    /// The path to mount this PVC at
    pub mount_path: String,
}

/// The parsed, validated contents of a [`TaskTemplate`]'s `container_config`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContainerConfig {
    /// The image to run pool pods and job containers with
    pub image: String,
    /// The shell to invoke user commands with
    pub shell: String,
    /// An optional memory limit (e.g. `"2Gi"`) applied to job containers
    #[serde(default)]
    pub memory_limit: Option<String>,
    /// The ordered shell fragments to execute for a job
    pub commands: Vec<String>,
    /// The working directory a job assembles its execution environment in
    pub working_path: String,
    /// The path, relative to the template PVC mount, holding the task's script
    pub task_script_path: String,
    /// The path, relative to the template PVC mount, holding a user's seed files
    pub task_initial_file_path: String,
    /// The shared persistent volume this template's pods mount read-only
    pub persistent_volume: PersistentVolumeConfig,
}

impl ContainerConfig {
    /// Parse and validate a template's raw `container_config` JSON
    ///
    /// A config is valid iff it parses and contains all required keys with
    /// the correct shapes (spec.md §3).
    pub fn parse(raw: &serde_json::Value) -> Result<Self, Error> {
        let config: ContainerConfig = serde_json::from_value(raw.clone())
            .map_err(|err| Error::InvalidConfig(err.to_string()))?;
        if config.image.is_empty() || config.shell.is_empty() {
            return Err(Error::InvalidConfig(
                "image and shell must not be empty".into(),
            ));
        }
        Ok(config)
    }
}

/// A reusable task definition, immutable from the controller's perspective
/// except for being deleted externally
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskTemplate {
    /// The unique id for this template
    pub uuid: Uuid,
    /// The raw container config, stored as opaque JSON until validated
    pub container_config: serde_json::Value,
    /// The minimum number of base pods to keep warm
    pub replica: u32,
    /// The maximum number of concurrent leases a single pod may carry
    pub max_sharing_users: u32,
    /// How often, in seconds, the Pool Reconciler re-evaluates this template
    pub ttl_interval: u64,
    /// The wall-clock limit, in seconds, applied to jobs dispatched against
    /// this template
    pub time_limit: u64,
}

impl TaskTemplate {
    /// Parse and validate this template's container config
    pub fn config(&self) -> Result<ContainerConfig, Error> {
        ContainerConfig::parse(&self.container_config)
    }

    /// The k8s label selector value identifying this template's pool
    pub fn pool_label(&self) -> String {
        self.uuid.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> serde_json::Value {
        serde_json::json!({
            "image": "webshell:latest",
            "shell": "/bin/bash",
            "memory_limit": null,
            "commands": ["echo hi"],
            "working_path": "/work",
            "task_script_path": "script",
            "task_initial_file_path": "seed",
            "persistent_volume": { "name": "template-pvc", "mount_path": "/mnt/template" }
        })
    }

    #[test]
    fn parses_valid_config() {
        let config = ContainerConfig::parse(&valid_config()).unwrap();
        assert_eq!(config.image, "webshell:latest");
        assert_eq!(config.persistent_volume.mount_path, "/mnt/template");
    }

    #[test]
    fn rejects_missing_key() {
        let mut raw = valid_config();
        raw.as_object_mut().unwrap().remove("task_script_path");
        assert!(ContainerConfig::parse(&raw).is_err());
    }

    #[test]
    fn rejects_wrong_shape() {
        let mut raw = valid_config();
        raw["commands"] = serde_json::json!("not-a-list");
        assert!(ContainerConfig::parse(&raw).is_err());
    }
}
