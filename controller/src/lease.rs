//! The Lease Manager: grants and renews leases against a template's warm
//! pool pods
//!
//! Reuses an existing non-terminating, `Running` lease if one exists,
//! otherwise claims the first pod with spare capacity and provisions the
//! user inside it.

use std::sync::Arc;
use store::models::{TaskTemplate, UserRef, Workspace};
use store::{Error, Store};
use tracing::{event, instrument, Level};

use crate::k8s::Orchestrator;

/// The userspace directory a leased pod provisions for its user
fn user_dir(userspace_root: &str, user_id: i64, template_uuid: &uuid::Uuid) -> String {
    format!("{userspace_root}user_{user_id}_task_{template_uuid}")
}

/// The provisioning command run inside a pool pod the first time a user is
/// granted a lease against it
///
/// Makes the shared userspace mount traversable, creates the user's home
/// directory, adds the system user at its offset uid, and symlinks its
/// home into place.
fn provision_commands(user: &UserRef, username: &str, dir: &str) -> Vec<String> {
    vec![
        "set +e".to_string(),
        "chmod 711 /cloud_scheduler_userspace".to_string(),
        "chmod 711 /home".to_string(),
        format!("mkdir -p {dir}"),
        format!("useradd -u {} {username}", user.container_uid()),
        format!("chown {username} {dir}"),
        format!("chmod 700 {dir}"),
        format!("ln -s {dir} /home/{username}"),
        format!("chown {username} /home/{username}"),
        format!("chmod 700 /home/{username}"),
    ]
}

/// The command run to reset a leased pod's home directory back to the
/// template's seed files, either on first grant or on an explicit recreate
fn reseed_commands(conf: &store::models::ContainerConfig, username: &str, purge: bool) -> Vec<String> {
    let seed_path = format!(
        "{}/{}",
        conf.persistent_volume.mount_path, conf.task_initial_file_path
    );
    let extra = if purge {
        format!("rm -rf /home/{username}/*;")
    } else {
        String::new()
    };
    vec![format!(
        "set +e;{extra}cp -r {seed_path}/* /home/{username};chown -R {username}:{username} /home/{username}/*"
    )]
}

/// Grants and renews pool pod leases
pub struct LeaseManager<O: Orchestrator> {
    orchestrator: Arc<O>,
    store: Store,
    namespace: String,
    userspace_root: String,
    timeout_secs: i64,
}

impl<O: Orchestrator> LeaseManager<O> {
    /// Build a new lease manager
    pub fn new(orchestrator: Arc<O>, store: Store, namespace: String, userspace_root: String, timeout_secs: i64) -> Self {
        LeaseManager { orchestrator, store, namespace, userspace_root, timeout_secs }
    }

    /// Grant (or renew) a lease for `user` against `template`'s pool
    ///
    /// Returns the name of the pod backing the lease once provisioned.
    #[instrument(name = "LeaseManager::acquire", skip_all, fields(template = %template.uuid, user = user.id))]
    pub async fn acquire(
        &self,
        template: &TaskTemplate,
        user: &UserRef,
        recreate: bool,
        purge: bool,
    ) -> Result<String, Error> {
        let username = format!("{}_{}", user.username, template.uuid);
        let conf = template.config()?;

        let existing = self.store.find_workspace(&template.uuid, user.id).await?;

        if let Some(lease) = &existing {
            let pods = self.orchestrator.list_pool_pods(&self.namespace, &template.pool_label()).await?;
            if let Some(pod) = pods.iter().find(|pod| pod.name == lease.pod_name) {
                if pod.is_running() {
                    self.store.renew_workspace(&lease.uuid, self.timeout_secs).await?;
                    if recreate {
                        self.reseed(&conf, &lease.pod_name, &username, purge).await?;
                    }
                    return Ok(lease.pod_name.clone());
                }
            }
        }

        // A first lease (no prior row) or an explicit recreate both reseed;
        // any other re-lease of a recycled pod keeps the user's existing files.
        let is_first_lease = existing.is_none();

        let pods = self.orchestrator.list_pool_pods(&self.namespace, &template.pool_label()).await?;
        let available = pods
            .iter()
            .find(|pod| pod.is_running() && pod.occupied < template.max_sharing_users)
            .ok_or_else(|| Error::new(format!("no available pod for template {}", template.uuid)))?;

        let dir = user_dir(&self.userspace_root, user.id, &template.uuid);
        let commands = provision_commands(user, &username, &dir);
        self.orchestrator
            .exec_provision(&self.namespace, &available.name, &commands)
            .await?;
        if is_first_lease || recreate {
            self.reseed(&conf, &available.name, &username, purge).await?;
        }
        self.orchestrator
            .set_pod_occupied(&self.namespace, &available.name, available.occupied + 1)
            .await?;

        match existing {
            Some(lease) => {
                self.store.claim_workspace(&lease.uuid, &available.name, self.timeout_secs).await?;
            }
            None => {
                let lease = Workspace::new(template.uuid, user.id, available.name.clone(), self.timeout_secs);
                self.store.insert_workspace(&lease).await?;
            }
        }
        event!(Level::INFO, pod = available.name.as_str(), user = user.id, "granted lease");
        Ok(available.name.clone())
    }

    async fn reseed(
        &self,
        conf: &store::models::ContainerConfig,
        pod_name: &str,
        username: &str,
        purge: bool,
    ) -> Result<(), Error> {
        let commands = reseed_commands(conf, username, purge);
        self.orchestrator.exec_provision(&self.namespace, pod_name, &commands).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provision_commands_include_offset_uid() {
        let user = UserRef { id: 3, uuid: uuid::Uuid::new_v4(), username: "alice".into() };
        let commands = provision_commands(&user, "alice_tmpl", "/cloud_scheduler_userspace/user_3_task_tmpl");
        assert!(commands.iter().any(|cmd| cmd.contains("useradd -u 502 alice_tmpl")));
    }

    #[test]
    fn reseed_purges_only_when_requested() {
        let conf = store::models::ContainerConfig {
            image: "img".into(),
            shell: "/bin/bash".into(),
            memory_limit: None,
            commands: vec![],
            working_path: "/work".into(),
            task_script_path: "script".into(),
            task_initial_file_path: "seed".into(),
            persistent_volume: store::models::PersistentVolumeConfig {
                name: "pvc".into(),
                mount_path: "/mnt".into(),
            },
        };
        let without_purge = reseed_commands(&conf, "alice_tmpl", false);
        let with_purge = reseed_commands(&conf, "alice_tmpl", true);
        assert!(!without_purge[0].contains("rm -rf"));
        assert!(with_purge[0].contains("rm -rf /home/alice_tmpl/*"));
    }
}
