//! The Reaper: releases leases and VNC workspaces that have gone idle past
//! their TTL
//!
//! Sweeps expired [`store::models::Workspace`] leases and
//! [`store::models::VncWorkspace`] records ordered by `expire_time`,
//! deprovisioning the user inside the pod before releasing the lease, and
//! tearing down VNC deployments outright.

use std::sync::Arc;
use store::{Error, Store};
use tracing::{event, instrument, Level};

use crate::k8s::Orchestrator;

/// Releases expired leases and VNC workspaces
pub struct Reaper<O: Orchestrator> {
    orchestrator: Arc<O>,
    store: Store,
    namespace: String,
}

impl<O: Orchestrator> Reaper<O> {
    /// Build a new reaper
    pub fn new(orchestrator: Arc<O>, store: Store, namespace: String) -> Self {
        Reaper { orchestrator, store, namespace }
    }

    /// Release every workspace lease that has passed its `expire_time`
    #[instrument(name = "Reaper::sweep_workspaces", skip_all)]
    pub async fn sweep_workspaces(&self) -> Result<u32, Error> {
        let expired = self.store.list_expired_workspaces().await?;
        let mut released = 0;
        for lease in expired {
            let pods = self
                .orchestrator
                .list_pool_pods(&self.namespace, &lease.template_uuid.to_string())
                .await?;
            if let Some(pod) = pods.iter().find(|pod| pod.name == lease.pod_name) {
                if pod.is_running() {
                    if let Ok(user) = self.store.get_user(lease.user_id).await {
                        let username = format!("{}_{}", user.username, lease.template_uuid);
                        let commands = vec![format!("unlink /home/{username};userdel {username}")];
                        self.orchestrator
                            .exec_provision(&self.namespace, &pod.name, &commands)
                            .await?;
                    }
                    let next = pod.occupied.saturating_sub(1);
                    self.orchestrator.set_pod_occupied(&self.namespace, &pod.name, next).await?;
                }
            }
            self.store.clear_workspace(&lease.uuid).await?;
            event!(Level::INFO, pod = lease.pod_name.as_str(), user = lease.user_id, "released lease");
            released += 1;
        }
        Ok(released)
    }

    /// Tear down every VNC workspace that has passed its `expire_time`
    #[instrument(name = "Reaper::sweep_vnc_workspaces", skip_all)]
    pub async fn sweep_vnc_workspaces(&self) -> Result<u32, Error> {
        let expired = self.store.list_expired_vnc_workspaces().await?;
        let mut released = 0;
        for vnc in expired {
            self.orchestrator
                .delete_vnc_workspace(&self.namespace, &vnc.deployment_name)
                .await?;
            self.store.delete_vnc_workspace(&vnc.uuid).await?;
            event!(Level::INFO, deployment = vnc.deployment_name.as_str(), user = vnc.user_id, "reaped vnc workspace");
            released += 1;
        }
        Ok(released)
    }
}
