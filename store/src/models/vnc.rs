//! The VNCWorkspace model: a per-user interactive VNC deployment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A per-user VNC workspace, backed by its own Deployment, Service and
/// Ingress rather than a shared pool
///
/// Unlike a [`crate::models::Workspace`] lease these are not pooled: each
/// user gets a dedicated deployment, reaped the same way on idle expiry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VncWorkspace {
    /// The unique id for this VNC workspace
    pub uuid: Uuid,
    /// The template this workspace was provisioned from
    pub template_uuid: Uuid,
    /// The user this workspace belongs to
    pub user_id: i64,
    /// The name of the backing Deployment, Service and Ingress
    pub deployment_name: String,
    /// The path segment this user's ingress rule is mounted under
    pub ingress_path: String,
    /// When this workspace was created
    pub create_time: DateTime<Utc>,
    /// When this workspace expires without renewal
    pub expire_time: DateTime<Utc>,
}

impl VncWorkspace {
    /// Build a new VNC workspace, not yet persisted
    pub fn new(template_uuid: Uuid, user_id: i64, deployment_name: String, timeout_secs: i64) -> Self {
        let now = Utc::now();
        VncWorkspace {
            uuid: Uuid::new_v4(),
            template_uuid,
            user_id,
            ingress_path: format!("/vnc/{deployment_name}"),
            deployment_name,
            create_time: now,
            expire_time: now + chrono::Duration::seconds(timeout_secs),
        }
    }

    /// Push this workspace's expiration `timeout_secs` further into the future
    pub fn renew(&mut self, timeout_secs: i64) {
        self.expire_time = Utc::now() + chrono::Duration::seconds(timeout_secs);
    }

    /// True if this workspace's expiration has already passed
    pub fn is_expired(&self) -> bool {
        self.expire_time <= Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingress_path_derived_from_deployment_name() {
        let vnc = VncWorkspace::new(Uuid::new_v4(), 1, "vnc-abc123".into(), 300);
        assert_eq!(vnc.ingress_path, "/vnc/vnc-abc123");
    }

    #[test]
    fn expiry_behaves_like_workspace() {
        let mut vnc = VncWorkspace::new(Uuid::new_v4(), 1, "vnc-abc123".into(), -1);
        assert!(vnc.is_expired());
        vnc.renew(60);
        assert!(!vnc.is_expired());
    }
}
