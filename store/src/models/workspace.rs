//! The Workspace model: a leased pool pod reserved for a single user

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A lease granted against a warm pool pod for a single user's use
///
/// One lease per `(template_uuid, user_id)` pair, renewed by touching
/// `expire_time` and released either explicitly or by the Reaper once
/// `expire_time` passes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Workspace {
    /// The unique id for this lease
    pub uuid: Uuid,
    /// The template whose pool this lease was granted against
    pub template_uuid: Uuid,
    /// The user holding this lease
    pub user_id: i64,
    /// The name of the pool pod backing this lease
    pub pod_name: String,
    /// When this lease was first granted
    pub create_time: DateTime<Utc>,
    /// When this lease expires without renewal
    pub expire_time: DateTime<Utc>,
}

impl Workspace {
    /// Build a new lease, not yet persisted, expiring `timeout_secs` from now
    pub fn new(template_uuid: Uuid, user_id: i64, pod_name: String, timeout_secs: i64) -> Self {
        let now = Utc::now();
        Workspace {
            uuid: Uuid::new_v4(),
            template_uuid,
            user_id,
            pod_name,
            create_time: now,
            expire_time: now + chrono::Duration::seconds(timeout_secs),
        }
    }

    /// Push this lease's expiration `timeout_secs` further into the future
    pub fn renew(&mut self, timeout_secs: i64) {
        self.expire_time = Utc::now() + chrono::Duration::seconds(timeout_secs);
    }

    /// True if this lease's expiration has already passed
    pub fn is_expired(&self) -> bool {
        self.expire_time <= Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lease_not_expired() {
        let ws = Workspace::new(Uuid::new_v4(), 1, "pod-a".into(), 300);
        assert!(!ws.is_expired());
    }

    #[test]
    fn zero_timeout_is_immediately_expired() {
        let ws = Workspace::new(Uuid::new_v4(), 1, "pod-a".into(), -1);
        assert!(ws.is_expired());
    }

    #[test]
    fn renew_pushes_expiration_forward() {
        let mut ws = Workspace::new(Uuid::new_v4(), 1, "pod-a".into(), -5);
        assert!(ws.is_expired());
        ws.renew(300);
        assert!(!ws.is_expired());
    }
}
