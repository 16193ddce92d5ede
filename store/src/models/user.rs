//! A minimal read-only view of a user, owned by an external identity system
//!
//! The controller never creates, updates or deletes users; it only resolves
//! the handful of fields it needs to provision pods on a user's behalf.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The numeric floor applied when deriving a container uid from a user id
///
/// Keeps user-driven container processes out of the low, often privileged,
/// uid range regardless of how small the underlying user id is.
const UID_OFFSET: i64 = 499;

/// A resolved reference to an external user, just enough to provision pods
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserRef {
    /// The user's numeric id in the external identity system
    pub id: i64,
    /// The user's stable external uuid
    pub uuid: Uuid,
    /// The user's login name
    pub username: String,
}

impl UserRef {
    /// The uid to run this user's pod containers as
    pub fn container_uid(&self) -> i64 {
        UID_OFFSET + self.id
    }

    /// The sanitized label-safe name derived from this user for k8s resources
    pub fn resource_name(&self) -> String {
        self.username
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_uid_is_offset_by_499() {
        let user = UserRef { id: 10, uuid: Uuid::new_v4(), username: "alice".into() };
        assert_eq!(user.container_uid(), 509);
    }

    #[test]
    fn resource_name_sanitizes() {
        let user = UserRef { id: 1, uuid: Uuid::new_v4(), username: "Alice.Smith".into() };
        assert_eq!(user.resource_name(), "alice-smith");
    }
}
