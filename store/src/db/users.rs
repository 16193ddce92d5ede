//! Read-only lookups against the externally owned users table
//!
//! The controller never writes to this table; it is populated by the
//! identity system the rest of the platform shares.

use uuid::Uuid;

use super::Store;
use crate::error::Error;
use crate::models::UserRef;

impl Store {
    /// Resolve a user by their numeric id
    pub async fn get_user(&self, id: i64) -> Result<UserRef, Error> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT id, uuid, username FROM users WHERE id = $1", &[&id])
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {id} not found")))?;
        Ok(UserRef {
            id: row.get(0),
            uuid: row.get(1),
            username: row.get(2),
        })
    }

    /// Resolve a user by their external uuid
    pub async fn get_user_by_uuid(&self, uuid: &Uuid) -> Result<UserRef, Error> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT id, uuid, username FROM users WHERE uuid = $1", &[uuid])
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {uuid} not found")))?;
        Ok(UserRef {
            id: row.get(0),
            uuid: row.get(1),
            username: row.get(2),
        })
    }
}
