//! CRUD for [`VncWorkspace`] rows

use uuid::Uuid;

use super::Store;
use crate::error::Error;
use crate::models::VncWorkspace;

impl Store {
    /// Insert a newly provisioned VNC workspace
    pub async fn insert_vnc_workspace(&self, vnc: &VncWorkspace) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO vnc_workspaces
                    (uuid, template_uuid, user_id, deployment_name, ingress_path, create_time, expire_time)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &vnc.uuid,
                    &vnc.template_uuid,
                    &vnc.user_id,
                    &vnc.deployment_name,
                    &vnc.ingress_path,
                    &vnc.create_time,
                    &vnc.expire_time,
                ],
            )
            .await?;
        Ok(())
    }

    /// Look up a user's existing VNC workspace against a template, if any
    pub async fn find_vnc_workspace(
        &self,
        template_uuid: &Uuid,
        user_id: i64,
    ) -> Result<Option<VncWorkspace>, Error> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT * FROM vnc_workspaces WHERE template_uuid = $1 AND user_id = $2",
                &[template_uuid, &user_id],
            )
            .await?;
        Ok(row.as_ref().map(vnc_from_row))
    }

    /// List every VNC workspace whose `expire_time` has already passed
    ///
    /// Backs the Reaper's sweep, alongside [`Store::list_expired_workspaces`].
    pub async fn list_expired_vnc_workspaces(&self) -> Result<Vec<VncWorkspace>, Error> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT * FROM vnc_workspaces WHERE expire_time <= now() ORDER BY expire_time ASC",
                &[],
            )
            .await?;
        Ok(rows.iter().map(vnc_from_row).collect())
    }

    /// Push a VNC workspace's expiration forward by `timeout_secs` from now
    pub async fn renew_vnc_workspace(&self, uuid: &Uuid, timeout_secs: i64) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE vnc_workspaces SET expire_time = now() + ($2 || ' seconds')::interval WHERE uuid = $1",
                &[uuid, &timeout_secs.to_string()],
            )
            .await?;
        Ok(())
    }

    /// Delete a VNC workspace by uuid
    pub async fn delete_vnc_workspace(&self, uuid: &Uuid) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .execute("DELETE FROM vnc_workspaces WHERE uuid = $1", &[uuid])
            .await?;
        Ok(())
    }
}

fn vnc_from_row(row: &tokio_postgres::Row) -> VncWorkspace {
    VncWorkspace {
        uuid: row.get("uuid"),
        template_uuid: row.get("template_uuid"),
        user_id: row.get("user_id"),
        deployment_name: row.get("deployment_name"),
        ingress_path: row.get("ingress_path"),
        create_time: row.get("create_time"),
        expire_time: row.get("expire_time"),
    }
}
