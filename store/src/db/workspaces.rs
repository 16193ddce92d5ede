//! CRUD for [`Workspace`] leases

use uuid::Uuid;

use super::Store;
use crate::error::Error;
use crate::models::Workspace;

impl Store {
    /// Insert a newly granted lease
    pub async fn insert_workspace(&self, workspace: &Workspace) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO workspaces
                    (uuid, template_uuid, user_id, pod_name, create_time, expire_time)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &workspace.uuid,
                    &workspace.template_uuid,
                    &workspace.user_id,
                    &workspace.pod_name,
                    &workspace.create_time,
                    &workspace.expire_time,
                ],
            )
            .await?;
        Ok(())
    }

    /// Look up a user's existing lease against a template, if any
    pub async fn find_workspace(
        &self,
        template_uuid: &Uuid,
        user_id: i64,
    ) -> Result<Option<Workspace>, Error> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT * FROM workspaces WHERE template_uuid = $1 AND user_id = $2",
                &[template_uuid, &user_id],
            )
            .await?;
        Ok(row.as_ref().map(workspace_from_row))
    }

    /// List every lease belonging to a template's pool
    pub async fn list_workspaces(&self, template_uuid: &Uuid) -> Result<Vec<Workspace>, Error> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT * FROM workspaces WHERE template_uuid = $1",
                &[template_uuid],
            )
            .await?;
        Ok(rows.iter().map(workspace_from_row).collect())
    }

    /// List every still-leased row whose `expire_time` has already passed
    ///
    /// Backs the Reaper's sweep. Excludes already-cleared rows (`pod_name =
    /// ''`), which otherwise sit permanently past their zeroed `expire_time`.
    pub async fn list_expired_workspaces(&self) -> Result<Vec<Workspace>, Error> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT * FROM workspaces WHERE expire_time <= now() AND pod_name <> '' ORDER BY expire_time ASC",
                &[],
            )
            .await?;
        Ok(rows.iter().map(workspace_from_row).collect())
    }

    /// Push a lease's expiration forward by `timeout_secs` from now
    pub async fn renew_workspace(&self, uuid: &Uuid, timeout_secs: i64) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE workspaces SET expire_time = now() + ($2 || ' seconds')::interval WHERE uuid = $1",
                &[uuid, &timeout_secs.to_string()],
            )
            .await?;
        Ok(())
    }

    /// Claim an existing (template, user) row for a freshly granted pod,
    /// preserving its identity rather than inserting a new row
    pub async fn claim_workspace(&self, uuid: &Uuid, pod_name: &str, timeout_secs: i64) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE workspaces SET pod_name = $2, expire_time = now() + ($3 || ' seconds')::interval WHERE uuid = $1",
                &[uuid, &pod_name, &timeout_secs.to_string()],
            )
            .await?;
        Ok(())
    }

    /// Release a lease by clearing its `pod_name` and `expire_time`, keeping
    /// the row so the (template, user) pair's first-lease history survives
    pub async fn clear_workspace(&self, uuid: &Uuid) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE workspaces SET pod_name = '', expire_time = to_timestamp(0) WHERE uuid = $1",
                &[uuid],
            )
            .await?;
        Ok(())
    }
}

fn workspace_from_row(row: &tokio_postgres::Row) -> Workspace {
    Workspace {
        uuid: row.get("uuid"),
        template_uuid: row.get("template_uuid"),
        user_id: row.get("user_id"),
        pod_name: row.get("pod_name"),
        create_time: row.get("create_time"),
        expire_time: row.get("expire_time"),
    }
}
