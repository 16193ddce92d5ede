//! CRUD for [`TaskTemplate`] rows

use uuid::Uuid;

use super::Store;
use crate::error::Error;
use crate::models::TaskTemplate;

impl Store {
    /// Insert a new template
    pub async fn insert_template(&self, template: &TaskTemplate) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO task_templates
                    (uuid, container_config, replica, max_sharing_users, ttl_interval, time_limit)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &template.uuid,
                    &template.container_config,
                    &(template.replica as i32),
                    &(template.max_sharing_users as i32),
                    &(template.ttl_interval as i64),
                    &(template.time_limit as i64),
                ],
            )
            .await?;
        Ok(())
    }

    /// Fetch a single template by uuid
    pub async fn get_template(&self, uuid: &Uuid) -> Result<TaskTemplate, Error> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT uuid, container_config, replica, max_sharing_users, ttl_interval, time_limit
                 FROM task_templates WHERE uuid = $1",
                &[uuid],
            )
            .await?
            .ok_or_else(|| Error::NotFound(format!("template {uuid} not found")))?;
        Ok(TaskTemplate {
            uuid: row.get(0),
            container_config: row.get(1),
            replica: row.get::<_, i32>(2) as u32,
            max_sharing_users: row.get::<_, i32>(3) as u32,
            ttl_interval: row.get::<_, i64>(4) as u64,
            time_limit: row.get::<_, i64>(5) as u64,
        })
    }

    /// List every template currently defined
    ///
    /// Backs the Pool Reconciler's per-tick sweep: every template is
    /// reconciled independently on its own `ttl_interval`.
    pub async fn list_templates(&self) -> Result<Vec<TaskTemplate>, Error> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT uuid, container_config, replica, max_sharing_users, ttl_interval, time_limit
                 FROM task_templates",
                &[],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| TaskTemplate {
                uuid: row.get(0),
                container_config: row.get(1),
                replica: row.get::<_, i32>(2) as u32,
                max_sharing_users: row.get::<_, i32>(3) as u32,
                ttl_interval: row.get::<_, i64>(4) as u64,
                time_limit: row.get::<_, i64>(5) as u64,
            })
            .collect())
    }

    /// Delete a template by uuid
    pub async fn delete_template(&self, uuid: &Uuid) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .execute("DELETE FROM task_templates WHERE uuid = $1", &[uuid])
            .await?;
        Ok(())
    }
}
