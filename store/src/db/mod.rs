//! The relational store backend
//!
//! Wraps a [`deadpool_postgres::Pool`] and exposes one submodule per entity.

mod tasks;
mod templates;
mod users;
mod vnc;
mod workspaces;

use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;

use crate::conf::Database;
use crate::error::Error;

/// A handle to the relational store's connection pool
#[derive(Clone)]
pub struct Store {
    pool: Pool,
}

impl Store {
    /// Connect to the relational store and verify the connection works
    pub async fn connect(conf: &Database) -> Result<Self, Error> {
        let mut pool_config = PoolConfig::new();
        pool_config.host = Some(conf.host.clone());
        pool_config.port = Some(conf.port);
        pool_config.user = Some(conf.user.clone());
        pool_config.password = Some(conf.password.clone());
        pool_config.dbname = Some(conf.dbname.clone());
        pool_config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|err| Error::new(format!("failed to build connection pool: {err}")))?;
        // grab and immediately release a connection to fail fast on bad config
        let _ = pool.get().await?;
        Ok(Store { pool })
    }

    /// Run the idempotent schema bootstrap, creating any missing tables
    ///
    /// A single `CREATE TABLE IF NOT EXISTS` pass since this store has no
    /// migration framework of its own.
    pub async fn migrate(&self) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS task_templates (
                    uuid UUID PRIMARY KEY,
                    container_config JSONB NOT NULL,
                    replica INTEGER NOT NULL,
                    max_sharing_users INTEGER NOT NULL,
                    ttl_interval BIGINT NOT NULL,
                    time_limit BIGINT NOT NULL
                );

                DO $$ BEGIN
                    CREATE TYPE task_status AS ENUM (
                        'scheduled', 'waiting', 'pending', 'running', 'succeeded', 'failed',
                        'tle', 'mle', 'deleting'
                    );
                EXCEPTION WHEN duplicate_object THEN NULL;
                END $$;

                CREATE TABLE IF NOT EXISTS tasks (
                    uuid UUID PRIMARY KEY,
                    template_uuid UUID NOT NULL REFERENCES task_templates(uuid),
                    user_id BIGINT NOT NULL,
                    status task_status NOT NULL,
                    job_name TEXT,
                    exit_code INTEGER,
                    create_time TIMESTAMPTZ NOT NULL,
                    update_time TIMESTAMPTZ NOT NULL,
                    logs TEXT NOT NULL DEFAULT '',
                    logs_get BOOLEAN NOT NULL DEFAULT false
                );
                CREATE INDEX IF NOT EXISTS tasks_active_idx ON tasks (status, create_time);

                CREATE TABLE IF NOT EXISTS workspaces (
                    uuid UUID PRIMARY KEY,
                    template_uuid UUID NOT NULL REFERENCES task_templates(uuid),
                    user_id BIGINT NOT NULL,
                    pod_name TEXT NOT NULL,
                    create_time TIMESTAMPTZ NOT NULL,
                    expire_time TIMESTAMPTZ NOT NULL,
                    UNIQUE (template_uuid, user_id)
                );
                CREATE INDEX IF NOT EXISTS workspaces_expire_idx ON workspaces (expire_time);

                CREATE TABLE IF NOT EXISTS vnc_workspaces (
                    uuid UUID PRIMARY KEY,
                    template_uuid UUID NOT NULL REFERENCES task_templates(uuid),
                    user_id BIGINT NOT NULL,
                    deployment_name TEXT NOT NULL,
                    ingress_path TEXT NOT NULL,
                    create_time TIMESTAMPTZ NOT NULL,
                    expire_time TIMESTAMPTZ NOT NULL,
                    UNIQUE (template_uuid, user_id)
                );
                CREATE INDEX IF NOT EXISTS vnc_workspaces_expire_idx ON vnc_workspaces (expire_time);
                "#,
            )
            .await?;
        Ok(())
    }
}
