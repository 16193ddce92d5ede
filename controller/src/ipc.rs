//! The IPC Service: exposes lease lookups to sibling processes on the same
//! host over a local TCP socket
//!
//! Exposes a single lease-lookup method, analogous to an
//! `exposed_get_user_space_pod(uuid, user_id)` RPC call served over a
//! threaded socket server in other language runtimes. Rust has no
//! equivalent of that kind of transparent object proxying anywhere in this
//! dependency stack, so this carries the same single-method contract over a
//! newline-delimited JSON request/response protocol on a plain
//! `tokio::net::TcpListener` instead.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{event, instrument, Level};
use uuid::Uuid;

use crate::k8s::Orchestrator;
use crate::lease::LeaseManager;
use store::{Error, Store};

/// A request for the pod currently backing a user's lease against a template
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LeaseLookup {
    /// The template whose pool the lease was granted against
    pub template_uuid: Uuid,
    /// The external uuid of the user requesting their pod
    pub user_uuid: Uuid,
}

/// The IPC service's response to a [`LeaseLookup`]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LeaseLookupResponse {
    /// The name of the pod backing the lease, if one could be granted
    pub pod_name: Option<String>,
}

/// Serves [`LeaseLookup`] requests over a local TCP socket
pub struct IpcService<O: Orchestrator> {
    store: Store,
    lease_manager: Arc<LeaseManager<O>>,
}

impl<O: Orchestrator + 'static> IpcService<O> {
    /// Build a new IPC service
    pub fn new(store: Store, lease_manager: Arc<LeaseManager<O>>) -> Self {
        IpcService { store, lease_manager }
    }

    /// Bind and serve forever, accepting one task per connection
    #[instrument(name = "IpcService::serve", skip_all, fields(port))]
    pub async fn serve(self: Arc<Self>, port: u16) -> Result<(), Error> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|err| Error::new(format!("failed to bind ipc port {port}: {err}")))?;
        event!(Level::INFO, port, "ipc service listening");
        loop {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|err| Error::new(format!("ipc accept failed: {err}")))?;
            let service = self.clone();
            tokio::spawn(async move {
                if let Err(err) = service.handle_connection(stream).await {
                    event!(Level::WARN, error = %err, "ipc connection failed");
                }
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> Result<(), Error> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|err| Error::new(format!("ipc read failed: {err}")))?;
        let lookup: LeaseLookup = serde_json::from_str(line.trim())?;
        let response = self.resolve(lookup).await;
        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        write_half
            .write_all(encoded.as_bytes())
            .await
            .map_err(|err| Error::new(format!("ipc write failed: {err}")))?;
        Ok(())
    }

    async fn resolve(&self, lookup: LeaseLookup) -> LeaseLookupResponse {
        let pod_name = match self.resolve_inner(&lookup).await {
            Ok(name) => name,
            Err(err) => {
                event!(Level::WARN, template = %lookup.template_uuid, error = %err, "lease lookup failed");
                None
            }
        };
        LeaseLookupResponse { pod_name }
    }

    async fn resolve_inner(&self, lookup: &LeaseLookup) -> Result<Option<String>, Error> {
        let user = match self.store.get_user_by_uuid(&lookup.user_uuid).await {
            Ok(user) => user,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let template = self.store.get_template(&lookup.template_uuid).await?;
        let pod_name = self
            .lease_manager
            .acquire(&template, &user, false, false)
            .await?;
        Ok(Some(pod_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_lookup_round_trips_through_json() {
        let lookup = LeaseLookup {
            template_uuid: Uuid::new_v4(),
            user_uuid: Uuid::new_v4(),
        };
        let encoded = serde_json::to_string(&lookup).unwrap();
        let decoded: LeaseLookup = serde_json::from_str(&encoded).unwrap();
        assert_eq!(lookup.template_uuid, decoded.template_uuid);
    }
}
