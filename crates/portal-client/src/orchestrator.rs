//! Lookup orchestrator (C6): consults the local store first, falls back to
//! the overlay network on a miss, and best-effort caches what it finds.
//! Mirrors the generic collaborator pattern used throughout this workspace's
//! overlay plumbing, where storage and transport are both injected traits so
//! the orchestrator itself stays backend-agnostic.

use std::sync::Arc;

use portal_content_key::{ContentIdHasher, ContentKey};
use portal_distance::ContentId;
use portal_overlay::{CancelToken, Network};
use portal_store::{ContentStore, StoreError};

use crate::error::{ClientError, ClientResult};

/// Bridges a local [`ContentStore`] to a [`Network`] lookup collaborator.
pub struct Orchestrator<S, N, H> {
    store: Arc<S>,
    network: Arc<N>,
    hasher: H,
}

impl<S, N, H> Orchestrator<S, N, H>
where
    S: ContentStore,
    N: Network,
    H: ContentIdHasher,
{
    pub fn new(store: Arc<S>, network: Arc<N>, hasher: H) -> Self {
        Self {
            store,
            network,
            hasher,
        }
    }

    pub fn content_id(&self, key: &ContentKey) -> ContentId {
        key.content_id(&self.hasher)
    }

    /// A local hit short-circuits; a miss falls through to the network;
    /// a `None` network result is never cached and is reported as not found.
    pub async fn get(&self, key: &ContentKey, cancel: &CancelToken) -> ClientResult<Vec<u8>> {
        let encoded = key.encode();
        let content_id = key.content_id(&self.hasher);

        match self.store.get(&content_id) {
            Ok(bytes) => return Ok(bytes),
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(content_id = %hex(&content_id), "local miss, falling back to network");
            }
            Err(other) => return Err(other.into()),
        }

        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        match self.network.lookup(&encoded, &content_id, cancel).await {
            Ok(Some(bytes)) => {
                if let Err(err) = self.store.put(content_id, &bytes) {
                    // A failed cache-insert must never fail the Get.
                    tracing::warn!(error = %err, content_id = %hex(&content_id), "failed to cache network lookup result");
                }
                Ok(bytes)
            }
            Ok(None) => Err(ClientError::NotFound),
            Err(portal_overlay::NetworkError::Cancelled) => Err(ClientError::Cancelled),
            Err(other) => Err(other.into()),
        }
    }
}

fn hex(id: &ContentId) -> String {
    id.iter().map(|b| format!("{b:02x}")).collect()
}
