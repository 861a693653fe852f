#![forbid(unsafe_code)]

//! The injected network-lookup collaborator: a trait the local
//! content store's lookup orchestrator calls into on a cache miss. Grounded
//! on this workspace's overlay-service trait, which keeps peer discovery and
//! transport behind a trait boundary instead of a concrete struct so the
//! orchestrator above it never has to know which transport is wired in.

pub use tokio_util::sync::CancellationToken as CancelToken;

/// Errors a [`Network`] implementation may surface. A missing answer is not
/// an error (`Ok(None)`); this enum is for the transport actually failing.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("lookup cancelled")]
    Cancelled,
    #[error("no peers available for this lookup")]
    NoPeers,
    #[error("transport failure: {0}")]
    Transport(String),
}

impl NetworkError {
    pub fn transport(msg: impl Into<String>) -> Self {
        NetworkError::Transport(msg.into())
    }
}

/// Overlay-network lookup, injected into the content-store orchestrator.
/// Implementations own peer discovery, request routing and uTP/UDP
/// transport; this crate only specifies the boundary they present.
#[async_trait::async_trait]
pub trait Network: Send + Sync {
    /// Looks up `content_id` (the hash of `encoded_key`) against the overlay.
    /// `Ok(None)` means no peer served the content, not a failure; callers
    /// must not cache a `None` result. Respects `cancel`: once cancelled,
    /// implementations should return `Err(NetworkError::Cancelled)` promptly
    /// rather than complete a pending round trip.
    async fn lookup(
        &self,
        encoded_key: &[u8],
        content_id: &[u8; 32],
        cancel: &CancelToken,
    ) -> Result<Option<Vec<u8>>, NetworkError>;
}
