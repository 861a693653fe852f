/// Errors surfaced by the lookup orchestrator and content-provider API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("content not found locally or on the overlay")]
    NotFound,
    #[error("lookup cancelled")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] portal_store::StoreError),
    #[error(transparent)]
    Network(#[from] portal_overlay::NetworkError),
    #[error(transparent)]
    Key(#[from] portal_content_key::ContentKeyError),
}

pub type ClientResult<T> = Result<T, ClientError>;
