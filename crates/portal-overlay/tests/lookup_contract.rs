//! Exercises the [`Network`] trait boundary the way a real transport
//! implementation would be driven: concurrently, and with cancellation
//! observed mid-flight.

use async_trait::async_trait;
use portal_overlay::{CancelToken, Network, NetworkError};
use std::sync::Arc;

struct SlowPeer;

#[async_trait]
impl Network for SlowPeer {
    async fn lookup(
        &self,
        _encoded_key: &[u8],
        _content_id: &[u8; 32],
        cancel: &CancelToken,
    ) -> Result<Option<Vec<u8>>, NetworkError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(NetworkError::Cancelled),
            _ = tokio::time::sleep(std::time::Duration::from_secs(30)) => Ok(Some(b"too slow".to_vec())),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_wins_the_race_against_a_slow_peer() {
    let peer = Arc::new(SlowPeer);
    let cancel = CancelToken::new();
    let cancel_clone = cancel.clone();

    let lookup = tokio::spawn(async move { peer.lookup(b"key", &[1u8; 32], &cancel_clone).await });
    cancel.cancel();
    let result = lookup.await.unwrap();
    assert!(matches!(result, Err(NetworkError::Cancelled)));
}

#[tokio::test]
async fn concurrent_lookups_are_independent() {
    struct EchoPeer;

    #[async_trait]
    impl Network for EchoPeer {
        async fn lookup(
            &self,
            encoded_key: &[u8],
            _content_id: &[u8; 32],
            _cancel: &CancelToken,
        ) -> Result<Option<Vec<u8>>, NetworkError> {
            Ok(Some(encoded_key.to_vec()))
        }
    }

    let peer = Arc::new(EchoPeer);
    let cancel = CancelToken::new();
    let (a, b) = tokio::join!(
        peer.lookup(b"alpha", &[0u8; 32], &cancel),
        peer.lookup(b"beta", &[0u8; 32], &cancel),
    );
    assert_eq!(a.unwrap(), Some(b"alpha".to_vec()));
    assert_eq!(b.unwrap(), Some(b"beta".to_vec()));
}
