//! Typed content-provider façade (C7): one method per selector, each
//! building the right [`ContentKey`] and delegating to the orchestrator. The
//! core stays parser-agnostic -- callers decode the returned bytes with
//! whatever SSZ/RLP machinery they bring.

use std::sync::Arc;

use portal_content_key::{ContentIdHasher, ContentKey};
use portal_overlay::{CancelToken, Network};
use portal_store::ContentStore;
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;
use crate::orchestrator::Orchestrator;

/// Wall clock, injected so `GetOptimisticUpdate`'s slot computation is
/// testable without sleeping real time.
pub trait Clock: Send + Sync {
    fn now_unix_seconds(&self) -> u64;
}

/// Production clock backed by [`std::time::SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_seconds(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock is before the unix epoch")
            .as_secs()
    }
}

/// Construction-time configuration backing `GetOptimisticUpdate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub genesis_time: u64,
    pub slot_duration_seconds: u64,
}

pub struct ContentProvider<S, N, H, C> {
    orchestrator: Orchestrator<S, N, H>,
    config: ProviderConfig,
    clock: C,
}

impl<S, N, H, C> ContentProvider<S, N, H, C>
where
    S: ContentStore,
    N: Network,
    H: ContentIdHasher,
    C: Clock,
{
    pub fn new(store: Arc<S>, network: Arc<N>, hasher: H, config: ProviderConfig, clock: C) -> Self {
        Self {
            orchestrator: Orchestrator::new(store, network, hasher),
            config,
            clock,
        }
    }

    pub async fn get_bootstrap(
        &self,
        block_root: [u8; 32],
        cancel: &CancelToken,
    ) -> ClientResult<Vec<u8>> {
        let key = ContentKey::LightClientBootstrap { block_root };
        self.orchestrator.get(&key, cancel).await
    }

    pub async fn get_update_range(
        &self,
        start_period: u64,
        count: u64,
        cancel: &CancelToken,
    ) -> ClientResult<Vec<u8>> {
        let key = ContentKey::LightClientUpdate { start_period, count };
        self.orchestrator.get(&key, cancel).await
    }

    /// `None` maps to `finalized_slot = 0`, the "latest" convention.
    pub async fn get_finality_update(
        &self,
        finalized_slot: Option<u64>,
        cancel: &CancelToken,
    ) -> ClientResult<Vec<u8>> {
        let key = ContentKey::LightClientFinalityUpdate {
            finalized_slot: finalized_slot.unwrap_or(0),
        };
        self.orchestrator.get(&key, cancel).await
    }

    /// Derives `optimistic_slot` from the wall clock: `(now - genesis_time) /
    /// slot_duration_seconds`.
    pub async fn get_optimistic_update(&self, cancel: &CancelToken) -> ClientResult<Vec<u8>> {
        let now = self.clock.now_unix_seconds();
        let elapsed = now.saturating_sub(self.config.genesis_time);
        let optimistic_slot = elapsed / self.config.slot_duration_seconds.max(1);
        let key = ContentKey::LightClientOptimisticUpdate { optimistic_slot };
        self.orchestrator.get(&key, cancel).await
    }

    pub async fn get_historical_summaries(
        &self,
        epoch: u64,
        cancel: &CancelToken,
    ) -> ClientResult<Vec<u8>> {
        let key = ContentKey::HistoricalSummariesWithProof { epoch };
        self.orchestrator.get(&key, cancel).await
    }
}
