#![forbid(unsafe_code)]

//! Canonical content-key encoding for the light-client content overlay.
//!
//! A [`ContentKey`] is always `selector_byte || payload_bytes`; there is
//! exactly one canonical byte encoding per logical key (no alternate raw
//! construction path), and [`decode`] rejects any buffer whose length does
//! not match the fixed payload size for its selector.

use std::fmt;

use sha2::{Digest, Sha256};

/// 32-byte digest identifying a piece of content; the store's primary key.
pub type ContentId = [u8; 32];

/// Errors surfaced by the codec.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContentKeyError {
    #[error("unrecognized content key selector byte {0:#04x}")]
    UnknownSelector(u8),
    #[error("content key for selector {selector:#04x} expects a {expected}-byte payload, got {actual}")]
    WrongPayloadLength {
        selector: u8,
        expected: usize,
        actual: usize,
    },
    #[error("content key buffer is empty")]
    Empty,
}

/// A pluggable one-way function mapping an encoded content key to its
/// 32-byte content-id. Injected so tests can substitute a deterministic
/// stand-in without depending on a particular cryptographic hash.
pub trait ContentIdHasher {
    fn hash(&self, encoded_key: &[u8]) -> ContentId;
}

/// Production content-id hasher: SHA-256 of the canonical encoding.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Hasher;

impl ContentIdHasher for Sha256Hasher {
    fn hash(&self, encoded_key: &[u8]) -> ContentId {
        let digest = Sha256::digest(encoded_key);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }
}

/// Typed content key, one variant per selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentKey {
    /// `0x10`: payload is the 32-byte beacon block root of the bootstrap.
    LightClientBootstrap { block_root: [u8; 32] },
    /// `0x11`: payload is `start_period || count`, both little-endian u64.
    LightClientUpdate { start_period: u64, count: u64 },
    /// `0x12`: payload is `finalized_slot`, little-endian u64; `0` means "latest".
    LightClientFinalityUpdate { finalized_slot: u64 },
    /// `0x13`: payload is `optimistic_slot`, little-endian u64.
    LightClientOptimisticUpdate { optimistic_slot: u64 },
    /// `0x14`: payload is `epoch`, little-endian u64.
    HistoricalSummariesWithProof { epoch: u64 },
}

const SELECTOR_BOOTSTRAP: u8 = 0x10;
const SELECTOR_UPDATE: u8 = 0x11;
const SELECTOR_FINALITY_UPDATE: u8 = 0x12;
const SELECTOR_OPTIMISTIC_UPDATE: u8 = 0x13;
const SELECTOR_HISTORICAL_SUMMARIES: u8 = 0x14;

impl ContentKey {
    pub fn selector(&self) -> u8 {
        match self {
            ContentKey::LightClientBootstrap { .. } => SELECTOR_BOOTSTRAP,
            ContentKey::LightClientUpdate { .. } => SELECTOR_UPDATE,
            ContentKey::LightClientFinalityUpdate { .. } => SELECTOR_FINALITY_UPDATE,
            ContentKey::LightClientOptimisticUpdate { .. } => SELECTOR_OPTIMISTIC_UPDATE,
            ContentKey::HistoricalSummariesWithProof { .. } => SELECTOR_HISTORICAL_SUMMARIES,
        }
    }

    /// Emits `selector || payload`, the one canonical encoding for this key.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 32);
        out.push(self.selector());
        match self {
            ContentKey::LightClientBootstrap { block_root } => out.extend_from_slice(block_root),
            ContentKey::LightClientUpdate { start_period, count } => {
                out.extend_from_slice(&start_period.to_le_bytes());
                out.extend_from_slice(&count.to_le_bytes());
            }
            ContentKey::LightClientFinalityUpdate { finalized_slot } => {
                out.extend_from_slice(&finalized_slot.to_le_bytes())
            }
            ContentKey::LightClientOptimisticUpdate { optimistic_slot } => {
                out.extend_from_slice(&optimistic_slot.to_le_bytes())
            }
            ContentKey::HistoricalSummariesWithProof { epoch } => {
                out.extend_from_slice(&epoch.to_le_bytes())
            }
        }
        out
    }

    /// Parses `selector || payload`, rejecting unknown selectors and
    /// mismatched payload lengths.
    pub fn decode(buf: &[u8]) -> Result<Self, ContentKeyError> {
        let (&selector, payload) = buf.split_first().ok_or(ContentKeyError::Empty)?;
        match selector {
            SELECTOR_BOOTSTRAP => {
                let block_root = expect_fixed::<32>(selector, payload)?;
                Ok(ContentKey::LightClientBootstrap { block_root })
            }
            SELECTOR_UPDATE => {
                expect_len(selector, payload, 16)?;
                let start_period = u64::from_le_bytes(payload[0..8].try_into().unwrap());
                let count = u64::from_le_bytes(payload[8..16].try_into().unwrap());
                Ok(ContentKey::LightClientUpdate { start_period, count })
            }
            SELECTOR_FINALITY_UPDATE => {
                let bytes = expect_fixed::<8>(selector, payload)?;
                Ok(ContentKey::LightClientFinalityUpdate {
                    finalized_slot: u64::from_le_bytes(bytes),
                })
            }
            SELECTOR_OPTIMISTIC_UPDATE => {
                let bytes = expect_fixed::<8>(selector, payload)?;
                Ok(ContentKey::LightClientOptimisticUpdate {
                    optimistic_slot: u64::from_le_bytes(bytes),
                })
            }
            SELECTOR_HISTORICAL_SUMMARIES => {
                let bytes = expect_fixed::<8>(selector, payload)?;
                Ok(ContentKey::HistoricalSummariesWithProof {
                    epoch: u64::from_le_bytes(bytes),
                })
            }
            other => Err(ContentKeyError::UnknownSelector(other)),
        }
    }

    /// Derives the content-id for this key using the given injected hasher.
    pub fn content_id(&self, hasher: &impl ContentIdHasher) -> ContentId {
        hasher.hash(&self.encode())
    }
}

fn expect_len(selector: u8, payload: &[u8], expected: usize) -> Result<(), ContentKeyError> {
    if payload.len() != expected {
        return Err(ContentKeyError::WrongPayloadLength {
            selector,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn expect_fixed<const N: usize>(selector: u8, payload: &[u8]) -> Result<[u8; N], ContentKeyError> {
    expect_len(selector, payload, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(payload);
    Ok(out)
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "selector={:#04x}", self.selector())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        let keys = vec![
            ContentKey::LightClientBootstrap { block_root: [7u8; 32] },
            ContentKey::LightClientUpdate {
                start_period: 12,
                count: 3,
            },
            ContentKey::LightClientFinalityUpdate { finalized_slot: 0 },
            ContentKey::LightClientFinalityUpdate { finalized_slot: 42 },
            ContentKey::LightClientOptimisticUpdate {
                optimistic_slot: 9001,
            },
            ContentKey::HistoricalSummariesWithProof { epoch: 512 },
        ];
        for key in keys {
            let encoded = key.encode();
            let decoded = ContentKey::decode(&encoded).expect("canonical key decodes");
            assert_eq!(decoded, key);
        }
    }

    #[test]
    fn unknown_selector_is_rejected() {
        let buf = [0xEEu8, 1, 2, 3];
        assert_eq!(
            ContentKey::decode(&buf),
            Err(ContentKeyError::UnknownSelector(0xEE))
        );
    }

    #[test]
    fn wrong_payload_length_is_rejected() {
        let buf = [SELECTOR_BOOTSTRAP, 1, 2, 3];
        assert_eq!(
            ContentKey::decode(&buf),
            Err(ContentKeyError::WrongPayloadLength {
                selector: SELECTOR_BOOTSTRAP,
                expected: 32,
                actual: 3,
            })
        );
    }

    #[test]
    fn empty_buffer_is_rejected() {
        assert_eq!(ContentKey::decode(&[]), Err(ContentKeyError::Empty));
    }

    #[test]
    fn content_id_is_stable_for_identical_keys() {
        let hasher = Sha256Hasher;
        let key = ContentKey::LightClientFinalityUpdate { finalized_slot: 100 };
        assert_eq!(key.content_id(&hasher), key.content_id(&hasher));
    }

    #[test]
    fn content_id_differs_across_selectors_for_same_payload_bytes() {
        // Distinct logical requests must not collide on content-id.
        let hasher = Sha256Hasher;
        let finality = ContentKey::LightClientFinalityUpdate { finalized_slot: 7 };
        let optimistic = ContentKey::LightClientOptimisticUpdate { optimistic_slot: 7 };
        assert_ne!(finality.content_id(&hasher), optimistic.content_id(&hasher));
    }
}
