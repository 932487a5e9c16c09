//! Event decoder — matches raw logs against the known signature set and
//! produces typed [`Event`] records.
//!
//! topics[0] of an EVM log is the keccak256 hash of the event's canonical
//! ABI signature; the decoder derives those hashes once at construction.
//! A log whose topics[0] is not in the set is foreign to this pipeline's
//! interest set and decodes to `None`. A log that *matches* a signature
//! but carries malformed topics/data is logged and skipped — it must
//! never abort the rest of its block group.

use std::collections::HashMap;

use alloy_primitives::U256;
use tiny_keccak::{Hasher, Keccak};

use crate::error::IngestError;
use crate::event::{
    Approval, Claim, DelegateChanged, DelegateVotesChanged, Event, EventKind, EventPayload,
    MerkleRootChanged, OwnershipTransferred, Transfer,
};
use crate::types::{BlockGroup, BlockRef, Envelope, RawLog, TransactionRef};

/// Compute the keccak256 hash of a canonical ABI signature string,
/// `0x`-prefixed lowercase hex.
pub fn keccak256_signature(signature: &str) -> String {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut output);
    format!("0x{}", hex::encode(output))
}

/// Decoder over the closed set of recognized event kinds.
pub struct EventDecoder {
    /// topic0 (lowercase hex) → event kind.
    by_topic: HashMap<String, EventKind>,
}

impl EventDecoder {
    /// Build a decoder registering every [`EventKind`].
    pub fn new() -> Self {
        let by_topic = EventKind::ALL
            .iter()
            .map(|kind| (keccak256_signature(kind.signature()), *kind))
            .collect();
        Self { by_topic }
    }

    /// The topic0 values this decoder recognizes, for the upstream
    /// subscription filter.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<_> = self.by_topic.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Decode one raw log in its block context.
    ///
    /// Returns `None` for foreign logs and for malformed logs; the latter
    /// are reported at warn level.
    pub fn decode(&self, log: &RawLog, block: &BlockRef) -> Option<Event> {
        let topic0 = log.signature_topic()?.to_ascii_lowercase();
        let kind = *self.by_topic.get(&topic0)?;

        match self.decode_payload(kind, log) {
            Ok(payload) => Some(Event {
                envelope: Envelope {
                    contract_address: log.address.to_ascii_lowercase(),
                    block: block.clone(),
                    transaction: TransactionRef {
                        hash: log.tx_hash.clone(),
                        index: log.tx_index,
                    },
                    log_index: log.log_index,
                },
                payload,
            }),
            Err(e) => {
                tracing::warn!(
                    kind = %kind,
                    tx = %log.tx_hash,
                    log_index = log.log_index,
                    error = %e,
                    "Skipping malformed log"
                );
                None
            }
        }
    }

    /// Decode every log in a block group, preserving log order.
    pub fn decode_group(&self, group: &BlockGroup) -> Vec<Event> {
        group
            .logs
            .iter()
            .filter_map(|log| self.decode(log, &group.block))
            .collect()
    }

    fn decode_payload(&self, kind: EventKind, log: &RawLog) -> Result<EventPayload, IngestError> {
        Ok(match kind {
            EventKind::Transfer => EventPayload::Transfer(Transfer {
                from: topic_address(log, 1)?,
                to: topic_address(log, 2)?,
                value: data_uint(log, 0)?,
            }),
            EventKind::Approval => EventPayload::Approval(Approval {
                owner: topic_address(log, 1)?,
                spender: topic_address(log, 2)?,
                value: data_uint(log, 0)?,
            }),
            EventKind::DelegateChanged => EventPayload::DelegateChanged(DelegateChanged {
                delegator: topic_address(log, 1)?,
                from_delegate: topic_address(log, 2)?,
                to_delegate: topic_address(log, 3)?,
            }),
            EventKind::DelegateVotesChanged => {
                EventPayload::DelegateVotesChanged(DelegateVotesChanged {
                    delegate: topic_address(log, 1)?,
                    previous_balance: data_uint(log, 0)?,
                    new_balance: data_uint(log, 1)?,
                })
            }
            EventKind::Claim => EventPayload::Claim(Claim {
                claimant: topic_address(log, 1)?,
                amount: data_uint(log, 0)?,
            }),
            EventKind::MerkleRootChanged => EventPayload::MerkleRootChanged(MerkleRootChanged {
                merkle_root: data_bytes32(log, 0)?,
            }),
            EventKind::OwnershipTransferred => {
                EventPayload::OwnershipTransferred(OwnershipTransferred {
                    previous_owner: topic_address(log, 1)?,
                    new_owner: topic_address(log, 2)?,
                })
            }
        })
    }
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Word helpers ────────────────────────────────────────────────────────────

/// Decode an indexed address from `topics[index]` (last 20 bytes of the
/// 32-byte word).
fn topic_address(log: &RawLog, index: usize) -> Result<String, IngestError> {
    let word = topic_word(log, index)?;
    Ok(format!("0x{}", hex::encode(&word[12..])))
}

fn topic_word(log: &RawLog, index: usize) -> Result<[u8; 32], IngestError> {
    let topic = log
        .topics
        .get(index)
        .ok_or_else(|| IngestError::Decode(format!("missing topic {index}")))?;
    decode_word(topic).map_err(|e| IngestError::Decode(format!("topic {index}: {e}")))
}

/// Decode the `index`-th 32-byte word of the data payload as a uint256.
fn data_uint(log: &RawLog, index: usize) -> Result<U256, IngestError> {
    Ok(U256::from_be_slice(&data_word(log, index)?))
}

/// Decode the `index`-th 32-byte word of the data payload as 0x-hex.
fn data_bytes32(log: &RawLog, index: usize) -> Result<String, IngestError> {
    Ok(format!("0x{}", hex::encode(data_word(log, index)?)))
}

fn data_word(log: &RawLog, index: usize) -> Result<[u8; 32], IngestError> {
    let hex_data = log.data.strip_prefix("0x").unwrap_or(&log.data);
    let bytes = hex::decode(hex_data)
        .map_err(|e| IngestError::Decode(format!("invalid data hex: {e}")))?;
    let start = index * 32;
    if bytes.len() < start + 32 {
        return Err(IngestError::Decode(format!(
            "data too short for word {index}: {} bytes",
            bytes.len()
        )));
    }
    let mut word = [0u8; 32];
    word.copy_from_slice(&bytes[start..start + 32]);
    Ok(word)
}

fn decode_word(hex_word: &str) -> Result<[u8; 32], String> {
    let stripped = hex_word.strip_prefix("0x").unwrap_or(hex_word);
    let bytes = hex::decode(stripped).map_err(|e| e.to_string())?;
    if bytes.len() != 32 {
        return Err(format!("expected 32 bytes, got {}", bytes.len()));
    }
    let mut word = [0u8; 32];
    word.copy_from_slice(&bytes);
    Ok(word)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockGroup;

    fn block() -> BlockRef {
        BlockRef {
            number: 100,
            hash: "0xaaa".into(),
            timestamp: 1_700_000_000,
        }
    }

    fn pad_address(addr: &str) -> String {
        let stripped = addr.strip_prefix("0x").unwrap_or(addr);
        format!("0x{:0>64}", stripped)
    }

    fn uint_word(value: u64) -> String {
        format!("{:064x}", value)
    }

    fn transfer_log(log_index: u32) -> RawLog {
        RawLog {
            address: "0xC18360217D8F7Ab5e7c516566761Ea12Ce7F9D72".into(),
            topics: vec![
                keccak256_signature("Transfer(address,address,uint256)"),
                pad_address("0x1111111111111111111111111111111111111111"),
                pad_address("0x2222222222222222222222222222222222222222"),
            ],
            data: format!("0x{}", uint_word(1000)),
            tx_hash: "0xt1".into(),
            tx_index: 0,
            log_index,
        }
    }

    #[test]
    fn known_signature_hashes() {
        // Well-known keccak256 of the ERC-20 Transfer signature.
        assert_eq!(
            keccak256_signature("Transfer(address,address,uint256)"),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
        assert_eq!(
            keccak256_signature("Approval(address,address,uint256)"),
            "0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925"
        );
    }

    #[test]
    fn decodes_transfer() {
        let decoder = EventDecoder::new();
        let event = decoder.decode(&transfer_log(0), &block()).unwrap();

        assert_eq!(event.kind(), EventKind::Transfer);
        assert_eq!(
            event.envelope.contract_address,
            "0xc18360217d8f7ab5e7c516566761ea12ce7f9d72"
        );
        match &event.payload {
            EventPayload::Transfer(t) => {
                assert_eq!(t.from, "0x1111111111111111111111111111111111111111");
                assert_eq!(t.to, "0x2222222222222222222222222222222222222222");
                assert_eq!(t.value, U256::from(1000u64));
            }
            other => panic!("expected Transfer, got {other:?}"),
        }
    }

    #[test]
    fn decodes_delegate_votes_changed() {
        let decoder = EventDecoder::new();
        let log = RawLog {
            address: "0xc18360217d8f7ab5e7c516566761ea12ce7f9d72".into(),
            topics: vec![
                keccak256_signature("DelegateVotesChanged(address,uint256,uint256)"),
                pad_address("0x3333333333333333333333333333333333333333"),
            ],
            data: format!("0x{}{}", uint_word(500), uint_word(750)),
            tx_hash: "0xt2".into(),
            tx_index: 1,
            log_index: 4,
        };
        let event = decoder.decode(&log, &block()).unwrap();
        match &event.payload {
            EventPayload::DelegateVotesChanged(d) => {
                assert_eq!(d.previous_balance, U256::from(500u64));
                assert_eq!(d.new_balance, U256::from(750u64));
            }
            other => panic!("expected DelegateVotesChanged, got {other:?}"),
        }
    }

    #[test]
    fn foreign_topic_returns_none() {
        let decoder = EventDecoder::new();
        let mut log = transfer_log(0);
        log.topics[0] = keccak256_signature("Swap(address,uint256)");
        assert!(decoder.decode(&log, &block()).is_none());
    }

    #[test]
    fn malformed_log_is_isolated() {
        // One malformed log between two valid logs of different kinds:
        // exactly two events, nothing propagates.
        let decoder = EventDecoder::new();

        let mut truncated = transfer_log(1);
        truncated.data = "0x00ff".into(); // not a 32-byte word

        let claim = RawLog {
            address: "0xc18360217d8f7ab5e7c516566761ea12ce7f9d72".into(),
            topics: vec![
                keccak256_signature("Claim(address,uint256)"),
                pad_address("0x4444444444444444444444444444444444444444"),
            ],
            data: format!("0x{}", uint_word(42)),
            tx_hash: "0xt3".into(),
            tx_index: 2,
            log_index: 2,
        };

        let group = BlockGroup {
            block: block(),
            token: "tok-100".into(),
            logs: vec![transfer_log(0), truncated, claim],
        };

        let events = decoder.decode_group(&group);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), EventKind::Transfer);
        assert_eq!(events[1].kind(), EventKind::Claim);
    }

    #[test]
    fn topics_cover_all_kinds() {
        let decoder = EventDecoder::new();
        assert_eq!(decoder.topics().len(), EventKind::ALL.len());
    }
}
