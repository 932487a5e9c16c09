//! The closed set of recognized event kinds.
//!
//! Events are a tagged variant over a shared [`Envelope`]: new kinds are
//! added by extending [`EventPayload`] and its decoder/writer mapping, not
//! by open-ended dispatch. Payload field maps carry the contract ABI
//! parameter names verbatim (`fromDelegate`, `previousBalance`, …); the
//! sink normalizes them to snake_case columns at the writer boundary.

use alloy_primitives::U256;
use serde_json::Value;

use crate::types::Envelope;

// ─── EventKind ───────────────────────────────────────────────────────────────

/// The recognized event kinds, one per sink collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Transfer,
    Approval,
    DelegateChanged,
    DelegateVotesChanged,
    Claim,
    MerkleRootChanged,
    OwnershipTransferred,
}

impl EventKind {
    /// Every recognized kind, in stable order.
    pub const ALL: [EventKind; 7] = [
        EventKind::Transfer,
        EventKind::Approval,
        EventKind::DelegateChanged,
        EventKind::DelegateVotesChanged,
        EventKind::Claim,
        EventKind::MerkleRootChanged,
        EventKind::OwnershipTransferred,
    ];

    /// The canonical ABI signature string, e.g.
    /// `"Transfer(address,address,uint256)"`.
    pub fn signature(&self) -> &'static str {
        match self {
            Self::Transfer => "Transfer(address,address,uint256)",
            Self::Approval => "Approval(address,address,uint256)",
            Self::DelegateChanged => "DelegateChanged(address,address,address)",
            Self::DelegateVotesChanged => "DelegateVotesChanged(address,uint256,uint256)",
            Self::Claim => "Claim(address,uint256)",
            Self::MerkleRootChanged => "MerkleRootChanged(bytes32)",
            Self::OwnershipTransferred => "OwnershipTransferred(address,address)",
        }
    }

    /// Collection name for this kind under `prefix`, e.g. `evt_transfer`.
    pub fn collection(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.table_suffix())
    }

    fn table_suffix(&self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::Approval => "approval",
            Self::DelegateChanged => "delegate_changed",
            Self::DelegateVotesChanged => "delegate_votes_changed",
            Self::Claim => "claim",
            Self::MerkleRootChanged => "merkle_root_changed",
            Self::OwnershipTransferred => "ownership_transferred",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table_suffix())
    }
}

// ─── Payloads ────────────────────────────────────────────────────────────────

/// `Transfer(address indexed from, address indexed to, uint256 value)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub from: String,
    pub to: String,
    pub value: U256,
}

/// `Approval(address indexed owner, address indexed spender, uint256 value)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approval {
    pub owner: String,
    pub spender: String,
    pub value: U256,
}

/// `DelegateChanged(address indexed delegator, address indexed fromDelegate,
/// address indexed toDelegate)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateChanged {
    pub delegator: String,
    pub from_delegate: String,
    pub to_delegate: String,
}

/// `DelegateVotesChanged(address indexed delegate, uint256 previousBalance,
/// uint256 newBalance)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateVotesChanged {
    pub delegate: String,
    pub previous_balance: U256,
    pub new_balance: U256,
}

/// `Claim(address indexed claimant, uint256 amount)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub claimant: String,
    pub amount: U256,
}

/// `MerkleRootChanged(bytes32 merkleRoot)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleRootChanged {
    pub merkle_root: String,
}

/// `OwnershipTransferred(address indexed previousOwner, address indexed newOwner)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipTransferred {
    pub previous_owner: String,
    pub new_owner: String,
}

// ─── EventPayload ────────────────────────────────────────────────────────────

/// Kind-specific payload of a decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Transfer(Transfer),
    Approval(Approval),
    DelegateChanged(DelegateChanged),
    DelegateVotesChanged(DelegateVotesChanged),
    Claim(Claim),
    MerkleRootChanged(MerkleRootChanged),
    OwnershipTransferred(OwnershipTransferred),
}

/// Amounts leave the pipeline as decimal strings; no floating point at any
/// stage.
fn uint(v: &U256) -> Value {
    Value::String(v.to_string())
}

impl EventPayload {
    /// The kind tag of this payload.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Transfer(_) => EventKind::Transfer,
            Self::Approval(_) => EventKind::Approval,
            Self::DelegateChanged(_) => EventKind::DelegateChanged,
            Self::DelegateVotesChanged(_) => EventKind::DelegateVotesChanged,
            Self::Claim(_) => EventKind::Claim,
            Self::MerkleRootChanged(_) => EventKind::MerkleRootChanged,
            Self::OwnershipTransferred(_) => EventKind::OwnershipTransferred,
        }
    }

    /// Payload fields keyed by their ABI parameter names.
    pub fn abi_fields(&self) -> Vec<(&'static str, Value)> {
        match self {
            Self::Transfer(p) => vec![
                ("from", p.from.clone().into()),
                ("to", p.to.clone().into()),
                ("value", uint(&p.value)),
            ],
            Self::Approval(p) => vec![
                ("owner", p.owner.clone().into()),
                ("spender", p.spender.clone().into()),
                ("value", uint(&p.value)),
            ],
            Self::DelegateChanged(p) => vec![
                ("delegator", p.delegator.clone().into()),
                ("fromDelegate", p.from_delegate.clone().into()),
                ("toDelegate", p.to_delegate.clone().into()),
            ],
            Self::DelegateVotesChanged(p) => vec![
                ("delegate", p.delegate.clone().into()),
                ("previousBalance", uint(&p.previous_balance)),
                ("newBalance", uint(&p.new_balance)),
            ],
            Self::Claim(p) => vec![
                ("claimant", p.claimant.clone().into()),
                ("amount", uint(&p.amount)),
            ],
            Self::MerkleRootChanged(p) => vec![("merkleRoot", p.merkle_root.clone().into())],
            Self::OwnershipTransferred(p) => vec![
                ("previousOwner", p.previous_owner.clone().into()),
                ("newOwner", p.new_owner.clone().into()),
            ],
        }
    }
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// A decoded event: shared envelope plus kind-specific payload.
/// Immutable after decoding; consumed exactly once by the batch sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub envelope: Envelope,
    pub payload: EventPayload,
}

impl Event {
    /// Shorthand for `payload.kind()`.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
