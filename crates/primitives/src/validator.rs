//! Validator identity.
use alloy_primitives::{Address, B256, FixedBytes, keccak256};
use serde::{Deserialize, Serialize};

/// Compressed BLS consensus public key.
pub type Pubkey = FixedBytes<48>;

/// CometBFT proposer address (first 20 bytes of the key hash).
pub type ConsensusAddress = FixedBytes<20>;

/// A validator as loaded from the registry. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Display name
    pub name: String,
    /// Consensus public key
    pub pubkey: Pubkey,
    /// Consensus-layer proposer address
    pub proposer_address: ConsensusAddress,
    /// Execution-layer operator address
    pub operator: Address,
    /// Last-known voting power
    pub voting_power: u64,
}

impl Validator {
    /// Hash used as the indexed topic of events keyed by this validator's pubkey.
    pub fn identity_hash(&self) -> B256 {
        identity_hash(&self.pubkey)
    }
}

/// `keccak256(pubkey)`, i.e. the topic an `indexed bytes` pubkey is logged under.
pub fn identity_hash(pubkey: &Pubkey) -> B256 {
    keccak256(pubkey.as_slice())
}
