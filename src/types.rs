//! Core Bitcoin wire types produced by the builders

use serde::{Deserialize, Serialize};

/// 256-bit hash, internal byte order
pub type Hash256 = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Witness stack of one input
pub type Witness = Vec<ByteString>;

/// OutPoint: reference to an output of a previous transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash256,
    pub index: u32,
}

impl OutPoint {
    /// The null outpoint carried by coinbase inputs
    pub fn null() -> Self {
        OutPoint {
            hash: [0u8; 32],
            index: crate::constants::COINBASE_OUTPOINT_INDEX,
        }
    }

    pub fn is_null(&self) -> bool {
        *self == OutPoint::null()
    }
}

/// Transaction Input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: ByteString,
    pub sequence: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub witness: Witness,
}

/// Transaction Output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: i64,
    pub script_pubkey: ByteString,
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
}

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}
