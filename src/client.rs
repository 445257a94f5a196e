//! Boundary to a Bitcoin node
//!
//! The crate never talks to the network itself. Callers hand an
//! implementation of [`BitcoinClient`] to the few operations that need chain
//! data, and typically invoke it from their own binding hooks.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::keys::NetworkType;

/// How deeply buried a transaction must be to count as mined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Confidence {
    /// In a block, at any depth
    Low,
    /// At least 3 confirmations
    #[default]
    Medium,
    /// At least 6 confirmations
    High,
    /// At least this many confirmations
    Depth(u32),
}

impl Confidence {
    pub fn confirmations(self) -> u32 {
        match self {
            Confidence::Low => 1,
            Confidence::Medium => 3,
            Confidence::High => 6,
            Confidence::Depth(n) => n,
        }
    }
}

/// Read and broadcast access to a node; failures map to `BuilderError::Client`
pub trait BitcoinClient {
    fn network(&self) -> NetworkType;

    fn block_count(&self) -> Result<u64>;

    /// Hex serialization of the transaction with the given display txid
    fn raw_transaction(&self, txid: &str) -> Result<String>;

    fn is_mined(&self, txid: &str, confidence: Confidence) -> Result<bool>;

    /// Broadcast and return the txid the node reports
    fn send_raw_transaction(&self, hex_tx: &str) -> Result<String>;

    /// Whether output `index` of `txid` is unspent; `None` asks about any output
    fn is_utxo(&self, txid: &str, index: Option<u32>) -> Result<bool>;
}
