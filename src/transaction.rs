//! Finalized transaction helpers: identifiers, coinbase detection, sanity checks

use bitcoin_hashes::{sha256d, Hash as BitcoinHash, HashEngine};

use crate::constants::*;
use crate::encoding;
use crate::error::Result;
use crate::types::*;

impl Transaction {
    /// An empty version-2 shell, the starting point of every finalization
    pub fn shell() -> Self {
        Transaction {
            version: TX_VERSION,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    /// Wire bytes (witness layout when any input carries a witness)
    pub fn to_bytes(&self) -> Vec<u8> {
        encoding::serialize_transaction(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        encoding::deserialize_transaction(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Transaction id in internal byte order
    pub fn txid(&self) -> Hash256 {
        let mut hasher = sha256d::Hash::engine();
        hasher.input(&encoding::serialize_transaction_no_witness(self));
        sha256d::Hash::from_engine(hasher).into_inner()
    }

    /// Transaction id as conventionally displayed (byte-reversed hex)
    pub fn txid_hex(&self) -> String {
        let mut id = self.txid();
        id.reverse();
        hex::encode(id)
    }

    pub fn is_coinbase(&self) -> bool {
        is_coinbase(self)
    }
}

/// CheckTransaction: structural sanity of a finalized or decoded transaction
///
/// 1. |ins| > 0 ∧ |outs| > 0
/// 2. ∀o ∈ outs: 0 ≤ o.value ≤ MAX_MONEY, and the sum stays in range
/// 3. |ins| ≤ MAX_INPUTS
/// 4. |outs| ≤ MAX_OUTPUTS
pub fn check_transaction(tx: &Transaction) -> Result<ValidationResult> {
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Ok(ValidationResult::Invalid("Empty inputs or outputs".to_string()));
    }

    let mut total: i64 = 0;
    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value < 0 || output.value > MAX_MONEY {
            return Ok(ValidationResult::Invalid(format!(
                "Invalid output value {} at index {}",
                output.value, i
            )));
        }
        total += output.value;
        if total > MAX_MONEY {
            return Ok(ValidationResult::Invalid(format!(
                "Total output value exceeds MAX_MONEY at index {}",
                i
            )));
        }
    }

    if tx.inputs.len() > MAX_INPUTS {
        return Ok(ValidationResult::Invalid(format!("Too many inputs: {}", tx.inputs.len())));
    }

    if tx.outputs.len() > MAX_OUTPUTS {
        return Ok(ValidationResult::Invalid(format!("Too many outputs: {}", tx.outputs.len())));
    }

    Ok(ValidationResult::Valid)
}

/// Check if transaction is coinbase
pub fn is_coinbase(tx: &Transaction) -> bool {
    tx.inputs.len() == 1 && tx.inputs[0].prevout.is_null()
}
