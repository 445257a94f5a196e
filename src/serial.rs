//! Already settled transactions wrapped as registry nodes

use std::borrow::Cow;

use tracing::debug;

use crate::client::BitcoinClient;
use crate::error::{BuilderError, Result};
use crate::io::{Input, Output};
use crate::keys::NetworkType;
use crate::registry::{Finalizer, TransactionSource, TxRef};
use crate::script::{InputScript, OutputScript, ScriptExpression};
use crate::transaction::check_transaction;
use crate::types::{Hash256, Transaction, ValidationResult};

/// A fully specified transaction decoded from its wire bytes
///
/// It has no free variables, no registered parents and finalizes to itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialTransactionBuilder {
    network: NetworkType,
    bytes: Vec<u8>,
    tx: Transaction,
}

impl SerialTransactionBuilder {
    pub fn new(network: NetworkType, bytes: Vec<u8>) -> Result<Self> {
        let tx = Transaction::from_bytes(&bytes)?;
        if let ValidationResult::Invalid(reason) = check_transaction(&tx)? {
            return Err(BuilderError::Encoding(format!(
                "wrapped transaction is malformed: {}",
                reason
            )));
        }
        Ok(SerialTransactionBuilder { network, bytes, tx })
    }

    pub fn from_hex(network: NetworkType, hex_tx: &str) -> Result<Self> {
        let bytes = hex::decode(hex_tx.trim())
            .map_err(|e| BuilderError::Encoding(format!("bad transaction hex: {}", e)))?;
        SerialTransactionBuilder::new(network, bytes)
    }

    /// Download `txid` through `client` and wrap it
    pub fn fetch(client: &dyn BitcoinClient, txid: &str) -> Result<Self> {
        let raw = client.raw_transaction(txid)?;
        let serial = SerialTransactionBuilder::from_hex(client.network(), &raw)?;
        if serial.tx.txid_hex() != txid {
            return Err(BuilderError::Client(format!(
                "client returned transaction {} for {}",
                serial.tx.txid_hex(),
                txid
            )));
        }
        debug!(txid, "fetched transaction");
        Ok(serial)
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn txid(&self) -> Hash256 {
        self.tx.txid()
    }
}

impl TransactionSource for SerialTransactionBuilder {
    fn network(&self) -> NetworkType {
        self.network
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn parents(&self) -> Vec<TxRef> {
        Vec::new()
    }

    fn is_coinbase(&self) -> bool {
        self.tx.is_coinbase()
    }

    /// Inputs rebuilt from the unlocking bytes; the spent outputs stay external
    fn inputs(&self) -> Result<Cow<'_, [Input]>> {
        let is_coinbase = self.tx.is_coinbase();
        let mut inputs = Vec::with_capacity(self.tx.inputs.len());
        for txin in &self.tx.inputs {
            // coinbase unlocking bytes are arbitrary data, not a script
            let script = if is_coinbase {
                InputScript::empty()
            } else {
                InputScript::standard(ScriptExpression::from_bytes(&txin.script_sig)?)
            };
            inputs.push(if is_coinbase {
                Input::coinbase(script)
            } else {
                Input::external(txin.prevout, script, txin.sequence)
            });
        }
        Ok(Cow::Owned(inputs))
    }

    /// Outputs with their scripts classified into the standard templates
    fn outputs(&self) -> Result<Cow<'_, [Output]>> {
        self.tx
            .outputs
            .iter()
            .map(|txout| Output::new(OutputScript::classify(&txout.script_pubkey)?, txout.value))
            .collect::<Result<Vec<_>>>()
            .map(Cow::Owned)
    }

    fn to_transaction(&self, _ctx: &mut Finalizer<'_>) -> Result<Transaction> {
        Ok(self.tx.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::OutputKind;
    use crate::types::{OutPoint, TransactionInput, TransactionOutput};

    fn spending_tx() -> Transaction {
        let mut tx = Transaction::shell();
        tx.inputs.push(TransactionInput {
            prevout: OutPoint { hash: [5; 32], index: 1 },
            script_sig: vec![0x01, 0xaa],
            sequence: 0xffff_fffe,
            witness: Vec::new(),
        });
        tx.outputs.push(TransactionOutput {
            value: 1000,
            script_pubkey: OutputScript::p2pkh_from_hash([3; 20]).locking_bytes().unwrap(),
        });
        tx.outputs.push(TransactionOutput {
            value: 0,
            script_pubkey: vec![crate::opcodes::OP_RETURN, 0x01, 0x2a],
        });
        tx
    }

    #[test]
    fn test_wrapped_inputs_and_outputs() {
        let tx = spending_tx();
        let serial = SerialTransactionBuilder::new(NetworkType::Testnet, tx.to_bytes()).unwrap();
        assert!(TransactionSource::is_ready(&serial));
        assert!(!TransactionSource::is_coinbase(&serial));
        assert!(serial.parents().is_empty());

        let inputs = TransactionSource::inputs(&serial).unwrap();
        assert_eq!(inputs.len(), 1);
        assert!(!inputs[0].is_coinbase());
        assert_eq!(inputs[0].out_index(), Some(1));

        let outputs = TransactionSource::outputs(&serial).unwrap();
        assert_eq!(outputs[0].value(), 1000);
        assert!(outputs[0].script().is_p2pkh());
        assert_eq!(outputs[1].script().kind(), &OutputKind::OpReturn { data: vec![0x2a] });
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(SerialTransactionBuilder::from_hex(NetworkType::Testnet, "00").is_err());
        assert!(SerialTransactionBuilder::from_hex(NetworkType::Testnet, "zz").is_err());

        let mut empty = spending_tx();
        empty.outputs.clear();
        let err = SerialTransactionBuilder::new(NetworkType::Testnet, empty.to_bytes());
        assert!(matches!(err, Err(BuilderError::Encoding(_))));
    }

    #[test]
    fn test_from_hex_matches_bytes() {
        let tx = spending_tx();
        let serial = SerialTransactionBuilder::from_hex(NetworkType::Mainnet, &tx.to_hex()).unwrap();
        assert_eq!(serial.transaction(), &tx);
        assert_eq!(serial.bytes(), tx.to_bytes().as_slice());
        assert_eq!(serial.txid(), tx.txid());
    }
}
