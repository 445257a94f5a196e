//! Legacy (pre-segwit) signature hash
//!
//! The transaction is copied, every unlocking script is blanked except the
//! signed input's, which receives the script code, and the copy is trimmed
//! according to the sighash byte before being double-SHA256 hashed together
//! with the sighash byte as a little-endian u32.

use bitcoin_hashes::{sha256d, Hash as BitcoinHash, HashEngine};

use crate::encoding::serialize_transaction_no_witness;
use crate::error::{BuilderError, Result};
use crate::opcodes::*;
use crate::signature::{SighashType, SIGHASH_ANYONECANPAY};
use crate::types::*;

/// Digest committed to when SIGHASH_SINGLE signs an input with no matching output
fn sighash_single_bug() -> Hash256 {
    let mut one = [0u8; 32];
    one[0] = 1;
    one
}

/// Remove every OP_CODESEPARATOR from a script code, leaving pushes intact
fn strip_code_separators(script: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(script.len());
    let mut i = 0;
    while i < script.len() {
        let op = script[i];
        let (header, len) = match op {
            0x01..=0x4b => (1, op as usize),
            OP_PUSHDATA1 if i + 1 < script.len() => (2, script[i + 1] as usize),
            OP_PUSHDATA2 if i + 2 < script.len() => {
                (3, u16::from_le_bytes([script[i + 1], script[i + 2]]) as usize)
            }
            OP_PUSHDATA4 if i + 4 < script.len() => (
                5,
                u32::from_le_bytes([script[i + 1], script[i + 2], script[i + 3], script[i + 4]])
                    as usize,
            ),
            _ => (1, 0),
        };
        let end = (i + header + len).min(script.len());
        if op != OP_CODESEPARATOR {
            out.extend_from_slice(&script[i..end]);
        }
        i = end;
    }
    out
}

/// Signature hash of input `input_index` under `sighash_byte`
pub fn legacy_signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    sighash_byte: u8,
) -> Result<Hash256> {
    if input_index >= tx.inputs.len() {
        return Err(BuilderError::InvalidReference(format!(
            "input index {} out of range ({} inputs)",
            input_index,
            tx.inputs.len()
        )));
    }

    let base = sighash_byte & 0x1f;
    let anyone_can_pay = sighash_byte & SIGHASH_ANYONECANPAY != 0;

    if base == SighashType::Single as u8 && input_index >= tx.outputs.len() {
        return Ok(sighash_single_bug());
    }

    let script_code = strip_code_separators(script_code);
    let mut copy = tx.clone();
    for (i, input) in copy.inputs.iter_mut().enumerate() {
        input.witness.clear();
        input.script_sig = if i == input_index {
            script_code.clone()
        } else {
            Vec::new()
        };
    }

    if base == SighashType::None as u8 {
        copy.outputs.clear();
    } else if base == SighashType::Single as u8 {
        copy.outputs.truncate(input_index + 1);
        for output in copy.outputs.iter_mut().take(input_index) {
            output.value = -1;
            output.script_pubkey.clear();
        }
    }

    if base == SighashType::None as u8 || base == SighashType::Single as u8 {
        for (i, input) in copy.inputs.iter_mut().enumerate() {
            if i != input_index {
                input.sequence = 0;
            }
        }
    }

    if anyone_can_pay {
        let signed = copy.inputs.swap_remove(input_index);
        copy.inputs = vec![signed];
    }

    let mut hasher = sha256d::Hash::engine();
    hasher.input(&serialize_transaction_no_witness(&copy));
    hasher.input(&(sighash_byte as u32).to_le_bytes());
    Ok(sha256d::Hash::from_engine(hasher).into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_in_one_out() -> Transaction {
        let input = |n: u8| TransactionInput {
            prevout: OutPoint { hash: [n; 32], index: 0 },
            script_sig: vec![0x51],
            sequence: 0xffffffff,
            witness: vec![],
        };
        Transaction {
            version: 2,
            inputs: vec![input(1), input(2)],
            outputs: vec![TransactionOutput {
                value: 1000,
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn test_single_without_matching_output() {
        let tx = two_in_one_out();
        let digest = legacy_signature_hash(&tx, 1, &[0x51], SighashType::Single as u8).unwrap();
        assert_eq!(digest, sighash_single_bug());
    }

    #[test]
    fn test_unlocking_scripts_do_not_affect_digest() {
        let tx = two_in_one_out();
        let mut other = tx.clone();
        other.inputs[1].script_sig = vec![0x00, 0x00];
        let all = SighashType::All as u8;
        assert_eq!(
            legacy_signature_hash(&tx, 0, &[0x51], all).unwrap(),
            legacy_signature_hash(&other, 0, &[0x51], all).unwrap()
        );
    }

    #[test]
    fn test_flags_change_commitment() {
        let tx = two_in_one_out();
        let all = legacy_signature_hash(&tx, 0, &[0x51], 0x01).unwrap();
        let none = legacy_signature_hash(&tx, 0, &[0x51], 0x02).unwrap();
        let acp = legacy_signature_hash(&tx, 0, &[0x51], 0x81).unwrap();
        assert_ne!(all, none);
        assert_ne!(all, acp);

        // NONE does not commit to outputs
        let mut changed = tx.clone();
        changed.outputs[0].value = 1;
        assert_eq!(none, legacy_signature_hash(&changed, 0, &[0x51], 0x02).unwrap());
        assert_ne!(all, legacy_signature_hash(&changed, 0, &[0x51], 0x01).unwrap());
    }

    #[test]
    fn test_anyone_can_pay_ignores_other_inputs() {
        let tx = two_in_one_out();
        let mut more = tx.clone();
        more.inputs.push(TransactionInput {
            prevout: OutPoint { hash: [9; 32], index: 3 },
            script_sig: vec![],
            sequence: 0,
            witness: vec![],
        });
        assert_eq!(
            legacy_signature_hash(&tx, 0, &[0x51], 0x81).unwrap(),
            legacy_signature_hash(&more, 0, &[0x51], 0x81).unwrap()
        );
    }

    #[test]
    fn test_code_separators_stripped() {
        let code = [OP_DUP, OP_CODESEPARATOR, 0x01, OP_CODESEPARATOR, OP_CHECKSIG];
        assert_eq!(strip_code_separators(&code), vec![OP_DUP, 0x01, OP_CODESEPARATOR, OP_CHECKSIG]);
    }

    #[test]
    fn test_input_index_out_of_range() {
        assert!(legacy_signature_hash(&two_in_one_out(), 2, &[], 0x01).is_err());
    }
}
