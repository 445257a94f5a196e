//! Bitcoin wire encoding of transactions
//!
//! Integers are little-endian, collections are prefixed with a CompactSize
//! length. Transactions carrying witness data use the BIP-144 layout
//! (`00 01` marker and flag after the version); the txid is always computed
//! over the layout without witnesses.

use crate::error::{BuilderError, Result};
use crate::types::*;

/// Append a CompactSize length prefix
pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x10000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Append a length-prefixed byte string
pub fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn write_input(out: &mut Vec<u8>, input: &TransactionInput) {
    out.extend_from_slice(&input.prevout.hash);
    out.extend_from_slice(&input.prevout.index.to_le_bytes());
    write_var_bytes(out, &input.script_sig);
    out.extend_from_slice(&input.sequence.to_le_bytes());
}

fn write_output(out: &mut Vec<u8>, output: &TransactionOutput) {
    out.extend_from_slice(&output.value.to_le_bytes());
    write_var_bytes(out, &output.script_pubkey);
}

/// Serialize without witness data (the txid and legacy sighash layout)
pub fn serialize_transaction_no_witness(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&tx.version.to_le_bytes());
    write_compact_size(&mut out, tx.inputs.len() as u64);
    for input in &tx.inputs {
        write_input(&mut out, input);
    }
    write_compact_size(&mut out, tx.outputs.len() as u64);
    for output in &tx.outputs {
        write_output(&mut out, output);
    }
    out.extend_from_slice(&tx.lock_time.to_le_bytes());
    out
}

/// Serialize a transaction, using the witness layout when any input has one
pub fn serialize_transaction(tx: &Transaction) -> Vec<u8> {
    if tx.inputs.iter().all(|i| i.witness.is_empty()) {
        return serialize_transaction_no_witness(tx);
    }

    let mut out = Vec::new();
    out.extend_from_slice(&tx.version.to_le_bytes());
    out.push(0x00);
    out.push(0x01);
    write_compact_size(&mut out, tx.inputs.len() as u64);
    for input in &tx.inputs {
        write_input(&mut out, input);
    }
    write_compact_size(&mut out, tx.outputs.len() as u64);
    for output in &tx.outputs {
        write_output(&mut out, output);
    }
    for input in &tx.inputs {
        write_compact_size(&mut out, input.witness.len() as u64);
        for item in &input.witness {
            write_var_bytes(&mut out, item);
        }
    }
    out.extend_from_slice(&tx.lock_time.to_le_bytes());
    out
}

/// Cursor over a byte slice
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(BuilderError::Encoding(format!(
                "unexpected end of data: wanted {} bytes at offset {}, {} left",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_compact_size(&mut self) -> Result<u64> {
        match self.read_u8()? {
            0xfd => Ok(self.read_u16()? as u64),
            0xfe => Ok(self.read_u32()? as u64),
            0xff => self.read_u64(),
            n => Ok(n as u64),
        }
    }

    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_compact_size()?;
        if len > self.remaining() as u64 {
            return Err(BuilderError::Encoding(format!(
                "length prefix {} exceeds remaining {} bytes",
                len,
                self.remaining()
            )));
        }
        Ok(self.take(len as usize)?.to_vec())
    }

    fn read_count(&mut self) -> Result<usize> {
        let n = self.read_compact_size()?;
        // every element occupies at least one byte
        if n > self.remaining() as u64 {
            return Err(BuilderError::Encoding(format!("implausible element count {}", n)));
        }
        Ok(n as usize)
    }
}

fn read_input(reader: &mut Reader<'_>) -> Result<TransactionInput> {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(reader.take(32)?);
    let index = reader.read_u32()?;
    let script_sig = reader.read_var_bytes()?;
    let sequence = reader.read_u32()?;
    Ok(TransactionInput {
        prevout: OutPoint { hash, index },
        script_sig,
        sequence,
        witness: Vec::new(),
    })
}

fn read_output(reader: &mut Reader<'_>) -> Result<TransactionOutput> {
    let value = reader.read_u64()? as i64;
    let script_pubkey = reader.read_var_bytes()?;
    Ok(TransactionOutput { value, script_pubkey })
}

/// Decode a transaction in either the legacy or the witness layout
pub fn deserialize_transaction(bytes: &[u8]) -> Result<Transaction> {
    let mut reader = Reader::new(bytes);
    let version = reader.read_u32()?;

    // A zero input count can only be the segwit marker
    let segwit = reader.peek() == Some(0x00);
    if segwit {
        reader.read_u8()?;
        let flag = reader.read_u8()?;
        if flag != 0x01 {
            return Err(BuilderError::Encoding(format!("unknown segwit flag {:#04x}", flag)));
        }
    }

    let input_count = reader.read_count()?;
    let mut inputs = Vec::with_capacity(input_count);
    for _ in 0..input_count {
        inputs.push(read_input(&mut reader)?);
    }

    let output_count = reader.read_count()?;
    let mut outputs = Vec::with_capacity(output_count);
    for _ in 0..output_count {
        outputs.push(read_output(&mut reader)?);
    }

    if segwit {
        for input in inputs.iter_mut() {
            let items = reader.read_count()?;
            for _ in 0..items {
                input.witness.push(reader.read_var_bytes()?);
            }
        }
    }

    let lock_time = reader.read_u32()?;

    if reader.remaining() != 0 {
        return Err(BuilderError::Encoding(format!(
            "{} trailing bytes after transaction",
            reader.remaining()
        )));
    }

    Ok(Transaction {
        version,
        inputs,
        outputs,
        lock_time,
    })
}
