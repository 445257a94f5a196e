//! Script number and data push encoding
//!
//! Numbers use the minimal signed little-endian form of the script
//! interpreter: magnitude bytes little-endian, the sign in the top bit of the
//! last byte, an extra byte when the magnitude already uses that bit. Pushes
//! follow the minimal push rules (small integers as OP_N, direct push below
//! 76 bytes, then PUSHDATA1/2/4).

use crate::encoding::Reader;
use crate::error::{BuilderError, Result};
use crate::opcodes::*;

/// One decoded script element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Op(u8),
    Push(Vec<u8>),
}

/// Minimal script-number bytes of `value` (empty for zero)
pub fn encode_number(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }

    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();
    let mut out = Vec::with_capacity(9);
    while magnitude > 0 {
        out.push((magnitude & 0xff) as u8);
        magnitude >>= 8;
    }

    // sign bit lives in the last byte
    let last = out.len() - 1;
    if out[last] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[last] |= 0x80;
    }
    out
}

/// Decode script-number bytes, rejecting non-minimal encodings
pub fn decode_number(bytes: &[u8]) -> Result<i64> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 8 {
        return Err(BuilderError::Encoding(format!(
            "script number of {} bytes is out of range",
            bytes.len()
        )));
    }

    let last = bytes[bytes.len() - 1];
    if last & 0x7f == 0 && (bytes.len() == 1 || bytes[bytes.len() - 2] & 0x80 == 0) {
        return Err(BuilderError::Encoding(format!(
            "non-minimal script number {}",
            hex::encode(bytes)
        )));
    }

    let mut magnitude: u64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        let b = if i == bytes.len() - 1 { byte & 0x7f } else { *byte };
        magnitude |= (b as u64) << (8 * i);
    }
    let value = i64::try_from(magnitude)
        .map_err(|_| BuilderError::Encoding("script number out of range".to_string()))?;
    Ok(if last & 0x80 != 0 { -value } else { value })
}

/// Script fragment pushing `value`, using OP_N for -1..=16
pub fn push_number(value: i64) -> Vec<u8> {
    match encode_op_n(value) {
        Some(op) => vec![op],
        None => push_data(&encode_number(value)),
    }
}

/// Minimal push of `data`
pub fn push_data(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        return vec![OP_0];
    }
    if data.len() == 1 && (1..=16).contains(&data[0]) {
        return vec![OP_1 + data[0] - 1];
    }
    if data.len() == 1 && data[0] == 0x81 {
        return vec![OP_1NEGATE];
    }

    let mut out = Vec::with_capacity(data.len() + 5);
    let len = data.len();
    if len < OP_PUSHDATA1 as usize {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(OP_PUSHDATA1);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(OP_PUSHDATA2);
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        out.push(OP_PUSHDATA4);
        out.extend_from_slice(&(len as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
    out
}

/// Push with an explicit length prefix, even for one-byte payloads
///
/// Signatures and public keys are always pushed this way.
pub fn push_data_verbatim(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 {
        return vec![1, data[0]];
    }
    push_data(data)
}

/// Split raw script bytes into opcodes and pushed data
///
/// OP_0 and OP_N stay opcodes; only length-prefixed pushes become data.
pub fn decode_instructions(script: &[u8]) -> Result<Vec<Instruction>> {
    let mut reader = Reader::new(script);
    let mut out = Vec::new();
    while reader.remaining() > 0 {
        let op = reader.read_u8()?;
        let len = match op {
            0x01..=0x4b => op as usize,
            OP_PUSHDATA1 => reader.read_u8()? as usize,
            OP_PUSHDATA2 => reader.read_u16()? as usize,
            OP_PUSHDATA4 => reader.read_u32()? as usize,
            _ => {
                out.push(Instruction::Op(op));
                continue;
            }
        };
        out.push(Instruction::Push(reader.take(len)?.to_vec()));
    }
    Ok(out)
}
