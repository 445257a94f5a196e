//! Textual form of script expressions
//!
//! Tokens are separated by whitespace:
//!
//! | token               | chunk                                   |
//! |---------------------|-----------------------------------------|
//! | `-1` .. `16`        | small-number opcode                     |
//! | `DUP`, `OP_DUP`     | opcode by mnemonic                      |
//! | `0xba`              | opcode without a mnemonic               |
//! | `PUSHDATA[hex]`     | data push                               |
//! | `[var,name,Kind]`   | variable placeholder                    |
//! | `[sig,key,XY]`      | signature placeholder (unlocking only)  |
//!
//! A signature key is a key store identifier or `$name` for a Text
//! variable; `XY` is the [`SignatureModifier`] code. Bindings are not part
//! of the text, everything else survives `parse(to_string())` unchanged.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{check_variable_name, Chunk, KeyRef, Role, ScriptExpression, SignatureRequest};
use crate::env::VarKind;
use crate::error::{BuilderError, Result};
use crate::opcodes::*;
use crate::signature::SignatureModifier;

fn write_chunk(
    f: &mut fmt::Formatter<'_>,
    chunk: &Chunk,
    expr_kind: impl Fn(&str) -> Option<VarKind>,
    request: impl Fn(&str) -> Option<SignatureRequest>,
) -> fmt::Result {
    match chunk {
        Chunk::Opcode(op) => match (decode_op_n(*op), opcode_name(*op)) {
            (Some(n), _) => write!(f, "{}", n),
            (None, Some(name)) => f.write_str(name),
            (None, None) => write!(f, "{:#04x}", op),
        },
        Chunk::Data(bytes) => write!(f, "PUSHDATA[{}]", hex::encode(bytes)),
        Chunk::Variable(name) => {
            // declarations and chunks are kept in step by every mutator
            let kind = expr_kind(name).ok_or(fmt::Error)?;
            write!(f, "[var,{},{}]", name, kind)
        }
        Chunk::Signature(fp) => {
            let req = request(fp).ok_or(fmt::Error)?;
            write!(f, "[sig,{},{}]", req.key, req.modifier.code())
        }
    }
}

impl<R: Role> fmt::Display for ScriptExpression<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chunk) in self.chunks.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write_chunk(
                f,
                chunk,
                |name| self.env.kind(name),
                |fp| self.signatures.get(fp).cloned(),
            )?;
        }
        Ok(())
    }
}

fn format_error(token: &str, reason: &str) -> BuilderError {
    BuilderError::SerializationFormat(format!("{:?}: {}", token, reason))
}

/// Contents of `[...]` split on commas, if `token` has that shape with `head`
fn bracket_fields<'a>(token: &'a str, head: &str) -> Option<Vec<&'a str>> {
    let inner = token.strip_prefix('[')?.strip_suffix(']')?;
    let mut fields = inner.split(',');
    if fields.next()? != head {
        return None;
    }
    Some(fields.collect())
}

impl<R: Role> ScriptExpression<R> {
    /// Parse the textual form
    pub fn parse(text: &str) -> Result<Self> {
        let mut expr = ScriptExpression::<R>::new();
        for token in text.split_whitespace() {
            expr.parse_token(token)?;
        }
        Ok(expr)
    }

    fn parse_token(&mut self, token: &str) -> Result<()> {
        if let Ok(n) = token.parse::<i64>() {
            let op = encode_op_n(n)
                .ok_or_else(|| format_error(token, "numbers outside -1..16 must be PUSHDATA"))?;
            self.chunks.push(Chunk::Opcode(op));
            return Ok(());
        }

        if let Some(hex_data) = token
            .strip_prefix("PUSHDATA[")
            .and_then(|rest| rest.strip_suffix(']'))
        {
            let bytes = hex::decode(hex_data).map_err(|e| format_error(token, &e.to_string()))?;
            self.chunks.push(Chunk::Data(bytes));
            return Ok(());
        }

        if let Some(fields) = bracket_fields(token, "var") {
            let [name, kind] = fields.as_slice() else {
                return Err(format_error(token, "expected [var,name,Kind]"));
            };
            let kind = VarKind::from_name(kind)
                .ok_or_else(|| format_error(token, "unknown variable kind"))?;
            check_variable_name(name).map_err(|_| format_error(token, "bad variable name"))?;
            self.env.declare(name, kind)?;
            self.chunks.push(Chunk::Variable(name.to_string()));
            return Ok(());
        }

        if let Some(fields) = bracket_fields(token, "sig") {
            if !R::ALLOWS_SIGNATURES {
                return Err(format_error(
                    token,
                    &format!("signatures are not allowed in {} scripts", R::NAME),
                ));
            }
            let [key, code] = fields.as_slice() else {
                return Err(format_error(token, "expected [sig,key,XY]"));
            };
            let key = match key.strip_prefix('$') {
                Some(name) => KeyRef::Variable(name.to_string()),
                None if !key.is_empty() => KeyRef::Id(key.to_string()),
                None => return Err(format_error(token, "empty key")),
            };
            let modifier = SignatureModifier::from_code(code)?;
            self.declare_signature_key(&key)?;
            let request = SignatureRequest::new(key, modifier);
            let fp = request.fingerprint();
            self.signatures.entry(fp.clone()).or_insert(request);
            self.chunks.push(Chunk::Signature(fp));
            return Ok(());
        }

        if let Some(hex_op) = token.strip_prefix("0x") {
            let op = u8::from_str_radix(hex_op, 16)
                .map_err(|_| format_error(token, "bad opcode byte"))?;
            self.chunks.push(Chunk::Opcode(op));
            return Ok(());
        }

        let op = opcode_from_name(token).ok_or_else(|| format_error(token, "unknown token"))?;
        self.chunks.push(Chunk::Opcode(op));
        Ok(())
    }
}

impl<R: Role> FromStr for ScriptExpression<R> {
    type Err = BuilderError;

    fn from_str(s: &str) -> Result<Self> {
        ScriptExpression::parse(s)
    }
}

impl<R: Role> Serialize for ScriptExpression<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, R: Role> Deserialize<'de> for ScriptExpression<R> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ScriptExpression::parse(&s).map_err(serde::de::Error::custom)
    }
}
