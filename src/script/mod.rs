//! Script expressions with free variables and signature placeholders
//!
//! A [`ScriptExpression`] is an ordered list of [`Chunk`]s. Besides plain
//! opcodes and data pushes a chunk may stand for a variable, resolved from the
//! expression's own [`Env`] at build time, or for a signature that is computed
//! once the spending transaction is otherwise final.
//!
//! The role parameter decides where an expression may appear: only
//! [`Unlocking`] expressions can hold signature placeholders, so an output
//! script carrying one cannot be constructed.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use tracing::trace;

use crate::env::{Env, Value, VarKind};
use crate::error::{BuilderError, Result};
use crate::keystore::KeyStore;
use crate::opcodes::*;
use crate::sighash::legacy_signature_hash;
use crate::signature::{Signature, SignatureModifier};
use crate::types::Transaction;

pub mod input;
pub mod number;
pub mod output;
pub mod text;

pub use input::InputScript;
pub use output::{OutputKind, OutputScript};

use number::{decode_instructions, push_data, push_number, Instruction};

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Locking {}
    impl Sealed for super::Unlocking {}
}

/// Where an expression is used
pub trait Role: sealed::Sealed + fmt::Debug + Clone + Copy + Default + PartialEq + Eq {
    const NAME: &'static str;
    const ALLOWS_SIGNATURES: bool;
}

/// Output (locking) scripts and redeem programs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Locking;

/// Input (unlocking) scripts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unlocking;

impl Role for Locking {
    const NAME: &'static str = "locking";
    const ALLOWS_SIGNATURES: bool = false;
}

impl Role for Unlocking {
    const NAME: &'static str = "unlocking";
    const ALLOWS_SIGNATURES: bool = true;
}

/// Element of a script expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Opcode(u8),
    Data(Vec<u8>),
    /// Placeholder for the named variable
    Variable(String),
    /// Placeholder for the signature request with this fingerprint
    Signature(String),
}

/// Key that will produce a signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyRef {
    /// Key store identifier
    Id(String),
    /// Text variable holding a key store identifier
    Variable(String),
}

impl fmt::Display for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRef::Id(id) => f.write_str(id),
            KeyRef::Variable(name) => write!(f, "${}", name),
        }
    }
}

/// A pending signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRequest {
    pub key: KeyRef,
    pub modifier: SignatureModifier,
}

impl SignatureRequest {
    pub fn new(key: KeyRef, modifier: SignatureModifier) -> Self {
        SignatureRequest { key, modifier }
    }

    /// Identical requests share a fingerprint
    pub fn fingerprint(&self) -> String {
        format!("{}:{}", self.key, self.modifier.code())
    }
}

/// Variable names must survive the text form
pub(crate) fn check_variable_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ',' | '[' | ']' | '$'));
    if bad {
        return Err(BuilderError::Declaration(format!("invalid variable name {:?}", name)));
    }
    Ok(())
}

/// Script fragment for a bound value
pub fn encode_value(value: &Value) -> Vec<u8> {
    match value {
        Value::Number(n) => push_number(*n),
        Value::Text(s) => push_data(s.as_bytes()),
        Value::Flag(true) => vec![OP_TRUE],
        Value::Flag(false) => vec![OP_FALSE],
        Value::Digest(h) => push_data(h.as_bytes()),
        Value::Signature(sig) => sig.script_bytes(),
    }
}

#[derive(Debug, Clone)]
pub struct ScriptExpression<R: Role> {
    chunks: Vec<Chunk>,
    env: Env,
    signatures: BTreeMap<String, SignatureRequest>,
    role: PhantomData<R>,
}

impl<R: Role> Default for ScriptExpression<R> {
    fn default() -> Self {
        ScriptExpression {
            chunks: Vec::new(),
            env: Env::new(),
            signatures: BTreeMap::new(),
            role: PhantomData,
        }
    }
}

/// Equal chunks, declarations and signature requests; bindings are ignored
impl<R: Role> PartialEq for ScriptExpression<R> {
    fn eq(&self, other: &Self) -> bool {
        self.chunks == other.chunks
            && self.signatures == other.signatures
            && self.env.variables().eq(other.env.variables())
    }
}

impl<R: Role> Eq for ScriptExpression<R> {}

impl<R: Role> ScriptExpression<R> {
    pub fn new() -> Self {
        ScriptExpression::default()
    }

    /// Literal chunks decoded from raw script bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut expr = ScriptExpression::new();
        for ins in decode_instructions(bytes)? {
            expr.chunks.push(match ins {
                Instruction::Op(op) => Chunk::Opcode(op),
                Instruction::Push(data) => Chunk::Data(data),
            });
        }
        Ok(expr)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn op(&mut self, op: u8) -> &mut Self {
        self.chunks.push(Chunk::Opcode(op));
        self
    }

    pub fn data(&mut self, bytes: &[u8]) -> &mut Self {
        self.chunks.push(Chunk::Data(bytes.to_vec()));
        self
    }

    pub fn number(&mut self, n: i64) -> &mut Self {
        match encode_op_n(n) {
            Some(op) => self.chunks.push(Chunk::Opcode(op)),
            None => self.chunks.push(Chunk::Data(number::encode_number(n))),
        }
        self
    }

    /// Append the literal encoding of a value
    pub fn literal(&mut self, value: &Value) -> &mut Self {
        match value {
            Value::Number(n) => return self.number(*n),
            Value::Text(s) => self.chunks.push(Chunk::Data(s.as_bytes().to_vec())),
            Value::Flag(true) => self.chunks.push(Chunk::Opcode(OP_TRUE)),
            Value::Flag(false) => self.chunks.push(Chunk::Opcode(OP_FALSE)),
            Value::Digest(h) => self.chunks.push(Chunk::Data(h.as_bytes().to_vec())),
            Value::Signature(sig) => {
                self.chunks.push(Chunk::Data(sig.bytes().to_vec()));
                if let Some(pk) = sig.pubkey() {
                    self.chunks.push(Chunk::Data(pk.to_bytes().to_vec()));
                }
            }
        }
        self
    }

    /// Append a placeholder for `name`, declaring it if needed
    pub fn declare_variable(&mut self, name: &str, kind: VarKind) -> Result<&mut Self> {
        check_variable_name(name)?;
        self.env.declare(name, kind)?;
        self.chunks.push(Chunk::Variable(name.to_string()));
        Ok(self)
    }

    pub fn bind_variable(&mut self, name: &str, value: Value) -> Result<()> {
        self.env.bind(name, value)
    }

    /// Bind `name` when it is declared here and still free
    pub fn bind_if_free(&mut self, name: &str, value: &Value) -> Result<bool> {
        if !self.env.is_free(name) {
            return Ok(false);
        }
        self.env.bind(name, value.clone())?;
        Ok(true)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.env.contains(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, VarKind)> + '_ {
        self.env.variables()
    }

    pub fn free_variables(&self) -> impl Iterator<Item = (&str, VarKind)> + '_ {
        self.env.free_variables()
    }

    pub fn bound_variables(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.env.bound_variables()
    }

    /// Remove a variable and every placeholder standing for it
    pub fn remove_variable(&mut self, name: &str) -> Result<()> {
        if let Some(req) = self
            .signatures
            .values()
            .find(|r| r.key == KeyRef::Variable(name.to_string()))
        {
            return Err(BuilderError::Declaration(format!(
                "variable '{}' names the key of signature {}",
                name,
                req.fingerprint()
            )));
        }
        self.env.remove(name)?;
        self.chunks
            .retain(|c| !matches!(c, Chunk::Variable(n) if n == name));
        Ok(())
    }

    pub fn signature_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| matches!(c, Chunk::Signature(_)))
            .count()
    }

    pub fn signature_requests(&self) -> impl Iterator<Item = &SignatureRequest> + '_ {
        self.signatures.values()
    }

    /// Every variable bound and no signature pending
    pub fn is_ready(&self) -> bool {
        self.env.is_ready() && self.signatures.is_empty()
    }

    fn not_ready_reason(&self) -> String {
        let free: Vec<&str> = self.env.free_variables().map(|(n, _)| n).collect();
        let pending: Vec<&str> = self.signatures.keys().map(String::as_str).collect();
        format!(
            "{} expression has free variables {:?} and pending signatures {:?}",
            R::NAME,
            free,
            pending
        )
    }

    /// Final script bytes, substituting every variable with its bound value
    pub fn build(&self) -> Result<Vec<u8>> {
        if !self.is_ready() {
            return Err(BuilderError::NotReady(self.not_ready_reason()));
        }

        let mut out = Vec::new();
        for chunk in &self.chunks {
            match chunk {
                Chunk::Opcode(op) => out.push(*op),
                Chunk::Data(bytes) => out.extend(push_data(bytes)),
                Chunk::Variable(name) => {
                    let value = self.env.get(name)?;
                    let declared = self.env.kind(name);
                    if declared != Some(value.kind()) {
                        return Err(BuilderError::Binding(format!(
                            "variable '{}' holds a {} value but is declared {:?}",
                            name,
                            value.kind(),
                            declared
                        )));
                    }
                    out.extend(encode_value(value));
                }
                Chunk::Signature(fp) => {
                    return Err(BuilderError::NotReady(format!("signature {} is pending", fp)))
                }
            }
        }
        Ok(out)
    }

    /// Concatenate `other` and merge declarations, bindings and signature requests
    ///
    /// Nothing changes when the two expressions disagree on a variable kind,
    /// a bound value or a signature request.
    pub fn append(&mut self, other: &ScriptExpression<R>) -> Result<&mut Self> {
        for (name, kind) in other.env.variables() {
            if let Some(mine) = self.env.kind(name) {
                if mine != kind {
                    return Err(BuilderError::Declaration(format!(
                        "variable '{}' is {} here and {} in the appended script",
                        name, mine, kind
                    )));
                }
            }
        }
        for (name, value) in other.env.bound_variables() {
            if let Ok(mine) = self.env.get(name) {
                if mine != value {
                    return Err(BuilderError::Binding(format!(
                        "variable '{}' is bound to different values",
                        name
                    )));
                }
            }
        }
        for (fp, req) in &other.signatures {
            if let Some(mine) = self.signatures.get(fp) {
                if mine != req {
                    return Err(BuilderError::Declaration(format!(
                        "signature {} requested differently",
                        fp
                    )));
                }
            }
        }

        for (name, kind) in other.env.variables() {
            self.env.declare(name, kind)?;
        }
        for (name, value) in other.env.bound_variables() {
            if self.env.is_free(name) {
                self.env.bind(name, value.clone())?;
            }
        }
        for (fp, req) in &other.signatures {
            self.signatures.insert(fp.clone(), req.clone());
        }
        self.chunks.extend(other.chunks.iter().cloned());
        Ok(self)
    }

    /// Drop `TOALTSTACK FROMALTSTACK` pairs until none is left
    pub fn optimize(&mut self) -> &mut Self {
        loop {
            let pos = self.chunks.windows(2).position(|w| {
                w[0] == Chunk::Opcode(OP_TOALTSTACK) && w[1] == Chunk::Opcode(OP_FROMALTSTACK)
            });
            match pos {
                Some(i) => {
                    self.chunks.drain(i..i + 2);
                }
                None => break,
            }
        }
        self
    }

    fn declare_signature_key(&mut self, key: &KeyRef) -> Result<()> {
        if let KeyRef::Variable(name) = key {
            check_variable_name(name)?;
            self.env.declare(name, VarKind::Text)?;
        }
        Ok(())
    }
}

impl ScriptExpression<Unlocking> {
    /// Append a placeholder for a signature by `key` with `modifier`
    pub fn declare_signature_placeholder(
        &mut self,
        key: KeyRef,
        modifier: SignatureModifier,
    ) -> Result<&mut Self> {
        self.declare_signature_key(&key)?;
        let request = SignatureRequest::new(key, modifier);
        let fp = request.fingerprint();
        self.signatures.entry(fp.clone()).or_insert(request);
        self.chunks.push(Chunk::Signature(fp));
        Ok(self)
    }

    /// Shorthand for a placeholder signed by a key store identifier
    pub fn signature(&mut self, key_id: &str, modifier: SignatureModifier) -> Result<&mut Self> {
        self.declare_signature_placeholder(KeyRef::Id(key_id.to_string()), modifier)
    }

    fn resolve_key_id(&self, key: &KeyRef) -> Result<String> {
        match key {
            KeyRef::Id(id) => Ok(id.clone()),
            KeyRef::Variable(name) => match self.env.get(name) {
                Ok(Value::Text(id)) => Ok(id.clone()),
                Ok(other) => Err(BuilderError::Binding(format!(
                    "key variable '{}' holds a {} value",
                    name,
                    other.kind()
                ))),
                Err(_) => Err(BuilderError::NotReady(format!(
                    "key variable '{}' is not bound",
                    name
                ))),
            },
        }
    }

    /// Replace every signature placeholder with a signature over input `input_index`
    ///
    /// When `is_p2pkh` is set the signer's public key is pushed after each
    /// signature. Either every placeholder is resolved or the expression is
    /// left untouched.
    pub fn set_all_signatures(
        &mut self,
        keystore: &KeyStore,
        tx: &Transaction,
        input_index: usize,
        script_code: &[u8],
        is_p2pkh: bool,
    ) -> Result<()> {
        let mut resolved: BTreeMap<&str, Signature> = BTreeMap::new();
        for (fp, request) in &self.signatures {
            let id = self.resolve_key_id(&request.key)?;
            let key = keystore.get(&id)?;
            let sighash_byte = request.modifier.sighash_byte();
            let digest = legacy_signature_hash(tx, input_index, script_code, sighash_byte)?;
            let sig = Signature::sign(&key, &digest, sighash_byte)?;
            trace!(input_index, sighash = sighash_byte, key_id = %id, "signed input");
            resolved.insert(fp.as_str(), sig);
        }

        let mut chunks = Vec::with_capacity(self.chunks.len() + resolved.len());
        for chunk in &self.chunks {
            let fp = match chunk {
                Chunk::Signature(fp) => fp,
                other => {
                    chunks.push(other.clone());
                    continue;
                }
            };
            let sig = resolved.get(fp.as_str()).ok_or_else(|| {
                BuilderError::NotReady(format!("signature {} has no request", fp))
            })?;
            chunks.push(Chunk::Data(sig.bytes().to_vec()));
            if is_p2pkh {
                if let Some(pk) = sig.pubkey() {
                    chunks.push(Chunk::Data(pk.to_bytes().to_vec()));
                }
            }
        }

        self.chunks = chunks;
        self.signatures.clear();
        Ok(())
    }
}
