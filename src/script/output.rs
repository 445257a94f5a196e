//! Locking scripts placed in transaction outputs

use std::fmt;

use super::{Chunk, Locking, ScriptExpression};
use crate::env::{Value, VarKind};
use crate::error::{BuilderError, Result};
use crate::hash::hash160;
use crate::keys::{Address, NetworkType};
use crate::opcodes::*;

/// Template an output script follows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputKind {
    /// Any script, used verbatim
    Raw,
    /// DUP HASH160 <pubkey hash> EQUALVERIFY CHECKSIG
    P2pkh { pubkey_hash: [u8; 20] },
    /// The expression is the redeem program; the output locks to its hash
    P2sh,
    /// A P2SH output whose redeem program is not known
    ScriptHash { script_hash: [u8; 20] },
    /// RETURN <data>
    OpReturn { data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputScript {
    expr: ScriptExpression<Locking>,
    kind: OutputKind,
}

fn p2pkh_expr(pubkey_hash: &[u8; 20]) -> ScriptExpression<Locking> {
    let mut expr = ScriptExpression::new();
    expr.op(OP_DUP)
        .op(OP_HASH160)
        .data(pubkey_hash)
        .op(OP_EQUALVERIFY)
        .op(OP_CHECKSIG);
    expr
}

fn script_hash_template(script_hash: &[u8; 20]) -> Vec<u8> {
    let mut out = Vec::with_capacity(23);
    out.push(OP_HASH160);
    out.push(20);
    out.extend_from_slice(script_hash);
    out.push(OP_EQUAL);
    out
}

/// Pubkey hash of a standard P2PKH script
pub fn match_p2pkh(script: &[u8]) -> Option<[u8; 20]> {
    match script {
        [OP_DUP, OP_HASH160, 20, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            let mut out = [0u8; 20];
            out.copy_from_slice(hash);
            Some(out)
        }
        _ => None,
    }
}

/// Script hash of a standard P2SH script
pub fn match_p2sh(script: &[u8]) -> Option<[u8; 20]> {
    match script {
        [OP_HASH160, 20, hash @ .., OP_EQUAL] if hash.len() == 20 => {
            let mut out = [0u8; 20];
            out.copy_from_slice(hash);
            Some(out)
        }
        _ => None,
    }
}

impl OutputScript {
    pub fn raw(expr: ScriptExpression<Locking>) -> Self {
        OutputScript {
            expr,
            kind: OutputKind::Raw,
        }
    }

    pub fn p2pkh(address: &Address) -> Self {
        OutputScript::p2pkh_from_hash(*address.pubkey_hash())
    }

    pub fn p2pkh_from_hash(pubkey_hash: [u8; 20]) -> Self {
        OutputScript {
            expr: p2pkh_expr(&pubkey_hash),
            kind: OutputKind::P2pkh { pubkey_hash },
        }
    }

    /// Pay to the hash of `redeem`, which may still hold free variables
    pub fn p2sh(redeem: ScriptExpression<Locking>) -> Self {
        OutputScript {
            expr: redeem,
            kind: OutputKind::P2sh,
        }
    }

    pub fn script_hash(script_hash: [u8; 20]) -> Self {
        let mut expr = ScriptExpression::new();
        expr.op(OP_HASH160).data(&script_hash).op(OP_EQUAL);
        OutputScript {
            expr,
            kind: OutputKind::ScriptHash { script_hash },
        }
    }

    pub fn op_return(data: &[u8]) -> Self {
        let mut expr = ScriptExpression::new();
        expr.op(OP_RETURN).data(data);
        OutputScript {
            expr,
            kind: OutputKind::OpReturn {
                data: data.to_vec(),
            },
        }
    }

    /// Recognize the standard templates in decoded script bytes
    pub fn classify(script: &[u8]) -> Result<Self> {
        if let Some(hash) = match_p2pkh(script) {
            return Ok(OutputScript::p2pkh_from_hash(hash));
        }
        if let Some(hash) = match_p2sh(script) {
            return Ok(OutputScript::script_hash(hash));
        }

        let expr = ScriptExpression::from_bytes(script)?;
        if let [Chunk::Opcode(OP_RETURN), Chunk::Data(data)] = expr.chunks() {
            let data = data.clone();
            return Ok(OutputScript {
                expr,
                kind: OutputKind::OpReturn { data },
            });
        }
        Ok(OutputScript::raw(expr))
    }

    pub fn kind(&self) -> &OutputKind {
        &self.kind
    }

    pub fn expr(&self) -> &ScriptExpression<Locking> {
        &self.expr
    }

    pub fn expr_mut(&mut self) -> &mut ScriptExpression<Locking> {
        &mut self.expr
    }

    /// Outputs spent by supplying a redeem program
    pub fn is_p2sh(&self) -> bool {
        matches!(self.kind, OutputKind::P2sh | OutputKind::ScriptHash { .. })
    }

    pub fn is_p2pkh(&self) -> bool {
        matches!(self.kind, OutputKind::P2pkh { .. })
    }

    pub fn is_op_return(&self) -> bool {
        matches!(self.kind, OutputKind::OpReturn { .. })
    }

    pub fn is_ready(&self) -> bool {
        self.expr.is_ready()
    }

    pub fn bind_variable(&mut self, name: &str, value: Value) -> Result<()> {
        self.expr.bind_variable(name, value)
    }

    pub fn bind_if_free(&mut self, name: &str, value: &Value) -> Result<bool> {
        self.expr.bind_if_free(name, value)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, VarKind)> + '_ {
        self.expr.variables()
    }

    pub fn free_variables(&self) -> impl Iterator<Item = (&str, VarKind)> + '_ {
        self.expr.free_variables()
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.expr.has_variable(name)
    }

    /// Program bytes: the redeem program for P2SH, the locking script otherwise
    pub fn build(&self) -> Result<Vec<u8>> {
        self.expr.build()
    }

    /// Bytes placed in the output
    pub fn locking_bytes(&self) -> Result<Vec<u8>> {
        match &self.kind {
            OutputKind::P2sh => Ok(script_hash_template(&hash160(&self.build()?))),
            _ => self.build(),
        }
    }

    /// Redeem program for a P2SH output whose program is known
    pub fn redeem_program(&self) -> Result<Vec<u8>> {
        match &self.kind {
            OutputKind::P2sh => self.build(),
            OutputKind::ScriptHash { script_hash } => Err(BuilderError::InvalidReference(format!(
                "redeem program of script hash {} is unknown",
                hex::encode(script_hash)
            ))),
            _ => Err(BuilderError::InvalidReference(
                "output is not pay-to-script-hash".to_string(),
            )),
        }
    }

    /// Base58 address for the standard kinds
    pub fn address(&self, network: NetworkType) -> Option<String> {
        let (version, hash) = match &self.kind {
            OutputKind::P2pkh { pubkey_hash } => (network.address_version(), *pubkey_hash),
            OutputKind::ScriptHash { script_hash } => (network.script_hash_version(), *script_hash),
            OutputKind::P2sh => (network.script_hash_version(), hash160(&self.build().ok()?)),
            _ => return None,
        };
        let mut payload = Vec::with_capacity(21);
        payload.push(version);
        payload.extend_from_slice(&hash);
        Some(bs58::encode(payload).with_check().into_string())
    }
}

impl fmt::Display for OutputScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OutputKind::Raw => write!(f, "{}", self.expr),
            OutputKind::P2pkh { .. } => write!(f, "P2PKH({})", self.expr),
            OutputKind::P2sh => write!(f, "P2SH({})", self.expr),
            OutputKind::ScriptHash { script_hash } => {
                write!(f, "P2SH(hash {})", hex::encode(script_hash))
            }
            OutputKind::OpReturn { data } => write!(f, "OP_RETURN({})", hex::encode(data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;

    #[test]
    fn test_p2sh_not_ready_until_bound() {
        let mut redeem = ScriptExpression::new();
        redeem
            .op(OP_HASH160)
            .declare_variable("h", VarKind::Digest)
            .unwrap()
            .op(OP_EQUAL);
        let mut out = OutputScript::p2sh(redeem);
        assert!(matches!(out.locking_bytes(), Err(BuilderError::NotReady(_))));

        out.bind_variable("h", Value::Digest(Hash::new(vec![1; 20]))).unwrap();
        let program = out.build().unwrap();
        let locking = out.locking_bytes().unwrap();
        assert_ne!(program, locking);
        assert_eq!(match_p2sh(&locking), Some(hash160(&program)));
        assert_eq!(out.redeem_program().unwrap(), program);
    }

    #[test]
    fn test_classify() {
        let p2pkh = OutputScript::p2pkh_from_hash([7; 20]);
        let bytes = p2pkh.locking_bytes().unwrap();
        assert_eq!(OutputScript::classify(&bytes).unwrap(), p2pkh);

        let hashed = OutputScript::classify(&script_hash_template(&[9; 20])).unwrap();
        assert_eq!(hashed.kind(), &OutputKind::ScriptHash { script_hash: [9; 20] });
        assert!(hashed.is_p2sh());
        assert!(hashed.redeem_program().is_err());

        let ret = OutputScript::classify(&[OP_RETURN, 0x02, 0xde, 0xad]).unwrap();
        assert_eq!(ret.kind(), &OutputKind::OpReturn { data: vec![0xde, 0xad] });

        let raw = OutputScript::classify(&[OP_1]).unwrap();
        assert_eq!(raw.kind(), &OutputKind::Raw);
    }

    #[test]
    fn test_op_return_bytes() {
        let out = OutputScript::op_return(b"DATA");
        assert_eq!(out.locking_bytes().unwrap(), vec![OP_RETURN, 4, b'D', b'A', b'T', b'A']);
        assert_eq!(out.expr().to_string(), "RETURN PUSHDATA[44415441]");
    }

    #[test]
    fn test_address() {
        let out = OutputScript::p2pkh_from_hash([0; 20]);
        assert_eq!(
            out.address(NetworkType::Mainnet).unwrap(),
            "1111111111111111111114oLvT2"
        );
        assert!(OutputScript::op_return(b"x").address(NetworkType::Mainnet).is_none());
    }
}
