//! Unlocking scripts placed in transaction inputs

use std::fmt;

use super::{OutputKind, OutputScript, ScriptExpression, Unlocking};
use crate::env::{Value, VarKind};
use crate::error::{BuilderError, Result};
use crate::keystore::KeyStore;
use crate::script::number::push_data;
use crate::types::Transaction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputScript {
    Standard(ScriptExpression<Unlocking>),
    /// Spends a P2SH output: the expression, then a push of the redeem program
    P2sh {
        expr: ScriptExpression<Unlocking>,
        redeem: OutputScript,
    },
}

impl InputScript {
    pub fn standard(expr: ScriptExpression<Unlocking>) -> Self {
        InputScript::Standard(expr)
    }

    /// `redeem` must be a P2SH output script with a known program, and the two
    /// scripts must agree on the kinds of variables they share
    pub fn p2sh(expr: ScriptExpression<Unlocking>, redeem: OutputScript) -> Result<Self> {
        if redeem.kind() != &OutputKind::P2sh {
            return Err(BuilderError::InvalidReference(
                "redeem script must be a pay-to-script-hash output with a known program"
                    .to_string(),
            ));
        }
        for (name, kind) in redeem.variables() {
            if let Some(mine) = expr.env().kind(name) {
                if mine != kind {
                    return Err(BuilderError::Declaration(format!(
                        "variable '{}' is {} in the unlocking script and {} in the redeem script",
                        name, mine, kind
                    )));
                }
            }
        }
        Ok(InputScript::P2sh { expr, redeem })
    }

    /// Empty standard script, as used by coinbase inputs
    pub fn empty() -> Self {
        InputScript::Standard(ScriptExpression::new())
    }

    pub fn expr(&self) -> &ScriptExpression<Unlocking> {
        match self {
            InputScript::Standard(expr) | InputScript::P2sh { expr, .. } => expr,
        }
    }

    pub fn expr_mut(&mut self) -> &mut ScriptExpression<Unlocking> {
        match self {
            InputScript::Standard(expr) | InputScript::P2sh { expr, .. } => expr,
        }
    }

    pub fn redeem(&self) -> Option<&OutputScript> {
        match self {
            InputScript::Standard(_) => None,
            InputScript::P2sh { redeem, .. } => Some(redeem),
        }
    }

    pub fn is_p2sh(&self) -> bool {
        matches!(self, InputScript::P2sh { .. })
    }

    /// Variables of the unlocking expression and of the redeem script
    pub fn variables(&self) -> Vec<(&str, VarKind)> {
        let mut vars: Vec<(&str, VarKind)> = self.expr().variables().collect();
        if let Some(redeem) = self.redeem() {
            for (name, kind) in redeem.variables() {
                if !vars.iter().any(|(n, _)| *n == name) {
                    vars.push((name, kind));
                }
            }
        }
        vars
    }

    pub fn free_variables(&self) -> Vec<(&str, VarKind)> {
        let mut vars: Vec<(&str, VarKind)> = self.expr().free_variables().collect();
        if let Some(redeem) = self.redeem() {
            for (name, kind) in redeem.free_variables() {
                if !vars.iter().any(|(n, _)| *n == name) {
                    vars.push((name, kind));
                }
            }
        }
        vars
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.expr().has_variable(name) || self.redeem().is_some_and(|r| r.has_variable(name))
    }

    /// Bind `name` wherever it is declared and still free
    pub fn bind_if_free(&mut self, name: &str, value: &Value) -> Result<bool> {
        match self {
            InputScript::Standard(expr) => expr.bind_if_free(name, value),
            InputScript::P2sh { expr, redeem } => {
                let a = expr.bind_if_free(name, value)?;
                let b = redeem.bind_if_free(name, value)?;
                Ok(a || b)
            }
        }
    }

    pub fn signature_count(&self) -> usize {
        self.expr().signature_count()
    }

    pub fn is_ready(&self) -> bool {
        self.expr().is_ready() && self.redeem().map_or(true, |r| r.is_ready())
    }

    /// Unlocking bytes; for P2SH the redeem program is pushed last
    pub fn build(&self) -> Result<Vec<u8>> {
        match self {
            InputScript::Standard(expr) => expr.build(),
            InputScript::P2sh { expr, redeem } => {
                let mut out = expr.build()?;
                out.extend(push_data(&redeem.build()?));
                Ok(out)
            }
        }
    }

    pub fn set_all_signatures(
        &mut self,
        keystore: &KeyStore,
        tx: &Transaction,
        input_index: usize,
        script_code: &[u8],
        is_p2pkh: bool,
    ) -> Result<()> {
        self.expr_mut()
            .set_all_signatures(keystore, tx, input_index, script_code, is_p2pkh)
    }
}

impl fmt::Display for InputScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputScript::Standard(expr) => write!(f, "{}", expr),
            InputScript::P2sh { expr, redeem } => {
                write!(f, "{} <redeem: {}>", expr, redeem.expr())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;
    use crate::script::Locking;

    fn redeem_with_var() -> OutputScript {
        let mut redeem: ScriptExpression<Locking> = ScriptExpression::new();
        redeem
            .declare_variable("n", VarKind::Number)
            .unwrap()
            .op(OP_EQUAL);
        OutputScript::p2sh(redeem)
    }

    #[test]
    fn test_p2sh_build_appends_redeem() {
        let mut expr = ScriptExpression::new();
        expr.number(5);
        let mut input = InputScript::p2sh(expr, redeem_with_var()).unwrap();
        assert!(!input.is_ready());
        assert_eq!(input.free_variables(), vec![("n", VarKind::Number)]);

        assert!(input.bind_if_free("n", &Value::Number(5)).unwrap());
        assert!(input.is_ready());
        assert_eq!(input.build().unwrap(), vec![0x55, 0x02, 0x55, OP_EQUAL]);
    }

    #[test]
    fn test_p2sh_requires_p2sh_redeem() {
        let err = InputScript::p2sh(ScriptExpression::new(), OutputScript::op_return(b"x"));
        assert!(matches!(err, Err(BuilderError::InvalidReference(_))));
    }

    #[test]
    fn test_p2sh_kind_conflict() {
        let mut expr = ScriptExpression::new();
        expr.declare_variable("n", VarKind::Text).unwrap();
        let err = InputScript::p2sh(expr, redeem_with_var());
        assert!(matches!(err, Err(BuilderError::Declaration(_))));
    }
}
