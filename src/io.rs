//! Inputs and outputs of a transaction under construction

use crate::error::{BuilderError, Result};
use crate::locktime::RelativeLocktime;
use crate::registry::TxRef;
use crate::script::{InputScript, OutputScript};
use crate::types::OutPoint;

/// Output of a registered transaction spent by an input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParentRef {
    pub tx: TxRef,
    pub index: u32,
}

/// What an input spends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputOrigin {
    /// Nothing: the input of a coinbase transaction
    Coinbase,
    /// An output of a transaction in the same registry
    Parent(ParentRef),
    /// An output outside the registry, as found in decoded transactions
    External(OutPoint),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    origin: InputOrigin,
    script: InputScript,
    relative_locktime: Option<RelativeLocktime>,
}

impl Input {
    /// Spend output `index` of `parent`
    pub fn new(parent: TxRef, index: u32, script: InputScript) -> Self {
        Input {
            origin: InputOrigin::Parent(ParentRef { tx: parent, index }),
            script,
            relative_locktime: None,
        }
    }

    /// Parentless input; only coinbase builders hold one
    pub(crate) fn coinbase(script: InputScript) -> Self {
        Input {
            origin: InputOrigin::Coinbase,
            script,
            relative_locktime: None,
        }
    }

    pub(crate) fn external(outpoint: OutPoint, script: InputScript, sequence: u32) -> Self {
        Input {
            origin: InputOrigin::External(outpoint),
            script,
            relative_locktime: Some(RelativeLocktime::from_sequence(sequence))
                .filter(|lock| lock.is_enabled()),
        }
    }

    pub fn with_relative_locktime(mut self, locktime: RelativeLocktime) -> Self {
        self.relative_locktime = Some(locktime);
        self
    }

    pub fn origin(&self) -> InputOrigin {
        self.origin
    }

    pub fn parent(&self) -> Option<ParentRef> {
        match self.origin {
            InputOrigin::Parent(parent) => Some(parent),
            _ => None,
        }
    }

    pub fn parent_tx(&self) -> Option<TxRef> {
        self.parent().map(|p| p.tx)
    }

    pub fn out_index(&self) -> Option<u32> {
        match self.origin {
            InputOrigin::Coinbase => None,
            InputOrigin::Parent(parent) => Some(parent.index),
            InputOrigin::External(outpoint) => Some(outpoint.index),
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.origin == InputOrigin::Coinbase
    }

    pub fn script(&self) -> &InputScript {
        &self.script
    }

    pub fn script_mut(&mut self) -> &mut InputScript {
        &mut self.script
    }

    pub fn relative_locktime(&self) -> Option<RelativeLocktime> {
        self.relative_locktime
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    script: OutputScript,
    value: i64,
}

impl Output {
    /// `value` must lie in `0..=MAX_MONEY`
    pub fn new(script: OutputScript, value: i64) -> Result<Self> {
        if !(0..=crate::constants::MAX_MONEY).contains(&value) {
            return Err(BuilderError::InvalidAmount(format!(
                "{} satoshis is outside 0..={}",
                value,
                crate::constants::MAX_MONEY
            )));
        }
        Ok(Output { script, value })
    }

    pub fn script(&self) -> &OutputScript {
        &self.script
    }

    pub fn script_mut(&mut self) -> &mut OutputScript {
        &mut self.script
    }

    pub fn value(&self) -> i64 {
        self.value
    }
}
