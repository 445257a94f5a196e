//! Arena of transaction builders and recursive finalization
//!
//! Builders never point at each other directly. Every node lives in a
//! [`TransactionRegistry`] and inputs name their parents by [`TxRef`]
//! handle, so a dependency graph can be walked, checked for cycles and
//! finalized without shared ownership.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::builder::TransactionBuilder;
use crate::error::{BuilderError, Result};
use crate::hash::hash160;
use crate::io::{Input, InputOrigin, Output};
use crate::keys::NetworkType;
use crate::keystore::KeyStore;
use crate::script::output::{match_p2pkh, match_p2sh};
use crate::script::InputScript;
use crate::serial::SerialTransactionBuilder;
use crate::types::Transaction;

/// Handle of a node in a [`TransactionRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxRef(usize);

impl TxRef {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Interface shared by deferred builders and wrapped serialized transactions
pub trait TransactionSource {
    fn network(&self) -> NetworkType;

    /// Readiness of this node alone, ignoring its ancestors
    fn is_ready(&self) -> bool;

    /// Registry handles of the transactions spent by this one
    fn parents(&self) -> Vec<TxRef>;

    fn is_coinbase(&self) -> bool;

    fn inputs(&self) -> Result<Cow<'_, [Input]>>;

    fn outputs(&self) -> Result<Cow<'_, [Output]>>;

    /// Final transaction; ancestors are finalized through `ctx`
    fn to_transaction(&self, ctx: &mut Finalizer<'_>) -> Result<Transaction>;
}

#[derive(Debug)]
pub enum TxNode {
    Builder(TransactionBuilder),
    Serial(SerialTransactionBuilder),
}

impl TxNode {
    fn source(&self) -> &dyn TransactionSource {
        match self {
            TxNode::Builder(b) => b,
            TxNode::Serial(s) => s,
        }
    }
}

impl TransactionSource for TxNode {
    fn network(&self) -> NetworkType {
        self.source().network()
    }

    fn is_ready(&self) -> bool {
        self.source().is_ready()
    }

    fn parents(&self) -> Vec<TxRef> {
        self.source().parents()
    }

    fn is_coinbase(&self) -> bool {
        self.source().is_coinbase()
    }

    fn inputs(&self) -> Result<Cow<'_, [Input]>> {
        self.source().inputs()
    }

    fn outputs(&self) -> Result<Cow<'_, [Output]>> {
        self.source().outputs()
    }

    fn to_transaction(&self, ctx: &mut Finalizer<'_>) -> Result<Transaction> {
        self.source().to_transaction(ctx)
    }
}

/// State of one finalization call
///
/// Each node is finalized at most once per call; a node met again while its
/// own finalization is still running closes a cycle.
pub struct Finalizer<'a> {
    registry: &'a TransactionRegistry,
    keystore: &'a KeyStore,
    finalized: HashMap<TxRef, Transaction>,
    in_progress: HashSet<TxRef>,
}

impl<'a> Finalizer<'a> {
    pub fn new(registry: &'a TransactionRegistry, keystore: &'a KeyStore) -> Self {
        Finalizer {
            registry,
            keystore,
            finalized: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &'a TransactionRegistry {
        self.registry
    }

    pub fn keystore(&self) -> &'a KeyStore {
        self.keystore
    }

    pub fn finalize(&mut self, tx: TxRef) -> Result<Transaction> {
        if let Some(done) = self.finalized.get(&tx) {
            return Ok(done.clone());
        }
        if !self.in_progress.insert(tx) {
            return Err(BuilderError::DependencyCycle(format!(
                "{} depends on itself",
                tx
            )));
        }

        let registry = self.registry;
        let result = registry.node(tx).and_then(|node| node.to_transaction(self));
        self.in_progress.remove(&tx);

        let finalized = result?;
        self.finalized.insert(tx, finalized.clone());
        Ok(finalized)
    }

    /// Script code signed for input `input_index` of `tx`
    pub fn script_code(&mut self, tx: TxRef, input_index: usize) -> Result<Vec<u8>> {
        let registry = self.registry;
        match registry.node(tx)? {
            TxNode::Builder(builder) => Ok(builder.script_code(input_index, self)?.0),
            TxNode::Serial(_) => Err(BuilderError::InvalidReference(format!(
                "{} wraps a serialized transaction whose spent outputs are unknown",
                tx
            ))),
        }
    }

    /// Script code for an input spending `origin` with `script`, and whether
    /// the spent output is pay-to-pubkey-hash
    ///
    /// Coinbase inputs sign nothing. A P2SH output is spent with its redeem
    /// program, which must hash to the committed script hash; any other
    /// output is spent with its locking bytes.
    pub(crate) fn script_code_for(
        &mut self,
        origin: InputOrigin,
        script: &InputScript,
    ) -> Result<(Vec<u8>, bool)> {
        let parent = match origin {
            InputOrigin::Coinbase => return Ok((Vec::new(), false)),
            InputOrigin::Parent(parent) => parent,
            InputOrigin::External(outpoint) => {
                return Err(BuilderError::InvalidReference(format!(
                    "output {}:{} is outside the registry",
                    hex::encode(outpoint.hash),
                    outpoint.index
                )))
            }
        };

        let parent_tx = self.finalize(parent.tx)?;
        let spent = parent_tx
            .outputs
            .get(parent.index as usize)
            .ok_or_else(|| {
                BuilderError::InvalidReference(format!(
                    "{} has {} outputs, no output {}",
                    parent.tx,
                    parent_tx.outputs.len(),
                    parent.index
                ))
            })?;

        if let Some(script_hash) = match_p2sh(&spent.script_pubkey) {
            let redeem = script.redeem().ok_or_else(|| {
                BuilderError::InvalidReference(format!(
                    "output {} of {} is pay-to-script-hash but the input carries no redeem script",
                    parent.index, parent.tx
                ))
            })?;
            let program = redeem.build()?;
            if hash160(&program) != script_hash {
                return Err(BuilderError::InvalidReference(format!(
                    "redeem script does not match the script hash of output {} of {}",
                    parent.index, parent.tx
                )));
            }
            return Ok((program, false));
        }

        let is_p2pkh = match_p2pkh(&spent.script_pubkey).is_some();
        Ok((spent.script_pubkey.clone(), is_p2pkh))
    }
}

/// Owner of every transaction node
#[derive(Debug, Default)]
pub struct TransactionRegistry {
    nodes: Vec<TxNode>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        TransactionRegistry::default()
    }

    pub fn add_builder(&mut self, builder: TransactionBuilder) -> TxRef {
        self.push(TxNode::Builder(builder))
    }

    pub fn add_serial(&mut self, serial: SerialTransactionBuilder) -> TxRef {
        self.push(TxNode::Serial(serial))
    }

    fn push(&mut self, node: TxNode) -> TxRef {
        let tx = TxRef(self.nodes.len());
        self.nodes.push(node);
        tx
    }

    pub fn node(&self, tx: TxRef) -> Result<&TxNode> {
        self.nodes
            .get(tx.0)
            .ok_or_else(|| BuilderError::InvalidReference(format!("{} is not registered", tx)))
    }

    pub fn builder(&self, tx: TxRef) -> Result<&TransactionBuilder> {
        match self.node(tx)? {
            TxNode::Builder(builder) => Ok(builder),
            TxNode::Serial(_) => Err(BuilderError::InvalidReference(format!(
                "{} is a serialized transaction",
                tx
            ))),
        }
    }

    pub fn builder_mut(&mut self, tx: TxRef) -> Result<&mut TransactionBuilder> {
        match self.nodes.get_mut(tx.0) {
            Some(TxNode::Builder(builder)) => Ok(builder),
            Some(TxNode::Serial(_)) => Err(BuilderError::InvalidReference(format!(
                "{} is a serialized transaction",
                tx
            ))),
            None => Err(BuilderError::InvalidReference(format!("{} is not registered", tx))),
        }
    }

    pub fn serial(&self, tx: TxRef) -> Result<&SerialTransactionBuilder> {
        match self.node(tx)? {
            TxNode::Serial(serial) => Ok(serial),
            TxNode::Builder(_) => Err(BuilderError::InvalidReference(format!(
                "{} is a deferred builder",
                tx
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = TxRef> {
        (0..self.nodes.len()).map(TxRef)
    }

    /// Bind a variable of the builder at `tx`, firing its hooks
    pub fn bind_variable(
        &mut self,
        tx: TxRef,
        name: &str,
        value: impl Into<crate::env::Value>,
    ) -> Result<()> {
        self.builder_mut(tx)?.bind_variable(name, value.into())
    }

    /// Whether `tx` and all of its ancestors are ready
    ///
    /// Dangling handles and dependency cycles make a node unready.
    pub fn is_ready(&self, tx: TxRef) -> bool {
        let mut visiting = HashSet::new();
        let mut memo = HashMap::new();
        self.ready_rec(tx, &mut visiting, &mut memo)
    }

    fn ready_rec(
        &self,
        tx: TxRef,
        visiting: &mut HashSet<TxRef>,
        memo: &mut HashMap<TxRef, bool>,
    ) -> bool {
        if let Some(&ready) = memo.get(&tx) {
            return ready;
        }
        if !visiting.insert(tx) {
            return false;
        }
        let ready = match self.nodes.get(tx.0) {
            Some(node) => {
                node.is_ready()
                    && node
                        .parents()
                        .into_iter()
                        .all(|parent| self.ready_rec(parent, visiting, memo))
            }
            None => false,
        };
        visiting.remove(&tx);
        memo.insert(tx, ready);
        ready
    }

    pub fn is_coinbase(&self, tx: TxRef) -> Result<bool> {
        Ok(self.node(tx)?.is_coinbase())
    }

    /// Finalize `tx`, finalizing each ancestor once
    pub fn to_transaction(&self, tx: TxRef, keystore: &KeyStore) -> Result<Transaction> {
        let finalized = Finalizer::new(self, keystore).finalize(tx)?;
        debug!(%tx, txid = %finalized.txid_hex(), "finalized transaction graph");
        Ok(finalized)
    }

    /// Script code signed for input `input_index` of `tx`
    pub fn script_code(&self, tx: TxRef, input_index: usize, keystore: &KeyStore) -> Result<Vec<u8>> {
        Finalizer::new(self, keystore).script_code(tx, input_index)
    }

    /// Whether two nodes finalize to the same transaction
    pub fn equivalent(&self, a: TxRef, b: TxRef, keystore: &KeyStore) -> Result<bool> {
        let mut ctx = Finalizer::new(self, keystore);
        Ok(ctx.finalize(a)? == ctx.finalize(b)?)
    }
}
