//! Deferred transaction builder
//!
//! A [`TransactionBuilder`] collects inputs and outputs whose scripts may still
//! hold free variables and signature placeholders. Variables are declared on
//! the builder before any script may use them and can be bound at any later
//! point; hooks registered on sets of variables fire once the whole set is
//! bound.
//!
//! Finalization runs in two passes. Outputs reach their final bytes first,
//! since signatures commit to them; input scripts are signed and built last.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::debug;

use crate::constants::{SEQUENCE_FINAL, SEQUENCE_LOCKTIME_ENABLED};
use crate::env::{Env, Value, VarKind};
use crate::error::{BuilderError, Result};
use crate::io::{Input, Output};
use crate::keys::NetworkType;
use crate::registry::{Finalizer, TransactionSource, TxRef};
use crate::script::{check_variable_name, InputScript, OutputScript};
use crate::types::{OutPoint, Transaction, TransactionInput, TransactionOutput};

/// Callback fired once every variable of its set is bound
pub type BindingHook = Box<dyn FnOnce(&BTreeMap<String, Value>) + Send>;

pub struct TransactionBuilder {
    network: NetworkType,
    env: Env,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    locktime: Option<u32>,
    hooks: BTreeMap<BTreeSet<String>, BindingHook>,
}

impl fmt::Debug for TransactionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionBuilder")
            .field("network", &self.network)
            .field("env", &self.env)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("locktime", &self.locktime)
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Free variables of a script must be declared on the builder with the same kind
fn check_scope<'a>(
    env: &Env,
    vars: impl IntoIterator<Item = (&'a str, VarKind)>,
    what: &str,
) -> Result<()> {
    for (name, kind) in vars {
        match env.kind(name) {
            Some(declared) if declared == kind => {}
            Some(declared) => {
                return Err(BuilderError::Scope(format!(
                    "{} uses '{}' as {} but the transaction declares it {}",
                    what, name, kind, declared
                )))
            }
            None => {
                return Err(BuilderError::Scope(format!(
                    "{} uses '{}' which the transaction does not declare",
                    what, name
                )))
            }
        }
    }
    Ok(())
}

impl TransactionBuilder {
    pub fn new(network: NetworkType) -> Self {
        TransactionBuilder {
            network,
            env: Env::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            locktime: None,
            hooks: BTreeMap::new(),
        }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Declare a transaction-level variable
    pub fn add_variable(&mut self, name: &str, kind: VarKind) -> Result<&mut Self> {
        check_variable_name(name)?;
        self.env.declare(name, kind)?;
        Ok(self)
    }

    /// Bind a variable and fire every hook whose set is now fully bound
    pub fn bind_variable(&mut self, name: &str, value: Value) -> Result<()> {
        self.env.bind(name, value)?;

        let ready: Vec<BTreeSet<String>> = self
            .hooks
            .keys()
            .filter(|names| names.iter().all(|n| self.env.is_bound(n)))
            .cloned()
            .collect();

        for names in ready {
            let Some(hook) = self.hooks.remove(&names) else {
                continue;
            };
            let mut values = BTreeMap::new();
            for n in &names {
                values.insert(n.clone(), self.env.get(n)?.clone());
            }
            debug!(variables = ?names, "firing binding hook");
            hook(&values);
        }
        Ok(())
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.env.contains(name)
    }

    pub fn is_free(&self, name: &str) -> bool {
        self.env.is_free(name)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.env.is_bound(name)
    }

    pub fn value(&self, name: &str) -> Result<&Value> {
        self.env.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, VarKind)> + '_ {
        self.env.variables()
    }

    pub fn free_variables(&self) -> impl Iterator<Item = (&str, VarKind)> + '_ {
        self.env.free_variables()
    }

    fn is_referenced(&self, name: &str) -> bool {
        self.inputs.iter().any(|i| i.script().has_variable(name))
            || self.outputs.iter().any(|o| o.script().has_variable(name))
    }

    /// Remove a variable no script references; hooks naming it are dropped
    pub fn remove_variable(&mut self, name: &str) -> Result<()> {
        if self.is_referenced(name) {
            return Err(BuilderError::Declaration(format!(
                "variable '{}' is still used by a script",
                name
            )));
        }
        self.env.remove(name)?;
        self.hooks.retain(|names, _| !names.contains(name));
        Ok(())
    }

    /// Drop declarations that no input or output script references
    pub fn remove_unused_variables(&mut self) {
        let unused: Vec<String> = self
            .env
            .variables()
            .map(|(name, _)| name)
            .filter(|name| !self.is_referenced(name))
            .map(str::to_string)
            .collect();
        for name in unused {
            if self.env.remove(&name).is_ok() {
                self.hooks.retain(|names, _| !names.contains(&name));
            }
        }
    }

    /// Run `hook` once every variable in `names` is bound
    pub fn add_hook<I, S, F>(&mut self, names: I, hook: F) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(&BTreeMap<String, Value>) + Send + 'static,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(BuilderError::Declaration(
                "a hook needs at least one variable".to_string(),
            ));
        }
        for name in &names {
            if !self.env.contains(name) {
                return Err(BuilderError::Declaration(format!(
                    "hook on undeclared variable '{}'",
                    name
                )));
            }
            if self.env.is_bound(name) {
                return Err(BuilderError::Binding(format!(
                    "hook on variable '{}' which is already bound",
                    name
                )));
            }
        }
        if self.hooks.contains_key(&names) {
            return Err(BuilderError::Declaration(format!(
                "a hook on {:?} is already registered",
                names
            )));
        }
        self.hooks.insert(names, Box::new(hook));
        Ok(())
    }

    pub fn has_hook<I, S>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        self.hooks.contains_key(&names)
    }

    /// Append an input spending an output of another registered transaction
    pub fn add_input(&mut self, input: Input) -> Result<&mut Self> {
        if input.parent().is_none() {
            return Err(BuilderError::InvalidReference(
                "inputs must spend an output of a registered transaction; \
                 use add_coinbase_input for coinbase inputs"
                    .to_string(),
            ));
        }
        check_scope(&self.env, input.script().free_variables(), "input script")?;
        self.inputs.push(input);
        Ok(self)
    }

    /// Seed a root transaction with its single parentless input
    pub fn add_coinbase_input(&mut self, script: InputScript) -> Result<&mut Self> {
        if !self.inputs.is_empty() {
            return Err(BuilderError::InvalidReference(
                "a coinbase input must be the only input".to_string(),
            ));
        }
        check_scope(&self.env, script.free_variables(), "coinbase script")?;
        self.inputs.push(Input::coinbase(script));
        Ok(self)
    }

    pub fn add_output(&mut self, script: OutputScript, value: i64) -> Result<&mut Self> {
        check_scope(&self.env, script.free_variables(), "output script")?;
        let output = Output::new(script, value)?;
        self.outputs.push(output);
        Ok(self)
    }

    /// Absolute locktime: a block height below `LOCKTIME_THRESHOLD`, a UNIX time otherwise
    pub fn set_locktime(&mut self, locktime: u32) -> &mut Self {
        self.locktime = Some(locktime);
        self
    }

    pub fn locktime(&self) -> Option<u32> {
        self.locktime
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Copy of input script `index` with the builder's bindings pushed in
    pub fn prepared_input_script(&self, index: usize) -> Result<InputScript> {
        let input = self.inputs.get(index).ok_or_else(|| {
            BuilderError::InvalidReference(format!("no input {}", index))
        })?;
        let mut script = input.script().clone();
        for (name, value) in self.env.bound_variables() {
            script.bind_if_free(name, value)?;
        }
        Ok(script)
    }

    /// Copy of output script `index` with the builder's bindings pushed in
    pub fn prepared_output_script(&self, index: usize) -> Result<OutputScript> {
        let output = self.outputs.get(index).ok_or_else(|| {
            BuilderError::InvalidReference(format!("no output {}", index))
        })?;
        let mut script = output.script().clone();
        for (name, value) in self.env.bound_variables() {
            script.bind_if_free(name, value)?;
        }
        Ok(script)
    }

    /// Script code of input `index` and whether it spends a P2PKH output
    pub fn script_code(&self, index: usize, ctx: &mut Finalizer<'_>) -> Result<(Vec<u8>, bool)> {
        let script = self.prepared_input_script(index)?;
        let origin = self.inputs[index].origin();
        ctx.script_code_for(origin, &script)
    }

    fn sequence(&self, input: &Input) -> u32 {
        match (input.relative_locktime(), self.locktime) {
            (Some(relative), _) => relative.to_sequence(),
            (None, Some(_)) => SEQUENCE_LOCKTIME_ENABLED,
            (None, None) => SEQUENCE_FINAL,
        }
    }
}

impl TransactionSource for TransactionBuilder {
    fn network(&self) -> NetworkType {
        self.network
    }

    /// Every variable bound and at least one input and one output
    fn is_ready(&self) -> bool {
        !self.inputs.is_empty() && !self.outputs.is_empty() && self.env.is_ready()
    }

    fn parents(&self) -> Vec<TxRef> {
        self.inputs.iter().filter_map(Input::parent_tx).collect()
    }

    fn is_coinbase(&self) -> bool {
        matches!(self.inputs.as_slice(), [only] if only.is_coinbase())
    }

    fn inputs(&self) -> Result<Cow<'_, [Input]>> {
        Ok(Cow::Borrowed(&self.inputs))
    }

    fn outputs(&self) -> Result<Cow<'_, [Output]>> {
        Ok(Cow::Borrowed(&self.outputs))
    }

    fn to_transaction(&self, ctx: &mut Finalizer<'_>) -> Result<Transaction> {
        if !TransactionSource::is_ready(self) {
            let free: Vec<&str> = self.env.free_variables().map(|(n, _)| n).collect();
            return Err(BuilderError::NotReady(format!(
                "transaction has {} inputs, {} outputs and free variables {:?}",
                self.inputs.len(),
                self.outputs.len(),
                free
            )));
        }

        let mut tx = Transaction::shell();

        for input in &self.inputs {
            let prevout = match input.parent() {
                None => OutPoint::null(),
                Some(parent) => {
                    let parent_tx = ctx.finalize(parent.tx)?;
                    if parent.index as usize >= parent_tx.outputs.len() {
                        return Err(BuilderError::InvalidReference(format!(
                            "{} has {} outputs, no output {}",
                            parent.tx,
                            parent_tx.outputs.len(),
                            parent.index
                        )));
                    }
                    OutPoint {
                        hash: parent_tx.txid(),
                        index: parent.index,
                    }
                }
            };
            let sequence = if input.is_coinbase() {
                SEQUENCE_FINAL
            } else {
                self.sequence(input)
            };
            tx.inputs.push(TransactionInput {
                prevout,
                script_sig: Vec::new(),
                sequence,
                witness: Vec::new(),
            });
        }

        for index in 0..self.outputs.len() {
            let script = self.prepared_output_script(index)?;
            tx.outputs.push(TransactionOutput {
                value: self.outputs[index].value(),
                script_pubkey: script.locking_bytes()?,
            });
        }

        if let Some(locktime) = self.locktime {
            tx.lock_time = locktime;
        }

        // the shell now holds every byte a signature commits to
        let shell = tx.clone();
        for index in 0..self.inputs.len() {
            let mut script = self.prepared_input_script(index)?;
            let (script_code, is_p2pkh) =
                ctx.script_code_for(self.inputs[index].origin(), &script)?;
            script.set_all_signatures(ctx.keystore(), &shell, index, &script_code, is_p2pkh)?;
            if script.signature_count() != 0 {
                return Err(BuilderError::NotReady(format!(
                    "input {} still has {} signature placeholders",
                    index,
                    script.signature_count()
                )));
            }
            tx.inputs[index].script_sig = script.build()?;
        }

        debug!(
            txid = %tx.txid_hex(),
            inputs = tx.inputs.len(),
            outputs = tx.outputs.len(),
            "built transaction"
        );
        Ok(tx)
    }
}

impl fmt::Display for TransactionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "General info")?;
        writeln!(f, "    network: {}", self.network)?;
        writeln!(f, "    ready: {}", TransactionSource::is_ready(self))?;
        writeln!(f, "    coinbase: {}", TransactionSource::is_coinbase(self))?;
        match self.locktime {
            Some(locktime) => writeln!(f, "    locktime: {}", locktime)?,
            None => writeln!(f, "    locktime: none")?,
        }

        writeln!(f, "Variables")?;
        for (name, kind) in self.env.variables() {
            match self.env.get(name) {
                Ok(value) => writeln!(f, "    {}: {} = {}", name, kind, value)?,
                Err(_) => writeln!(f, "    {}: {} (free)", name, kind)?,
            }
        }

        writeln!(f, "Inputs")?;
        for (i, input) in self.inputs.iter().enumerate() {
            match input.parent() {
                Some(parent) => write!(f, "    [{}] {}:{}", i, parent.tx, parent.index)?,
                None => write!(f, "    [{}] coinbase", i)?,
            }
            if let Some(relative) = input.relative_locktime() {
                write!(f, " after {}", relative)?;
            }
            writeln!(f, " {}", input.script())?;
        }

        writeln!(f, "Outputs")?;
        for (i, output) in self.outputs.iter().enumerate() {
            writeln!(f, "    [{}] {} sat {}", i, output.value(), output.script())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::KeyStore;
    use crate::locktime::RelativeLocktime;
    use crate::registry::TransactionRegistry;
    use crate::script::{Locking, ScriptExpression};
    use std::sync::{Arc, Mutex};

    fn number_output(name: &str) -> OutputScript {
        let mut expr: ScriptExpression<Locking> = ScriptExpression::new();
        expr.declare_variable(name, VarKind::Number).unwrap().op(crate::opcodes::OP_EQUAL);
        OutputScript::raw(expr)
    }

    fn coinbase_builder() -> TransactionBuilder {
        let mut b = TransactionBuilder::new(NetworkType::Testnet);
        b.add_coinbase_input(InputScript::empty()).unwrap();
        b.add_output(OutputScript::op_return(b"root"), 50).unwrap();
        b
    }

    #[test]
    fn test_empty_builder_not_ready() {
        let mut b = TransactionBuilder::new(NetworkType::Testnet);
        assert!(!TransactionSource::is_ready(&b));
        b.add_output(OutputScript::op_return(b"x"), 0).unwrap();
        assert!(!TransactionSource::is_ready(&b));
        b.add_coinbase_input(InputScript::empty()).unwrap();
        assert!(TransactionSource::is_ready(&b));
    }

    #[test]
    fn test_scope_checked_on_insert() {
        let mut b = TransactionBuilder::new(NetworkType::Testnet);
        let err = b.add_output(number_output("n"), 1).unwrap_err();
        assert!(matches!(err, BuilderError::Scope(_)));
        assert!(b.outputs().is_empty());

        b.add_variable("n", VarKind::Text).unwrap();
        assert!(matches!(b.add_output(number_output("n"), 1), Err(BuilderError::Scope(_))));
    }

    #[test]
    fn test_hooks_fire_once_per_set() {
        let mut b = TransactionBuilder::new(NetworkType::Testnet);
        b.add_variable("a", VarKind::Number).unwrap();
        b.add_variable("b", VarKind::Number).unwrap();

        let fired: Arc<Mutex<Vec<BTreeMap<String, Value>>>> = Arc::default();
        let log = fired.clone();
        b.add_hook(["a"], move |v| log.lock().unwrap().push(v.clone())).unwrap();
        let log = fired.clone();
        b.add_hook(["a", "b"], move |v| log.lock().unwrap().push(v.clone())).unwrap();
        assert!(b.has_hook(["b", "a"]));

        b.bind_variable("a", Value::Number(1)).unwrap();
        assert_eq!(fired.lock().unwrap().len(), 1);
        assert_eq!(fired.lock().unwrap()[0].get("a"), Some(&Value::Number(1)));

        b.bind_variable("b", Value::Number(2)).unwrap();
        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[1].len(), 2);
        assert!(!b.has_hook(["a"]));
    }

    #[test]
    fn test_hook_rejections() {
        let mut b = TransactionBuilder::new(NetworkType::Testnet);
        b.add_variable("a", VarKind::Flag).unwrap();
        assert!(b.add_hook(Vec::<String>::new(), |_| {}).is_err());
        assert!(b.add_hook(["zzz"], |_| {}).is_err());
        b.add_hook(["a"], |_| {}).unwrap();
        assert!(matches!(b.add_hook(["a"], |_| {}), Err(BuilderError::Declaration(_))));
        b.bind_variable("a", Value::Flag(true)).unwrap();
        assert!(matches!(b.add_hook(["a"], |_| {}), Err(BuilderError::Binding(_))));
    }

    #[test]
    fn test_remove_variable_in_use() {
        let mut b = TransactionBuilder::new(NetworkType::Testnet);
        b.add_variable("n", VarKind::Number).unwrap();
        b.add_variable("unused", VarKind::Flag).unwrap();
        b.add_output(number_output("n"), 1).unwrap();
        assert!(matches!(b.remove_variable("n"), Err(BuilderError::Declaration(_))));
        b.remove_unused_variables();
        assert!(b.has_variable("n"));
        assert!(!b.has_variable("unused"));
    }

    #[test]
    fn test_coinbase_input_only_once() {
        let mut b = coinbase_builder();
        assert!(TransactionSource::is_coinbase(&b));
        assert!(b.add_coinbase_input(InputScript::empty()).is_err());
        assert!(b.add_input(Input::coinbase(InputScript::empty())).is_err());
    }

    #[test]
    fn test_sequence_numbers() {
        let mut registry = TransactionRegistry::new();
        let root = registry.add_builder(coinbase_builder());

        let mut child = TransactionBuilder::new(NetworkType::Testnet);
        child
            .add_input(Input::new(root, 0, InputScript::empty()))
            .unwrap()
            .add_input(
                Input::new(root, 0, InputScript::empty())
                    .with_relative_locktime(RelativeLocktime::from_blocks(6)),
            )
            .unwrap()
            .add_output(OutputScript::op_return(b"child"), 10)
            .unwrap();
        child.set_locktime(500);
        let child = registry.add_builder(child);

        let keystore = KeyStore::new("pw");
        let tx = registry.to_transaction(child, &keystore).unwrap();
        assert_eq!(tx.lock_time, 500);
        assert_eq!(tx.inputs[0].sequence, SEQUENCE_LOCKTIME_ENABLED);
        assert_eq!(tx.inputs[1].sequence, 6);
        let root_tx = registry.to_transaction(root, &keystore).unwrap();
        assert_eq!(tx.inputs[0].prevout.hash, root_tx.txid());
    }

    #[test]
    fn test_bindings_reach_output_scripts() {
        let mut b = coinbase_builder();
        b.add_variable("n", VarKind::Number).unwrap();
        b.add_output(number_output("n"), 1).unwrap();

        let mut registry = TransactionRegistry::new();
        let tx = registry.add_builder(b);
        let keystore = KeyStore::new("pw");
        assert!(matches!(
            registry.to_transaction(tx, &keystore),
            Err(BuilderError::NotReady(_))
        ));

        registry.bind_variable(tx, "n", 3i64).unwrap();
        let built = registry.to_transaction(tx, &keystore).unwrap();
        assert_eq!(built.outputs[1].script_pubkey, vec![0x53, crate::opcodes::OP_EQUAL]);
        // the builder's own script keeps its free declaration
        let builder = registry.builder(tx).unwrap();
        assert!(builder.outputs()[1].script().expr().env().is_free("n"));
    }

    #[test]
    fn test_display_sections() {
        let text = coinbase_builder().to_string();
        for section in ["General info", "Variables", "Inputs", "Outputs"] {
            assert!(text.contains(section));
        }
        assert!(text.contains("coinbase"));
    }
}
