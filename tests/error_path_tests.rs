//! Tests for error paths and edge cases

use deferred_tx::opcodes::*;
use deferred_tx::*;

fn key(byte: u8) -> PrivateKey {
    PrivateKey::from_bytes(&[byte; 32], NetworkType::Testnet).unwrap()
}

fn root_paying(script: OutputScript) -> TransactionBuilder {
    let mut b = TransactionBuilder::new(NetworkType::Testnet);
    b.add_coinbase_input(InputScript::empty()).unwrap();
    b.add_output(script, 1_000).unwrap();
    b
}

#[test]
fn test_binding_errors() {
    let mut b = TransactionBuilder::new(NetworkType::Testnet);
    b.add_variable("x", VarKind::Number).unwrap();

    assert!(matches!(
        b.bind_variable("nope", Value::Number(1)),
        Err(BuilderError::Binding(_))
    ));
    assert!(matches!(
        b.bind_variable("x", Value::Flag(true)),
        Err(BuilderError::Binding(_))
    ));
    b.bind_variable("x", Value::Number(1)).unwrap();
    assert!(matches!(
        b.bind_variable("x", Value::Number(2)),
        Err(BuilderError::Binding(_))
    ));
    assert_eq!(b.value("x").unwrap(), &Value::Number(1));
}

#[test]
fn test_declaration_errors() {
    let mut b = TransactionBuilder::new(NetworkType::Testnet);
    b.add_variable("x", VarKind::Number).unwrap();
    b.add_variable("x", VarKind::Number).unwrap();
    assert!(matches!(
        b.add_variable("x", VarKind::Digest),
        Err(BuilderError::Declaration(_))
    ));
    assert!(matches!(
        b.add_variable("bad name", VarKind::Digest),
        Err(BuilderError::Declaration(_))
    ));
}

#[test]
fn test_rejected_input_adds_nothing() {
    let mut registry = TransactionRegistry::new();
    let root = registry.add_builder(root_paying(OutputScript::op_return(b"r")));

    let mut unlock: ScriptExpression<Unlocking> = ScriptExpression::new();
    unlock.declare_variable("secret", VarKind::Text).unwrap();
    let mut b = TransactionBuilder::new(NetworkType::Testnet);
    let err = b
        .add_input(Input::new(root, 0, InputScript::standard(unlock)))
        .unwrap_err();
    assert!(matches!(err, BuilderError::Scope(_)));
    assert!(b.inputs().is_empty());
}

#[test]
fn test_not_ready_without_inputs_or_outputs() {
    let keystore = KeyStore::new("pw");
    let mut registry = TransactionRegistry::new();

    let mut no_outputs = TransactionBuilder::new(NetworkType::Testnet);
    no_outputs.add_coinbase_input(InputScript::empty()).unwrap();
    let no_outputs = registry.add_builder(no_outputs);

    let mut no_inputs = TransactionBuilder::new(NetworkType::Testnet);
    no_inputs.add_output(OutputScript::op_return(b"x"), 0).unwrap();
    let no_inputs = registry.add_builder(no_inputs);

    for tx in [no_outputs, no_inputs] {
        assert!(!registry.is_ready(tx));
        assert!(matches!(
            registry.to_transaction(tx, &keystore),
            Err(BuilderError::NotReady(_))
        ));
    }
}

#[test]
fn test_unready_parent_blocks_child() {
    let keystore = KeyStore::new("pw");
    let mut registry = TransactionRegistry::new();

    let mut root = TransactionBuilder::new(NetworkType::Testnet);
    root.add_variable("later", VarKind::Flag).unwrap();
    root.add_coinbase_input(InputScript::empty()).unwrap();
    root.add_output(OutputScript::op_return(b"r"), 10).unwrap();
    let root = registry.add_builder(root);

    let mut child = TransactionBuilder::new(NetworkType::Testnet);
    child
        .add_input(Input::new(root, 0, InputScript::empty()))
        .unwrap()
        .add_output(OutputScript::op_return(b"c"), 5)
        .unwrap();
    let child = registry.add_builder(child);

    assert!(!registry.is_ready(child));
    assert!(registry.to_transaction(child, &keystore).is_err());

    registry.bind_variable(root, "later", true).unwrap();
    assert!(registry.is_ready(child));
    assert!(registry.to_transaction(child, &keystore).is_ok());
}

#[test]
fn test_dependency_cycle_detected() {
    let keystore = KeyStore::new("pw");
    let mut registry = TransactionRegistry::new();

    let mut a = TransactionBuilder::new(NetworkType::Testnet);
    a.add_output(OutputScript::op_return(b"a"), 1).unwrap();
    let a = registry.add_builder(a);

    let mut b = TransactionBuilder::new(NetworkType::Testnet);
    b.add_input(Input::new(a, 0, InputScript::empty()))
        .unwrap()
        .add_output(OutputScript::op_return(b"b"), 1)
        .unwrap();
    let b = registry.add_builder(b);

    registry
        .builder_mut(a)
        .unwrap()
        .add_input(Input::new(b, 0, InputScript::empty()))
        .unwrap();

    assert!(!registry.is_ready(a));
    assert!(!registry.is_ready(b));
    assert!(matches!(
        registry.to_transaction(a, &keystore),
        Err(BuilderError::DependencyCycle(_))
    ));
}

#[test]
fn test_invalid_references() {
    let keystore = KeyStore::new("pw");
    let mut registry = TransactionRegistry::new();
    let root = registry.add_builder(root_paying(OutputScript::op_return(b"r")));

    let mut other = TransactionRegistry::new();
    for _ in 0..4 {
        other.add_builder(root_paying(OutputScript::op_return(b"o")));
    }
    let foreign = other.add_builder(root_paying(OutputScript::op_return(b"f")));

    let mut past_end = TransactionBuilder::new(NetworkType::Testnet);
    past_end
        .add_input(Input::new(root, 7, InputScript::empty()))
        .unwrap()
        .add_output(OutputScript::op_return(b"x"), 1)
        .unwrap();
    let past_end = registry.add_builder(past_end);
    assert!(matches!(
        registry.to_transaction(past_end, &keystore),
        Err(BuilderError::InvalidReference(_))
    ));

    assert!(!registry.is_ready(foreign));
    assert!(matches!(
        registry.to_transaction(foreign, &keystore),
        Err(BuilderError::InvalidReference(_))
    ));
}

#[test]
fn test_p2sh_output_needs_matching_redeem() {
    let keystore = KeyStore::new("pw");
    let mut locked: ScriptExpression<Locking> = ScriptExpression::new();
    locked.number(7).op(OP_EQUAL);
    let mut registry = TransactionRegistry::new();
    let root = registry.add_builder(root_paying(OutputScript::p2sh(locked)));

    let mut plain = TransactionBuilder::new(NetworkType::Testnet);
    plain
        .add_input(Input::new(root, 0, InputScript::empty()))
        .unwrap()
        .add_output(OutputScript::op_return(b"x"), 1)
        .unwrap();
    let plain = registry.add_builder(plain);
    assert!(matches!(
        registry.to_transaction(plain, &keystore),
        Err(BuilderError::InvalidReference(_))
    ));

    let mut wrong: ScriptExpression<Locking> = ScriptExpression::new();
    wrong.number(8).op(OP_EQUAL);
    let mut unlock: ScriptExpression<Unlocking> = ScriptExpression::new();
    unlock.number(7);
    let mut mismatched = TransactionBuilder::new(NetworkType::Testnet);
    mismatched
        .add_input(Input::new(
            root,
            0,
            InputScript::p2sh(unlock, OutputScript::p2sh(wrong)).unwrap(),
        ))
        .unwrap()
        .add_output(OutputScript::op_return(b"x"), 1)
        .unwrap();
    let mismatched = registry.add_builder(mismatched);
    assert!(matches!(
        registry.to_transaction(mismatched, &keystore),
        Err(BuilderError::InvalidReference(_))
    ));
}

#[test]
fn test_missing_signing_key() {
    let owner = key(9);
    let mut registry = TransactionRegistry::new();
    let root = registry.add_builder(root_paying(OutputScript::p2pkh(&owner.address())));

    let mut unlock: ScriptExpression<Unlocking> = ScriptExpression::new();
    unlock
        .signature(&KeyStore::key_id(&owner), SignatureModifier::AllInputAllOutput)
        .unwrap();
    let mut spend = TransactionBuilder::new(NetworkType::Testnet);
    spend
        .add_input(Input::new(root, 0, InputScript::standard(unlock)))
        .unwrap()
        .add_output(OutputScript::op_return(b"x"), 1)
        .unwrap();
    let spend = registry.add_builder(spend);

    assert!(registry.is_ready(spend));
    assert!(matches!(
        registry.to_transaction(spend, &KeyStore::new("pw")),
        Err(BuilderError::KeyNotFound(_))
    ));
}

#[test]
fn test_output_amount_out_of_range() {
    let mut b = TransactionBuilder::new(NetworkType::Testnet);
    assert!(matches!(
        b.add_output(OutputScript::op_return(b"x"), -5),
        Err(BuilderError::InvalidAmount(_))
    ));
    assert!(matches!(
        b.add_output(OutputScript::op_return(b"x"), constants::MAX_MONEY + 1),
        Err(BuilderError::InvalidAmount(_))
    ));
    assert!(b.outputs().is_empty());
}

#[test]
fn test_script_code_of_serial_node() {
    let keystore = KeyStore::new("pw");
    let mut scratch = TransactionRegistry::new();
    let seed = scratch.add_builder(root_paying(OutputScript::op_return(b"s")));
    let bytes = scratch.to_transaction(seed, &keystore).unwrap().to_bytes();

    let mut registry = TransactionRegistry::new();
    let serial = registry.add_serial(SerialTransactionBuilder::new(NetworkType::Testnet, bytes).unwrap());
    assert!(matches!(
        registry.script_code(serial, 0, &keystore),
        Err(BuilderError::InvalidReference(_))
    ));
    assert!(registry.builder(serial).is_err());
}
