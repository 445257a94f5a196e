use proptest::prelude::*;

use deferred_tx::script::number::{decode_number, encode_number};
use deferred_tx::*;

#[derive(Debug, Clone)]
enum Piece {
    Op(u8),
    Data(Vec<u8>),
    Number(i64),
    Var(String, VarKind),
    SigById(String, SignatureModifier),
    SigByVar(String, SignatureModifier),
}

fn kind() -> impl Strategy<Value = VarKind> {
    prop_oneof![
        Just(VarKind::Number),
        Just(VarKind::Text),
        Just(VarKind::Flag),
        Just(VarKind::Digest),
        Just(VarKind::Signature),
    ]
}

fn modifier() -> impl Strategy<Value = SignatureModifier> {
    prop_oneof![
        Just(SignatureModifier::AllInputAllOutput),
        Just(SignatureModifier::AllInputSingleOutput),
        Just(SignatureModifier::AllInputNoOutput),
        Just(SignatureModifier::SingleInputAllOutput),
        Just(SignatureModifier::SingleInputSingleOutput),
        Just(SignatureModifier::SingleInputNoOutput),
    ]
}

fn piece() -> impl Strategy<Value = Piece> {
    prop_oneof![
        any::<u8>().prop_map(Piece::Op),
        prop::collection::vec(any::<u8>(), 0..80).prop_map(Piece::Data),
        any::<i64>().prop_map(Piece::Number),
        ("[a-z][a-z0-9_]{0,5}", kind()).prop_map(|(n, k)| Piece::Var(n, k)),
        ("[0-9a-f]{40}", modifier()).prop_map(|(id, m)| Piece::SigById(id, m)),
        ("[a-z][a-z0-9_]{0,5}", modifier()).prop_map(|(n, m)| Piece::SigByVar(n, m)),
    ]
}

/// Apply pieces, skipping the ones that clash with earlier declarations
fn assemble(pieces: &[Piece]) -> ScriptExpression<Unlocking> {
    let mut expr = ScriptExpression::new();
    for piece in pieces {
        match piece {
            Piece::Op(op) => {
                expr.op(*op);
            }
            Piece::Data(data) => {
                expr.data(data);
            }
            Piece::Number(n) => {
                expr.number(*n);
            }
            Piece::Var(name, kind) => {
                let _ = expr.declare_variable(name, *kind);
            }
            Piece::SigById(id, m) => {
                let _ = expr.signature(id, *m);
            }
            Piece::SigByVar(name, m) => {
                let _ = expr.declare_signature_placeholder(KeyRef::Variable(name.clone()), *m);
            }
        }
    }
    expr
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn script_text_roundtrip(pieces in prop::collection::vec(piece(), 0..24)) {
        let expr = assemble(&pieces);
        let text = expr.to_string();
        let parsed: ScriptExpression<Unlocking> = text.parse().unwrap();
        prop_assert_eq!(&parsed, &expr);
        prop_assert_eq!(parsed.to_string(), text);
        prop_assert_eq!(parsed.signature_count(), expr.signature_count());
    }

    #[test]
    fn script_serde_roundtrip(pieces in prop::collection::vec(piece(), 0..12)) {
        let expr = assemble(&pieces);
        let json = serde_json::to_string(&expr).unwrap();
        let back: ScriptExpression<Unlocking> = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, expr);
    }

    #[test]
    fn script_number_roundtrip(val in any::<i64>().prop_filter("i64::MIN has no 8-byte form", |v| *v != i64::MIN)) {
        prop_assert_eq!(decode_number(&encode_number(val)).unwrap(), val);
    }
}
