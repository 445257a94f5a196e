//! Script opcodes and their mnemonics

pub const OP_0: u8 = 0x00;
pub const OP_FALSE: u8 = OP_0;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_RESERVED: u8 = 0x50;
pub const OP_1: u8 = 0x51;
pub const OP_TRUE: u8 = OP_1;
pub const OP_16: u8 = 0x60;
pub const OP_NOP: u8 = 0x61;
pub const OP_IF: u8 = 0x63;
pub const OP_NOTIF: u8 = 0x64;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_TOALTSTACK: u8 = 0x6b;
pub const OP_FROMALTSTACK: u8 = 0x6c;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_SWAP: u8 = 0x7c;
pub const OP_SIZE: u8 = 0x82;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_ADD: u8 = 0x93;
pub const OP_SUB: u8 = 0x94;
pub const OP_BOOLAND: u8 = 0x9a;
pub const OP_BOOLOR: u8 = 0x9b;
pub const OP_NUMEQUAL: u8 = 0x9c;
pub const OP_WITHIN: u8 = 0xa5;
pub const OP_RIPEMD160: u8 = 0xa6;
pub const OP_SHA1: u8 = 0xa7;
pub const OP_SHA256: u8 = 0xa8;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_HASH256: u8 = 0xaa;
pub const OP_CODESEPARATOR: u8 = 0xab;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;
pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
pub const OP_CHECKSEQUENCEVERIFY: u8 = 0xb2;
pub const OP_INVALIDOPCODE: u8 = 0xff;

const NAMES: &[(u8, &str)] = &[
    (0x4c, "PUSHDATA1"),
    (0x4d, "PUSHDATA2"),
    (0x4e, "PUSHDATA4"),
    (0x50, "RESERVED"),
    (0x61, "NOP"),
    (0x62, "VER"),
    (0x63, "IF"),
    (0x64, "NOTIF"),
    (0x65, "VERIF"),
    (0x66, "VERNOTIF"),
    (0x67, "ELSE"),
    (0x68, "ENDIF"),
    (0x69, "VERIFY"),
    (0x6a, "RETURN"),
    (0x6b, "TOALTSTACK"),
    (0x6c, "FROMALTSTACK"),
    (0x6d, "2DROP"),
    (0x6e, "2DUP"),
    (0x6f, "3DUP"),
    (0x70, "2OVER"),
    (0x71, "2ROT"),
    (0x72, "2SWAP"),
    (0x73, "IFDUP"),
    (0x74, "DEPTH"),
    (0x75, "DROP"),
    (0x76, "DUP"),
    (0x77, "NIP"),
    (0x78, "OVER"),
    (0x79, "PICK"),
    (0x7a, "ROLL"),
    (0x7b, "ROT"),
    (0x7c, "SWAP"),
    (0x7d, "TUCK"),
    (0x7e, "CAT"),
    (0x7f, "SUBSTR"),
    (0x80, "LEFT"),
    (0x81, "RIGHT"),
    (0x82, "SIZE"),
    (0x83, "INVERT"),
    (0x84, "AND"),
    (0x85, "OR"),
    (0x86, "XOR"),
    (0x87, "EQUAL"),
    (0x88, "EQUALVERIFY"),
    (0x89, "RESERVED1"),
    (0x8a, "RESERVED2"),
    (0x8b, "1ADD"),
    (0x8c, "1SUB"),
    (0x8d, "2MUL"),
    (0x8e, "2DIV"),
    (0x8f, "NEGATE"),
    (0x90, "ABS"),
    (0x91, "NOT"),
    (0x92, "0NOTEQUAL"),
    (0x93, "ADD"),
    (0x94, "SUB"),
    (0x95, "MUL"),
    (0x96, "DIV"),
    (0x97, "MOD"),
    (0x98, "LSHIFT"),
    (0x99, "RSHIFT"),
    (0x9a, "BOOLAND"),
    (0x9b, "BOOLOR"),
    (0x9c, "NUMEQUAL"),
    (0x9d, "NUMEQUALVERIFY"),
    (0x9e, "NUMNOTEQUAL"),
    (0x9f, "LESSTHAN"),
    (0xa0, "GREATERTHAN"),
    (0xa1, "LESSTHANOREQUAL"),
    (0xa2, "GREATERTHANOREQUAL"),
    (0xa3, "MIN"),
    (0xa4, "MAX"),
    (0xa5, "WITHIN"),
    (0xa6, "RIPEMD160"),
    (0xa7, "SHA1"),
    (0xa8, "SHA256"),
    (0xa9, "HASH160"),
    (0xaa, "HASH256"),
    (0xab, "CODESEPARATOR"),
    (0xac, "CHECKSIG"),
    (0xad, "CHECKSIGVERIFY"),
    (0xae, "CHECKMULTISIG"),
    (0xaf, "CHECKMULTISIGVERIFY"),
    (0xb0, "NOP1"),
    (0xb1, "CHECKLOCKTIMEVERIFY"),
    (0xb2, "CHECKSEQUENCEVERIFY"),
    (0xb3, "NOP4"),
    (0xb4, "NOP5"),
    (0xb5, "NOP6"),
    (0xb6, "NOP7"),
    (0xb7, "NOP8"),
    (0xb8, "NOP9"),
    (0xb9, "NOP10"),
    (0xff, "INVALIDOPCODE"),
];

/// Mnemonic of an opcode without the `OP_` prefix, if it has one
pub fn opcode_name(op: u8) -> Option<&'static str> {
    NAMES.iter().find(|(code, _)| *code == op).map(|(_, name)| *name)
}

/// Opcode for a mnemonic, accepted with or without the `OP_` prefix
pub fn opcode_from_name(name: &str) -> Option<u8> {
    let bare = name.strip_prefix("OP_").unwrap_or(name);
    match bare {
        "FALSE" => return Some(OP_FALSE),
        "TRUE" => return Some(OP_TRUE),
        "CLTV" => return Some(OP_CHECKLOCKTIMEVERIFY),
        "CSV" => return Some(OP_CHECKSEQUENCEVERIFY),
        _ => {}
    }
    NAMES.iter().find(|(_, n)| *n == bare).map(|(code, _)| *code)
}

/// True for OP_0, OP_1NEGATE and OP_1..OP_16
pub fn is_small_number(op: u8) -> bool {
    op == OP_0 || op == OP_1NEGATE || (OP_1..=OP_16).contains(&op)
}

/// Value pushed by a small-number opcode
pub fn decode_op_n(op: u8) -> Option<i64> {
    match op {
        OP_0 => Some(0),
        OP_1NEGATE => Some(-1),
        OP_1..=OP_16 => Some((op - OP_1) as i64 + 1),
        _ => None,
    }
}

/// Small-number opcode pushing `value`, for -1..=16
pub fn encode_op_n(value: i64) -> Option<u8> {
    match value {
        0 => Some(OP_0),
        -1 => Some(OP_1NEGATE),
        1..=16 => Some(OP_1 + (value as u8) - 1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_lookup_both_ways() {
        assert_eq!(opcode_name(OP_DUP), Some("DUP"));
        assert_eq!(opcode_from_name("DUP"), Some(OP_DUP));
        assert_eq!(opcode_from_name("OP_HASH160"), Some(OP_HASH160));
        assert_eq!(opcode_from_name("CSV"), Some(OP_CHECKSEQUENCEVERIFY));
        assert_eq!(opcode_from_name("NOT_AN_OPCODE"), None);
    }

    #[test]
    fn test_small_numbers() {
        for n in -1..=16 {
            let op = encode_op_n(n).unwrap();
            assert!(is_small_number(op));
            assert_eq!(decode_op_n(op), Some(n));
        }
        assert_eq!(encode_op_n(17), None);
        assert_eq!(encode_op_n(-2), None);
        assert!(!is_small_number(OP_NOP));
    }
}
