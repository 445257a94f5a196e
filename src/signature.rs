//! Sighash flags and detached transaction signatures

use std::fmt;

use secp256k1::{ecdsa, Message, Secp256k1};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{BuilderError, Result};
use crate::keys::{PrivateKey, PublicKey};
use crate::keystore::KeyStore;
use crate::registry::{Finalizer, TransactionRegistry, TxRef};
use crate::script::number::push_data_verbatim;
use crate::sighash::legacy_signature_hash;
use crate::types::Hash256;

/// Bit set on the sighash byte when only the signed input is committed to
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;

/// Which outputs a signature commits to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SighashType {
    All = 1,
    None = 2,
    Single = 3,
}

/// Input and output coverage of a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SignatureModifier {
    #[default]
    AllInputAllOutput,
    AllInputSingleOutput,
    AllInputNoOutput,
    SingleInputAllOutput,
    SingleInputSingleOutput,
    SingleInputNoOutput,
}

impl SignatureModifier {
    pub fn new(hash_type: SighashType, anyone_can_pay: bool) -> Self {
        use SignatureModifier::*;
        match (anyone_can_pay, hash_type) {
            (false, SighashType::All) => AllInputAllOutput,
            (false, SighashType::Single) => AllInputSingleOutput,
            (false, SighashType::None) => AllInputNoOutput,
            (true, SighashType::All) => SingleInputAllOutput,
            (true, SighashType::Single) => SingleInputSingleOutput,
            (true, SighashType::None) => SingleInputNoOutput,
        }
    }

    pub fn hash_type(self) -> SighashType {
        use SignatureModifier::*;
        match self {
            AllInputAllOutput | SingleInputAllOutput => SighashType::All,
            AllInputSingleOutput | SingleInputSingleOutput => SighashType::Single,
            AllInputNoOutput | SingleInputNoOutput => SighashType::None,
        }
    }

    pub fn anyone_can_pay(self) -> bool {
        matches!(
            self,
            SignatureModifier::SingleInputAllOutput
                | SignatureModifier::SingleInputSingleOutput
                | SignatureModifier::SingleInputNoOutput
        )
    }

    /// Byte appended to a DER signature
    pub fn sighash_byte(self) -> u8 {
        let base = self.hash_type() as u8;
        if self.anyone_can_pay() {
            base | SIGHASH_ANYONECANPAY
        } else {
            base
        }
    }

    /// Two-character code used in the script text form
    ///
    /// The first character is `*` for all inputs or `1` for anyone-can-pay,
    /// the second `*`, `0` or `1` for ALL, NONE or SINGLE.
    pub fn code(self) -> &'static str {
        use SignatureModifier::*;
        match self {
            AllInputAllOutput => "**",
            AllInputNoOutput => "*0",
            AllInputSingleOutput => "*1",
            SingleInputAllOutput => "1*",
            SingleInputNoOutput => "10",
            SingleInputSingleOutput => "11",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        let mut chars = code.chars();
        let (first, second) = match (chars.next(), chars.next(), chars.next()) {
            (Some(a), Some(b), None) => (a, b),
            _ => {
                return Err(BuilderError::SerializationFormat(format!(
                    "signature modifier must be two characters, got {:?}",
                    code
                )))
            }
        };
        let anyone_can_pay = match first {
            '*' => false,
            '1' => true,
            _ => {
                return Err(BuilderError::SerializationFormat(format!(
                    "bad input selector in modifier {:?}",
                    code
                )))
            }
        };
        let hash_type = match second {
            '*' => SighashType::All,
            '0' => SighashType::None,
            '1' => SighashType::Single,
            _ => {
                return Err(BuilderError::SerializationFormat(format!(
                    "bad output selector in modifier {:?}",
                    code
                )))
            }
        };
        Ok(SignatureModifier::new(hash_type, anyone_can_pay))
    }
}

impl fmt::Display for SignatureModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// DER signature with its sighash byte, plus the signer's key when known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    bytes: Vec<u8>,
    pubkey: Option<PublicKey>,
}

impl Signature {
    pub fn new(bytes: Vec<u8>, pubkey: Option<PublicKey>) -> Self {
        Signature { bytes, pubkey }
    }

    /// DER encoding followed by the sighash byte
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn pubkey(&self) -> Option<&PublicKey> {
        self.pubkey.as_ref()
    }

    pub fn sighash_byte(&self) -> Option<u8> {
        self.bytes.last().copied()
    }

    /// Script fragment: push of the signature, then of the key if present
    pub fn script_bytes(&self) -> Vec<u8> {
        let mut out = push_data_verbatim(&self.bytes);
        if let Some(pk) = &self.pubkey {
            out.extend(push_data_verbatim(&pk.to_bytes()));
        }
        out
    }

    /// Sign a signature hash and check the result against the signer's key
    pub(crate) fn sign(key: &PrivateKey, digest: &Hash256, sighash_byte: u8) -> Result<Self> {
        let secp = Secp256k1::new();
        let message = Message::from_digest_slice(digest)
            .map_err(|e| BuilderError::CryptoVerification(format!("bad digest: {}", e)))?;
        let mut sig = secp.sign_ecdsa(&message, key.secret());
        sig.normalize_s();

        let pubkey = key.public_key();
        secp.verify_ecdsa(&message, &sig, pubkey.inner()).map_err(|e| {
            BuilderError::CryptoVerification(format!(
                "fresh signature does not verify under {}: {}",
                pubkey, e
            ))
        })?;

        let mut bytes = sig.serialize_der().to_vec();
        bytes.push(sighash_byte);
        Ok(Signature {
            bytes,
            pubkey: Some(pubkey),
        })
    }

    /// Check this signature over `digest` against `pubkey`
    pub fn verify(&self, digest: &Hash256, pubkey: &PublicKey) -> bool {
        let der = match self.bytes.split_last() {
            Some((_, der)) => der,
            None => return false,
        };
        let sig = match ecdsa::Signature::from_der(der) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        let message = match Message::from_digest_slice(digest) {
            Ok(m) => m,
            Err(_) => return false,
        };
        Secp256k1::verification_only()
            .verify_ecdsa(&message, &sig, pubkey.inner())
            .is_ok()
    }

    /// Signature by `key` for input `input_index` of a registered transaction
    ///
    /// The transaction is finalized first, so it must already be ready; the
    /// script code is derived from the spent output as during signing.
    pub fn compute(
        registry: &TransactionRegistry,
        tx: TxRef,
        keystore: &KeyStore,
        input_index: usize,
        key: &PrivateKey,
        modifier: SignatureModifier,
    ) -> Result<Self> {
        let mut ctx = Finalizer::new(registry, keystore);
        let finalized = ctx.finalize(tx)?;
        let script_code = ctx.script_code(tx, input_index)?;
        let digest =
            legacy_signature_hash(&finalized, input_index, &script_code, modifier.sighash_byte())?;
        trace!(input_index, sighash = modifier.sighash_byte(), "computed detached signature");
        Signature::sign(key, &digest, modifier.sighash_byte())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sig:{}", hex::encode(&self.bytes))?;
        if let Some(pk) = &self.pubkey {
            write!(f, "[pubkey:{}]", pk)?;
        }
        Ok(())
    }
}
