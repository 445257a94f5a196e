//! Digest values bound to `Digest` variables

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use ripemd::Ripemd160;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};

use crate::env::Value;
use crate::error::{BuilderError, Result};

/// Hash function applied by [`Hash::of`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Sha256,
    Ripemd160,
    /// RIPEMD160(SHA256(x))
    Hash160,
    /// SHA256(SHA256(x))
    Hash256,
}

/// Owned digest bytes
///
/// Orders by length first, then by unsigned magnitude of the bytes.
#[derive(Debug, Clone, PartialEq, Eq, std::hash::Hash)]
pub struct Hash {
    bytes: Vec<u8>,
}

impl Hash {
    pub fn new(bytes: Vec<u8>) -> Self {
        Hash { bytes }
    }

    pub fn sha256(data: &[u8]) -> Self {
        Hash::new(Sha256::digest(data).to_vec())
    }

    pub fn ripemd160(data: &[u8]) -> Self {
        Hash::new(Ripemd160::digest(data).to_vec())
    }

    pub fn hash160(data: &[u8]) -> Self {
        Hash::new(hash160(data).to_vec())
    }

    pub fn hash256(data: &[u8]) -> Self {
        Hash::new(Sha256::digest(Sha256::digest(data)).to_vec())
    }

    pub fn digest(data: &[u8], algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Hash::sha256(data),
            HashAlgorithm::Ripemd160 => Hash::ripemd160(data),
            HashAlgorithm::Hash160 => Hash::hash160(data),
            HashAlgorithm::Hash256 => Hash::hash256(data),
        }
    }

    /// Hash a value's canonical byte form
    ///
    /// Numbers hash as script-number bytes, flags as `[1]` or `[]`, text as
    /// UTF-8 and digests as their own bytes, which matches what the hashing
    /// opcodes see on the stack. Signatures have no canonical preimage.
    pub fn of(value: &Value, algorithm: HashAlgorithm) -> Result<Self> {
        let preimage = match value {
            Value::Number(n) => crate::script::number::encode_number(*n),
            Value::Flag(true) => vec![1],
            Value::Flag(false) => Vec::new(),
            Value::Text(s) => s.as_bytes().to_vec(),
            Value::Digest(h) => h.bytes.clone(),
            Value::Signature(_) => {
                return Err(BuilderError::Binding(
                    "signature values cannot be hashed".to_string(),
                ))
            }
        };
        Ok(Hash::digest(&preimage, algorithm))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(Sha256::digest(data)));
    out
}

impl From<Vec<u8>> for Hash {
    fn from(bytes: Vec<u8>) -> Self {
        Hash::new(bytes)
    }
}

impl Ord for Hash {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes
            .len()
            .cmp(&other.bytes.len())
            .then_with(|| self.bytes.cmp(&other.bytes))
    }
}

impl PartialOrd for Hash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = BuilderError;

    fn from_str(s: &str) -> Result<Self> {
        hex::decode(s)
            .map(Hash::new)
            .map_err(|e| BuilderError::Encoding(format!("invalid digest hex {:?}: {}", s, e)))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            Hash::sha256(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            Hash::ripemd160(b"").to_hex(),
            "9c1185a5c5e9fc54612808977ee8f548b2258d31"
        );
        assert_eq!(
            Hash::hash256(b"").to_hex(),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
        assert_eq!(Hash::hash160(b"abc").len(), 20);
    }

    #[test]
    fn test_hash_of_values() {
        let text = Hash::of(&Value::Text("abc".to_string()), HashAlgorithm::Sha256).unwrap();
        assert_eq!(text, Hash::sha256(b"abc"));

        let number = Hash::of(&Value::Number(1000), HashAlgorithm::Sha256).unwrap();
        assert_eq!(number, Hash::sha256(&[0xe8, 0x03]));

        let flag = Hash::of(&Value::Flag(false), HashAlgorithm::Sha256).unwrap();
        assert_eq!(flag, Hash::sha256(b""));
    }

    #[test]
    fn test_ordering_length_then_magnitude() {
        let short = Hash::new(vec![0xff]);
        let long = Hash::new(vec![0x00, 0x00]);
        assert!(short < long);
        assert!(Hash::new(vec![0x01, 0x00]) < Hash::new(vec![0x01, 0x01]));
    }

    #[test]
    fn test_hex_round_trip_and_serde() {
        let h = Hash::sha256(b"x");
        assert_eq!(h.to_string().parse::<Hash>().unwrap(), h);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(serde_json::from_str::<Hash>(&json).unwrap(), h);
        assert!("zz".parse::<Hash>().is_err());
    }
}
