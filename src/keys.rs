//! Private keys, public keys and P2PKH addresses
//!
//! Keys are secp256k1; public keys are always handled in compressed form.
//! Addresses and WIF strings are base58check with the network's version byte.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use secp256k1::{Secp256k1, SecretKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{BuilderError, Result};
use crate::hash::hash160;
use crate::opcodes::*;

/// Network a key or address belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NetworkType {
    Mainnet,
    #[default]
    Testnet,
}

impl NetworkType {
    pub fn address_version(self) -> u8 {
        match self {
            NetworkType::Mainnet => 0x00,
            NetworkType::Testnet => 0x6f,
        }
    }

    pub fn script_hash_version(self) -> u8 {
        match self {
            NetworkType::Mainnet => 0x05,
            NetworkType::Testnet => 0xc4,
        }
    }

    pub fn wif_version(self) -> u8 {
        match self {
            NetworkType::Mainnet => 0x80,
            NetworkType::Testnet => 0xef,
        }
    }

    fn from_address_version(version: u8) -> Option<Self> {
        match version {
            0x00 => Some(NetworkType::Mainnet),
            0x6f => Some(NetworkType::Testnet),
            _ => None,
        }
    }

    fn from_wif_version(version: u8) -> Option<Self> {
        match version {
            0x80 => Some(NetworkType::Mainnet),
            0xef => Some(NetworkType::Testnet),
            _ => None,
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkType::Mainnet => f.write_str("mainnet"),
            NetworkType::Testnet => f.write_str("testnet"),
        }
    }
}

/// secp256k1 private key tagged with its network
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    secret: SecretKey,
    network: NetworkType,
}

impl PrivateKey {
    pub fn from_bytes(bytes: &[u8], network: NetworkType) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| BuilderError::Encoding(format!("invalid private key: {}", e)))?;
        Ok(PrivateKey { secret, network })
    }

    /// Fresh key from the operating system RNG
    pub fn generate(network: NetworkType) -> Self {
        let mut rng = rand::rngs::OsRng;
        let mut bytes = [0u8; 32];
        loop {
            rng.fill_bytes(&mut bytes);
            // out-of-range scalars are astronomically rare, draw again
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                return PrivateKey { secret, network };
            }
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    pub fn network(&self) -> NetworkType {
        self.network
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::signing_only();
        PublicKey(secp256k1::PublicKey::from_secret_key(&secp, &self.secret))
    }

    pub fn address(&self) -> Address {
        self.public_key().address(self.network)
    }

    /// Wallet import format, compressed-key flavor
    pub fn to_wif(&self) -> String {
        let mut payload = Vec::with_capacity(34);
        payload.push(self.network.wif_version());
        payload.extend_from_slice(&self.secret.secret_bytes());
        payload.push(0x01);
        bs58::encode(payload).with_check().into_string()
    }

    pub fn from_wif(wif: &str) -> Result<Self> {
        let payload = bs58::decode(wif)
            .with_check(None)
            .into_vec()
            .map_err(|e| BuilderError::Encoding(format!("invalid WIF: {}", e)))?;
        let network = payload
            .first()
            .and_then(|v| NetworkType::from_wif_version(*v))
            .ok_or_else(|| BuilderError::Encoding("unknown WIF version byte".to_string()))?;
        match payload.len() {
            33 => PrivateKey::from_bytes(&payload[1..33], network),
            34 if payload[33] == 0x01 => PrivateKey::from_bytes(&payload[1..33], network),
            n => Err(BuilderError::Encoding(format!("WIF payload of {} bytes", n))),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key())
            .field("network", &self.network)
            .finish()
    }
}

/// Compressed secp256k1 public key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(secp256k1::PublicKey);

impl PublicKey {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        secp256k1::PublicKey::from_slice(bytes)
            .map(PublicKey)
            .map_err(|e| BuilderError::Encoding(format!("invalid public key: {}", e)))
    }

    /// 33-byte compressed encoding
    pub fn to_bytes(&self) -> [u8; 33] {
        self.0.serialize()
    }

    pub fn pubkey_hash(&self) -> [u8; 20] {
        hash160(&self.to_bytes())
    }

    pub fn address(&self, network: NetworkType) -> Address {
        Address::new(self.pubkey_hash(), network)
    }

    pub(crate) fn inner(&self) -> &secp256k1::PublicKey {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_bytes()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        PublicKey::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Pay-to-pubkey-hash address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pubkey_hash: [u8; 20],
    network: NetworkType,
}

impl Address {
    pub fn new(pubkey_hash: [u8; 20], network: NetworkType) -> Self {
        Address { pubkey_hash, network }
    }

    pub fn pubkey_hash(&self) -> &[u8; 20] {
        &self.pubkey_hash
    }

    pub fn network(&self) -> NetworkType {
        self.network
    }

    /// DUP HASH160 <pubkey hash> EQUALVERIFY CHECKSIG
    pub fn script_pubkey(&self) -> Vec<u8> {
        let mut script = Vec::with_capacity(25);
        script.push(OP_DUP);
        script.push(OP_HASH160);
        script.push(20);
        script.extend_from_slice(&self.pubkey_hash);
        script.push(OP_EQUALVERIFY);
        script.push(OP_CHECKSIG);
        script
    }

    pub fn to_base58(&self) -> String {
        let mut payload = Vec::with_capacity(21);
        payload.push(self.network.address_version());
        payload.extend_from_slice(&self.pubkey_hash);
        bs58::encode(payload).with_check().into_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl FromStr for Address {
    type Err = BuilderError;

    fn from_str(s: &str) -> Result<Self> {
        let payload = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| BuilderError::Encoding(format!("invalid address {:?}: {}", s, e)))?;
        if payload.len() != 21 {
            return Err(BuilderError::Encoding(format!(
                "address payload of {} bytes",
                payload.len()
            )));
        }
        let network = NetworkType::from_address_version(payload[0]).ok_or_else(|| {
            BuilderError::Encoding(format!("unsupported address version {:#04x}", payload[0]))
        })?;
        let mut pubkey_hash = [0u8; 20];
        pubkey_hash.copy_from_slice(&payload[1..]);
        Ok(Address { pubkey_hash, network })
    }
}
