//! # Deferred-TX
//!
//! Bitcoin transactions that can be described before everything needed to
//! finalize them is known.
//!
//! Amounts, redeem conditions and signatures may stay symbolic as free
//! variables and signature placeholders inside script expressions. They are
//! bound over time, and a transaction graph is finalized on demand: parents
//! first, then each transaction's outputs, then its signed inputs.
//!
//! ## Architecture
//!
//! - [`env`]: typed single-assignment variable tables
//! - [`script`]: script expressions, input and output scripts, text form
//! - [`builder`]: the deferred [`TransactionBuilder`]
//! - [`serial`]: settled transactions wrapped as graph leaves
//! - [`registry`]: the arena that owns every node and finalizes the graph
//! - [`keystore`]: password-sealed private keys addressed by content
//! - [`sighash`] and [`signature`]: legacy signature hashes and ECDSA signing
//! - [`encoding`] and [`transaction`]: the wire format
//!
//! ## Usage
//!
//! ```rust
//! use deferred_tx::{
//!     InputScript, KeyStore, NetworkType, OutputScript, PrivateKey, SerialTransactionBuilder,
//!     TransactionBuilder, TransactionRegistry, TransactionSource,
//! };
//!
//! let key = PrivateKey::from_bytes(&[7u8; 32], NetworkType::Testnet).unwrap();
//! let mut builder = TransactionBuilder::new(NetworkType::Testnet);
//! builder.add_coinbase_input(InputScript::empty()).unwrap();
//! builder.add_output(OutputScript::p2pkh(&key.address()), 50_000).unwrap();
//!
//! let mut registry = TransactionRegistry::new();
//! let root = registry.add_builder(builder);
//! let tx = registry.to_transaction(root, &KeyStore::new("secret")).unwrap();
//!
//! let reloaded = SerialTransactionBuilder::new(NetworkType::Testnet, tx.to_bytes()).unwrap();
//! assert!(reloaded.is_coinbase());
//! assert_eq!(reloaded.transaction().outputs[0].value, 50_000);
//! ```

pub mod builder;
pub mod client;
pub mod constants;
pub mod encoding;
pub mod env;
pub mod error;
pub mod hash;
pub mod io;
pub mod keys;
pub mod keystore;
pub mod locktime;
pub mod opcodes;
pub mod registry;
pub mod script;
pub mod serial;
pub mod sighash;
pub mod signature;
pub mod transaction;
pub mod types;

// Re-export commonly used types
pub use builder::TransactionBuilder;
pub use client::{BitcoinClient, Confidence};
pub use env::{Env, Value, VarKind};
pub use error::{BuilderError, Result};
pub use hash::{Hash, HashAlgorithm};
pub use io::{Input, InputOrigin, Output, ParentRef};
pub use keys::{Address, NetworkType, PrivateKey, PublicKey};
pub use keystore::KeyStore;
pub use locktime::RelativeLocktime;
pub use registry::{Finalizer, TransactionRegistry, TransactionSource, TxNode, TxRef};
pub use script::{
    InputScript, KeyRef, Locking, OutputKind, OutputScript, ScriptExpression, Unlocking,
};
pub use serial::SerialTransactionBuilder;
pub use signature::{SighashType, Signature, SignatureModifier};
pub use types::*;
