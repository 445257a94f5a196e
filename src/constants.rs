//! Bitcoin constants and builder defaults

/// Maximum money supply: 21,000,000 BTC in satoshis
pub const MAX_MONEY: i64 = 21_000_000 * 100_000_000;

/// Satoshis per BTC
pub const SATOSHIS_PER_BTC: i64 = 100_000_000;

/// Maximum number of inputs per transaction
pub const MAX_INPUTS: usize = 1000;

/// Maximum number of outputs per transaction
pub const MAX_OUTPUTS: usize = 1000;

/// Version stamped on every finalized transaction (BIP-68 requires >= 2)
pub const TX_VERSION: u32 = 2;

/// Lock time threshold: transactions with lock time < this are block height
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number for final transaction
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// Highest non-final sequence number; enables the transaction's nLockTime
pub const SEQUENCE_LOCKTIME_ENABLED: u32 = SEQUENCE_FINAL - 1;

/// BIP-68: relative lock time is ignored when this bit is set
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

/// BIP-68: relative lock time counts 512-second intervals when this bit is set
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// BIP-68: bits of the sequence number holding the lock value
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000ffff;

/// Outpoint index of a coinbase input
pub const COINBASE_OUTPOINT_INDEX: u32 = 0xffffffff;

/// PBKDF2 iterations used to derive the key store sealing key
pub const KEYSTORE_KDF_ROUNDS: u32 = 10_000;

/// Random salt length for the key store
pub const KEYSTORE_SALT_LENGTH: usize = 16;

/// AES-256 key length
pub const AES_KEY_LENGTH: usize = 32;

/// AES-GCM nonce length
pub const AES_NONCE_LENGTH: usize = 12;
