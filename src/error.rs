//! Error types for transaction building and signing

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    #[error("Declaration error: {0}")]
    Declaration(String),

    #[error("Binding error: {0}")]
    Binding(String),

    #[error("Scope error: {0}")]
    Scope(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Signature verification failed: {0}")]
    CryptoVerification(String),

    #[error("Malformed script text: {0}")]
    SerializationFormat(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    #[error("Key store error: {0}")]
    KeyStore(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Client error: {0}")]
    Client(String),
}

pub type Result<T> = std::result::Result<T, BuilderError>;
