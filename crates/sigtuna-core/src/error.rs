#![forbid(unsafe_code)]

/// Errors produced by the Sigtuna XML Signature library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("required argument is missing or empty: {0}")]
    ArgumentNull(&'static str),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Structural/order/namespace mismatch while reading signature elements.
    ///
    /// Carries the expected element and what was actually found so callers
    /// can diagnose misordered or misplaced elements without string parsing.
    #[error("unexpected XML content at position {position}: expected {{{expected_ns}}}{expected}, found {found}")]
    XmlRead {
        expected_ns: String,
        expected: String,
        found: String,
        position: usize,
    },

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("digest mismatch for reference URI `{uri}`")]
    DigestMismatch { uri: String },

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
