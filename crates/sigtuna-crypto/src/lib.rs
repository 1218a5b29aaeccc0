#![forbid(unsafe_code)]

//! Cryptographic providers for the Sigtuna signature engine: digest
//! computation over canonical bytes and signature creation/verification
//! over the canonical `SignedInfo`.

pub mod digest;
pub mod provider;

pub use digest::DigestMethod;
pub use provider::{CryptoProvider, SignatureMethod, SignatureProvider, SigningKey};
