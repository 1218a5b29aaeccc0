#![forbid(unsafe_code)]

//! Enveloped XML signature processing: the signature data model with
//! strict-order parsing, and the streaming writer/reader pair that embeds
//! or verifies a signature in a single pass over the document.

pub mod credentials;
pub mod model;
pub mod reader;
pub mod writer;

pub use credentials::SigningCredentials;
pub use model::{KeyInfo, Reference, Signature, SignedInfo, TransformKind};
pub use reader::{ClaimedToken, EnvelopedSignatureReader, TokenReader};
pub use writer::EnvelopedSignatureWriter;
