#![forbid(unsafe_code)]

//! XML plumbing for the Sigtuna XML Signature library.
//!
//! Provides a forward-only XML writer, a pull-style event cursor over a
//! parsed `roxmltree` document, and `NodeSet` for document-subset
//! canonicalization.

pub mod events;
pub mod nodeset;
pub mod writer;

pub use events::{EventCursor, XmlEvent, XmlEventKind};
pub use nodeset::NodeSet;
pub use writer::XmlWriter;

/// Return roxmltree parsing options that allow DTD.
///
/// DTD is allowed because roxmltree does not expand external entities or
/// perform entity substitution beyond the five predefined XML entities,
/// so it is safe.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}
