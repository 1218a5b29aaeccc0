#![forbid(unsafe_code)]

//! Exclusive XML Canonicalization (exc-C14N) for the Sigtuna library.
//!
//! Only the exclusive variants are implemented; the inclusive C14N 1.0/1.1
//! URIs are recognized by the typed parsers upstream and rejected as
//! unsupported algorithms.

pub mod escape;
pub mod exclusive;
pub mod render;

use sigtuna_core::{algorithm, Error, Result};
use sigtuna_xml::NodeSet;

/// The canonicalization method, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14nMethod {
    /// Exclusive Canonical XML 1.0
    Exclusive,
    /// Exclusive Canonical XML 1.0 with comments
    ExclusiveWithComments,
}

impl C14nMethod {
    /// Get the algorithm URI for this method.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Exclusive => algorithm::EXC_C14N,
            Self::ExclusiveWithComments => algorithm::EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Parse a method from an algorithm URI. Unknown or non-exclusive
    /// URIs yield `None`; callers map that to `UnsupportedAlgorithm`.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithm::EXC_C14N => Some(Self::Exclusive),
            algorithm::EXC_C14N_WITH_COMMENTS => Some(Self::ExclusiveWithComments),
            _ => None,
        }
    }

    pub fn with_comments(&self) -> bool {
        matches!(self, Self::ExclusiveWithComments)
    }
}

/// Canonicalize a pre-parsed document.
///
/// - `node_set`: optional document subset; nodes outside the set are not
///   rendered but their in-set descendants are.
/// - `inclusive_prefixes`: the exc-C14N InclusiveNamespaces PrefixList.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    method: C14nMethod,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>> {
    exclusive::canonicalize(doc, method.with_comments(), node_set, inclusive_prefixes)
}

/// Canonicalize raw XML text.
pub fn canonicalize_str(
    xml: &str,
    method: C14nMethod,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>> {
    let doc = roxmltree::Document::parse_with_options(xml, sigtuna_xml::parsing_options())
        .map_err(|e| Error::Canonicalization(e.to_string()))?;
    canonicalize(&doc, method, node_set, inclusive_prefixes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_uri_round_trip() {
        assert_eq!(
            C14nMethod::from_uri(algorithm::EXC_C14N),
            Some(C14nMethod::Exclusive)
        );
        assert_eq!(
            C14nMethod::Exclusive.uri(),
            "http://www.w3.org/2001/10/xml-exc-c14n#"
        );
    }

    #[test]
    fn inclusive_uris_not_recognized() {
        assert_eq!(C14nMethod::from_uri(algorithm::C14N), None);
        assert_eq!(C14nMethod::from_uri(algorithm::C14N11), None);
        assert_eq!(C14nMethod::from_uri("urn:bogus"), None);
    }

    #[test]
    fn malformed_input_is_a_canonicalization_error() {
        let err = canonicalize_str("<a><b></a>", C14nMethod::Exclusive, None, &[]).unwrap_err();
        assert!(matches!(err, Error::Canonicalization(_)));
    }
}
