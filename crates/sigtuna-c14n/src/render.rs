#![forbid(unsafe_code)]

//! Rendering primitives for canonical output.

use crate::escape;

/// A namespace declaration queued for output on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// The prefix ("" for the default namespace).
    pub prefix: String,
    /// The namespace URI ("" for an un-declaration).
    pub uri: String,
}

impl NsDecl {
    pub fn write_into(&self, out: &mut Vec<u8>) {
        if self.prefix.is_empty() {
            out.extend_from_slice(b" xmlns=\"");
        } else {
            out.extend_from_slice(b" xmlns:");
            out.extend_from_slice(self.prefix.as_bytes());
            out.extend_from_slice(b"=\"");
        }
        escape::attr_into(&self.uri, out);
        out.push(b'"');
    }
}

impl Ord for NsDecl {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Default namespace (empty prefix) sorts first, then by prefix.
        match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => self.prefix.cmp(&other.prefix),
        }
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute queued for output on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// The attribute's namespace URI ("" for no namespace).
    pub ns_uri: String,
    /// The local name.
    pub local_name: String,
    /// The qualified name (prefix:local, or just local).
    pub qualified_name: String,
    /// The attribute value.
    pub value: String,
}

impl Attr {
    pub fn write_into(&self, out: &mut Vec<u8>) {
        out.push(b' ');
        out.extend_from_slice(self.qualified_name.as_bytes());
        out.extend_from_slice(b"=\"");
        escape::attr_into(&self.value, out);
        out.push(b'"');
    }
}

impl Ord for Attr {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Attributes in no namespace come before namespaced ones; within
        // each group the key is (ns_uri, local_name).
        match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, true) => self.local_name.cmp(&other.local_name),
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            (false, false) => self
                .ns_uri
                .cmp(&other.ns_uri)
                .then(self.local_name.cmp(&other.local_name)),
        }
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(ns: &str, local: &str) -> Attr {
        Attr {
            ns_uri: ns.to_owned(),
            local_name: local.to_owned(),
            qualified_name: local.to_owned(),
            value: String::new(),
        }
    }

    #[test]
    fn ns_decl_ordering_puts_default_first() {
        let mut decls = vec![
            NsDecl {
                prefix: "b".into(),
                uri: "http://b".into(),
            },
            NsDecl {
                prefix: String::new(),
                uri: "http://d".into(),
            },
            NsDecl {
                prefix: "a".into(),
                uri: "http://a".into(),
            },
        ];
        decls.sort();
        assert_eq!(decls[0].prefix, "");
        assert_eq!(decls[1].prefix, "a");
        assert_eq!(decls[2].prefix, "b");
    }

    #[test]
    fn attr_ordering_unqualified_before_qualified() {
        let mut attrs = vec![attr("http://z", "a"), attr("", "z"), attr("http://a", "m")];
        attrs.sort();
        assert_eq!(attrs[0].local_name, "z");
        assert_eq!(attrs[1].ns_uri, "http://a");
        assert_eq!(attrs[2].ns_uri, "http://z");
    }

    #[test]
    fn ns_decl_render() {
        let mut out = Vec::new();
        NsDecl {
            prefix: String::new(),
            uri: "http://d".into(),
        }
        .write_into(&mut out);
        assert_eq!(out, b" xmlns=\"http://d\"");

        out.clear();
        NsDecl {
            prefix: "p".into(),
            uri: "http://p".into(),
        }
        .write_into(&mut out);
        assert_eq!(out, b" xmlns:p=\"http://p\"");
    }
}
