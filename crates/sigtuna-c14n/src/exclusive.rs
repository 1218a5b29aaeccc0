#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! The exclusive form renders a namespace declaration on an element only
//! when the prefix is *visibly utilized* there (by the element's own name,
//! by a qualified attribute, or because the PrefixList names it) and the
//! binding differs from what the nearest rendered ancestor already output.
//! This keeps a signed subtree's canonical form stable when the subtree is
//! moved between enclosing contexts.

use crate::escape;
use crate::render::{Attr, NsDecl};
use sigtuna_core::{ns, Result};
use sigtuna_xml::NodeSet;
use std::collections::{BTreeMap, BTreeSet};

/// Canonicalize a document using Exclusive C14N 1.0.
///
/// `node_set` restricts the output to a document subset: nodes outside the
/// set are not rendered, but their in-set descendants still are. The
/// `inclusive_prefixes` slice is the PrefixList of the InclusiveNamespaces
/// parameter; the token `#default` names the default namespace.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let ctx = C14nContext {
        with_comments,
        node_set,
        inclusive_prefixes,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct C14nContext<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    inclusive_prefixes: &'a [String],
}

impl<'a> C14nContext<'a> {
    fn is_visible(&self, node: &roxmltree::Node<'_, '_>) -> bool {
        match self.node_set {
            None => true,
            Some(set) => set.contains(*node),
        }
    }

    fn process_node(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<()> {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, rendered_ns)?;
                }
            }
            roxmltree::NodeType::Element => {
                self.process_element(node, output, rendered_ns)?;
            }
            roxmltree::NodeType::Text => {
                if self.is_visible(&node) {
                    escape::text_into(node.text().unwrap_or(""), output);
                }
            }
            roxmltree::NodeType::Comment => {
                if self.with_comments && self.is_visible(&node) {
                    // Comments outside the document element get newline
                    // separators relative to it.
                    let parent_is_root = node
                        .parent()
                        .is_some_and(|p| p.node_type() == roxmltree::NodeType::Root);

                    if parent_is_root {
                        let has_preceding_element =
                            node.prev_siblings().any(|s| s.is_element());
                        if has_preceding_element {
                            output.push(b'\n');
                        }
                    }

                    output.extend_from_slice(b"<!--");
                    output.extend_from_slice(node.text().unwrap_or("").as_bytes());
                    output.extend_from_slice(b"-->");

                    if parent_is_root {
                        let has_following_element =
                            node.next_siblings().any(|s| s.is_element());
                        if has_following_element {
                            output.push(b'\n');
                        }
                    }
                }
            }
            roxmltree::NodeType::PI => {
                if self.is_visible(&node) {
                    let parent_is_root = node
                        .parent()
                        .is_some_and(|p| p.node_type() == roxmltree::NodeType::Root);

                    if parent_is_root {
                        let has_preceding_element =
                            node.prev_siblings().any(|s| s.is_element());
                        if has_preceding_element {
                            output.push(b'\n');
                        }
                    }

                    if let Some(pi) = node.pi() {
                        output.extend_from_slice(b"<?");
                        output.extend_from_slice(pi.target.as_bytes());
                        if let Some(value) = pi.value {
                            if !value.is_empty() {
                                output.push(b' ');
                                escape::pi_into(value, output);
                            }
                        }
                        output.extend_from_slice(b"?>");
                    }

                    if parent_is_root {
                        let has_following_element =
                            node.next_siblings().any(|s| s.is_element());
                        if has_following_element {
                            output.push(b'\n');
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn process_element(
        &self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<()> {
        if !self.is_visible(&node) {
            // An omitted element contributes nothing of its own; in-set
            // descendants render against the same rendered-namespace state.
            for child in node.children() {
                self.process_node(child, output, rendered_ns)?;
            }
            return Ok(());
        }

        let in_scope = collect_inscope_namespaces(&node);

        // Visibly utilized prefixes: the element's own prefix, each
        // qualified attribute's prefix, and everything the PrefixList names.
        let mut utilized: BTreeSet<String> = BTreeSet::new();
        utilized.insert(element_prefix(&node).unwrap_or_default());
        for attr in node.attributes() {
            match attr.namespace() {
                None | Some(ns::XML) => continue,
                Some(uri) => {
                    if let Some(prefix) = node.lookup_prefix(uri) {
                        if !prefix.is_empty() {
                            utilized.insert(prefix.to_owned());
                        }
                    }
                }
            }
        }
        for prefix in self.inclusive_prefixes {
            if prefix == "#default" {
                utilized.insert(String::new());
            } else {
                utilized.insert(prefix.clone());
            }
        }

        let mut ns_decls: Vec<NsDecl> = Vec::new();
        let mut child_rendered = rendered_ns.clone();
        for prefix in &utilized {
            if prefix == "xml" {
                continue;
            }
            match in_scope.get(prefix) {
                Some(uri) => {
                    if rendered_ns.get(prefix) != Some(uri) {
                        ns_decls.push(NsDecl {
                            prefix: prefix.clone(),
                            uri: uri.clone(),
                        });
                        child_rendered.insert(prefix.clone(), uri.clone());
                    }
                }
                None => {
                    // Utilized but unbound: only meaningful for the default
                    // namespace, which must be un-declared if an ancestor
                    // rendered a non-empty one.
                    if prefix.is_empty() {
                        let ancestor_default =
                            rendered_ns.get("").is_some_and(|uri| !uri.is_empty());
                        if ancestor_default {
                            ns_decls.push(NsDecl {
                                prefix: String::new(),
                                uri: String::new(),
                            });
                            child_rendered.insert(String::new(), String::new());
                        }
                    }
                }
            }
        }
        ns_decls.sort();

        let mut attrs: Vec<Attr> = Vec::new();
        for attr in node.attributes() {
            let ns_uri = attr.namespace().unwrap_or("");
            let qname = if let Some(prefix) = find_attr_prefix(&node, &attr) {
                format!("{}:{}", prefix, attr.name())
            } else {
                attr.name().to_owned()
            };
            attrs.push(Attr {
                ns_uri: ns_uri.to_owned(),
                local_name: attr.name().to_owned(),
                qualified_name: qname,
                value: attr.value().to_owned(),
            });
        }
        attrs.sort();

        let elem_name = qualified_element_name(&node);

        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for decl in &ns_decls {
            decl.write_into(output);
        }
        for attr in &attrs {
            attr.write_into(output);
        }
        output.push(b'>');

        for child in node.children() {
            self.process_node(child, output, &child_rendered)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
        Ok(())
    }
}

/// Collect the in-scope namespace bindings for an element.
///
/// Walks the ancestor chain and merges declarations root-down so closer
/// declarations override more distant ones; an empty-URI declaration
/// removes the binding.
fn collect_inscope_namespaces(node: &roxmltree::Node<'_, '_>) -> BTreeMap<String, String> {
    let mut ns_stack: Vec<BTreeMap<String, String>> = Vec::new();

    let mut current = Some(*node);
    while let Some(n) = current {
        if n.is_element() {
            let mut level = BTreeMap::new();
            for decl in n.namespaces() {
                let prefix = decl.name().unwrap_or("").to_owned();
                level.insert(prefix, decl.uri().to_owned());
            }
            ns_stack.push(level);
        }
        current = n.parent();
    }

    let mut result = BTreeMap::new();
    for level in ns_stack.into_iter().rev() {
        for (prefix, uri) in level {
            if uri.is_empty() {
                result.remove(&prefix);
            } else {
                result.insert(prefix, uri);
            }
        }
    }
    result
}

/// The element's namespace prefix, derived from the binding in scope.
/// `None` for unprefixed elements (no namespace, or the default one).
fn element_prefix(node: &roxmltree::Node<'_, '_>) -> Option<String> {
    let uri = node.tag_name().namespace()?;
    node.lookup_prefix(uri)
        .filter(|p| !p.is_empty())
        .map(|p| p.to_owned())
}

/// Get the qualified element name (prefix:local or just local).
fn qualified_element_name(node: &roxmltree::Node<'_, '_>) -> String {
    match element_prefix(node) {
        Some(prefix) => format!("{}:{}", prefix, node.tag_name().name()),
        None => node.tag_name().name().to_owned(),
    }
}

/// Find the prefix for an attribute's namespace. Qualified attributes
/// always carry one; the xml namespace maps to its reserved prefix.
fn find_attr_prefix(
    node: &roxmltree::Node<'_, '_>,
    attr: &roxmltree::Attribute<'_, '_>,
) -> Option<String> {
    let ns_uri = attr.namespace()?;
    if ns_uri == ns::XML {
        return Some("xml".to_owned());
    }
    node.lookup_prefix(ns_uri)
        .filter(|p| !p.is_empty())
        .map(|p| p.to_owned())
}
