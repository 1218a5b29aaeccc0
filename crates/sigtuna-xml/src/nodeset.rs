#![forbid(unsafe_code)]

//! NodeSet for document-subset canonicalization.
//!
//! A `NodeSet` holds the identities of the nodes that are "in" the canonical
//! form. The signature engine uses it for the whole-document-minus-comments
//! set, subtree references, and the enveloped-signature exclusion.

use std::collections::HashSet;

/// A set of document nodes identified by `NodeId`.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: HashSet<roxmltree::NodeId>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// All nodes in the document except comments.
    ///
    /// Per the XML-DSig spec, `URI=""` selects the document without comments.
    pub fn all_without_comments(doc: &roxmltree::Document<'_>) -> Self {
        let mut nodes = HashSet::new();
        for node in doc.descendants() {
            if !node.is_comment() {
                nodes.insert(node.id());
            }
        }
        Self { nodes }
    }

    /// The subtree rooted at `root`, excluding comment nodes.
    pub fn subtree_without_comments(root: roxmltree::Node<'_, '_>) -> Self {
        let mut nodes = HashSet::new();
        for node in root.descendants() {
            if !node.is_comment() {
                nodes.insert(node.id());
            }
        }
        Self { nodes }
    }

    /// Check whether a node is in the set.
    pub fn contains(&self, node: roxmltree::Node<'_, '_>) -> bool {
        self.nodes.contains(&node.id())
    }

    /// Remove `root` and every descendant from the set.
    pub fn remove_subtree(&mut self, root: roxmltree::Node<'_, '_>) {
        for node in root.descendants() {
            self.nodes.remove(&node.id());
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_excluded() {
        let doc = roxmltree::Document::parse("<a><!--x--><b/></a>").unwrap();
        let ns = NodeSet::all_without_comments(&doc);
        let comment = doc.descendants().find(|n| n.is_comment()).unwrap();
        let b = doc.descendants().find(|n| n.has_tag_name("b")).unwrap();
        assert!(!ns.contains(comment));
        assert!(ns.contains(b));
    }

    #[test]
    fn remove_subtree_drops_descendants() {
        let doc = roxmltree::Document::parse("<a><b><c/></b><d/></a>").unwrap();
        let mut ns = NodeSet::all_without_comments(&doc);
        let b = doc.descendants().find(|n| n.has_tag_name("b")).unwrap();
        ns.remove_subtree(b);
        let c = doc.descendants().find(|n| n.has_tag_name("c")).unwrap();
        let d = doc.descendants().find(|n| n.has_tag_name("d")).unwrap();
        assert!(!ns.contains(b));
        assert!(!ns.contains(c));
        assert!(ns.contains(d));
    }
}
