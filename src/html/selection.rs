//! Read-only view over a set of nodes in a parsed document.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};

/// An ordered set of elements from one document.
///
/// A selection created with [`Selection::document`] also matches the root
/// element itself in [`find`](Selection::find), so a selector like `html`
/// or `body > h1` works from the top.
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    nodes: Vec<ElementRef<'a>>,
    is_document: bool,
}

impl<'a> Selection<'a> {
    /// Selection covering the whole document.
    #[must_use]
    pub fn document(html: &'a Html) -> Self {
        Self {
            nodes: vec![html.root_element()],
            is_document: true,
        }
    }

    fn from_nodes(nodes: Vec<ElementRef<'a>>) -> Self {
        Self {
            nodes,
            is_document: false,
        }
    }

    /// Descendants of every node matching `selector`, without duplicates,
    /// in document order per node.
    #[must_use]
    pub fn find(&self, selector: &Selector) -> Self {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for node in &self.nodes {
            if self.is_document && selector.matches(node) && seen.insert(node.id()) {
                found.push(*node);
            }
            for matched in node.select(selector) {
                if seen.insert(matched.id()) {
                    found.push(matched);
                }
            }
        }
        Self::from_nodes(found)
    }

    /// The first node only (empty stays empty).
    #[must_use]
    pub fn first(&self) -> Self {
        Self {
            nodes: self.nodes.first().copied().into_iter().collect(),
            is_document: self.is_document,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates the nodes as single-node selections.
    pub fn iter(&self) -> impl Iterator<Item = Selection<'a>> + '_ {
        self.nodes.iter().map(|node| Self::from_nodes(vec![*node]))
    }

    /// Concatenated text of all nodes.
    #[must_use]
    pub fn text(&self) -> String {
        self.nodes.iter().flat_map(|node| node.text()).collect()
    }

    /// Attribute of the first node.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.nodes.first().and_then(|node| node.value().attr(name))
    }

    /// Inner HTML of the first node.
    #[must_use]
    pub fn inner_html(&self) -> String {
        self.nodes
            .first()
            .map(ElementRef::inner_html)
            .unwrap_or_default()
    }
}
