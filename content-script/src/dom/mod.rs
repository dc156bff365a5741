//! The seam between the engine and the host page.
//!
//! Everything the engine reads from or writes to the page goes through
//! [`HostDom`]. Node handles are identity tokens: holding one never keeps the
//! underlying element in the document or alive in memory.

use std::fmt::Debug;
use std::hash::Hash;

mod memory;

pub use memory::{MemoryDom, NodeId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("node is no longer part of the document")]
    Detached,
    #[error("style property `{0}` could not be resolved")]
    StyleUnavailable(String),
    #[error("DOM operation failed: {0}")]
    Operation(String),
}

pub trait HostDom {
    type Node: Clone + Eq + Hash + Debug;

    /// First element matching `selector` in the whole document
    fn query_selector(&self, selector: &str) -> Option<Self::Node>;
    fn body(&self) -> Option<Self::Node>;

    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;
    fn is_connected(&self, node: &Self::Node) -> bool;
    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;
    fn has_class(&self, node: &Self::Node, class: &str) -> bool;
    /// Layout height in CSS pixels, `0.0` when the node is not rendered
    fn rendered_height(&self, node: &Self::Node) -> f64;
    fn text_content(&self, node: &Self::Node) -> String;

    /// Descendants of `root` (root excluded) carrying attribute `name`, in document order
    fn elements_with_attribute(&self, root: &Self::Node, name: &str) -> Vec<Self::Node>;
    /// First descendant whose class attribute contains any of `fragments` as a substring
    fn first_descendant_with_class_fragment(
        &self,
        root: &Self::Node,
        fragments: &[&str],
    ) -> Option<Self::Node>;
    /// First direct child of `parent` carrying `class`
    fn child_with_class(&self, parent: &Self::Node, class: &str) -> Option<Self::Node>;

    fn computed_style(&self, node: &Self::Node, property: &str) -> Result<String, DomError>;
    /// Inline value of `property`, empty when unset
    fn inline_style(&self, node: &Self::Node, property: &str) -> Result<String, DomError>;
    /// An empty `value` removes the inline property
    fn set_inline_style(
        &mut self,
        node: &Self::Node,
        property: &str,
        value: &str,
    ) -> Result<(), DomError>;

    fn add_class(&mut self, node: &Self::Node, class: &str) -> Result<(), DomError>;
    fn remove_class(&mut self, node: &Self::Node, class: &str) -> Result<(), DomError>;

    fn create_element(&mut self, tag: &str) -> Result<Self::Node, DomError>;
    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str)
        -> Result<(), DomError>;
    fn set_text(&mut self, node: &Self::Node, text: &str) -> Result<(), DomError>;
    fn append_child(&mut self, parent: &Self::Node, child: &Self::Node) -> Result<(), DomError>;
}
