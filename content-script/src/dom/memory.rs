//! Headless arena DOM.
//!
//! Nodes are never freed; removing a node only detaches it, so a stale
//! [`NodeId`] stays valid and simply reports `is_connected() == false`.
//! Selectors are limited to bare tag names.

use std::collections::{BTreeMap, HashSet};

use super::{DomError, HostDom};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Default)]
struct NodeData {
    tag: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attrs: BTreeMap<String, String>,
    classes: Vec<String>,
    text: String,
    inline_style: BTreeMap<String, String>,
    computed_style: BTreeMap<String, String>,
    height: f64,
}

#[derive(Debug, Clone)]
pub struct MemoryDom {
    nodes: Vec<NodeData>,
    document: NodeId,
    body: NodeId,
    failing_styles: HashSet<(NodeId, String)>,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    pub fn new() -> Self {
        let mut dom = Self {
            nodes: vec![NodeData {
                tag: "#document".to_string(),
                ..NodeData::default()
            }],
            document: NodeId(0),
            body: NodeId(0),
            failing_styles: HashSet::new(),
        };
        let html = dom.element(dom.document, "html");
        dom.body = dom.element(html, "body");
        dom
    }

    pub fn body_node(&self) -> NodeId {
        self.body
    }

    /// Create `tag` and append it to `parent`
    pub fn element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = self.new_node(tag);
        self.attach(parent, id);
        id
    }

    /// Detach `node` (and its subtree) from its parent
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != node);
        }
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn tag(&self, node: NodeId) -> &str {
        &self.nodes[node.0].tag
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        if name == "class" {
            self.nodes[node.0].classes = value.split_whitespace().map(str::to_string).collect();
        } else {
            self.nodes[node.0]
                .attrs
                .insert(name.to_string(), value.to_string());
        }
    }

    /// Own text of `node`, placed before its children in `text_content`
    pub fn set_own_text(&mut self, node: NodeId, text: &str) {
        self.nodes[node.0].text = text.to_string();
    }

    pub fn set_rendered_height(&mut self, node: NodeId, height: f64) {
        self.nodes[node.0].height = height;
    }

    pub fn set_computed(&mut self, node: NodeId, property: &str, value: &str) {
        self.nodes[node.0]
            .computed_style
            .insert(property.to_string(), value.to_string());
    }

    /// Make every write of `property` on `node` fail
    pub fn fail_style_writes(&mut self, node: NodeId, property: &str) {
        self.failing_styles.insert((node, property.to_string()));
    }

    fn new_node(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            tag: tag.to_string(),
            ..NodeData::default()
        });
        id
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.remove(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[root.0].children.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.nodes[node.0].children.iter().rev().copied());
        }
        out
    }

    fn class_string(&self, node: NodeId) -> String {
        self.nodes[node.0].classes.join(" ")
    }
}

impl HostDom for MemoryDom {
    type Node = NodeId;

    fn query_selector(&self, selector: &str) -> Option<NodeId> {
        self.descendants(self.document)
            .into_iter()
            .find(|node| self.nodes[node.0].tag == selector)
    }

    fn body(&self) -> Option<NodeId> {
        Some(self.body)
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    fn is_connected(&self, node: &NodeId) -> bool {
        let mut current = *node;
        loop {
            if current == self.document {
                return true;
            }
            match self.nodes[current.0].parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        if name == "class" {
            let classes = self.class_string(*node);
            return (!classes.is_empty()).then_some(classes);
        }
        self.nodes[node.0].attrs.get(name).cloned()
    }

    fn has_class(&self, node: &NodeId, class: &str) -> bool {
        self.nodes[node.0].classes.iter().any(|c| c == class)
    }

    fn rendered_height(&self, node: &NodeId) -> f64 {
        self.nodes[node.0].height
    }

    fn text_content(&self, node: &NodeId) -> String {
        let mut text = self.nodes[node.0].text.clone();
        for descendant in self.descendants(*node) {
            text.push_str(&self.nodes[descendant.0].text);
        }
        text
    }

    fn elements_with_attribute(&self, root: &NodeId, name: &str) -> Vec<NodeId> {
        self.descendants(*root)
            .into_iter()
            .filter(|node| self.attribute(node, name).is_some())
            .collect()
    }

    fn first_descendant_with_class_fragment(
        &self,
        root: &NodeId,
        fragments: &[&str],
    ) -> Option<NodeId> {
        self.descendants(*root).into_iter().find(|node| {
            let classes = self.class_string(*node);
            fragments.iter().any(|fragment| classes.contains(fragment))
        })
    }

    fn child_with_class(&self, parent: &NodeId, class: &str) -> Option<NodeId> {
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .find(|child| self.has_class(child, class))
    }

    fn computed_style(&self, node: &NodeId, property: &str) -> Result<String, DomError> {
        if !self.is_connected(node) {
            return Err(DomError::Detached);
        }
        self.nodes[node.0]
            .computed_style
            .get(property)
            .cloned()
            .ok_or_else(|| DomError::StyleUnavailable(property.to_string()))
    }

    fn inline_style(&self, node: &NodeId, property: &str) -> Result<String, DomError> {
        Ok(self.nodes[node.0]
            .inline_style
            .get(property)
            .cloned()
            .unwrap_or_default())
    }

    fn set_inline_style(
        &mut self,
        node: &NodeId,
        property: &str,
        value: &str,
    ) -> Result<(), DomError> {
        if self.failing_styles.contains(&(*node, property.to_string())) {
            return Err(DomError::Operation(format!("cannot write `{property}`")));
        }
        let style = &mut self.nodes[node.0].inline_style;
        if value.is_empty() {
            style.remove(property);
        } else {
            style.insert(property.to_string(), value.to_string());
        }
        Ok(())
    }

    fn add_class(&mut self, node: &NodeId, class: &str) -> Result<(), DomError> {
        if !self.has_class(node, class) {
            self.nodes[node.0].classes.push(class.to_string());
        }
        Ok(())
    }

    fn remove_class(&mut self, node: &NodeId, class: &str) -> Result<(), DomError> {
        self.nodes[node.0].classes.retain(|c| c != class);
        Ok(())
    }

    fn create_element(&mut self, tag: &str) -> Result<NodeId, DomError> {
        Ok(self.new_node(tag))
    }

    fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.set_attr(*node, name, value);
        Ok(())
    }

    fn set_text(&mut self, node: &NodeId, text: &str) -> Result<(), DomError> {
        self.nodes[node.0].text = text.to_string();
        for child in std::mem::take(&mut self.nodes[node.0].children) {
            self.nodes[child.0].parent = None;
        }
        Ok(())
    }

    fn append_child(&mut self, parent: &NodeId, child: &NodeId) -> Result<(), DomError> {
        self.attach(*parent, *child);
        Ok(())
    }
}
