use crate::config::{EngineConfig, ROLE_ATTRIBUTE, STRUCTURAL_CLASS};
use crate::dom::HostDom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Only user-facing roles count; `system`, `tool` and unknown values do not.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message block found by a scan. Rebuilt on every pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble<N> {
    pub container: N,
    pub role: Role,
    pub role_marker: N,
}

/// The subtree the engine scans and observes
pub fn conversation_root<D: HostDom>(dom: &D, config: &EngineConfig) -> Option<D::Node> {
    config
        .root_selectors
        .iter()
        .find_map(|selector| dom.query_selector(selector))
        .or_else(|| dom.body())
}

/// Message bubbles under `root`, in document order.
///
/// Without role markers the result is empty; no other heuristics are tried.
pub fn detect_bubbles<D: HostDom>(
    dom: &D,
    root: &D::Node,
    config: &EngineConfig,
) -> Vec<Bubble<D::Node>> {
    dom.elements_with_attribute(root, ROLE_ATTRIBUTE)
        .into_iter()
        .filter_map(|marker| {
            let role = dom
                .attribute(&marker, ROLE_ATTRIBUTE)
                .as_deref()
                .and_then(Role::parse)?;
            let container = find_container(dom, root, &marker, config);
            Some(Bubble {
                container,
                role,
                role_marker: marker,
            })
        })
        .collect()
}

/// Walk up from the role marker, which often annotates a small inner node,
/// to the element holding the whole message.
///
/// Ascent never reaches `root` itself: when neither stop condition holds the
/// walk ends at root's direct child, which may be broader than one message.
fn find_container<D: HostDom>(
    dom: &D,
    root: &D::Node,
    marker: &D::Node,
    config: &EngineConfig,
) -> D::Node {
    let mut current = marker.clone();
    loop {
        if dom.has_class(&current, STRUCTURAL_CLASS)
            || dom.rendered_height(&current) >= config.min_container_height_px
        {
            return current;
        }
        match dom.parent(&current) {
            Some(parent) if parent != *root => current = parent,
            _ => return current,
        }
    }
}
