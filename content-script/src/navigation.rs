//! Single-page navigation tracking.
//!
//! Several independent signals report possible navigations: the host's
//! navigation events, `popstate`, and a polling fallback for routers that
//! bypass both. They all end up in [`NavigationTracker::observe`], which
//! reports a change only once per distinct address.

/// Which subscription noticed the address change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationSignal {
    NavigateEvent,
    PopState,
    Poll,
    /// Checked right before acting on a toggle or command
    Interaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationChange {
    pub from: String,
    pub to: String,
    pub signal: NavigationSignal,
}

#[derive(Debug, Clone)]
pub struct NavigationTracker {
    last_href: String,
}

impl NavigationTracker {
    pub fn new(current_href: impl Into<String>) -> Self {
        Self {
            last_href: current_href.into(),
        }
    }

    pub fn last_href(&self) -> &str {
        &self.last_href
    }

    pub fn observe(&mut self, href: &str, signal: NavigationSignal) -> Option<NavigationChange> {
        if href == self.last_href {
            return None;
        }
        let from = std::mem::replace(&mut self.last_href, href.to_string());
        log::debug!("Navigation via {signal:?}: {from} -> {href}");
        Some(NavigationChange {
            from,
            to: href.to_string(),
            signal,
        })
    }
}

/// Key under which a conversation's state is stored: the id in a `/c/<id>`
/// path, or the whole path for pages without one.
pub fn conversation_key(path: &str) -> String {
    path.find("/c/")
        .map(|start| &path[start + 3..])
        .map(|rest| rest.split('/').next().unwrap_or_default())
        .filter(|id| !id.is_empty())
        .unwrap_or(path)
        .to_string()
}
