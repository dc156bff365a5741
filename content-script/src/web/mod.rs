//! Browser bindings: the real page behind [`HostDom`](crate::dom::HostDom),
//! `browser.storage.local` behind [`StateStore`](crate::store::StateStore),
//! and the runtime that wires page events to the session.

mod dom;
mod runtime;
mod store;

pub use dom::{WebDom, WebNode};
pub use runtime::start;
pub use store::ExtensionStore;
