//! Bubble Fold content script
//!
//! Tracks the message bubbles of a chat page, attaches a collapse/expand
//! control to each one, and reconciles their visual state with what was
//! persisted for the current conversation.
//!
//! The engine only talks to the page through [`dom::HostDom`], so everything
//! except the `web` runtime runs headless against [`dom::MemoryDom`].

pub mod collapse;
pub mod config;
pub mod detect;
pub mod dom;
pub mod hash;
pub mod keys;
pub mod navigation;
pub mod observer;
pub mod registry;
pub mod session;
pub mod store;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use config::EngineConfig;
pub use detect::{detect_bubbles, Bubble, Role};
pub use dom::{DomError, HostDom, MemoryDom, NodeId};
pub use hash::fnv1a_hash;
pub use session::{ReconcileReport, Session};
pub use store::{MemoryStore, SaveQueue, StateStore, StoreError};
