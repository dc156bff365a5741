//! Persistence boundary.
//!
//! Storage layout (shared with the options page):
//! - `settings`: [`Settings`]
//! - `conversations`: map of conversation key -> [`ConversationState`]
//!
//! Reads never fail from the caller's point of view: backend and decode
//! errors are logged and defaults are used instead.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use serde_json::{Map, Value};
use shared_types::{ConversationState, Settings, SettingsError, CONVERSATIONS_KEY, SETTINGS_KEY};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    InvalidSettings(#[from] SettingsError),
}

/// Asynchronous key-value store
#[async_trait(?Send)]
pub trait StateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// In-process store for tests and headless runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, Value>>,
    failing: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a backend error
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    pub fn raw(&self, key: &str) -> Option<Value> {
        self.values.borrow().get(key).cloned()
    }
}

#[async_trait(?Send)]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        if self.failing.get() {
            return Err(StoreError::Backend(format!("get {key} refused")));
        }
        Ok(self.values.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if self.failing.get() {
            return Err(StoreError::Backend(format!("set {key} refused")));
        }
        self.values.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }
}

pub async fn load_settings<S: StateStore + ?Sized>(store: &S) -> Settings {
    match store.get(SETTINGS_KEY).await {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
            log::warn!("Stored settings are malformed, using defaults: {e}");
            Settings::default()
        }),
        Ok(None) => Settings::default(),
        Err(e) => {
            log::error!("Error loading settings: {e}");
            Settings::default()
        }
    }
}

/// Validate and write settings. Invalid settings are never written.
pub async fn persist_settings<S: StateStore + ?Sized>(
    store: &S,
    settings: &Settings,
) -> Result<(), StoreError> {
    settings.validate()?;
    store
        .set(SETTINGS_KEY, serde_json::to_value(settings)?)
        .await
}

pub async fn load_conversation<S: StateStore + ?Sized>(
    store: &S,
    conversation_key: &str,
) -> Option<ConversationState> {
    let conversations = match store.get(CONVERSATIONS_KEY).await {
        Ok(value) => value?,
        Err(e) => {
            log::error!("Error loading conversation state: {e}");
            return None;
        }
    };
    let entry = conversations.get(conversation_key)?.clone();
    serde_json::from_value(entry)
        .map_err(|e| log::warn!("Ignoring malformed state for {conversation_key}: {e}"))
        .ok()
}

/// Read-modify-write of the conversations map. Other entries are kept as stored.
pub async fn save_conversation<S: StateStore + ?Sized>(
    store: &S,
    conversation_key: &str,
    state: &ConversationState,
) -> Result<(), StoreError> {
    let mut conversations = match store.get(CONVERSATIONS_KEY).await? {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    conversations.insert(conversation_key.to_string(), serde_json::to_value(state)?);
    store
        .set(CONVERSATIONS_KEY, Value::Object(conversations))
        .await
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveJob {
    pub conversation_key: String,
    pub state: ConversationState,
}

/// Serializes conversation writes so overlapping toggles cannot interleave
/// their read-modify-write cycles. Last write wins.
#[derive(Debug, Clone)]
pub struct SaveQueue {
    tx: UnboundedSender<SaveJob>,
}

impl SaveQueue {
    pub fn new() -> (Self, UnboundedReceiver<SaveJob>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, job: SaveJob) {
        if let Err(e) = self.tx.unbounded_send(job) {
            log::error!("Save queue closed, dropping write: {e}");
        }
    }
}

/// Apply queued writes one at a time until every sender is gone.
pub async fn drain_saves<S: StateStore + ?Sized>(store: &S, mut jobs: UnboundedReceiver<SaveJob>) {
    while let Some(job) = jobs.next().await {
        if let Err(e) = save_conversation(store, &job.conversation_key, &job.state).await {
            log::error!(
                "Error saving conversation state for {}: {e}",
                job.conversation_key
            );
        }
    }
}
