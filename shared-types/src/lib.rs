//! Shared types between the content script, background script and options page
//!
//! These types are used by both:
//! - The bubble engine (Rust, compiled to WASM)
//! - The options page and menu dispatcher (JS, through the exported TS bindings)
//!
//! Field names follow the JSON layout kept in extension storage.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Storage Layout
// ============================================================================

/// Storage key holding the user's [`Settings`]
pub const SETTINGS_KEY: &str = "settings";

/// Storage key holding the map of conversation key -> [`ConversationState`]
pub const CONVERSATIONS_KEY: &str = "conversations";

pub const MIN_COLLAPSED_LINES: i32 = 3;
pub const MAX_COLLAPSED_LINES: i32 = 10;
pub const DEFAULT_COLLAPSED_LINES: i32 = 5;

// ============================================================================
// Settings
// ============================================================================

/// Where the toggle control is shown
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../options/src/types/generated.ts")]
pub enum ButtonVisibility {
    #[default]
    Hover,
    Always,
}

/// How collapse decisions are remembered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../options/src/types/generated.ts")]
pub enum PersistenceMode {
    Off,
    /// One flag for the whole conversation
    ConversationDefault,
    /// Independent flag per bubble
    #[default]
    PerBubble,
}

/// Visual state of a single bubble, also used as a conversation default
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../options/src/types/generated.ts")]
pub enum BubbleMode {
    #[default]
    Expanded,
    Collapsed,
}

impl BubbleMode {
    pub fn is_collapsed(self) -> bool {
        matches!(self, BubbleMode::Collapsed)
    }

    pub fn from_collapsed(collapsed: bool) -> Self {
        if collapsed {
            BubbleMode::Collapsed
        } else {
            BubbleMode::Expanded
        }
    }
}

/// User settings, stored under [`SETTINGS_KEY`]
///
/// Missing fields fall back to their defaults so partially written objects
/// from older versions still load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export, export_to = "../../options/src/types/generated.ts")]
pub struct Settings {
    pub collapsed_lines: i32,
    pub button_visibility: ButtonVisibility,
    pub persistence: PersistenceMode,
    pub default_mode: BubbleMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            collapsed_lines: DEFAULT_COLLAPSED_LINES,
            button_visibility: ButtonVisibility::Hover,
            persistence: PersistenceMode::PerBubble,
            default_mode: BubbleMode::Expanded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Collapsed lines must be between 3 and 10")]
    CollapsedLinesOutOfRange(i32),
}

impl Settings {
    /// Line count actually used for layout; stored values are never trusted.
    pub fn effective_collapsed_lines(&self) -> u32 {
        self.collapsed_lines
            .clamp(MIN_COLLAPSED_LINES, MAX_COLLAPSED_LINES) as u32
    }

    /// Validation contract of the settings form. Only `collapsed_lines` is checked.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_COLLAPSED_LINES..=MAX_COLLAPSED_LINES).contains(&self.collapsed_lines) {
            return Err(SettingsError::CollapsedLinesOutOfRange(self.collapsed_lines));
        }
        Ok(())
    }
}

// ============================================================================
// Conversation State
// ============================================================================

/// Persisted collapse state of one conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../options/src/types/generated.ts")]
pub struct ConversationState {
    /// Always written; entries from older versions may lack it, in which case
    /// the user's default mode applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub default_mode: Option<BubbleMode>,

    /// Epoch milliseconds of the last write
    #[serde(with = "chrono::serde::ts_milliseconds", default)]
    #[ts(type = "number")]
    pub updated_at: DateTime<Utc>,

    /// Only written in [`PersistenceMode::PerBubble`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub bubble_states: Option<BTreeMap<String, BubbleMode>>,
}

impl ConversationState {
    pub fn new(
        default_mode: BubbleMode,
        bubble_states: Option<BTreeMap<String, BubbleMode>>,
    ) -> Self {
        Self {
            default_mode: Some(default_mode),
            updated_at: Utc::now(),
            bubble_states,
        }
    }

    pub fn default_mode_or(&self, fallback: BubbleMode) -> BubbleMode {
        self.default_mode.unwrap_or(fallback)
    }

    pub fn bubble_state(&self, key: &str) -> Option<BubbleMode> {
        self.bubble_states
            .as_ref()
            .and_then(|states| states.get(key).copied())
    }
}

/// Everything stored under [`CONVERSATIONS_KEY`]
pub type ConversationMap = BTreeMap<String, ConversationState>;

// ============================================================================
// Commands
// ============================================================================

pub const MENU_COLLAPSE_ALL: &str = "bubble-fold-collapse-all";
pub const MENU_EXPAND_ALL: &str = "bubble-fold-expand-all";

/// Origins the background script is allowed to dispatch commands to
pub const SUPPORTED_ORIGINS: &[&str] = &["https://chatgpt.com/", "https://chat.openai.com/"];

/// Message sent from the background script to the content script
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "../../options/src/types/generated.ts")]
pub enum Command {
    CollapseAll,
    ExpandAll,
}

impl Command {
    pub fn from_menu_item(menu_item_id: &str) -> Option<Self> {
        match menu_item_id {
            MENU_COLLAPSE_ALL => Some(Command::CollapseAll),
            MENU_EXPAND_ALL => Some(Command::ExpandAll),
            _ => None,
        }
    }

    /// Mode every bubble is forced into
    pub fn target_mode(self) -> BubbleMode {
        match self {
            Command::CollapseAll => BubbleMode::Collapsed,
            Command::ExpandAll => BubbleMode::Expanded,
        }
    }
}

pub fn is_supported_page(url: &str) -> bool {
    SUPPORTED_ORIGINS.iter().any(|origin| url.starts_with(origin))
}
