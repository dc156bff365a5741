use std::time::Duration;

/// Attribute carrying the author role of a message (`user`, `assistant`, ...)
pub const ROLE_ATTRIBUTE: &str = "data-message-author-role";
/// Native stable message identifier, used verbatim as a bubble key when present
pub const MESSAGE_ID_ATTRIBUTE: &str = "data-message-id";
/// Structural class that marks a full message box on the host page
pub const STRUCTURAL_CLASS: &str = "group";

pub const COLLAPSED_CLASS: &str = "bubble-fold-collapsed";
pub const CONTROL_CLASS: &str = "bubble-fold-toggle";
pub const CONTROL_HOVER_CLASS: &str = "bubble-fold-toggle-hover";

/// Engine tunables. User-facing options live in [`shared_types::Settings`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Quiet period before a mutation-triggered reconciliation runs
    pub debounce: Duration,
    /// Address polling fallback for navigations that bypass the event signals
    pub poll_interval: Duration,
    /// Mutation batches above this record count are dropped
    pub max_mutation_records: usize,
    /// Ancestor walk stops once a node renders taller than this
    pub min_container_height_px: f64,
    pub padding_px: f64,
    /// Line height estimate when computed style reports `normal`
    pub line_height_factor: f64,
    /// Leading UTF-16 units of bubble text that feed the key fingerprint
    pub text_fingerprint_len: usize,
    /// Tried in order; the document body is the last resort
    pub root_selectors: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(50),
            poll_interval: Duration::from_millis(1000),
            max_mutation_records: 1000,
            min_container_height_px: 50.0,
            padding_px: 12.0,
            line_height_factor: 1.4,
            text_fingerprint_len: 32,
            root_selectors: vec!["main".to_string()],
        }
    }
}
