//! Per-page session context and the reconciliation pass.
//!
//! A [`Session`] owns everything that used to be page-global: settings, the
//! current conversation and its default mode, and the node-keyed tables. The
//! navigation handler calls [`Session::reset`] instead of reassigning any of
//! it piecemeal.

use std::collections::BTreeMap;

use shared_types::{
    BubbleMode, Command, ConversationState, PersistenceMode, Settings, SettingsError,
};

use crate::collapse::{is_collapsed, CollapseController, ControlAttach};
use crate::config::EngineConfig;
use crate::detect::detect_bubbles;
use crate::dom::HostDom;
use crate::keys::bubble_key;
use crate::registry::NodeTable;
use crate::store::SaveJob;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BubbleIdentity {
    pub key: String,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport<N> {
    pub detected: usize,
    /// `(container, control)` for every newly created control
    pub attached: Vec<(N, N)>,
    /// Bubbles seen for the first time in this pass
    pub initialized: usize,
    pub collapsed: usize,
    /// Identity records dropped because their container left the document
    pub swept: usize,
}

impl<N> Default for ReconcileReport<N> {
    fn default() -> Self {
        Self {
            detected: 0,
            attached: Vec::new(),
            initialized: 0,
            collapsed: 0,
            swept: 0,
        }
    }
}

pub struct Session<D: HostDom> {
    config: EngineConfig,
    settings: Settings,
    conversation_key: String,
    default_mode: BubbleMode,
    /// Last state loaded or written for this conversation
    persisted: Option<ConversationState>,
    identities: NodeTable<D::Node, BubbleIdentity>,
    controller: CollapseController<D::Node>,
    /// Set between an observed address change and the matching reset
    navigating: bool,
}

impl<D: HostDom> Session<D> {
    pub fn new(config: EngineConfig, settings: Settings, conversation_key: impl Into<String>) -> Self {
        let default_mode = settings.default_mode;
        Self {
            config,
            settings,
            conversation_key: conversation_key.into(),
            default_mode,
            persisted: None,
            identities: NodeTable::new(),
            controller: CollapseController::new(),
            navigating: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn conversation_key(&self) -> &str {
        &self.conversation_key
    }

    pub fn default_mode(&self) -> BubbleMode {
        self.default_mode
    }

    pub fn persisted(&self) -> Option<&ConversationState> {
        self.persisted.as_ref()
    }

    pub fn known_bubbles(&self) -> usize {
        self.identities.len()
    }

    pub fn control_count(&self) -> usize {
        self.controller.control_count()
    }

    pub fn control_of(&self, container: &D::Node) -> Option<&D::Node> {
        self.controller.control(container)
    }

    pub fn key_of(&self, container: &D::Node) -> Option<&str> {
        self.identities.get(container).map(|id| id.key.as_str())
    }

    /// Adopt the stored state of the current conversation, if any
    pub fn load_conversation(&mut self, state: Option<ConversationState>) {
        self.default_mode = state
            .as_ref()
            .map(|s| s.default_mode_or(self.settings.default_mode))
            .unwrap_or(self.settings.default_mode);
        self.persisted = state;
    }

    /// Start over for another conversation. The old subtree is being
    /// abandoned, so every association goes.
    pub fn reset(&mut self, conversation_key: impl Into<String>, settings: Settings) {
        self.identities.clear();
        self.controller.clear();
        self.conversation_key = conversation_key.into();
        self.default_mode = settings.default_mode;
        self.settings = settings;
        self.persisted = None;
        self.navigating = false;
    }

    /// The address changed but the new conversation is not loaded yet. Until
    /// [`Session::reset`], toggles still apply but nothing is saved, since the
    /// page no longer shows the conversation this session is keyed to.
    pub fn begin_navigation(&mut self) {
        self.navigating = true;
    }

    /// Drop associations of nodes that left the document
    pub fn sweep(&mut self, dom: &D) -> usize {
        let swept = self.identities.sweep(dom);
        self.controller.sweep(dom);
        swept
    }

    /// Settings surface entry point: invalid settings are rejected and the
    /// current ones stay in effect.
    pub fn update_settings(&mut self, candidate: Settings) -> Result<(), SettingsError> {
        candidate.validate()?;
        self.settings = candidate;
        Ok(())
    }

    /// Reconcile against the state this session last loaded or wrote
    pub fn reconcile_current(&mut self, dom: &mut D, root: &D::Node) -> ReconcileReport<D::Node> {
        let persisted = self.persisted.clone();
        self.reconcile(dom, root, persisted.as_ref())
    }

    /// Bring controls and initial visual state in line with the DOM.
    ///
    /// Only bubbles without a control get an initial state; known bubbles are
    /// left alone so unrelated re-renders never undo a manual toggle.
    pub fn reconcile(
        &mut self,
        dom: &mut D,
        root: &D::Node,
        persisted: Option<&ConversationState>,
    ) -> ReconcileReport<D::Node> {
        let mut report = ReconcileReport {
            swept: self.sweep(dom),
            ..ReconcileReport::default()
        };

        let bubbles = detect_bubbles(dom, root, &self.config);
        report.detected = bubbles.len();

        for (index, bubble) in bubbles.iter().enumerate() {
            let container = &bubble.container;
            if !self.identities.contains(container) {
                let key = bubble_key(dom, bubble, index, &self.config);
                self.identities
                    .insert(container.clone(), BubbleIdentity { key });
            }

            let attach = self
                .controller
                .attach_control(dom, container, self.settings.button_visibility);
            match attach {
                Ok(ControlAttach::Created(control)) => {
                    report.attached.push((container.clone(), control));
                }
                Ok(ControlAttach::Adopted(_)) => {}
                Ok(ControlAttach::Present) => continue,
                Ok(ControlAttach::Detached) => {
                    log::debug!("Bubble {index} left the document before its control was attached");
                    continue;
                }
                Err(e) => {
                    log::warn!("Failed to add toggle control: {e}");
                    continue;
                }
            }

            report.initialized += 1;
            let key = self.key_of(container).unwrap_or_default().to_string();
            if self.initial_mode(&key, persisted).is_collapsed() {
                if self.collapse(dom, container) {
                    report.collapsed += 1;
                }
            } else if is_collapsed(dom, container) {
                self.expand(dom, container);
            }
        }

        log::debug!(
            "Reconciled {}: {} bubbles, {} new, {} collapsed, {} swept",
            self.conversation_key,
            report.detected,
            report.initialized,
            report.collapsed,
            report.swept
        );
        report
    }

    fn initial_mode(&self, key: &str, persisted: Option<&ConversationState>) -> BubbleMode {
        if self.settings.persistence == PersistenceMode::PerBubble {
            if let Some(mode) = persisted.and_then(|state| state.bubble_state(key)) {
                return mode;
            }
        }
        self.default_mode
    }

    pub fn is_collapsed(&self, dom: &D, container: &D::Node) -> bool {
        is_collapsed(dom, container)
    }

    /// Returns whether the bubble ended up collapsed; failures are logged
    pub fn collapse(&mut self, dom: &mut D, container: &D::Node) -> bool {
        let lines = self.settings.effective_collapsed_lines();
        match self.controller.collapse(dom, container, lines, &self.config) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Failed to collapse bubble: {e}");
                false
            }
        }
    }

    /// Returns whether the bubble ended up expanded; failures are logged
    pub fn expand(&mut self, dom: &mut D, container: &D::Node) -> bool {
        match self.controller.expand(dom, container) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to expand bubble: {e}");
                false
            }
        }
    }

    /// User toggle from a bubble's control
    pub fn toggle(&mut self, dom: &mut D, root: &D::Node, container: &D::Node) -> Option<SaveJob> {
        if is_collapsed(dom, container) {
            self.expand(dom, container);
        } else {
            self.collapse(dom, container);
        }
        self.save_job(dom, root)
    }

    /// Bulk `COLLAPSE_ALL` / `EXPAND_ALL`. Also becomes the conversation
    /// default, including for bubbles that appear later.
    pub fn apply_command(&mut self, dom: &mut D, root: &D::Node, command: Command) -> Option<SaveJob> {
        let mode = command.target_mode();
        self.default_mode = mode;

        let bubbles = detect_bubbles(dom, root, &self.config);
        log::info!("{command:?} on {} bubbles", bubbles.len());
        for bubble in &bubbles {
            if mode.is_collapsed() {
                self.collapse(dom, &bubble.container);
            } else {
                self.expand(dom, &bubble.container);
            }
        }
        self.save_job(dom, root)
    }

    /// Current mode of every detected bubble that has an identity record
    pub fn bubble_states(&self, dom: &D, root: &D::Node) -> BTreeMap<String, BubbleMode> {
        detect_bubbles(dom, root, &self.config)
            .iter()
            .filter_map(|bubble| {
                let identity = self.identities.get(&bubble.container)?;
                let mode = BubbleMode::from_collapsed(is_collapsed(dom, &bubble.container));
                Some((identity.key.clone(), mode))
            })
            .collect()
    }

    /// The write a toggle or command produces under the active persistence mode
    fn save_job(&mut self, dom: &D, root: &D::Node) -> Option<SaveJob> {
        if self.navigating {
            log::debug!("Navigation away from {} pending, not saving", self.conversation_key);
            return None;
        }
        let bubble_states = match self.settings.persistence {
            PersistenceMode::Off => return None,
            PersistenceMode::ConversationDefault => None,
            PersistenceMode::PerBubble => Some(self.bubble_states(dom, root)),
        };
        let state = ConversationState::new(self.default_mode, bubble_states);
        self.persisted = Some(state.clone());
        Some(SaveJob {
            conversation_key: self.conversation_key.clone(),
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MESSAGE_ID_ATTRIBUTE, ROLE_ATTRIBUTE};
    use crate::dom::{MemoryDom, NodeId};

    fn page() -> (MemoryDom, NodeId) {
        let mut dom = MemoryDom::new();
        let main = dom.element(dom.body_node(), "main");
        (dom, main)
    }

    fn add_bubble(dom: &mut MemoryDom, main: NodeId, role: &str, id: Option<&str>) -> NodeId {
        let container = dom.element(main, "div");
        dom.set_attr(container, ROLE_ATTRIBUTE, role);
        if let Some(id) = id {
            dom.set_attr(container, MESSAGE_ID_ATTRIBUTE, id);
        }
        dom.set_rendered_height(container, 300.0);
        let body = dom.element(container, "div");
        dom.set_attr(body, "class", "markdown");
        dom.set_own_text(body, "Some long answer");
        dom.set_computed(body, "line-height", "20px");
        dom.set_computed(body, "font-size", "16px");
        container
    }

    fn session(settings: Settings) -> Session<MemoryDom> {
        Session::new(EngineConfig::default(), settings, "aaa")
    }

    #[test]
    fn attaches_one_control_per_bubble() {
        let (mut dom, main) = page();
        let a = add_bubble(&mut dom, main, "user", Some("m1"));
        let b = add_bubble(&mut dom, main, "assistant", Some("m2"));
        let mut s = session(Settings::default());

        let report = s.reconcile(&mut dom, &main, None);
        assert_eq!(report.detected, 2);
        assert_eq!(report.attached.len(), 2);
        assert_eq!(s.key_of(&a), Some("m1"));
        assert_eq!(s.key_of(&b), Some("m2"));

        let again = s.reconcile(&mut dom, &main, None);
        assert!(again.attached.is_empty());
        assert_eq!(again.initialized, 0);
        assert_eq!(dom.children(a).len(), 2);
    }

    #[test]
    fn conversation_default_applies_to_new_bubbles() {
        let (mut dom, main) = page();
        let a = add_bubble(&mut dom, main, "assistant", None);
        let settings = Settings {
            persistence: PersistenceMode::ConversationDefault,
            ..Settings::default()
        };
        let mut s = session(settings);
        s.load_conversation(Some(ConversationState::new(BubbleMode::Collapsed, None)));

        let report = s.reconcile_current(&mut dom, &main);
        assert_eq!(report.collapsed, 1);
        assert!(s.is_collapsed(&dom, &a));
    }

    #[test]
    fn per_bubble_entries_ignored_outside_per_bubble_mode() {
        let (mut dom, main) = page();
        let a = add_bubble(&mut dom, main, "assistant", Some("m1"));
        let mut states = BTreeMap::new();
        states.insert("m1".to_string(), BubbleMode::Collapsed);
        let settings = Settings {
            persistence: PersistenceMode::Off,
            ..Settings::default()
        };
        let mut s = session(settings);
        s.load_conversation(Some(ConversationState::new(BubbleMode::Expanded, Some(states))));

        s.reconcile_current(&mut dom, &main);
        assert!(!s.is_collapsed(&dom, &a));
    }

    #[test]
    fn toggle_produces_snapshot_in_per_bubble_mode() {
        let (mut dom, main) = page();
        let a = add_bubble(&mut dom, main, "assistant", Some("m1"));
        add_bubble(&mut dom, main, "user", Some("m2"));
        let mut s = session(Settings::default());
        s.reconcile(&mut dom, &main, None);

        let job = s.toggle(&mut dom, &main, &a).unwrap();
        assert_eq!(job.conversation_key, "aaa");
        let states = job.state.bubble_states.unwrap();
        assert_eq!(states["m1"], BubbleMode::Collapsed);
        assert_eq!(states["m2"], BubbleMode::Expanded);
        assert_eq!(s.persisted().unwrap().bubble_state("m1"), Some(BubbleMode::Collapsed));
    }

    #[test]
    fn toggle_saves_default_only_in_conversation_mode() {
        let (mut dom, main) = page();
        let a = add_bubble(&mut dom, main, "assistant", None);
        let settings = Settings {
            persistence: PersistenceMode::ConversationDefault,
            ..Settings::default()
        };
        let mut s = session(settings);
        s.reconcile(&mut dom, &main, None);

        let job = s.toggle(&mut dom, &main, &a).unwrap();
        assert!(job.state.bubble_states.is_none());
        assert_eq!(job.state.default_mode, Some(BubbleMode::Expanded));
        assert!(s.is_collapsed(&dom, &a));
    }

    #[test]
    fn toggle_without_persistence_writes_nothing() {
        let (mut dom, main) = page();
        let a = add_bubble(&mut dom, main, "assistant", None);
        let settings = Settings {
            persistence: PersistenceMode::Off,
            ..Settings::default()
        };
        let mut s = session(settings);
        s.reconcile(&mut dom, &main, None);

        assert!(s.toggle(&mut dom, &main, &a).is_none());
        assert!(s.is_collapsed(&dom, &a));
        assert!(s.toggle(&mut dom, &main, &a).is_none());
        assert!(!s.is_collapsed(&dom, &a));
    }

    #[test]
    fn removed_bubbles_are_swept() {
        let (mut dom, main) = page();
        let a = add_bubble(&mut dom, main, "assistant", Some("m1"));
        add_bubble(&mut dom, main, "user", Some("m2"));
        let mut s = session(Settings::default());
        s.reconcile(&mut dom, &main, None);
        assert_eq!(s.known_bubbles(), 2);

        dom.remove(a);
        let report = s.reconcile(&mut dom, &main, None);
        assert_eq!(report.swept, 1);
        assert_eq!(s.known_bubbles(), 1);
        assert_eq!(s.control_count(), 1);
    }

    #[test]
    fn failing_bubble_does_not_abort_the_pass() {
        let (mut dom, main) = page();
        let broken = add_bubble(&mut dom, main, "assistant", Some("m1"));
        let healthy = add_bubble(&mut dom, main, "assistant", Some("m2"));
        let broken_body = dom.children(broken)[0];
        dom.fail_style_writes(broken_body, "max-height");

        let mut s = session(Settings {
            default_mode: BubbleMode::Collapsed,
            ..Settings::default()
        });
        let report = s.reconcile(&mut dom, &main, None);

        assert_eq!(report.initialized, 2);
        assert_eq!(report.collapsed, 1);
        assert!(!s.is_collapsed(&dom, &broken));
        assert!(s.is_collapsed(&dom, &healthy));
    }

    #[test]
    fn invalid_settings_update_keeps_previous() {
        let mut s = session(Settings::default());
        let err = s
            .update_settings(Settings {
                collapsed_lines: 2,
                ..Settings::default()
            })
            .unwrap_err();
        assert_eq!(err, SettingsError::CollapsedLinesOutOfRange(2));
        assert_eq!(s.settings().collapsed_lines, 5);

        s.update_settings(Settings {
            collapsed_lines: 8,
            ..Settings::default()
        })
        .unwrap();
        assert_eq!(s.settings().collapsed_lines, 8);
    }

    #[test]
    fn missing_stored_default_falls_back_to_settings() {
        let (mut dom, main) = page();
        let a = add_bubble(&mut dom, main, "assistant", Some("m1"));
        let b = add_bubble(&mut dom, main, "user", Some("m2"));
        let mut states = BTreeMap::new();
        states.insert("m1".to_string(), BubbleMode::Expanded);
        let mut s = session(Settings {
            default_mode: BubbleMode::Collapsed,
            ..Settings::default()
        });
        s.load_conversation(Some(ConversationState {
            default_mode: None,
            bubble_states: Some(states),
            ..ConversationState::new(BubbleMode::Expanded, None)
        }));

        s.reconcile_current(&mut dom, &main);
        assert_eq!(s.default_mode(), BubbleMode::Collapsed);
        assert!(!s.is_collapsed(&dom, &a));
        assert!(s.is_collapsed(&dom, &b));
    }

    #[test]
    fn no_saves_while_navigation_is_pending() {
        let (mut dom, main) = page();
        let a = add_bubble(&mut dom, main, "assistant", Some("m1"));
        let mut s = session(Settings::default());
        s.reconcile(&mut dom, &main, None);

        s.begin_navigation();
        assert!(s.toggle(&mut dom, &main, &a).is_none());
        assert!(s.is_collapsed(&dom, &a));
        assert!(s
            .apply_command(&mut dom, &main, Command::ExpandAll)
            .is_none());
        assert!(s.persisted().is_none());

        s.reset("bbb", Settings::default());
        s.reconcile(&mut dom, &main, None);
        let job = s.toggle(&mut dom, &main, &a).unwrap();
        assert_eq!(job.conversation_key, "bbb");
    }

    #[test]
    fn sweep_runs_without_a_reconcile() {
        let (mut dom, main) = page();
        let a = add_bubble(&mut dom, main, "assistant", Some("m1"));
        add_bubble(&mut dom, main, "user", Some("m2"));
        let mut s = session(Settings::default());
        s.reconcile(&mut dom, &main, None);

        dom.remove(a);
        assert_eq!(s.sweep(&dom), 1);
        assert_eq!(s.known_bubbles(), 1);
        assert_eq!(s.control_count(), 1);
        assert!(s.control_of(&a).is_none());
    }

    #[test]
    fn nested_containers_get_separate_controls() {
        // a short marker climbs to root's direct child, which also holds
        // a complete message of its own
        let (mut dom, main) = page();
        let outer = dom.element(main, "div");
        let tall = dom.element(outer, "div");
        dom.set_attr(tall, ROLE_ATTRIBUTE, "assistant");
        dom.set_rendered_height(tall, 200.0);
        let body = dom.element(tall, "div");
        dom.set_attr(body, "class", "markdown");
        dom.set_computed(body, "line-height", "20px");
        let small = dom.element(outer, "div");
        dom.set_attr(small, ROLE_ATTRIBUTE, "user");
        dom.set_rendered_height(small, 10.0);

        let mut s = session(Settings::default());
        let report = s.reconcile(&mut dom, &main, None);

        assert_eq!(report.detected, 2);
        assert_eq!(report.attached.len(), 2);
        let tall_control = s.control_of(&tall).copied().unwrap();
        let outer_control = s.control_of(&outer).copied().unwrap();
        assert_ne!(tall_control, outer_control);
        assert_eq!(dom.parent(&tall_control), Some(tall));
        assert_eq!(dom.parent(&outer_control), Some(outer));

        // a fresh session adopts each bubble's own control
        s.reset("bbb", Settings::default());
        let again = s.reconcile(&mut dom, &main, None);
        assert!(again.attached.is_empty());
        assert_eq!(s.control_of(&tall), Some(&tall_control));
        assert_eq!(s.control_of(&outer), Some(&outer_control));
    }
}
