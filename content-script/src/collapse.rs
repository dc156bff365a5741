//! Visual collapse state of a bubble and its toggle control.
//!
//! The marker class on the container is the only record of whether a bubble
//! is collapsed. Every operation either fully applies or leaves the bubble as
//! it found it.

use shared_types::ButtonVisibility;

use crate::config::{EngineConfig, COLLAPSED_CLASS, CONTROL_CLASS, CONTROL_HOVER_CLASS};
use crate::dom::{DomError, HostDom};
use crate::registry::NodeTable;

const BODY_FRAGMENTS: &[&str] = &["markdown"];
const BODY_FALLBACK_FRAGMENTS: &[&str] = &["content", "message"];

const MAX_HEIGHT: &str = "max-height";
const OVERFLOW: &str = "overflow";

/// Element whose height is capped: the markdown/content block when there is
/// one, the container itself otherwise.
pub fn bubble_body<D: HostDom>(dom: &D, container: &D::Node) -> D::Node {
    dom.first_descendant_with_class_fragment(container, BODY_FRAGMENTS)
        .or_else(|| dom.first_descendant_with_class_fragment(container, BODY_FALLBACK_FRAGMENTS))
        .unwrap_or_else(|| container.clone())
}

/// Leading number of a CSS length, like `parseFloat` (`"20px"` -> 20, `"normal"` -> None)
pub fn parse_css_number(value: &str) -> Option<f64> {
    let value = value.trim_start();
    let end = value
        .char_indices()
        .find(|(idx, c)| {
            !(c.is_ascii_digit() || *c == '.' || ((*c == '-' || *c == '+') && *idx == 0))
        })
        .map(|(idx, _)| idx)
        .unwrap_or(value.len());
    value[..end].parse::<f64>().ok().filter(|n| n.is_finite())
}

/// `line_height × lines + padding`, with the line height estimated from the
/// font size when the computed value is `normal` or zero.
pub fn collapsed_height(
    line_height: &str,
    font_size: Option<&str>,
    lines: u32,
    config: &EngineConfig,
) -> Option<f64> {
    let line_height = match parse_css_number(line_height) {
        Some(px) if px > 0.0 => px,
        _ => parse_css_number(font_size?)? * config.line_height_factor,
    };
    Some(line_height * f64::from(lines) + config.padding_px)
}

pub fn is_collapsed<D: HostDom>(dom: &D, container: &D::Node) -> bool {
    dom.has_class(container, COLLAPSED_CLASS)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAttach<N> {
    /// New button appended; input listeners still need binding
    Created(N),
    /// Button from an earlier session found in the container
    Adopted(N),
    /// Already tracked
    Present,
    /// Container left the document
    Detached,
}

/// Inline values the body carried before it was first collapsed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SavedStyle {
    max_height: String,
    overflow: String,
}

/// Control associations and pre-collapse styling, keyed by bubble container
#[derive(Debug)]
pub struct CollapseController<N> {
    controls: NodeTable<N, N>,
    saved_styles: NodeTable<N, SavedStyle>,
}

impl<N: Clone + Eq + std::hash::Hash> Default for CollapseController<N> {
    fn default() -> Self {
        Self {
            controls: NodeTable::new(),
            saved_styles: NodeTable::new(),
        }
    }
}

impl<N: Clone + Eq + std::hash::Hash> CollapseController<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn control(&self, container: &N) -> Option<&N> {
        self.controls.get(container)
    }

    pub fn control_count(&self) -> usize {
        self.controls.len()
    }

    pub fn sweep<D: HostDom<Node = N>>(&mut self, dom: &D) {
        self.controls.sweep(dom);
        self.saved_styles.sweep(dom);
    }

    /// Forget every control association. Saved styles stay with their nodes
    /// until the sweep drops them.
    pub fn clear(&mut self) {
        self.controls.clear();
        self.saved_styles.clear();
    }

    pub fn collapse<D: HostDom<Node = N>>(
        &mut self,
        dom: &mut D,
        container: &N,
        lines: u32,
        config: &EngineConfig,
    ) -> Result<f64, DomError> {
        let body = bubble_body(dom, container);
        if !dom.is_connected(&body) {
            return Err(DomError::Detached);
        }

        let line_height = dom.computed_style(&body, "line-height")?;
        let font_size = dom.computed_style(&body, "font-size").ok();
        let height = collapsed_height(&line_height, font_size.as_deref(), lines, config)
            .ok_or_else(|| DomError::StyleUnavailable("line-height".to_string()))?;

        let prior = SavedStyle {
            max_height: dom.inline_style(&body, MAX_HEIGHT)?,
            overflow: dom.inline_style(&body, OVERFLOW)?,
        };
        let was_collapsed = is_collapsed(dom, container);

        let target = SavedStyle {
            max_height: format!("{height}px"),
            overflow: "hidden".to_string(),
        };
        write_style(dom, &body, &target, &prior)?;
        if let Err(err) = dom.add_class(container, COLLAPSED_CLASS) {
            let _ = write_style(dom, &body, &prior, &target);
            return Err(err);
        }

        // Later collapses must not overwrite the original values with ours.
        if !was_collapsed && !self.saved_styles.contains(container) {
            self.saved_styles.insert(container.clone(), prior);
        }
        self.sync_control(dom, container, true);
        Ok(height)
    }

    pub fn expand<D: HostDom<Node = N>>(
        &mut self,
        dom: &mut D,
        container: &N,
    ) -> Result<(), DomError> {
        let body = bubble_body(dom, container);
        if !dom.is_connected(&body) {
            return Err(DomError::Detached);
        }

        let current = SavedStyle {
            max_height: dom.inline_style(&body, MAX_HEIGHT)?,
            overflow: dom.inline_style(&body, OVERFLOW)?,
        };
        let restored = self.saved_styles.get(container).cloned().unwrap_or_default();

        write_style(dom, &body, &restored, &current)?;
        if let Err(err) = dom.remove_class(container, COLLAPSED_CLASS) {
            let _ = write_style(dom, &body, &current, &restored);
            return Err(err);
        }

        self.saved_styles.remove(container);
        self.sync_control(dom, container, false);
        Ok(())
    }

    /// Attach the toggle button unless the container already carries one.
    ///
    /// A control left behind by an earlier session (the host page may keep a
    /// container across navigations) is adopted instead of duplicated. Only a
    /// direct child counts: a button further down belongs to a nested bubble.
    pub fn attach_control<D: HostDom<Node = N>>(
        &mut self,
        dom: &mut D,
        container: &N,
        visibility: ButtonVisibility,
    ) -> Result<ControlAttach<N>, DomError> {
        if self.controls.contains(container) {
            return Ok(ControlAttach::Present);
        }
        if !dom.is_connected(container) {
            return Ok(ControlAttach::Detached);
        }
        if let Some(orphan) = dom.child_with_class(container, CONTROL_CLASS) {
            self.controls.insert(container.clone(), orphan.clone());
            let collapsed = is_collapsed(dom, container);
            self.sync_control(dom, container, collapsed);
            return Ok(ControlAttach::Adopted(orphan));
        }

        let button = dom.create_element("button")?;
        let class = match visibility {
            ButtonVisibility::Hover => format!("{CONTROL_CLASS} {CONTROL_HOVER_CLASS}"),
            ButtonVisibility::Always => CONTROL_CLASS.to_string(),
        };
        dom.set_attribute(&button, "class", &class)?;
        dom.set_attribute(&button, "type", "button")?;
        dom.set_attribute(&button, "tabindex", "0")?;
        let (label, aria) = control_labels(is_collapsed(dom, container));
        dom.set_text(&button, label)?;
        dom.set_attribute(&button, "aria-label", aria)?;

        dom.set_inline_style(container, "position", "relative")?;
        dom.append_child(container, &button)?;

        self.controls.insert(container.clone(), button.clone());
        Ok(ControlAttach::Created(button))
    }

    fn sync_control<D: HostDom<Node = N>>(&self, dom: &mut D, container: &N, collapsed: bool) {
        let Some(button) = self.controls.get(container) else {
            return;
        };
        let (label, aria) = control_labels(collapsed);
        let result = dom
            .set_text(button, label)
            .and_then(|_| dom.set_attribute(button, "aria-label", aria));
        if let Err(err) = result {
            log::warn!("Failed to update toggle label: {err}");
        }
    }
}

fn control_labels(collapsed: bool) -> (&'static str, &'static str) {
    if collapsed {
        ("Expand", "Expand message")
    } else {
        ("Collapse", "Collapse message")
    }
}

/// Write `next` onto `body`; on failure put `prior` back.
fn write_style<D: HostDom>(
    dom: &mut D,
    body: &D::Node,
    next: &SavedStyle,
    prior: &SavedStyle,
) -> Result<(), DomError> {
    let result = dom
        .set_inline_style(body, MAX_HEIGHT, &next.max_height)
        .and_then(|_| dom.set_inline_style(body, OVERFLOW, &next.overflow));
    if result.is_err() {
        let _ = dom.set_inline_style(body, MAX_HEIGHT, &prior.max_height);
        let _ = dom.set_inline_style(body, OVERFLOW, &prior.overflow);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDom, NodeId};

    struct Fixture {
        dom: MemoryDom,
        container: NodeId,
        body: NodeId,
    }

    fn fixture(line_height: &str) -> Fixture {
        let mut dom = MemoryDom::new();
        let main = dom.element(dom.body_node(), "main");
        let container = dom.element(main, "div");
        let body = dom.element(container, "div");
        dom.set_attr(body, "class", "markdown");
        dom.set_computed(body, "line-height", line_height);
        dom.set_computed(body, "font-size", "16px");
        Fixture {
            dom,
            container,
            body,
        }
    }

    #[test]
    fn body_lookup_order() {
        let mut dom = MemoryDom::new();
        let container = dom.element(dom.body_node(), "div");
        assert_eq!(bubble_body(&dom, &container), container);

        let content = dom.element(container, "div");
        dom.set_attr(content, "class", "message-content");
        assert_eq!(bubble_body(&dom, &container), content);

        let markdown = dom.element(container, "div");
        dom.set_attr(markdown, "class", "markdown");
        assert_eq!(bubble_body(&dom, &container), markdown);
    }

    #[test]
    fn css_numbers_parse_like_parse_float() {
        assert_eq!(parse_css_number("20px"), Some(20.0));
        assert_eq!(parse_css_number("22.5px"), Some(22.5));
        assert_eq!(parse_css_number("normal"), None);
        assert_eq!(parse_css_number(""), None);
        assert_eq!(parse_css_number("0px"), Some(0.0));
    }

    #[test]
    fn height_from_line_height() {
        let config = EngineConfig::default();
        assert_eq!(collapsed_height("20px", Some("16px"), 5, &config), Some(112.0));
    }

    #[test]
    fn height_estimated_from_font_size() {
        let config = EngineConfig::default();
        let normal = collapsed_height("normal", Some("10px"), 3, &config).unwrap();
        assert!((normal - (10.0 * 1.4 * 3.0 + 12.0)).abs() < 1e-9);
        let zero = collapsed_height("0px", Some("10px"), 3, &config).unwrap();
        assert!((zero - normal).abs() < 1e-9);
        assert_eq!(collapsed_height("normal", None, 3, &config), None);
    }

    #[test]
    fn collapse_applies_cap_and_marker() {
        let mut f = fixture("20px");
        let mut controller = CollapseController::new();
        let height = controller
            .collapse(&mut f.dom, &f.container, 5, &EngineConfig::default())
            .unwrap();

        assert_eq!(height, 112.0);
        assert_eq!(f.dom.inline_style(&f.body, "max-height").unwrap(), "112px");
        assert_eq!(f.dom.inline_style(&f.body, "overflow").unwrap(), "hidden");
        assert!(is_collapsed(&f.dom, &f.container));
    }

    #[test]
    fn collapse_is_idempotent() {
        let mut f = fixture("20px");
        let mut controller = CollapseController::new();
        let config = EngineConfig::default();
        controller.collapse(&mut f.dom, &f.container, 5, &config).unwrap();
        let once = f.dom.inline_style(&f.body, "max-height").unwrap();
        controller.collapse(&mut f.dom, &f.container, 5, &config).unwrap();

        assert_eq!(f.dom.inline_style(&f.body, "max-height").unwrap(), once);
        assert!(is_collapsed(&f.dom, &f.container));
    }

    #[test]
    fn expand_restores_prior_inline_styles() {
        let mut f = fixture("20px");
        f.dom
            .set_inline_style(&f.body, "max-height", "900px")
            .unwrap();
        f.dom.set_inline_style(&f.body, "overflow", "auto").unwrap();
        let mut controller = CollapseController::new();
        let config = EngineConfig::default();

        controller.collapse(&mut f.dom, &f.container, 5, &config).unwrap();
        controller.collapse(&mut f.dom, &f.container, 5, &config).unwrap();
        controller.expand(&mut f.dom, &f.container).unwrap();

        assert_eq!(f.dom.inline_style(&f.body, "max-height").unwrap(), "900px");
        assert_eq!(f.dom.inline_style(&f.body, "overflow").unwrap(), "auto");
        assert!(!is_collapsed(&f.dom, &f.container));

        controller.expand(&mut f.dom, &f.container).unwrap();
        assert_eq!(f.dom.inline_style(&f.body, "max-height").unwrap(), "");
    }

    #[test]
    fn failed_write_leaves_bubble_untouched() {
        let mut f = fixture("20px");
        f.dom.fail_style_writes(f.body, "overflow");
        let mut controller = CollapseController::new();

        let result = controller.collapse(&mut f.dom, &f.container, 5, &EngineConfig::default());
        assert!(result.is_err());
        assert_eq!(f.dom.inline_style(&f.body, "max-height").unwrap(), "");
        assert!(!is_collapsed(&f.dom, &f.container));
    }

    #[test]
    fn unreadable_style_is_an_error() {
        let mut dom = MemoryDom::new();
        let container = dom.element(dom.body_node(), "div");
        let mut controller = CollapseController::new();

        let err = controller
            .collapse(&mut dom, &container, 5, &EngineConfig::default())
            .unwrap_err();
        assert_eq!(err, DomError::StyleUnavailable("line-height".to_string()));
        assert!(!is_collapsed(&dom, &container));
    }

    #[test]
    fn detached_bubble_is_rejected() {
        let mut f = fixture("20px");
        f.dom.remove(f.container);
        let mut controller = CollapseController::new();
        let err = controller
            .collapse(&mut f.dom, &f.container, 5, &EngineConfig::default())
            .unwrap_err();
        assert_eq!(err, DomError::Detached);
    }

    #[test]
    fn control_is_attached_once_and_tracks_state() {
        let mut f = fixture("20px");
        let mut controller = CollapseController::new();
        let ControlAttach::Created(button) = controller
            .attach_control(&mut f.dom, &f.container, ButtonVisibility::Hover)
            .unwrap()
        else {
            panic!("expected a new control");
        };
        assert_eq!(f.dom.tag(button), "button");
        assert_eq!(f.dom.text_content(&button), "Collapse");
        assert!(f.dom.has_class(&button, CONTROL_HOVER_CLASS));
        assert_eq!(
            controller
                .attach_control(&mut f.dom, &f.container, ButtonVisibility::Hover)
                .unwrap(),
            ControlAttach::Present
        );
        assert_eq!(controller.control_count(), 1);

        controller
            .collapse(&mut f.dom, &f.container, 5, &EngineConfig::default())
            .unwrap();
        assert_eq!(f.dom.text_content(&button), "Expand");
        assert_eq!(
            f.dom.attribute(&button, "aria-label").as_deref(),
            Some("Expand message")
        );

        controller.expand(&mut f.dom, &f.container).unwrap();
        assert_eq!(f.dom.text_content(&button), "Collapse");
    }

    #[test]
    fn control_skipped_for_detached_container() {
        let mut f = fixture("20px");
        f.dom.remove(f.container);
        let mut controller = CollapseController::new();
        let attached = controller
            .attach_control(&mut f.dom, &f.container, ButtonVisibility::Always)
            .unwrap();
        assert_eq!(attached, ControlAttach::Detached);
        assert_eq!(controller.control_count(), 0);
    }

    #[test]
    fn leftover_control_is_adopted() {
        let mut f = fixture("20px");
        let mut first = CollapseController::new();
        let ControlAttach::Created(button) = first
            .attach_control(&mut f.dom, &f.container, ButtonVisibility::Always)
            .unwrap()
        else {
            panic!("expected a new control");
        };

        let mut second = CollapseController::new();
        assert_eq!(
            second
                .attach_control(&mut f.dom, &f.container, ButtonVisibility::Always)
                .unwrap(),
            ControlAttach::Adopted(button)
        );
        assert_eq!(second.control(&f.container), Some(&button));
        assert_eq!(f.dom.children(f.container).len(), 2);
    }
}
