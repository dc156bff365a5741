use std::cell::Cell;
use std::hash::{Hash, Hasher};

use js_sys::WeakMap;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlElement, Window};

use crate::dom::{DomError, HostDom};

#[wasm_bindgen]
extern "C" {
    /// JS `WeakRef` to an element
    #[wasm_bindgen(js_name = WeakRef)]
    #[derive(Debug, Clone)]
    type ElementRef;

    #[wasm_bindgen(constructor, js_class = "WeakRef")]
    fn new(target: &Element) -> ElementRef;

    #[wasm_bindgen(method, js_class = "WeakRef", js_name = deref)]
    fn target(this: &ElementRef) -> Option<Element>;
}

/// Non-owning element handle with a stable identity.
///
/// Two handles for the same element compare equal. Neither the id (kept in a
/// JS `WeakMap`) nor the handle (a `WeakRef`) keeps the element alive, so
/// node-keyed tables never hold on to removed bubbles. A target created or
/// dereferenced in the current task stays alive until the task ends.
#[derive(Debug, Clone)]
pub struct WebNode {
    id: u32,
    target: ElementRef,
}

impl WebNode {
    /// The element, unless it has been garbage collected
    pub fn element(&self) -> Option<Element> {
        self.target.target()
    }

    fn live(&self) -> Result<Element, DomError> {
        self.element().ok_or(DomError::Detached)
    }

    fn html(&self) -> Result<HtmlElement, DomError> {
        self.live()?
            .dyn_into::<HtmlElement>()
            .map_err(|_| DomError::Operation("not an HTML element".to_string()))
    }
}

impl PartialEq for WebNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WebNode {}

impl Hash for WebNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

pub struct WebDom {
    window: Window,
    document: Document,
    ids: WeakMap,
    next_id: Cell<u32>,
}

impl WebDom {
    pub fn new() -> Option<Self> {
        let window = web_sys::window()?;
        let document = window.document()?;
        Some(Self {
            window,
            document,
            ids: WeakMap::new(),
            next_id: Cell::new(0),
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn href(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }

    pub fn pathname(&self) -> String {
        self.window.location().pathname().unwrap_or_default()
    }

    pub fn wrap(&self, element: Element) -> WebNode {
        let existing = self.ids.get(element.as_ref());
        let id = match existing.as_f64() {
            Some(id) => id as u32,
            None => {
                let id = self.next_id.get();
                self.next_id.set(id.wrapping_add(1));
                self.ids.set(element.as_ref(), &JsValue::from(id));
                id
            }
        };
        WebNode {
            id,
            target: ElementRef::new(&element),
        }
    }

    fn collect(&self, root: &WebNode, selector: &str) -> Vec<WebNode> {
        let Some(root) = root.element() else {
            return Vec::new();
        };
        let Ok(list) = root.query_selector_all(selector) else {
            log::warn!("Invalid selector {selector}");
            return Vec::new();
        };
        (0..list.length())
            .filter_map(|i| list.get(i))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .map(|element| self.wrap(element))
            .collect()
    }

    fn first(&self, root: &WebNode, selector: &str) -> Option<WebNode> {
        let element = root.element()?.query_selector(selector).ok()??;
        Some(self.wrap(element))
    }
}

fn js_error(err: JsValue) -> DomError {
    DomError::Operation(format!("{err:?}"))
}

impl HostDom for WebDom {
    type Node = WebNode;

    fn query_selector(&self, selector: &str) -> Option<WebNode> {
        let element = self.document.query_selector(selector).ok()??;
        Some(self.wrap(element))
    }

    fn body(&self) -> Option<WebNode> {
        self.document.body().map(|body| self.wrap(body.into()))
    }

    fn parent(&self, node: &WebNode) -> Option<WebNode> {
        let parent = node.element()?.parent_element()?;
        Some(self.wrap(parent))
    }

    fn is_connected(&self, node: &WebNode) -> bool {
        node.element().is_some_and(|el| el.is_connected())
    }

    fn attribute(&self, node: &WebNode, name: &str) -> Option<String> {
        node.element()?.get_attribute(name)
    }

    fn has_class(&self, node: &WebNode, class: &str) -> bool {
        node.element()
            .is_some_and(|el| el.class_list().contains(class))
    }

    fn rendered_height(&self, node: &WebNode) -> f64 {
        node.html()
            .map(|el| f64::from(el.offset_height()))
            .unwrap_or(0.0)
    }

    fn text_content(&self, node: &WebNode) -> String {
        node.element()
            .and_then(|el| el.text_content())
            .unwrap_or_default()
    }

    fn elements_with_attribute(&self, root: &WebNode, name: &str) -> Vec<WebNode> {
        self.collect(root, &format!("[{name}]"))
    }

    fn first_descendant_with_class_fragment(
        &self,
        root: &WebNode,
        fragments: &[&str],
    ) -> Option<WebNode> {
        if fragments.is_empty() {
            return None;
        }
        let selector = fragments
            .iter()
            .map(|fragment| format!("[class*=\"{fragment}\"]"))
            .collect::<Vec<_>>()
            .join(", ");
        self.first(root, &selector)
    }

    fn child_with_class(&self, parent: &WebNode, class: &str) -> Option<WebNode> {
        self.first(parent, &format!(":scope > .{class}"))
    }

    fn computed_style(&self, node: &WebNode, property: &str) -> Result<String, DomError> {
        let el = node.live()?;
        if !el.is_connected() {
            return Err(DomError::Detached);
        }
        let style = self
            .window
            .get_computed_style(&el)
            .map_err(js_error)?
            .ok_or_else(|| DomError::StyleUnavailable(property.to_string()))?;
        style.get_property_value(property).map_err(js_error)
    }

    fn inline_style(&self, node: &WebNode, property: &str) -> Result<String, DomError> {
        node.html()?
            .style()
            .get_property_value(property)
            .map_err(js_error)
    }

    fn set_inline_style(
        &mut self,
        node: &WebNode,
        property: &str,
        value: &str,
    ) -> Result<(), DomError> {
        let style = node.html()?.style();
        if value.is_empty() {
            style.remove_property(property).map_err(js_error)?;
            Ok(())
        } else {
            style.set_property(property, value).map_err(js_error)
        }
    }

    fn add_class(&mut self, node: &WebNode, class: &str) -> Result<(), DomError> {
        node.live()?.class_list().add_1(class).map_err(js_error)
    }

    fn remove_class(&mut self, node: &WebNode, class: &str) -> Result<(), DomError> {
        node.live()?.class_list().remove_1(class).map_err(js_error)
    }

    fn create_element(&mut self, tag: &str) -> Result<WebNode, DomError> {
        let element = self.document.create_element(tag).map_err(js_error)?;
        Ok(self.wrap(element))
    }

    fn set_attribute(&mut self, node: &WebNode, name: &str, value: &str) -> Result<(), DomError> {
        node.live()?.set_attribute(name, value).map_err(js_error)
    }

    fn set_text(&mut self, node: &WebNode, text: &str) -> Result<(), DomError> {
        node.live()?.set_text_content(Some(text));
        Ok(())
    }

    fn append_child(&mut self, parent: &WebNode, child: &WebNode) -> Result<(), DomError> {
        let parent = parent.live()?;
        if !parent.is_connected() {
            return Err(DomError::Detached);
        }
        parent
            .append_child(&child.live()?)
            .map(|_| ())
            .map_err(js_error)
    }
}
