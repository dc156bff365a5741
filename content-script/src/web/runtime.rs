use std::cell::RefCell;
use std::rc::{Rc, Weak};

use gloo_timers::callback::{Interval, Timeout};
use js_sys::Reflect;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{
    Element, Event, EventTarget, KeyboardEvent, MutationObserver, MutationObserverInit,
    MutationRecord,
};

use shared_types::{is_supported_page, Command};

use crate::config::{EngineConfig, CONTROL_CLASS};
use crate::detect::conversation_root;
use crate::navigation::{conversation_key, NavigationSignal, NavigationTracker};
use crate::observer::{classify_batch, BatchVerdict, DebounceSlot};
use crate::session::Session;
use crate::store::{drain_saves, load_conversation, load_settings, SaveQueue};

use super::dom::{WebDom, WebNode};
use super::store::{from_js, ExtensionStore};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["browser", "runtime", "onMessage"], js_name = addListener)]
    fn add_message_listener(listener: &Closure<dyn FnMut(JsValue)>);
}

// ============================================================================
// Runtime State
// ============================================================================

type Shared = Rc<RefCell<Runtime>>;

struct Runtime {
    dom: WebDom,
    session: Session<WebDom>,
    root: WebNode,
    tracker: NavigationTracker,
    saves: SaveQueue,
    debounce: DebounceSlot<Timeout>,
    observer: Option<MutationObserver>,
    listeners: Option<Listeners>,
}

/// Page-lifetime subscriptions. Every closure holds only a weak handle to the
/// runtime, so keeping them here creates no cycle.
struct Listeners {
    _on_click: Closure<dyn FnMut(Event)>,
    _on_keydown: Closure<dyn FnMut(KeyboardEvent)>,
    _on_mutations: Closure<dyn FnMut(js_sys::Array, MutationObserver)>,
    _on_message: Closure<dyn FnMut(JsValue)>,
    _on_navigate: Closure<dyn FnMut(Event)>,
    _poll: Interval,
}

fn millis(duration: std::time::Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

// ============================================================================
// Entry Point
// ============================================================================

#[wasm_bindgen(start)]
pub fn start() {
    wasm_logger::init(wasm_logger::Config::default());

    let href = web_sys::window()
        .and_then(|window| window.location().href().ok())
        .unwrap_or_default();
    if !is_supported_page(&href) {
        log::debug!("Not a supported chat page: {href}");
        return;
    }

    spawn_local(async {
        if let Err(e) = run().await {
            log::error!("Failed to start bubble folding: {e:?}");
        }
    });
}

async fn run() -> Result<(), JsValue> {
    let dom = WebDom::new().ok_or_else(|| JsValue::from_str("no document available"))?;
    let config = EngineConfig::default();
    let root = conversation_root(&dom, &config)
        .ok_or_else(|| JsValue::from_str("no conversation root"))?;

    let store = ExtensionStore;
    let settings = load_settings(&store).await;
    let key = conversation_key(&dom.pathname());
    let state = load_conversation(&store, &key).await;

    let mut session = Session::new(config, settings, key);
    session.load_conversation(state);

    let (saves, jobs) = SaveQueue::new();
    spawn_local(async move { drain_saves(&store, jobs).await });

    let tracker = NavigationTracker::new(dom.href());
    let runtime = Rc::new(RefCell::new(Runtime {
        dom,
        session,
        root,
        tracker,
        saves,
        debounce: DebounceSlot::new(),
        observer: None,
        listeners: None,
    }));

    reconcile(&runtime);
    let listeners = subscribe(&runtime)?;
    runtime.borrow_mut().listeners = Some(listeners);
    log::info!("Bubble folding active");
    Ok(())
}

// ============================================================================
// Reconciliation
// ============================================================================

fn reconcile(shared: &Shared) {
    let Ok(mut rt) = shared.try_borrow_mut() else {
        log::debug!("Runtime busy, skipping reconciliation");
        return;
    };
    let Runtime {
        dom, session, root, ..
    } = &mut *rt;
    let report = session.reconcile_current(dom, root);
    if !report.attached.is_empty() {
        log::debug!("Attached {} toggle controls", report.attached.len());
    }
}

fn schedule_reconcile(shared: &Shared, records: usize, added_nodes: usize) {
    let Ok(mut rt) = shared.try_borrow_mut() else {
        return;
    };
    let config = rt.session.config();
    match classify_batch(records, added_nodes, config) {
        BatchVerdict::Schedule => {}
        BatchVerdict::Ignore => {
            let Runtime { dom, session, .. } = &mut *rt;
            session.sweep(dom);
            return;
        }
        BatchVerdict::Overload => return,
    }
    let delay = millis(rt.session.config().debounce);
    let weak = Rc::downgrade(shared);
    rt.debounce.replace(Timeout::new(delay, move || {
        if let Some(shared) = weak.upgrade() {
            reconcile(&shared);
        }
    }));
}

/// (Re)attach the mutation observer to the current conversation root
fn observe_root(rt: &Runtime) {
    let Some(observer) = &rt.observer else {
        return;
    };
    observer.disconnect();
    let Some(root) = rt.root.element() else {
        log::warn!("Conversation root is gone, not observing");
        return;
    };
    let init = MutationObserverInit::new();
    init.set_child_list(true);
    init.set_subtree(true);
    if let Err(e) = observer.observe_with_options(&root, &init) {
        log::error!("Failed to observe conversation root: {e:?}");
    }
}

// ============================================================================
// User Input and Commands
// ============================================================================

/// Toggle the bubble owning the control at `target`, if any
fn toggle_from(shared: &Shared, target: Option<EventTarget>) -> bool {
    let Some(target) = target.and_then(|t| t.dyn_into::<Element>().ok()) else {
        return false;
    };
    let Ok(Some(control)) = target.closest(&format!(".{CONTROL_CLASS}")) else {
        return false;
    };
    let Some(container) = control.parent_element() else {
        return false;
    };
    check_navigation(shared, NavigationSignal::Interaction);
    let Ok(mut rt) = shared.try_borrow_mut() else {
        return false;
    };
    let Runtime {
        dom,
        session,
        root,
        saves,
        ..
    } = &mut *rt;

    let control = dom.wrap(control);
    let container = dom.wrap(container);
    if session.control_of(&container) != Some(&control) {
        return false;
    }
    if let Some(job) = session.toggle(dom, root, &container) {
        saves.enqueue(job);
    }
    true
}

fn apply_command(shared: &Shared, message: JsValue) {
    let command = match from_js(&message).map(serde_json::from_value::<Command>) {
        Ok(Ok(command)) => command,
        _ => {
            log::debug!("Ignoring message {message:?}");
            return;
        }
    };
    check_navigation(shared, NavigationSignal::Interaction);
    let Ok(mut rt) = shared.try_borrow_mut() else {
        log::warn!("Runtime busy, dropping {command:?}");
        return;
    };
    let Runtime {
        dom,
        session,
        root,
        saves,
        ..
    } = &mut *rt;
    if let Some(job) = session.apply_command(dom, root, command) {
        saves.enqueue(job);
    }
}

// ============================================================================
// Navigation
// ============================================================================

fn check_navigation(shared: &Shared, signal: NavigationSignal) {
    let change = {
        let Ok(mut rt) = shared.try_borrow_mut() else {
            return;
        };
        let href = rt.dom.href();
        let change = rt.tracker.observe(&href, signal);
        if change.is_some() {
            rt.session.begin_navigation();
        }
        change
    };
    if let Some(change) = change {
        log::info!("Conversation changed: {} -> {}", change.from, change.to);
        let shared = shared.clone();
        spawn_local(async move { switch_conversation(&shared).await });
    }
}

/// Reload settings and stored state for the new address, then start the
/// session over against it.
async fn switch_conversation(shared: &Shared) {
    let key = conversation_key(&shared.borrow().dom.pathname());
    let store = ExtensionStore;
    let settings = load_settings(&store).await;
    let state = load_conversation(&store, &key).await;

    {
        let mut rt = shared.borrow_mut();
        if conversation_key(&rt.dom.pathname()) != key {
            log::debug!("Navigation to {key} superseded before load finished");
            return;
        }
        rt.session.reset(key, settings);
        rt.session.load_conversation(state);

        if let Some(root) = conversation_root(&rt.dom, rt.session.config()) {
            if root != rt.root {
                rt.root = root;
                observe_root(&rt);
            }
        }
    }
    reconcile(shared);
}

// ============================================================================
// Subscriptions
// ============================================================================

fn weak_handler<A: 'static>(
    shared: &Shared,
    handler: impl Fn(&Shared, A) + 'static,
) -> impl FnMut(A) + 'static {
    let weak: Weak<RefCell<Runtime>> = Rc::downgrade(shared);
    move |arg| {
        if let Some(shared) = weak.upgrade() {
            handler(&shared, arg);
        }
    }
}

fn subscribe(shared: &Shared) -> Result<Listeners, JsValue> {
    let rt = shared.borrow();
    let window = rt.dom.window();
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("no document available"))?;

    // Controls are created and discarded with their bubbles, so input is
    // handled once at the document level. Capture phase keeps host handlers
    // from swallowing it.
    let on_click = Closure::<dyn FnMut(Event)>::new(weak_handler(shared, |shared, e: Event| {
        if toggle_from(shared, e.target()) {
            e.prevent_default();
            e.stop_propagation();
        }
    }));
    document.add_event_listener_with_callback_and_bool(
        "click",
        on_click.as_ref().unchecked_ref(),
        true,
    )?;

    let on_keydown = Closure::<dyn FnMut(KeyboardEvent)>::new(weak_handler(
        shared,
        |shared, e: KeyboardEvent| {
            if !matches!(e.key().as_str(), "Enter" | " ") {
                return;
            }
            if toggle_from(shared, e.target()) {
                e.prevent_default();
                e.stop_propagation();
            }
        },
    ));
    document.add_event_listener_with_callback_and_bool(
        "keydown",
        on_keydown.as_ref().unchecked_ref(),
        true,
    )?;

    let on_mutations = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new({
        let weak = Rc::downgrade(shared);
        move |records: js_sys::Array, _observer: MutationObserver| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let added = records
                .iter()
                .filter_map(|record| record.dyn_into::<MutationRecord>().ok())
                .map(|record| record.added_nodes().length() as usize)
                .sum();
            schedule_reconcile(&shared, records.length() as usize, added);
        }
    });
    let observer = MutationObserver::new(on_mutations.as_ref().unchecked_ref())?;

    let on_message = Closure::<dyn FnMut(JsValue)>::new(weak_handler(shared, apply_command));
    add_message_listener(&on_message);

    let on_navigate = Closure::<dyn FnMut(Event)>::new(weak_handler(shared, |shared, e: Event| {
        let signal = if e.type_() == "popstate" {
            NavigationSignal::PopState
        } else {
            NavigationSignal::NavigateEvent
        };
        check_navigation(shared, signal);
    }));
    window.add_event_listener_with_callback("popstate", on_navigate.as_ref().unchecked_ref())?;
    match Reflect::get(window, &JsValue::from_str("navigation")) {
        Ok(navigation) if navigation.is_object() => {
            let target: EventTarget = navigation.unchecked_into();
            target.add_event_listener_with_callback(
                "navigatesuccess",
                on_navigate.as_ref().unchecked_ref(),
            )?;
        }
        _ => log::debug!("Navigation API unavailable, relying on popstate and polling"),
    }

    let poll = Interval::new(millis(rt.session.config().poll_interval), {
        let weak = Rc::downgrade(shared);
        move || {
            if let Some(shared) = weak.upgrade() {
                check_navigation(&shared, NavigationSignal::Poll);
            }
        }
    });

    drop(rt);
    shared.borrow_mut().observer = Some(observer);
    observe_root(&shared.borrow());

    Ok(Listeners {
        _on_click: on_click,
        _on_keydown: on_keydown,
        _on_mutations: on_mutations,
        _on_message: on_message,
        _on_navigate: on_navigate,
        _poll: poll,
    })
}
