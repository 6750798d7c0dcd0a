#![forbid(unsafe_code)]

//! In-memory DOM host for native tests.
//!
//! [`FakeHost`] models just enough of a browser page for the stabilizer:
//! a flat element arena with parent links, ids and classes; root custom
//! properties; the body's overflow style; listener registrations that tests
//! fire with [`FakeHost::dispatch`]; and frame callbacks that run when the
//! test calls [`FakeHost::run_frames`]. Clones share the same page.
//!
//! Selector support is limited to `#id`, `.class`, `*` and comma lists of
//! those; anything else is reported as an invalid selector. Insertion order
//! stands in for document order.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::{Rc, Weak};

use crate::error::HostError;
use crate::host::{EventKind, Handler, Host, ListenTarget};
use crate::input::{Disposition, HostEvent};
use crate::teardown::Release;

/// Element handle in a [`FakeHost`] page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug)]
struct Node {
    id: String,
    classes: Vec<String>,
    parent: Option<NodeId>,
}

type SharedHandler = Rc<RefCell<Handler<NodeId>>>;

struct Registration {
    target: ListenTarget,
    kind: EventKind,
    handler: SharedHandler,
}

struct Page {
    nodes: Vec<Node>,
    inner_height: f64,
    visual_viewport_height: Option<f64>,
    device_pixel_ratio: f64,
    loading: bool,
    root_props: BTreeMap<String, String>,
    root_writes: Vec<(String, Option<String>)>,
    body_overflow: Option<String>,
    listeners: BTreeMap<u64, Registration>,
    next_listener: u64,
    frames: BTreeMap<u64, Box<dyn FnOnce()>>,
    next_frame: u64,
    queries: usize,
    failing_releases: HashSet<EventKind>,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            inner_height: 800.0,
            visual_viewport_height: None,
            device_pixel_ratio: 1.0,
            loading: false,
            root_props: BTreeMap::new(),
            root_writes: Vec::new(),
            body_overflow: Some(String::new()),
            listeners: BTreeMap::new(),
            next_listener: 0,
            frames: BTreeMap::new(),
            next_frame: 0,
            queries: 0,
            failing_releases: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Simple<'a> {
    Any,
    Id(&'a str),
    Class(&'a str),
}

fn parse_simple(part: &str) -> Option<Simple<'_>> {
    if part == "*" {
        return Some(Simple::Any);
    }
    let valid_name = |name: &str| {
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    };
    if let Some(name) = part.strip_prefix('#') {
        return valid_name(name).then_some(Simple::Id(name));
    }
    if let Some(name) = part.strip_prefix('.') {
        return valid_name(name).then_some(Simple::Class(name));
    }
    None
}

impl Page {
    fn query(&self, selector: &str) -> Result<Vec<NodeId>, HostError> {
        let parts: Option<Vec<Simple<'_>>> =
            selector.split(',').map(str::trim).map(parse_simple).collect();
        let Some(parts) = parts else {
            return Err(HostError::InvalidSelector {
                selector: selector.to_owned(),
            });
        };
        let hit = |node: &Node| {
            parts.iter().any(|part| match part {
                Simple::Any => true,
                Simple::Id(id) => node.id == *id,
                Simple::Class(class) => node.classes.iter().any(|c| c == class),
            })
        };
        Ok(self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| hit(node))
            .map(|(idx, _)| NodeId(idx))
            .collect())
    }
}

/// Shared in-memory page implementing [`Host`].
#[derive(Clone, Default)]
pub struct FakeHost {
    page: Rc<RefCell<Page>>,
}

impl core::fmt::Debug for FakeHost {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let page = self.page.borrow();
        f.debug_struct("FakeHost")
            .field("nodes", &page.nodes.len())
            .field("listeners", &page.listeners.len())
            .field("frames", &page.frames.len())
            .finish()
    }
}

impl FakeHost {
    /// Page with an 800px window, ratio 1, no visual viewport, loaded, with a body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_element(&self, parent: Option<NodeId>, id: &str, classes: &[&str]) -> NodeId {
        let mut page = self.page.borrow_mut();
        page.nodes.push(Node {
            id: id.to_owned(),
            classes: classes.iter().map(|c| (*c).to_owned()).collect(),
            parent,
        });
        NodeId(page.nodes.len() - 1)
    }

    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<NodeId> {
        self.page
            .borrow()
            .nodes
            .iter()
            .position(|n| n.id == id)
            .map(NodeId)
    }

    pub fn set_inner_height(&self, height: f64) {
        self.page.borrow_mut().inner_height = height;
    }

    pub fn set_visual_viewport_height(&self, height: Option<f64>) {
        self.page.borrow_mut().visual_viewport_height = height;
    }

    pub fn set_device_pixel_ratio(&self, ratio: f64) {
        self.page.borrow_mut().device_pixel_ratio = ratio;
    }

    pub fn set_loading(&self, loading: bool) {
        self.page.borrow_mut().loading = loading;
    }

    /// Simulate a page whose `<body>` has not been parsed yet.
    pub fn remove_body(&self) {
        self.page.borrow_mut().body_overflow = None;
    }

    /// Set the body's inline overflow directly (creating the body if needed).
    pub fn preset_body_overflow(&self, value: &str) {
        self.page.borrow_mut().body_overflow = Some(value.to_owned());
    }

    /// Set a root custom property directly, bypassing write accounting.
    pub fn preset_root_property(&self, name: &str, value: &str) {
        self.page
            .borrow_mut()
            .root_props
            .insert(name.to_owned(), value.to_owned());
    }

    /// Finish loading: create the body if missing and fire `DOMContentLoaded`.
    pub fn finish_loading(&self) {
        {
            let mut page = self.page.borrow_mut();
            page.loading = false;
            if page.body_overflow.is_none() {
                page.body_overflow = Some(String::new());
            }
        }
        self.dispatch(
            ListenTarget::Document,
            EventKind::DomContentLoaded,
            &HostEvent::DocumentReady,
        );
    }

    /// Make releasing listeners of `kind` fail (and stay registered).
    pub fn fail_release_of(&self, kind: EventKind) {
        self.page.borrow_mut().failing_releases.insert(kind);
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.page.borrow().listeners.len()
    }

    #[must_use]
    pub fn listener_count_for(&self, target: ListenTarget, kind: EventKind) -> usize {
        self.page
            .borrow()
            .listeners
            .values()
            .filter(|r| r.target == target && r.kind == kind)
            .count()
    }

    #[must_use]
    pub fn pending_frames(&self) -> usize {
        self.page.borrow().frames.len()
    }

    #[must_use]
    pub fn query_count(&self) -> usize {
        self.page.borrow().queries
    }

    /// Writes (`Some`) and removals (`None`) of root property `name`, in order.
    #[must_use]
    pub fn root_writes(&self, name: &str) -> Vec<Option<String>> {
        self.page
            .borrow()
            .root_writes
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Fire `event` at every listener registered for `target`/`kind`.
    /// Returns `Cancel` if any handler cancelled.
    pub fn dispatch(
        &self,
        target: ListenTarget,
        kind: EventKind,
        event: &HostEvent<NodeId>,
    ) -> Disposition {
        let handlers: Vec<SharedHandler> = self
            .page
            .borrow()
            .listeners
            .values()
            .filter(|r| r.target == target && r.kind == kind)
            .map(|r| Rc::clone(&r.handler))
            .collect();
        let mut outcome = Disposition::Proceed;
        for handler in handlers {
            let mut handler = handler.borrow_mut();
            if (&mut **handler)(event).is_cancel() {
                outcome = Disposition::Cancel;
            }
        }
        outcome
    }

    /// Run every pending frame callback. Returns how many ran.
    pub fn run_frames(&self) -> usize {
        let frames = std::mem::take(&mut self.page.borrow_mut().frames);
        let count = frames.len();
        for (_, callback) in frames {
            callback();
        }
        count
    }
}

/// Listener registration guard for [`FakeHost`].
#[derive(Debug)]
pub struct FakeListener {
    page: Weak<RefCell<Page>>,
    id: u64,
    kind: EventKind,
}

impl Release for FakeListener {
    fn label(&self) -> &str {
        self.kind.dom_name()
    }

    fn release(self: Box<Self>) -> Result<(), HostError> {
        let Some(page) = self.page.upgrade() else {
            return Ok(());
        };
        let mut page = page.borrow_mut();
        if page.failing_releases.contains(&self.kind) {
            return Err(HostError::release(
                self.kind.dom_name(),
                "removeEventListener rejected",
            ));
        }
        page.listeners.remove(&self.id);
        Ok(())
    }
}

/// Pending frame guard for [`FakeHost`]; dropping it cancels the callback.
#[derive(Debug)]
pub struct FakeFrame {
    page: Weak<RefCell<Page>>,
    id: u64,
}

impl Drop for FakeFrame {
    fn drop(&mut self) {
        if let Some(page) = self.page.upgrade() {
            // A frame that already ran was taken out of the map by `run_frames`.
            let cancelled = page.borrow_mut().frames.remove(&self.id);
            drop(cancelled);
        }
    }
}

impl Host for FakeHost {
    type Element = NodeId;
    type Listener = FakeListener;
    type Frame = FakeFrame;

    fn inner_height(&self) -> f64 {
        self.page.borrow().inner_height
    }

    fn visual_viewport_height(&self) -> Option<f64> {
        self.page.borrow().visual_viewport_height
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.page.borrow().device_pixel_ratio
    }

    fn is_loading(&self) -> bool {
        self.page.borrow().loading
    }

    fn root_property(&self, name: &str) -> Option<String> {
        self.page.borrow().root_props.get(name).cloned()
    }

    fn set_root_property(&self, name: &str, value: &str) -> Result<(), HostError> {
        let mut page = self.page.borrow_mut();
        page.root_props.insert(name.to_owned(), value.to_owned());
        page.root_writes
            .push((name.to_owned(), Some(value.to_owned())));
        Ok(())
    }

    fn remove_root_property(&self, name: &str) -> Result<(), HostError> {
        let mut page = self.page.borrow_mut();
        page.root_props.remove(name);
        page.root_writes.push((name.to_owned(), None));
        Ok(())
    }

    fn body_overflow(&self) -> Option<String> {
        self.page.borrow().body_overflow.clone()
    }

    fn set_body_overflow(&self, value: &str) -> Result<(), HostError> {
        let mut page = self.page.borrow_mut();
        match page.body_overflow.as_mut() {
            Some(overflow) => {
                value.clone_into(overflow);
                Ok(())
            }
            None => Err(HostError::dom_write("overflow", "no body element")),
        }
    }

    fn query_all(&self, selector: &str) -> Result<Vec<NodeId>, HostError> {
        let mut page = self.page.borrow_mut();
        page.queries += 1;
        page.query(selector)
    }

    fn contains(&self, ancestor: &NodeId, node: &NodeId) -> bool {
        let page = self.page.borrow();
        let mut cursor = Some(*node);
        while let Some(current) = cursor {
            if current == *ancestor {
                return true;
            }
            cursor = page.nodes.get(current.0).and_then(|n| n.parent);
        }
        false
    }

    fn listen(
        &self,
        target: ListenTarget,
        kind: EventKind,
        handler: Handler<NodeId>,
    ) -> Result<FakeListener, HostError> {
        let mut page = self.page.borrow_mut();
        if target == ListenTarget::VisualViewport && page.visual_viewport_height.is_none() {
            return Err(HostError::TargetUnavailable { target });
        }
        let id = page.next_listener;
        page.next_listener += 1;
        page.listeners.insert(
            id,
            Registration {
                target,
                kind,
                handler: Rc::new(RefCell::new(handler)),
            },
        );
        Ok(FakeListener {
            page: Rc::downgrade(&self.page),
            id,
            kind,
        })
    }

    fn request_frame(&self, callback: Box<dyn FnOnce()>) -> FakeFrame {
        let mut page = self.page.borrow_mut();
        let id = page.next_frame;
        page.next_frame += 1;
        page.frames.insert(id, callback);
        FakeFrame {
            page: Rc::downgrade(&self.page),
            id,
        }
    }
}
