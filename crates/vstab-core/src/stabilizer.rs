#![forbid(unsafe_code)]

//! The viewport stabilizer.
//!
//! [`ViewportStabilizer`] owns one activation lifecycle. While active it:
//! - keeps a `vh`-sized custom property on the root element in sync with the
//!   real viewport height, committing at most once per rendering frame, and
//! - cancels ctrl+wheel zoom-in, configured zoom keys and pinch gestures
//!   whose target lies outside the allow-list.
//!
//! All state for an activation lives in one `ActivationState` slot. It is
//! created by [`ViewportStabilizer::activate`] and taken out of the slot
//! before any teardown work runs, so calls made while tearing down see an
//! inactive stabilizer.
//!
//! Outside a browser the host reports itself unavailable and every
//! operation is a no-op:
//!
//! ```
//! use vstab_core::{InertHost, ViewportStabilizer};
//!
//! let stabilizer = ViewportStabilizer::new(InertHost, "#map");
//! assert!(!stabilizer.activate(None));
//! assert!(!stabilizer.refresh_viewport());
//! assert!(!stabilizer.deactivate());
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::allow_list::AllowList;
use crate::config::{ConfigOverrides, StabilizerConfig};
use crate::host::{EventKind, Handler, Host, ListenTarget};
use crate::input::{Disposition, GesturePhase, HostEvent, KeyInput, Modifiers, WheelInput};
use crate::repaint::{RepaintThrottle, format_px, viewport_unit_px};
use crate::teardown::{TeardownStack, UnwindReport};

const OVERFLOW_LOCKED: &str = "hidden";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScrollLock {
    Off,
    /// Waiting for the body to exist.
    Deferred,
    /// Applied; holds the body's previous inline overflow.
    Applied { previous: String },
}

struct ActivationState<H: Host> {
    config: StabilizerConfig<H::Element>,
    allow: AllowList<H::Element>,
    previous_height: Option<String>,
    repaint: RepaintThrottle<H::Frame>,
    /// Allow-list membership of the most recent touch start.
    touch_allowed: Option<bool>,
    scroll_lock: ScrollLock,
    teardown: TeardownStack,
}

struct Inner<H: Host> {
    host: H,
    available: bool,
    config: RefCell<StabilizerConfig<H::Element>>,
    active: RefCell<Option<ActivationState<H>>>,
}

/// Point-in-time view of a stabilizer, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilizerSnapshot {
    pub available: bool,
    pub active: bool,
    /// Listener registrations currently held.
    pub registrations: usize,
    pub repaint_pending: bool,
    /// Repaint requests made during the current activation.
    pub repaint_requests: u64,
    pub height_var: String,
}

/// Viewport height stabilizer and zoom-gesture guard.
pub struct ViewportStabilizer<H: Host + 'static> {
    inner: Rc<Inner<H>>,
}

impl<H: Host + 'static> core::fmt::Debug for ViewportStabilizer<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ViewportStabilizer")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl<H: Host + 'static> ViewportStabilizer<H> {
    /// Create an inactive stabilizer. Touches nothing on the host.
    pub fn new(host: H, config: impl Into<StabilizerConfig<H::Element>>) -> Self {
        let available = host.is_available();
        if !available {
            debug!("no browser environment; viewport stabilizer is inert");
        }
        Self {
            inner: Rc::new(Inner {
                host,
                available,
                config: RefCell::new(config.into().validated()),
                active: RefCell::new(None),
            }),
        }
    }

    /// Start (or restart) the stabilizer.
    ///
    /// `overrides` are merged into the stored configuration first. Activating
    /// an active stabilizer without overrides does nothing; with overrides it
    /// tears down and re-activates under the merged configuration. Returns
    /// false only when the host is not a browser.
    pub fn activate(&self, overrides: Option<ConfigOverrides<H::Element>>) -> bool {
        let supplied = overrides.is_some();
        if let Some(overrides) = overrides {
            let merged = self.inner.config.take().merged(overrides);
            self.inner.config.replace(merged);
        }
        if !self.inner.available {
            self.inner.deactivate();
            return false;
        }
        if self.is_active() {
            if !supplied {
                return true;
            }
            self.inner.deactivate();
        }
        Inner::start(&self.inner);
        true
    }

    /// Stop the stabilizer and restore what it changed. False if it was not active.
    pub fn deactivate(&self) -> bool {
        self.inner.deactivate()
    }

    /// Request a height recompute on the next frame. False if not active.
    pub fn refresh_viewport(&self) -> bool {
        Inner::schedule_recompute(&self.inner)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.borrow().is_some()
    }

    /// The configuration the next activation will use.
    #[must_use]
    pub fn config(&self) -> StabilizerConfig<H::Element> {
        self.inner.config.borrow().clone()
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.inner.host
    }

    #[must_use]
    pub fn snapshot(&self) -> StabilizerSnapshot {
        let active = self.inner.active.borrow();
        StabilizerSnapshot {
            available: self.inner.available,
            active: active.is_some(),
            registrations: active.as_ref().map_or(0, |s| s.teardown.len()),
            repaint_pending: active.as_ref().is_some_and(|s| s.repaint.is_pending()),
            repaint_requests: active.as_ref().map_or(0, |s| s.repaint.requests()),
            height_var: self.inner.config.borrow().height_var.clone(),
        }
    }

    /// Handle for an external owner (e.g. a component unmount hook).
    ///
    /// The handle keeps the stabilizer alive; when the last owner or handle is
    /// dropped the stabilizer deactivates.
    #[must_use]
    pub fn handle(&self) -> StabilizerHandle<H> {
        StabilizerHandle {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Refresh/destroy pair handed to whoever controls the stabilizer's lifetime.
pub struct StabilizerHandle<H: Host + 'static> {
    inner: Rc<Inner<H>>,
}

impl<H: Host + 'static> Clone for StabilizerHandle<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: Host + 'static> core::fmt::Debug for StabilizerHandle<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StabilizerHandle")
            .field("active", &self.inner.active.borrow().is_some())
            .finish()
    }
}

impl<H: Host + 'static> StabilizerHandle<H> {
    /// Same as [`ViewportStabilizer::refresh_viewport`].
    pub fn refresh(&self) -> bool {
        Inner::schedule_recompute(&self.inner)
    }

    /// Same as [`ViewportStabilizer::deactivate`].
    pub fn destroy(&self) -> bool {
        self.inner.deactivate()
    }
}

impl<H: Host + 'static> Inner<H> {
    fn start(this: &Rc<Self>) {
        let config = this.config.borrow().clone();
        let host = &this.host;
        let mut state = ActivationState {
            allow: AllowList::new(config.allow.clone()),
            previous_height: host.root_property(&config.height_var),
            repaint: RepaintThrottle::new(),
            touch_allowed: None,
            scroll_lock: ScrollLock::Off,
            teardown: TeardownStack::new(),
            config,
        };
        this.commit_height(&state.config);

        let weak = Rc::downgrade(this);
        let recompute = || recompute_handler(&weak);

        this.register(&mut state, ListenTarget::Window, EventKind::Resize, recompute());
        this.register(
            &mut state,
            ListenTarget::Window,
            EventKind::OrientationChange,
            recompute(),
        );
        if host.is_loading() {
            this.register(
                &mut state,
                ListenTarget::Document,
                EventKind::DomContentLoaded,
                recompute(),
            );
        }
        if state.config.prefer_visual_viewport && host.visual_viewport_height().is_some() {
            this.register(
                &mut state,
                ListenTarget::VisualViewport,
                EventKind::Resize,
                recompute(),
            );
            this.register(
                &mut state,
                ListenTarget::VisualViewport,
                EventKind::Scroll,
                recompute(),
            );
        }

        this.register(
            &mut state,
            ListenTarget::Window,
            EventKind::Wheel,
            event_handler(&weak, |inner, event| match event {
                HostEvent::Wheel(wheel) => inner.on_wheel(wheel),
                _ => Disposition::Proceed,
            }),
        );
        if state.config.keyboard.intercepts() {
            this.register(
                &mut state,
                ListenTarget::Window,
                EventKind::KeyDown,
                event_handler(&weak, |inner, event| match event {
                    HostEvent::Key(key) => inner.on_key(key),
                    _ => Disposition::Proceed,
                }),
            );
        }
        this.register(
            &mut state,
            ListenTarget::Document,
            EventKind::TouchStart,
            event_handler(&weak, |inner, event| {
                if let HostEvent::TouchStart(touch) = event {
                    inner.on_touch_start(touch.target.as_ref());
                }
                Disposition::Proceed
            }),
        );
        for (kind, phase) in [
            (EventKind::GestureStart, GesturePhase::Start),
            (EventKind::GestureChange, GesturePhase::Change),
            (EventKind::GestureEnd, GesturePhase::End),
        ] {
            this.register(
                &mut state,
                ListenTarget::Document,
                kind,
                event_handler(&weak, move |inner, _| inner.on_gesture(phase)),
            );
        }

        if state.config.lock_scroll && !this.lock_scroll(&mut state) {
            // DOMContentLoaded only helps while the document is still parsing.
            if host.is_loading() {
                state.scroll_lock = ScrollLock::Deferred;
                this.register(
                    &mut state,
                    ListenTarget::Document,
                    EventKind::DomContentLoaded,
                    event_handler(&weak, |inner, _| {
                        inner.on_body_ready();
                        Disposition::Proceed
                    }),
                );
            } else {
                debug!("no body on a loaded document; scroll lock skipped");
            }
        }

        debug!(
            height_var = %state.config.height_var,
            registrations = state.teardown.len(),
            scroll_lock = ?state.scroll_lock,
            "viewport stabilizer activated"
        );
        *this.active.borrow_mut() = Some(state);
    }

    fn register(
        &self,
        state: &mut ActivationState<H>,
        target: ListenTarget,
        kind: EventKind,
        handler: Handler<H::Element>,
    ) {
        match self.host.listen(target, kind, handler) {
            Ok(listener) => state.teardown.push(listener),
            Err(err) => debug!(?target, ?kind, error = %err, "listener not registered"),
        }
    }

    fn deactivate(&self) -> bool {
        let Some(state) = self.active.borrow_mut().take() else {
            return false;
        };
        let report = release_state(&self.host, state);
        debug!(
            released = report.released,
            failed = report.failed,
            "viewport stabilizer deactivated"
        );
        true
    }

    fn schedule_recompute(this: &Rc<Self>) -> bool {
        let mut active = this.active.borrow_mut();
        let Some(state) = active.as_mut() else {
            return false;
        };
        let weak = Rc::downgrade(this);
        state.repaint.reschedule(|| {
            this.host.request_frame(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.on_frame();
                }
            }))
        });
        true
    }

    fn on_frame(&self) {
        let mut active = self.active.borrow_mut();
        let Some(state) = active.as_mut() else {
            return;
        };
        state.repaint.complete();
        self.commit_height(&state.config);
    }

    fn commit_height(&self, config: &StabilizerConfig<H::Element>) {
        let value = format_px(viewport_unit_px(&self.host, config.prefer_visual_viewport));
        match self.host.set_root_property(&config.height_var, &value) {
            Ok(()) => trace!(height_var = %config.height_var, %value, "height committed"),
            Err(err) => warn!(height_var = %config.height_var, error = %err, "height commit failed"),
        }
    }

    /// Returns true when the lock was applied (or is not needed).
    fn lock_scroll(&self, state: &mut ActivationState<H>) -> bool {
        let Some(previous) = self.host.body_overflow() else {
            return false;
        };
        match self.host.set_body_overflow(OVERFLOW_LOCKED) {
            Ok(()) => state.scroll_lock = ScrollLock::Applied { previous },
            Err(err) => warn!(error = %err, "failed to lock body scroll"),
        }
        true
    }

    fn on_body_ready(&self) {
        let mut active = self.active.borrow_mut();
        let Some(state) = active.as_mut() else {
            return;
        };
        if state.scroll_lock == ScrollLock::Deferred && self.lock_scroll(state) {
            debug!("deferred scroll lock applied");
        }
    }

    fn on_wheel(&self, wheel: &WheelInput<H::Element>) -> Disposition {
        if !wheel.mods.contains(Modifiers::CTRL) {
            return Disposition::Proceed;
        }
        let mut active = self.active.borrow_mut();
        let Some(state) = active.as_mut() else {
            return Disposition::Proceed;
        };
        let zoom = self.host.device_pixel_ratio();
        let zooming_in = wheel.delta_y < 0.0;
        if !zooming_in || zoom < state.config.max_zoom {
            return Disposition::Proceed;
        }
        let inside = state.allow.contains(&self.host, wheel.target.as_ref());
        let disposition = Disposition::cancel_if(!inside);
        if disposition.is_cancel() {
            trace!(zoom, delta_y = wheel.delta_y, "ctrl+wheel zoom cancelled");
        }
        disposition
    }

    fn on_key(&self, key: &KeyInput<H::Element>) -> Disposition {
        let mut active = self.active.borrow_mut();
        let Some(state) = active.as_mut() else {
            return Disposition::Proceed;
        };
        // The nominal target is usually the body when nothing is focused, so
        // this rarely exempts anything. Tracking the pointer would fix it.
        let inside = state.allow.contains(&self.host, key.target.as_ref());
        let disposition =
            Disposition::cancel_if(state.config.keyboard.should_block(key.mods, &key.key, inside));
        if disposition.is_cancel() {
            trace!(key = %key.key, mods = ?key.mods, "keyboard zoom cancelled");
        }
        disposition
    }

    fn on_touch_start(&self, target: Option<&H::Element>) {
        let mut active = self.active.borrow_mut();
        if let Some(state) = active.as_mut() {
            state.touch_allowed = Some(state.allow.contains(&self.host, target));
        }
    }

    fn on_gesture(&self, phase: GesturePhase) -> Disposition {
        let active = self.active.borrow();
        let blocked = active
            .as_ref()
            .is_some_and(|state| state.touch_allowed == Some(false));
        if blocked {
            trace!(?phase, "pinch gesture cancelled");
        }
        Disposition::cancel_if(blocked)
    }
}

impl<H: Host> Drop for Inner<H> {
    fn drop(&mut self) {
        if let Some(state) = self.active.get_mut().take() {
            release_state(&self.host, state);
        }
    }
}

/// Undo everything an activation did: height property, pending frame,
/// registrations (newest first), then the scroll lock.
fn release_state<H: Host>(host: &H, mut state: ActivationState<H>) -> UnwindReport {
    let name = &state.config.height_var;
    let restored = match &state.previous_height {
        Some(previous) => host.set_root_property(name, previous),
        None => host.remove_root_property(name),
    };
    if let Err(err) = restored {
        warn!(height_var = %name, error = %err, "failed to restore height property");
    }
    state.repaint.cancel();
    let report = state.teardown.unwind();
    if let ScrollLock::Applied { previous } = &state.scroll_lock
        && let Err(err) = host.set_body_overflow(previous)
    {
        warn!(error = %err, "failed to restore body overflow");
    }
    report
}

fn recompute_handler<H: Host + 'static>(weak: &Weak<Inner<H>>) -> Handler<H::Element> {
    let weak = Weak::clone(weak);
    Box::new(move |_| {
        if let Some(inner) = weak.upgrade() {
            Inner::schedule_recompute(&inner);
        }
        Disposition::Proceed
    })
}

fn event_handler<H, F>(weak: &Weak<Inner<H>>, f: F) -> Handler<H::Element>
where
    H: Host + 'static,
    F: Fn(&Inner<H>, &HostEvent<H::Element>) -> Disposition + 'static,
{
    let weak = Weak::clone(weak);
    Box::new(move |event| {
        weak.upgrade()
            .map_or(Disposition::Proceed, |inner| f(&inner, event))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllowEntry;
    use crate::host::InertHost;
    use crate::input::{KeyInput, TouchStartInput};
    use crate::keyboard::{KeyRule, KeyboardPolicy, ModifierConstraints};
    use crate::testing::{FakeHost, NodeId};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Listeners registered with default options on a loaded page without a
    /// visual viewport: resize, orientationchange, wheel, touchstart and the
    /// three gesture events.
    const DEFAULT_LISTENERS: usize = 7;

    /// Page with `#a > #a-inner`, `#b`, `#c > #c-inner`.
    fn page() -> FakeHost {
        let host = FakeHost::new();
        let a = host.add_element(None, "a", &[]);
        host.add_element(Some(a), "a-inner", &[]);
        host.add_element(None, "b", &[]);
        let c = host.add_element(None, "c", &[]);
        host.add_element(Some(c), "c-inner", &[]);
        host
    }

    fn node(host: &FakeHost, id: &str) -> NodeId {
        host.by_id(id).unwrap()
    }

    fn stabilizer(host: &FakeHost, config: StabilizerConfig<NodeId>) -> ViewportStabilizer<FakeHost> {
        ViewportStabilizer::new(host.clone(), config)
    }

    fn ab_config() -> StabilizerConfig<NodeId> {
        StabilizerConfig::from(&["#a", "#b"][..])
    }

    fn wheel(host: &FakeHost, mods: Modifiers, delta_y: f64, target: Option<NodeId>) -> Disposition {
        host.dispatch(
            ListenTarget::Window,
            EventKind::Wheel,
            &HostEvent::Wheel(WheelInput {
                mods,
                delta_y,
                target,
            }),
        )
    }

    fn keydown(host: &FakeHost, mods: Modifiers, key: &str, target: Option<NodeId>) -> Disposition {
        host.dispatch(
            ListenTarget::Window,
            EventKind::KeyDown,
            &HostEvent::Key(KeyInput {
                mods,
                key: key.to_owned(),
                target,
            }),
        )
    }

    fn touch_start(host: &FakeHost, target: Option<NodeId>) {
        host.dispatch(
            ListenTarget::Document,
            EventKind::TouchStart,
            &HostEvent::TouchStart(TouchStartInput { target }),
        );
    }

    fn gesture(host: &FakeHost, kind: EventKind, phase: GesturePhase) -> Disposition {
        host.dispatch(ListenTarget::Document, kind, &HostEvent::Gesture(phase))
    }

    #[test]
    fn activate_commits_height_immediately() {
        let host = page();
        host.set_inner_height(800.0);
        let stab = stabilizer(&host, StabilizerConfig::default());
        assert!(stab.activate(None));
        assert_eq!(host.root_property("--vh").as_deref(), Some("8px"));
        assert_eq!(host.listener_count(), DEFAULT_LISTENERS);
    }

    #[test]
    fn activate_twice_without_overrides_registers_nothing() {
        let host = page();
        let stab = stabilizer(&host, ab_config());
        assert!(stab.activate(None));
        let listeners = host.listener_count();
        let writes = host.root_writes("--vh").len();

        assert!(stab.activate(None));
        assert_eq!(host.listener_count(), listeners);
        assert_eq!(host.root_writes("--vh").len(), writes);
    }

    #[test]
    fn activate_with_overrides_restarts_under_merged_config() {
        let host = page();
        host.preset_root_property("--vh", "3px");
        let stab = stabilizer(&host, ab_config());
        assert!(stab.activate(None));

        let overrides = ConfigOverrides {
            height_var: Some("--app-vh".to_owned()),
            keyboard: Some(KeyboardPolicy::BlockAllModified),
            ..ConfigOverrides::default()
        };
        assert!(stab.activate(Some(overrides)));

        // Old property restored, new one committed, listeners rebuilt once.
        assert_eq!(host.root_property("--vh").as_deref(), Some("3px"));
        assert_eq!(host.root_property("--app-vh").as_deref(), Some("8px"));
        assert_eq!(host.listener_count(), DEFAULT_LISTENERS + 1);
        assert_eq!(stab.config().allow, ab_config().allow);
        assert_eq!(stab.snapshot().height_var, "--app-vh");
    }

    #[test]
    fn deactivate_restores_previous_value() {
        let host = page();
        host.preset_root_property("--vh", "7.5px");
        host.set_inner_height(1000.0);
        let stab = stabilizer(&host, StabilizerConfig::default());
        stab.activate(None);
        assert_eq!(host.root_property("--vh").as_deref(), Some("10px"));

        assert!(stab.deactivate());
        assert_eq!(host.root_property("--vh").as_deref(), Some("7.5px"));
        assert_eq!(host.listener_count(), 0);
    }

    #[test]
    fn deactivate_removes_property_that_was_absent() {
        let host = page();
        let stab = stabilizer(&host, StabilizerConfig::default());
        stab.activate(None);
        assert!(stab.deactivate());
        assert_eq!(host.root_property("--vh"), None);
        assert_eq!(host.root_writes("--vh").last(), Some(&None));
    }

    #[test]
    fn second_deactivate_is_a_no_op() {
        let host = page();
        let stab = stabilizer(&host, StabilizerConfig::default());
        stab.activate(None);
        assert!(stab.deactivate());
        let writes = host.root_writes("--vh");

        assert!(!stab.deactivate());
        assert_eq!(host.root_writes("--vh"), writes);
        assert!(!stab.is_active());
    }

    #[test]
    fn refresh_requires_active_state() {
        let host = page();
        let stab = stabilizer(&host, StabilizerConfig::default());
        assert!(!stab.refresh_viewport());
        assert_eq!(host.pending_frames(), 0);
        stab.activate(None);
        assert!(stab.refresh_viewport());
        assert_eq!(host.pending_frames(), 1);
    }

    #[test]
    fn refreshes_within_one_frame_commit_once() {
        let host = page();
        let stab = stabilizer(&host, StabilizerConfig::default());
        stab.activate(None);
        assert_eq!(host.root_writes("--vh").len(), 1);

        host.set_inner_height(640.0);
        assert!(stab.refresh_viewport());
        assert!(stab.refresh_viewport());
        host.dispatch(ListenTarget::Window, EventKind::Resize, &HostEvent::Viewport);
        host.dispatch(
            ListenTarget::Window,
            EventKind::OrientationChange,
            &HostEvent::Viewport,
        );
        assert_eq!(host.pending_frames(), 1);
        assert!(stab.snapshot().repaint_pending);

        assert_eq!(host.run_frames(), 1);
        assert_eq!(
            host.root_writes("--vh"),
            vec![Some("8px".to_owned()), Some("6.4px".to_owned())]
        );
        assert!(!stab.snapshot().repaint_pending);
    }

    #[test]
    fn deactivate_cancels_pending_repaint() {
        let host = page();
        let stab = stabilizer(&host, StabilizerConfig::default());
        stab.activate(None);
        stab.refresh_viewport();
        assert!(stab.deactivate());
        assert_eq!(host.pending_frames(), 0);
        assert_eq!(host.run_frames(), 0);
        assert_eq!(host.root_property("--vh"), None);
    }

    #[test]
    fn visual_viewport_drives_height_and_listeners() {
        let host = page();
        host.set_inner_height(800.0);
        host.set_visual_viewport_height(Some(500.0));
        let stab = stabilizer(&host, StabilizerConfig::default());
        stab.activate(None);
        assert_eq!(host.root_property("--vh").as_deref(), Some("5px"));
        assert_eq!(
            host.listener_count_for(ListenTarget::VisualViewport, EventKind::Resize),
            1
        );
        assert_eq!(
            host.listener_count_for(ListenTarget::VisualViewport, EventKind::Scroll),
            1
        );

        host.set_visual_viewport_height(Some(450.0));
        host.dispatch(
            ListenTarget::VisualViewport,
            EventKind::Scroll,
            &HostEvent::Viewport,
        );
        host.run_frames();
        assert_eq!(host.root_property("--vh").as_deref(), Some("4.5px"));
    }

    #[test]
    fn visual_viewport_ignored_when_not_preferred() {
        let host = page();
        host.set_inner_height(800.0);
        host.set_visual_viewport_height(Some(500.0));
        let stab = stabilizer(&host, StabilizerConfig::default().with_visual_viewport(false));
        stab.activate(None);
        assert_eq!(host.root_property("--vh").as_deref(), Some("8px"));
        assert_eq!(host.listener_count(), DEFAULT_LISTENERS);
    }

    #[test]
    fn document_ready_listener_only_while_loading() {
        let host = page();
        let stab = stabilizer(&host, StabilizerConfig::default());
        stab.activate(None);
        assert_eq!(
            host.listener_count_for(ListenTarget::Document, EventKind::DomContentLoaded),
            0
        );
        stab.deactivate();

        host.set_loading(true);
        stab.activate(None);
        assert_eq!(
            host.listener_count_for(ListenTarget::Document, EventKind::DomContentLoaded),
            1
        );
        host.set_inner_height(900.0);
        host.finish_loading();
        host.run_frames();
        assert_eq!(host.root_property("--vh").as_deref(), Some("9px"));
    }

    #[test]
    fn ctrl_wheel_zoom_in_blocked_outside_allow_list() {
        let host = page();
        host.set_device_pixel_ratio(1.0);
        let stab = stabilizer(&host, ab_config());
        stab.activate(None);

        let c_inner = node(&host, "c-inner");
        let a_inner = node(&host, "a-inner");
        let b = node(&host, "b");
        assert_eq!(wheel(&host, Modifiers::CTRL, -120.0, Some(c_inner)), Disposition::Cancel);
        assert_eq!(wheel(&host, Modifiers::CTRL, -120.0, Some(a_inner)), Disposition::Proceed);
        assert_eq!(wheel(&host, Modifiers::CTRL, -120.0, Some(b)), Disposition::Proceed);
        assert_eq!(wheel(&host, Modifiers::CTRL, -120.0, None), Disposition::Cancel);
    }

    #[test]
    fn wheel_zoom_out_and_plain_scroll_never_blocked() {
        let host = page();
        host.set_device_pixel_ratio(3.0);
        let stab = stabilizer(&host, ab_config());
        stab.activate(None);
        let c_inner = node(&host, "c-inner");

        assert_eq!(wheel(&host, Modifiers::CTRL, 120.0, Some(c_inner)), Disposition::Proceed);
        assert_eq!(wheel(&host, Modifiers::empty(), -120.0, Some(c_inner)), Disposition::Proceed);
        assert_eq!(wheel(&host, Modifiers::META, -120.0, Some(c_inner)), Disposition::Proceed);
    }

    #[test]
    fn wheel_zoom_in_allowed_below_max_zoom() {
        let host = page();
        host.set_device_pixel_ratio(1.5);
        let stab = stabilizer(&host, ab_config().with_max_zoom(2.0));
        stab.activate(None);
        let c_inner = node(&host, "c-inner");
        assert_eq!(wheel(&host, Modifiers::CTRL, -120.0, Some(c_inner)), Disposition::Proceed);

        host.set_device_pixel_ratio(2.0);
        assert_eq!(wheel(&host, Modifiers::CTRL, -120.0, Some(c_inner)), Disposition::Cancel);
    }

    #[test]
    fn allow_list_resolved_once_per_activation() {
        let host = page();
        let stab = stabilizer(&host, ab_config());
        stab.activate(None);
        let c_inner = node(&host, "c-inner");
        for _ in 0..5 {
            wheel(&host, Modifiers::CTRL, -1.0, Some(c_inner));
        }
        assert_eq!(host.query_count(), 2);

        stab.deactivate();
        stab.activate(None);
        wheel(&host, Modifiers::CTRL, -1.0, Some(c_inner));
        assert_eq!(host.query_count(), 4);
    }

    #[test]
    fn direct_element_entries_are_honoured() {
        let host = page();
        let c = node(&host, "c");
        let stab = stabilizer(&host, StabilizerConfig::new().allow_element(c));
        stab.activate(None);
        let c_inner = node(&host, "c-inner");
        let a_inner = node(&host, "a-inner");
        assert_eq!(wheel(&host, Modifiers::CTRL, -1.0, Some(c_inner)), Disposition::Proceed);
        assert_eq!(wheel(&host, Modifiers::CTRL, -1.0, Some(a_inner)), Disposition::Cancel);
        assert_eq!(host.query_count(), 0);
    }

    #[test]
    fn keyboard_rules_block_listed_combos_only() {
        let host = page();
        let policy = KeyboardPolicy::Rules(vec![
            KeyRule::new(ModifierConstraints::ctrl(), "+"),
            KeyRule::new(ModifierConstraints::ctrl(), "-"),
        ]);
        let stab = stabilizer(&host, ab_config().with_keyboard_policy(policy));
        stab.activate(None);
        let c_inner = node(&host, "c-inner");
        let a_inner = node(&host, "a-inner");

        assert_eq!(keydown(&host, Modifiers::CTRL, "+", Some(c_inner)), Disposition::Cancel);
        assert_eq!(keydown(&host, Modifiers::CTRL, "a", Some(c_inner)), Disposition::Proceed);
        assert_eq!(keydown(&host, Modifiers::CTRL, "+", Some(a_inner)), Disposition::Proceed);
    }

    #[test]
    fn keyboard_block_all_modified_ignores_key() {
        let host = page();
        let stab = stabilizer(&host, ab_config().with_keyboard_policy(true));
        stab.activate(None);
        let c_inner = node(&host, "c-inner");

        for key in ["+", "s", "Enter"] {
            assert_eq!(keydown(&host, Modifiers::CTRL, key, Some(c_inner)), Disposition::Cancel);
            assert_eq!(keydown(&host, Modifiers::META, key, Some(c_inner)), Disposition::Cancel);
            assert_eq!(keydown(&host, Modifiers::SHIFT, key, Some(c_inner)), Disposition::Proceed);
        }
    }

    #[test]
    fn keyboard_none_policy_registers_no_listener() {
        let host = page();
        let stab = stabilizer(&host, ab_config());
        stab.activate(None);
        assert_eq!(
            host.listener_count_for(ListenTarget::Window, EventKind::KeyDown),
            0
        );
        let c_inner = node(&host, "c-inner");
        assert_eq!(keydown(&host, Modifiers::CTRL, "+", Some(c_inner)), Disposition::Proceed);
    }

    #[test]
    fn keyboard_allow_check_uses_nominal_target() {
        // With nothing focused the keydown target is the body, which is
        // outside every allowed region, so the combo is blocked even while
        // the pointer hovers an allowed element.
        let host = page();
        let body = host.add_element(None, "body", &[]);
        let stab = stabilizer(&host, ab_config().with_keyboard_policy(true));
        stab.activate(None);
        assert_eq!(keydown(&host, Modifiers::CTRL, "+", Some(body)), Disposition::Cancel);
    }

    #[test]
    fn pinch_blocked_after_touch_outside_allow_list() {
        let host = page();
        let stab = stabilizer(&host, ab_config());
        stab.activate(None);

        // No touch recorded yet.
        assert_eq!(
            gesture(&host, EventKind::GestureStart, GesturePhase::Start),
            Disposition::Proceed
        );

        touch_start(&host, Some(node(&host, "c-inner")));
        for (kind, phase) in [
            (EventKind::GestureStart, GesturePhase::Start),
            (EventKind::GestureChange, GesturePhase::Change),
            (EventKind::GestureEnd, GesturePhase::End),
        ] {
            assert_eq!(gesture(&host, kind, phase), Disposition::Cancel);
        }

        touch_start(&host, Some(node(&host, "a-inner")));
        assert_eq!(
            gesture(&host, EventKind::GestureChange, GesturePhase::Change),
            Disposition::Proceed
        );
    }

    #[test]
    fn scroll_lock_restores_exact_previous_overflow() {
        let host = page();
        host.preset_body_overflow("scroll");
        let stab = stabilizer(&host, StabilizerConfig::default().with_scroll_lock(true));
        stab.activate(None);
        assert_eq!(host.body_overflow().as_deref(), Some("hidden"));

        assert!(stab.deactivate());
        assert_eq!(host.body_overflow().as_deref(), Some("scroll"));
    }

    #[test]
    fn scroll_lock_deferred_until_body_exists() {
        let host = page();
        host.set_loading(true);
        host.remove_body();
        let stab = stabilizer(&host, StabilizerConfig::default().with_scroll_lock(true));
        stab.activate(None);
        assert_eq!(host.body_overflow(), None);

        host.finish_loading();
        assert_eq!(host.body_overflow().as_deref(), Some("hidden"));

        stab.deactivate();
        assert_eq!(host.body_overflow().as_deref(), Some(""));
    }

    #[test]
    fn deferred_scroll_lock_dropped_when_deactivated_first() {
        let host = page();
        host.set_loading(true);
        host.remove_body();
        let stab = stabilizer(&host, StabilizerConfig::default().with_scroll_lock(true));
        stab.activate(None);
        stab.deactivate();

        host.finish_loading();
        assert_eq!(host.body_overflow().as_deref(), Some(""));
    }

    #[test]
    fn inert_host_makes_every_operation_a_no_op() {
        let stab = ViewportStabilizer::new(InertHost, "#a");
        assert!(!stab.activate(None));
        assert!(!stab.activate(Some(ConfigOverrides::default())));
        assert!(!stab.refresh_viewport());
        assert!(!stab.deactivate());
        assert!(!stab.is_active());
        let handle = stab.handle();
        assert!(!handle.refresh());
        assert!(!handle.destroy());
        assert!(!stab.snapshot().available);
    }

    #[test]
    fn handle_refresh_and_destroy() {
        let host = page();
        let stab = stabilizer(&host, StabilizerConfig::default());
        let handle = stab.handle();
        stab.activate(None);

        assert!(handle.refresh());
        assert_eq!(host.pending_frames(), 1);
        assert!(handle.destroy());
        assert!(!stab.is_active());
        assert!(!handle.destroy());
        assert_eq!(host.listener_count(), 0);
    }

    #[test]
    fn dropping_last_owner_deactivates() {
        let host = page();
        host.preset_root_property("--vh", "2px");
        let stab = stabilizer(&host, StabilizerConfig::default().with_scroll_lock(true));
        let handle = stab.handle();
        stab.activate(None);
        drop(stab);
        assert_eq!(host.listener_count(), DEFAULT_LISTENERS);

        drop(handle);
        assert_eq!(host.listener_count(), 0);
        assert_eq!(host.root_property("--vh").as_deref(), Some("2px"));
        assert_eq!(host.body_overflow().as_deref(), Some(""));
    }

    #[test]
    fn snapshot_counts_registrations() {
        let host = page();
        let stab = stabilizer(&host, StabilizerConfig::default());
        assert_eq!(
            stab.snapshot(),
            StabilizerSnapshot {
                available: true,
                active: false,
                registrations: 0,
                repaint_pending: false,
                repaint_requests: 0,
                height_var: "--vh".to_owned(),
            }
        );
        stab.activate(None);
        assert_eq!(stab.snapshot().registrations, DEFAULT_LISTENERS);

        stab.refresh_viewport();
        stab.refresh_viewport();
        host.run_frames();
        stab.refresh_viewport();
        let snapshot = stab.snapshot();
        assert_eq!(snapshot.repaint_requests, 3);
        assert!(snapshot.repaint_pending);

        // A fresh activation starts counting again.
        stab.deactivate();
        stab.activate(None);
        assert_eq!(stab.snapshot().repaint_requests, 0);
    }

    #[test]
    fn scroll_lock_skipped_when_body_missing_after_load() {
        let host = page();
        host.remove_body();
        let stab = stabilizer(&host, StabilizerConfig::default().with_scroll_lock(true));
        assert!(stab.activate(None));

        assert_eq!(host.listener_count(), DEFAULT_LISTENERS);
        assert_eq!(
            host.listener_count_for(ListenTarget::Document, EventKind::DomContentLoaded),
            0
        );
        assert!(stab.deactivate());
        assert_eq!(host.body_overflow(), None);
    }

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCounter {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn failing_release_is_logged_and_skipped() {
        use tracing_subscriber::layer::SubscriberExt;

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));

        tracing::subscriber::with_default(subscriber, || {
            let host = page();
            host.fail_release_of(EventKind::Wheel);
            let stab = stabilizer(&host, StabilizerConfig::default());
            stab.activate(None);

            assert!(stab.deactivate());
            assert!(!stab.is_active());
            // Only the listener whose removal failed is left behind.
            assert_eq!(host.listener_count(), 1);
            assert_eq!(host.listener_count_for(ListenTarget::Window, EventKind::Wheel), 1);
            assert_eq!(host.root_property("--vh"), None);
        });

        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_after_deactivate_are_ignored() {
        let host = page();
        host.fail_release_of(EventKind::Wheel);
        let stab = stabilizer(&host, ab_config());
        stab.activate(None);
        stab.deactivate();
        // The stale wheel listener is still attached but finds no state.
        let c_inner = node(&host, "c-inner");
        assert_eq!(wheel(&host, Modifiers::CTRL, -1.0, Some(c_inner)), Disposition::Proceed);
    }

    #[test]
    fn config_is_validated_on_construction() {
        let host = page();
        let stab = stabilizer(
            &host,
            StabilizerConfig::default()
                .with_height_var("full")
                .with_max_zoom(0.0),
        );
        assert_eq!(stab.config().height_var, "--full");
        assert_eq!(stab.config().max_zoom, 1.0);
        assert_eq!(
            stab.config().allow,
            Vec::<AllowEntry<NodeId>>::new()
        );
    }
}
