#![forbid(unsafe_code)]

//! [`Host`] implementation over `web-sys`.
//!
//! Listeners are `gloo` [`EventListener`]s, registered non-passive for the
//! event types a handler may cancel. Frames are `gloo` [`AnimationFrame`]s,
//! which cancel themselves when dropped.

use gloo::events::{EventListener, EventListenerOptions, EventListenerPhase};
use gloo::render::{AnimationFrame, request_animation_frame};
use tracing::trace;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    CssStyleDeclaration, Document, Element, Event, EventTarget, HtmlElement, KeyboardEvent, Node,
    TouchEvent, WheelEvent, Window,
};

use vstab_core::{
    EventKind, GesturePhase, Handler, Host, HostError, HostEvent, KeyInput, ListenTarget,
    Modifiers, Release, TouchStartInput, WheelInput,
};

fn js_message(err: &JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}

/// The page's `window` and `document`.
#[derive(Debug, Clone)]
pub struct WebHost {
    window: Window,
    document: Document,
}

impl WebHost {
    /// `None` outside a browser main thread (workers, server-side rendering).
    #[must_use]
    pub fn detect() -> Option<Self> {
        let window = web_sys::window()?;
        let document = window.document()?;
        Some(Self { window, document })
    }

    fn root_style(&self) -> Option<CssStyleDeclaration> {
        let root = self.document.document_element()?;
        root.dyn_into::<HtmlElement>().ok().map(|el| el.style())
    }

    fn body_style(&self) -> Option<CssStyleDeclaration> {
        self.document.body().map(|body| body.style())
    }

    fn event_target(&self, target: ListenTarget) -> Option<EventTarget> {
        match target {
            ListenTarget::Window => Some(self.window.clone().into()),
            ListenTarget::Document => Some(self.document.clone().into()),
            ListenTarget::VisualViewport => self.window.visual_viewport().map(Into::into),
        }
    }

    /// Element under the first touch point, falling back to the event target.
    fn touch_target(&self, event: &Event) -> Option<Element> {
        let from_point = event
            .dyn_ref::<TouchEvent>()
            .and_then(|touch| touch.touches().get(0))
            .and_then(|point| {
                self.document
                    .element_from_point(point.client_x() as f32, point.client_y() as f32)
            });
        from_point.or_else(|| element_of(event.target()))
    }

    fn translate(&self, kind: EventKind, event: &Event) -> Option<HostEvent<Element>> {
        let translated = match kind {
            EventKind::Resize | EventKind::OrientationChange | EventKind::Scroll => {
                HostEvent::Viewport
            }
            EventKind::DomContentLoaded => HostEvent::DocumentReady,
            EventKind::Wheel => {
                let wheel = event.dyn_ref::<WheelEvent>()?;
                HostEvent::Wheel(WheelInput {
                    mods: Modifiers::from_flags(
                        wheel.ctrl_key(),
                        wheel.meta_key(),
                        wheel.alt_key(),
                        wheel.shift_key(),
                    ),
                    delta_y: wheel.delta_y(),
                    target: element_of(event.target()),
                })
            }
            EventKind::KeyDown => {
                let key = event.dyn_ref::<KeyboardEvent>()?;
                HostEvent::Key(KeyInput {
                    mods: Modifiers::from_flags(
                        key.ctrl_key(),
                        key.meta_key(),
                        key.alt_key(),
                        key.shift_key(),
                    ),
                    key: key.key(),
                    target: element_of(event.target()),
                })
            }
            EventKind::TouchStart => HostEvent::TouchStart(TouchStartInput {
                target: self.touch_target(event),
            }),
            EventKind::GestureStart => HostEvent::Gesture(GesturePhase::Start),
            EventKind::GestureChange => HostEvent::Gesture(GesturePhase::Change),
            EventKind::GestureEnd => HostEvent::Gesture(GesturePhase::End),
        };
        Some(translated)
    }
}

/// Element for an event target; text nodes map to their parent element.
fn element_of(target: Option<EventTarget>) -> Option<Element> {
    match target?.dyn_into::<Element>() {
        Ok(element) => Some(element),
        Err(other) => other.dyn_into::<Node>().ok()?.parent_element(),
    }
}

/// A registered DOM listener. Releasing it removes the listener.
#[derive(Debug)]
pub struct WebListener {
    kind: EventKind,
    listener: EventListener,
}

impl Release for WebListener {
    fn label(&self) -> &str {
        self.kind.dom_name()
    }

    fn release(self: Box<Self>) -> Result<(), HostError> {
        drop(self.listener);
        Ok(())
    }
}

impl Host for WebHost {
    type Element = Element;
    type Listener = WebListener;
    type Frame = AnimationFrame;

    fn inner_height(&self) -> f64 {
        self.window
            .inner_height()
            .ok()
            .and_then(|h| h.as_f64())
            .unwrap_or(0.0)
    }

    fn visual_viewport_height(&self) -> Option<f64> {
        self.window.visual_viewport().map(|vv| vv.height())
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.window.device_pixel_ratio()
    }

    fn is_loading(&self) -> bool {
        self.document.ready_state() == "loading"
    }

    fn root_property(&self, name: &str) -> Option<String> {
        let value = self.root_style()?.get_property_value(name).ok()?;
        (!value.is_empty()).then_some(value)
    }

    fn set_root_property(&self, name: &str, value: &str) -> Result<(), HostError> {
        let style = self
            .root_style()
            .ok_or_else(|| HostError::dom_write(name, "no root element"))?;
        style
            .set_property(name, value)
            .map_err(|err| HostError::dom_write(name, js_message(&err)))
    }

    fn remove_root_property(&self, name: &str) -> Result<(), HostError> {
        let style = self
            .root_style()
            .ok_or_else(|| HostError::dom_write(name, "no root element"))?;
        style
            .remove_property(name)
            .map(drop)
            .map_err(|err| HostError::dom_write(name, js_message(&err)))
    }

    fn body_overflow(&self) -> Option<String> {
        self.body_style()?.get_property_value("overflow").ok()
    }

    fn set_body_overflow(&self, value: &str) -> Result<(), HostError> {
        let style = self
            .body_style()
            .ok_or_else(|| HostError::dom_write("overflow", "no body element"))?;
        let result = if value.is_empty() {
            style.remove_property("overflow").map(drop)
        } else {
            style.set_property("overflow", value)
        };
        result.map_err(|err| HostError::dom_write("overflow", js_message(&err)))
    }

    fn query_all(&self, selector: &str) -> Result<Vec<Element>, HostError> {
        let list = self
            .document
            .query_selector_all(selector)
            .map_err(|_| HostError::InvalidSelector {
                selector: selector.to_owned(),
            })?;
        Ok((0..list.length())
            .filter_map(|idx| list.item(idx))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .collect())
    }

    fn contains(&self, ancestor: &Element, node: &Element) -> bool {
        ancestor.contains(Some(node.as_ref()))
    }

    fn listen(
        &self,
        target: ListenTarget,
        kind: EventKind,
        mut handler: Handler<Element>,
    ) -> Result<WebListener, HostError> {
        let event_target = self
            .event_target(target)
            .ok_or(HostError::TargetUnavailable { target })?;
        let host = self.clone();
        let listener = EventListener::new_with_options(
            &event_target,
            kind.dom_name(),
            EventListenerOptions {
                phase: EventListenerPhase::Bubble,
                passive: !kind.may_cancel(),
            },
            move |event: &Event| {
                let Some(translated) = host.translate(kind, event) else {
                    return;
                };
                if handler(&translated).is_cancel() {
                    event.prevent_default();
                }
            },
        );
        trace!(?target, ?kind, "listener registered");
        Ok(WebListener { kind, listener })
    }

    fn request_frame(&self, callback: Box<dyn FnOnce()>) -> AnimationFrame {
        request_animation_frame(move |_| callback())
    }
}
