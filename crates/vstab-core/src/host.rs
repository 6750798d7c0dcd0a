#![forbid(unsafe_code)]

//! The host capability the stabilizer runs against.
//!
//! [`Host`] stands in for the browser's `window`/`document` globals: size
//! queries, the root element's custom properties, the body's overflow style,
//! selector queries, listener registration and frame scheduling. The
//! stabilizer never touches a DOM directly, so the same code runs against
//! `web-sys` in the browser, against [`InertHost`] outside one, and against
//! the in-memory DOM in [`crate::testing`].

use crate::error::HostError;
use crate::input::{Disposition, HostEvent};
use crate::teardown::Release;

/// Callback the host invokes for each translated event.
pub type Handler<E> = Box<dyn FnMut(&HostEvent<E>) -> Disposition>;

/// Object a listener is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenTarget {
    Window,
    Document,
    VisualViewport,
}

/// DOM event types the stabilizer subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Resize,
    OrientationChange,
    DomContentLoaded,
    Scroll,
    Wheel,
    KeyDown,
    TouchStart,
    GestureStart,
    GestureChange,
    GestureEnd,
}

impl EventKind {
    /// DOM event type string.
    #[must_use]
    pub const fn dom_name(self) -> &'static str {
        match self {
            Self::Resize => "resize",
            Self::OrientationChange => "orientationchange",
            Self::DomContentLoaded => "DOMContentLoaded",
            Self::Scroll => "scroll",
            Self::Wheel => "wheel",
            Self::KeyDown => "keydown",
            Self::TouchStart => "touchstart",
            Self::GestureStart => "gesturestart",
            Self::GestureChange => "gesturechange",
            Self::GestureEnd => "gestureend",
        }
    }

    /// Whether the handler may cancel the event, i.e. the listener must be
    /// registered with `passive: false`.
    #[must_use]
    pub const fn may_cancel(self) -> bool {
        matches!(
            self,
            Self::Wheel
                | Self::KeyDown
                | Self::GestureStart
                | Self::GestureChange
                | Self::GestureEnd
        )
    }
}

/// Browser-like environment capability.
///
/// Frames are cancelled by dropping the returned [`Host::Frame`]; listeners
/// are removed by releasing the returned [`Host::Listener`].
pub trait Host {
    /// Handle to a DOM element.
    type Element: Clone + PartialEq + 'static;
    /// Registration guard for one listener.
    type Listener: Release + 'static;
    /// Pending frame callback; dropping it cancels the callback.
    type Frame: 'static;

    /// False when there is no browser document to act on.
    fn is_available(&self) -> bool {
        true
    }

    /// `window.innerHeight` in CSS pixels.
    fn inner_height(&self) -> f64;

    /// `window.visualViewport.height`, if the facility exists.
    fn visual_viewport_height(&self) -> Option<f64>;

    fn device_pixel_ratio(&self) -> f64;

    /// True while `document.readyState` is `loading`.
    fn is_loading(&self) -> bool;

    /// Current value of a custom property on the root element; `None` when unset.
    fn root_property(&self, name: &str) -> Option<String>;

    fn set_root_property(&self, name: &str, value: &str) -> Result<(), HostError>;

    fn remove_root_property(&self, name: &str) -> Result<(), HostError>;

    /// The body's inline `overflow` style, or `None` if there is no body yet.
    fn body_overflow(&self) -> Option<String>;

    fn set_body_overflow(&self, value: &str) -> Result<(), HostError>;

    /// All elements matching `selector`, in document order.
    fn query_all(&self, selector: &str) -> Result<Vec<Self::Element>, HostError>;

    /// Inclusive ancestor containment: `node` is `ancestor` or a descendant of it.
    fn contains(&self, ancestor: &Self::Element, node: &Self::Element) -> bool;

    fn listen(
        &self,
        target: ListenTarget,
        kind: EventKind,
        handler: Handler<Self::Element>,
    ) -> Result<Self::Listener, HostError>;

    /// Schedule `callback` for the next rendering frame.
    fn request_frame(&self, callback: Box<dyn FnOnce()>) -> Self::Frame;
}

/// Host used outside a browser: reports itself unavailable and does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct InertHost;

/// Listener guard type for [`InertHost`]; never actually produced.
#[derive(Debug)]
pub struct InertListener;

impl Release for InertListener {
    fn release(self: Box<Self>) -> Result<(), HostError> {
        Ok(())
    }
}

impl Host for InertHost {
    type Element = ();
    type Listener = InertListener;
    type Frame = ();

    fn is_available(&self) -> bool {
        false
    }

    fn inner_height(&self) -> f64 {
        0.0
    }

    fn visual_viewport_height(&self) -> Option<f64> {
        None
    }

    fn device_pixel_ratio(&self) -> f64 {
        1.0
    }

    fn is_loading(&self) -> bool {
        false
    }

    fn root_property(&self, _name: &str) -> Option<String> {
        None
    }

    fn set_root_property(&self, _name: &str, _value: &str) -> Result<(), HostError> {
        Ok(())
    }

    fn remove_root_property(&self, _name: &str) -> Result<(), HostError> {
        Ok(())
    }

    fn body_overflow(&self) -> Option<String> {
        None
    }

    fn set_body_overflow(&self, _value: &str) -> Result<(), HostError> {
        Ok(())
    }

    fn query_all(&self, _selector: &str) -> Result<Vec<()>, HostError> {
        Ok(Vec::new())
    }

    fn contains(&self, _ancestor: &(), _node: &()) -> bool {
        false
    }

    fn listen(
        &self,
        target: ListenTarget,
        _kind: EventKind,
        _handler: Handler<()>,
    ) -> Result<InertListener, HostError> {
        Err(HostError::TargetUnavailable { target })
    }

    fn request_frame(&self, _callback: Box<dyn FnOnce()>) {}
}
