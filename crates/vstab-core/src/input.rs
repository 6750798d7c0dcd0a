#![forbid(unsafe_code)]

//! Normalized input events delivered by a [`crate::Host`].
//!
//! The host translates raw DOM events into these shapes before handing them
//! to the stabilizer, and applies the returned [`Disposition`]:
//! - wheel events carry the ctrl state, vertical delta and nominal target,
//! - keydown events carry the full modifier set and the DOM `key` string,
//! - touch starts carry the element under the first touch point (or the
//!   nominal target when no point resolves).

use bitflags::bitflags;

bitflags! {
    /// Modifier keys held during an input event.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const ALT   = 0b0010;
        const CTRL  = 0b0100;
        const META  = 0b1000;
    }
}

impl Modifiers {
    /// Build a modifier set from the four DOM boolean flags.
    #[must_use]
    pub fn from_flags(ctrl: bool, meta: bool, alt: bool, shift: bool) -> Self {
        let mut mods = Self::empty();
        mods.set(Self::CTRL, ctrl);
        mods.set(Self::META, meta);
        mods.set(Self::ALT, alt);
        mods.set(Self::SHIFT, shift);
        mods
    }
}

/// What the host should do with the DOM event after the stabilizer saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    /// Let the browser's default action run.
    #[default]
    Proceed,
    /// Call `preventDefault()` on the event.
    Cancel,
}

impl Disposition {
    #[must_use]
    pub const fn is_cancel(self) -> bool {
        matches!(self, Self::Cancel)
    }

    #[must_use]
    pub const fn cancel_if(cond: bool) -> Self {
        if cond { Self::Cancel } else { Self::Proceed }
    }
}

/// Wheel event (ctrl+wheel is how browsers report trackpad pinch and zoom).
#[derive(Debug, Clone, PartialEq)]
pub struct WheelInput<E> {
    pub mods: Modifiers,
    pub delta_y: f64,
    pub target: Option<E>,
}

/// Keydown event.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyInput<E> {
    pub mods: Modifiers,
    /// DOM `KeyboardEvent.key`, compared case-sensitively.
    pub key: String,
    pub target: Option<E>,
}

/// Touch start, already resolved to the element under the first touch.
#[derive(Debug, Clone, PartialEq)]
pub struct TouchStartInput<E> {
    pub target: Option<E>,
}

/// Phase of a (Safari) gesture event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GesturePhase {
    Start,
    Change,
    End,
}

/// Normalized event handed to a registered handler.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent<E> {
    /// Any trigger that only asks for a height recompute.
    Viewport,
    /// The document left the `loading` state.
    DocumentReady,
    Wheel(WheelInput<E>),
    Key(KeyInput<E>),
    TouchStart(TouchStartInput<E>),
    Gesture(GesturePhase),
}
