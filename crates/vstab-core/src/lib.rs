#![forbid(unsafe_code)]

//! Viewport height stabilizer and zoom-gesture guard.
//!
//! # Role
//! Mobile browsers change the window height as toolbars slide in and out,
//! which makes `100vh` layouts jump. `vstab-core` keeps a CSS custom property
//! (`--vh` by default) on the root element equal to one hundredth of the
//! real viewport height, so pages can size with `calc(var(--vh) * 100)`.
//! While it runs it also cancels browser zoom from ctrl+wheel, configured
//! key combinations and pinch gestures, except over allow-listed elements.
//!
//! # Primary pieces
//! - **[`ViewportStabilizer`]**: activation lifecycle, event handlers, and
//!   exact restoration of everything it changed.
//! - **[`Host`]**: the browser capability the stabilizer is written against.
//!   `vstab-web` implements it over `web-sys`; [`InertHost`] stands in
//!   outside a browser.
//! - **[`StabilizerConfig`]** / **[`StabilizerOptions`]**: typed builder
//!   configuration and the JSON options object accepted from page scripts.
//! - **[`TeardownStack`]**: ordered release of listener registrations.

pub mod allow_list;
pub mod config;
pub mod error;
pub mod host;
pub mod input;
pub mod keyboard;
pub mod options;
pub mod repaint;
pub mod stabilizer;
pub mod teardown;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{AllowEntry, ConfigOverrides, StabilizerConfig};
pub use error::{ConfigError, HostError};
pub use host::{EventKind, Handler, Host, InertHost, ListenTarget};
pub use input::{
    Disposition, GesturePhase, HostEvent, KeyInput, Modifiers, TouchStartInput, WheelInput,
};
pub use keyboard::{KeyRule, KeyboardPolicy, ModifierConstraints};
pub use options::StabilizerOptions;
pub use stabilizer::{StabilizerHandle, StabilizerSnapshot, ViewportStabilizer};
pub use teardown::{Release, ReleaseFn, TeardownStack};
