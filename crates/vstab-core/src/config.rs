#![forbid(unsafe_code)]

//! Stabilizer configuration.
//!
//! [`StabilizerConfig`] is the normalized, immutable-after-construction
//! record the stabilizer runs with. [`ConfigOverrides`] carries the partial
//! updates accepted by `activate`, and is also what parsed options
//! ([`crate::options::StabilizerOptions`]) turn into.
//!
//! For backward compatibility a bare selector string, or a list of them, is
//! accepted wherever a config is and becomes the allow-list.
//!
//! ```
//! use vstab_core::config::{AllowEntry, StabilizerConfig};
//!
//! let config: StabilizerConfig<()> = StabilizerConfig::from(".map, .canvas");
//! assert_eq!(config.height_var, "--vh");
//! assert_eq!(config.allow, vec![AllowEntry::Selector(".map, .canvas".to_owned())]);
//! ```

use tracing::debug;

use crate::keyboard::KeyboardPolicy;

/// Default custom property name.
pub const DEFAULT_HEIGHT_VAR: &str = "--vh";
/// Default maximum device pixel ratio before ctrl+wheel zoom-in is suppressed.
pub const DEFAULT_MAX_ZOOM: f64 = 1.0;

/// One allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowEntry<E> {
    /// CSS selector, resolved against the document at first use.
    Selector(String),
    /// Direct element reference.
    Element(E),
}

/// Normalized stabilizer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilizerConfig<E> {
    /// Regions in which zoom gestures are left alone.
    pub allow: Vec<AllowEntry<E>>,
    /// Custom property written on the root element.
    /// Default: `--vh`.
    pub height_var: String,
    /// Set `overflow: hidden` on the body while active.
    /// Default: false.
    pub lock_scroll: bool,
    /// Device pixel ratio at or above which ctrl+wheel zoom-in is cancelled.
    /// Default: 1.
    pub max_zoom: f64,
    /// Measure the visual viewport when the browser has one.
    /// Default: true.
    pub prefer_visual_viewport: bool,
    /// Default: [`KeyboardPolicy::None`].
    pub keyboard: KeyboardPolicy,
}

impl<E> Default for StabilizerConfig<E> {
    fn default() -> Self {
        Self {
            allow: Vec::new(),
            height_var: DEFAULT_HEIGHT_VAR.to_owned(),
            lock_scroll: false,
            max_zoom: DEFAULT_MAX_ZOOM,
            prefer_visual_viewport: true,
            keyboard: KeyboardPolicy::None,
        }
    }
}

impl<E> StabilizerConfig<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn allow_selector(mut self, selector: impl Into<String>) -> Self {
        self.allow.push(AllowEntry::Selector(selector.into()));
        self
    }

    #[must_use]
    pub fn allow_element(mut self, element: E) -> Self {
        self.allow.push(AllowEntry::Element(element));
        self
    }

    #[must_use]
    pub fn with_height_var(mut self, name: impl Into<String>) -> Self {
        self.height_var = name.into();
        self
    }

    #[must_use]
    pub fn with_scroll_lock(mut self, lock: bool) -> Self {
        self.lock_scroll = lock;
        self
    }

    #[must_use]
    pub fn with_max_zoom(mut self, max_zoom: f64) -> Self {
        self.max_zoom = max_zoom;
        self
    }

    #[must_use]
    pub fn with_visual_viewport(mut self, prefer: bool) -> Self {
        self.prefer_visual_viewport = prefer;
        self
    }

    #[must_use]
    pub fn with_keyboard_policy(mut self, policy: impl Into<KeyboardPolicy>) -> Self {
        self.keyboard = policy.into();
        self
    }

    /// Normalize values the browser would choke on.
    ///
    /// - `max_zoom` that is not finite or not positive falls back to 1
    /// - a blank `height_var` falls back to `--vh`
    /// - a `height_var` without the `--` prefix gets one
    #[must_use]
    pub fn validated(mut self) -> Self {
        if !self.max_zoom.is_finite() || self.max_zoom <= 0.0 {
            debug!(max_zoom = self.max_zoom, "max_zoom out of range; using default");
            self.max_zoom = DEFAULT_MAX_ZOOM;
        }
        let trimmed = self.height_var.trim();
        if trimmed.is_empty() {
            self.height_var = DEFAULT_HEIGHT_VAR.to_owned();
        } else if !trimmed.starts_with("--") {
            self.height_var = format!("--{trimmed}");
        } else if trimmed.len() != self.height_var.len() {
            self.height_var = trimmed.to_owned();
        }
        self
    }

    /// Apply `overrides` on top of this config and re-normalize.
    #[must_use]
    pub fn merged(mut self, overrides: ConfigOverrides<E>) -> Self {
        let ConfigOverrides {
            allow,
            height_var,
            lock_scroll,
            max_zoom,
            prefer_visual_viewport,
            keyboard,
        } = overrides;
        if let Some(allow) = allow {
            self.allow = allow;
        }
        if let Some(height_var) = height_var {
            self.height_var = height_var;
        }
        if let Some(lock_scroll) = lock_scroll {
            self.lock_scroll = lock_scroll;
        }
        if let Some(max_zoom) = max_zoom {
            self.max_zoom = max_zoom;
        }
        if let Some(prefer) = prefer_visual_viewport {
            self.prefer_visual_viewport = prefer;
        }
        if let Some(keyboard) = keyboard {
            self.keyboard = keyboard;
        }
        self.validated()
    }
}

fn selectors<E, S: Into<String>>(items: impl IntoIterator<Item = S>) -> StabilizerConfig<E> {
    StabilizerConfig {
        allow: items
            .into_iter()
            .map(|s| AllowEntry::Selector(s.into()))
            .collect(),
        ..StabilizerConfig::default()
    }
}

impl<E> From<&str> for StabilizerConfig<E> {
    fn from(selector: &str) -> Self {
        selectors([selector])
    }
}

impl<E> From<String> for StabilizerConfig<E> {
    fn from(selector: String) -> Self {
        selectors([selector])
    }
}

impl<E> From<Vec<String>> for StabilizerConfig<E> {
    fn from(list: Vec<String>) -> Self {
        selectors(list)
    }
}

impl<E> From<&[&str]> for StabilizerConfig<E> {
    fn from(list: &[&str]) -> Self {
        selectors(list.iter().copied())
    }
}

/// Partial configuration; `None` fields keep the current value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigOverrides<E> {
    pub allow: Option<Vec<AllowEntry<E>>>,
    pub height_var: Option<String>,
    pub lock_scroll: Option<bool>,
    pub max_zoom: Option<f64>,
    pub prefer_visual_viewport: Option<bool>,
    pub keyboard: Option<KeyboardPolicy>,
}

impl<E> Default for ConfigOverrides<E> {
    fn default() -> Self {
        Self {
            allow: None,
            height_var: None,
            lock_scroll: None,
            max_zoom: None,
            prefer_visual_viewport: None,
            keyboard: None,
        }
    }
}

impl<E> ConfigOverrides<E> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allow.is_none()
            && self.height_var.is_none()
            && self.lock_scroll.is_none()
            && self.max_zoom.is_none()
            && self.prefer_visual_viewport.is_none()
            && self.keyboard.is_none()
    }
}
