#![forbid(unsafe_code)]

//! JSON options accepted from JS hosts.
//!
//! The options object mirrors what page scripts pass to the guard:
//!
//! ```json
//! {
//!   "allow": ["#map", ".canvas"],
//!   "maxZoom": 1,
//!   "lockScroll": false,
//!   "useVisualViewport": true,
//!   "cssVar": "--vh",
//!   "blockKeyboardZoom": [{ "mods": { "ctrl": true }, "key": "+" }]
//! }
//! ```
//!
//! `watch` is the legacy name of `allow`. A bare selector string or array of
//! selector strings is accepted in place of the object.

use serde::{Deserialize, Serialize};

use crate::config::{AllowEntry, ConfigOverrides};
use crate::error::ConfigError;
use crate::keyboard::KeyboardPolicy;

/// One selector or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorList {
    One(String),
    Many(Vec<String>),
}

impl SelectorList {
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(list) => list,
        }
    }
}

/// Parsed options; absent fields keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StabilizerOptions {
    #[serde(alias = "watch", skip_serializing_if = "Option::is_none")]
    pub allow: Option<SelectorList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_scroll: Option<bool>,
    #[serde(alias = "preferVisualViewport", skip_serializing_if = "Option::is_none")]
    pub use_visual_viewport: Option<bool>,
    #[serde(alias = "heightVar", skip_serializing_if = "Option::is_none")]
    pub css_var: Option<String>,
    #[serde(alias = "keyboard", skip_serializing_if = "Option::is_none")]
    pub block_keyboard_zoom: Option<KeyboardPolicy>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OptionsInput {
    Selectors(SelectorList),
    Options(StabilizerOptions),
}

impl StabilizerOptions {
    /// Parse an options object, or a bare selector string/array.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let input: OptionsInput = serde_json::from_str(json)?;
        Ok(match input {
            OptionsInput::Selectors(list) => Self {
                allow: Some(list),
                ..Self::default()
            },
            OptionsInput::Options(options) => options,
        })
    }

    /// Convert into config overrides. Selector entries only; element
    /// references are added by the host adapter.
    #[must_use]
    pub fn into_overrides<E>(self) -> ConfigOverrides<E> {
        ConfigOverrides {
            allow: self.allow.map(|list| {
                list.into_vec()
                    .into_iter()
                    .map(AllowEntry::Selector)
                    .collect()
            }),
            height_var: self.css_var,
            lock_scroll: self.lock_scroll,
            max_zoom: self.max_zoom,
            prefer_visual_viewport: self.use_visual_viewport,
            keyboard: self.block_keyboard_zoom,
        }
    }
}
