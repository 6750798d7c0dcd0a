#![forbid(unsafe_code)]

//! Options as they arrive from page scripts.
//!
//! The JS side hands over `JSON.stringify(options)` plus the element
//! references it found in `allow`/`watch`. Elements stringify to `{}`, so
//! anything in an allow position that is not a selector string is dropped
//! from the JSON here and the elements are appended as direct entries.

use serde_json::Value;
use vstab_core::{AllowEntry, ConfigError, ConfigOverrides, StabilizerOptions};

const ALLOW_KEYS: [&str; 2] = ["allow", "watch"];

/// Parsed options plus the element references that travelled beside them.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GuardOptions<E> {
    pub options: StabilizerOptions,
    pub elements: Vec<E>,
}

impl<E> GuardOptions<E> {
    pub fn parse(json: &str, elements: Vec<E>) -> Result<Self, ConfigError> {
        let mut value: Value = serde_json::from_str(json)?;
        strip_non_selectors(&mut value);
        let options = StabilizerOptions::from_json(&value.to_string())?;
        Ok(Self { options, elements })
    }

    pub fn into_overrides(self) -> ConfigOverrides<E> {
        let mut overrides = self.options.into_overrides();
        if !self.elements.is_empty() {
            overrides
                .allow
                .get_or_insert_with(Vec::new)
                .extend(self.elements.into_iter().map(AllowEntry::Element));
        }
        overrides
    }
}

fn strip_allow_value(value: &mut Value) {
    match value {
        Value::String(_) => {}
        Value::Array(items) => items.retain(Value::is_string),
        other => *other = Value::Array(Vec::new()),
    }
}

fn strip_non_selectors(value: &mut Value) {
    match value {
        Value::Array(items) => items.retain(Value::is_string),
        Value::Object(map) => {
            for key in ALLOW_KEYS {
                if let Some(allow) = map.get_mut(key) {
                    strip_allow_value(allow);
                }
            }
        }
        _ => {}
    }
}
