#![forbid(unsafe_code)]

//! Keyboard zoom policy.
//!
//! Browsers zoom on ctrl/cmd combined with `+`, `-`, `=` and `0`. The policy
//! decides which keydowns the stabilizer cancels:
//!
//! - [`KeyboardPolicy::None`]: never intercept.
//! - [`KeyboardPolicy::BlockAllModified`]: cancel any keydown with ctrl or
//!   meta held.
//! - [`KeyboardPolicy::Rules`]: cancel on the first rule whose modifier
//!   constraints and key both match.
//!
//! In every policy a keydown whose target is inside the allow-list proceeds.
//!
//! # Options encoding
//!
//! ```
//! use vstab_core::keyboard::KeyboardPolicy;
//!
//! let policy: KeyboardPolicy = serde_json::from_str("true").unwrap();
//! assert_eq!(policy, KeyboardPolicy::BlockAllModified);
//!
//! let policy: KeyboardPolicy =
//!     serde_json::from_str(r#"[{"mods":{"ctrl":true},"key":"+"}]"#).unwrap();
//! assert!(matches!(policy, KeyboardPolicy::Rules(ref rules) if rules.len() == 1));
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::input::Modifiers;

/// Required on/off state per modifier. `None` leaves the modifier unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierConstraints {
    #[serde(alias = "ctrlKey", skip_serializing_if = "Option::is_none")]
    pub ctrl: Option<bool>,
    #[serde(alias = "metaKey", skip_serializing_if = "Option::is_none")]
    pub meta: Option<bool>,
    #[serde(alias = "altKey", skip_serializing_if = "Option::is_none")]
    pub alt: Option<bool>,
    #[serde(alias = "shiftKey", skip_serializing_if = "Option::is_none")]
    pub shift: Option<bool>,
}

impl ModifierConstraints {
    /// Only ctrl is constrained (held).
    #[must_use]
    pub const fn ctrl() -> Self {
        Self {
            ctrl: Some(true),
            meta: None,
            alt: None,
            shift: None,
        }
    }

    /// Only meta is constrained (held).
    #[must_use]
    pub const fn meta() -> Self {
        Self {
            ctrl: None,
            meta: Some(true),
            alt: None,
            shift: None,
        }
    }

    #[must_use]
    pub fn matches(&self, mods: Modifiers) -> bool {
        [
            (self.ctrl, Modifiers::CTRL),
            (self.meta, Modifiers::META),
            (self.alt, Modifiers::ALT),
            (self.shift, Modifiers::SHIFT),
        ]
        .into_iter()
        .all(|(want, flag)| want.is_none_or(|held| mods.contains(flag) == held))
    }
}

/// One `{mods, key}` rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRule {
    #[serde(default, alias = "modifiers")]
    pub mods: ModifierConstraints,
    pub key: String,
}

impl KeyRule {
    #[must_use]
    pub fn new(mods: ModifierConstraints, key: impl Into<String>) -> Self {
        Self {
            mods,
            key: key.into(),
        }
    }

    #[must_use]
    pub fn matches(&self, mods: Modifiers, key: &str) -> bool {
        self.mods.matches(mods) && self.key == key
    }
}

/// Which keydowns are cancelled outside the allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "KeyboardPolicySpec", into = "KeyboardPolicySpec")]
pub enum KeyboardPolicy {
    #[default]
    None,
    BlockAllModified,
    Rules(Vec<KeyRule>),
}

impl KeyboardPolicy {
    /// Ctrl and meta variants of the usual zoom keys (`+`, `-`, `=`, `0`).
    #[must_use]
    pub fn zoom_keys() -> Self {
        let mut rules = Vec::with_capacity(8);
        for mods in [ModifierConstraints::ctrl(), ModifierConstraints::meta()] {
            for key in ["+", "-", "=", "0"] {
                rules.push(KeyRule::new(mods, key));
            }
        }
        Self::Rules(rules)
    }

    /// Whether a keydown listener is needed at all.
    #[must_use]
    pub fn intercepts(&self) -> bool {
        match self {
            Self::None => false,
            Self::BlockAllModified => true,
            Self::Rules(rules) => !rules.is_empty(),
        }
    }

    /// Index of the first rule matching the event, for rule-list policies.
    #[must_use]
    pub fn matching_rule(&self, mods: Modifiers, key: &str) -> Option<usize> {
        match self {
            Self::Rules(rules) => rules.iter().position(|rule| rule.matches(mods, key)),
            _ => None,
        }
    }

    /// Decide whether a keydown is cancelled.
    ///
    /// `inside_allowed` is computed by the caller from the event's nominal
    /// target. When focus sits outside any focusable element that target is
    /// usually the body, so in practice the allow-list rarely exempts
    /// keyboard zoom.
    #[must_use]
    pub fn should_block(&self, mods: Modifiers, key: &str, inside_allowed: bool) -> bool {
        if inside_allowed {
            return false;
        }
        match self {
            Self::None => false,
            Self::BlockAllModified => mods.intersects(Modifiers::CTRL | Modifiers::META),
            Self::Rules(_) => self.matching_rule(mods, key).is_some(),
        }
    }
}

/// Serialized shape: `false` | `true` | `"none"` | `"block-all-modified"` | `[rule, ...]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum KeyboardPolicySpec {
    Flag(bool),
    Name(String),
    Rules(Vec<KeyRule>),
}

impl TryFrom<KeyboardPolicySpec> for KeyboardPolicy {
    type Error = ConfigError;

    fn try_from(spec: KeyboardPolicySpec) -> Result<Self, Self::Error> {
        match spec {
            KeyboardPolicySpec::Flag(false) => Ok(Self::None),
            KeyboardPolicySpec::Flag(true) => Ok(Self::BlockAllModified),
            KeyboardPolicySpec::Name(name) => match name.as_str() {
                "none" | "block-none" => Ok(Self::None),
                "all" | "block-all-modified" => Ok(Self::BlockAllModified),
                "zoom-keys" => Ok(Self::zoom_keys()),
                _ => Err(ConfigError::UnknownPolicy { name }),
            },
            KeyboardPolicySpec::Rules(rules) => {
                if let Some(index) = rules.iter().position(|rule| rule.key.is_empty()) {
                    return Err(ConfigError::EmptyRuleKey { index });
                }
                Ok(Self::Rules(rules))
            }
        }
    }
}

impl From<KeyboardPolicy> for KeyboardPolicySpec {
    fn from(policy: KeyboardPolicy) -> Self {
        match policy {
            KeyboardPolicy::None => Self::Flag(false),
            KeyboardPolicy::BlockAllModified => Self::Flag(true),
            KeyboardPolicy::Rules(rules) => Self::Rules(rules),
        }
    }
}

impl From<bool> for KeyboardPolicy {
    fn from(block_all: bool) -> Self {
        if block_all {
            Self::BlockAllModified
        } else {
            Self::None
        }
    }
}

impl From<Vec<KeyRule>> for KeyboardPolicy {
    fn from(rules: Vec<KeyRule>) -> Self {
        Self::Rules(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn plus_minus_rules() -> KeyboardPolicy {
        KeyboardPolicy::Rules(vec![
            KeyRule::new(ModifierConstraints::ctrl(), "+"),
            KeyRule::new(ModifierConstraints::ctrl(), "-"),
        ])
    }

    #[test]
    fn rule_list_blocks_matching_combo_outside_allow_list() {
        let policy = plus_minus_rules();
        assert!(policy.should_block(Modifiers::CTRL, "+", false));
        assert!(policy.should_block(Modifiers::CTRL, "-", false));
        assert!(!policy.should_block(Modifiers::CTRL, "a", false));
        assert!(!policy.should_block(Modifiers::CTRL, "+", true));
    }

    #[test]
    fn rule_keys_are_case_sensitive() {
        let policy = KeyboardPolicy::Rules(vec![KeyRule::new(ModifierConstraints::ctrl(), "a")]);
        assert!(policy.should_block(Modifiers::CTRL, "a", false));
        assert!(!policy.should_block(Modifiers::CTRL, "A", false));
    }

    #[test]
    fn unlisted_modifiers_are_unconstrained() {
        let policy = plus_minus_rules();
        assert!(policy.should_block(Modifiers::CTRL | Modifiers::SHIFT, "+", false));
        assert!(!policy.should_block(Modifiers::SHIFT, "+", false));
    }

    #[test]
    fn explicit_false_constraint_excludes_modifier() {
        let rule = KeyRule::new(
            ModifierConstraints {
                ctrl: Some(true),
                shift: Some(false),
                ..ModifierConstraints::default()
            },
            "=",
        );
        let policy = KeyboardPolicy::Rules(vec![rule]);
        assert!(policy.should_block(Modifiers::CTRL, "=", false));
        assert!(!policy.should_block(Modifiers::CTRL | Modifiers::SHIFT, "=", false));
    }

    #[test]
    fn first_matching_rule_wins() {
        let policy = KeyboardPolicy::Rules(vec![
            KeyRule::new(ModifierConstraints::default(), "+"),
            KeyRule::new(ModifierConstraints::ctrl(), "+"),
        ]);
        assert_eq!(policy.matching_rule(Modifiers::CTRL, "+"), Some(0));
    }

    #[test]
    fn block_all_modified_ignores_key() {
        let policy = KeyboardPolicy::BlockAllModified;
        assert!(policy.should_block(Modifiers::CTRL, "x", false));
        assert!(policy.should_block(Modifiers::META, "Enter", false));
        assert!(!policy.should_block(Modifiers::ALT | Modifiers::SHIFT, "+", false));
        assert!(!policy.should_block(Modifiers::CTRL, "+", true));
    }

    #[test]
    fn policy_parses_all_encodings() {
        let none: KeyboardPolicy = serde_json::from_str("false").unwrap();
        assert_eq!(none, KeyboardPolicy::None);
        let named: KeyboardPolicy = serde_json::from_str(r#""block-all-modified""#).unwrap();
        assert_eq!(named, KeyboardPolicy::BlockAllModified);
        let rules: KeyboardPolicy = serde_json::from_str(
            r#"[{"mods":{"ctrlKey":true},"key":"+"},{"modifiers":{"meta":true,"shift":false},"key":"-"}]"#,
        )
        .unwrap();
        assert_eq!(
            rules,
            KeyboardPolicy::Rules(vec![
                KeyRule::new(ModifierConstraints::ctrl(), "+"),
                KeyRule::new(
                    ModifierConstraints {
                        meta: Some(true),
                        shift: Some(false),
                        ..ModifierConstraints::default()
                    },
                    "-"
                ),
            ])
        );
    }

    #[test]
    fn policy_rejects_empty_key_and_unknown_name() {
        assert!(serde_json::from_str::<KeyboardPolicy>(r#"[{"key":""}]"#).is_err());
        assert!(serde_json::from_str::<KeyboardPolicy>(r#""sometimes""#).is_err());
    }

    #[test]
    fn zoom_keys_cover_ctrl_and_meta() {
        let policy = KeyboardPolicy::zoom_keys();
        for key in ["+", "-", "=", "0"] {
            assert!(policy.should_block(Modifiers::CTRL, key, false));
            assert!(policy.should_block(Modifiers::META, key, false));
            assert!(!policy.should_block(Modifiers::empty(), key, false));
        }
    }

    fn arb_mods() -> impl Strategy<Value = Modifiers> {
        (0u8..16).prop_map(Modifiers::from_bits_truncate)
    }

    proptest! {
        #[test]
        fn nothing_is_blocked_inside_allow_list(mods in arb_mods(), key in "[a-z+=0-]{1,3}") {
            for policy in [KeyboardPolicy::None, KeyboardPolicy::BlockAllModified, KeyboardPolicy::zoom_keys()] {
                prop_assert!(!policy.should_block(mods, &key, true));
            }
        }

        #[test]
        fn none_policy_never_blocks(mods in arb_mods(), key in "\\PC{1,4}") {
            prop_assert!(!KeyboardPolicy::None.should_block(mods, &key, false));
        }

        #[test]
        fn block_all_tracks_ctrl_or_meta(mods in arb_mods(), key in "\\PC{1,4}") {
            let expected = mods.intersects(Modifiers::CTRL | Modifiers::META);
            prop_assert_eq!(KeyboardPolicy::BlockAllModified.should_block(mods, &key, false), expected);
        }
    }
}
