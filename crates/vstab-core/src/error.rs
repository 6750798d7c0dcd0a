#![forbid(unsafe_code)]

//! Error types for host operations and option parsing.
//!
//! None of these escape the public lifecycle operations of
//! [`crate::ViewportStabilizer`]; they exist so host adapters can report
//! what went wrong and the stabilizer can log it before degrading.

use thiserror::Error;

use crate::host::ListenTarget;

/// Failure reported by a [`crate::Host`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The listener target does not exist in this document (e.g. no visual viewport).
    #[error("listener target unavailable: {target:?}")]
    TargetUnavailable { target: ListenTarget },

    /// A selector could not be parsed by the host's selector engine.
    #[error("invalid selector: {selector:?}")]
    InvalidSelector { selector: String },

    /// A style or property write failed.
    #[error("dom write failed for {name}: {message}")]
    DomWrite { name: String, message: String },

    /// A release action failed during teardown.
    #[error("release failed for {label}: {message}")]
    Release { label: String, message: String },
}

impl HostError {
    #[must_use]
    pub fn dom_write(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DomWrite {
            name: name.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn release(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Release {
            label: label.into(),
            message: message.into(),
        }
    }
}

/// Failure while parsing stabilizer options.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("options JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("keyboard rule {index} has an empty key")]
    EmptyRuleKey { index: usize },

    #[error("unknown keyboard policy: {name:?}")]
    UnknownPolicy { name: String },
}
