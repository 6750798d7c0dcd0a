#![forbid(unsafe_code)]

//! Ordered release of acquired registrations.
//!
//! Every listener registration the stabilizer makes yields a [`Release`]
//! guard. Guards are pushed onto a [`TeardownStack`] and unwound in reverse
//! acquisition order, either explicitly on deactivation or implicitly when
//! the stack is dropped. A failing guard is
//! logged and skipped; the remaining guards still run.

use tracing::{trace, warn};

use crate::error::HostError;

/// A registration that can be undone exactly once.
pub trait Release {
    /// Short name used in logs.
    fn label(&self) -> &str {
        "release"
    }

    fn release(self: Box<Self>) -> Result<(), HostError>;
}

/// Adapts a closure into a [`Release`] guard.
pub struct ReleaseFn<F> {
    label: &'static str,
    f: F,
}

impl<F> ReleaseFn<F>
where
    F: FnOnce() -> Result<(), HostError>,
{
    pub fn new(label: &'static str, f: F) -> Self {
        Self { label, f }
    }
}

impl<F> core::fmt::Debug for ReleaseFn<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReleaseFn").field("label", &self.label).finish()
    }
}

impl<F> Release for ReleaseFn<F>
where
    F: FnOnce() -> Result<(), HostError>,
{
    fn label(&self) -> &str {
        self.label
    }

    fn release(self: Box<Self>) -> Result<(), HostError> {
        (self.f)()
    }
}

/// Summary of one unwind pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnwindReport {
    pub released: usize,
    pub failed: usize,
}

/// LIFO stack of release guards.
#[derive(Default)]
pub struct TeardownStack {
    guards: Vec<Box<dyn Release>>,
}

impl core::fmt::Debug for TeardownStack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TeardownStack")
            .field("len", &self.guards.len())
            .finish()
    }
}

impl TeardownStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<R: Release + 'static>(&mut self, guard: R) {
        self.guards.push(Box::new(guard));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Release every guard, most recent first, leaving the stack empty.
    pub fn unwind(&mut self) -> UnwindReport {
        let mut report = UnwindReport::default();
        while let Some(guard) = self.guards.pop() {
            let label = guard.label().to_owned();
            match guard.release() {
                Ok(()) => {
                    trace!(label = %label, "released");
                    report.released += 1;
                }
                Err(err) => {
                    warn!(label = %label, error = %err, "release failed; continuing teardown");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

impl Drop for TeardownStack {
    fn drop(&mut self) {
        if !self.guards.is_empty() {
            self.unwind();
        }
    }
}
