#![forbid(unsafe_code)]

//! Viewport unit computation and frame-coalesced commits.

use crate::host::Host;

/// Fraction of the viewport height one `vh` unit represents.
const VH_FRACTION: f64 = 0.01;

/// Pixel size of one `vh` unit.
///
/// Uses the visual viewport when `prefer_visual` is set and the host has
/// one, the window's inner height otherwise.
#[must_use]
pub fn viewport_unit_px<H: Host>(host: &H, prefer_visual: bool) -> f64 {
    let base = prefer_visual
        .then(|| host.visual_viewport_height())
        .flatten()
        .unwrap_or_else(|| host.inner_height());
    base * VH_FRACTION
}

/// CSS length for a pixel value (`8` → `"8px"`).
#[must_use]
pub fn format_px(value: f64) -> String {
    format!("{value}px")
}

/// Holds at most one pending frame token.
///
/// Scheduling drops (and so cancels) the previous token before requesting a
/// new one, so any number of requests inside one frame yields one callback.
#[derive(Debug)]
pub struct RepaintThrottle<F> {
    pending: Option<F>,
    requests: u64,
}

impl<F> Default for RepaintThrottle<F> {
    fn default() -> Self {
        Self {
            pending: None,
            requests: 0,
        }
    }
}

impl<F> RepaintThrottle<F> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the pending frame, if any, then store the one `request` returns.
    pub fn reschedule(&mut self, request: impl FnOnce() -> F) {
        drop(self.pending.take());
        self.pending = Some(request());
        self.requests += 1;
    }

    /// Cancel the pending frame. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Forget the token of a frame that has already run.
    pub fn complete(&mut self) {
        self.pending = None;
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Total reschedule calls, for diagnostics.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn inner_height_800_is_8px() {
        let host = FakeHost::new();
        host.set_inner_height(800.0);
        let px = viewport_unit_px(&host, true);
        assert_eq!(format_px(px), "8px");
    }

    #[test]
    fn visual_viewport_preferred_when_present() {
        let host = FakeHost::new();
        host.set_inner_height(800.0);
        host.set_visual_viewport_height(Some(600.0));
        assert_eq!(format_px(viewport_unit_px(&host, true)), "6px");
        assert_eq!(format_px(viewport_unit_px(&host, false)), "8px");
    }

    #[test]
    fn fractional_heights_keep_full_precision() {
        let host = FakeHost::new();
        host.set_inner_height(812.0);
        assert_eq!(format_px(viewport_unit_px(&host, false)), format!("{}px", 812.0 * 0.01));
    }

    struct Token(Rc<Cell<u32>>);

    impl Drop for Token {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn reschedule_drops_previous_token() {
        let dropped = Rc::new(Cell::new(0));
        let mut throttle = RepaintThrottle::new();
        throttle.reschedule(|| Token(Rc::clone(&dropped)));
        throttle.reschedule(|| Token(Rc::clone(&dropped)));
        throttle.reschedule(|| Token(Rc::clone(&dropped)));
        assert_eq!(dropped.get(), 2);
        assert!(throttle.is_pending());
        assert_eq!(throttle.requests(), 3);

        assert!(throttle.cancel());
        assert_eq!(dropped.get(), 3);
        assert!(!throttle.cancel());
    }
}
