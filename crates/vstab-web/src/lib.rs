#![forbid(unsafe_code)]

//! Browser host for `vstab-core`.
//!
//! [`WebHost`] implements `vstab_core::Host` over `web-sys`, and the `wasm`
//! module exports the JS surface:
//!
//! ```js
//! import init, { installViewportGuard } from "vstab-web";
//!
//! await init();
//! const guard = installViewportGuard({ allow: ["#map"], lockScroll: true });
//! // on unmount
//! guard.destroy();
//! ```
//!
//! Pages then size full-height blocks with `calc(var(--vh, 1vh) * 100)`.

#[cfg(target_arch = "wasm32")]
mod host;
#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use host::{WebHost, WebListener};
#[cfg(target_arch = "wasm32")]
pub use wasm::{GuardHandle, ViewportGuard, install_viewport_guard};

// Options handling is used by the wasm module and by native tests.
#[cfg(any(target_arch = "wasm32", test))]
mod guard_options;
