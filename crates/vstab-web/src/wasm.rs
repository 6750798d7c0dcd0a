#![forbid(unsafe_code)]

//! `wasm-bindgen` exports: [`ViewportGuard`], [`GuardHandle`] and
//! `installViewportGuard`.
//!
//! Only compiled on `wasm32` targets. Outside a browser main thread the
//! exports wrap an [`InertHost`] stabilizer, so every call is a no-op.

use js_sys::{Array, JSON, Object, Reflect};
use tracing::debug;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::Element;

use vstab_core::{
    InertHost, StabilizerConfig, StabilizerHandle, StabilizerSnapshot, ViewportStabilizer,
};

use crate::guard_options::GuardOptions;
use crate::host::WebHost;

/// Best-effort `console.error(msg)`; silent when no console exists.
fn report_to_console(msg: &str) {
    let console = Reflect::get(&js_sys::global(), &JsValue::from_str("console")).ok();
    let error_fn = console.as_ref().and_then(|console| {
        Reflect::get(console, &JsValue::from_str("error"))
            .ok()?
            .dyn_into::<js_sys::Function>()
            .ok()
    });
    if let (Some(console), Some(error_fn)) = (console, error_fn) {
        let _ = error_fn.call1(&console, &JsValue::from_str(msg));
    }
}

fn install_panic_hook() {
    static HOOK: std::sync::Once = std::sync::Once::new();
    HOOK.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let msg = match info.location() {
                Some(at) => format!(
                    "vstab panicked at {}:{}:{}: {info}",
                    at.file(),
                    at.line(),
                    at.column()
                ),
                None => format!("vstab panicked: {info}"),
            };
            report_to_console(&msg);
        }));
    });
}

fn put(obj: &Object, key: &str, value: impl Into<JsValue>) {
    let _ = Reflect::set(obj, &JsValue::from_str(key), &value.into());
}

fn snapshot_to_js(snapshot: &StabilizerSnapshot) -> JsValue {
    let obj = Object::new();
    put(&obj, "available", snapshot.available);
    put(&obj, "active", snapshot.active);
    put(&obj, "registrations", snapshot.registrations as f64);
    put(&obj, "repaintPending", snapshot.repaint_pending);
    put(&obj, "repaintRequests", snapshot.repaint_requests as f64);
    put(&obj, "heightVar", snapshot.height_var.as_str());
    obj.into()
}

/// Element references in an allow position: the value itself when it is an
/// element or array, otherwise its `allow`/`watch` property.
fn allow_elements(options: &JsValue) -> Vec<Element> {
    let allow = if options.is_instance_of::<Element>() || Array::is_array(options) {
        options.clone()
    } else {
        ["allow", "watch"]
            .into_iter()
            .filter_map(|key| Reflect::get(options, &JsValue::from_str(key)).ok())
            .find(|value| !value.is_undefined())
            .unwrap_or(JsValue::UNDEFINED)
    };
    if let Some(element) = allow.dyn_ref::<Element>() {
        return vec![element.clone()];
    }
    if Array::is_array(&allow) {
        return Array::from(&allow)
            .iter()
            .filter_map(|item| item.dyn_into::<Element>().ok())
            .collect();
    }
    Vec::new()
}

/// `None` for `undefined`/`null`; otherwise the parsed options.
fn parse_options(options: &JsValue) -> Result<Option<GuardOptions<Element>>, JsValue> {
    if options.is_undefined() || options.is_null() {
        return Ok(None);
    }
    let json: String = JSON::stringify(options)?.into();
    GuardOptions::parse(&json, allow_elements(options))
        .map(Some)
        .map_err(|err| JsValue::from_str(&err.to_string()))
}

enum Backend {
    Web(ViewportStabilizer<WebHost>),
    Inert(ViewportStabilizer<InertHost>),
}

impl Backend {
    fn new(options: Option<GuardOptions<Element>>) -> Self {
        match WebHost::detect() {
            Some(host) => {
                let config = match options {
                    Some(options) => StabilizerConfig::default().merged(options.into_overrides()),
                    None => StabilizerConfig::default(),
                };
                Self::Web(ViewportStabilizer::new(host, config))
            }
            None => {
                debug!("no window/document; viewport guard is inert");
                Self::Inert(ViewportStabilizer::new(
                    InertHost,
                    StabilizerConfig::<()>::default(),
                ))
            }
        }
    }

    fn activate(&self, options: Option<GuardOptions<Element>>) -> bool {
        match self {
            Self::Web(stabilizer) => stabilizer.activate(options.map(GuardOptions::into_overrides)),
            Self::Inert(stabilizer) => stabilizer.activate(
                options.map(|options| options.options.into_overrides::<()>()),
            ),
        }
    }

    fn deactivate(&self) -> bool {
        match self {
            Self::Web(stabilizer) => stabilizer.deactivate(),
            Self::Inert(stabilizer) => stabilizer.deactivate(),
        }
    }

    fn refresh_viewport(&self) -> bool {
        match self {
            Self::Web(stabilizer) => stabilizer.refresh_viewport(),
            Self::Inert(stabilizer) => stabilizer.refresh_viewport(),
        }
    }

    fn is_active(&self) -> bool {
        match self {
            Self::Web(stabilizer) => stabilizer.is_active(),
            Self::Inert(stabilizer) => stabilizer.is_active(),
        }
    }

    fn snapshot(&self) -> StabilizerSnapshot {
        match self {
            Self::Web(stabilizer) => stabilizer.snapshot(),
            Self::Inert(stabilizer) => stabilizer.snapshot(),
        }
    }

    fn handle(&self) -> GuardHandle {
        let inner = match self {
            Self::Web(stabilizer) => HandleBackend::Web(stabilizer.handle()),
            Self::Inert(stabilizer) => HandleBackend::Inert(stabilizer.handle()),
        };
        GuardHandle { inner }
    }
}

/// Viewport height stabilizer and zoom guard for the current page.
///
/// Sets `--vh` (or the configured variable) on `<html>` and blocks
/// ctrl+wheel, configured zoom keys and pinch gestures outside the
/// allow-list. Freeing the object deactivates it.
#[wasm_bindgen]
pub struct ViewportGuard {
    backend: Backend,
}

#[wasm_bindgen(start)]
pub fn wasm_start() {
    install_panic_hook();
}

#[wasm_bindgen]
impl ViewportGuard {
    /// Create an inactive guard.
    ///
    /// `options` is an options object, a selector string, an element, or an
    /// array of selectors and elements.
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> Result<ViewportGuard, JsValue> {
        install_panic_hook();
        let options = parse_options(&options)?;
        Ok(Self {
            backend: Backend::new(options),
        })
    }

    /// Start the guard. Passing options restarts an active guard under the
    /// merged configuration.
    pub fn activate(&self, overrides: JsValue) -> Result<bool, JsValue> {
        let overrides = parse_options(&overrides)?;
        Ok(self.backend.activate(overrides))
    }

    pub fn deactivate(&self) -> bool {
        self.backend.deactivate()
    }

    #[wasm_bindgen(js_name = refreshViewport)]
    pub fn refresh_viewport(&self) -> bool {
        self.backend.refresh_viewport()
    }

    #[wasm_bindgen(js_name = isActive)]
    pub fn is_active(&self) -> bool {
        self.backend.is_active()
    }

    /// `{ available, active, registrations, repaintPending, repaintRequests, heightVar }`.
    pub fn snapshot(&self) -> JsValue {
        snapshot_to_js(&self.backend.snapshot())
    }

    /// Refresh/destroy pair that keeps the guard alive on its own.
    pub fn handle(&self) -> GuardHandle {
        self.backend.handle()
    }
}

enum HandleBackend {
    Web(StabilizerHandle<WebHost>),
    Inert(StabilizerHandle<InertHost>),
}

/// Returned by `installViewportGuard`; call `destroy()` on unmount.
#[wasm_bindgen]
pub struct GuardHandle {
    inner: HandleBackend,
}

#[wasm_bindgen]
impl GuardHandle {
    pub fn refresh(&self) -> bool {
        match &self.inner {
            HandleBackend::Web(handle) => handle.refresh(),
            HandleBackend::Inert(handle) => handle.refresh(),
        }
    }

    pub fn destroy(&self) -> bool {
        match &self.inner {
            HandleBackend::Web(handle) => handle.destroy(),
            HandleBackend::Inert(handle) => handle.destroy(),
        }
    }
}

/// Construct and activate a guard; returns its handle.
#[wasm_bindgen(js_name = installViewportGuard)]
pub fn install_viewport_guard(options: JsValue) -> Result<GuardHandle, JsValue> {
    let guard = ViewportGuard::new(options)?;
    guard.backend.activate(None);
    Ok(guard.handle())
}
