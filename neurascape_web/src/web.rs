use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use neurascape::config::EngineConfig;
use neurascape::engine::{Engine, HostContext};
use neurascape::governor::DeviceProfile;

mod canvas;

use canvas::CanvasSurface;

const REDUCED_MOTION_QUERY: &str = "(prefers-reduced-motion: reduce)";

// WEBGL_debug_renderer_info.UNMASKED_RENDERER_WEBGL
const UNMASKED_RENDERER_WEBGL: u32 = 0x9246;

struct Host {
    engine: Engine,
    surface: CanvasSurface,
}

type Shared = Rc<RefCell<Option<Host>>>;

struct Listener {
    target: web_sys::EventTarget,
    kind: &'static str,
    cb: Closure<dyn FnMut(web_sys::Event)>,
}

/// Handle returned to the page. Dropping it without `destroy` leaves the
/// animation running for the page's lifetime.
#[wasm_bindgen]
pub struct NeurascapeHandle {
    shared: Shared,
    listeners: Vec<Listener>,
}

fn log(msg: &str) {
    web_sys::console::log_1(&JsValue::from_str(msg));
}

fn warn(msg: &str) {
    web_sys::console::warn_1(&JsValue::from_str(msg));
}

/// Start the background on the canvas with id `canvas_id`.
///
/// Returns `undefined` when there is no such canvas or it has no 2D context;
/// the page simply runs without the background.
#[wasm_bindgen]
pub fn start(canvas_id: &str, config_json: Option<String>) -> Option<NeurascapeHandle> {
    let window = web_sys::window()?;
    let document = window.document()?;

    let surface = document
        .get_element_by_id(canvas_id)
        .and_then(|el| el.dyn_into::<web_sys::HtmlCanvasElement>().ok())
        .map(CanvasSurface::new)
        .and_then(|res| res.map_err(|e| log(&format!("neurascape: {e}"))).ok());

    let cfg = match config_json.as_deref().map(EngineConfig::from_json_str) {
        Some(Ok(cfg)) => cfg,
        Some(Err(e)) => {
            warn(&format!("neurascape: bad config, using defaults: {e}"));
            EngineConfig::default()
        }
        None => EngineConfig::default(),
    };

    let reduced_motion_query = window.match_media(REDUCED_MOTION_QUERY).ok().flatten();
    let host_ctx = HostContext {
        device: detect_device(&window, &document),
        reduced_motion: reduced_motion_query.as_ref().is_some_and(|q| q.matches()),
        visible: !document.hidden(),
    };

    let engine = Engine::initialize(cfg, host_ctx, surface.as_ref())?;
    let surface = surface?;
    let shared: Shared = Rc::new(RefCell::new(Some(Host { engine, surface })));

    let mut handle = NeurascapeHandle {
        shared: Rc::clone(&shared),
        listeners: Vec::new(),
    };
    handle.install_listeners(&window, &document, reduced_motion_query);
    start_animation(&window, shared);
    Some(handle)
}

fn detect_device(window: &web_sys::Window, document: &web_sys::Document) -> DeviceProfile {
    let navigator = window.navigator();
    let user_agent = navigator.user_agent().unwrap_or_default();
    let cores = navigator.hardware_concurrency();
    let cores = if cores.is_finite() && cores >= 1.0 {
        cores as u32
    } else {
        DeviceProfile::default().cores
    };
    let renderer = webgl_renderer(document);
    DeviceProfile::detect(&user_agent, cores, renderer.as_deref())
}

fn webgl_renderer(document: &web_sys::Document) -> Option<String> {
    let probe = document
        .create_element("canvas")
        .ok()?
        .dyn_into::<web_sys::HtmlCanvasElement>()
        .ok()?;
    let gl = probe
        .get_context("webgl")
        .ok()??
        .dyn_into::<web_sys::WebGlRenderingContext>()
        .ok()?;
    let param = if gl.get_extension("WEBGL_debug_renderer_info").ok()?.is_some() {
        UNMASKED_RENDERER_WEBGL
    } else {
        web_sys::WebGlRenderingContext::RENDERER
    };
    gl.get_parameter(param).ok()?.as_string()
}

fn with_host(shared: &Shared, f: impl FnOnce(&mut Host)) {
    if let Ok(mut slot) = shared.try_borrow_mut() {
        if let Some(host) = slot.as_mut() {
            f(host);
        }
    }
}

/// requestAnimationFrame loop. Stops rescheduling once the host is gone.
fn start_animation(window: &web_sys::Window, shared: Shared) {
    let slot: Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>> = Rc::new(RefCell::new(None));
    let again = Rc::clone(&slot);

    *slot.borrow_mut() = Some(Closure::wrap(Box::new(move |now: f64| {
        let alive = match shared.try_borrow_mut() {
            Ok(mut guard) => match guard.as_mut() {
                Some(Host { engine, surface }) => {
                    engine.frame(now, surface);
                    true
                }
                None => false,
            },
            Err(_) => true,
        };
        if !alive {
            // Break the self-reference so the closure is freed.
            if let Ok(mut cb) = again.try_borrow_mut() {
                cb.take();
            }
            return;
        }
        if let (Some(w), Some(cb)) = (web_sys::window(), again.borrow().as_ref()) {
            let _ = w.request_animation_frame(cb.as_ref().unchecked_ref());
        }
    }) as Box<dyn FnMut(f64)>));

    if let Some(cb) = slot.borrow().as_ref() {
        if window
            .request_animation_frame(cb.as_ref().unchecked_ref())
            .is_err()
        {
            warn("neurascape: requestAnimationFrame unavailable");
        }
    }
}

impl NeurascapeHandle {
    fn listen(
        &mut self,
        target: web_sys::EventTarget,
        kind: &'static str,
        f: impl FnMut(web_sys::Event) + 'static,
    ) {
        let cb = Closure::wrap(Box::new(f) as Box<dyn FnMut(web_sys::Event)>);
        if target
            .add_event_listener_with_callback(kind, cb.as_ref().unchecked_ref())
            .is_ok()
        {
            self.listeners.push(Listener { target, kind, cb });
        }
    }

    fn install_listeners(
        &mut self,
        window: &web_sys::Window,
        document: &web_sys::Document,
        reduced_motion_query: Option<web_sys::MediaQueryList>,
    ) {
        let shared = Rc::clone(&self.shared);
        self.listen(window.clone().into(), "mousemove", move |ev| {
            let Some(ev) = ev.dyn_ref::<web_sys::MouseEvent>() else {
                return;
            };
            with_host(&shared, |h| {
                let (x, y) = h.surface.to_local(ev.client_x(), ev.client_y());
                h.engine.on_pointer_move(x, y);
            });
        });

        let shared = Rc::clone(&self.shared);
        self.listen(window.clone().into(), "click", move |ev| {
            let Some(ev) = ev.dyn_ref::<web_sys::MouseEvent>() else {
                return;
            };
            with_host(&shared, |h| {
                let (x, y) = h.surface.to_local(ev.client_x(), ev.client_y());
                h.engine.on_click(x, y);
            });
        });

        let shared = Rc::clone(&self.shared);
        self.listen(window.clone().into(), "resize", move |_| {
            with_host(&shared, |h| {
                let (w, h2) = h.surface.sync_size();
                h.engine.resize(w, h2);
            });
        });

        let shared = Rc::clone(&self.shared);
        let doc = document.clone();
        self.listen(document.clone().into(), "visibilitychange", move |_| {
            let visible = !doc.hidden();
            with_host(&shared, |h| h.engine.set_visible(visible));
        });

        if let Some(query) = reduced_motion_query {
            let shared = Rc::clone(&self.shared);
            let q = query.clone();
            self.listen(query.into(), "change", move |_| {
                let on = q.matches();
                with_host(&shared, |h| h.engine.set_reduced_motion(on));
            });
        }
    }
}

#[wasm_bindgen]
impl NeurascapeHandle {
    /// The page navigated to another section.
    pub fn section_changed(&self, section: &str) {
        with_host(&self.shared, |h| h.engine.on_section_change(section));
    }

    pub fn pause(&self) {
        with_host(&self.shared, |h| h.engine.pause());
    }

    pub fn resume(&self) {
        with_host(&self.shared, |h| h.engine.resume());
    }

    pub fn set_reduced_motion(&self, on: bool) {
        with_host(&self.shared, |h| h.engine.set_reduced_motion(on));
    }

    /// Host-measured frame time in ms. Replaces the engine's own sampling.
    pub fn report_frame_time(&self, ms: f64) {
        with_host(&self.shared, |h| h.engine.report_frame_time(ms));
    }

    /// Tear down: remove listeners and drop the engine. The animation loop
    /// sees the empty slot and stops.
    pub fn destroy(&mut self) {
        for l in self.listeners.drain(..) {
            let _ = l
                .target
                .remove_event_listener_with_callback(l.kind, l.cb.as_ref().unchecked_ref());
        }
        if let Ok(mut slot) = self.shared.try_borrow_mut() {
            slot.take();
        }
        log("neurascape: stopped");
    }
}
