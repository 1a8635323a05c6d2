//! Browser helpers
//!
//! Canvas discovery and sizing for hosts running the renderer in a
//! WebAssembly page, plus console logging callable from JavaScript.

use crate::backend::{BackendError, BackendResult};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use winit::dpi::PhysicalSize;
use winit::event_loop::EventLoop;
use winit::platform::web::{WindowBuilderExtWebSys, WindowExtWebSys};
use winit::window::{Window, WindowBuilder};

fn browser_window() -> BackendResult<web_sys::Window> {
    web_sys::window().ok_or_else(|| BackendError::InitializationFailed("No global window exists".into()))
}

fn document() -> BackendResult<web_sys::Document> {
    browser_window()?
        .document()
        .ok_or_else(|| BackendError::InitializationFailed("No document exists".into()))
}

/// CSS size of the browser viewport, at least 100x100
pub fn get_window_size() -> (u32, u32) {
    let Ok(window) = browser_window() else {
        return (100, 100);
    };
    let dimension = |value: Result<JsValue, JsValue>| value.ok().and_then(|v| v.as_f64()).unwrap_or(0.0) as u32;
    let width = dimension(window.inner_width());
    let height = dimension(window.inner_height());
    (width.max(100), height.max(100))
}

/// Ratio between physical and CSS pixels
pub fn device_pixel_ratio() -> f64 {
    browser_window().map(|w| w.device_pixel_ratio()).unwrap_or(1.0)
}

/// Find a `<canvas>` element by id
pub fn find_canvas(canvas_id: &str) -> BackendResult<web_sys::HtmlCanvasElement> {
    document()?
        .get_element_by_id(canvas_id)
        .ok_or_else(|| BackendError::SurfaceCreationFailed(format!("No element with id '{}'", canvas_id)))?
        .dyn_into::<web_sys::HtmlCanvasElement>()
        .map_err(|_| BackendError::SurfaceCreationFailed(format!("Element '{}' is not a canvas", canvas_id)))
}

/// Size a canvas to fill the viewport at the device pixel ratio
///
/// Returns the physical size the backend should render at.
pub fn fit_canvas(canvas: &web_sys::HtmlCanvasElement) -> BackendResult<(u32, u32)> {
    let (css_width, css_height) = get_window_size();
    let dpr = device_pixel_ratio();
    let width = (css_width as f64 * dpr) as u32;
    let height = (css_height as f64 * dpr) as u32;
    canvas.set_width(width);
    canvas.set_height(height);

    let style = canvas.style();
    let set = |name: &str, value: &str| {
        style
            .set_property(name, value)
            .map_err(|_| BackendError::SurfaceCreationFailed(format!("Cannot set canvas style '{}'", name)))
    };
    set("width", &format!("{}px", css_width))?;
    set("height", &format!("{}px", css_height))?;
    set("display", "block")?;

    log::info!("Canvas sized {}x{} (CSS {}x{}, DPR {})", width, height, css_width, css_height, dpr);
    Ok((width, height))
}

/// Create a winit window bound to an existing canvas
pub fn create_canvas_window(event_loop: &EventLoop<()>, canvas_id: &str) -> BackendResult<Window> {
    let canvas = find_canvas(canvas_id)?;
    let (width, height) = fit_canvas(&canvas)?;

    WindowBuilder::new()
        .with_canvas(Some(canvas))
        .with_inner_size(PhysicalSize::new(width, height))
        .build(event_loop)
        .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))
}

/// Create a winit window with its own canvas, appended to `container_id` or the body
pub fn create_web_window(event_loop: &EventLoop<()>, title: &str, container_id: &str) -> BackendResult<Window> {
    let (width, height) = get_window_size();
    let window = WindowBuilder::new()
        .with_title(title)
        .with_inner_size(PhysicalSize::new(width, height))
        .build(event_loop)
        .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

    let canvas = window
        .canvas()
        .ok_or_else(|| BackendError::SurfaceCreationFailed("Window has no canvas".into()))?;
    let document = document()?;
    let container: web_sys::Element = match document.get_element_by_id(container_id) {
        Some(element) => element,
        None => document
            .body()
            .ok_or_else(|| BackendError::InitializationFailed("Document has no body".into()))?
            .into(),
    };
    container
        .append_child(&canvas)
        .map_err(|_| BackendError::SurfaceCreationFailed("Couldn't append canvas to container".into()))?;
    fit_canvas(&canvas)?;

    Ok(window)
}

/// Spawn a future on the browser's event loop
pub fn spawn_local<F>(future: F)
where
    F: std::future::Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Log a message to the browser console
#[wasm_bindgen]
pub fn console_log(msg: &str) {
    web_sys::console::log_1(&msg.into());
}

/// Log an error to the browser console
#[wasm_bindgen]
pub fn console_error(msg: &str) {
    web_sys::console::error_1(&msg.into());
}
