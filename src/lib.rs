//! cge-renderer - real-time 3D rendering core for the browser and native hosts
//!
//! The renderer draws a scene graph of geometry, materials and lights through
//! a small GPU abstraction:
//! - **wgpu**: WebGL2 (falling back to WebGPU) in the browser, every native API elsewhere
//! - **Recording**: GPU-free backend that records commands, used by the tests
//!
//! # Features
//! - Version-keyed caching of GPU buffers, textures, programs and framebuffers
//! - Shader library with `#include` composition and `#ifdef` variants
//! - Forward and deferred (G-buffer) scene passes
//! - Shadow maps for directional and spot lights
//! - Post-processing chain: deferred shading, SSAO, bloom, tone mapping, FXAA
//! - Up to [`RenderContext::MAX_RENDERERS`] renderers sharing one context

pub mod backend;
pub mod cache;
pub mod pipeline;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod shader;

// Web-specific modules
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use backend::wgpu_backend::WgpuBackend;
pub use backend::{BackendError, BackendResult, GraphicsBackend, RecordingBackend};
pub use pipeline::{PostEffect, TonemapOperator};
pub use renderer::{
    FrameStats, PostEffectSettings, RenderContext, RenderError, RenderTarget, Renderer, RendererConfig,
};
pub use resources::{Assets, FrameId, GeometryId, MaterialId, TextureId};
pub use scene::{Camera, Light, Node, NodeId, Scene};
pub use shader::{ComposeError, ShaderLibrary, VariantFlags};

/// Initialize native logging through `env_logger`
///
/// Honours `RUST_LOG` and defaults to `info`. Calling it again is a no-op.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}

/// Route panics and `log` output to the browser console
#[cfg(target_arch = "wasm32")]
pub fn init_web_logging() {
    console_error_panic_hook::set_once();
    // Fails only when a logger is already installed
    if console_log::init_with_level(log::Level::Info).is_err() {
        log::debug!("Logger already initialized");
    }
}
