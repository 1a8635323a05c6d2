//! Scene renderer
//!
//! A [`Renderer`] turns a [`Scene`] into backend commands once per call to
//! [`Renderer::render_scene`]. Every frame runs the same stages in order:
//!
//! 1. Shadow pre-pass for each light with an enabled shadow source
//! 2. Main pass into the G-buffer, an intermediate frame or the target
//! 3. Post-effect chain, the last stage writing to the target
//!
//! GPU state is derived lazily from the CPU-side resources in [`Assets`] and
//! cached by their version. Failures are contained to the node that caused
//! them: the draw is skipped, the error logged once, and the frame goes on.

mod clock;
mod config;
mod context;
mod encoder;
mod framebuffer;
mod gpu;
mod uniforms;

pub use config::*;
pub use context::RenderContext;
pub use uniforms::{MainLight, ObjectUniform, PostUniform, ShadowUniform, ViewUniform};

pub(crate) use encoder::{DrawItem, FrameEncoder, FrameSnapshot, PassState, ShadowMap};
pub(crate) use framebuffer::TargetInfo;

use crate::backend::traits::*;
use crate::backend::types::TextureFormat;
use crate::pipeline::postprocess::{self, ChainInputs, GBufferTextures, PostEffect, ScratchTargets, LUMINANCE_SIZE};
use crate::pipeline::{scene_pass, shadow_pass};
use crate::resources::*;
use crate::scene::{Camera, Scene, ShadowSource};
use crate::shader::{ComposeError, ComposedProgram, ProgramKey, ShaderLibrary};
use clock::FrameClock;
use context::Registration;
use gpu::GpuResources;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Renderer error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Renderer exceeds the instance limit and cannot render")]
    Unusable,
    #[error("Renderer is not initialized")]
    NotInitialized,
    #[error("Missing asset: {0}")]
    MissingAsset(String),
    #[error("Geometry '{0}' has no draw parameter")]
    NoDrawParameter(String),
    #[error("Technique '{0}' has no deferred variant")]
    ForwardOnly(String),
    #[error("Draw mode {0:?} has no GPU topology")]
    UnsupportedDrawMode(DrawMode),
    #[error("Attribute {0:?} has no GPU vertex format")]
    UnsupportedVertexFormat(Semantic),
    #[error("Geometry '{geometry}' lacks shader inputs {missing:?}")]
    MissingInputs { geometry: String, missing: Vec<Semantic> },
    #[error("Geometry '{geometry}' draws up to element {end} but holds {available}")]
    DrawOutOfRange {
        geometry: String,
        end: u64,
        available: u64,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
}

/// Where a frame is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderTarget {
    /// The backend's swapchain image
    #[default]
    Backbuffer,
    Frame(FrameId),
}

/// Counters of one rendered frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Draw calls of the main pass
    pub draw_calls: u32,
    pub primitives: u64,
    /// Draws skipped in any pass
    pub skipped: u32,
    pub shadow_passes: u32,
    pub shadow_draw_calls: u32,
    pub post_passes: u32,
}

/// Logs each distinct message once
#[derive(Debug, Default)]
pub(crate) struct ErrorLog {
    reported: HashSet<String>,
}

impl ErrorLog {
    pub(crate) fn report(&mut self, message: String) {
        if !self.reported.contains(&message) {
            log::error!("{}", message);
            self.reported.insert(message);
        }
    }

    pub(crate) fn warn_once(&mut self, message: String) {
        if !self.reported.contains(&message) {
            log::warn!("{}", message);
            self.reported.insert(message);
        }
    }
}

/// Frames and textures owned by the renderer
#[derive(Debug, Clone, Copy)]
struct RendererTargets {
    /// Format of the scene color and every post image
    hdr_format: TextureFormat,
    gbuffer: FrameId,
    gbuffer_textures: GBufferTextures,
    main: FrameId,
    main_color: TextureId,
    ping: (FrameId, TextureId),
    pong: (FrameId, TextureId),
    scratch: ScratchTargets,
    /// Depth and clear state of the backbuffer
    backbuffer: FrameId,
}

impl RendererTargets {
    fn create(assets: &mut Assets, width: u32, height: u32, clear_color: [f32; 4], hdr_format: TextureFormat) -> Self {
        let depth = |assets: &mut Assets, name: &str| {
            assets.add_texture(Texture::new_2d(name, width, height, TextureFormat::Depth24PlusStencil8))
        };
        // Frame with a single color attachment
        let color_frame = |assets: &mut Assets, name: &str, (w, h): (u32, u32)| {
            let texture = assets.add_texture(Texture::new_2d(name, w, h, hdr_format));
            let mut frame = Frame::new(name, w, h);
            frame.set_texture(AttachmentSlot::Color(0), texture);
            (assets.add_frame(frame), texture)
        };

        // G-buffer channels hold encoded values in [0, 1]
        let gbuffer_color = |assets: &mut Assets, name: &str| {
            assets.add_texture(Texture::new_2d(name, width, height, TextureFormat::Rgba8Unorm))
        };
        let gbuffer_textures = GBufferTextures {
            albedo: gbuffer_color(assets, "gbuffer_albedo"),
            normal: gbuffer_color(assets, "gbuffer_normal"),
            depth: gbuffer_color(assets, "gbuffer_depth"),
        };
        let mut gbuffer = Frame::new("gbuffer", width, height);
        gbuffer.set_texture(AttachmentSlot::Color(0), gbuffer_textures.albedo);
        gbuffer.set_texture(AttachmentSlot::Color(1), gbuffer_textures.normal);
        gbuffer.set_texture(AttachmentSlot::Color(2), gbuffer_textures.depth);
        gbuffer.set_texture(AttachmentSlot::DepthStencil, depth(assets, "gbuffer_depth_stencil"));
        // Encoded depth of 1 marks background
        gbuffer.set_clear_color([1.0, 1.0, 1.0, 1.0]);

        let main_color = assets.add_texture(Texture::new_2d("main_color", width, height, hdr_format));
        let mut main = Frame::new("main", width, height);
        main.set_texture(AttachmentSlot::Color(0), main_color);
        main.set_texture(AttachmentSlot::DepthStencil, depth(assets, "main_depth"));
        main.set_clear_color(clear_color);

        let full = (width, height);
        let ping = color_frame(assets, "post_ping", full);
        let pong = color_frame(assets, "post_pong", full);
        let scratch = ScratchTargets {
            bloom_ping: color_frame(assets, "bloom_ping", bloom_size(width, height)),
            bloom_pong: color_frame(assets, "bloom_pong", bloom_size(width, height)),
            luminance: color_frame(assets, "luminance", (LUMINANCE_SIZE, LUMINANCE_SIZE)),
            average_luminance: color_frame(assets, "average_luminance", (1, 1)),
        };

        let mut backbuffer = Frame::new("backbuffer", width, height);
        backbuffer.set_texture(AttachmentSlot::DepthStencil, depth(assets, "backbuffer_depth"));
        backbuffer.set_clear_color(clear_color);

        Self {
            hdr_format,
            gbuffer: assets.add_frame(gbuffer),
            gbuffer_textures,
            main: assets.add_frame(main),
            main_color,
            ping,
            pong,
            scratch,
            backbuffer: assets.add_frame(backbuffer),
        }
    }

    /// Frames that follow the surface size
    fn full_size_frames(&self) -> [FrameId; 5] {
        [self.gbuffer, self.main, self.ping.0, self.pong.0, self.backbuffer]
    }

    /// Frames at a quarter of the surface size
    fn bloom_frames(&self) -> [FrameId; 2] {
        [self.scratch.bloom_ping.0, self.scratch.bloom_pong.0]
    }
}

/// Bloom blurs at a quarter of the surface size
fn bloom_size(width: u32, height: u32) -> (u32, u32) {
    ((width / 4).max(1), (height / 4).max(1))
}

/// Renders scenes through a graphics backend
pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    library: Arc<ShaderLibrary>,
    config: RendererConfig,
    registration: Registration,
    gpu: GpuResources,
    targets: Option<RendererTargets>,
    post_effects: BTreeSet<PostEffect>,
    default_camera: Camera,
    clock: FrameClock,
    errors: ErrorLog,
    width: u32,
    height: u32,
}

impl<B: GraphicsBackend> Renderer<B> {
    /// Create a renderer registered in `context`
    ///
    /// A renderer beyond [`RenderContext::MAX_RENDERERS`] is still created
    /// but reports itself unusable and refuses to render.
    pub fn new(context: &RenderContext, backend: B, library: Arc<ShaderLibrary>, config: RendererConfig) -> Self {
        let registration = context.register();
        let (width, height) = backend.surface_size();
        if registration.usable {
            log::info!("Created renderer {}", registration.id);
        }

        Self {
            backend,
            library,
            registration,
            gpu: GpuResources::new(),
            targets: None,
            post_effects: config.post_effects.iter().copied().collect(),
            default_camera: config.default_camera.clone(),
            clock: FrameClock::default(),
            errors: ErrorLog::default(),
            width,
            height,
            config,
        }
    }

    /// Create shared GPU state and the renderer-owned frames in `assets`
    pub fn init(&mut self, assets: &mut Assets, width: u32, height: u32) -> Result<(), RenderError> {
        if !self.registration.usable {
            return Err(RenderError::Unusable);
        }
        self.gpu.init(&mut self.backend)?;
        if self.targets.is_none() {
            let (w, h) = (width.max(1), height.max(1));
            let hdr_format = if self.backend.supports_render_format(TextureFormat::Rgba16Float) {
                TextureFormat::Rgba16Float
            } else {
                log::warn!("Float render targets unsupported, post effects run in Rgba8Unorm");
                TextureFormat::Rgba8Unorm
            };
            self.targets = Some(RendererTargets::create(assets, w, h, self.config.clear_color, hdr_format));
        }
        self.set_size(assets, width, height);
        log::info!(
            "Renderer {} initialized at {}x{}",
            self.registration.id,
            self.width,
            self.height
        );
        Ok(())
    }

    /// Resize the backbuffer and every renderer-owned frame
    pub fn set_size(&mut self, assets: &mut Assets, width: u32, height: u32) {
        self.backend.resize(width.max(1), height.max(1));
        // The backend may clamp to device limits
        let (width, height) = self.backend.surface_size();
        self.width = width;
        self.height = height;

        if let Some(targets) = &self.targets {
            let (bloom_width, bloom_height) = bloom_size(width, height);
            let resizes = targets
                .full_size_frames()
                .map(|frame| (frame, width, height))
                .into_iter()
                .chain(targets.bloom_frames().map(|frame| (frame, bloom_width, bloom_height)));
            for (frame, w, h) in resizes {
                if assets.frame(frame).is_some_and(|f| f.size() != (w, h)) {
                    assets.resize_frame(frame, w, h);
                }
            }
        }
        self.default_camera.set_aspect(width as f32, height.max(1) as f32);
    }

    /// Render `scene` to the backbuffer
    ///
    /// The camera is `camera`, else the scene's active camera, else the
    /// renderer's default camera.
    pub fn render_scene(&mut self, assets: &Assets, scene: &Scene, camera: Option<&Camera>) -> Result<FrameStats, RenderError> {
        self.render_scene_to(assets, scene, camera, RenderTarget::Backbuffer)
    }

    /// Render `scene` into `target`
    pub fn render_scene_to(
        &mut self,
        assets: &Assets,
        scene: &Scene,
        camera: Option<&Camera>,
        target: RenderTarget,
    ) -> Result<FrameStats, RenderError> {
        if !self.registration.usable {
            return Err(RenderError::Unusable);
        }
        let targets = self.targets.ok_or(RenderError::NotInitialized)?;
        if !self.gpu.is_initialized() {
            return Err(RenderError::NotInitialized);
        }

        self.clock.tick();
        let swapchain = self.backend.begin_frame()?;
        self.gpu.begin_frame(swapchain);

        let camera = camera.or_else(|| scene.active_camera()).unwrap_or(&self.default_camera);
        let snapshot = FrameSnapshot::collect(scene);
        let mut encoder = FrameEncoder {
            backend: &mut self.backend,
            gpu: &mut self.gpu,
            library: self.library.as_ref(),
            assets,
            config: &self.config,
            errors: &mut self.errors,
            backbuffer_depth: Some(targets.backbuffer),
            stats: FrameStats::default(),
        };
        let result = encode_frame(&mut encoder, &snapshot, camera, &self.post_effects, &targets, target);
        let stats = encoder.stats;

        self.gpu.end_frame();
        self.backend.end_frame()?;
        result.map(|()| stats)
    }

    pub fn enable_post_effect(&mut self, effect: PostEffect) {
        if self.post_effects.insert(effect) {
            log::debug!("Enabled post effect {}", effect.name());
        }
    }

    pub fn disable_post_effect(&mut self, effect: PostEffect) {
        if self.post_effects.remove(&effect) {
            log::debug!("Disabled post effect {}", effect.name());
        }
    }

    /// Enabled effects in the order they run
    pub fn enabled_post_effects(&self) -> Vec<PostEffect> {
        self.post_effects.iter().copied().collect()
    }

    /// G-buffer frame written by the main pass when deferred shading is enabled
    pub fn gbuffer_frame(&self) -> Option<FrameId> {
        self.targets.map(|t| t.gbuffer)
    }

    /// Format of the scene color and post images, chosen at init
    pub fn hdr_format(&self) -> Option<TextureFormat> {
        self.targets.map(|t| t.hdr_format)
    }

    /// Frame the forward main pass renders into when post effects are enabled
    pub fn main_frame(&self) -> Option<FrameId> {
        self.targets.map(|t| t.main)
    }

    /// Build (or fetch the cached) program for `key`
    ///
    /// Composition failures surface here and are cached; the technique stays
    /// unusable for every later draw.
    pub fn build_program(&mut self, key: &ProgramKey) -> Result<ComposedProgram, RenderError> {
        self.gpu.program(&self.library, key)
    }

    /// Create a shadow source sized per the renderer's configuration
    pub fn new_shadow_source(&self, assets: &mut Assets) -> ShadowSource {
        ShadowSource::new(assets, self.config.shadow_map_size)
    }

    /// Version of `frame` last materialized on the GPU
    pub fn frame_synced_version(&self, frame: FrameId) -> Option<u64> {
        self.gpu.synced_version(frame)
    }

    /// Materialize `frame` now instead of at its next use
    pub fn materialize_frame(&mut self, assets: &Assets, frame: FrameId) -> Result<(), RenderError> {
        self.gpu
            .materialize(&mut self.backend, assets, frame, self.config.max_frame_attachments)
    }

    /// Upload every buffer of a geometry now instead of at its first draw
    ///
    /// Buffers already current are left alone; a later draw reuses them.
    pub fn retain_geometry(&mut self, assets: &Assets, id: GeometryId) -> Result<(), RenderError> {
        if !self.registration.usable {
            return Err(RenderError::Unusable);
        }
        let geometry = assets
            .geometry(id)
            .ok_or_else(|| RenderError::MissingAsset(format!("geometry {:?}", id)))?;
        for (index, buffer) in geometry.buffers().iter().enumerate() {
            self.gpu.vertex_buffer(&mut self.backend, id, index, buffer)?;
        }
        if let Some(index) = geometry.index_buffer() {
            self.gpu.index_buffer(&mut self.backend, id, index)?;
        }
        log::debug!("Retained geometry '{}'", geometry.name());
        Ok(())
    }

    /// Upload a texture now instead of at its first use
    pub fn retain_texture(&mut self, assets: &Assets, id: TextureId) -> Result<(), RenderError> {
        if !self.registration.usable {
            return Err(RenderError::Unusable);
        }
        self.gpu.texture(&mut self.backend, assets, id).map(|_| ())
    }

    pub fn release_geometry(&mut self, id: GeometryId) {
        self.gpu.release_geometry(&mut self.backend, id);
    }

    pub fn release_texture(&mut self, id: TextureId) {
        self.gpu.release_texture(&mut self.backend, id);
    }

    pub fn release_frame(&mut self, id: FrameId) {
        self.gpu.release_frame(id);
    }

    pub fn release_material(&mut self, id: MaterialId) {
        self.gpu.release_material(&mut self.backend, id);
    }

    /// Release every cached GPU object; `init` must run again before rendering
    pub fn release_all(&mut self) {
        self.gpu.release_all(&mut self.backend);
        self.gpu = GpuResources::new();
    }

    pub fn renderer_id(&self) -> u32 {
        self.registration.id
    }

    pub fn is_usable(&self) -> bool {
        self.registration.usable
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Seconds between the last two rendered frames
    pub fn delta_time(&self) -> f32 {
        self.clock.delta()
    }

    pub fn default_camera(&self) -> &Camera {
        &self.default_camera
    }

    pub fn default_camera_mut(&mut self) -> &mut Camera {
        &mut self.default_camera
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

/// All stages of one frame, in order
fn encode_frame<B: GraphicsBackend>(
    encoder: &mut FrameEncoder<B>,
    snapshot: &FrameSnapshot,
    camera: &Camera,
    effects: &BTreeSet<PostEffect>,
    targets: &RendererTargets,
    target: RenderTarget,
) -> Result<(), RenderError> {
    let view = ViewUniform::from_camera(camera, &snapshot.main_light(), snapshot.ambient);

    let shadow = shadow_pass::render_shadows(encoder, snapshot);

    let deferred = effects.contains(&PostEffect::DeferredShading);
    let main_target = if deferred {
        RenderTarget::Frame(targets.gbuffer)
    } else if effects.is_empty() {
        target
    } else {
        RenderTarget::Frame(targets.main)
    };
    let scene_rendered = match scene_pass::render_scene_pass(encoder, snapshot, &view, shadow.as_ref(), main_target, deferred) {
        Ok(()) => true,
        Err(e) if main_target == RenderTarget::Backbuffer => return Err(e),
        Err(e) => {
            encoder.errors.report(format!("Scene pass failed: {}", e));
            false
        }
    };

    if effects.is_empty() {
        return Ok(());
    }
    let inputs = ChainInputs {
        color: (scene_rendered && !deferred).then_some(targets.main_color),
        gbuffer: (scene_rendered && deferred).then_some(targets.gbuffer_textures),
        ping: targets.ping,
        pong: targets.pong,
        scratch: targets.scratch,
    };
    postprocess::run_chain(encoder, effects, &inputs, &view, target)
}
