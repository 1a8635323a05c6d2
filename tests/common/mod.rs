//! Common utilities for renderer integration tests.
//!
//! Every test renders through [`RecordingBackend`], so no GPU is needed; the
//! recorded command stream is what the assertions inspect.

use std::sync::Arc;

use cge_renderer::resources::primitives;
use cge_renderer::{
    Assets, GeometryId, MaterialId, Node, RecordingBackend, RenderContext, Renderer, RendererConfig, Scene,
    ShaderLibrary,
};
use cge_renderer::resources::Material;
use glam::Vec4;

/// Surface size every test renderer starts with.
pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 32;

/// A renderer together with the assets it was initialized against.
pub struct TestContext {
    pub renderer: Renderer<RecordingBackend>,
    pub assets: Assets,
}

impl TestContext {
    /// Create and initialize a renderer with the default configuration.
    pub fn new(context: &RenderContext) -> Self {
        Self::with_config(context, RendererConfig::default())
    }

    pub fn with_config(context: &RenderContext, config: RendererConfig) -> Self {
        let mut assets = Assets::new();
        let mut renderer = create_renderer(context, config);
        renderer
            .init(&mut assets, WIDTH, HEIGHT)
            .expect("Renderer should initialize");
        Self { renderer, assets }
    }

    pub fn backend(&self) -> &RecordingBackend {
        self.renderer.backend()
    }

    pub fn backend_mut(&mut self) -> &mut RecordingBackend {
        self.renderer.backend_mut()
    }

    /// Unit quad drawn with the unlit `color` technique.
    pub fn unlit_quad(&mut self) -> (GeometryId, MaterialId) {
        let geometry = self.assets.add_geometry(primitives::quad().expect("Quad should build"));
        let material = self.assets.add_material(Material::unlit(Vec4::ONE));
        (geometry, material)
    }

    /// Unit cube drawn with the `standard` technique.
    pub fn standard_cube(&mut self) -> (GeometryId, MaterialId) {
        let geometry = self.assets.add_geometry(primitives::cube().expect("Cube should build"));
        let material = self.assets.add_material(Material::default());
        (geometry, material)
    }
}

/// Create a renderer on a fresh recording backend, without initializing it.
pub fn create_renderer(context: &RenderContext, config: RendererConfig) -> Renderer<RecordingBackend> {
    Renderer::new(
        context,
        RecordingBackend::new(WIDTH, HEIGHT),
        Arc::new(ShaderLibrary::standard()),
        config,
    )
}

/// Scene with one root node per renderable, in the given order.
pub fn scene_of(renderables: &[(&str, GeometryId, MaterialId)]) -> Scene {
    let mut scene = Scene::new();
    for (name, geometry, material) in renderables {
        scene.add_node(None, Node::new(name).with_renderable(*geometry, *material));
    }
    scene
}

/// Pass labels with the target suffix removed, e.g. `Forward (main)` becomes `Forward`.
pub fn pass_names(backend: &RecordingBackend) -> Vec<String> {
    backend
        .pass_labels()
        .into_iter()
        .map(|label| match label.split_once(" (") {
            Some((name, _)) => name.to_string(),
            None => label,
        })
        .collect()
}

/// Target suffix of each pass label, e.g. `main` for `Forward (main)`.
pub fn pass_targets(backend: &RecordingBackend) -> Vec<String> {
    backend
        .pass_labels()
        .into_iter()
        .filter_map(|label| {
            let (_, target) = label.split_once(" (")?;
            Some(target.trim_end_matches(')').to_string())
        })
        .collect()
}
