//! Renderer integration tests.
//!
//! These tests drive whole frames through the public API and verify the
//! command stream recorded by [`RecordingBackend`].
//!
//! # Test Categories
//!
//! - **Draw Tests**: Geometry reaches the backend with the right ranges
//! - **Instance Tests**: The per-context renderer limit
//! - **Frame Tests**: Offscreen targets, versions and attachment limits
//! - **Failure Tests**: A broken node is skipped and the frame goes on
//! - **Pass Order Tests**: Shadow, scene and post passes run in order

mod common;

use rstest::{fixture, rstest};

use cge_renderer::backend::recording::Command;
use cge_renderer::resources::{
    AttachmentSlot, BufferData, DrawMode, Frame, Geometry, GeometryError, Material, Semantic, Texture, Usage,
    MAX_SHORT_INDEX_COUNT,
};
use cge_renderer::backend::TextureFormat;
use cge_renderer::scene::{DirectionalLight, Light, PointLight, SpotLight};
use cge_renderer::{Node, PostEffect, RenderContext, RenderError, RenderTarget, RendererConfig, Scene};
use common::{create_renderer, pass_names, pass_targets, scene_of, TestContext};
use glam::{Vec3, Vec4};

#[fixture]
fn context() -> RenderContext {
    RenderContext::new()
}

// ============================================================================
// Draw Tests
// ============================================================================

/// The unit quad draws six indices as two triangles.
#[rstest]
fn test_quad_draws_two_triangles(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let (geometry, material) = ctx.unlit_quad();
    let scene = scene_of(&[("quad", geometry, material)]);

    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.primitives, 2);
    assert_eq!(stats.skipped, 0);

    let draws = ctx.backend().draws();
    assert_eq!(draws.len(), 1);
    assert!(draws[0].indexed);
    assert_eq!(draws[0].range, 0..6);
    assert!(draws[0].pipeline.is_some());
    assert_eq!(ctx.backend().frames_presented(), 1);
}

/// An empty scene still clears and presents the backbuffer.
#[rstest]
fn test_empty_scene_is_presented(context: RenderContext) {
    let mut ctx = TestContext::new(&context);

    let stats = ctx.renderer.render_scene(&ctx.assets, &Scene::new(), None).unwrap();

    assert_eq!(stats.draw_calls, 0);
    assert_eq!(pass_names(ctx.backend()), ["Forward"]);
    assert_eq!(pass_targets(ctx.backend()), ["backbuffer"]);
    assert_eq!(ctx.backend().frames_presented(), 1);
}

/// GPU buffers are created once and reused while the geometry is unchanged.
#[rstest]
fn test_buffers_are_cached_across_frames(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let (geometry, material) = ctx.unlit_quad();
    let scene = scene_of(&[("quad", geometry, material)]);

    for _ in 0..3 {
        ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();
    }

    assert_eq!(ctx.backend().buffers_labelled("quad:position"), 1);
    assert_eq!(ctx.backend().buffers_labelled("quad:index"), 1);
    assert_eq!(ctx.backend().frames_presented(), 3);
}

/// A retained geometry draws from the buffers uploaded ahead of time.
#[rstest]
fn test_retained_geometry_is_not_uploaded_at_draw(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let (geometry, material) = ctx.unlit_quad();
    let scene = scene_of(&[("quad", geometry, material)]);

    ctx.renderer.retain_geometry(&ctx.assets, geometry).unwrap();
    assert_eq!(ctx.backend().buffers_labelled("quad:position"), 1);
    assert_eq!(ctx.backend().buffers_labelled("quad:index"), 1);

    // Creating any quad buffer from here on fails the draw
    ctx.backend_mut().fail_on_label("quad:");
    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.skipped, 0);
    assert_eq!(ctx.backend().buffers_labelled("quad:position"), 1);
}

/// Only the attributes the technique reads are uploaded.
#[rstest]
fn test_unread_attributes_are_not_uploaded(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let (geometry, material) = ctx.unlit_quad();
    let scene = scene_of(&[("quad", geometry, material)]);

    ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(ctx.backend().buffers_labelled("quad:texcoord"), 0);
}

/// A dynamic buffer of unchanged size is rewritten in place.
#[rstest]
fn test_dynamic_update_writes_in_place(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let mut geometry = Geometry::new("strip");
    let positions = geometry
        .add_single_attribute(
            "strip:position",
            Semantic::Position,
            3,
            BufferData::F32(vec![0.0; 9]),
            Usage::Dynamic,
        )
        .unwrap();
    geometry.set_draw_parameter(3, DrawMode::Triangles, 0).unwrap();
    let geometry = ctx.assets.add_geometry(geometry);
    let material = ctx.assets.add_material(Material::unlit(Vec4::ONE));
    let scene = scene_of(&[("strip", geometry, material)]);

    ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();
    ctx.backend_mut().clear_commands();

    ctx.assets
        .geometry_mut(geometry)
        .unwrap()
        .update_buffer_data(positions, BufferData::F32(vec![1.0; 9]))
        .unwrap();
    ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(ctx.backend().buffers_labelled("strip:position"), 1);
    assert!(ctx
        .backend()
        .commands()
        .iter()
        .any(|c| matches!(c, Command::WriteBuffer { size: 36, .. })));
    let draws = ctx.backend().draws();
    assert_eq!(draws.len(), 1);
    assert!(!draws[0].indexed);
    assert_eq!(draws[0].range, 0..3);
}

/// 32-bit indices may exceed the 16-bit ceiling and draw in full.
#[rstest]
fn test_wide_indices_exceed_short_ceiling(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let count = MAX_SHORT_INDEX_COUNT as u32 + 1;
    let mut geometry = Geometry::new("wide");
    geometry
        .add_single_attribute(
            "wide:position",
            Semantic::Position,
            3,
            BufferData::F32(vec![0.0; 9]),
            Usage::Static,
        )
        .unwrap();
    geometry
        .set_index_data(BufferData::U32((0..count).map(|i| i % 3).collect()), Usage::Static)
        .unwrap();
    geometry.set_draw_parameter(count, DrawMode::Points, 0).unwrap();
    let geometry = ctx.assets.add_geometry(geometry);
    let material = ctx.assets.add_material(Material::unlit(Vec4::ONE));
    let scene = scene_of(&[("wide", geometry, material)]);

    ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    let draws = ctx.backend().draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].range, 0..count);
}

/// Short indices over the ceiling leave the geometry undrawable, not the frame.
#[rstest]
#[case::u16_indices(BufferData::U16(vec![0; MAX_SHORT_INDEX_COUNT + 1]))]
#[case::u8_indices(BufferData::U8(vec![0; MAX_SHORT_INDEX_COUNT + 1]))]
fn test_short_index_ceiling_skips_geometry(context: RenderContext, #[case] indices: BufferData) {
    let mut ctx = TestContext::new(&context);
    let mut geometry = Geometry::new("huge");
    geometry
        .add_single_attribute(
            "huge:position",
            Semantic::Position,
            3,
            BufferData::F32(vec![0.0; 9]),
            Usage::Static,
        )
        .unwrap();
    geometry.set_draw_parameter(3, DrawMode::Triangles, 0).unwrap();

    let result = geometry.set_index_data(indices, Usage::Static);
    assert_eq!(result, Err(GeometryError::IndexCeiling(MAX_SHORT_INDEX_COUNT + 1)));
    assert!(geometry.index_buffer().is_none());
    assert!(geometry.draw_parameter().is_none());

    let geometry = ctx.assets.add_geometry(geometry);
    let material = ctx.assets.add_material(Material::unlit(Vec4::ONE));
    let scene = scene_of(&[("huge", geometry, material)]);
    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.draw_calls, 0);
    assert_eq!(stats.skipped, 1);
    assert!(ctx.backend().draws().is_empty());
    assert_eq!(ctx.backend().frames_presented(), 1);
}

/// Modes without a GPU topology are skipped.
#[rstest]
#[case::line_loop(DrawMode::LineLoop)]
#[case::triangle_fan(DrawMode::TriangleFan)]
fn test_unsupported_draw_modes_are_skipped(context: RenderContext, #[case] mode: DrawMode) {
    let mut ctx = TestContext::new(&context);
    let (geometry, material) = ctx.unlit_quad();
    ctx.assets
        .geometry_mut(geometry)
        .unwrap()
        .set_draw_parameter(6, mode, 0)
        .unwrap();
    let scene = scene_of(&[("quad", geometry, material)]);

    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.skipped, 1);
    assert!(ctx.backend().draws().is_empty());
}

/// Invisible nodes hide their whole subtree.
#[rstest]
fn test_invisible_subtree_is_not_drawn(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let (geometry, material) = ctx.unlit_quad();
    let mut scene = Scene::new();
    let parent = scene.add_node(None, Node::new("parent").with_renderable(geometry, material));
    scene.add_node(Some(parent), Node::new("child").with_renderable(geometry, material));
    scene.add_node(None, Node::new("sibling").with_renderable(geometry, material));
    scene.node_mut(parent).unwrap().visible = false;

    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.draw_calls, 1);
}

// ============================================================================
// Instance Tests
// ============================================================================

/// A renderer beyond the per-context limit exists but cannot render.
#[rstest]
fn test_renderer_over_limit_is_unusable(context: RenderContext) {
    let renderers: Vec<_> = (0..RenderContext::MAX_RENDERERS)
        .map(|_| create_renderer(&context, RendererConfig::default()))
        .collect();
    assert!(renderers.iter().all(|r| r.is_usable()));

    let mut extra = create_renderer(&context, RendererConfig::default());
    let mut assets = cge_renderer::Assets::new();
    assert!(!extra.is_usable());
    assert_eq!(extra.init(&mut assets, 64, 32), Err(RenderError::Unusable));
    assert_eq!(
        extra.render_scene(&assets, &Scene::new(), None),
        Err(RenderError::Unusable)
    );
    assert_eq!(extra.backend().frames_presented(), 0);
    assert_eq!(context.live_renderers(), RenderContext::MAX_RENDERERS);
}

/// Dropping a renderer frees its slot for the next one.
#[rstest]
fn test_dropped_renderer_frees_slot(context: RenderContext) {
    let mut renderers: Vec<_> = (0..RenderContext::MAX_RENDERERS)
        .map(|_| create_renderer(&context, RendererConfig::default()))
        .collect();
    renderers.pop();

    let next = create_renderer(&context, RendererConfig::default());
    assert!(next.is_usable());
    assert_ne!(next.renderer_id(), renderers[0].renderer_id());
}

// ============================================================================
// Frame Tests
// ============================================================================

fn offscreen_frame(ctx: &mut TestContext, name: &str) -> cge_renderer::FrameId {
    let color = ctx
        .assets
        .add_texture(Texture::new_2d(name, 32, 32, TextureFormat::Rgba8Unorm));
    let mut frame = Frame::new(name, 32, 32);
    frame.set_texture(AttachmentSlot::Color(0), color);
    ctx.assets.add_frame(frame)
}

/// Rendering to a frame materializes it at its current version.
#[rstest]
fn test_frame_version_is_synced_on_use(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let frame = offscreen_frame(&mut ctx, "target");
    assert_eq!(ctx.renderer.frame_synced_version(frame), None);

    ctx.renderer
        .render_scene_to(&ctx.assets, &Scene::new(), None, RenderTarget::Frame(frame))
        .unwrap();
    let version = ctx.assets.frame(frame).unwrap().version();
    assert_eq!(ctx.renderer.frame_synced_version(frame), Some(version));

    let extra = ctx
        .assets
        .add_texture(Texture::new_2d("extra", 32, 32, TextureFormat::Rgba8Unorm));
    ctx.assets
        .frame_mut(frame)
        .unwrap()
        .set_texture(AttachmentSlot::Color(1), extra);
    // Changing attachments leaves the GPU copy stale until the next use
    assert_eq!(ctx.renderer.frame_synced_version(frame), Some(version));

    ctx.renderer
        .render_scene_to(&ctx.assets, &Scene::new(), None, RenderTarget::Frame(frame))
        .unwrap();
    assert_eq!(ctx.renderer.frame_synced_version(frame), Some(version + 1));
    let last = ctx.backend().passes().last().map(|p| p.color_attachments.len());
    assert_eq!(last, Some(2));
}

/// Offscreen rendering draws into the frame and still ends the backend frame.
#[rstest]
fn test_render_to_frame(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let frame = offscreen_frame(&mut ctx, "target");
    let (geometry, material) = ctx.unlit_quad();
    let scene = scene_of(&[("quad", geometry, material)]);

    let stats = ctx
        .renderer
        .render_scene_to(&ctx.assets, &scene, None, RenderTarget::Frame(frame))
        .unwrap();

    assert_eq!(stats.draw_calls, 1);
    assert_eq!(pass_targets(ctx.backend()), ["target"]);
    assert_eq!(ctx.backend().draws()[0].pass.as_deref(), Some("Forward (target)"));
    assert_eq!(ctx.backend().frames_presented(), 1);
}

/// Color attachments past the configured maximum are dropped; the rest render.
#[rstest]
fn test_attachment_beyond_limit_is_dropped(context: RenderContext) {
    let config = RendererConfig {
        max_frame_attachments: 2,
        ..Default::default()
    };
    let mut ctx = TestContext::with_config(&context, config);
    let frame = offscreen_frame(&mut ctx, "target");
    let far = ctx
        .assets
        .add_texture(Texture::new_2d("far", 32, 32, TextureFormat::Rgba8Unorm));
    ctx.assets
        .frame_mut(frame)
        .unwrap()
        .set_texture(AttachmentSlot::Color(5), far);
    let (geometry, material) = ctx.unlit_quad();
    let scene = scene_of(&[("quad", geometry, material)]);

    let stats = ctx
        .renderer
        .render_scene_to(&ctx.assets, &scene, None, RenderTarget::Frame(frame))
        .unwrap();

    assert_eq!(stats.draw_calls, 1);
    let passes = ctx.backend().passes();
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].color_attachments.len(), 1);
}

/// A frame can be materialized ahead of its first use.
#[rstest]
fn test_materialize_frame_ahead_of_use(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let frame = offscreen_frame(&mut ctx, "target");

    ctx.renderer.materialize_frame(&ctx.assets, frame).unwrap();

    let version = ctx.assets.frame(frame).unwrap().version();
    assert_eq!(ctx.renderer.frame_synced_version(frame), Some(version));
    assert!(ctx.backend().pass_labels().is_empty());
}

/// Resizing an attached texture makes the frame re-materialize at the new size.
#[rstest]
fn test_resized_attachment_rematerializes_frame(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let frame = offscreen_frame(&mut ctx, "target");
    ctx.renderer.materialize_frame(&ctx.assets, frame).unwrap();
    let before = ctx.assets.frame(frame).unwrap().version();
    let color = ctx
        .assets
        .frame(frame)
        .unwrap()
        .texture(AttachmentSlot::Color(0))
        .unwrap()
        .texture;

    assert!(ctx.assets.resize_texture(color, 48, 48));

    let after = ctx.assets.frame(frame).unwrap().version();
    assert!(after > before);
    ctx.renderer
        .render_scene_to(&ctx.assets, &Scene::new(), None, RenderTarget::Frame(frame))
        .unwrap();
    assert_eq!(ctx.renderer.frame_synced_version(frame), Some(after));
}

// ============================================================================
// Failure Tests
// ============================================================================

/// A node whose buffer cannot be created is skipped; later nodes still draw.
#[rstest]
fn test_failed_node_is_skipped(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let (quad, material) = ctx.unlit_quad();
    let cube = ctx
        .assets
        .add_geometry(cge_renderer::resources::primitives::cube().unwrap());
    let scene = scene_of(&[("broken", quad, material), ("fine", cube, material)]);
    ctx.backend_mut().fail_on_label("quad:position");

    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.skipped, 1);
    let draws = ctx.backend().draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].range, 0..36);
    assert_eq!(ctx.backend().frames_presented(), 1);

    // Buffer failures are retried on the next frame
    ctx.backend_mut().clear_failures();
    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();
    assert_eq!(stats.draw_calls, 2);
}

/// Geometry lacking an attribute the technique reads is skipped.
#[rstest]
fn test_missing_inputs_are_skipped(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let quad = ctx
        .assets
        .add_geometry(cge_renderer::resources::primitives::quad().unwrap());
    let standard = ctx.assets.add_material(Material::default());
    let scene = scene_of(&[("quad", quad, standard)]);

    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.draw_calls, 0);
    assert_eq!(stats.skipped, 1);
    assert_eq!(ctx.backend().frames_presented(), 1);
}

/// A material naming an unknown technique only loses its own draws.
#[rstest]
fn test_unknown_technique_is_skipped(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let (geometry, material) = ctx.unlit_quad();
    let bogus = ctx
        .assets
        .add_material(Material::new("bogus").with_technique("does_not_exist"));
    let scene = scene_of(&[("bogus", geometry, bogus), ("quad", geometry, material)]);

    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.skipped, 1);
}

// ============================================================================
// Pass Order Tests
// ============================================================================

/// Effects run in declared order whatever order they were enabled in.
#[rstest]
fn test_post_chain_runs_in_declared_order(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    ctx.renderer.enable_post_effect(PostEffect::Fxaa);
    ctx.renderer.enable_post_effect(PostEffect::Bloom);
    ctx.renderer.enable_post_effect(PostEffect::ToneMapping);
    let (geometry, material) = ctx.unlit_quad();
    let scene = scene_of(&[("quad", geometry, material)]);

    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.post_passes, 8);
    assert_eq!(
        pass_names(ctx.backend()),
        [
            "Forward",
            "Bloom Downsample",
            "Bloom Blur H",
            "Bloom Blur V",
            "Bloom",
            "Luminance",
            "Average Luminance",
            "Tonemapping",
            "FXAA",
        ]
    );
    assert_eq!(
        pass_targets(ctx.backend()),
        [
            "main",
            "bloom_ping",
            "bloom_pong",
            "bloom_ping",
            "post_ping",
            "luminance",
            "average_luminance",
            "post_pong",
            "backbuffer",
        ]
    );
    // Each post pass is one full-screen triangle
    let post_draws: Vec<_> = ctx.backend().draws().into_iter().skip(1).collect();
    assert!(post_draws.iter().all(|d| !d.indexed && d.range == (0..3)));
}

/// An intermediate frame that cannot be created is skipped and the chain still reaches the backbuffer.
#[rstest]
fn test_broken_intermediate_frame_keeps_chain_running(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    ctx.renderer.enable_post_effect(PostEffect::Bloom);
    ctx.renderer.enable_post_effect(PostEffect::Fxaa);
    ctx.backend_mut().fail_on_label("post_ping");
    let (geometry, material) = ctx.unlit_quad();
    let scene = scene_of(&[("quad", geometry, material)]);

    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.draw_calls, 1);
    assert_eq!(
        pass_names(ctx.backend()),
        ["Forward", "Bloom Downsample", "Bloom Blur H", "Bloom Blur V", "FXAA"]
    );
    assert_eq!(pass_targets(ctx.backend()).last().map(String::as_str), Some("backbuffer"));
    assert_eq!(ctx.backend().frames_presented(), 1);
}

/// Without auto exposure tone mapping is a single pass.
#[rstest]
fn test_fixed_exposure_skips_luminance_passes(context: RenderContext) {
    let mut config = RendererConfig::default();
    config.post.auto_exposure = false;
    let mut ctx = TestContext::with_config(&context, config);
    ctx.renderer.enable_post_effect(PostEffect::ToneMapping);
    let (geometry, material) = ctx.unlit_quad();
    let scene = scene_of(&[("quad", geometry, material)]);

    ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(pass_names(ctx.backend()), ["Forward", "Tonemapping"]);
}

/// Deferred shading writes the G-buffer and resolves it in the first post stage.
#[rstest]
fn test_deferred_shading_uses_gbuffer(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    ctx.renderer.enable_post_effect(PostEffect::DeferredShading);
    let (geometry, material) = ctx.standard_cube();
    let scene = scene_of(&[("cube", geometry, material)]);

    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.draw_calls, 1);
    assert_eq!(pass_names(ctx.backend()), ["G-Buffer", "Deferred Shading"]);
    let passes = ctx.backend().passes();
    assert_eq!(passes[0].color_attachments.len(), 3);
    assert!(passes[0].depth_stencil_attachment.is_some());
    assert_eq!(pass_targets(ctx.backend())[1], "backbuffer");
}

/// Forward-only techniques are left out of the G-buffer.
#[rstest]
fn test_forward_only_technique_skipped_in_deferred(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    ctx.renderer.enable_post_effect(PostEffect::DeferredShading);
    let (cube, standard) = ctx.standard_cube();
    let (quad, unlit) = ctx.unlit_quad();
    let scene = scene_of(&[("cube", cube, standard), ("quad", quad, unlit)]);

    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.skipped, 1);
}

/// The deferred and forward programs of one material differ.
#[rstest]
fn test_deferred_and_forward_pipelines_differ(context: RenderContext) {
    let mut forward = TestContext::new(&context);
    let mut deferred = TestContext::new(&context);
    deferred.renderer.enable_post_effect(PostEffect::DeferredShading);

    let first_pipeline = |ctx: &mut TestContext| {
        let (geometry, material) = ctx.standard_cube();
        let scene = scene_of(&[("cube", geometry, material)]);
        ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();
        let pipeline = ctx.backend().draws()[0].pipeline.unwrap();
        ctx.backend().pipeline_descriptor(pipeline).unwrap().clone()
    };
    let forward = first_pipeline(&mut forward);
    let deferred = first_pipeline(&mut deferred);

    assert_eq!(forward.vertex_shader, deferred.vertex_shader);
    assert_ne!(forward.fragment_shader, deferred.fragment_shader);
    assert_eq!(forward.color_targets.len(), 1);
    assert_eq!(deferred.color_targets.len(), 3);
}

/// Effects reading the G-buffer cannot run without deferred shading.
#[rstest]
fn test_ssao_without_gbuffer_falls_back_to_copy(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    ctx.renderer.enable_post_effect(PostEffect::Ssao);
    let (geometry, material) = ctx.unlit_quad();
    let scene = scene_of(&[("quad", geometry, material)]);

    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.post_passes, 1);
    assert_eq!(pass_names(ctx.backend()), ["Forward", "Copy"]);
}

/// Shadow maps are rendered before the main pass samples them.
#[rstest]
#[case::directional(false)]
#[case::spot(true)]
fn test_shadow_pass_runs_first(context: RenderContext, #[case] spot: bool) {
    let mut ctx = TestContext::new(&context);
    let shadow = ctx.renderer.new_shadow_source(&mut ctx.assets);
    let light = if spot {
        Light::Spot(
            SpotLight::new(-Vec3::Y, Vec3::ONE, 1.0, 20.0, 0.3, 0.5).with_shadow(shadow),
        )
    } else {
        Light::Directional(DirectionalLight::new(-Vec3::Y, Vec3::ONE, 1.0).with_shadow(shadow))
    };
    let (cube, material) = ctx.standard_cube();
    let mut scene = Scene::new();
    scene.add_node(None, Node::new("light").with_light(light).with_position(Vec3::new(0.0, 5.0, 0.0)));
    scene.add_node(None, Node::new("caster").with_renderable(cube, material));
    scene.add_node(
        None,
        Node::new("receiver")
            .with_renderable(cube, material)
            .with_cast_shadow(false),
    );

    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.shadow_passes, 1);
    assert_eq!(stats.shadow_draw_calls, 1);
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(pass_names(ctx.backend()), ["Shadow", "Forward"]);
    assert_eq!(pass_targets(ctx.backend())[0], "shadow");
}

/// Point lights do not cast shadows.
#[rstest]
fn test_point_light_casts_no_shadow(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let (cube, material) = ctx.standard_cube();
    let mut scene = Scene::new();
    scene.add_node(None, Node::new("bulb").with_light(Light::Point(PointLight::new(Vec3::ONE, 1.0, 10.0))));
    scene.add_node(None, Node::new("cube").with_renderable(cube, material));

    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.shadow_passes, 0);
    assert_eq!(pass_names(ctx.backend()), ["Forward"]);
}

/// A disabled shadow source is not rendered.
#[rstest]
fn test_disabled_shadow_is_not_rendered(context: RenderContext) {
    let mut ctx = TestContext::new(&context);
    let mut shadow = ctx.renderer.new_shadow_source(&mut ctx.assets);
    shadow.enabled = false;
    let light = Light::Directional(DirectionalLight::new(-Vec3::Y, Vec3::ONE, 1.0).with_shadow(shadow));
    let mut scene = Scene::new();
    scene.add_node(None, Node::new("sun").with_light(light));

    let stats = ctx.renderer.render_scene(&ctx.assets, &scene, None).unwrap();

    assert_eq!(stats.shadow_passes, 0);
    assert_eq!(pass_names(ctx.backend()), ["Forward"]);
}
