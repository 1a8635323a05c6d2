//! Per-frame draw encoding
//!
//! [`FrameEncoder`] borrows everything one frame needs and turns draw items
//! into backend commands. Each item either encodes completely or returns an
//! error before anything is recorded for it, so a bad node is skipped without
//! leaving half-bound state behind.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::renderer::config::RendererConfig;
use crate::renderer::framebuffer::{PassOptions, TargetInfo};
use crate::renderer::gpu::{GpuResources, LayoutKind, PipelineKey};
use crate::renderer::uniforms::*;
use crate::renderer::{ErrorLog, FrameStats, RenderError, RenderTarget};
use crate::resources::{Assets, FrameId, Semantic, TextureId};
use crate::scene::{Light, Renderable, Scene};
use crate::shader::{ProgramKey, ShaderLibrary, VariantFlags};
use glam::{Mat4, Vec3};

/// A renderable node captured for one frame
#[derive(Debug, Clone)]
pub(crate) struct DrawItem<'a> {
    pub name: &'a str,
    pub renderable: &'a Renderable,
    pub world: Mat4,
    pub cast_shadow: bool,
}

/// A light node captured for one frame
#[derive(Debug, Clone)]
pub(crate) struct LightItem<'a> {
    pub name: &'a str,
    pub light: &'a Light,
    pub world: Mat4,
}

/// Read-only view of the scene for the duration of one frame
#[derive(Debug, Default)]
pub(crate) struct FrameSnapshot<'a> {
    pub items: Vec<DrawItem<'a>>,
    pub lights: Vec<LightItem<'a>>,
    pub ambient: Vec3,
}

impl<'a> FrameSnapshot<'a> {
    /// Walk the scene once, in traversal order
    pub(crate) fn collect(scene: &'a Scene) -> Self {
        let mut snapshot = Self {
            ambient: scene.ambient_light,
            ..Default::default()
        };
        scene.traverse(|_, node, world| {
            if let Some(renderable) = &node.renderable {
                snapshot.items.push(DrawItem {
                    name: &node.name,
                    renderable,
                    world: *world,
                    cast_shadow: node.cast_shadow,
                });
            }
            if let Some(light) = &node.light {
                snapshot.lights.push(LightItem {
                    name: &node.name,
                    light,
                    world: *world,
                });
            }
        });
        snapshot
    }

    /// Light shading the main pass: the first directional or spot light
    pub(crate) fn main_light(&self) -> MainLight {
        self.lights
            .iter()
            .find_map(|item| {
                let direction = item.light.world_direction(&item.world)?;
                Some(MainLight {
                    direction: -direction,
                    color: item.light.color(),
                    intensity: item.light.intensity(),
                })
            })
            .unwrap_or_default()
    }
}

/// Shadow map rendered this frame and how to sample it
#[derive(Debug, Clone, Copy)]
pub(crate) struct ShadowMap {
    pub texture: TextureId,
    pub uniform: ShadowUniform,
}

/// State shared by every draw of a pass
pub(crate) struct PassState<'a> {
    pub target: &'a TargetInfo,
    pub view_group: BindGroupHandle,
    /// Replaces the material's technique, e.g. `depth` in shadow passes
    pub technique: Option<&'a str>,
    /// Added to every program built in this pass
    pub variants: VariantFlags,
}

pub(crate) struct FrameEncoder<'a, B: GraphicsBackend> {
    pub backend: &'a mut B,
    pub gpu: &'a mut GpuResources,
    pub library: &'a ShaderLibrary,
    pub assets: &'a Assets,
    pub config: &'a RendererConfig,
    pub errors: &'a mut ErrorLog,
    pub backbuffer_depth: Option<FrameId>,
    pub stats: FrameStats,
}

impl<'a, B: GraphicsBackend> FrameEncoder<'a, B> {
    pub(crate) fn begin_pass(&mut self, target: RenderTarget, label: &str, depth: bool) -> Result<TargetInfo, RenderError> {
        self.gpu.begin_target(
            self.backend,
            self.assets,
            target,
            self.backbuffer_depth,
            self.config.max_frame_attachments,
            PassOptions { label, depth },
        )
    }

    pub(crate) fn end_pass(&mut self) {
        self.backend.end_render_pass();
    }

    /// Bind group 0: view uniform plus the shadow map sampled by this view
    pub(crate) fn bind_view(&mut self, view: &ViewUniform, shadow: Option<&ShadowMap>) -> Result<BindGroupHandle, RenderError> {
        let (slot, view_buffer) = self.gpu.view_uniforms.push(self.backend, view)?;
        let shadow_uniform = shadow.map_or_else(ShadowUniform::disabled, |s| s.uniform);
        let (_, shadow_buffer) = self.gpu.shadow_uniforms.push(self.backend, &shadow_uniform)?;

        let (shadow_view, shadow_sampler) = match shadow {
            Some(shadow) => self.gpu.texture(self.backend, self.assets, shadow.texture)?,
            None => {
                let fallback = self.gpu.fallback()?;
                (fallback.view, fallback.sampler)
            }
        };

        let layout = self.gpu.layouts()?.view;
        let entries = vec![
            (0, uniform_entry(view_buffer)),
            (1, uniform_entry(shadow_buffer)),
            (2, BindGroupEntry::Texture(shadow_view)),
            (3, BindGroupEntry::Sampler(shadow_sampler)),
        ];
        Ok(self.gpu.view_groups.get_or_create(self.backend, slot, layout, entries)?)
    }

    /// Encode one draw, returning the number of primitives it assembles
    pub(crate) fn draw_item(&mut self, item: &DrawItem, pass: &PassState) -> Result<u32, RenderError> {
        let renderable = item.renderable;
        let geometry = self
            .assets
            .geometry(renderable.geometry)
            .ok_or_else(|| RenderError::MissingAsset(format!("geometry {:?}", renderable.geometry)))?;
        let material = self
            .assets
            .material(renderable.material)
            .ok_or_else(|| RenderError::MissingAsset(format!("material {:?}", renderable.material)))?;

        let draw = geometry
            .draw_parameter()
            .filter(|d| d.count > 0)
            .ok_or_else(|| RenderError::NoDrawParameter(geometry.name().to_string()))?;
        let topology = draw.mode.topology().ok_or(RenderError::UnsupportedDrawMode(draw.mode))?;

        let technique_name = pass.technique.unwrap_or(&material.technique);
        let technique = self
            .library
            .technique(technique_name)
            .ok_or_else(|| crate::shader::ComposeError::UnknownTechnique(technique_name.to_string()))?;

        let mut variants = match pass.technique {
            Some(_) if material.variants.contains(VariantFlags::ALPHA_TEST) => VariantFlags::ALPHA_TEST,
            Some(_) => VariantFlags::NONE,
            None => material.variants,
        } | pass.variants;
        if renderable.joints.is_some() {
            variants |= VariantFlags::SKINNING;
        }
        if variants.contains(VariantFlags::DEFERRED) && technique.deferred.is_none() {
            return Err(RenderError::ForwardOnly(technique.name.clone()));
        }

        // Only the attributes the program reads are bound, each from the first
        // buffer that carries it
        let required = technique.required_inputs(variants);
        let mut found: Vec<Semantic> = Vec::with_capacity(required.len());
        let mut vertex_layouts = Vec::new();
        let mut vertex_slots = Vec::new();
        for (index, buffer) in geometry.buffers().iter().enumerate() {
            let mut attributes = Vec::new();
            for attribute in buffer.attributes() {
                if !required.contains(&attribute.semantic) || found.contains(&attribute.semantic) {
                    continue;
                }
                let format = attribute
                    .vertex_format()
                    .ok_or(RenderError::UnsupportedVertexFormat(attribute.semantic))?;
                attributes.push(VertexAttribute {
                    location: attribute.semantic.location(),
                    format,
                    offset: attribute.offset as u64,
                });
                found.push(attribute.semantic);
            }
            if !attributes.is_empty() {
                vertex_layouts.push(VertexBufferLayout {
                    array_stride: buffer.byte_stride() as u64,
                    step_mode: VertexStepMode::Vertex,
                    attributes,
                });
                vertex_slots.push(index);
            }
        }
        let missing: Vec<Semantic> = required.iter().filter(|s| !found.contains(s)).copied().collect();
        if !missing.is_empty() {
            return Err(RenderError::MissingInputs {
                geometry: geometry.name().to_string(),
                missing,
            });
        }

        let end = draw.offset as u64 + draw.count as u64;
        let available = match geometry.index_buffer() {
            Some(index) => index.element_count(),
            None => geometry.vertex_count(),
        } as u64;
        if end > available {
            return Err(RenderError::DrawOutOfRange {
                geometry: geometry.name().to_string(),
                end,
                available,
            });
        }

        let overridden = pass.technique.is_some();
        let key = PipelineKey {
            program: ProgramKey::new(&technique.name, variants),
            layout: LayoutKind::Scene {
                texture_slots: technique.texture_slots.len(),
            },
            vertex_layouts,
            topology,
            cull_mode: material.cull_mode,
            blend: if overridden { None } else { material.blend },
            depth_write: overridden || material.depth_write,
            color_formats: pass.target.color_formats.clone(),
            depth_format: pass.target.depth_format,
        };
        let pipeline = self.gpu.pipeline(self.backend, self.library, key)?;

        let mut vertex_buffers = Vec::with_capacity(vertex_slots.len());
        for index in vertex_slots {
            let buffer = &geometry.buffers()[index];
            vertex_buffers.push(self.gpu.vertex_buffer(self.backend, renderable.geometry, index, buffer)?);
        }
        let index_buffer = match geometry.index_buffer() {
            Some(buffer) => Some(self.gpu.index_buffer(self.backend, renderable.geometry, buffer)?),
            None => None,
        };

        let material_group =
            self.gpu
                .material_bind_group(self.backend, self.assets, renderable.material, material, technique)?;

        let object = ObjectUniform::new(item.world, renderable.joints.as_deref());
        let (slot, object_buffer) = self.gpu.object_uniforms.push(self.backend, &object)?;
        let object_layout = self.gpu.layouts()?.object;
        let object_group = self.gpu.object_groups.get_or_create(
            self.backend,
            slot,
            object_layout,
            vec![(0, uniform_entry(object_buffer))],
        )?;

        self.backend.set_render_pipeline(pipeline);
        self.backend.set_bind_group(0, pass.view_group);
        self.backend.set_bind_group(1, object_group);
        self.backend.set_bind_group(2, material_group);
        for (slot, buffer) in vertex_buffers.into_iter().enumerate() {
            self.backend.set_vertex_buffer(slot as u32, buffer, 0);
        }

        let range = draw.offset..draw.offset + draw.count;
        match index_buffer {
            Some((buffer, format)) => {
                self.backend.set_index_buffer(buffer, 0, format);
                self.backend.draw_indexed(range, 0, 0..1);
            }
            None => self.backend.draw(range, 0..1),
        }

        Ok(draw.mode.primitive_count(draw.count))
    }

    /// Full-screen triangle with `technique`, sampling up to three inputs
    pub(crate) fn draw_fullscreen(
        &mut self,
        technique: &str,
        inputs: [Option<TextureId>; 3],
        uniform: &PostUniform,
        target: &TargetInfo,
    ) -> Result<(), RenderError> {
        let key = PipelineKey {
            program: ProgramKey::new(technique, VariantFlags::NONE),
            layout: LayoutKind::Post,
            vertex_layouts: Vec::new(),
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::None,
            blend: None,
            depth_write: false,
            color_formats: target.color_formats.clone(),
            depth_format: target.depth_format,
        };
        let pipeline = self.gpu.pipeline(self.backend, self.library, key)?;

        let (slot, buffer) = self.gpu.post_uniforms.push(self.backend, uniform)?;
        let mut entries = vec![(0, uniform_entry(buffer))];
        for (i, input) in inputs.iter().enumerate() {
            let view = match input {
                Some(texture) => self.gpu.texture(self.backend, self.assets, *texture)?.0,
                None => self.gpu.fallback()?.view,
            };
            entries.push((1 + i as u32, BindGroupEntry::Texture(view)));
        }
        entries.push((4, BindGroupEntry::Sampler(self.gpu.fallback()?.post_sampler)));

        let layout = self.gpu.layouts()?.post;
        let group = self.gpu.post_groups.get_or_create(self.backend, slot, layout, entries)?;

        self.backend.set_render_pipeline(pipeline);
        self.backend.set_bind_group(0, group);
        self.backend.draw(0..3, 0..1);
        Ok(())
    }

    /// Record a skipped draw
    ///
    /// Missing draw descriptors and forward-only techniques in deferred
    /// passes are expected and only logged at debug level.
    pub(crate) fn skip(&mut self, name: &str, error: &RenderError) {
        self.stats.skipped += 1;
        match error {
            RenderError::NoDrawParameter(_) | RenderError::ForwardOnly(_) => {
                log::debug!("Skipped '{}': {}", name, error)
            }
            _ => self.errors.report(format!("Skipped '{}': {}", name, error)),
        }
    }
}

fn uniform_entry(buffer: BufferHandle) -> BindGroupEntry {
    BindGroupEntry::Buffer {
        buffer,
        offset: 0,
        size: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{DirectionalLight, Node, PointLight};

    #[test]
    fn test_snapshot_keeps_traversal_order() {
        let mut assets = Assets::new();
        let geometry = assets.add_geometry(crate::resources::primitives::quad().unwrap());
        let material = assets.add_material(crate::resources::Material::default());

        let mut scene = Scene::new();
        let first = scene.add_node(None, Node::new("first").with_renderable(geometry, material));
        scene.add_node(Some(first), Node::new("child").with_renderable(geometry, material));
        scene.add_node(None, Node::new("second").with_renderable(geometry, material));

        let snapshot = FrameSnapshot::collect(&scene);
        let names: Vec<&str> = snapshot.items.iter().map(|i| i.name).collect();
        assert_eq!(names, ["first", "child", "second"]);
    }

    #[test]
    fn test_main_light_skips_point_lights() {
        let mut scene = Scene::new();
        scene.add_node(None, Node::new("bulb").with_light(Light::Point(PointLight::default())));
        scene.add_node(
            None,
            Node::new("sun").with_light(Light::Directional(DirectionalLight::new(-Vec3::Y, Vec3::ONE, 2.0))),
        );

        let light = FrameSnapshot::collect(&scene).main_light();
        assert!((light.direction - Vec3::Y).length() < 1e-5);
        assert_eq!(light.intensity, 2.0);
    }

    #[test]
    fn test_main_light_defaults_without_lights() {
        let scene = Scene::new();
        assert_eq!(FrameSnapshot::collect(&scene).main_light(), MainLight::default());
    }
}
