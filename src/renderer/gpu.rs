//! GPU-side caches derived from CPU resources
//!
//! Every entry is keyed by the identity of its CPU-side resource and stamped
//! with the version it was built from. Nothing here is removed implicitly;
//! the renderer's `release_*` calls are the only way out.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::cache::CacheEntry;
use crate::renderer::framebuffer::GpuFrame;
use crate::renderer::uniforms::*;
use crate::renderer::RenderError;
use crate::resources::*;
use crate::shader::{ComposeError, ComposedProgram, ProgramKey, ShaderLibrary, Technique};
use std::collections::HashMap;

/// Uploaded texture with its sampling view and sampler
pub(crate) struct GpuTexture {
    handle: TextureHandle,
    view: TextureViewHandle,
    layer_views: HashMap<u32, TextureViewHandle>,
    sampler: SamplerHandle,
    kind: TextureDimension,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GpuBuffer {
    handle: BufferHandle,
    size: u64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GpuIndex {
    buffer: GpuBuffer,
    format: IndexFormat,
}

/// Bind group layouts shared by every pipeline
pub(crate) struct Layouts {
    pub view: BindGroupLayoutHandle,
    pub object: BindGroupLayoutHandle,
    pub post: BindGroupLayoutHandle,
    /// Material layouts by number of texture slots
    material: HashMap<usize, BindGroupLayoutHandle>,
}

/// Resources bound where a real one is missing
pub(crate) struct Fallback {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub sampler: SamplerHandle,
    /// Linear clamp sampler used by the post-effect stages
    pub post_sampler: SamplerHandle,
}

/// Which bind groups a pipeline is laid out for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum LayoutKind {
    Scene { texture_slots: usize },
    Post,
}

/// Everything a render pipeline is specialized on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub program: ProgramKey,
    pub layout: LayoutKind,
    pub vertex_layouts: Vec<VertexBufferLayout>,
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub blend: Option<BlendState>,
    pub depth_write: bool,
    pub color_formats: Vec<Option<TextureFormat>>,
    pub depth_format: Option<TextureFormat>,
}

pub(crate) struct GpuResources {
    layouts: Option<Layouts>,
    fallback: Option<Fallback>,
    textures: HashMap<TextureId, CacheEntry<GpuTexture>>,
    vertex_buffers: HashMap<(GeometryId, usize), CacheEntry<GpuBuffer>>,
    index_buffers: HashMap<GeometryId, CacheEntry<GpuIndex>>,
    pub(crate) frames: HashMap<FrameId, GpuFrame>,
    programs: HashMap<ProgramKey, Result<ComposedProgram, ComposeError>>,
    pipelines: HashMap<PipelineKey, Result<RenderPipelineHandle, BackendError>>,
    material_uniforms: HashMap<MaterialId, (BufferHandle, u64)>,
    material_groups: BindGroupCache<(MaterialId, String)>,
    pub(crate) view_uniforms: UniformPool,
    pub(crate) shadow_uniforms: UniformPool,
    pub(crate) object_uniforms: UniformPool,
    pub(crate) post_uniforms: UniformPool,
    pub(crate) view_groups: BindGroupCache<usize>,
    pub(crate) object_groups: BindGroupCache<usize>,
    pub(crate) post_groups: BindGroupCache<usize>,
    pub(crate) swapchain: Option<FrameContext>,
    frame_index: u64,
}

impl GpuResources {
    pub(crate) fn new() -> Self {
        Self {
            layouts: None,
            fallback: None,
            textures: HashMap::new(),
            vertex_buffers: HashMap::new(),
            index_buffers: HashMap::new(),
            frames: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            material_uniforms: HashMap::new(),
            material_groups: BindGroupCache::default(),
            view_uniforms: UniformPool::new::<ViewUniform>("View Uniform"),
            shadow_uniforms: UniformPool::new::<ShadowUniform>("Shadow Uniform"),
            object_uniforms: UniformPool::new::<ObjectUniform>("Object Uniform"),
            post_uniforms: UniformPool::new::<PostUniform>("Post Uniform"),
            view_groups: BindGroupCache::default(),
            object_groups: BindGroupCache::default(),
            post_groups: BindGroupCache::default(),
            swapchain: None,
            frame_index: 0,
        }
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.layouts.is_some() && self.fallback.is_some()
    }

    /// Create the shared layouts and fallback resources
    pub(crate) fn init<B: GraphicsBackend>(&mut self, backend: &mut B) -> BackendResult<()> {
        if self.is_initialized() {
            return Ok(());
        }

        let view = backend.create_bind_group_layout(&[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::VERTEX_FRAGMENT,
                ty: BindingType::UniformBuffer,
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::UniformBuffer,
            },
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::texture_2d(),
            },
            BindGroupLayoutEntry {
                binding: 3,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Sampler { filtering: true },
            },
        ])?;

        let object = backend.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer,
        }])?;

        let mut post_entries = vec![BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::UniformBuffer,
        }];
        for binding in 1..=3 {
            post_entries.push(BindGroupLayoutEntry {
                binding,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::texture_2d(),
            });
        }
        post_entries.push(BindGroupLayoutEntry {
            binding: 4,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Sampler { filtering: true },
        });
        let post = backend.create_bind_group_layout(&post_entries)?;

        let white = TextureData::white();
        let texture = backend.create_texture(&TextureDescriptor {
            label: Some("Fallback White".into()),
            width: white.width,
            height: white.height,
            format: white.format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            ..Default::default()
        })?;
        backend.write_texture(texture, 0, &white.data, white.width, white.height);
        let view_handle = backend.create_texture_view(texture, &TextureViewDescriptor::default())?;
        let sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("Fallback Sampler".into()),
            ..SamplerDescriptor::new(FilterMode::Linear, AddressMode::Repeat)
        })?;
        let post_sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("Post Sampler".into()),
            ..SamplerDescriptor::new(FilterMode::Linear, AddressMode::ClampToEdge)
        })?;

        self.layouts = Some(Layouts {
            view,
            object,
            post,
            material: HashMap::new(),
        });
        self.fallback = Some(Fallback {
            texture,
            view: view_handle,
            sampler,
            post_sampler,
        });
        Ok(())
    }

    pub(crate) fn layouts(&self) -> Result<&Layouts, RenderError> {
        self.layouts.as_ref().ok_or(RenderError::NotInitialized)
    }

    pub(crate) fn fallback(&self) -> Result<&Fallback, RenderError> {
        self.fallback.as_ref().ok_or(RenderError::NotInitialized)
    }

    /// Start a frame: rewind the per-frame uniform pools
    pub(crate) fn begin_frame(&mut self, frame: FrameContext) {
        self.swapchain = Some(frame);
        self.frame_index += 1;
        self.view_uniforms.rewind();
        self.shadow_uniforms.rewind();
        self.object_uniforms.rewind();
        self.post_uniforms.rewind();
    }

    pub(crate) fn end_frame(&mut self) {
        self.swapchain = None;
    }

    // Textures

    fn sync_texture<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        assets: &Assets,
        id: TextureId,
    ) -> Result<&mut GpuTexture, RenderError> {
        let texture = assets
            .texture(id)
            .ok_or_else(|| RenderError::MissingAsset(format!("texture {:?}", id)))?;

        let current = self
            .textures
            .get(&id)
            .is_some_and(|entry| entry.is_current(texture.version()));
        if !current {
            if let Some(stale) = self.textures.remove(&id) {
                destroy_texture(backend, stale.value);
            }
            let gpu = upload_texture(backend, texture)?;
            log::debug!("Uploaded texture '{}' (version {})", texture.name(), texture.version());
            self.textures.insert(id, CacheEntry::new(texture.version(), gpu));
        }

        self.textures
            .get_mut(&id)
            .map(|entry| &mut entry.value)
            .ok_or_else(|| RenderError::MissingAsset(format!("texture {:?}", id)))
    }

    /// Sampling view and sampler of a texture, uploading it when stale
    pub(crate) fn texture<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        assets: &Assets,
        id: TextureId,
    ) -> Result<(TextureViewHandle, SamplerHandle), RenderError> {
        let gpu = self.sync_texture(backend, assets, id)?;
        Ok((gpu.view, gpu.sampler))
    }

    /// View onto one layer of a texture, for binding it as an attachment
    pub(crate) fn attachment_view<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        assets: &Assets,
        attachment: Attachment,
    ) -> Result<TextureViewHandle, RenderError> {
        let gpu = self.sync_texture(backend, assets, attachment.texture)?;
        if gpu.kind == TextureDimension::D2 && attachment.layer == 0 {
            return Ok(gpu.view);
        }
        if let Some(view) = gpu.layer_views.get(&attachment.layer) {
            return Ok(*view);
        }
        let view = backend.create_texture_view(gpu.handle, &TextureViewDescriptor::layer(attachment.layer))?;
        gpu.layer_views.insert(attachment.layer, view);
        Ok(view)
    }

    // Geometry

    /// GPU buffer holding one vertex buffer of a geometry
    pub(crate) fn vertex_buffer<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        geometry: GeometryId,
        index: usize,
        buffer: &Buffer,
    ) -> Result<BufferHandle, RenderError> {
        let key = (geometry, index);
        if let Some(entry) = self.vertex_buffers.get(&key) {
            if entry.is_current(buffer.version()) {
                return Ok(entry.value.handle);
            }
        }
        let previous = self.vertex_buffers.remove(&key).map(|e| e.value);
        let gpu = sync_buffer(
            backend,
            buffer.name(),
            buffer.data().as_bytes(),
            BufferUsage::VERTEX,
            buffer.usage(),
            previous,
        )?;
        self.vertex_buffers.insert(key, CacheEntry::new(buffer.version(), gpu));
        Ok(gpu.handle)
    }

    /// GPU index buffer; 8-bit indices are widened to 16 bits
    pub(crate) fn index_buffer<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        geometry: GeometryId,
        buffer: &Buffer,
    ) -> Result<(BufferHandle, IndexFormat), RenderError> {
        if let Some(entry) = self.index_buffers.get(&geometry) {
            if entry.is_current(buffer.version()) {
                return Ok((entry.value.buffer.handle, entry.value.format));
            }
        }

        let widened: Vec<u16>;
        let (bytes, format) = match buffer.data() {
            BufferData::U8(data) => {
                widened = data.iter().map(|i| *i as u16).collect();
                (bytemuck::cast_slice::<u16, u8>(&widened), IndexFormat::Uint16)
            }
            BufferData::U16(data) => (bytemuck::cast_slice::<u16, u8>(data), IndexFormat::Uint16),
            BufferData::U32(data) => (bytemuck::cast_slice::<u32, u8>(data), IndexFormat::Uint32),
            other => {
                return Err(RenderError::MissingAsset(format!(
                    "index buffer '{}' holds {:?} data",
                    buffer.name(),
                    other.component_type()
                )))
            }
        };

        let previous = self.index_buffers.remove(&geometry).map(|e| e.value.buffer);
        let gpu = sync_buffer(backend, buffer.name(), bytes, BufferUsage::INDEX, buffer.usage(), previous)?;
        self.index_buffers.insert(
            geometry,
            CacheEntry::new(buffer.version(), GpuIndex { buffer: gpu, format }),
        );
        Ok((gpu.handle, format))
    }

    #[cfg(test)]
    pub(crate) fn has_geometry(&self, id: GeometryId) -> bool {
        self.index_buffers.contains_key(&id) || self.vertex_buffers.keys().any(|(g, _)| *g == id)
    }

    // Programs and pipelines

    /// Composed program for `key`; failures are cached and reported once
    pub(crate) fn program(&mut self, library: &ShaderLibrary, key: &ProgramKey) -> Result<ComposedProgram, RenderError> {
        if let Some(cached) = self.programs.get(key) {
            return cached.clone().map_err(RenderError::from);
        }
        let result = library.build_program(key);
        match &result {
            Ok(_) => log::info!("Built program {}{:?}", key.technique, key.variants.defines()),
            Err(e) => log::error!("Program {} cannot be built: {}", key.technique, e),
        }
        self.programs.insert(key.clone(), result.clone());
        result.map_err(RenderError::from)
    }

    pub(crate) fn pipeline<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        library: &ShaderLibrary,
        key: PipelineKey,
    ) -> Result<RenderPipelineHandle, RenderError> {
        if let Some(cached) = self.pipelines.get(&key) {
            return cached.clone().map_err(RenderError::from);
        }

        let program = self.program(library, &key.program)?;
        let bind_group_layouts = match key.layout {
            LayoutKind::Scene { texture_slots } => {
                let material = self.material_layout(backend, texture_slots)?;
                let layouts = self.layouts()?;
                vec![layouts.view, layouts.object, material]
            }
            LayoutKind::Post => vec![self.layouts()?.post],
        };

        let desc = RenderPipelineDescriptor {
            label: Some(format!("{} {:?}", key.program.technique, key.program.variants.defines())),
            vertex_shader: program.vertex,
            fragment_shader: Some(program.fragment),
            vertex_layouts: key.vertex_layouts.clone(),
            bind_group_layouts,
            primitive_topology: key.topology,
            front_face: FrontFace::Ccw,
            cull_mode: key.cull_mode,
            depth_stencil: key.depth_format.map(|format| DepthStencilState {
                format,
                depth_write_enabled: key.depth_write,
                depth_compare: CompareFunction::LessEqual,
            }),
            color_targets: key
                .color_formats
                .iter()
                .map(|format| {
                    format.map(|format| ColorTargetState {
                        format,
                        blend: key.blend,
                        write_mask: ColorWrites::ALL,
                    })
                })
                .collect(),
        };

        let result = backend.create_render_pipeline(&desc);
        if let Err(e) = &result {
            log::error!("Pipeline for {} cannot be created: {}", key.program.technique, e);
        }
        self.pipelines.insert(key, result.clone());
        result.map_err(RenderError::from)
    }

    fn material_layout<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        texture_slots: usize,
    ) -> Result<BindGroupLayoutHandle, RenderError> {
        let layouts = self.layouts.as_mut().ok_or(RenderError::NotInitialized)?;
        if let Some(layout) = layouts.material.get(&texture_slots) {
            return Ok(*layout);
        }

        let mut entries = vec![BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer,
        }];
        for slot in 0..texture_slots as u32 {
            entries.push(BindGroupLayoutEntry {
                binding: 1 + slot * 2,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::texture_2d(),
            });
            entries.push(BindGroupLayoutEntry {
                binding: 2 + slot * 2,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Sampler { filtering: true },
            });
        }
        let layout = backend.create_bind_group_layout(&entries)?;
        layouts.material.insert(texture_slots, layout);
        Ok(layout)
    }

    // Bind groups

    /// Material bind group for `technique`: the uniform, then one texture and
    /// sampler per slot. Unset slots bind the white fallback.
    pub(crate) fn material_bind_group<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        assets: &Assets,
        id: MaterialId,
        material: &Material,
        technique: &Technique,
    ) -> Result<BindGroupHandle, RenderError> {
        let mut entries = Vec::with_capacity(1 + technique.texture_slots.len() * 2);
        for (slot, name) in technique.texture_slots.iter().enumerate() {
            let (view, sampler) = match material.textures.get(name) {
                Some(texture) => self.texture(backend, assets, *texture)?,
                None => {
                    let fallback = self.fallback()?;
                    (fallback.view, fallback.sampler)
                }
            };
            let binding = 1 + slot as u32 * 2;
            entries.push((binding, BindGroupEntry::Texture(view)));
            entries.push((binding + 1, BindGroupEntry::Sampler(sampler)));
        }

        let uniform = self.material_uniform(backend, id, material)?;
        entries.insert(
            0,
            (
                0,
                BindGroupEntry::Buffer {
                    buffer: uniform,
                    offset: 0,
                    size: None,
                },
            ),
        );

        let layout = self.material_layout(backend, technique.texture_slots.len())?;
        let group = self
            .material_groups
            .get_or_create(backend, (id, technique.name.clone()), layout, entries)?;
        Ok(group)
    }

    /// Material uniform buffer, rewritten at most once per frame
    fn material_uniform<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        id: MaterialId,
        material: &Material,
    ) -> Result<BufferHandle, RenderError> {
        let frame = self.frame_index;
        if let Some((buffer, written)) = self.material_uniforms.get_mut(&id) {
            if *written != frame {
                backend.write_buffer(*buffer, 0, bytemuck::bytes_of(&material.uniform_data()));
                *written = frame;
            }
            return Ok(*buffer);
        }

        let buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("Material Buffer {}", material.name)),
                size: std::mem::size_of::<MaterialUniform>() as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
                mapped_at_creation: false,
            },
            bytemuck::bytes_of(&material.uniform_data()),
        )?;
        self.material_uniforms.insert(id, (buffer, frame));
        Ok(buffer)
    }

    // Release

    pub(crate) fn release_geometry<B: GraphicsBackend>(&mut self, backend: &mut B, id: GeometryId) {
        self.vertex_buffers.retain(|(geometry, _), entry| {
            if *geometry == id {
                backend.destroy_buffer(entry.value.handle);
                false
            } else {
                true
            }
        });
        if let Some(entry) = self.index_buffers.remove(&id) {
            backend.destroy_buffer(entry.value.buffer.handle);
        }
    }

    pub(crate) fn release_texture<B: GraphicsBackend>(&mut self, backend: &mut B, id: TextureId) {
        if let Some(entry) = self.textures.remove(&id) {
            destroy_texture(backend, entry.value);
        }
    }

    pub(crate) fn release_frame(&mut self, id: FrameId) {
        self.frames.remove(&id);
    }

    pub(crate) fn release_material<B: GraphicsBackend>(&mut self, backend: &mut B, id: MaterialId) {
        self.material_groups.remove_where(backend, |(material, _)| *material == id);
        if let Some((buffer, _)) = self.material_uniforms.remove(&id) {
            backend.destroy_buffer(buffer);
        }
    }

    /// Drop every cached GPU object
    pub(crate) fn release_all<B: GraphicsBackend>(&mut self, backend: &mut B) {
        let geometries: Vec<GeometryId> = self
            .vertex_buffers
            .keys()
            .map(|(g, _)| *g)
            .chain(self.index_buffers.keys().copied())
            .collect();
        for id in geometries {
            self.release_geometry(backend, id);
        }
        let textures: Vec<TextureId> = self.textures.keys().copied().collect();
        for id in textures {
            self.release_texture(backend, id);
        }
        let materials: Vec<MaterialId> = self.material_uniforms.keys().copied().collect();
        for id in materials {
            self.release_material(backend, id);
        }
        self.frames.clear();
        self.view_groups.remove_where(backend, |_| true);
        self.object_groups.remove_where(backend, |_| true);
        self.post_groups.remove_where(backend, |_| true);
        self.view_uniforms.release(backend);
        self.shadow_uniforms.release(backend);
        self.object_uniforms.release(backend);
        self.post_uniforms.release(backend);
        if let Some(fallback) = self.fallback.take() {
            backend.destroy_texture_view(fallback.view);
            backend.destroy_texture(fallback.texture);
        }
    }
}

fn upload_texture<B: GraphicsBackend>(backend: &mut B, texture: &Texture) -> Result<GpuTexture, RenderError> {
    let handle = backend.create_texture(&texture.descriptor())?;

    let view_desc = match texture.kind() {
        TextureDimension::D2 => TextureViewDescriptor::default(),
        TextureDimension::Cube => TextureViewDescriptor::cube(),
    };
    let view = match backend.create_texture_view(handle, &view_desc) {
        Ok(view) => view,
        Err(e) => {
            backend.destroy_texture(handle);
            return Err(e.into());
        }
    };
    let sampler = match backend.create_sampler(&texture.sampler_descriptor()) {
        Ok(sampler) => sampler,
        Err(e) => {
            backend.destroy_texture_view(view);
            backend.destroy_texture(handle);
            return Err(e.into());
        }
    };

    for layer in 0..texture.kind().layer_count() {
        if let Some(data) = texture.layer_data(layer) {
            backend.write_texture(handle, layer, data, texture.width(), texture.height());
        }
    }

    Ok(GpuTexture {
        handle,
        view,
        layer_views: HashMap::new(),
        sampler,
        kind: texture.kind(),
    })
}

fn destroy_texture<B: GraphicsBackend>(backend: &mut B, texture: GpuTexture) {
    for view in texture.layer_views.into_values() {
        backend.destroy_texture_view(view);
    }
    backend.destroy_texture_view(texture.view);
    backend.destroy_texture(texture.handle);
}

/// Upload buffer data, writing in place when a dynamic buffer keeps its size
fn sync_buffer<B: GraphicsBackend>(
    backend: &mut B,
    label: &str,
    bytes: &[u8],
    usage: BufferUsage,
    hint: Usage,
    previous: Option<GpuBuffer>,
) -> BackendResult<GpuBuffer> {
    if let Some(previous) = previous {
        if hint.allows_updates() && previous.size == bytes.len() as u64 {
            backend.write_buffer(previous.handle, 0, bytes);
            return Ok(previous);
        }
        backend.destroy_buffer(previous.handle);
    }

    let handle = backend.create_buffer_init(
        &BufferDescriptor {
            label: Some(label.to_string()),
            size: bytes.len() as u64,
            usage: usage | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        },
        bytes,
    )?;
    Ok(GpuBuffer {
        handle,
        size: bytes.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{Command, RecordingBackend};

    fn setup() -> (RecordingBackend, GpuResources) {
        let mut backend = RecordingBackend::new(64, 64);
        let mut gpu = GpuResources::new();
        gpu.init(&mut backend).unwrap();
        (backend, gpu)
    }

    #[test]
    fn test_texture_upload_is_keyed_by_version() {
        let (mut backend, mut gpu) = setup();
        let mut assets = Assets::new();
        let id = assets.add_texture(Texture::from_data(TextureData::white()).unwrap());

        let first = gpu.texture(&mut backend, &assets, id).unwrap();
        let again = gpu.texture(&mut backend, &assets, id).unwrap();
        assert_eq!(first, again);

        assets.texture_mut(id).unwrap().set_data(0, vec![0, 0, 0, 255]).unwrap();
        let updated = gpu.texture(&mut backend, &assets, id).unwrap();
        assert_ne!(first.0, updated.0);
        // Fallback plus the current upload
        assert_eq!(backend.live_textures(), 2);
    }

    #[test]
    fn test_u8_indices_are_widened() {
        let (mut backend, mut gpu) = setup();
        let mut assets = Assets::new();
        let mut geometry = Geometry::new("tri");
        geometry
            .set_index_data(BufferData::U8(vec![0, 1, 2]), Usage::Static)
            .unwrap();
        let id = assets.add_geometry(geometry);
        let index = assets.geometry(id).unwrap().index_buffer().unwrap().clone();

        let (handle, format) = gpu.index_buffer(&mut backend, id, &index).unwrap();
        assert_eq!(format, IndexFormat::Uint16);
        assert_eq!(backend.buffer_descriptor(handle).unwrap().size, 6);
    }

    #[test]
    fn test_dynamic_buffer_updates_in_place() {
        let (mut backend, mut gpu) = setup();
        let mut assets = Assets::new();
        let mut geometry = Geometry::new("points");
        geometry
            .add_single_attribute("points:position", Semantic::Position, 3, BufferData::F32(vec![0.0; 6]), Usage::Dynamic)
            .unwrap();
        let id = assets.add_geometry(geometry);

        let buffer = assets.geometry(id).unwrap().buffers()[0].clone();
        let first = gpu.vertex_buffer(&mut backend, id, 0, &buffer).unwrap();

        assets
            .geometry_mut(id)
            .unwrap()
            .update_buffer_data(0, BufferData::F32(vec![1.0; 6]))
            .unwrap();
        let buffer = assets.geometry(id).unwrap().buffers()[0].clone();
        let second = gpu.vertex_buffer(&mut backend, id, 0, &buffer).unwrap();

        assert_eq!(first, second);
        assert!(backend
            .commands()
            .iter()
            .any(|c| matches!(c, Command::WriteBuffer { buffer, .. } if *buffer == first)));
    }

    #[test]
    fn test_release_is_idempotent() {
        let (mut backend, mut gpu) = setup();
        let mut assets = Assets::new();
        let id = assets.add_geometry(crate::resources::primitives::quad().unwrap());
        let geometry = assets.geometry(id).unwrap();
        for (i, buffer) in geometry.buffers().iter().enumerate() {
            gpu.vertex_buffer(&mut backend, id, i, buffer).unwrap();
        }
        assert!(gpu.has_geometry(id));

        gpu.release_geometry(&mut backend, id);
        gpu.release_geometry(&mut backend, id);
        assert!(!gpu.has_geometry(id));
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_program_failure_is_cached() {
        let (_, mut gpu) = setup();
        let library = ShaderLibrary::empty();
        let key = ProgramKey::new("missing", crate::shader::VariantFlags::NONE);
        assert!(gpu.program(&library, &key).is_err());
        assert!(matches!(
            gpu.program(&library, &key),
            Err(RenderError::Compose(ComposeError::UnknownTechnique(_)))
        ));
    }
}
