//! Recording backend for testing and headless use.
//!
//! This backend performs no GPU work. Every resource creation is validated
//! against the same rules a real device applies (non-zero sizes, known handles)
//! and every command is appended to a log that tests can inspect.

use std::collections::{HashMap, HashSet};

use crate::backend::traits::*;
use crate::backend::types::*;

/// A recorded backend command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginFrame,
    EndFrame,
    WriteBuffer {
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    },
    WriteTexture {
        texture: TextureHandle,
        layer: u32,
    },
    BeginPass(RenderPassDescriptor),
    EndPass,
    SetPipeline(RenderPipelineHandle),
    SetBindGroup {
        index: u32,
        bind_group: BindGroupHandle,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: BufferHandle,
        offset: u64,
        format: IndexFormat,
    },
    SetViewport {
        width: f32,
        height: f32,
    },
    Draw {
        vertices: std::ops::Range<u32>,
        instances: std::ops::Range<u32>,
    },
    DrawIndexed {
        indices: std::ops::Range<u32>,
        base_vertex: i32,
        instances: std::ops::Range<u32>,
    },
}

/// A draw call together with the pass and pipeline it was issued in
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub pass: Option<String>,
    pub pipeline: Option<RenderPipelineHandle>,
    pub indexed: bool,
    pub range: std::ops::Range<u32>,
}

/// Recording GPU backend.
#[derive(Debug)]
pub struct RecordingBackend {
    width: u32,
    height: u32,
    format: TextureFormat,
    next_id: u64,
    swapchain_view: Option<TextureViewHandle>,
    in_pass: bool,

    buffers: HashMap<u64, BufferDescriptor>,
    textures: HashMap<u64, TextureDescriptor>,
    views: HashMap<u64, u64>,
    samplers: HashSet<u64>,
    layouts: HashMap<u64, Vec<BindGroupLayoutEntry>>,
    bind_groups: HashSet<u64>,
    pipelines: HashMap<u64, RenderPipelineDescriptor>,

    float_targets: bool,
    fail_labels: Vec<String>,
    commands: Vec<Command>,
    frames_presented: u32,
}

impl RecordingBackend {
    /// Create a new recording backend with the given surface size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            format: TextureFormat::Bgra8UnormSrgb,
            next_id: 1,
            swapchain_view: None,
            in_pass: false,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            views: HashMap::new(),
            samplers: HashSet::new(),
            layouts: HashMap::new(),
            bind_groups: HashSet::new(),
            pipelines: HashMap::new(),
            float_targets: true,
            fail_labels: Vec::new(),
            commands: Vec::new(),
            frames_presented: 0,
        }
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Recording Backend"
    }

    /// Make every creation whose label contains `pattern` fail.
    pub fn fail_on_label(&mut self, pattern: impl Into<String>) {
        self.fail_labels.push(pattern.into());
    }

    /// Report float formats as unrenderable, like a WebGL2 device without float color buffers.
    pub fn without_float_targets(mut self) -> Self {
        self.float_targets = false;
        self
    }

    /// Stop injecting failures.
    pub fn clear_failures(&mut self) {
        self.fail_labels.clear();
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn frames_presented(&self) -> u32 {
        self.frames_presented
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    pub fn buffer_descriptor(&self, buffer: BufferHandle) -> Option<&BufferDescriptor> {
        self.buffers.get(&buffer.0)
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    pub fn pipeline_descriptor(
        &self,
        pipeline: RenderPipelineHandle,
    ) -> Option<&RenderPipelineDescriptor> {
        self.pipelines.get(&pipeline.0)
    }

    /// Count of buffer creations carrying `label`
    pub fn buffers_labelled(&self, label: &str) -> usize {
        self.buffers
            .values()
            .filter(|d| d.label.as_deref() == Some(label))
            .count()
    }

    /// All draw calls recorded so far, annotated with pass label and pipeline.
    pub fn draws(&self) -> Vec<RecordedDraw> {
        let mut pass = None;
        let mut pipeline = None;
        let mut draws = Vec::new();

        for command in &self.commands {
            match command {
                Command::BeginPass(desc) => {
                    pass = desc.label.clone();
                    pipeline = None;
                }
                Command::EndPass => pass = None,
                Command::SetPipeline(handle) => pipeline = Some(*handle),
                Command::Draw { vertices, .. } => draws.push(RecordedDraw {
                    pass: pass.clone(),
                    pipeline,
                    indexed: false,
                    range: vertices.clone(),
                }),
                Command::DrawIndexed { indices, .. } => draws.push(RecordedDraw {
                    pass: pass.clone(),
                    pipeline,
                    indexed: true,
                    range: indices.clone(),
                }),
                _ => {}
            }
        }

        draws
    }

    /// Labels of every render pass begun, in order.
    pub fn pass_labels(&self) -> Vec<String> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::BeginPass(desc) => Some(desc.label.clone().unwrap_or_default()),
                _ => None,
            })
            .collect()
    }

    /// Descriptors of every render pass begun, in order.
    pub fn passes(&self) -> Vec<&RenderPassDescriptor> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::BeginPass(desc) => Some(desc),
                _ => None,
            })
            .collect()
    }

    fn alloc(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn should_fail(&self, label: Option<&str>) -> bool {
        let Some(label) = label else {
            return false;
        };
        self.fail_labels.iter().any(|p| label.contains(p.as_str()))
    }

    fn record(&mut self, command: Command) {
        log::trace!("RecordingBackend: {:?}", command);
        self.commands.push(command);
    }

    fn record_in_pass(&mut self, command: Command) {
        if self.in_pass {
            self.record(command);
        } else {
            log::warn!("RecordingBackend: {:?} issued outside a render pass", command);
        }
    }
}

impl GraphicsBackend for RecordingBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        let view = TextureViewHandle(self.alloc());
        self.swapchain_view = Some(view);
        self.record(Command::BeginFrame);
        Ok(FrameContext {
            swapchain_view: view,
            width: self.width,
            height: self.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.swapchain_view = None;
        self.frames_presented += 1;
        self.record(Command::EndFrame);
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        self.format
    }

    fn supports_render_format(&self, format: TextureFormat) -> bool {
        match format {
            TextureFormat::Rgba16Float | TextureFormat::Rgba32Float | TextureFormat::R32Float | TextureFormat::Rg32Float => {
                self.float_targets
            }
            _ => true,
        }
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!(
            "RecordingBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        if desc.size == 0 || self.should_fail(desc.label.as_deref()) {
            return Err(BackendError::BufferCreationFailed(format!(
                "{:?} (size {})",
                desc.label, desc.size
            )));
        }
        let id = self.alloc();
        self.buffers.insert(id, desc.clone());
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let desc = BufferDescriptor {
            size: data.len() as u64,
            ..desc.clone()
        };
        self.create_buffer(&desc)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if self.buffers.contains_key(&buffer.0) {
            self.record(Command::WriteBuffer {
                buffer,
                offset,
                size: data.len() as u64,
            });
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        log::trace!(
            "RecordingBackend: creating texture {:?} ({}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.dimension
        );
        let square = desc.dimension != TextureDimension::Cube || desc.width == desc.height;
        if desc.width == 0 || desc.height == 0 || !square || self.should_fail(desc.label.as_deref()) {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} ({}x{})",
                desc.label, desc.width, desc.height
            )));
        }
        let id = self.alloc();
        self.textures.insert(id, desc.clone());
        Ok(TextureHandle(id))
    }

    fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle> {
        let tex = self
            .textures
            .get(&texture.0)
            .ok_or_else(|| BackendError::ResourceNotFound(format!("texture {}", texture.0)))?;
        let layers = tex.dimension.layer_count();
        if desc.base_array_layer + desc.array_layer_count > layers {
            return Err(BackendError::TextureCreationFailed(format!(
                "view layers {}..{} out of range",
                desc.base_array_layer,
                desc.base_array_layer + desc.array_layer_count
            )));
        }
        let id = self.alloc();
        self.views.insert(id, texture.0);
        Ok(TextureViewHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, layer: u32, _data: &[u8], _width: u32, _height: u32) {
        if self.textures.contains_key(&texture.0) {
            self.record(Command::WriteTexture { texture, layer });
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("RecordingBackend: creating sampler {:?}", desc.label);
        let id = self.alloc();
        self.samplers.insert(id);
        Ok(SamplerHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let id = self.alloc();
        self.layouts.insert(id, entries.to_vec());
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let layout_entries = self
            .layouts
            .get(&layout.0)
            .ok_or_else(|| BackendError::ResourceNotFound(format!("layout {}", layout.0)))?;
        if layout_entries.len() != entries.len() {
            return Err(BackendError::BindGroupCreationFailed(format!(
                "layout expects {} entries, got {}",
                layout_entries.len(),
                entries.len()
            )));
        }
        for (binding, entry) in entries {
            let known = match entry {
                BindGroupEntry::Buffer { buffer, .. } => self.buffers.contains_key(&buffer.0),
                BindGroupEntry::Texture(view) => self.views.contains_key(&view.0),
                BindGroupEntry::Sampler(sampler) => self.samplers.contains(&sampler.0),
            };
            if !known {
                return Err(BackendError::BindGroupCreationFailed(format!(
                    "binding {} references a destroyed resource",
                    binding
                )));
            }
        }
        let id = self.alloc();
        self.bind_groups.insert(id);
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        log::trace!("RecordingBackend: creating pipeline {:?}", desc.label);
        if self.should_fail(desc.label.as_deref()) {
            return Err(BackendError::PipelineCreationFailed(format!("{:?}", desc.label)));
        }
        let id = self.alloc();
        self.pipelines.insert(id, desc.clone());
        Ok(RenderPipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.in_pass = true;
        self.record(Command::BeginPass(desc.clone()));
    }

    fn end_render_pass(&mut self) {
        if self.in_pass {
            self.in_pass = false;
            self.record(Command::EndPass);
        }
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.record_in_pass(Command::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        self.record_in_pass(Command::SetBindGroup { index, bind_group });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        self.record_in_pass(Command::SetVertexBuffer { slot, buffer, offset });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        self.record_in_pass(Command::SetIndexBuffer { buffer, offset, format });
    }

    fn set_viewport(&mut self, _x: f32, _y: f32, width: f32, height: f32, _min_depth: f32, _max_depth: f32) {
        self.record_in_pass(Command::SetViewport { width, height });
    }

    fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>) {
        self.record_in_pass(Command::Draw { vertices, instances });
    }

    fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        base_vertex: i32,
        instances: std::ops::Range<u32>,
    ) {
        self.record_in_pass(Command::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
        self.views.retain(|_, owner| *owner != texture.0);
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        self.views.remove(&view.0);
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        self.bind_groups.remove(&bind_group.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_desc(label: &str, size: u64) -> BufferDescriptor {
        BufferDescriptor {
            label: Some(label.into()),
            size,
            usage: BufferUsage::VERTEX,
            mapped_at_creation: false,
        }
    }

    #[test]
    fn test_zero_sized_buffer_fails() {
        let mut backend = RecordingBackend::new(64, 64);
        assert!(backend.create_buffer(&buffer_desc("empty", 0)).is_err());
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_label_failure_injection() {
        let mut backend = RecordingBackend::new(64, 64);
        backend.fail_on_label("broken");
        assert!(backend.create_buffer(&buffer_desc("broken mesh", 16)).is_err());
        assert!(backend.create_buffer(&buffer_desc("fine mesh", 16)).is_ok());
        backend.clear_failures();
        assert!(backend.create_buffer(&buffer_desc("broken mesh", 16)).is_ok());
    }

    #[test]
    fn test_draws_outside_pass_are_dropped() {
        let mut backend = RecordingBackend::new(64, 64);
        backend.draw(0..3, 0..1);
        assert!(backend.draws().is_empty());

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Main".into()),
            color_attachments: vec![],
            depth_stencil_attachment: None,
        });
        backend.draw(0..3, 0..1);
        backend.end_render_pass();

        let draws = backend.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].pass.as_deref(), Some("Main"));
    }

    #[test]
    fn test_destroying_texture_invalidates_views() {
        let mut backend = RecordingBackend::new(64, 64);
        let texture = backend
            .create_texture(&TextureDescriptor::default())
            .unwrap();
        let view = backend
            .create_texture_view(texture, &TextureViewDescriptor::default())
            .unwrap();
        let layout = backend
            .create_bind_group_layout(&[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::texture_2d(),
            }])
            .unwrap();

        backend.destroy_texture(texture);
        assert!(backend
            .create_bind_group(layout, &[(0, BindGroupEntry::Texture(view))])
            .is_err());
    }

    #[test]
    fn test_cube_view_layer_range() {
        let mut backend = RecordingBackend::new(64, 64);
        let cube = backend
            .create_texture(&TextureDescriptor {
                width: 32,
                height: 32,
                dimension: TextureDimension::Cube,
                ..Default::default()
            })
            .unwrap();
        assert!(backend
            .create_texture_view(cube, &TextureViewDescriptor::layer(5))
            .is_ok());
        assert!(backend
            .create_texture_view(cube, &TextureViewDescriptor::layer(6))
            .is_err());
    }
}
