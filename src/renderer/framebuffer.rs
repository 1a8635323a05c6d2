//! Frame materialization and binding
//!
//! A [`GpuFrame`] is the GPU-side image of a [`Frame`]: which attachment sits
//! at which location, and the frame version it was built from. Views are not
//! stored; they are resolved through the texture cache every time the frame is
//! bound, so a re-uploaded texture is picked up without re-materializing.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::renderer::gpu::GpuResources;
use crate::renderer::{RenderError, RenderTarget};
use crate::resources::{Assets, Attachment, Frame, FrameId};

/// Materialized frame
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GpuFrame {
    pub synced_version: u64,
    /// Index is the attachment location; `None` is an undeclared draw buffer
    pub color: Vec<Option<Attachment>>,
    pub depth_stencil: Option<Attachment>,
    pub width: u32,
    pub height: u32,
}

/// What a bound target looks like to pipelines
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TargetInfo {
    pub color_formats: Vec<Option<TextureFormat>>,
    pub depth_format: Option<TextureFormat>,
    pub width: u32,
    pub height: u32,
}

/// Options of a pass bound through [`GpuResources::begin_target`]
#[derive(Debug, Clone, Copy)]
pub(crate) struct PassOptions<'a> {
    pub label: &'a str,
    /// Bind the depth-stencil attachment
    pub depth: bool,
}

impl GpuResources {
    /// Materialize `id`, recording its current version as synced
    ///
    /// Every attachment texture must upload; if one fails nothing is recorded
    /// and the previous materialization (if any) stays in place. Color
    /// attachments at or beyond `max_attachments` are reported and dropped.
    pub(crate) fn materialize<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        assets: &Assets,
        id: FrameId,
        max_attachments: u32,
    ) -> Result<(), RenderError> {
        let frame = assets
            .frame(id)
            .ok_or_else(|| RenderError::MissingAsset(format!("frame {:?}", id)))?;

        for texture in frame.textures() {
            self.texture(backend, assets, texture)?;
        }

        let mut color: Vec<Option<Attachment>> = Vec::new();
        for (location, attachment) in frame.color_attachments() {
            if location >= max_attachments {
                log::error!(
                    "Frame '{}': color attachment {} is beyond the maximum of {}, skipped",
                    frame.name(),
                    location,
                    max_attachments
                );
                continue;
            }
            let location = location as usize;
            if color.len() <= location {
                color.resize(location + 1, None);
            }
            color[location] = Some(attachment);
        }

        let materialized = GpuFrame {
            synced_version: frame.version(),
            color,
            depth_stencil: frame.depth_stencil(),
            width: frame.width(),
            height: frame.height(),
        };
        log::debug!("Materialized frame '{}' at version {}", frame.name(), frame.version());
        self.frames.insert(id, materialized);
        Ok(())
    }

    /// Version of `id` last materialized, if any
    pub(crate) fn synced_version(&self, id: FrameId) -> Option<u64> {
        self.frames.get(&id).map(|f| f.synced_version)
    }

    /// Bind `target` and begin a render pass on it
    ///
    /// A frame whose version moved past the synced one is re-materialized
    /// first. On error no pass has been started.
    pub(crate) fn begin_target<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        assets: &Assets,
        target: RenderTarget,
        backbuffer_depth: Option<FrameId>,
        max_attachments: u32,
        options: PassOptions,
    ) -> Result<TargetInfo, RenderError> {
        let (desc, info) = match target {
            RenderTarget::Frame(id) => self.frame_pass(backend, assets, id, max_attachments, options)?,
            RenderTarget::Backbuffer => {
                self.backbuffer_pass(backend, assets, backbuffer_depth, max_attachments, options)?
            }
        };

        backend.begin_render_pass(&desc);
        backend.set_viewport(0.0, 0.0, info.width as f32, info.height as f32, 0.0, 1.0);
        Ok(info)
    }

    fn sync_frame<'a, B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        assets: &'a Assets,
        id: FrameId,
        max_attachments: u32,
    ) -> Result<(&'a Frame, GpuFrame), RenderError> {
        let frame = assets
            .frame(id)
            .ok_or_else(|| RenderError::MissingAsset(format!("frame {:?}", id)))?;
        if self.synced_version(id) != Some(frame.version()) {
            self.materialize(backend, assets, id, max_attachments)?;
        }
        let gpu = self
            .frames
            .get(&id)
            .cloned()
            .ok_or_else(|| RenderError::MissingAsset(format!("frame {:?}", id)))?;
        Ok((frame, gpu))
    }

    fn frame_pass<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        assets: &Assets,
        id: FrameId,
        max_attachments: u32,
        options: PassOptions,
    ) -> Result<(RenderPassDescriptor, TargetInfo), RenderError> {
        let (frame, gpu) = self.sync_frame(backend, assets, id, max_attachments)?;
        let clear = frame.clear_state();

        let mut color_attachments = Vec::with_capacity(gpu.color.len());
        let mut color_formats = Vec::with_capacity(gpu.color.len());
        for attachment in &gpu.color {
            match attachment {
                Some(attachment) => {
                    let view = self.attachment_view(backend, assets, *attachment)?;
                    color_attachments.push(Some(ColorAttachment {
                        view,
                        load_op: clear.color.map_or(LoadOp::Load, LoadOp::Clear),
                        store_op: StoreOp::Store,
                    }));
                    color_formats.push(Some(attachment_format(assets, *attachment)?));
                }
                None => {
                    color_attachments.push(None);
                    color_formats.push(None);
                }
            }
        }

        let (depth_stencil_attachment, depth_format) = match gpu.depth_stencil.filter(|_| options.depth) {
            Some(attachment) => {
                let view = self.attachment_view(backend, assets, attachment)?;
                let format = attachment_format(assets, attachment)?;
                (Some(depth_attachment(view, format, clear.depth, clear.stencil)), Some(format))
            }
            None => (None, None),
        };

        let desc = RenderPassDescriptor {
            label: Some(format!("{} ({})", options.label, frame.name())),
            color_attachments,
            depth_stencil_attachment,
        };
        let info = TargetInfo {
            color_formats,
            depth_format,
            width: gpu.width,
            height: gpu.height,
        };
        Ok((desc, info))
    }

    fn backbuffer_pass<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        assets: &Assets,
        depth: Option<FrameId>,
        max_attachments: u32,
        options: PassOptions,
    ) -> Result<(RenderPassDescriptor, TargetInfo), RenderError> {
        let swapchain = self.swapchain.ok_or(RenderError::NotInitialized)?;

        // The backbuffer frame only carries depth and the clear state
        let mut clear_color = Some([0.0, 0.0, 0.0, 1.0]);
        let mut depth_stencil_attachment = None;
        let mut depth_format = None;
        if let Some(id) = depth {
            let (frame, gpu) = self.sync_frame(backend, assets, id, max_attachments)?;
            let clear = frame.clear_state();
            clear_color = clear.color;
            if let Some(attachment) = gpu.depth_stencil.filter(|_| options.depth) {
                let view = self.attachment_view(backend, assets, attachment)?;
                let format = attachment_format(assets, attachment)?;
                depth_stencil_attachment = Some(depth_attachment(view, format, clear.depth, clear.stencil));
                depth_format = Some(format);
            }
        }

        let desc = RenderPassDescriptor {
            label: Some(format!("{} (backbuffer)", options.label)),
            color_attachments: vec![Some(ColorAttachment {
                view: swapchain.swapchain_view,
                load_op: clear_color.map_or(LoadOp::Load, LoadOp::Clear),
                store_op: StoreOp::Store,
            })],
            depth_stencil_attachment,
        };
        let info = TargetInfo {
            color_formats: vec![Some(backend.swapchain_format())],
            depth_format,
            width: swapchain.width,
            height: swapchain.height,
        };
        Ok((desc, info))
    }
}

fn attachment_format(assets: &Assets, attachment: Attachment) -> Result<TextureFormat, RenderError> {
    assets
        .texture(attachment.texture)
        .map(|t| t.format())
        .ok_or_else(|| RenderError::MissingAsset(format!("texture {:?}", attachment.texture)))
}

fn depth_attachment(
    view: TextureViewHandle,
    format: TextureFormat,
    depth: Option<f32>,
    stencil: Option<u32>,
) -> DepthStencilAttachment {
    DepthStencilAttachment {
        view,
        depth_load_op: depth.map_or(LoadOp::Load, |d| LoadOp::Clear([d, 0.0, 0.0, 0.0])),
        depth_store_op: StoreOp::Store,
        depth_clear_value: depth.unwrap_or(1.0),
        stencil_clear_value: if format.has_stencil() { stencil } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingBackend;
    use crate::resources::{AttachmentSlot, Texture};

    fn color_texture(assets: &mut Assets, name: &str) -> crate::resources::TextureId {
        assets.add_texture(Texture::new_2d(name, 16, 16, TextureFormat::Rgba8Unorm))
    }

    fn setup() -> (RecordingBackend, GpuResources, Assets) {
        let mut backend = RecordingBackend::new(16, 16);
        let mut gpu = GpuResources::new();
        gpu.init(&mut backend).unwrap();
        (backend, gpu, Assets::new())
    }

    #[test]
    fn test_synced_version_follows_frame() {
        let (mut backend, mut gpu, mut assets) = setup();
        let texture = color_texture(&mut assets, "color");
        let mut frame = Frame::new("target", 16, 16);
        frame.set_texture(AttachmentSlot::Color(0), texture);
        let id = assets.add_frame(frame);

        gpu.materialize(&mut backend, &assets, id, 8).unwrap();
        let version = assets.frame(id).unwrap().version();
        assert_eq!(gpu.synced_version(id), Some(version));

        let other = color_texture(&mut assets, "other");
        assets.frame_mut(id).unwrap().set_texture(AttachmentSlot::Color(1), other);
        assert!(gpu.synced_version(id) < Some(assets.frame(id).unwrap().version()));
    }

    #[test]
    fn test_attachment_beyond_limit_is_dropped() {
        let (mut backend, mut gpu, mut assets) = setup();
        let low = color_texture(&mut assets, "low");
        let high = color_texture(&mut assets, "high");
        let mut frame = Frame::new("target", 16, 16);
        frame.set_texture(AttachmentSlot::Color(0), low);
        frame.set_texture(AttachmentSlot::Color(2), high);
        let id = assets.add_frame(frame);

        gpu.materialize(&mut backend, &assets, id, 2).unwrap();
        let gpu_frame = &gpu.frames[&id];
        assert_eq!(gpu_frame.color.len(), 1);
        assert_eq!(gpu_frame.color[0].map(|a| a.texture), Some(low));
    }

    #[test]
    fn test_failed_attachment_fails_materialization() {
        let (mut backend, mut gpu, mut assets) = setup();
        let texture = color_texture(&mut assets, "broken");
        let mut frame = Frame::new("target", 16, 16);
        frame.set_texture(AttachmentSlot::Color(0), texture);
        let id = assets.add_frame(frame);

        backend.fail_on_label("broken");
        assert!(gpu.materialize(&mut backend, &assets, id, 8).is_err());
        assert_eq!(gpu.synced_version(id), None);
    }

    #[test]
    fn test_gaps_become_undeclared_draw_buffers() {
        let (mut backend, mut gpu, mut assets) = setup();
        let texture = color_texture(&mut assets, "second");
        let mut frame = Frame::new("target", 16, 16);
        frame.set_texture(AttachmentSlot::Color(1), texture);
        let id = assets.add_frame(frame);

        let swapchain = backend.begin_frame().unwrap();
        gpu.begin_frame(swapchain);
        let info = gpu
            .begin_target(
                &mut backend,
                &assets,
                RenderTarget::Frame(id),
                None,
                8,
                PassOptions {
                    label: "Test",
                    depth: true,
                },
            )
            .unwrap();
        assert_eq!(info.color_formats, vec![None, Some(TextureFormat::Rgba8Unorm)]);
        let pass = backend.passes()[0].clone();
        assert!(pass.color_attachments[0].is_none());
        assert!(pass.depth_stencil_attachment.is_none());
    }

    #[test]
    fn test_cube_face_attachment_uses_layer_view() {
        let (mut backend, mut gpu, mut assets) = setup();
        let cube = assets.add_texture(Texture::cube("env", 8, TextureFormat::Rgba8Unorm));
        let mut frame = Frame::new("face", 8, 8);
        frame.set_texture_layer(AttachmentSlot::Color(0), cube, 3);
        let id = assets.add_frame(frame);

        let swapchain = backend.begin_frame().unwrap();
        gpu.begin_frame(swapchain);
        gpu.begin_target(
            &mut backend,
            &assets,
            RenderTarget::Frame(id),
            None,
            8,
            PassOptions {
                label: "Face",
                depth: false,
            },
        )
        .unwrap();
        let (sampled, _) = gpu.texture(&mut backend, &assets, cube).unwrap();
        let face = backend.passes()[0].color_attachments[0].as_ref().unwrap().view;
        assert_ne!(face, sampled);
    }
}
