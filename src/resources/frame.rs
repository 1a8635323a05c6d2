//! Render targets
//!
//! A [`Frame`] names the textures a pass renders into. It never touches the GPU;
//! the renderer materializes it and rebuilds that materialization whenever the
//! frame's version moves past the synced one.

use crate::resources::TextureId;
use std::collections::BTreeMap;

/// Attachment point of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachmentSlot {
    /// Color attachment at a shader output location
    Color(u32),
    DepthStencil,
}

/// A texture bound to a slot, with the layer used for cube faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attachment {
    pub texture: TextureId,
    pub layer: u32,
}

/// What a pass clears when the frame is bound
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearState {
    /// `None` loads the previous color contents
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
    pub stencil: Option<u32>,
}

impl Default for ClearState {
    fn default() -> Self {
        Self {
            color: Some([0.0, 0.0, 0.0, 1.0]),
            depth: Some(1.0),
            stencil: Some(0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    name: String,
    color: BTreeMap<u32, Attachment>,
    depth_stencil: Option<Attachment>,
    width: u32,
    height: u32,
    clear: ClearState,
    version: u64,
}

impl Frame {
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            color: BTreeMap::new(),
            depth_stencil: None,
            width,
            height,
            clear: ClearState::default(),
            version: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Increases on every attachment or size change
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn clear_state(&self) -> ClearState {
        self.clear
    }

    /// Attach a texture; replaces whatever the slot held
    pub fn set_texture(&mut self, slot: AttachmentSlot, texture: TextureId) {
        self.set_texture_layer(slot, texture, 0);
    }

    /// Attach one layer of a texture, e.g. a cube face
    pub fn set_texture_layer(&mut self, slot: AttachmentSlot, texture: TextureId, layer: u32) {
        let attachment = Attachment { texture, layer };
        match slot {
            AttachmentSlot::Color(location) => {
                self.color.insert(location, attachment);
            }
            AttachmentSlot::DepthStencil => self.depth_stencil = Some(attachment),
        }
        self.version += 1;
    }

    pub fn remove_texture(&mut self, slot: AttachmentSlot) -> Option<Attachment> {
        let removed = match slot {
            AttachmentSlot::Color(location) => self.color.remove(&location),
            AttachmentSlot::DepthStencil => self.depth_stencil.take(),
        };
        if removed.is_some() {
            self.version += 1;
        }
        removed
    }

    pub fn texture(&self, slot: AttachmentSlot) -> Option<Attachment> {
        match slot {
            AttachmentSlot::Color(location) => self.color.get(&location).copied(),
            AttachmentSlot::DepthStencil => self.depth_stencil,
        }
    }

    /// Color attachments ordered by location
    pub fn color_attachments(&self) -> impl Iterator<Item = (u32, Attachment)> + '_ {
        self.color.iter().map(|(location, a)| (*location, *a))
    }

    pub fn depth_stencil(&self) -> Option<Attachment> {
        self.depth_stencil
    }

    pub fn references(&self, texture: TextureId) -> bool {
        self.depth_stencil.map(|a| a.texture) == Some(texture)
            || self.color.values().any(|a| a.texture == texture)
    }

    pub fn textures(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.color
            .values()
            .chain(self.depth_stencil.iter())
            .map(|a| a.texture)
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear.color = Some(color);
    }

    pub fn set_clear_depth(&mut self, depth: f32) {
        self.clear.depth = Some(depth);
    }

    pub fn set_clear_stencil(&mut self, stencil: u32) {
        self.clear.stencil = Some(stencil);
    }

    /// Keep previous contents when the frame is bound
    pub fn disable_clear(&mut self) {
        self.clear = ClearState {
            color: None,
            depth: None,
            stencil: None,
        };
    }

    /// Record a new size; attached textures are resized through `Assets::resize_frame`
    pub(crate) fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.version += 1;
    }

    /// Mark attachments changed without touching the attachment map
    pub(crate) fn touch(&mut self) {
        self.version += 1;
    }
}
