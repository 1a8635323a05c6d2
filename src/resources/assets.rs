//! Asset storage with generational handles
//!
//! Geometries, materials, textures and frames live in typed arenas. A handle is
//! a slot index plus the generation the slot had when the value was inserted, so
//! a handle to a removed value never resolves to whatever reuses its slot.

use crate::resources::{Frame, Geometry, Material, Texture};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Stable identifier of a value stored in [`Assets`]
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.index, self.generation).cmp(&(other.index, other.generation))
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

pub type GeometryId = Handle<Geometry>;
pub type MaterialId = Handle<Material>;
pub type TextureId = Handle<Texture>;
pub type FrameId = Handle<Frame>;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot arena handing out generational handles
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> Arena<T> {
    pub fn insert(&mut self, value: T) -> Handle<T> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.value = Some(value);
            return Handle::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle::new(index, 0)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.value.as_mut())
    }

    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)?;
        let value = slot.value.take()?;
        self.free.push(handle.index);
        Some(value)
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value
                .as_ref()
                .map(|v| (Handle::new(i as u32, s.generation), v))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            let generation = s.generation;
            s.value
                .as_mut()
                .map(|v| (Handle::new(i as u32, generation), v))
        })
    }
}

/// All CPU-side rendering resources
///
/// Removing a value does not release its GPU state; call the matching
/// `Renderer::release_*` for that.
#[derive(Default)]
pub struct Assets {
    pub geometries: Arena<Geometry>,
    pub materials: Arena<Material>,
    pub textures: Arena<Texture>,
    pub frames: Arena<Frame>,
}

impl Assets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryId {
        self.geometries.insert(geometry)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.insert(material)
    }

    pub fn add_texture(&mut self, texture: Texture) -> TextureId {
        self.textures.insert(texture)
    }

    pub fn add_frame(&mut self, frame: Frame) -> FrameId {
        self.frames.insert(frame)
    }

    pub fn geometry(&self, id: GeometryId) -> Option<&Geometry> {
        self.geometries.get(id)
    }

    pub fn geometry_mut(&mut self, id: GeometryId) -> Option<&mut Geometry> {
        self.geometries.get_mut(id)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(id)
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id)
    }

    pub fn texture_mut(&mut self, id: TextureId) -> Option<&mut Texture> {
        self.textures.get_mut(id)
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id)
    }

    pub fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(id)
    }

    pub fn remove_geometry(&mut self, id: GeometryId) -> Option<Geometry> {
        self.geometries.remove(id)
    }

    pub fn remove_material(&mut self, id: MaterialId) -> Option<Material> {
        self.materials.remove(id)
    }

    pub fn remove_texture(&mut self, id: TextureId) -> Option<Texture> {
        self.textures.remove(id)
    }

    pub fn remove_frame(&mut self, id: FrameId) -> Option<Frame> {
        self.frames.remove(id)
    }

    /// Resize a frame together with every texture attached to it
    ///
    /// Returns false when the frame does not exist.
    pub fn resize_frame(&mut self, id: FrameId, width: u32, height: u32) -> bool {
        let Some(frame) = self.frames.get_mut(id) else {
            return false;
        };
        let attached: Vec<TextureId> = frame.textures().collect();
        frame.set_size(width, height);

        for texture in attached {
            match self.textures.get_mut(texture) {
                Some(t) => t.resize(width, height),
                None => log::warn!("Frame attachment {:?} no longer exists", texture),
            }
        }
        true
    }

    /// Resize a texture and invalidate every frame that renders into it
    pub fn resize_texture(&mut self, id: TextureId, width: u32, height: u32) -> bool {
        let Some(texture) = self.textures.get_mut(id) else {
            return false;
        };
        texture.resize(width, height);
        for (_, frame) in self.frames.iter_mut() {
            if frame.references(id) {
                frame.touch();
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::TextureFormat;
    use crate::resources::AttachmentSlot;

    #[test]
    fn test_stale_handle_does_not_resolve() {
        let mut arena = Arena::default();
        let first = arena.insert("first");
        arena.remove(first);
        let second = arena.insert("second");

        assert_eq!(first.index(), second.index());
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.get(second), Some(&"second"));
        assert_eq!(arena.remove(first), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_resize_frame_resizes_attachments() {
        let mut assets = Assets::new();
        let color = assets.add_texture(Texture::new_2d("color", 4, 4, TextureFormat::Rgba8Unorm));
        let depth = assets.add_texture(Texture::new_2d("depth", 4, 4, TextureFormat::Depth24PlusStencil8));
        let mut frame = Frame::new("main", 4, 4);
        frame.set_texture(AttachmentSlot::Color(0), color);
        frame.set_texture(AttachmentSlot::DepthStencil, depth);
        let id = assets.add_frame(frame);
        let before = assets.frame(id).unwrap().version();

        assert!(assets.resize_frame(id, 16, 8));

        assert!(assets.frame(id).unwrap().version() > before);
        assert_eq!(assets.frame(id).unwrap().size(), (16, 8));
        assert_eq!(assets.texture(color).unwrap().width(), 16);
        assert_eq!(assets.texture(depth).unwrap().height(), 8);
    }

    #[test]
    fn test_resize_texture_invalidates_referencing_frames() {
        let mut assets = Assets::new();
        let shared = assets.add_texture(Texture::new_2d("shared", 4, 4, TextureFormat::Rgba8Unorm));
        let mut frame = Frame::new("uses", 4, 4);
        frame.set_texture(AttachmentSlot::Color(1), shared);
        let uses = assets.add_frame(frame);
        let other = assets.add_frame(Frame::new("other", 4, 4));

        assets.resize_texture(shared, 8, 8);

        assert_eq!(assets.frame(uses).unwrap().version(), 3);
        assert_eq!(assets.frame(other).unwrap().version(), 1);
    }
}
