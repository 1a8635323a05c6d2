//! Uniform layouts shared with the WGSL sources and the pools that hold them
//!
//! Buffer writes are queued and land before the frame's commands run, so a
//! buffer written twice in one frame would only show its last contents. Every
//! view, draw and post pass therefore takes its own slot from a pool that is
//! rewound at the start of each frame.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::scene::{Camera, MAX_JOINTS};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use std::collections::HashMap;
use std::hash::Hash;

/// `Camera` in `common.wgsl`
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ViewUniform {
    pub view_proj: Mat4,
    pub view: Mat4,
    pub position: Vec4,
    /// x: near, y: far
    pub clip: Vec4,
    /// Direction towards the light
    pub light_direction: Vec4,
    /// rgb: color, a: intensity
    pub light_color: Vec4,
    pub ambient: Vec4,
}

impl ViewUniform {
    pub fn from_camera(camera: &Camera, light: &MainLight, ambient: Vec3) -> Self {
        let (near, far) = camera.clip_range();
        Self {
            view_proj: camera.view_projection(),
            view: camera.view_matrix(),
            position: camera.eye.extend(1.0),
            clip: Vec4::new(near, far, 0.0, 0.0),
            light_direction: light.direction.extend(0.0),
            light_color: light.color.extend(light.intensity),
            ambient: ambient.extend(1.0),
        }
    }

    /// View used to render a shadow map
    pub fn from_light(view_proj: Mat4, near: f32, far: f32) -> Self {
        Self {
            view_proj,
            view: Mat4::IDENTITY,
            position: Vec4::W,
            clip: Vec4::new(near, far, 0.0, 0.0),
            light_direction: Vec4::ZERO,
            light_color: Vec4::ZERO,
            ambient: Vec4::ZERO,
        }
    }
}

/// Light that shades the main pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MainLight {
    /// Direction towards the light
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for MainLight {
    fn default() -> Self {
        Self {
            direction: Vec3::ONE.normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// `Shadow` in `shadow.wgsl`
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ShadowUniform {
    pub light_view_proj: Mat4,
    /// x: bias, y: darkness, w: enabled
    pub params: Vec4,
}

impl ShadowUniform {
    pub fn new(light_view_proj: Mat4, bias: f32, darkness: f32) -> Self {
        Self {
            light_view_proj,
            params: Vec4::new(bias, darkness, 0.0, 1.0),
        }
    }

    pub fn disabled() -> Self {
        Self {
            light_view_proj: Mat4::IDENTITY,
            params: Vec4::ZERO,
        }
    }
}

/// `ObjectData` in `common.wgsl`
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: Mat4,
    pub normal_matrix: Mat4,
    pub joints: [Mat4; MAX_JOINTS],
}

impl ObjectUniform {
    pub fn new(model: Mat4, joints: Option<&[Mat4]>) -> Self {
        let mut uniform = Self {
            model,
            normal_matrix: model.inverse().transpose(),
            joints: [Mat4::IDENTITY; MAX_JOINTS],
        };
        if let Some(joints) = joints {
            for (slot, joint) in uniform.joints.iter_mut().zip(joints) {
                *slot = *joint;
            }
        }
        uniform
    }
}

/// `Post` in `post.wgsl`
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PostUniform {
    /// xy: 1 / target size, zw: target size
    pub texel: Vec4,
    pub params: Vec4,
    pub inv_view_proj: Mat4,
    pub light_direction: Vec4,
    pub light_color: Vec4,
    pub ambient: Vec4,
}

impl PostUniform {
    pub fn new(view: &ViewUniform, width: u32, height: u32, params: Vec4) -> Self {
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        Self {
            texel: Vec4::new(1.0 / w, 1.0 / h, w, h),
            params,
            inv_view_proj: view.view_proj.inverse(),
            light_direction: view.light_direction,
            light_color: view.light_color,
            ambient: view.ambient,
        }
    }
}

/// Uniform buffers handed out one per use and rewound every frame
pub(crate) struct UniformPool {
    label: &'static str,
    size: u64,
    buffers: Vec<BufferHandle>,
    cursor: usize,
}

impl UniformPool {
    pub(crate) fn new<T: Pod>(label: &'static str) -> Self {
        Self {
            label,
            size: std::mem::size_of::<T>() as u64,
            buffers: Vec::new(),
            cursor: 0,
        }
    }

    pub(crate) fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Write `value` into the next free slot, growing the pool as needed
    pub(crate) fn push<B: GraphicsBackend, T: Pod>(
        &mut self,
        backend: &mut B,
        value: &T,
    ) -> BackendResult<(usize, BufferHandle)> {
        let slot = self.cursor;
        if slot == self.buffers.len() {
            let buffer = backend.create_buffer(&BufferDescriptor {
                label: Some(format!("{} {}", self.label, slot)),
                size: self.size,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
                mapped_at_creation: false,
            })?;
            self.buffers.push(buffer);
        }
        let buffer = self.buffers[slot];
        backend.write_buffer(buffer, 0, bytemuck::bytes_of(value));
        self.cursor += 1;
        Ok((slot, buffer))
    }

    pub(crate) fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for buffer in self.buffers.drain(..) {
            backend.destroy_buffer(buffer);
        }
        self.cursor = 0;
    }
}

/// Bind groups keyed by their owner, recreated whenever the bound resources change
pub(crate) struct BindGroupCache<K> {
    groups: HashMap<K, (Vec<(u32, BindGroupEntry)>, BindGroupHandle)>,
}

impl<K> Default for BindGroupCache<K> {
    fn default() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }
}

impl<K: Hash + Eq> BindGroupCache<K> {
    pub(crate) fn get_or_create<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        key: K,
        layout: BindGroupLayoutHandle,
        entries: Vec<(u32, BindGroupEntry)>,
    ) -> BackendResult<BindGroupHandle> {
        if let Some((bound, group)) = self.groups.get(&key) {
            if *bound == entries {
                return Ok(*group);
            }
        }
        let group = backend.create_bind_group(layout, &entries)?;
        if let Some((_, old)) = self.groups.insert(key, (entries, group)) {
            backend.destroy_bind_group(old);
        }
        Ok(group)
    }

    pub(crate) fn remove_where<B: GraphicsBackend>(&mut self, backend: &mut B, mut matches: impl FnMut(&K) -> bool) {
        self.groups.retain(|key, (_, group)| {
            if matches(key) {
                backend.destroy_bind_group(*group);
                false
            } else {
                true
            }
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingBackend;

    #[test]
    fn test_uniform_layout_sizes() {
        assert_eq!(std::mem::size_of::<ViewUniform>(), 64 * 2 + 16 * 5);
        assert_eq!(std::mem::size_of::<ShadowUniform>(), 80);
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 64 * (2 + MAX_JOINTS));
        assert_eq!(std::mem::size_of::<PostUniform>(), 16 * 2 + 64 + 16 * 3);
    }

    #[test]
    fn test_pool_reuses_buffers_after_rewind() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut pool = UniformPool::new::<ShadowUniform>("shadow");

        let (a, first) = pool.push(&mut backend, &ShadowUniform::disabled()).unwrap();
        let (b, second) = pool.push(&mut backend, &ShadowUniform::disabled()).unwrap();
        assert_eq!((a, b), (0, 1));
        assert_ne!(first, second);

        pool.rewind();
        let (_, again) = pool.push(&mut backend, &ShadowUniform::disabled()).unwrap();
        assert_eq!(again, first);
        assert_eq!(backend.live_buffers(), 2);
    }

    #[test]
    fn test_joints_are_copied_up_to_the_limit() {
        let joints: Vec<Mat4> = (0..MAX_JOINTS + 4)
            .map(|i| Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0)))
            .collect();
        let uniform = ObjectUniform::new(Mat4::IDENTITY, Some(&joints));
        for (i, joint) in uniform.joints.iter().enumerate() {
            assert_eq!(*joint, joints[i], "joint {}", i);
        }

        let short = [Mat4::from_scale(Vec3::splat(2.0))];
        let uniform = ObjectUniform::new(Mat4::IDENTITY, Some(&short));
        assert_eq!(uniform.joints[0], short[0]);
        assert!(uniform.joints[1..].iter().all(|j| *j == Mat4::IDENTITY));
    }
}
