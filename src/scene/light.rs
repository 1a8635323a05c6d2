//! Light types for the scene
//!
//! Lights are attached to scene nodes; their position comes from the node's
//! world transform. Spot and directional lights can own a [`ShadowSource`].

use crate::backend::types::{AddressMode, FilterMode, TextureFormat};
use crate::resources::{AttachmentSlot, Assets, Frame, FrameId, Texture, TextureId};
use glam::{Mat4, Vec3};

/// Default edge length of a shadow map
pub const DEFAULT_SHADOW_MAP_SIZE: u32 = 256;

/// Point light
#[derive(Debug, Clone)]
pub struct PointLight {
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
    /// Not rendered; point-light shadows are unsupported
    pub shadow: Option<ShadowSource>,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
            shadow: None,
        }
    }
}

impl PointLight {
    pub fn new(color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            color,
            intensity,
            radius,
            shadow: None,
        }
    }
}

/// Spot light
#[derive(Debug, Clone)]
pub struct SpotLight {
    /// Local direction, rotated by the node's world transform
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
    pub inner_angle: f32, // radians
    pub outer_angle: f32, // radians
    pub shadow: Option<ShadowSource>,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            direction: -Vec3::Y,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
            inner_angle: 0.3,
            outer_angle: 0.5,
            shadow: None,
        }
    }
}

impl SpotLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32, radius: f32, inner_angle: f32, outer_angle: f32) -> Self {
        Self {
            direction: direction.normalize(),
            color,
            intensity,
            radius,
            inner_angle,
            outer_angle,
            shadow: None,
        }
    }

    pub fn with_shadow(mut self, shadow: ShadowSource) -> Self {
        self.shadow = Some(shadow);
        self
    }
}

/// Directional light (like the sun)
#[derive(Debug, Clone)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub shadow: Option<ShadowSource>,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
            shadow: None,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize(),
            color,
            intensity,
            shadow: None,
        }
    }

    pub fn with_shadow(mut self, shadow: ShadowSource) -> Self {
        self.shadow = Some(shadow);
        self
    }
}

/// Light attached to a scene node
#[derive(Debug, Clone)]
pub enum Light {
    Directional(DirectionalLight),
    Spot(SpotLight),
    Point(PointLight),
}

impl Light {
    pub fn color(&self) -> Vec3 {
        match self {
            Light::Directional(l) => l.color,
            Light::Spot(l) => l.color,
            Light::Point(l) => l.color,
        }
    }

    pub fn intensity(&self) -> f32 {
        match self {
            Light::Directional(l) => l.intensity,
            Light::Spot(l) => l.intensity,
            Light::Point(l) => l.intensity,
        }
    }

    pub fn shadow(&self) -> Option<&ShadowSource> {
        match self {
            Light::Directional(l) => l.shadow.as_ref(),
            Light::Spot(l) => l.shadow.as_ref(),
            Light::Point(l) => l.shadow.as_ref(),
        }
    }

    pub fn shadow_mut(&mut self) -> Option<&mut ShadowSource> {
        match self {
            Light::Directional(l) => l.shadow.as_mut(),
            Light::Spot(l) => l.shadow.as_mut(),
            Light::Point(l) => l.shadow.as_mut(),
        }
    }

    /// World-space direction the light travels in, `None` for point lights
    pub fn world_direction(&self, world: &Mat4) -> Option<Vec3> {
        let local = match self {
            Light::Directional(l) => l.direction,
            Light::Spot(l) => l.direction,
            Light::Point(_) => return None,
        };
        Some(world.transform_vector3(local).normalize_or_zero())
    }

    /// View-projection used to render and sample this light's shadow map
    ///
    /// Returns `None` for lights that cannot cast shadows.
    pub fn light_view_projection(&self, world: &Mat4) -> Option<Mat4> {
        let shadow = self.shadow()?;
        let position = world.transform_point3(Vec3::ZERO);
        let direction = self.world_direction(world)?;
        if direction == Vec3::ZERO {
            return None;
        }
        let up = if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };

        match self {
            Light::Spot(spot) => {
                let view = Mat4::look_at_rh(position, position + direction, up);
                let fov = (spot.outer_angle * 2.0).clamp(0.01, std::f32::consts::PI - 0.01);
                let proj = Mat4::perspective_rh(fov, 1.0, shadow.near, shadow.far);
                Some(proj * view)
            }
            Light::Directional(_) => {
                let view = Mat4::look_at_rh(position, position + direction, up);
                let e = shadow.extent;
                let proj = Mat4::orthographic_rh(-e, e, -e, e, shadow.near, shadow.far);
                Some(proj * view)
            }
            Light::Point(_) => None,
        }
    }
}

/// Depth render target owned by a shadow-casting light
///
/// Depth is written encoded into an RGBA8 color texture so the map can be
/// sampled with a plain filterable texture binding; the depth-stencil texture
/// only serves depth testing during the pre-pass.
#[derive(Debug, Clone)]
pub struct ShadowSource {
    pub frame: FrameId,
    pub texture: TextureId,
    pub depth: TextureId,
    pub size: u32,
    pub near: f32,
    pub far: f32,
    /// Half size of the orthographic box used by directional lights
    pub extent: f32,
    pub bias: f32,
    pub darkness: f32,
    pub enabled: bool,
}

impl ShadowSource {
    /// Create the shadow map textures and frame in `assets`
    pub fn new(assets: &mut Assets, size: u32) -> Self {
        let size = size.max(1);
        let texture = assets.add_texture(
            Texture::new_2d("shadow_map", size, size, TextureFormat::Rgba8Unorm)
                .with_sampler(FilterMode::Nearest, AddressMode::ClampToEdge),
        );
        let depth = assets.add_texture(Texture::new_2d(
            "shadow_depth",
            size,
            size,
            TextureFormat::Depth24PlusStencil8,
        ));

        let mut frame = Frame::new("shadow", size, size);
        frame.set_texture(AttachmentSlot::Color(0), texture);
        frame.set_texture(AttachmentSlot::DepthStencil, depth);
        frame.set_clear_color([1.0, 1.0, 1.0, 1.0]);

        Self {
            frame: assets.add_frame(frame),
            texture,
            depth,
            size,
            near: 0.1,
            far: 100.0,
            extent: 10.0,
            bias: 0.005,
            darkness: 0.5,
            enabled: true,
        }
    }

    pub fn with_range(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    /// Resize the shadow map; the frame and both textures follow
    pub fn set_size(&mut self, assets: &mut Assets, size: u32) {
        let size = size.max(1);
        if size == self.size {
            return;
        }
        if assets.resize_frame(self.frame, size, size) {
            self.size = size;
        } else {
            log::warn!("Shadow frame {:?} no longer exists", self.frame);
        }
    }

    /// Release the shadow map assets
    ///
    /// GPU state goes through the renderer's `release_frame`/`release_texture`.
    pub fn remove(self, assets: &mut Assets) {
        assets.remove_frame(self.frame);
        assets.remove_texture(self.texture);
        assets.remove_texture(self.depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadow_source_frame_layout() {
        let mut assets = Assets::new();
        let shadow = ShadowSource::new(&mut assets, DEFAULT_SHADOW_MAP_SIZE);

        let frame = assets.frame(shadow.frame).unwrap();
        assert_eq!(frame.size(), (256, 256));
        assert_eq!(frame.clear_state().color, Some([1.0, 1.0, 1.0, 1.0]));
        assert_eq!(frame.texture(AttachmentSlot::Color(0)).unwrap().texture, shadow.texture);
        assert_eq!(frame.depth_stencil().unwrap().texture, shadow.depth);

        let texture = assets.texture(shadow.texture).unwrap();
        assert_eq!(texture.format(), TextureFormat::Rgba8Unorm);
        assert_eq!(texture.filter, FilterMode::Nearest);
    }

    #[test]
    fn test_shadow_source_resize() {
        let mut assets = Assets::new();
        let mut shadow = ShadowSource::new(&mut assets, 256);
        shadow.set_size(&mut assets, 512);
        assert_eq!(shadow.size, 512);
        assert_eq!(assets.texture(shadow.depth).unwrap().width(), 512);
    }

    #[test]
    fn test_spot_light_projects_ahead() {
        let mut assets = Assets::new();
        let light = Light::Spot(
            SpotLight::new(-Vec3::Y, Vec3::ONE, 1.0, 10.0, 0.3, 0.5)
                .with_shadow(ShadowSource::new(&mut assets, 64)),
        );
        let world = Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0));
        let m = light.light_view_projection(&world).unwrap();

        let clip = m * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_point_light_has_no_shadow_projection() {
        let mut assets = Assets::new();
        let mut point = PointLight::default();
        point.shadow = Some(ShadowSource::new(&mut assets, 64));
        assert!(Light::Point(point).light_view_projection(&Mat4::IDENTITY).is_none());
    }
}
