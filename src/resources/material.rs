//! Material definitions

use crate::backend::types::{BlendState, CullMode};
use crate::resources::TextureId;
use crate::shader::VariantFlags;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use std::collections::BTreeMap;

/// Surface description: a shading technique plus the values and textures it reads
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    /// Technique name in the shader library
    pub technique: String,
    pub variants: VariantFlags,
    /// Texture slot name to texture; unset slots sample white
    pub textures: BTreeMap<String, TextureId>,
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub alpha_cutoff: f32,
    /// `None` is opaque
    pub blend: Option<BlendState>,
    pub cull_mode: CullMode,
    pub depth_write: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            technique: "standard".to_string(),
            variants: VariantFlags::NONE,
            textures: BTreeMap::new(),
            base_color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            metallic: 0.0,
            roughness: 0.5,
            alpha_cutoff: 0.5,
            blend: None,
            cull_mode: CullMode::Back,
            depth_write: true,
        }
    }
}

impl Material {
    pub const BASE_COLOR_MAP: &'static str = "base_color_map";
    pub const NORMAL_MAP: &'static str = "normal_map";

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_technique(mut self, technique: &str) -> Self {
        self.technique = technique.to_string();
        self
    }

    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.base_color = color;
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    pub fn with_texture(mut self, slot: &str, texture: TextureId) -> Self {
        self.textures.insert(slot.to_string(), texture);
        self
    }

    /// Discard fragments whose alpha is below `cutoff`
    pub fn with_alpha_test(mut self, cutoff: f32) -> Self {
        self.alpha_cutoff = cutoff;
        self.variants |= VariantFlags::ALPHA_TEST;
        self
    }

    pub fn with_blend(mut self, blend: BlendState) -> Self {
        self.blend = Some(blend);
        self.depth_write = false;
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn is_blended(&self) -> bool {
        self.blend.is_some()
    }

    /// Create a uniform data struct for GPU
    pub fn uniform_data(&self) -> MaterialUniform {
        MaterialUniform {
            base_color: self.base_color,
            params: [self.metallic, self.roughness, self.alpha_cutoff, 0.0],
        }
    }

    // Preset materials

    pub fn plastic(color: Vec3) -> Self {
        Self::new("plastic")
            .with_base_color(color.extend(1.0))
            .with_metallic(0.0)
            .with_roughness(0.4)
    }

    pub fn metal(color: Vec3, roughness: f32) -> Self {
        Self::new("metal")
            .with_base_color(color.extend(1.0))
            .with_metallic(1.0)
            .with_roughness(roughness)
    }

    /// Unlit flat color
    pub fn unlit(color: Vec4) -> Self {
        Self::new("unlit").with_technique("color").with_base_color(color)
    }

    pub fn glass() -> Self {
        Self::new("glass")
            .with_base_color(Vec4::new(1.0, 1.0, 1.0, 0.3))
            .with_roughness(0.1)
            .with_blend(BlendState::alpha_blending())
    }
}

/// Material uniform data for GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialUniform {
    pub base_color: Vec4,
    pub params: [f32; 4], // x=metallic, y=roughness, z=alpha cutoff, w=padding
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_test_sets_variant() {
        let material = Material::new("leaves").with_alpha_test(0.3);
        assert!(material.variants.contains(VariantFlags::ALPHA_TEST));
        assert_eq!(material.uniform_data().params[2], 0.3);
    }

    #[test]
    fn test_blended_material_disables_depth_write() {
        let material = Material::glass();
        assert!(material.is_blended());
        assert!(!material.depth_write);
    }
}
