//! Renderer configuration

use crate::pipeline::postprocess::{PostEffect, TonemapOperator};
use crate::scene::{Camera, DEFAULT_SHADOW_MAP_SIZE};

/// Default maximum number of color attachments bound per frame
pub const DEFAULT_MAX_FRAME_ATTACHMENTS: u32 = 8;

/// Tunables of the post-effect stages
#[derive(Debug, Clone, PartialEq)]
pub struct PostEffectSettings {
    /// Brightness above which pixels contribute to bloom
    pub bloom_threshold: f32,
    pub bloom_intensity: f32,
    /// Blur radius in pixels
    pub bloom_radius: f32,
    pub exposure: f32,
    pub tone_mapping: TonemapOperator,
    /// Scale the scene so its average luminance lands on `luminance_key` before tone mapping
    pub auto_exposure: bool,
    pub luminance_key: f32,
    /// Sampling radius in pixels
    pub ssao_radius: f32,
    pub ssao_strength: f32,
    /// Maximum edge search span in pixels
    pub fxaa_span: f32,
}

impl Default for PostEffectSettings {
    fn default() -> Self {
        Self {
            bloom_threshold: 0.8,
            bloom_intensity: 0.6,
            bloom_radius: 2.0,
            exposure: 1.0,
            tone_mapping: TonemapOperator::Aces,
            auto_exposure: true,
            luminance_key: 0.18,
            ssao_radius: 4.0,
            ssao_strength: 1.0,
            fxaa_span: 8.0,
        }
    }
}

/// Configuration for creating a renderer
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Color attachments at or beyond this location are dropped when a frame is bound
    pub max_frame_attachments: u32,
    /// Backbuffer clear color
    pub clear_color: [f32; 4],
    /// Edge length of shadow maps created through the renderer
    pub shadow_map_size: u32,
    /// Effects enabled when the renderer is created
    pub post_effects: Vec<PostEffect>,
    pub post: PostEffectSettings,
    /// Passed to the backend by hosts that create it from this config
    pub vsync: bool,
    /// Used when neither the caller nor the scene provides a camera
    pub default_camera: Camera,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_frame_attachments: DEFAULT_MAX_FRAME_ATTACHMENTS,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shadow_map_size: DEFAULT_SHADOW_MAP_SIZE,
            post_effects: Vec::new(),
            post: PostEffectSettings::default(),
            vsync: true,
            default_camera: Camera::default(),
        }
    }
}
