//! Built-in shader fragments and techniques.
//!
//! # Shader Files
//!
//! Fragments live in `shaders/include/` and technique stages in
//! `shaders/techniques/`, both embedded at compile time:
//!
//! | Fragment | Description |
//! |----------|-------------|
//! | `common` | Camera, object and material uniforms |
//! | `encode_float` / `decode_float` | Depth packed into 8-bit color channels |
//! | `skinning` | Joint palette blending |
//! | `shadow` | Shadow map lookup against the first shadow source |
//! | `aces_tone_mapping` | ACES filmic curve |
//! | `luminance` | Luminance weights and the log-luminance encoding |
//! | `fullscreen` / `post` | Full-screen triangle output and post-effect inputs |

use super::*;
use crate::resources::Semantic;
use std::collections::HashMap;

// =============================================================================
// Fragment sources
// =============================================================================

const COMMON: &str = include_str!("../../shaders/include/common.wgsl");
const ENCODE_FLOAT: &str = include_str!("../../shaders/include/encode_float.wgsl");
const DECODE_FLOAT: &str = include_str!("../../shaders/include/decode_float.wgsl");
const SKINNING: &str = include_str!("../../shaders/include/skinning.wgsl");
const SHADOW: &str = include_str!("../../shaders/include/shadow.wgsl");
const ACES_TONE_MAPPING: &str = include_str!("../../shaders/include/aces_tone_mapping.wgsl");
const FULLSCREEN: &str = include_str!("../../shaders/include/fullscreen.wgsl");
const POST: &str = include_str!("../../shaders/include/post.wgsl");
const LUMINANCE: &str = include_str!("../../shaders/include/luminance.wgsl");

// =============================================================================
// Technique sources
// =============================================================================

const FULLSCREEN_VERT: &str = include_str!("../../shaders/techniques/fullscreen.vert.wgsl");
const FULLSCREEN_FRAG: &str = include_str!("../../shaders/techniques/fullscreen.frag.wgsl");
const COLOR_VERT: &str = include_str!("../../shaders/techniques/color.vert.wgsl");
const COLOR_FRAG: &str = include_str!("../../shaders/techniques/color.frag.wgsl");
const DIFFUSE_VERT: &str = include_str!("../../shaders/techniques/diffuse.vert.wgsl");
const DIFFUSE_FRAG: &str = include_str!("../../shaders/techniques/diffuse.frag.wgsl");
const CARTOON_FRAG: &str = include_str!("../../shaders/techniques/cartoon.frag.wgsl");
const STANDARD_VERT: &str = include_str!("../../shaders/techniques/standard.vert.wgsl");
const STANDARD_FRAG: &str = include_str!("../../shaders/techniques/standard.frag.wgsl");
const GBUFFER_FRAG: &str = include_str!("../../shaders/techniques/gbuffer.frag.wgsl");
const DEPTH_VERT: &str = include_str!("../../shaders/techniques/depth.vert.wgsl");
const DEPTH_FRAG: &str = include_str!("../../shaders/techniques/depth.frag.wgsl");
const FXAA_FRAG: &str = include_str!("../../shaders/techniques/fxaa.frag.wgsl");
const DOWN_SAMPLE4_FRAG: &str = include_str!("../../shaders/techniques/down_sample4.frag.wgsl");
const GAUSSIAN_BLUR_FRAG: &str = include_str!("../../shaders/techniques/gaussian_blur.frag.wgsl");
const BLOOM_FRAG: &str = include_str!("../../shaders/techniques/bloom.frag.wgsl");
const LOG_SAMPLE_FRAG: &str = include_str!("../../shaders/techniques/log_sample.frag.wgsl");
const DOWN_SAMPLE_TO1_FRAG: &str = include_str!("../../shaders/techniques/down_sample_to1.frag.wgsl");
const TONE_MAPPING_FRAG: &str = include_str!("../../shaders/techniques/tone_mapping.frag.wgsl");
const SSAO_FRAG: &str = include_str!("../../shaders/techniques/ssao.frag.wgsl");
const DEFERRED_SHADING_FRAG: &str = include_str!("../../shaders/techniques/deferred_shading.frag.wgsl");

// =============================================================================
// ShaderLibrary
// =============================================================================

/// Registry of shader fragments and techniques
///
/// Built once and then shared read-only (typically as `Arc<ShaderLibrary>`);
/// the builder methods consume the library, so a shared instance cannot change.
#[derive(Debug, Clone, Default)]
pub struct ShaderLibrary {
    fragments: HashMap<String, String>,
    techniques: HashMap<String, Technique>,
}

impl ShaderLibrary {
    /// A library with no fragments or techniques
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in library
    pub fn standard() -> Self {
        use Semantic::*;

        let fullscreen = |name: &str, frag: &str| {
            Technique::new(name, ProgramSource::new(FULLSCREEN_VERT, frag))
        };

        Self::empty()
            .with_fragment("common", COMMON)
            .with_fragment("encode_float", ENCODE_FLOAT)
            .with_fragment("decode_float", DECODE_FLOAT)
            .with_fragment("skinning", SKINNING)
            .with_fragment("shadow", SHADOW)
            .with_fragment("aces_tone_mapping", ACES_TONE_MAPPING)
            .with_fragment("fullscreen", FULLSCREEN)
            .with_fragment("post", POST)
            .with_fragment("luminance", LUMINANCE)
            .with_technique(fullscreen("fullscreen", FULLSCREEN_FRAG))
            .with_technique(
                Technique::new("color", ProgramSource::new(COLOR_VERT, COLOR_FRAG)).with_inputs(&[Position]),
            )
            .with_technique(
                Technique::new("diffuse", ProgramSource::new(DIFFUSE_VERT, DIFFUSE_FRAG))
                    .with_inputs(&[Position, Normal, Texcoord0])
                    .with_texture_slots(&["base_color_map"]),
            )
            .with_technique(
                Technique::new("cartoon", ProgramSource::new(DIFFUSE_VERT, CARTOON_FRAG))
                    .with_inputs(&[Position, Normal, Texcoord0])
                    .with_texture_slots(&["base_color_map"]),
            )
            .with_technique(
                Technique::new("standard", ProgramSource::new(STANDARD_VERT, STANDARD_FRAG))
                    .with_deferred(ProgramSource::new(STANDARD_VERT, GBUFFER_FRAG))
                    .with_inputs(&[Position, Normal, Texcoord0, Tangent])
                    .with_texture_slots(&["base_color_map", "normal_map"]),
            )
            .with_technique(
                Technique::new("depth", ProgramSource::new(DEPTH_VERT, DEPTH_FRAG))
                    .with_inputs(&[Position])
                    .with_texture_slots(&["base_color_map"]),
            )
            .with_technique(fullscreen("fxaa", FXAA_FRAG))
            .with_technique(fullscreen("down_sample4", DOWN_SAMPLE4_FRAG))
            .with_technique(fullscreen("gaussian_blur", GAUSSIAN_BLUR_FRAG))
            .with_technique(fullscreen("bloom", BLOOM_FRAG))
            .with_technique(fullscreen("log_sample", LOG_SAMPLE_FRAG))
            .with_technique(fullscreen("down_sample_to1", DOWN_SAMPLE_TO1_FRAG))
            .with_technique(fullscreen("tone_mapping", TONE_MAPPING_FRAG))
            .with_technique(fullscreen("ssao", SSAO_FRAG))
            .with_technique(fullscreen("deferred_shading", DEFERRED_SHADING_FRAG))
    }

    /// Register a fragment available to `#include <name>`
    pub fn with_fragment(mut self, name: &str, source: &str) -> Self {
        self.fragments.insert(name.to_string(), source.to_string());
        self
    }

    pub fn with_technique(mut self, technique: Technique) -> Self {
        self.techniques.insert(technique.name.clone(), technique);
        self
    }

    pub fn fragment(&self, name: &str) -> Option<&str> {
        self.fragments.get(name).map(|s| s.as_str())
    }

    pub fn technique(&self, name: &str) -> Option<&Technique> {
        self.techniques.get(name)
    }

    pub fn techniques(&self) -> impl Iterator<Item = &Technique> {
        self.techniques.values()
    }

    /// Expand every `#include` in `source`
    ///
    /// Text without directives is returned unchanged.
    pub fn compose(&self, source: &str) -> Result<String, ComposeError> {
        let mut out = String::with_capacity(source.len());
        IncludeResolver::new(|name| self.fragment(name)).resolve(source, &mut out)?;
        Ok(out)
    }

    /// Compose and preprocess the vertex and fragment stages of `key`
    pub fn build_program(&self, key: &ProgramKey) -> Result<ComposedProgram, ComposeError> {
        let technique = self
            .technique(&key.technique)
            .ok_or_else(|| ComposeError::UnknownTechnique(key.technique.clone()))?;

        let source = if key.variants.contains(VariantFlags::DEFERRED) {
            technique
                .deferred
                .as_ref()
                .ok_or_else(|| ComposeError::MissingDeferred(technique.name.clone()))?
        } else {
            &technique.forward
        };

        let defines = key.variants.defines();
        let vertex = preprocess(&self.compose(&source.vert)?, &defines)?;
        let fragment = preprocess(&self.compose(&source.frag)?, &defines)?;

        log::debug!(
            "Built program '{}' with variants {:?}",
            key.technique,
            defines
        );

        Ok(ComposedProgram {
            key: key.clone(),
            vertex,
            fragment,
        })
    }
}
