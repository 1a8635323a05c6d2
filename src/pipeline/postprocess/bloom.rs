//! Bloom post-processing effect
//!
//! Bright pixels are downsampled to quarter resolution, blurred with a
//! separable gaussian across the two bloom frames, then added back onto the
//! full-resolution color.

use super::{PassInput, PostEffectStage, PostPass, Scratch, StageInputs};
use crate::renderer::PostEffectSettings;
use glam::Vec4;

/// Adds a blurred glow of the pixels brighter than the threshold
pub struct BloomStage;

impl PostEffectStage for BloomStage {
    fn name(&self) -> &'static str {
        "Bloom"
    }

    fn needs(&self) -> StageInputs {
        StageInputs {
            previous: true,
            gbuffer: false,
        }
    }

    fn passes(&self, settings: &PostEffectSettings) -> Vec<PostPass> {
        let radius = settings.bloom_radius.max(0.0);
        vec![
            PostPass::scratch(
                "Bloom Downsample",
                "down_sample4",
                [Some(PassInput::Previous), None, None],
                Scratch::BloomPing,
                Vec4::new(settings.bloom_threshold, 0.0, 0.0, 0.0),
            ),
            PostPass::scratch(
                "Bloom Blur H",
                "gaussian_blur",
                [Some(PassInput::Scratch(Scratch::BloomPing)), None, None],
                Scratch::BloomPong,
                Vec4::new(1.0, 0.0, radius, 0.0),
            ),
            PostPass::scratch(
                "Bloom Blur V",
                "gaussian_blur",
                [Some(PassInput::Scratch(Scratch::BloomPong)), None, None],
                Scratch::BloomPing,
                Vec4::new(0.0, 1.0, radius, 0.0),
            ),
            PostPass::chain(
                "Bloom",
                "bloom",
                [Some(PassInput::Previous), Some(PassInput::Scratch(Scratch::BloomPing)), None],
                Vec4::new(0.0, settings.bloom_intensity, 0.0, 0.0),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_radius_is_clamped() {
        let settings = PostEffectSettings {
            bloom_radius: -3.0,
            ..Default::default()
        };
        let passes = BloomStage.passes(&settings);
        assert!(passes.iter().filter(|p| p.technique == "gaussian_blur").all(|p| p.params.z == 0.0));
    }
}
