//! Tonemapping post-processing
//!
//! With auto exposure the scene color is first reduced to the mean of its
//! log luminance, which scales the exposure so that mean lands on the
//! configured key.

use super::{PassInput, PostEffectStage, PostPass, Scratch, StageInputs};
use crate::renderer::PostEffectSettings;
use glam::Vec4;

/// Tonemapping operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TonemapOperator {
    Reinhard,
    #[default]
    Aces,
    Uncharted2,
    /// Clamp to [0, 1]
    None,
}

impl TonemapOperator {
    /// Mode selector read by the `tone_mapping` technique
    pub fn shader_mode(&self) -> u32 {
        match self {
            TonemapOperator::Aces => 0,
            TonemapOperator::Reinhard => 1,
            TonemapOperator::Uncharted2 => 2,
            TonemapOperator::None => 3,
        }
    }
}

/// Exposure followed by the configured operator
pub struct TonemappingStage;

impl PostEffectStage for TonemappingStage {
    fn name(&self) -> &'static str {
        "Tonemapping"
    }

    fn needs(&self) -> StageInputs {
        StageInputs {
            previous: true,
            gbuffer: false,
        }
    }

    fn passes(&self, settings: &PostEffectSettings) -> Vec<PostPass> {
        let mode = settings.tone_mapping.shader_mode() as f32;
        if !settings.auto_exposure {
            return vec![PostPass::chain(
                "Tonemapping",
                "tone_mapping",
                [Some(PassInput::Previous), None, None],
                Vec4::new(settings.exposure, mode, 0.0, 0.0),
            )];
        }

        vec![
            PostPass::scratch(
                "Luminance",
                "log_sample",
                [Some(PassInput::Previous), None, None],
                Scratch::Luminance,
                Vec4::ZERO,
            ),
            PostPass::scratch(
                "Average Luminance",
                "down_sample_to1",
                [Some(PassInput::Scratch(Scratch::Luminance)), None, None],
                Scratch::AverageLuminance,
                Vec4::ZERO,
            ),
            PostPass::chain(
                "Tonemapping",
                "tone_mapping",
                [
                    Some(PassInput::Previous),
                    Some(PassInput::Scratch(Scratch::AverageLuminance)),
                    None,
                ],
                Vec4::new(settings.exposure, mode, settings.luminance_key.max(f32::EPSILON), 0.0),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_operator_is_aces() {
        assert_eq!(TonemapOperator::default(), TonemapOperator::Aces);
        assert_eq!(TonemapOperator::default().shader_mode(), 0);
    }
}
