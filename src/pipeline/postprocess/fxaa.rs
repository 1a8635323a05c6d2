//! Fast approximate anti-aliasing

use super::{PassInput, PostEffectStage, PostPass, StageInputs};
use crate::renderer::PostEffectSettings;
use glam::Vec4;

pub struct FxaaStage;

impl PostEffectStage for FxaaStage {
    fn name(&self) -> &'static str {
        "FXAA"
    }

    fn needs(&self) -> StageInputs {
        StageInputs {
            previous: true,
            gbuffer: false,
        }
    }

    fn passes(&self, settings: &PostEffectSettings) -> Vec<PostPass> {
        vec![PostPass::chain(
            "FXAA",
            "fxaa",
            [Some(PassInput::Previous), None, None],
            Vec4::new(settings.fxaa_span.max(1.0), 0.0, 0.0, 0.0),
        )]
    }
}
