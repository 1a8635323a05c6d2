//! Screen-space ambient occlusion
//!
//! Darkens the previous color by an occlusion term estimated from the
//! G-buffer's encoded depth and normals, so it only runs after a deferred
//! scene pass.

use super::{PassInput, PostEffectStage, PostPass, StageInputs};
use crate::renderer::PostEffectSettings;
use glam::Vec4;

pub struct SsaoStage;

impl PostEffectStage for SsaoStage {
    fn name(&self) -> &'static str {
        "SSAO"
    }

    fn needs(&self) -> StageInputs {
        StageInputs {
            previous: true,
            gbuffer: true,
        }
    }

    fn passes(&self, settings: &PostEffectSettings) -> Vec<PostPass> {
        vec![PostPass::chain(
            "SSAO",
            "ssao",
            [
                Some(PassInput::Previous),
                Some(PassInput::GBufferNormal),
                Some(PassInput::GBufferDepth),
            ],
            Vec4::new(settings.ssao_radius, settings.ssao_strength.clamp(0.0, 1.0), 0.0, 0.0),
        )]
    }
}
