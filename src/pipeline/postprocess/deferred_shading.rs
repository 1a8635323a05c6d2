//! Deferred lighting resolve
//!
//! Lights the G-buffer with the main light and the ambient term. Its output
//! is the color every later stage reads.

use super::{PassInput, PostEffectStage, PostPass, StageInputs};
use crate::renderer::PostEffectSettings;
use glam::Vec4;

pub struct DeferredShadingStage;

impl PostEffectStage for DeferredShadingStage {
    fn name(&self) -> &'static str {
        "Deferred Shading"
    }

    fn needs(&self) -> StageInputs {
        StageInputs {
            previous: false,
            gbuffer: true,
        }
    }

    // Lighting comes from the shared post uniform
    fn passes(&self, _: &PostEffectSettings) -> Vec<PostPass> {
        vec![PostPass::chain(
            "Deferred Shading",
            "deferred_shading",
            [
                Some(PassInput::GBufferAlbedo),
                Some(PassInput::GBufferNormal),
                Some(PassInput::GBufferDepth),
            ],
            Vec4::ZERO,
        )]
    }
}
