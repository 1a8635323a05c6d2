//! Frame stages
//!
//! The renderer runs these in a fixed order every frame:
//! 1. Shadow pass - Depth of shadow casters, encoded into each light's shadow map
//! 2. Scene pass - Every renderable, forward shaded or written to the G-buffer
//! 3. Post-processing - Deferred shading, SSAO, bloom, tone mapping, FXAA

pub mod postprocess;
pub(crate) mod scene_pass;
pub(crate) mod shadow_pass;

pub use postprocess::{
    GBufferTextures, PassInput, PassOutput, PostEffect, PostEffectStage, PostPass, Scratch, StageInputs, TonemapOperator,
};
