//! Post-processing effects
//!
//! Enabled effects always run in the order [`PostEffect`] declares them,
//! regardless of the order they were enabled in. Each effect expands into one
//! or more full-screen passes. A pass either continues the color chain, whose
//! images ping-pong between two renderer-owned frames, or renders into one of
//! the [`Scratch`] frames that later passes of the same frame read. The last
//! chain pass writes to the frame's target.
//!
//! A pass that fails, or that cannot bind its output, is reported and the
//! chain goes on from the previous image. Only a backbuffer that cannot be
//! bound ends the frame with an error.

mod bloom;
mod deferred_shading;
mod fxaa;
mod ssao;
mod tonemapping;

pub use bloom::BloomStage;
pub use deferred_shading::DeferredShadingStage;
pub use fxaa::FxaaStage;
pub use ssao::SsaoStage;
pub use tonemapping::{TonemapOperator, TonemappingStage};

use crate::backend::traits::GraphicsBackend;
use crate::renderer::{FrameEncoder, PostEffectSettings, PostUniform, RenderTarget, ViewUniform};
use crate::renderer::RenderError;
use crate::resources::{FrameId, TextureId};
use glam::Vec4;
use std::collections::BTreeSet;

/// Edge length of the log-luminance frame averaged for auto exposure
pub const LUMINANCE_SIZE: u32 = 64;

/// A post-processing effect, ordered as the chain runs them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PostEffect {
    DeferredShading,
    Ssao,
    Bloom,
    ToneMapping,
    Fxaa,
}

impl PostEffect {
    pub const ALL: [PostEffect; 5] = [
        PostEffect::DeferredShading,
        PostEffect::Ssao,
        PostEffect::Bloom,
        PostEffect::ToneMapping,
        PostEffect::Fxaa,
    ];

    pub fn name(&self) -> &'static str {
        self.stage().name()
    }

    pub(crate) fn stage(&self) -> &'static dyn PostEffectStage {
        match self {
            PostEffect::DeferredShading => &DeferredShadingStage,
            PostEffect::Ssao => &SsaoStage,
            PostEffect::Bloom => &BloomStage,
            PostEffect::ToneMapping => &TonemappingStage,
            PostEffect::Fxaa => &FxaaStage,
        }
    }
}

/// G-buffer textures written by the deferred scene pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GBufferTextures {
    /// rgb: albedo, a: roughness
    pub albedo: TextureId,
    /// rgb: packed normal, a: metallic
    pub normal: TextureId,
    /// rgb: encoded depth, a: occlusion
    pub depth: TextureId,
}

/// Renderer-owned frames written outside the color chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scratch {
    /// Quarter resolution, used by the bloom blur
    BloomPing,
    BloomPong,
    /// [`LUMINANCE_SIZE`] square, encoded log luminance
    Luminance,
    /// 1x1 mean of [`Scratch::Luminance`]
    AverageLuminance,
}

/// Texture bound to one input of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassInput {
    /// Color output of the scene pass or of the last chain pass
    Previous,
    GBufferAlbedo,
    GBufferNormal,
    GBufferDepth,
    /// Written earlier in the same frame
    Scratch(Scratch),
}

/// Where a pass writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutput {
    /// Next image of the color chain, or the target for the last one
    Chain,
    Scratch(Scratch),
}

/// One full-screen draw of an effect
#[derive(Debug, Clone, PartialEq)]
pub struct PostPass {
    pub label: &'static str,
    /// Shader library technique drawn by this pass
    pub technique: &'static str,
    /// Textures bound to `input0..input2`
    pub inputs: [Option<PassInput>; 3],
    pub output: PassOutput,
    /// Passed as `post.params`
    pub params: Vec4,
}

impl PostPass {
    pub fn chain(label: &'static str, technique: &'static str, inputs: [Option<PassInput>; 3], params: Vec4) -> Self {
        Self {
            label,
            technique,
            inputs,
            output: PassOutput::Chain,
            params,
        }
    }

    pub fn scratch(
        label: &'static str,
        technique: &'static str,
        inputs: [Option<PassInput>; 3],
        output: Scratch,
        params: Vec4,
    ) -> Self {
        Self {
            label,
            technique,
            inputs,
            output: PassOutput::Scratch(output),
            params,
        }
    }
}

/// What an effect needs from the scene pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageInputs {
    /// Color output of the scene pass or the previous stage
    pub previous: bool,
    pub gbuffer: bool,
}

/// An effect of the chain
pub trait PostEffectStage: Sync {
    fn name(&self) -> &'static str;

    fn needs(&self) -> StageInputs;

    /// Passes of this effect in the order they run
    fn passes(&self, settings: &PostEffectSettings) -> Vec<PostPass>;
}

/// Plain copy of the scene color, used when no enabled effect can run
struct CopyStage;

impl PostEffectStage for CopyStage {
    fn name(&self) -> &'static str {
        "Copy"
    }

    fn needs(&self) -> StageInputs {
        StageInputs {
            previous: true,
            gbuffer: false,
        }
    }

    fn passes(&self, _: &PostEffectSettings) -> Vec<PostPass> {
        vec![PostPass::chain(
            "Copy",
            "fullscreen",
            [Some(PassInput::Previous), None, None],
            Vec4::ZERO,
        )]
    }
}

/// Scratch frames and their color textures
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScratchTargets {
    pub bloom_ping: (FrameId, TextureId),
    pub bloom_pong: (FrameId, TextureId),
    pub luminance: (FrameId, TextureId),
    pub average_luminance: (FrameId, TextureId),
}

impl ScratchTargets {
    fn get(&self, scratch: Scratch) -> (FrameId, TextureId) {
        match scratch {
            Scratch::BloomPing => self.bloom_ping,
            Scratch::BloomPong => self.bloom_pong,
            Scratch::Luminance => self.luminance,
            Scratch::AverageLuminance => self.average_luminance,
        }
    }
}

/// Textures and frames the chain works with
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChainInputs {
    /// Scene color when the scene pass was forward shaded
    pub color: Option<TextureId>,
    pub gbuffer: Option<GBufferTextures>,
    pub ping: (FrameId, TextureId),
    pub pong: (FrameId, TextureId),
    pub scratch: ScratchTargets,
}

/// Stages that can run given what the scene pass produced
fn runnable_stages<B: GraphicsBackend>(
    encoder: &mut FrameEncoder<B>,
    effects: &BTreeSet<PostEffect>,
    inputs: &ChainInputs,
) -> Vec<&'static dyn PostEffectStage> {
    let mut has_previous = inputs.color.is_some();
    let mut stages: Vec<&'static dyn PostEffectStage> = Vec::with_capacity(effects.len());

    for effect in effects {
        let stage = effect.stage();
        let needs = stage.needs();
        if needs.gbuffer && inputs.gbuffer.is_none() {
            encoder
                .errors
                .warn_once(format!("{} needs the G-buffer; enable deferred shading", stage.name()));
            continue;
        }
        if needs.previous && !has_previous {
            encoder
                .errors
                .warn_once(format!("{} has no color input to read", stage.name()));
            continue;
        }
        stages.push(stage);
        has_previous = true;
    }

    if stages.is_empty() && inputs.color.is_some() {
        stages.push(&CopyStage);
    }
    stages
}

/// Textures bound for `pass`; a scratch input not written this frame is an error
fn resolve_inputs(
    pass: &PostPass,
    previous: Option<TextureId>,
    inputs: &ChainInputs,
    ready: &BTreeSet<Scratch>,
) -> Result<[Option<TextureId>; 3], RenderError> {
    let gbuffer = || {
        inputs
            .gbuffer
            .ok_or_else(|| RenderError::MissingAsset("G-buffer".to_string()))
    };

    let mut textures = [None; 3];
    for (slot, input) in textures.iter_mut().zip(pass.inputs) {
        let Some(input) = input else {
            continue;
        };
        *slot = Some(match input {
            PassInput::Previous => previous.ok_or_else(|| RenderError::MissingAsset("chain color".to_string()))?,
            PassInput::GBufferAlbedo => gbuffer()?.albedo,
            PassInput::GBufferNormal => gbuffer()?.normal,
            PassInput::GBufferDepth => gbuffer()?.depth,
            PassInput::Scratch(scratch) if ready.contains(&scratch) => inputs.scratch.get(scratch).1,
            PassInput::Scratch(scratch) => {
                return Err(RenderError::MissingAsset(format!("{:?} was not rendered this frame", scratch)))
            }
        });
    }
    Ok(textures)
}

/// Run every enabled effect, the last chain pass writing into `target`
pub(crate) fn run_chain<B: GraphicsBackend>(
    encoder: &mut FrameEncoder<B>,
    effects: &BTreeSet<PostEffect>,
    inputs: &ChainInputs,
    view: &ViewUniform,
    target: RenderTarget,
) -> Result<(), RenderError> {
    let settings = encoder.config.post.clone();
    let passes: Vec<PostPass> = runnable_stages(encoder, effects, inputs)
        .iter()
        .flat_map(|stage| stage.passes(&settings))
        .collect();
    let last_chain = passes.iter().rposition(|p| p.output == PassOutput::Chain);
    let chain_frames = [inputs.ping, inputs.pong];

    let mut previous = inputs.color;
    let mut written = 0;
    let mut ready = BTreeSet::new();
    for (i, pass) in passes.iter().enumerate() {
        let (output, output_texture) = match pass.output {
            PassOutput::Chain if Some(i) == last_chain => (target, None),
            PassOutput::Chain => {
                let (frame, texture) = chain_frames[written % 2];
                (RenderTarget::Frame(frame), Some(texture))
            }
            PassOutput::Scratch(scratch) => {
                let (frame, texture) = inputs.scratch.get(scratch);
                (RenderTarget::Frame(frame), Some(texture))
            }
        };
        if let PassOutput::Scratch(scratch) = pass.output {
            ready.remove(&scratch);
        }

        let info = match encoder.begin_pass(output, pass.label, false) {
            Ok(info) => info,
            Err(e) if output == RenderTarget::Backbuffer => return Err(e),
            Err(e) => {
                encoder
                    .errors
                    .report(format!("Post pass {} cannot bind its output: {}", pass.label, e));
                continue;
            }
        };
        let result = resolve_inputs(pass, previous, inputs, &ready).and_then(|textures| {
            let uniform = PostUniform::new(view, info.width, info.height, pass.params);
            encoder.draw_fullscreen(pass.technique, textures, &uniform, &info)
        });
        encoder.end_pass();
        encoder.stats.post_passes += 1;

        match (result, pass.output) {
            (Ok(()), PassOutput::Chain) => {
                if output_texture.is_some() {
                    previous = output_texture;
                    written += 1;
                }
            }
            (Ok(()), PassOutput::Scratch(scratch)) => {
                ready.insert(scratch);
            }
            // The previous image stays the next input
            (Err(e), _) => encoder
                .errors
                .report(format!("Post pass {} failed: {}", pass.label, e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(effect: PostEffect, settings: &PostEffectSettings) -> Vec<&'static str> {
        effect.stage().passes(settings).iter().map(|p| p.label).collect()
    }

    #[test]
    fn test_declared_order() {
        let mut effects: Vec<PostEffect> = vec![PostEffect::Fxaa, PostEffect::DeferredShading, PostEffect::Bloom];
        effects.sort();
        assert_eq!(
            effects,
            [PostEffect::DeferredShading, PostEffect::Bloom, PostEffect::Fxaa]
        );
        assert_eq!(PostEffect::ALL.len(), 5);
    }

    #[test]
    fn test_every_effect_ends_on_the_chain() {
        let settings = PostEffectSettings::default();
        for effect in PostEffect::ALL {
            let passes = effect.stage().passes(&settings);
            assert_eq!(passes.last().map(|p| p.output), Some(PassOutput::Chain), "{:?}", effect);
        }
    }

    #[test]
    fn test_bloom_downsamples_and_blurs_before_compositing() {
        let settings = PostEffectSettings::default();
        assert_eq!(
            labels(PostEffect::Bloom, &settings),
            ["Bloom Downsample", "Bloom Blur H", "Bloom Blur V", "Bloom"]
        );
        let passes = PostEffect::Bloom.stage().passes(&settings);
        let techniques: Vec<&str> = passes.iter().map(|p| p.technique).collect();
        assert_eq!(techniques, ["down_sample4", "gaussian_blur", "gaussian_blur", "bloom"]);
        // Each blur reads what the pass before it wrote
        for pair in passes.windows(2).take(2) {
            let PassOutput::Scratch(written) = pair[0].output else {
                panic!("{} should write a scratch frame", pair[0].label);
            };
            assert_eq!(pair[1].inputs[0], Some(PassInput::Scratch(written)));
        }
        assert_eq!(
            passes[3].inputs,
            [Some(PassInput::Previous), Some(PassInput::Scratch(Scratch::BloomPing)), None]
        );
    }

    #[test]
    fn test_tone_mapping_reads_average_luminance() {
        let settings = PostEffectSettings::default();
        assert_eq!(
            labels(PostEffect::ToneMapping, &settings),
            ["Luminance", "Average Luminance", "Tonemapping"]
        );
        let passes = PostEffect::ToneMapping.stage().passes(&settings);
        assert_eq!(passes[0].output, PassOutput::Scratch(Scratch::Luminance));
        assert_eq!(passes[1].inputs[0], Some(PassInput::Scratch(Scratch::Luminance)));
        assert_eq!(passes[1].output, PassOutput::Scratch(Scratch::AverageLuminance));
        assert_eq!(passes[2].inputs[1], Some(PassInput::Scratch(Scratch::AverageLuminance)));
        assert_eq!(passes[2].params.z, settings.luminance_key);

        let fixed = PostEffectSettings {
            auto_exposure: false,
            ..Default::default()
        };
        let passes = PostEffect::ToneMapping.stage().passes(&fixed);
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].inputs[1], None);
        assert_eq!(passes[0].params.z, 0.0);
    }

    #[test]
    fn test_missing_scratch_input_is_an_error() {
        let mut assets = crate::resources::Assets::new();
        let mut target = || {
            let texture = assets.add_texture(crate::resources::Texture::new_2d(
                "t",
                1,
                1,
                crate::backend::types::TextureFormat::Rgba8Unorm,
            ));
            let frame = assets.add_frame(crate::resources::Frame::new("f", 1, 1));
            (frame, texture)
        };
        let inputs = ChainInputs {
            color: Some(target().1),
            gbuffer: None,
            ping: target(),
            pong: target(),
            scratch: ScratchTargets {
                bloom_ping: target(),
                bloom_pong: target(),
                luminance: target(),
                average_luminance: target(),
            },
        };
        let pass = PostPass::chain(
            "Bloom",
            "bloom",
            [Some(PassInput::Previous), Some(PassInput::Scratch(Scratch::BloomPing)), None],
            Vec4::ZERO,
        );

        assert!(resolve_inputs(&pass, inputs.color, &inputs, &BTreeSet::new()).is_err());
        let ready = BTreeSet::from([Scratch::BloomPing]);
        assert_eq!(
            resolve_inputs(&pass, inputs.color, &inputs, &ready),
            Ok([inputs.color, Some(inputs.scratch.bloom_ping.1), None])
        );
    }

    #[test]
    fn test_params_follow_settings() {
        let settings = PostEffectSettings {
            exposure: 2.0,
            tone_mapping: TonemapOperator::Reinhard,
            ..Default::default()
        };
        let passes = PostEffect::ToneMapping.stage().passes(&settings);
        let params = passes[passes.len() - 1].params;
        assert_eq!(params.x, 2.0);
        assert_eq!(params.y, TonemapOperator::Reinhard.shader_mode() as f32);
    }
}
