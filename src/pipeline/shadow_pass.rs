//! Shadow pre-pass
//!
//! Renders the depth of every shadow caster into each enabled shadow source,
//! before the main pass samples it.

use crate::backend::traits::GraphicsBackend;
use crate::renderer::{FrameEncoder, FrameSnapshot, PassState, RenderError, RenderTarget, ShadowMap};
use crate::renderer::{ShadowUniform, ViewUniform};
use crate::scene::{Light, ShadowSource};
use crate::shader::VariantFlags;
use glam::Mat4;

/// Technique every caster is drawn with
pub const SHADOW_TECHNIQUE: &str = "depth";

/// Render every enabled shadow map in traversal order
///
/// Returns the first one rendered; the main pass samples only that map.
pub(crate) fn render_shadows<B: GraphicsBackend>(
    encoder: &mut FrameEncoder<B>,
    snapshot: &FrameSnapshot,
) -> Option<ShadowMap> {
    let mut first = None;

    for item in &snapshot.lights {
        let Some(shadow) = item.light.shadow().filter(|s| s.enabled) else {
            continue;
        };
        if let Light::Point(_) = item.light {
            encoder
                .errors
                .warn_once(format!("Point light '{}' cannot cast shadows, ignored", item.name));
            continue;
        }
        let Some(light_view_proj) = item.light.light_view_projection(&item.world) else {
            continue;
        };

        match render_shadow_map(encoder, snapshot, shadow, light_view_proj) {
            Ok(()) => {
                encoder.stats.shadow_passes += 1;
                if first.is_none() {
                    first = Some(ShadowMap {
                        texture: shadow.texture,
                        uniform: ShadowUniform::new(light_view_proj, shadow.bias, shadow.darkness),
                    });
                }
            }
            Err(e) => encoder
                .errors
                .report(format!("Shadow pass of '{}' failed: {}", item.name, e)),
        }
    }

    first
}

fn render_shadow_map<B: GraphicsBackend>(
    encoder: &mut FrameEncoder<B>,
    snapshot: &FrameSnapshot,
    shadow: &ShadowSource,
    light_view_proj: Mat4,
) -> Result<(), RenderError> {
    // The map being written cannot also be sampled
    let view = ViewUniform::from_light(light_view_proj, shadow.near, shadow.far);
    let view_group = encoder.bind_view(&view, None)?;

    let target = encoder.begin_pass(RenderTarget::Frame(shadow.frame), "Shadow", true)?;
    let pass = PassState {
        target: &target,
        view_group,
        technique: Some(SHADOW_TECHNIQUE),
        variants: VariantFlags::NONE,
    };

    for item in snapshot.items.iter().filter(|i| i.cast_shadow) {
        match encoder.draw_item(item, &pass) {
            Ok(_) => encoder.stats.shadow_draw_calls += 1,
            Err(e) => encoder.skip(item.name, &e),
        }
    }

    encoder.end_pass();
    Ok(())
}
