//! Main scene pass
//!
//! Draws every renderable in traversal order, either forward shaded or into
//! the G-buffer's three targets when deferred shading is enabled.

use crate::backend::traits::GraphicsBackend;
use crate::renderer::{FrameEncoder, FrameSnapshot, PassState, RenderError, RenderTarget, ShadowMap, ViewUniform};
use crate::shader::VariantFlags;

pub(crate) fn render_scene_pass<B: GraphicsBackend>(
    encoder: &mut FrameEncoder<B>,
    snapshot: &FrameSnapshot,
    view: &ViewUniform,
    shadow: Option<&ShadowMap>,
    target: RenderTarget,
    deferred: bool,
) -> Result<(), RenderError> {
    let view_group = encoder.bind_view(view, shadow)?;

    let label = if deferred { "G-Buffer" } else { "Forward" };
    let info = encoder.begin_pass(target, label, true)?;

    let mut variants = VariantFlags::NONE;
    if deferred {
        variants |= VariantFlags::DEFERRED;
    }
    if shadow.is_some() {
        variants |= VariantFlags::SHADOW_MAP;
    }
    let pass = PassState {
        target: &info,
        view_group,
        technique: None,
        variants,
    };

    // Blended geometry is drawn in traversal order like everything else
    for item in &snapshot.items {
        match encoder.draw_item(item, &pass) {
            Ok(primitives) => {
                encoder.stats.draw_calls += 1;
                encoder.stats.primitives += primitives as u64;
            }
            Err(e) => encoder.skip(item.name, &e),
        }
    }

    encoder.end_pass();
    Ok(())
}
