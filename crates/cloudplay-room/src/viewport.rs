//! Output viewport sizing.

use crate::config::EmulatorConfig;
use crate::director::GameMeta;

/// Output picture size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Largest even-sided box with aspect `ratio` inside `max_width` x
/// `max_height`.
///
/// `ratio` must be positive.
pub fn size_to_fit(ratio: f64, max_width: u32, max_height: u32) -> (u32, u32) {
    let bound_width = max_width & !1;
    let bound_height = max_height & !1;

    let mut height = bound_height;
    let mut width = round_even(f64::from(height) * ratio);
    if width > bound_width {
        width = bound_width;
        height = round_even(f64::from(width) / ratio).min(bound_height);
    }
    (width, height)
}

fn round_even(value: f64) -> u32 {
    // `as` saturates, so huge ratios pin to u32::MAX and get caught by the bound check.
    ((value / 2.0).round() as u32).saturating_mul(2)
}

/// Size the core renders at: the game's intrinsic size, or its aspect
/// fitted into the configured box, then scaled, then turned on its side
/// for rotated games.
pub fn output_viewport(meta: &GameMeta, config: &EmulatorConfig) -> Viewport {
    let (mut width, mut height) = (meta.base_width, meta.base_height);

    let aspect = &config.aspect_ratio;
    if aspect.keep {
        if meta.base_width == 0 || meta.base_height == 0 {
            tracing::warn!(
                base_width = meta.base_width,
                base_height = meta.base_height,
                "game reports an empty base size, keeping it as is"
            );
        } else {
            let ratio = f64::from(meta.base_width) / f64::from(meta.base_height);
            (width, height) = size_to_fit(ratio, aspect.width, aspect.height);
        }
    }

    if config.scale > 1 {
        width = width.saturating_mul(config.scale);
        height = height.saturating_mul(config.scale);
    }

    if meta.rotation.is_sideways() {
        std::mem::swap(&mut width, &mut height);
    }

    Viewport { width, height }
}
