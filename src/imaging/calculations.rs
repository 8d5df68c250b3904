//! Pure calculation functions for derivative dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Scale `source` so that its longer side equals `max_length`.
///
/// Each axis gets its own scale factor. Both start out as
/// `max_length / longer_side`; a computed side that would round below one
/// pixel is clamped to 1 and the *other* axis' factor is recomputed from its
/// own length, so the longer side stays exactly `max_length` instead of being
/// derived from the clamped side.
///
/// # Examples
/// ```
/// # use gallery_engine::imaging::calculate_scaled_dimensions;
/// assert_eq!(calculate_scaled_dimensions((4000, 3000), 200), (200, 150));
/// assert_eq!(calculate_scaled_dimensions((100, 4000), 200), (5, 200));
/// assert_eq!(calculate_scaled_dimensions((1, 10_000), 200), (1, 200));
/// ```
pub fn calculate_scaled_dimensions(source: (u32, u32), max_length: u32) -> (u32, u32) {
    let src_w = source.0.max(1) as f64;
    let src_h = source.1.max(1) as f64;
    let max = max_length.max(1) as f64;

    let factor = max / src_w.max(src_h);
    let mut width_factor = factor;
    let mut height_factor = factor;

    let mut width = (src_w * width_factor).round();
    let mut height = (src_h * height_factor).round();

    if width < 1.0 {
        width = 1.0;
        height_factor = max / src_h;
        height = (src_h * height_factor).round();
    }
    if height < 1.0 {
        height = 1.0;
        width_factor = max / src_w;
        width = (src_w * width_factor).round();
    }

    (width.max(1.0) as u32, height.max(1.0) as u32)
}

/// Dimensions of a derivative that must fit inside `max_length`.
///
/// Sources already within the bound keep their size: derivatives are never
/// upscaled.
pub fn calculate_fit_dimensions(source: (u32, u32), max_length: u32) -> (u32, u32) {
    if source.0.max(source.1) <= max_length {
        (source.0.max(1), source.1.max(1))
    } else {
        calculate_scaled_dimensions(source, max_length)
    }
}

/// Dimensions after an optional quarter-turn rotation.
pub fn rotated_dimensions(source: (u32, u32), swaps_axes: bool) -> (u32, u32) {
    if swaps_axes {
        (source.1, source.0)
    } else {
        source
    }
}

/// Width/height ratio, rounded to two decimals.
pub fn aspect_ratio(dimensions: (u32, u32)) -> f64 {
    if dimensions.1 == 0 {
        return 0.0;
    }
    (dimensions.0 as f64 / dimensions.1 as f64 * 100.0).round() / 100.0
}

/// Size in whole kilobytes, rounding partial kilobytes up.
pub fn size_in_kb(bytes: u64) -> u64 {
    bytes.div_ceil(1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // calculate_scaled_dimensions
    // =========================================================================

    #[test]
    fn scaled_landscape() {
        assert_eq!(calculate_scaled_dimensions((4000, 3000), 200), (200, 150));
    }

    #[test]
    fn scaled_tall_portrait() {
        assert_eq!(calculate_scaled_dimensions((100, 4000), 200), (5, 200));
    }

    #[test]
    fn scaled_square() {
        assert_eq!(calculate_scaled_dimensions((500, 500), 115), (115, 115));
    }

    #[test]
    fn scaled_clamps_width_and_keeps_height_at_max() {
        assert_eq!(calculate_scaled_dimensions((1, 10_000), 200), (1, 200));
    }

    #[test]
    fn scaled_clamps_height_and_keeps_width_at_max() {
        assert_eq!(calculate_scaled_dimensions((20_000, 3), 640), (640, 1));
    }

    #[test]
    fn scaled_upscales_small_sources() {
        assert_eq!(calculate_scaled_dimensions((50, 25), 200), (200, 100));
    }

    #[test]
    fn scaled_handles_zero_dimensions() {
        let (w, h) = calculate_scaled_dimensions((0, 0), 100);
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn scaled_invariant_over_range_of_shapes() {
        let max = 173;
        for w in [1u32, 2, 3, 7, 50, 173, 174, 999, 4000, 65_000] {
            for h in [1u32, 2, 9, 64, 173, 500, 3001, 65_000] {
                let (ow, oh) = calculate_scaled_dimensions((w, h), max);
                assert!(ow >= 1 && oh >= 1, "{w}x{h} -> {ow}x{oh}");
                let longer = ow.max(oh);
                assert!(longer.abs_diff(max) <= 1, "{w}x{h} -> {ow}x{oh}");
                if w >= h {
                    assert_eq!(ow, max);
                } else {
                    assert_eq!(oh, max);
                }
            }
        }
    }

    // =========================================================================
    // calculate_fit_dimensions
    // =========================================================================

    #[test]
    fn fit_keeps_small_sources() {
        assert_eq!(calculate_fit_dimensions((80, 60), 115), (80, 60));
    }

    #[test]
    fn fit_scales_large_sources() {
        assert_eq!(calculate_fit_dimensions((2048, 1536), 1024), (1024, 768));
    }

    // =========================================================================
    // helpers
    // =========================================================================

    #[test]
    fn rotated_dimensions_swap_only_for_quarter_turns() {
        assert_eq!(rotated_dimensions((640, 480), true), (480, 640));
        assert_eq!(rotated_dimensions((640, 480), false), (640, 480));
    }

    #[test]
    fn aspect_ratio_rounds_to_two_decimals() {
        assert_eq!(aspect_ratio((1920, 1080)), 1.78);
        assert_eq!(aspect_ratio((640, 480)), 1.33);
        assert_eq!(aspect_ratio((10, 0)), 0.0);
    }

    #[test]
    fn size_in_kb_rounds_up() {
        assert_eq!(size_in_kb(0), 0);
        assert_eq!(size_in_kb(1), 1);
        assert_eq!(size_in_kb(1024), 1);
        assert_eq!(size_in_kb(1025), 2);
    }
}
