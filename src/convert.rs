//! Internal pixel-channel conversions.
//!
//! Helpers shared by the frame types and the FFmpeg sink. Both directions are
//! straight per-pixel copies; anything fancier (resampling, color spaces) is
//! the `image` crate's or FFmpeg's job.

/// Expand tightly-packed RGB bytes to RGBA with an opaque alpha channel.
pub(crate) fn rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgb.len() / 3 * 4);
    for pixel in rgb.chunks_exact(3) {
        out.extend_from_slice(pixel);
        out.push(u8::MAX);
    }
    out
}

/// Drop the alpha channel from tightly-packed RGBA bytes.
pub(crate) fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgba.len() / 4 * 3);
    for pixel in rgba.chunks_exact(4) {
        out.extend_from_slice(&pixel[..3]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_to_rgba_adds_opaque_alpha() {
        let rgb = [1, 2, 3, 4, 5, 6];
        assert_eq!(rgb_to_rgba(&rgb), vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn rgba_to_rgb_drops_alpha() {
        let rgba = [1, 2, 3, 9, 4, 5, 6, 0];
        assert_eq!(rgba_to_rgb(&rgba), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn round_trip_preserves_color_bytes() {
        let rgb = [10, 20, 30, 40, 50, 60, 70, 80, 90];
        assert_eq!(rgba_to_rgb(&rgb_to_rgba(&rgb)), rgb.to_vec());
    }
}
