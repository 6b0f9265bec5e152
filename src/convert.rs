use anyhow::Result;

// Integer BT.601 limited-range conversion, same coefficients the usual
// V4L2 consumers apply to YUYV webcam output.
#[inline]
fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = cb as i32 - 128;
    let e = cr as i32 - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;

    [
        r.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        b.clamp(0, 255) as u8,
    ]
}

/// Expand a packed YUYV (YUY2) buffer into tightly packed RGBA.
///
/// YUYV stores two pixels per four bytes (Y0 U Y1 V), so the width must
/// be even. Output is `width * height * 4` bytes with alpha forced to
/// 255.
pub fn yuyv_to_rgba(src: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    if width % 2 != 0 {
        anyhow::bail!("YUYV requires an even width, got {}", width);
    }

    let expected = width as usize * height as usize * 2;
    if src.len() < expected {
        anyhow::bail!(
            "YUYV buffer too short: {} bytes for {}x{} ({} expected)",
            src.len(),
            width,
            height,
            expected
        );
    }

    let mut out = Vec::with_capacity(width as usize * height as usize * 4);
    for quad in src[..expected].chunks_exact(4) {
        let (y0, cb, y1, cr) = (quad[0], quad[1], quad[2], quad[3]);

        let [r, g, b] = ycbcr_to_rgb(y0, cb, cr);
        out.extend_from_slice(&[r, g, b, 255]);

        let [r, g, b] = ycbcr_to_rgb(y1, cb, cr);
        out.extend_from_slice(&[r, g, b, 255]);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_near(actual: [u8; 3], expected: [u8; 3]) {
        for (a, e) in actual.iter().zip(expected.iter()) {
            let diff = (*a as i32 - *e as i32).abs();
            assert!(diff <= 2, "{:?} != {:?} (diff {})", actual, expected, diff);
        }
    }

    #[test]
    fn black_and_white_levels() {
        assert_near(ycbcr_to_rgb(16, 128, 128), [0, 0, 0]);
        assert_near(ycbcr_to_rgb(235, 128, 128), [255, 255, 255]);
    }

    #[test]
    fn primary_colors() {
        // Limited-range BT.601 encodings of pure red, green, blue.
        assert_near(ycbcr_to_rgb(81, 90, 240), [255, 0, 0]);
        assert_near(ycbcr_to_rgb(145, 54, 34), [0, 255, 0]);
        assert_near(ycbcr_to_rgb(41, 240, 110), [0, 0, 255]);
    }

    #[test]
    fn superblack_and_superwhite_clamp() {
        assert_eq!(ycbcr_to_rgb(0, 128, 128), [0, 0, 0]);
        assert_eq!(ycbcr_to_rgb(255, 128, 128), [255, 255, 255]);
    }

    #[test]
    fn output_shape_and_alpha() {
        // 4x2 mid-gray frame.
        let src = vec![128u8; 4 * 2 * 2];
        let rgba = yuyv_to_rgba(&src, 4, 2).unwrap();
        assert_eq!(rgba.len(), 4 * 2 * 4);
        for px in rgba.chunks_exact(4) {
            assert_eq!(px[3], 255);
        }
    }

    #[test]
    fn shared_chroma_within_pair() {
        // One pixel pair: distinct lumas, shared chroma.
        let src = [100u8, 128, 200, 128];
        let rgba = yuyv_to_rgba(&src, 2, 1).unwrap();
        let first = &rgba[0..3];
        let second = &rgba[4..7];
        // Neutral chroma: both gray, second brighter.
        assert!(second[0] > first[0]);
        assert_eq!(first[0], first[1]);
        assert_eq!(second[1], second[2]);
    }

    #[test]
    fn odd_width_rejected() {
        assert!(yuyv_to_rgba(&[0u8; 6], 3, 1).is_err());
    }

    #[test]
    fn short_buffer_rejected() {
        assert!(yuyv_to_rgba(&[0u8; 8], 4, 2).is_err());
    }
}
