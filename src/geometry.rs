//! Window and crop math for the bubble: center-square cropping, resize
//! stepping, and the circle membership test behind the mask.

pub const DEFAULT_SIZE: u32 = 480;
pub const MIN_START_SIZE: u32 = 100;
pub const MIN_WINDOW_SIZE: u32 = 50;
pub const SIZE_STEP: u32 = 10;

/// How long a window-manager resize has to stay quiet before the
/// window is snapped back to a square.
pub const RESIZE_STABILIZE_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub side: u32,
}

/// Largest centered square inside a `width x height` frame.
pub fn center_square(width: u32, height: u32) -> CropRect {
    let side = width.min(height);
    CropRect {
        x: (width - side) / 2,
        y: (height - side) / 2,
        side,
    }
}

/// The same crop as normalized texture coordinates: `(origin, scale)`
/// such that `origin + uv * scale` maps the unit square onto the
/// centered square of the source frame.
pub fn crop_uv(width: u32, height: u32) -> ([f32; 2], [f32; 2]) {
    let crop = center_square(width, height);
    let w = width.max(1) as f32;
    let h = height.max(1) as f32;
    (
        [crop.x as f32 / w, crop.y as f32 / h],
        [crop.side as f32 / w, crop.side as f32 / h],
    )
}

pub fn step_up(size: u32) -> u32 {
    size.saturating_add(SIZE_STEP).max(MIN_WINDOW_SIZE)
}

pub fn step_down(size: u32) -> u32 {
    size.saturating_sub(SIZE_STEP).max(MIN_WINDOW_SIZE)
}

/// Whether pixel `(x, y)` of a `size`-square lies inside the inscribed
/// circle. Integer form: `dx^2 + dy^2 <= r^2` around the center.
pub fn in_circle(x: u32, y: u32, size: u32) -> bool {
    let center = (size / 2) as i64;
    let dx = x as i64 - center;
    let dy = y as i64 - center;
    dx * dx + dy * dy <= center * center
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_crop_is_centered() {
        let crop = center_square(640, 480);
        assert_eq!(crop, CropRect { x: 80, y: 0, side: 480 });
    }

    #[test]
    fn portrait_crop_is_centered() {
        let crop = center_square(480, 640);
        assert_eq!(crop, CropRect { x: 0, y: 80, side: 480 });
    }

    #[test]
    fn square_crop_is_identity() {
        let crop = center_square(512, 512);
        assert_eq!(crop, CropRect { x: 0, y: 0, side: 512 });
    }

    #[test]
    fn crop_uv_matches_integer_crop() {
        let (origin, scale) = crop_uv(640, 480);
        assert!((origin[0] - 80.0 / 640.0).abs() < 1e-6);
        assert!((origin[1] - 0.0).abs() < 1e-6);
        assert!((scale[0] - 480.0 / 640.0).abs() < 1e-6);
        assert!((scale[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn stepping_clamps_at_minimum() {
        assert_eq!(step_up(480), 490);
        assert_eq!(step_down(480), 470);
        assert_eq!(step_down(MIN_WINDOW_SIZE), MIN_WINDOW_SIZE);
        assert_eq!(step_down(54), MIN_WINDOW_SIZE);
        assert_eq!(step_up(0), MIN_WINDOW_SIZE);
    }

    #[test]
    fn circle_membership() {
        let size = 100;
        assert!(in_circle(50, 50, size));
        assert!(in_circle(50, 1, size));
        assert!(!in_circle(0, 0, size));
        assert!(!in_circle(99, 99, size));
        // On-circle points count as inside.
        assert!(in_circle(0, 50, size));
        assert!(in_circle(100 / 2, 0, size));
    }

    #[test]
    fn circle_covers_roughly_pi_over_four() {
        let size = 200u32;
        let inside = (0..size)
            .flat_map(|y| (0..size).map(move |x| (x, y)))
            .filter(|&(x, y)| in_circle(x, y, size))
            .count() as f64;
        let ratio = inside / (size as f64 * size as f64);
        assert!((ratio - std::f64::consts::PI / 4.0).abs() < 0.02, "ratio {}", ratio);
    }
}
