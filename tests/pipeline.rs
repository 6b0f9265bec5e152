// End-to-end over the pure pipeline: YUYV frame in, cropped and
// circle-masked RGBA out, the same path the snapshot writer takes.
use bubblecam::{convert, geometry};

fn solid_yuyv(width: u32, height: u32, y: u8, cb: u8, cr: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity((width * height * 2) as usize);
    for _ in 0..(width * height / 2) {
        buf.extend_from_slice(&[y, cb, y, cr]);
    }
    buf
}

#[test]
fn masked_crop_of_a_camera_frame() {
    let (width, height) = (640, 480);
    let yuyv = solid_yuyv(width, height, 235, 128, 128);

    let rgba = convert::yuyv_to_rgba(&yuyv, width, height).unwrap();
    assert_eq!(rgba.len(), (width * height * 4) as usize);

    let crop = geometry::center_square(width, height);
    assert_eq!(crop.side, 480);
    assert_eq!(crop.x, 80);

    // Apply the snapshot mask over the cropped square.
    let side = crop.side;
    let mut inside = 0usize;
    let mut outside = 0usize;
    for y in 0..side {
        for x in 0..side {
            let sx = crop.x + x;
            let sy = crop.y + y;
            let i = ((sy * width + sx) * 4) as usize;
            // A white frame stays white everywhere in the crop.
            assert!(rgba[i] >= 253);
            if geometry::in_circle(x, y, side) {
                inside += 1;
            } else {
                outside += 1;
            }
        }
    }

    // The mask keeps the inscribed circle and drops the corners.
    assert!(inside > outside);
    let ratio = inside as f64 / (side as f64 * side as f64);
    assert!((ratio - std::f64::consts::PI / 4.0).abs() < 0.02);
}

#[test]
fn crop_uv_stays_inside_unit_square() {
    for (w, h) in [(640u32, 480u32), (480, 640), (1280, 720), (2, 2)] {
        let (origin, scale) = geometry::crop_uv(w, h);
        for axis in 0..2 {
            assert!(origin[axis] >= 0.0);
            assert!(origin[axis] + scale[axis] <= 1.0 + 1e-6);
        }
    }
}
