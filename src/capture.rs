// V4L2 capture worker. Owns the device on its own thread, converts each
// YUYV buffer to RGBA, publishes it into the shared latest-frame slot,
// and wakes the event loop through the winit proxy.
use bubblecam::{convert, log_error, log_info, log_warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};
use winit::event_loop::EventLoopProxy;

use crate::app::BubbleEvent;

pub const CAPTURE_WIDTH: u32 = 640;
pub const CAPTURE_HEIGHT: u32 = 480;

const BUFFER_COUNT: u32 = 4;
const MAX_CONSECUTIVE_ERRORS: u32 = 30;
const TEST_PATTERN_FPS: f32 = 30.0;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Cannot open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to query device capabilities: {0}")]
    QueryCaps(std::io::Error),
    #[error("Device does not support video capture")]
    NotACaptureDevice,
    #[error("Failed to negotiate format: {0}")]
    SetFormat(std::io::Error),
    #[error("Driver refused YUYV, offered {0} instead")]
    UnsupportedFormat(String),
}

pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Single-slot frame handoff: the capture thread overwrites, the event
/// loop takes. Stale frames are dropped, never queued.
pub type FrameSlot = Arc<Mutex<Option<Frame>>>;

pub enum FrameSource {
    Camera {
        device: Device,
        path: String,
        width: u32,
        height: u32,
    },
    TestPattern,
}

/// Open the device, require the capture capability, and negotiate
/// YUYV. The driver may adjust the resolution; whatever it settles on
/// is what the stream delivers.
pub fn open_camera(path: &str) -> Result<FrameSource, CaptureError> {
    let device = Device::with_path(path).map_err(|source| CaptureError::Open {
        path: path.to_string(),
        source,
    })?;

    let caps = device.query_caps().map_err(CaptureError::QueryCaps)?;
    if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
        return Err(CaptureError::NotACaptureDevice);
    }
    log_info!("Opened {} ({})", path, caps.card);

    let requested = Format::new(CAPTURE_WIDTH, CAPTURE_HEIGHT, FourCC::new(b"YUYV"));
    let actual = device
        .set_format(&requested)
        .map_err(CaptureError::SetFormat)?;

    if actual.fourcc != FourCC::new(b"YUYV") {
        return Err(CaptureError::UnsupportedFormat(actual.fourcc.to_string()));
    }
    if actual.width != CAPTURE_WIDTH || actual.height != CAPTURE_HEIGHT {
        log_warn!(
            "Driver adjusted capture size to {}x{}",
            actual.width,
            actual.height
        );
    }

    Ok(FrameSource::Camera {
        device,
        path: path.to_string(),
        width: actual.width,
        height: actual.height,
    })
}

pub fn spawn_capture_thread(
    source: FrameSource,
    slot: FrameSlot,
    proxy: EventLoopProxy<BubbleEvent>,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || match source {
        FrameSource::Camera {
            device,
            path,
            width,
            height,
        } => camera_loop(device, &path, width, height, slot, proxy, running),
        FrameSource::TestPattern => test_pattern_loop(slot, proxy, running),
    })
}

fn camera_loop(
    device: Device,
    path: &str,
    width: u32,
    height: u32,
    slot: FrameSlot,
    proxy: EventLoopProxy<BubbleEvent>,
    running: Arc<AtomicBool>,
) {
    log_info!("Capture thread started ({} {}x{})", path, width, height);

    let mut stream = match Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT) {
        Ok(s) => s,
        Err(e) => {
            log_error!("Failed to start streaming on {}: {}", path, e);
            let _ = proxy.send_event(BubbleEvent::CaptureFailed(format!(
                "Failed to start streaming on {}: {}",
                path, e
            )));
            return;
        }
    };

    let expected = width as usize * height as usize * 2;
    let mut consecutive_errors = 0u32;

    while running.load(Ordering::Relaxed) {
        match stream.next() {
            Ok((buf, meta)) => {
                consecutive_errors = 0;

                let used = meta.bytesused as usize;
                if used < expected {
                    log_warn!("Short frame ({} of {} bytes), skipping", used, expected);
                    continue;
                }

                match convert::yuyv_to_rgba(&buf[..expected], width, height) {
                    Ok(rgba) => {
                        *slot.lock() = Some(Frame {
                            width,
                            height,
                            rgba,
                        });
                        if proxy.send_event(BubbleEvent::Frame).is_err() {
                            break;
                        }
                    }
                    Err(e) => log_warn!("Frame conversion failed, skipping: {}", e),
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                log_warn!(
                    "Frame dequeue failed ({} in a row): {}",
                    consecutive_errors,
                    e
                );
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    let _ = proxy.send_event(BubbleEvent::CaptureFailed(format!(
                        "Capture gave up after {} consecutive dequeue errors: {}",
                        MAX_CONSECUTIVE_ERRORS, e
                    )));
                    return;
                }
            }
        }
    }

    log_info!("Capture thread stopped");
}

fn test_pattern_loop(slot: FrameSlot, proxy: EventLoopProxy<BubbleEvent>, running: Arc<AtomicBool>) {
    log_info!(
        "Test pattern source started ({}x{} @ {} fps)",
        CAPTURE_WIDTH,
        CAPTURE_HEIGHT,
        TEST_PATTERN_FPS
    );

    let period = Duration::from_secs_f32(1.0 / TEST_PATTERN_FPS);
    let mut tick = 0u32;

    while running.load(Ordering::Relaxed) {
        let rgba = test_pattern_rgba(CAPTURE_WIDTH, CAPTURE_HEIGHT, tick);
        *slot.lock() = Some(Frame {
            width: CAPTURE_WIDTH,
            height: CAPTURE_HEIGHT,
            rgba,
        });
        if proxy.send_event(BubbleEvent::Frame).is_err() {
            break;
        }

        tick = tick.wrapping_add(1);
        spin_sleep::sleep(period);
    }

    log_info!("Test pattern source stopped");
}

/// Moving gradient with a coarse checker, enough to judge cropping and
/// masking without a camera.
fn test_pattern_rgba(width: u32, height: u32, tick: u32) -> Vec<u8> {
    let mut pixels = vec![0u8; (width * height * 4) as usize];
    let shift = (tick * 2) % 256;

    for y in 0..height {
        for x in 0..width {
            let i = ((y * width + x) * 4) as usize;
            let fx = x as f32 / width as f32;
            let fy = y as f32 / height as f32;
            let checker = (((x / 40) + (y / 40)) % 2) as f32;

            pixels[i] = ((fx * 200.0) as u32 + shift as u32).min(255) as u8;
            pixels[i + 1] = (fy * 220.0 + checker * 35.0) as u8;
            pixels[i + 2] = (255.0 - fx * 180.0) as u8;
            pixels[i + 3] = 255;
        }
    }

    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_shape() {
        let rgba = test_pattern_rgba(64, 48, 0);
        assert_eq!(rgba.len(), 64 * 48 * 4);
        for px in rgba.chunks_exact(4) {
            assert_eq!(px[3], 255);
        }
    }

    #[test]
    fn test_pattern_animates() {
        let a = test_pattern_rgba(64, 48, 0);
        let b = test_pattern_rgba(64, 48, 10);
        assert_ne!(a, b);
    }
}
