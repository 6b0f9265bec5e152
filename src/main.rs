mod app;
mod capture;
mod renderer;

use anyhow::Result;
use app::{BubbleApp, BubbleEvent, BubbleOptions};
use bubblecam::{geometry, log_error, log_info, StateManager};
use capture::FrameSource;
use std::sync::Arc;
use winit::event_loop::EventLoop;

#[derive(Debug, Default, PartialEq)]
struct CliOptions {
    device: Option<String>,
    size: Option<u32>,
    always_on_top: bool,
    fps: Option<f32>,
    test_pattern: bool,
}

fn parse_args(args: &[String]) -> Result<CliOptions, String> {
    let mut opts = CliOptions::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-t" => {
                opts.always_on_top = true;
            }
            "-s" => {
                i += 1;
                let value = args.get(i).ok_or("-s requires a size value")?;
                let size: u32 = value
                    .parse()
                    .map_err(|_| format!("Invalid size: {}", value))?;
                if size < geometry::MIN_START_SIZE {
                    return Err(format!(
                        "Size must be at least {} pixels",
                        geometry::MIN_START_SIZE
                    ));
                }
                opts.size = Some(size);
            }
            "--fps" => {
                i += 1;
                let value = args.get(i).ok_or("--fps requires a value")?;
                let fps: f32 = value
                    .parse()
                    .map_err(|_| format!("Invalid fps: {}", value))?;
                if !(fps > 0.0) {
                    return Err(format!("fps must be positive, got {}", value));
                }
                opts.fps = Some(fps);
            }
            "--test-pattern" => {
                opts.test_pattern = true;
            }
            flag if flag.starts_with('-') => {
                return Err(format!("Unknown option: {}", flag));
            }
            device => {
                if opts.device.is_some() {
                    return Err(format!("Unexpected extra argument: {}", device));
                }
                opts.device = Some(device.to_string());
            }
        }
        i += 1;
    }

    Ok(opts)
}

fn usage(program: &str) {
    eprintln!(
        "Usage: {} [-t] [-s <size>] [--fps <n>] [--test-pattern] [<video_device>]",
        program
    );
    eprintln!("Example: {} -t -s 256 /dev/video0", program);
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let opts = match parse_args(&args[1..]) {
        Ok(opts) => opts,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            usage(&args[0]);
            std::process::exit(1);
        }
    };

    let state = Arc::new(StateManager::new()?);
    let retention = state.read(|s| s.log_retention_count);
    bubblecam::logger::init_logger(state.logs_dir(), retention)?;

    // Session settings: CLI wins, persisted state fills the gaps.
    let size = opts.size.unwrap_or_else(|| state.read(|s| s.last_size));
    let target_fps = opts.fps.or_else(|| state.read(|s| s.target_fps));
    if opts.fps.is_some() {
        state.update(|s| s.target_fps = opts.fps);
    }

    let source = if opts.test_pattern {
        FrameSource::TestPattern
    } else {
        let device = opts
            .device
            .clone()
            .or_else(|| state.read(|s| s.last_device.clone()));
        let Some(device) = device else {
            eprintln!("Error: No video device specified");
            usage(&args[0]);
            bubblecam::logger::finalize_logs()?;
            std::process::exit(1);
        };

        match capture::open_camera(&device) {
            Ok(source) => {
                state.update(|s| s.last_device = Some(device.clone()));
                source
            }
            Err(e) => {
                log_error!("{}", e);
                eprintln!("Error: {}", e);
                bubblecam::logger::finalize_logs()?;
                std::process::exit(1);
            }
        }
    };

    log_info!(
        "Starting bubble (size {}, fps cap {:?}, always-on-top {})",
        size,
        target_fps,
        opts.always_on_top
    );
    bubblecam::logger::flush_logs()?;

    let event_loop = EventLoop::<BubbleEvent>::with_user_event().build()?;
    let proxy = event_loop.create_proxy();

    let mut app = BubbleApp::new(
        Arc::clone(&state),
        BubbleOptions {
            size,
            always_on_top: opts.always_on_top,
            target_fps,
        },
        source,
        proxy,
    );

    let run_result = event_loop.run_app(&mut app);
    let failure = app.take_failure();

    bubblecam::logger::finalize_logs()?;
    run_result?;

    if let Some(message) = failure {
        anyhow::bail!("{}", message);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_full_invocation() {
        let opts = parse_args(&to_args(&["-t", "-s", "256", "/dev/video0"])).unwrap();
        assert!(opts.always_on_top);
        assert_eq!(opts.size, Some(256));
        assert_eq!(opts.device.as_deref(), Some("/dev/video0"));
        assert!(!opts.test_pattern);
    }

    #[test]
    fn device_is_optional() {
        let opts = parse_args(&to_args(&["-t"])).unwrap();
        assert_eq!(opts.device, None);
    }

    #[test]
    fn flag_order_does_not_matter() {
        let a = parse_args(&to_args(&["/dev/video2", "-t"])).unwrap();
        let b = parse_args(&to_args(&["-t", "/dev/video2"])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_small_size() {
        let err = parse_args(&to_args(&["-s", "99"])).unwrap_err();
        assert!(err.contains("at least"));
    }

    #[test]
    fn rejects_missing_size_value() {
        assert!(parse_args(&to_args(&["-s"])).is_err());
        assert!(parse_args(&to_args(&["-s", "abc"])).is_err());
    }

    #[test]
    fn rejects_bad_fps() {
        assert!(parse_args(&to_args(&["--fps", "0"])).is_err());
        assert!(parse_args(&to_args(&["--fps", "-5"])).is_err());
        assert!(parse_args(&to_args(&["--fps", "nan"])).is_err());
        assert_eq!(
            parse_args(&to_args(&["--fps", "24"])).unwrap().fps,
            Some(24.0)
        );
    }

    #[test]
    fn rejects_unknown_flag_and_extra_positional() {
        assert!(parse_args(&to_args(&["--frobnicate"])).is_err());
        assert!(parse_args(&to_args(&["/dev/video0", "/dev/video1"])).is_err());
    }

    #[test]
    fn test_pattern_flag() {
        let opts = parse_args(&to_args(&["--test-pattern"])).unwrap();
        assert!(opts.test_pattern);
    }
}
