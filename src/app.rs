// The bubble itself: window creation, drag/resize/dismiss handling,
// frame wakeups, and the redraw path.
use bubblecam::{geometry, log_error, log_info, log_warn, StateManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoopProxy};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId, WindowLevel};

use crate::capture::{self, Frame, FrameSlot, FrameSource};
use crate::renderer::BubbleRenderer;

#[derive(Debug)]
pub enum BubbleEvent {
    Frame,
    CaptureFailed(String),
}

pub struct BubbleOptions {
    pub size: u32,
    pub always_on_top: bool,
    pub target_fps: Option<f32>,
}

pub struct BubbleApp {
    state: Arc<StateManager>,
    options: BubbleOptions,
    proxy: EventLoopProxy<BubbleEvent>,

    window: Option<Arc<Window>>,
    renderer: Option<BubbleRenderer>,

    source: Option<FrameSource>,
    frame_slot: FrameSlot,
    running: Arc<AtomicBool>,
    capture_thread: Option<thread::JoinHandle<()>>,
    latest_frame: Option<Frame>,

    current_size: u32,
    pending_resize: Option<(u32, Instant)>,

    last_present: Instant,
    render_error_count: u32,
    last_render_error_log: Instant,

    failure: Option<String>,
}

impl BubbleApp {
    pub fn new(
        state: Arc<StateManager>,
        options: BubbleOptions,
        source: FrameSource,
        proxy: EventLoopProxy<BubbleEvent>,
    ) -> Self {
        let current_size = options.size;
        Self {
            state,
            options,
            proxy,
            window: None,
            renderer: None,
            source: Some(source),
            frame_slot: Arc::new(parking_lot::Mutex::new(None)),
            running: Arc::new(AtomicBool::new(true)),
            capture_thread: None,
            latest_frame: None,
            current_size,
            pending_resize: None,
            last_present: Instant::now(),
            render_error_count: 0,
            last_render_error_log: Instant::now(),
            failure: None,
        }
    }

    /// Set when the session had to stop on a capture or setup error;
    /// main turns this into a nonzero exit.
    pub fn take_failure(&mut self) -> Option<String> {
        self.failure.take()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, message: String) {
        log_error!("{}", message);
        self.failure = Some(message);
        event_loop.exit();
    }

    fn apply_size(&mut self, size: u32) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        let _ = window.request_inner_size(PhysicalSize::new(size, size));
        self.current_size = size;
        self.pending_resize = None;
        self.state.update(|s| s.last_size = size);
    }

    fn save_snapshot(&self) {
        let Some(frame) = self.latest_frame.as_ref() else {
            log_warn!("No frame captured yet, snapshot skipped");
            return;
        };

        let crop = geometry::center_square(frame.width, frame.height);
        let side = crop.side;
        let mut out = Vec::with_capacity((side * side * 4) as usize);
        for y in 0..side {
            for x in 0..side {
                let sx = crop.x + x;
                let sy = crop.y + y;
                let i = ((sy * frame.width + sx) * 4) as usize;
                let alpha = if geometry::in_circle(x, y, side) { 255 } else { 0 };
                out.extend_from_slice(&[
                    frame.rgba[i],
                    frame.rgba[i + 1],
                    frame.rgba[i + 2],
                    alpha,
                ]);
            }
        }

        let Some(img) = image::RgbaImage::from_raw(side, side, out) else {
            log_warn!("Snapshot buffer had unexpected size, skipped");
            return;
        };

        let name = format!(
            "bubble_{}.png",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        let path = self.state.snapshots_dir().join(name);
        match img.save(&path) {
            Ok(()) => log_info!("Saved snapshot {}", path.display()),
            Err(e) => log_warn!("Failed to save snapshot: {}", e),
        }
    }

    fn redraw(&mut self) {
        if let Some(fps) = self.options.target_fps {
            let budget = Duration::from_secs_f32(1.0 / fps);
            let elapsed = self.last_present.elapsed();
            if elapsed < budget {
                spin_sleep::sleep(budget - elapsed);
            }
        }

        if let Some(renderer) = self.renderer.as_mut() {
            if let Err(e) = renderer.render() {
                self.render_error_count += 1;
                if self.last_render_error_log.elapsed().as_secs() >= 1 {
                    log_error!("Render error (count: {}): {}", self.render_error_count, e);
                    self.last_render_error_log = Instant::now();
                }
            }
        }

        self.last_present = Instant::now();
    }
}

impl ApplicationHandler<BubbleEvent> for BubbleApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let level = if self.options.always_on_top {
            WindowLevel::AlwaysOnTop
        } else {
            WindowLevel::Normal
        };

        let mut attrs = Window::default_attributes()
            .with_title("bubblecam")
            .with_inner_size(PhysicalSize::new(self.current_size, self.current_size))
            .with_min_inner_size(PhysicalSize::new(
                geometry::MIN_WINDOW_SIZE,
                geometry::MIN_WINDOW_SIZE,
            ))
            .with_decorations(false)
            .with_transparent(true)
            .with_resizable(true)
            .with_window_level(level);

        if let Some((x, y)) = self.state.read(|s| s.window_pos) {
            attrs = attrs.with_position(PhysicalPosition::new(x, y));
        }

        let window = match event_loop.create_window(attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, format!("Failed to create window: {}", e));
                return;
            }
        };

        match BubbleRenderer::new(Arc::clone(&window)) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                self.fail(event_loop, format!("Failed to initialize renderer: {}", e));
                return;
            }
        }

        if let Some(source) = self.source.take() {
            self.capture_thread = Some(capture::spawn_capture_thread(
                source,
                Arc::clone(&self.frame_slot),
                self.proxy.clone(),
                Arc::clone(&self.running),
            ));
        }

        log_info!(
            "Bubble window created ({0}x{0}, always-on-top: {1})",
            self.current_size,
            self.options.always_on_top
        );
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Escape) => event_loop.exit(),
                    PhysicalKey::Code(KeyCode::Equal | KeyCode::NumpadAdd) => {
                        self.apply_size(geometry::step_up(self.current_size));
                    }
                    PhysicalKey::Code(KeyCode::Minus | KeyCode::NumpadSubtract) => {
                        self.apply_size(geometry::step_down(self.current_size));
                    }
                    PhysicalKey::Code(KeyCode::KeyP) => self.save_snapshot(),
                    _ => {}
                }
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                if let Some(window) = self.window.as_ref() {
                    if let Err(e) = window.drag_window() {
                        log_warn!("Window drag not available: {}", e);
                    }
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32,
                };
                if scroll > 0.0 {
                    self.apply_size(geometry::step_up(self.current_size));
                } else if scroll < 0.0 {
                    self.apply_size(geometry::step_down(self.current_size));
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }

                // A WM resize is rarely square; remember the smaller
                // side and snap once the stream of resize events goes
                // quiet.
                let snapped = size.width.min(size.height);
                if snapped >= geometry::MIN_WINDOW_SIZE && snapped != self.current_size {
                    self.pending_resize = Some((snapped, Instant::now()));
                } else if size.width == size.height {
                    self.pending_resize = None;
                }

                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }
            WindowEvent::Moved(pos) => {
                self.state.update(|s| s.window_pos = Some((pos.x, pos.y)));
            }
            WindowEvent::RedrawRequested => {
                self.redraw();
            }
            _ => {}
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: BubbleEvent) {
        match event {
            BubbleEvent::Frame => {
                if let Some(frame) = self.frame_slot.lock().take() {
                    if let Some(renderer) = self.renderer.as_mut() {
                        renderer.upload(&frame);
                    }
                    self.latest_frame = Some(frame);
                }
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }
            BubbleEvent::CaptureFailed(message) => {
                self.fail(event_loop, message);
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let stabilize = Duration::from_millis(geometry::RESIZE_STABILIZE_MS);
        match self.pending_resize {
            Some((size, at)) if at.elapsed() >= stabilize => {
                log_info!("Window resized to {0}x{0}", size);
                self.apply_size(size);
                event_loop.set_control_flow(ControlFlow::Wait);
            }
            Some((_, at)) => {
                event_loop.set_control_flow(ControlFlow::WaitUntil(at + stabilize));
            }
            None => {
                event_loop.set_control_flow(ControlFlow::Wait);
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }
        log_info!("Bubble dismissed");
    }
}
