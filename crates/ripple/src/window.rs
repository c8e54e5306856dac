use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Sender};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use tracing::{debug, error, info, warn};

use crate::driver::Phase;
use crate::error::InitError;
use crate::gpu::GpuState;
use crate::pointer::{PointerEvent, PointerInbox, PointerKind};
use crate::source::open_source;
use crate::types::RendererConfig;

/// Window, renderer and pointer bookkeeping for one event loop.
struct WindowState {
    window: Arc<Window>,
    gpu: Option<GpuState>,
    pointer: PointerInbox,
    cursor: Option<PhysicalPosition<f64>>,
}

impl WindowState {
    fn new(window: Arc<Window>, config: &RendererConfig) -> Result<Self, InitError> {
        let source = open_source(&config.source)?;
        let gpu = GpuState::new(window.as_ref(), window.inner_size(), config, source)?;
        let pointer = gpu.pointer();
        Ok(Self {
            window,
            gpu: Some(gpu),
            pointer,
            cursor: None,
        })
    }

    fn window(&self) -> &Window {
        self.window.as_ref()
    }

    fn is_running(&self) -> bool {
        self.gpu
            .as_ref()
            .is_some_and(|gpu| gpu.phase() != Phase::Disposed)
    }

    fn surface_size(&self) -> PhysicalSize<u32> {
        self.gpu
            .as_ref()
            .map(|gpu| gpu.size())
            .unwrap_or_else(|| self.window.inner_size())
    }

    fn post_pointer(&self, kind: PointerKind, position: PhysicalPosition<f64>) {
        let size = self.surface_size();
        if let Some(event) =
            PointerEvent::from_surface(kind, (position.x, position.y), (size.width, size.height))
        {
            self.pointer.post(event);
        }
    }

    fn handle_cursor_moved(&mut self, position: PhysicalPosition<f64>) {
        self.cursor = Some(position);
        self.post_pointer(PointerKind::Move, position);
    }

    fn handle_press(&mut self) {
        if let Some(position) = self.cursor {
            self.post_pointer(PointerKind::Down, position);
        }
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.resize(new_size);
        }
    }

    /// Flags the simulation disposed first so no queued redraw can tick,
    /// then releases every GPU object.
    fn teardown(&mut self) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.dispose();
        }
        if self.gpu.take().is_some() {
            debug!("GPU resources released");
        }
    }

    /// Returns `Err` only for failures that end the loop.
    fn render_frame(&mut self) -> Result<(), wgpu::SurfaceError> {
        let Some(gpu) = self.gpu.as_mut() else {
            return Ok(());
        };
        match gpu.render() {
            Ok(()) => Ok(()),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                debug!("surface lost or outdated; reconfiguring");
                gpu.reconfigure();
                Ok(())
            }
            Err(wgpu::SurfaceError::Timeout) => {
                debug!("surface timeout; skipping tick");
                Ok(())
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(wgpu::SurfaceError::OutOfMemory),
            Err(other) => {
                warn!(error = ?other, "surface error; retrying next tick");
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone)]
enum RuntimeCommand {
    Shutdown,
}

type ReadySender = Sender<Result<(EventLoopProxy<RuntimeCommand>, PointerInbox), InitError>>;

/// Handle to a ripple window running on its own thread.
pub struct RippleRuntime {
    proxy: EventLoopProxy<RuntimeCommand>,
    pointer: PointerInbox,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl RippleRuntime {
    /// Opens the window on a dedicated thread. Returns once the renderer is
    /// ready, or with the fatal [`InitError`] that prevented it.
    pub fn spawn(config: RendererConfig) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("ripple-window".into())
            .spawn(move || run_event_loop(config, true, Some(ready_tx)))
            .map_err(|err| anyhow!("failed to spawn window thread: {err}"))?;

        let (proxy, pointer) = ready_rx
            .recv()
            .map_err(|err| anyhow!("window thread exited before initialising: {err}"))??;

        Ok(Self {
            proxy,
            pointer,
            join_handle: Some(handle),
        })
    }

    /// Runs the window on the calling thread until it is closed.
    pub fn run(config: RendererConfig) -> Result<()> {
        run_event_loop(config, false, None)
    }

    /// Inbox for pointer events from providers other than the window itself.
    pub fn pointer(&self) -> PointerInbox {
        self.pointer.clone()
    }

    pub fn shutdown(mut self) -> Result<()> {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(RuntimeCommand::Shutdown);
            handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))??;
        }
        Ok(())
    }
}

impl Drop for RippleRuntime {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(RuntimeCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

fn build_event_loop(any_thread: bool) -> Result<EventLoop<RuntimeCommand>, InitError> {
    let mut builder = EventLoopBuilder::<RuntimeCommand>::with_user_event();
    if any_thread {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            use winit::platform::wayland::EventLoopBuilderExtWayland;
            EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
        }

        #[cfg(any(
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd",
            target_os = "dragonfly"
        ))]
        {
            use winit::platform::x11::EventLoopBuilderExtX11;
            EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
        }

        #[cfg(target_os = "windows")]
        {
            use winit::platform::windows::EventLoopBuilderExtWindows;
            EventLoopBuilderExtWindows::with_any_thread(&mut builder, true);
        }
    }
    builder
        .build()
        .map_err(|err| InitError::Window(format!("failed to create event loop: {err}")))
}

fn initialise(
    config: &RendererConfig,
    any_thread: bool,
) -> Result<(EventLoop<RuntimeCommand>, WindowState), InitError> {
    let event_loop = build_event_loop(any_thread)?;
    let window = WindowBuilder::new()
        .with_title(config.title.clone())
        .with_inner_size(PhysicalSize::new(config.surface_size.0, config.surface_size.1))
        .build(&event_loop)
        .map_err(|err| InitError::Window(err.to_string()))?;
    let state = WindowState::new(Arc::new(window), config)?;
    Ok((event_loop, state))
}

fn run_event_loop(config: RendererConfig, any_thread: bool, ready: Option<ReadySender>) -> Result<()> {
    let (event_loop, mut state) = match initialise(&config, any_thread) {
        Ok(parts) => parts,
        Err(err) => {
            error!(error = %err, "ripple renderer failed to initialise");
            return match ready {
                Some(ready_tx) => {
                    let _ = ready_tx.send(Err(err));
                    Ok(())
                }
                None => Err(err.into()),
            };
        }
    };

    if let Some(gpu) = state.gpu.as_ref() {
        let profile = gpu.adapter_profile();
        info!(
            adapter = %profile.name,
            backend = ?profile.backend,
            source = %config.source,
            "ripple window ready"
        );
        if profile.is_software() {
            warn!(adapter = %profile.name, "software rasterizer detected; expect a low tick rate");
        }
    }
    if let Some(ready_tx) = ready {
        let _ = ready_tx.send(Ok((event_loop.create_proxy(), state.pointer.clone())));
    }
    state.window().request_redraw();

    let mut fatal: Option<anyhow::Error> = None;
    let fatal_slot = &mut fatal;
    let run_result = event_loop.run(move |event, elwt| {
        handle_event(&mut state, event, elwt, fatal_slot);
    });

    if let Some(err) = fatal {
        return Err(err);
    }
    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

fn handle_event(
    state: &mut WindowState,
    event: Event<RuntimeCommand>,
    elwt: &EventLoopWindowTarget<RuntimeCommand>,
    fatal: &mut Option<anyhow::Error>,
) {
    match event {
        Event::UserEvent(RuntimeCommand::Shutdown) => {
            state.teardown();
            elwt.exit();
        }
        Event::WindowEvent { window_id, event } if window_id == state.window().id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                state.teardown();
                elwt.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && matches!(event.logical_key, Key::Named(NamedKey::Escape))
                {
                    state.teardown();
                    elwt.exit();
                }
            }
            WindowEvent::CursorMoved { position, .. } => state.handle_cursor_moved(position),
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => state.handle_press(),
            WindowEvent::Resized(new_size) => state.resize(new_size),
            WindowEvent::RedrawRequested => {
                if let Err(err) = state.render_frame() {
                    error!(error = ?err, "surface out of memory; shutting down");
                    state.teardown();
                    *fatal = Some(anyhow!("surface error: {err}"));
                    elwt.exit();
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            if state.is_running() {
                state.window().request_redraw();
            }
            elwt.set_control_flow(ControlFlow::Wait);
        }
        _ => {}
    }
}
