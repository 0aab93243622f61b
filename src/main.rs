//! bimview binary: window shell and event loop.
//!
//! Wires winit events into the viewer session: drag-and-drop loads, click
//! picking, orbit/pan/zoom navigation, toolbar keys and the render loop
//! with surface-loss recovery.

use std::sync::Arc;

use anyhow::Result;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalPosition;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowId};

use bimview::engine::{EngineConfig, EngineHandle};
use bimview::model::ModelSource;
use bimview::scene::SceneContext;
use bimview::viewer::{ViewerSession, action_for_key};
use bimview::ViewerConfig;

struct AppState {
    window: Arc<Window>,
    engine: EngineHandle,
    scene: SceneContext,
    session: ViewerSession,
    surface_configured: bool,
    cursor: PhysicalPosition<f64>,
    orbiting: bool,
    panning: bool,
}

struct App {
    runtime: tokio::runtime::Runtime,
    config: ViewerConfig,
    state: Option<AppState>,
}

impl App {
    fn new() -> Result<Self> {
        Ok(Self {
            runtime: tokio::runtime::Runtime::new()?,
            config: ViewerConfig::default(),
            state: None,
        })
    }

    /// Kick off a dispose-then-load cycle on the runtime. The event loop
    /// keeps running; completion is picked up from the redraw handler.
    fn load(&mut self, source: ModelSource) {
        let Some(state) = &mut self.state else {
            return;
        };
        state.session.replace_model(
            self.runtime.handle(),
            &state.engine,
            &mut state.scene,
            source,
        );
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        let window = Arc::new(
            event_loop
                .create_window(Window::default_attributes().with_title("bimview"))
                .expect("window creation failed"),
        );
        let size = window.inner_size();

        let engine = match self.runtime.block_on(EngineHandle::create(
            window.clone(),
            EngineConfig::from_viewer(&self.config),
        )) {
            Ok(engine) => engine,
            Err(error) => {
                log::error!("no usable rendering backend: {error}");
                event_loop.exit();
                return;
            }
        };
        let scene = SceneContext::new(&engine, [size.width, size.height], self.config.clone());
        let session = ViewerSession::new(self.config.clone());

        self.state = Some(AppState {
            surface_configured: size.width > 0 && size.height > 0,
            window: window.clone(),
            engine,
            scene,
            session,
            cursor: PhysicalPosition::new(0.0, 0.0),
            orbiting: false,
            panning: false,
        });

        if let Some(path) = std::env::args().nth(1) {
            self.load(ModelSource::Path(path.into()));
        }
        window.request_redraw();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(state) = &mut self.state {
                    state.scene.dispose();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    state.scene.resize(&state.engine, [size.width, size.height]);
                    state.surface_configured = size.width > 0 && size.height > 0;
                }
            }
            WindowEvent::DroppedFile(path) => {
                let Some(state) = &self.state else { return };
                let name = path
                    .file_name()
                    .and_then(|value| value.to_str())
                    .unwrap_or_default()
                    .to_string();
                if state.session.accepts_file(&name) {
                    self.load(ModelSource::Path(path));
                } else {
                    log::warn!("rejected '{name}': only .glb files are supported");
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                if let Some(action) = action_for_key(code) {
                    if let Some(state) = &mut self.state {
                        state.session.handle_action(&mut state.scene, action);
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let Some(state) = &mut self.state else { return };
                let dx = (position.x - state.cursor.x) as f32;
                let dy = (position.y - state.cursor.y) as f32;
                state.cursor = position;
                if state.orbiting {
                    state.scene.camera.camera.orbit(dx, dy);
                } else if state.panning {
                    state.scene.camera.camera.pan(dx, dy);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let Some(state) = &mut self.state else { return };
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 * 0.05,
                };
                state.scene.camera.camera.zoom(scroll);
            }
            WindowEvent::MouseInput { state: element_state, button, .. } => {
                let pressed = element_state == ElementState::Pressed;
                let Some(state) = &mut self.state else { return };
                match button {
                    MouseButton::Right => state.orbiting = pressed,
                    MouseButton::Middle => state.panning = pressed,
                    MouseButton::Left if pressed => {
                        let id = self.runtime.block_on(
                            state
                                .scene
                                .pick(state.session.model.as_ref(), state.cursor),
                        );
                        state.session.handle_pick(&mut state.scene, id);
                    }
                    _ => {}
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else { return };
                state.window.request_redraw();
                state.session.poll_load(&mut state.scene);
                if !state.surface_configured {
                    return;
                }
                match state
                    .scene
                    .render(&state.engine, state.session.model.as_ref())
                {
                    Ok(()) => {
                        state
                            .session
                            .frame_presented(Some(&state.window), &mut state.scene);
                    }
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = state.window.inner_size();
                        state.scene.resize(&state.engine, [size.width, size.height]);
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("surface out of memory, exiting");
                        event_loop.exit();
                    }
                    Err(error) => log::warn!("frame skipped: {error:?}"),
                }
            }
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let event_loop = EventLoop::new()?;
    let mut app = App::new()?;
    event_loop.run_app(&mut app)?;
    Ok(())
}
