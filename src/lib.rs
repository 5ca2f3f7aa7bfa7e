use std::sync::Arc;
#[cfg(target_arch = "wasm32")]
use std::sync::Mutex;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use winit::event_loop::EventLoopProxy;
#[cfg(target_arch = "wasm32")]
use once_cell::sync::OnceCell;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen_futures::future_to_promise;
#[cfg(target_arch = "wasm32")]
use js_sys::Promise;

pub mod color;
pub mod config;
pub mod field;
pub mod gpu;
pub mod models;
pub mod particle;
pub mod preferences;
pub mod renderer;
pub mod scene;
pub mod theme;
pub mod ui_events;
pub mod viewport;

use config::FieldConfig;
use gpu::GpuSurface;
use preferences::ThemeFlag;
use renderer::{FrameToken, ParticleRenderer};
use ui_events::{AppEvent, UserCommand};

#[cfg(target_arch = "wasm32")]
static WASM_API_INSTANCE: OnceCell<WasmApi> = OnceCell::new();

#[cfg(target_arch = "wasm32")]
static WASM_READY_FLUME_CHANNEL: OnceCell<(flume::Sender<()>, flume::Receiver<()>)> = OnceCell::new();

/// The view shell: mounts the particle renderer onto a window (or the page canvas)
/// and drives it from window events.
struct App {
    window: Option<Arc<Window>>,
    renderer: ParticleRenderer<GpuSurface>,
    theme: ThemeFlag,
    queued_frame: Option<FrameToken>,
    // Filled by the async surface setup before SurfaceReady is sent.
    #[cfg(target_arch = "wasm32")]
    pending_surface: Arc<Mutex<Option<GpuSurface>>>,
    #[cfg(target_arch = "wasm32")]
    proxy: Option<EventLoopProxy<AppEvent>>,
}

impl App {
    fn new(config: FieldConfig, #[cfg(target_arch = "wasm32")] event_loop: &EventLoop<AppEvent>) -> Self {
        #[cfg(target_arch = "wasm32")]
        let app_proxy = event_loop.create_proxy();

        #[cfg(target_arch = "wasm32")]
        {
            let wasm_api_instance = WasmApi { proxy: app_proxy.clone() };
            if WASM_API_INSTANCE.set(wasm_api_instance).is_err() {
                log::warn!("WASM_API_INSTANCE was already set. This should only happen once.");
            }
        }

        Self {
            window: None,
            renderer: ParticleRenderer::new(config),
            theme: ThemeFlag::load(preferences::open_platform_store()),
            queued_frame: None,
            #[cfg(target_arch = "wasm32")]
            pending_surface: Arc::new(Mutex::new(None)),
            #[cfg(target_arch = "wasm32")]
            proxy: Some(app_proxy),
        }
    }

    /// Starts the renderer on `surface` (absent when GPU setup failed) at the
    /// window's current size and scale factor.
    fn mount(&mut self, surface: Option<GpuSurface>) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        let size = window.inner_size();
        self.renderer.set_scale_factor(window.scale_factor());
        self.renderer.start(surface, size.width, size.height, self.theme.get_preference());
        self.schedule_frame();
    }

    fn schedule_frame(&mut self) {
        if self.queued_frame.is_some() {
            return;
        }
        self.queued_frame = self.renderer.request_frame();
        if self.queued_frame.is_some() {
            if let Some(window) = self.window.as_ref() {
                window.request_redraw();
            }
        }
    }

    fn unmount(&mut self) {
        self.queued_frame = None;
        self.renderer.stop();
    }

    fn handle_command(&mut self, command: UserCommand) {
        if ui_events::apply_command(command, &mut self.renderer, &mut self.theme) {
            self.schedule_frame();
        } else if !self.renderer.is_running() {
            self.queued_frame = None;
        }
    }
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes()
            .with_title("Particle Field");

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let canvas = wgpu::web_sys::window()
                .and_then(|window| window.document())
                .and_then(|document| document.get_element_by_id(CANVAS_ID));
            match canvas {
                Some(canvas) => window_attributes = window_attributes.with_canvas(Some(canvas.unchecked_into())),
                None => log::warn!("No #{} element; winit will create its own canvas.", CANVAS_ID),
            }
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        #[cfg(not(target_arch = "wasm32"))]
        {
            let surface = match pollster::block_on(GpuSurface::new(window)) {
                Ok(surface) => Some(surface),
                Err(e) => {
                    log::warn!("Particle background unavailable: {:#}", e);
                    None
                }
            };
            self.mount(surface);
        }

        #[cfg(target_arch = "wasm32")]
        {
            let pending_surface = self.pending_surface.clone();
            let Some(proxy) = self.proxy.clone() else {
                log::error!("App proxy not set");
                return;
            };

            wasm_bindgen_futures::spawn_local(async move {
                match GpuSurface::new(window).await {
                    Ok(surface) => {
                        log::info!("WASM surface created in async task.");
                        if let Ok(mut guard) = pending_surface.lock() {
                            guard.replace(surface);
                        }
                    }
                    Err(e) => log::warn!("Particle background unavailable: {:#}", e),
                }
                // Mount either way; without a surface the renderer stays idle.
                if proxy.send_event(AppEvent::SurfaceReady).is_err() {
                    log::error!("Failed to send SurfaceReady event.");
                }
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::Command(command) => self.handle_command(command),
            #[cfg(target_arch = "wasm32")]
            AppEvent::SurfaceReady => {
                let surface = self.pending_surface.lock().ok().and_then(|mut guard| guard.take());
                self.mount(surface);

                if let Some((sender, _)) = WASM_READY_FLUME_CHANNEL.get() {
                    if let Err(e) = sender.send(()) {
                        log::error!("Failed to send WASM ready signal: {:?}", e);
                    }
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                self.unmount();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.renderer.resize(size.width, size.height);
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                // A Resized with the new physical size follows.
                self.renderer.set_scale_factor(scale_factor);
            }
            WindowEvent::RedrawRequested => {
                if let Some(token) = self.queued_frame.take() {
                    if self.renderer.run_frame(token) {
                        self.schedule_frame();
                    }
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: key_state,
                        repeat,
                        ..
                    },
                ..
            } => {
                if key_state.is_pressed() && !repeat {
                    match code {
                        KeyCode::KeyT => self.handle_command(UserCommand::ToggleTheme),
                        KeyCode::KeyR => log::info!("FPS: {}", self.renderer.stats().current_fps),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.unmount();
    }
}

pub fn run() -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    let config = {
        env_logger::init();
        FieldConfig::from_env_or_default()
    };
    #[cfg(target_arch = "wasm32")]
    let config = {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Info)
            .map_err(|e| anyhow::anyhow!("Failed to initialize console logging: {}", e))?;
        log::info!("Starting particle field.");
        let (sender, receiver) = flume::unbounded();
        if WASM_READY_FLUME_CHANNEL.set((sender, receiver)).is_err() {
            log::warn!("WASM ready channel was already initialized.");
        }
        FieldConfig::default()
    };

    let event_loop = EventLoop::with_user_event().build()?;
    let mut app = App::new(
        config,
        #[cfg(target_arch = "wasm32")]
        &event_loop,
    );
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), wasm_bindgen::JsValue> {
    run().map_err(|e| JsValue::from_str(&format!("{:#}", e)))
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
#[derive(Clone, Debug)]
pub struct WasmApi {
    proxy: EventLoopProxy<AppEvent>,
}

#[cfg(target_arch = "wasm32")]
impl WasmApi {
    fn send(&self, command: UserCommand) -> Result<(), JsValue> {
        self.proxy
            .send_event(command.into())
            .map_err(|_| JsValue::from_str("Failed to send command to event loop."))
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl WasmApi {
    #[wasm_bindgen(js_name = toggleTheme)]
    pub fn toggle_theme(&self) -> Result<(), JsValue> {
        self.send(UserCommand::ToggleTheme)
    }

    #[wasm_bindgen(js_name = setTheme)]
    pub fn set_theme(&self, mode: &str) -> Result<(), JsValue> {
        let mode: theme::ThemeMode = mode
            .parse()
            .map_err(|e: anyhow::Error| JsValue::from_str(&e.to_string()))?;
        self.send(UserCommand::SetTheme(mode))
    }

    /// Stops the background for good; no frame runs after this is processed.
    pub fn unmount(&self) -> Result<(), JsValue> {
        self.send(UserCommand::Unmount)
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = getWasmApi)]
pub fn get_wasm_api() -> Result<WasmApi, JsValue> {
    WASM_API_INSTANCE.get()
        .cloned()
        .ok_or_else(|| JsValue::from_str("WasmApi is not initialized. Call run_web() first."))
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = getWasmReadyPromise)]
pub fn get_wasm_ready_promise() -> Result<Promise, JsValue> {
    let (_, receiver) = WASM_READY_FLUME_CHANNEL.get()
        .ok_or_else(|| JsValue::from_str("WASM ready channel not initialized. Call run_web() first."))?;
    let receiver = receiver.clone();

    // Resolves once the renderer has been mounted (or found no surface).
    let ready_promise = future_to_promise(async move {
        receiver
            .recv_async()
            .await
            .map_err(|e| JsValue::from_str(&format!("Ready channel closed: {}", e)))?;
        Ok(JsValue::NULL)
    });

    Ok(ready_promise)
}
