//! Application flow and event loop.
//!
//! [`App`] drives one scene through its lifecycle: load (build the scene, find
//! its camera, size the projection, prepare GPU resources), then per frame
//! update and render. Every entry point quietly does nothing until a scene with
//! a camera is loaded, so a scene without a camera renders an empty frame
//! instead of failing.
//!
//! [`run`] wraps an [`App`] in a winit event loop:
//!
//! 1. Create the window and the wgpu [`Context`]
//! 2. Load the configured scene document and imports
//! 3. On every redraw: update, render, present
//! 4. Left click locks the pointer and enables the camera, Escape releases it

use std::sync::Arc;

use instant::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Window},
};

use crate::{
    builder::{AssetImporter, SceneBuilder},
    config::EngineConfig,
    context::Context,
    data_structures::{
        camera::Camera,
        scene_graph::{NodeId, Scene},
    },
    error::BuildError,
    gpu::Gpu,
    render::Renderer,
    resources::{
        Assets,
        gltf::GltfImporter,
        scene::{SceneSpec, load_scene},
    },
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Moves the active camera. Only consulted while the camera is enabled.
pub trait CameraController {
    /// Updates the camera node's local transform.
    fn update(&mut self, transform: &mut cgmath::Matrix4<f32>, camera: &Camera, dt: Duration);

    fn handle_window_event(&mut self, _event: &WindowEvent) {}

    fn handle_mouse_motion(&mut self, _dx: f64, _dy: f64) {}
}

pub trait Physics {
    fn update(&mut self, scene: &mut Scene, dt: Duration);
}

pub struct App {
    config: EngineConfig,
    renderer: Option<Renderer>,
    scene: Option<Scene>,
    camera: Option<NodeId>,
    aspect: f32,
    controller: Option<Box<dyn CameraController>>,
    physics: Option<Box<dyn Physics>>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("scene", &self.scene)
            .field("camera", &self.camera)
            .field("aspect", &self.aspect)
            .finish_non_exhaustive()
    }
}

impl App {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            renderer: None,
            scene: None,
            camera: None,
            aspect: 1.0,
            controller: None,
            physics: None,
        }
    }

    pub fn with_controller(mut self, controller: impl CameraController + 'static) -> Self {
        self.controller = Some(Box::new(controller));
        self
    }

    pub fn with_physics(mut self, physics: impl Physics + 'static) -> Self {
        self.physics = Some(Box::new(physics));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    /// The active camera, if the loaded scene has one.
    pub fn camera(&self) -> Option<NodeId> {
        self.camera
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Builds `spec` into the active scene and prepares it for rendering.
    ///
    /// Must finish before the next [`App::render`]. On success the previously
    /// loaded scene is released, on error it stays active.
    pub async fn load<G, I>(
        &mut self,
        gpu: &mut G,
        spec: SceneSpec,
        importer: I,
    ) -> Result<(), BuildError>
    where
        G: Gpu + ?Sized,
        I: AssetImporter,
    {
        let mut scene = SceneBuilder::new(spec, importer)
            .with_imports(self.config.imports.clone())
            .build(&mut *gpu)
            .await?;

        let camera = scene.find_camera(self.config.camera_discovery);
        match camera.and_then(|id| scene.camera_mut(id)) {
            Some(active) => active.set_aspect(self.aspect),
            None => log::warn!("scene has no camera, nothing will be drawn"),
        }

        let renderer = self
            .renderer
            .get_or_insert_with(|| Renderer::new(&mut *gpu, self.config.renderer));
        renderer.set_viewport_aspect(self.aspect);
        let prepared = renderer.prepare(&mut *gpu, &mut scene);
        log::info!(
            "scene loaded: {} nodes, {} models prepared, {} fragments",
            scene.len(),
            prepared,
            scene.fragments().len()
        );

        if let Some(previous) = self.scene.replace(scene) {
            renderer.release(&mut *gpu, previous);
        }
        self.camera = camera;
        Ok(())
    }

    /// Drops the active scene and destroys its GPU resources.
    pub fn unload<G: Gpu + ?Sized>(&mut self, gpu: &mut G) {
        self.camera = None;
        if let (Some(renderer), Some(scene)) = (self.renderer.as_ref(), self.scene.take()) {
            renderer.release(gpu, scene);
        }
    }

    /// Loads the configured scene document and imports from `assets`.
    pub async fn load_from_assets<G: Gpu + ?Sized>(
        &mut self,
        gpu: &mut G,
        assets: &Assets,
    ) -> anyhow::Result<()> {
        let spec = load_scene(assets, &self.config.scene).await?;
        self.load(gpu, spec, GltfImporter::new(assets.clone()))
            .await?;
        Ok(())
    }

    pub fn update(&mut self, dt: Duration) {
        let (Some(scene), Some(camera)) = (self.scene.as_mut(), self.camera) else {
            return;
        };

        if let (Some(controller), Some(node)) = (self.controller.as_mut(), scene.node_mut(camera))
        {
            if let Some(active) = node.camera().filter(|c| c.is_enabled()).cloned() {
                controller.update(&mut node.transform, &active, dt);
            }
        }
        if let Some(physics) = self.physics.as_mut() {
            physics.update(scene, dt);
        }
    }

    /// Draws one frame. Returns `false` if there was nothing to draw it with.
    pub fn render<G: Gpu + ?Sized>(&self, gpu: &mut G) -> bool {
        let (Some(renderer), Some(scene), Some(camera)) =
            (self.renderer.as_ref(), self.scene.as_ref(), self.camera)
        else {
            return false;
        };

        if let Err(err) = renderer.render(&mut *gpu, scene, camera) {
            log::error!("render failed: {err}");
            return false;
        }
        if renderer.config().render_fragments {
            renderer.render_fragments(gpu, scene);
        }
        true
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.aspect = width as f32 / height as f32;
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.set_viewport_aspect(self.aspect);
        }
        if let (Some(scene), Some(camera)) = (self.scene.as_mut(), self.camera) {
            if let Some(active) = scene.camera_mut(camera) {
                active.set_aspect(self.aspect);
            }
        }
    }

    /// The camera only reacts to input while the pointer is locked.
    pub fn pointer_lock_changed(&mut self, locked: bool) {
        let (Some(scene), Some(camera)) = (self.scene.as_mut(), self.camera) else {
            return;
        };
        if let Some(active) = scene.camera_mut(camera) {
            if locked {
                active.enable();
            } else {
                active.disable();
            }
        }
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        if self.camera_enabled() {
            if let Some(controller) = self.controller.as_mut() {
                controller.handle_window_event(event);
            }
        }
    }

    pub fn handle_mouse_motion(&mut self, dx: f64, dy: f64) {
        if self.camera_enabled() {
            if let Some(controller) = self.controller.as_mut() {
                controller.handle_mouse_motion(dx, dy);
            }
        }
    }

    fn camera_enabled(&self) -> bool {
        match (self.scene.as_ref(), self.camera) {
            (Some(scene), Some(camera)) => scene.camera(camera).is_some_and(Camera::is_enabled),
            _ => false,
        }
    }
}

/// Window, GPU context and app, once initialised.
#[derive(Debug)]
pub(crate) struct ShellState {
    ctx: Context,
    app: App,
}

impl ShellState {
    async fn new(window: Arc<Window>, mut app: App) -> anyhow::Result<Self> {
        let mut ctx = Context::new(window).await?;
        ctx.set_clear_colour(app.config().renderer.clear_colour);

        let assets = Assets::new(app.config().asset_root.clone());
        if let Err(err) = app.load_from_assets(&mut ctx, &assets).await {
            log::error!("could not load {}: {err:#}", app.config().scene);
        }

        let size = ctx.window().inner_size();
        ctx.resize(size.width, size.height);
        app.resize(size.width, size.height);
        Ok(Self { ctx, app })
    }

    fn set_pointer_lock(&mut self, locked: bool) {
        let window = self.ctx.window();
        let grabbed = if locked {
            window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
        } else {
            window.set_cursor_grab(CursorGrabMode::None)
        };
        if let Err(err) = grabbed {
            log::warn!("pointer lock unavailable: {err}");
            return;
        }
        window.set_cursor_visible(!locked);
        self.app.pointer_lock_changed(locked);
    }

    fn redraw(&mut self, dt: Duration) {
        self.app.update(dt);
        if !self.app.render(&mut self.ctx) {
            self.ctx.clear();
        }
        match self.ctx.present() {
            Ok(()) => {}
            // Reconfigure the surface if it's lost or outdated
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.ctx.reconfigure();
            }
            Err(e) => log::error!("Unable to render {}", e),
        }
        self.ctx.window().request_redraw();
    }
}

pub(crate) enum ShellEvent {
    #[allow(dead_code)]
    Initialized(Box<ShellState>),
}

struct Shell {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    #[allow(dead_code)]
    proxy: winit::event_loop::EventLoopProxy<ShellEvent>,
    // Taken once the window exists.
    app: Option<App>,
    state: Option<ShellState>,
    last_time: Instant,
}

impl Shell {
    fn new(event_loop: &EventLoop<ShellEvent>, app: App) -> anyhow::Result<Self> {
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            proxy: event_loop.create_proxy(),
            app: Some(app),
            state: None,
            last_time: Instant::now(),
        })
    }
}

impl ApplicationHandler<ShellEvent> for Shell {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(app) = self.app.take() else {
            return;
        };

        #[allow(unused_mut)]
        let mut window_attributes =
            Window::default_attributes().with_title(app.config().window_title.clone());
        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;
            const CANVAS_ID: &str = "canvas";

            let window = wgpu::web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document.get_element_by_id(CANVAS_ID).unwrap_throw();
            let html_canvas_element = canvas.unchecked_into();
            window_attributes = window_attributes.with_canvas(Some(html_canvas_element));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("cannot create window: {err}");
                event_loop.exit();
                return;
            }
        };
        let init_future = ShellState::new(window, app);

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self.async_runtime.block_on(init_future) {
                Ok(state) => {
                    state.ctx.window().request_redraw();
                    self.state = Some(state);
                }
                Err(err) => {
                    log::error!("App initialization failed: {err:#}");
                    event_loop.exit();
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                match init_future.await {
                    Ok(state) => {
                        if proxy
                            .send_event(ShellEvent::Initialized(Box::new(state)))
                            .is_err()
                        {
                            log::error!("event loop closed before initialisation finished");
                        }
                    }
                    Err(err) => log::error!("App initialization failed: {err:#}"),
                }
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: ShellEvent) {
        match event {
            ShellEvent::Initialized(state) => {
                // This is the message from our wasm `spawn_local`
                let mut state = *state;
                let size = state.ctx.window().inner_size();
                state.ctx.resize(size.width, size.height);
                state.app.resize(size.width, size.height);
                state.ctx.window().request_redraw();
                self.state = Some(state);
            }
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        let Some(state) = &mut self.state else {
            return;
        };
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            state.app.handle_mouse_motion(dx, dy);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = &mut self.state else {
            return;
        };
        state.app.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                state.ctx.resize(size.width, size.height);
                state.app.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                let dt = self.last_time.elapsed();
                self.last_time = Instant::now();
                state.redraw(dt);
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => state.set_pointer_lock(true),
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
            {
                state.set_pointer_lock(false)
            }
            _ => {}
        }
    }
}

/// Runs the configured scene in a window until it is closed.
pub fn run(config: EngineConfig) -> anyhow::Result<()> {
    run_app(App::new(config))
}

/// Like [`run`], for an [`App`] with a camera controller or physics attached.
pub fn run_app(app: App) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }
    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info).unwrap_throw();
    }

    let event_loop: EventLoop<ShellEvent> = EventLoop::with_user_event().build()?;
    let mut shell = Shell::new(&event_loop, app)?;
    event_loop.run_app(&mut shell)?;
    Ok(())
}
