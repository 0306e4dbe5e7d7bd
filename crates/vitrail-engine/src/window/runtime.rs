use anyhow::{Context, Result};
use ouroboros::self_referencing;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::bug;
use crate::core::{
    ApplicationResourceInitializer, DeviceResourceInitializer, RenderInfo, WindowRootContent,
};
use crate::device::{Gpu, GpuInit, PresentOutcome, outcome_for};
use crate::input::{KeyEvent, map_logical_key, map_physical_key};
use crate::resources::{ApplicationResources, DeviceResources, DisposalScope, ResourceDescriptor};
use crate::time::{FrameClock, GameLoopScheduler};

use super::lifecycle::{DrawCtx, RenderHost, WindowTiers};

/// Configuration for one window and its device tier.
pub struct WindowConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,

    /// Main windows keep the application alive; once the last one closes,
    /// the runtime exits. Auxiliary windows (palettes, inspectors) do not.
    pub is_main: bool,

    pub content: Box<dyn WindowRootContent>,
    pub device_descriptors: Vec<ResourceDescriptor>,
    pub device_initializers: Vec<Box<dyn DeviceResourceInitializer>>,
}

impl WindowConfig {
    pub fn new(title: impl Into<String>, content: Box<dyn WindowRootContent>) -> Self {
        Self {
            title: title.into(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            is_main: true,
            content,
            device_descriptors: Vec::new(),
            device_initializers: Vec::new(),
        }
    }
}

/// Application-level configuration handed to [`Runtime::run`].
pub struct EngineConfig {
    pub gpu: GpuInit,
    pub scheduler: Rc<GameLoopScheduler>,
    pub application_descriptors: Vec<ResourceDescriptor>,
    pub application_initializers: Vec<Box<dyn ApplicationResourceInitializer>>,
    pub main_window: WindowConfig,
}

impl EngineConfig {
    pub fn new(main_window: WindowConfig) -> Self {
        Self {
            gpu: GpuInit::default(),
            scheduler: Rc::new(GameLoopScheduler::new()),
            application_descriptors: Vec::new(),
            application_initializers: Vec::new(),
            main_window,
        }
    }
}

/// Runtime commands available to callbacks.
///
/// Commands are buffered and applied after the current callback returns;
/// nothing observes a half-applied window list.
#[derive(Default)]
pub struct RuntimeCtx {
    commands: Vec<Command>,
}

impl RuntimeCtx {
    pub fn open_window(&mut self, config: WindowConfig) {
        self.commands.push(Command::OpenWindow(config));
    }

    pub fn close_window(&mut self, id: WindowId) {
        self.commands.push(Command::CloseWindow(id));
    }

    pub fn exit(&mut self) {
        self.commands.push(Command::Exit);
    }
}

enum Command {
    OpenWindow(WindowConfig),
    CloseWindow(WindowId),
    Exit,
}

/// Entry point for the engine.
pub struct Runtime;

impl Runtime {
    /// Builds the application tier and runs the frame loop until the last
    /// main window closes, a callback requests exit, or a fatal error
    /// surfaces.
    pub fn run(config: EngineConfig) -> Result<()> {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(config)?;

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        state.into_result()
    }
}

/// wgpu-backed [`RenderHost`] for one window.
///
/// The GPU device is created lazily, on the first render pass that needs
/// it, and recreated the same way after a device loss.
struct WgpuHost<'w> {
    window: &'w Window,
    init: GpuInit,
    gpu: Option<Gpu<'w>>,
}

impl<'w> WgpuHost<'w> {
    fn new(window: &'w Window, init: GpuInit) -> Self {
        Self {
            window,
            init,
            gpu: None,
        }
    }
}

impl<'w> RenderHost for WgpuHost<'w> {
    fn init_device(
        &mut self,
        device: &mut DeviceResources,
        _scope: &mut DisposalScope,
    ) -> Result<()> {
        let gpu = pollster::block_on(Gpu::new(self.window, self.init.clone()))?;
        device.set_context(gpu.context());
        self.gpu = Some(gpu);
        Ok(())
    }

    fn init_size(
        &mut self,
        size: winit::dpi::PhysicalSize<u32>,
        _scope: &mut DisposalScope,
    ) -> Result<()> {
        match &mut self.gpu {
            Some(gpu) => {
                gpu.configure(size);
                Ok(())
            }
            None => bug!("A90F7731", "size tier initialized before the device tier"),
        }
    }

    fn draw(
        &mut self,
        content: &mut dyn WindowRootContent,
        application: &ApplicationResources,
        device: &DeviceResources,
        ctx: DrawCtx<'_>,
    ) -> PresentOutcome {
        let Some(gpu) = &self.gpu else {
            bug!("C2E4B816", "draw reached a host without a device");
        };

        let mut frame = match gpu.begin_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("surface frame acquisition failed: {err}");
                return outcome_for(err);
            }
        };

        {
            let mut info = RenderInfo {
                application_resources: application,
                device_resources: device,
                time: ctx.time,
                frame: &mut frame,
                runtime: ctx.runtime,
                render_request: ctx.render_request,
            };
            content.on_render(&mut info);
        }

        self.window.pre_present_notify();
        gpu.submit(frame);
        PresentOutcome::Presented
    }

    fn drop_device(&mut self) {
        self.gpu = None;
    }
}

#[self_referencing]
struct WindowEntry {
    content: Box<dyn WindowRootContent>,
    tiers: WindowTiers,
    clock: FrameClock,
    is_main: bool,

    window: Window,

    #[borrows(window)]
    #[covariant]
    host: WgpuHost<'this>,
}

struct AppState {
    gpu_init: GpuInit,
    scheduler: Rc<GameLoopScheduler>,

    resources: ApplicationResources,
    descriptors: Vec<ResourceDescriptor>,
    initializers: Vec<Box<dyn ApplicationResourceInitializer>>,

    pending_windows: Vec<WindowConfig>,
    windows: HashMap<WindowId, WindowEntry>,
    main_window_count: usize,

    exit_requested: bool,
    torn_down: bool,
    fatal: Option<anyhow::Error>,
}

impl AppState {
    /// Brings up the application tier: initializers first, then descriptor
    /// population, both in registration order.
    fn new(config: EngineConfig) -> Result<Self> {
        let mut resources = ApplicationResources::new();
        let mut initializers = config.application_initializers;
        let mut descriptors = config.application_descriptors;

        for initializer in &mut initializers {
            initializer
                .on_init(&mut resources)
                .context("application resource initializer failed")?;
        }
        for descriptor in &mut descriptors {
            descriptor
                .populate_application_tier(&mut resources)
                .context("application resource population failed")?;
        }

        Ok(Self {
            gpu_init: config.gpu,
            scheduler: config.scheduler,
            resources,
            descriptors,
            initializers,
            pending_windows: vec![config.main_window],
            windows: HashMap::new(),
            main_window_count: 0,
            exit_requested: false,
            torn_down: false,
            fatal: None,
        })
    }

    fn into_result(self) -> Result<()> {
        match self.fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    /// Records a fatal error and begins shutdown. The first error wins.
    fn fail(&mut self, err: anyhow::Error) {
        log::error!("fatal runtime error: {err:#}");
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
        self.request_exit();
    }

    fn open_window_entry(
        &mut self,
        event_loop: &ActiveEventLoop,
        config: WindowConfig,
    ) -> Result<WindowId> {
        let attrs = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .with_context(|| format!("failed to create window `{}`", config.title))?;

        let id = window.id();
        let tiers = WindowTiers::new(config.device_descriptors, config.device_initializers);
        tiers.request_render();

        let gpu_init = self.gpu_init.clone();
        let entry = WindowEntryBuilder {
            content: config.content,
            tiers,
            clock: FrameClock::default(),
            is_main: config.is_main,
            window,
            host_builder: |window| WgpuHost::new(window, gpu_init),
        }
        .build();

        if config.is_main {
            self.main_window_count += 1;
        }
        if self.windows.insert(id, entry).is_some() {
            bug!("6F20B993", "window id registered twice");
        }

        log::info!("opened window {id:?}");
        Ok(id)
    }

    /// Closes a window: device-tier teardown, then removal. Dropping the
    /// last main window requests exit.
    fn close_window_entry(&mut self, id: WindowId) {
        let Some(mut entry) = self.windows.remove(&id) else {
            log::warn!("close requested for unknown window {id:?}");
            return;
        };

        let resources = &self.resources;
        entry.with_mut(|fields| {
            fields
                .tiers
                .teardown_device_tier(resources, fields.host, &mut **fields.content);
        });

        let was_main = *entry.borrow_is_main();
        drop(entry);
        log::info!("closed window {id:?}");

        if was_main {
            self.main_window_count -= 1;
            if self.main_window_count == 0 {
                log::debug!("last main window closed, exiting");
                self.request_exit();
            }
        }
    }

    fn apply_commands(&mut self, event_loop: &ActiveEventLoop, mut ctx: RuntimeCtx) {
        for command in ctx.commands.drain(..) {
            match command {
                Command::OpenWindow(config) => {
                    if let Err(err) = self.open_window_entry(event_loop, config) {
                        self.fail(err);
                    }
                }
                Command::CloseWindow(id) => self.close_window_entry(id),
                Command::Exit => self.request_exit(),
            }
        }

        if self.exit_requested {
            event_loop.exit();
        }
    }

    fn dispatch_key_event(&mut self, window_id: WindowId, event: &winit::event::KeyEvent) {
        let Some(entry) = self.windows.get_mut(&window_id) else {
            return;
        };

        let mut key_event = KeyEvent::new(
            map_physical_key(event.physical_key),
            map_logical_key(&event.logical_key),
            event.repeat,
        );

        entry.with_content_mut(|content| match event.state {
            ElementState::Pressed => content.on_key_down(&mut key_event),
            ElementState::Released => content.on_key_up(&mut key_event),
        });
    }

    fn render_window(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId) {
        let mut runtime_ctx = RuntimeCtx::default();
        let mut pass_result = Ok(());

        // Split borrows so the ouroboros closure never captures `self`.
        let (resources, windows) = (&self.resources, &mut self.windows);
        if let Some(entry) = windows.get_mut(&window_id) {
            entry.with_mut(|fields| {
                let time = fields.clock.tick();
                let size = fields.window.inner_size();
                let ctx = DrawCtx {
                    time,
                    runtime: &mut runtime_ctx,
                    render_request: fields.tiers.render_request(),
                };
                pass_result = fields.tiers.run_render_pass(
                    resources,
                    size,
                    fields.host,
                    &mut **fields.content,
                    ctx,
                );
            });
        }

        if let Err(err) = pass_result {
            self.fail(err);
            event_loop.exit();
            return;
        }

        self.apply_commands(event_loop, runtime_ctx);
    }

    /// Shutdown teardown: every window's device tier, then the application
    /// tier, initializer dispose hooks in reverse registration order.
    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        let ids: Vec<WindowId> = self.windows.keys().copied().collect();
        for id in ids {
            self.close_window_entry(id);
        }

        for initializer in self.initializers.iter_mut().rev() {
            initializer.on_dispose(&mut self.resources);
        }
        self.resources.clear();
        log::debug!("runtime teardown complete");
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !self.windows.is_empty() {
            return;
        }

        for config in self.pending_windows.drain(..).collect::<Vec<_>>() {
            if let Err(err) = self.open_window_entry(event_loop, config) {
                self.fail(err);
                event_loop.exit();
                return;
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        // Virtual time catches up to wall time once per loop turn; actions
        // never run from a timer thread.
        self.scheduler.advance_to(Instant::now());

        for descriptor in &mut self.descriptors {
            if let Err(err) = descriptor.repopulate_application_tier(&mut self.resources) {
                self.fail(err);
                event_loop.exit();
                return;
            }
        }

        for entry in self.windows.values() {
            if entry.borrow_tiers().render_requested() {
                entry.borrow_window().request_redraw();
            }
        }

        match self.scheduler.next_due() {
            Some(due) => event_loop.set_control_flow(ControlFlow::WaitUntil(due)),
            None => event_loop.set_control_flow(ControlFlow::Wait),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_window_entry(window_id);
                if self.exit_requested {
                    event_loop.exit();
                }
            }

            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(entry) = self.windows.get_mut(&window_id) {
                    entry.with_mut(|fields| fields.tiers.notify_resized(fields.host));
                    entry.borrow_window().request_redraw();
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                self.dispatch_key_event(window_id, &event);
            }

            WindowEvent::RedrawRequested => {
                self.render_window(event_loop, window_id);
            }

            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.teardown();
    }
}
