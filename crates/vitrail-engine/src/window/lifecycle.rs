use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;
use winit::dpi::PhysicalSize;

use crate::core::{
    DeviceDisposeInfo, DeviceInitInfo, DeviceResourceInitializer, WindowRootContent,
};
use crate::device::PresentOutcome;
use crate::resources::{ApplicationResources, DeviceResources, DisposalScope, ResourceDescriptor};
use crate::time::FrameTime;

use super::runtime::RuntimeCtx;

/// Shared "a render pass is wanted" flag for one window.
///
/// Cheap clones of one cell, so a handle can live inside `RenderInfo` while
/// the lifecycle machine owns the original. Requesting is level-triggered
/// and idempotent; the flag is consumed at the start of a pass.
#[derive(Clone, Default)]
pub struct RenderRequest(Rc<Cell<bool>>);

impl RenderRequest {
    pub fn request(&self) {
        self.0.set(true);
    }

    pub fn is_requested(&self) -> bool {
        self.0.get()
    }

    fn consume(&self) -> bool {
        self.0.replace(false)
    }
}

/// Per-pass context threaded through the host into the root content.
pub struct DrawCtx<'a> {
    pub time: FrameTime,
    pub runtime: &'a mut RuntimeCtx,
    pub render_request: RenderRequest,
}

/// GPU boundary of the lifecycle machine.
///
/// `init_device` brings up the GPU device and publishes its handles into
/// the device dictionary; `init_size` binds the render target to a concrete
/// drawable size; `draw` runs one frame through the root content and
/// reports how presenting went. The machine itself never touches wgpu, so
/// it can be driven by a scripted host in tests.
pub trait RenderHost {
    fn init_device(
        &mut self,
        device: &mut DeviceResources,
        scope: &mut DisposalScope,
    ) -> Result<()>;

    fn init_size(&mut self, size: PhysicalSize<u32>, scope: &mut DisposalScope) -> Result<()>;

    fn draw(
        &mut self,
        content: &mut dyn WindowRootContent,
        application: &ApplicationResources,
        device: &DeviceResources,
        ctx: DrawCtx<'_>,
    ) -> PresentOutcome;

    fn drop_size(&mut self) {}

    fn drop_device(&mut self) {}
}

/// Device- and size-tier state for one window.
///
/// Two lazily-initialized tiers, torn down independently: losing the GPU
/// device clears both, a resize clears only the size tier. Both are
/// rebuilt at the start of the next render pass that needs them, never
/// eagerly.
pub struct WindowTiers {
    device_resources: DeviceResources,
    descriptors: Vec<ResourceDescriptor>,
    initializers: Vec<Box<dyn DeviceResourceInitializer>>,

    device_scope: DisposalScope,
    size_scope: DisposalScope,

    device_uninitialized: bool,
    size_uninitialized: bool,

    render_request: RenderRequest,
}

impl WindowTiers {
    pub fn new(
        descriptors: Vec<ResourceDescriptor>,
        initializers: Vec<Box<dyn DeviceResourceInitializer>>,
    ) -> Self {
        Self {
            device_resources: DeviceResources::new(),
            descriptors,
            initializers,
            device_scope: DisposalScope::new(),
            size_scope: DisposalScope::new(),
            device_uninitialized: true,
            size_uninitialized: true,
            render_request: RenderRequest::default(),
        }
    }

    /// A clonable handle to this window's render-request flag.
    pub fn render_request(&self) -> RenderRequest {
        self.render_request.clone()
    }

    pub fn request_render(&self) {
        self.render_request.request();
    }

    pub fn render_requested(&self) -> bool {
        self.render_request.is_requested()
    }

    pub fn device_resources(&self) -> &DeviceResources {
        &self.device_resources
    }

    /// Runs one render pass if one is wanted.
    ///
    /// Consumes the request flag, then: skips degenerate sizes outright
    /// (leaving the flag consumed, so a minimized window goes quiet until
    /// re-invalidated), lazily brings up whichever tiers are down, gives
    /// repopulating device descriptors their pass, and draws. A lost device
    /// or stale target tears the device tier down; the rebuild happens on
    /// the next requested pass.
    pub fn run_render_pass(
        &mut self,
        application: &ApplicationResources,
        size: PhysicalSize<u32>,
        host: &mut dyn RenderHost,
        content: &mut dyn WindowRootContent,
        ctx: DrawCtx<'_>,
    ) -> Result<()> {
        if !self.render_request.consume() {
            return Ok(());
        }

        if size.width == 0 || size.height == 0 {
            log::debug!("window has no drawable area, skipping render pass");
            return Ok(());
        }

        if self.device_uninitialized {
            self.initialize_device_tier(application, host, content)?;
        }
        if self.size_uninitialized {
            self.initialize_size_tier(host, size)?;
        }

        for descriptor in &mut self.descriptors {
            descriptor.repopulate_device_tier(application, &mut self.device_resources)?;
        }

        match host.draw(content, application, &self.device_resources, ctx) {
            PresentOutcome::Presented | PresentOutcome::SkipFrame => Ok(()),
            PresentOutcome::RecreateTarget | PresentOutcome::DeviceLost => {
                log::info!("render target lost, tearing down device tier");
                self.teardown_device_tier(application, host, content);
                // the frame never made it out; make sure another is attempted
                self.render_request.request();
                Ok(())
            }
            PresentOutcome::OutOfMemory => {
                Err(anyhow::anyhow!("GPU reported out of memory while presenting"))
            }
        }
    }

    /// The window's drawable size changed: drop the size tier and ask for a
    /// fresh pass. The device tier is untouched.
    pub fn notify_resized(&mut self, host: &mut dyn RenderHost) {
        self.clear_size_tier(host);
        self.render_request.request();
    }

    /// Full device-tier teardown, in strict reverse order of bring-up:
    /// size tier first, then content dispose, initializer disposes,
    /// deferred device-scope actions, the dictionary (subscriptions
    /// included), and finally the host's own device state.
    pub fn teardown_device_tier(
        &mut self,
        application: &ApplicationResources,
        host: &mut dyn RenderHost,
        content: &mut dyn WindowRootContent,
    ) {
        if self.device_uninitialized {
            self.clear_size_tier(host);
            return;
        }

        self.clear_size_tier(host);
        self.device_uninitialized = true;

        content.on_device_dispose(DeviceDisposeInfo {
            application_resources: application,
            device_resources: &self.device_resources,
        });
        for initializer in self.initializers.iter_mut().rev() {
            initializer.on_device_dispose(application, &mut self.device_resources);
        }
        self.device_scope.release();
        self.device_resources.clear();
        host.drop_device();
    }

    fn initialize_device_tier(
        &mut self,
        application: &ApplicationResources,
        host: &mut dyn RenderHost,
        content: &mut dyn WindowRootContent,
    ) -> Result<()> {
        log::debug!("bringing up device tier");
        self.device_uninitialized = false;

        host.init_device(&mut self.device_resources, &mut self.device_scope)?;
        for descriptor in &mut self.descriptors {
            descriptor.populate_device_tier(application, &mut self.device_resources)?;
        }
        for initializer in &mut self.initializers {
            initializer.on_device_init(application, &mut self.device_resources)?;
        }
        content.on_device_init(DeviceInitInfo {
            application_resources: application,
            device_resources: &self.device_resources,
        });
        Ok(())
    }

    fn initialize_size_tier(&mut self, host: &mut dyn RenderHost, size: PhysicalSize<u32>) -> Result<()> {
        log::debug!("bringing up size tier at {}x{}", size.width, size.height);
        self.size_uninitialized = false;
        host.init_size(size, &mut self.size_scope)
    }

    fn clear_size_tier(&mut self, host: &mut dyn RenderHost) {
        let was_up = !self.size_uninitialized;
        self.size_uninitialized = true;
        self.size_scope.release();
        if was_up {
            host.drop_size();
        }
    }
}
