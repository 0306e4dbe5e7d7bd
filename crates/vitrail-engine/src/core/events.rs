use crate::device::GpuFrame;
use crate::resources::{ApplicationResources, DeviceResources};
use crate::time::FrameTime;
use crate::window::{RenderRequest, RuntimeCtx};

/// Context for [`WindowRootContent::on_device_init`].
///
/// [`WindowRootContent`]: super::WindowRootContent
pub struct DeviceInitInfo<'a> {
    pub application_resources: &'a ApplicationResources,
    pub device_resources: &'a DeviceResources,
}

/// Context for [`WindowRootContent::on_device_dispose`].
///
/// The device tier is still readable here; it is cleared after every dispose
/// hook has run.
///
/// [`WindowRootContent`]: super::WindowRootContent
pub struct DeviceDisposeInfo<'a> {
    pub application_resources: &'a ApplicationResources,
    pub device_resources: &'a DeviceResources,
}

/// Everything a root content may touch during one render pass.
pub struct RenderInfo<'a> {
    pub application_resources: &'a ApplicationResources,
    pub device_resources: &'a DeviceResources,
    pub time: FrameTime,

    /// The acquired frame: encoder to record into, view to attach.
    pub frame: &'a mut GpuFrame,

    /// Buffered runtime commands (open/close window, exit).
    pub runtime: &'a mut RuntimeCtx,

    pub(crate) render_request: RenderRequest,
}

impl<'a> RenderInfo<'a> {
    /// Asks for another render pass after this one, for continuously
    /// animating contents. Without this call the window stays idle until
    /// something else invalidates it.
    pub fn request_render(&self) {
        self.render_request.request();
    }
}
