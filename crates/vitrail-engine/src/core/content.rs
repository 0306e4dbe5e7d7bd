use anyhow::Result;

use crate::input::KeyEvent;
use crate::resources::{ApplicationResources, DeviceResources};

use super::events::{DeviceDisposeInfo, DeviceInitInfo, RenderInfo};

/// The application-defined occupant of a window.
///
/// One per window, owned by the runtime. Device hooks bracket each device
/// lifetime: `on_device_init` runs after the device tier is populated,
/// `on_device_dispose` runs before it is cleared; after a device loss the
/// pair runs again for the replacement device.
pub trait WindowRootContent {
    fn on_key_down(&mut self, event: &mut KeyEvent) {
        let _ = event;
    }

    fn on_key_up(&mut self, event: &mut KeyEvent) {
        let _ = event;
    }

    fn on_device_init(&mut self, info: DeviceInitInfo<'_>) {
        let _ = info;
    }

    /// Records this frame's draw commands. Runs only for render passes that
    /// actually reach the GPU (requested, non-degenerate size, live device).
    fn on_render(&mut self, info: &mut RenderInfo<'_>);

    fn on_device_dispose(&mut self, info: DeviceDisposeInfo<'_>) {
        let _ = info;
    }
}

/// Application-tier setup hook, run once at startup before any window
/// exists. Dispose hooks run in reverse order at shutdown, after every
/// window is gone.
pub trait ApplicationResourceInitializer {
    fn on_init(&mut self, resources: &mut ApplicationResources) -> Result<()>;

    fn on_dispose(&mut self, resources: &mut ApplicationResources) {
        let _ = resources;
    }
}

/// Device-tier setup hook for one window, run once per device lifetime,
/// between descriptor population and the root content's own device-init.
/// Dispose hooks run in reverse order during device teardown, after the
/// root content's device-dispose.
pub trait DeviceResourceInitializer {
    fn on_device_init(
        &mut self,
        application: &ApplicationResources,
        device: &mut DeviceResources,
    ) -> Result<()>;

    fn on_device_dispose(
        &mut self,
        application: &ApplicationResources,
        device: &mut DeviceResources,
    ) {
        let _ = (application, device);
    }
}
