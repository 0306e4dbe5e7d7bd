//! GPU backend: wgpu device/surface ownership and frame acquisition.

mod gpu;

pub use gpu::{DeviceContext, Gpu, GpuFrame, GpuInit};

pub(crate) use gpu::outcome_for;

/// Outcome of one draw-and-present attempt, as seen by the window lifecycle
/// machine.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PresentOutcome {
    /// Frame was submitted and presented.
    Presented,
    /// Transient failure; drop this frame, keep all state.
    SkipFrame,
    /// The render target no longer matches the surface; device-tier rebuild.
    RecreateTarget,
    /// The GPU device is gone; device-tier rebuild.
    DeviceLost,
    /// Unrecoverable; the application must shut down.
    OutOfMemory,
}
