//! Window lifecycle machine and the winit-hosted frame loop.

mod lifecycle;
mod runtime;

pub use lifecycle::{DrawCtx, RenderHost, RenderRequest, WindowTiers};
pub use runtime::{EngineConfig, Runtime, RuntimeCtx, WindowConfig};
