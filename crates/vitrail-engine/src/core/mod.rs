//! Contracts between the runtime and the code it hosts: root contents and
//! resource initializers.

mod content;
mod events;

pub use content::{
    ApplicationResourceInitializer, DeviceResourceInitializer, WindowRootContent,
};
pub use events::{DeviceDisposeInfo, DeviceInitInfo, RenderInfo};
