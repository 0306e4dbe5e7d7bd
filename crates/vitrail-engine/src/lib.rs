//! vitrail-engine: a windowed real-time rendering runtime.
//!
//! The engine owns the window/GPU hierarchy and drives a frame loop over it:
//! an application holds device-independent resources and a virtual-time
//! scheduler; each window holds device-dependent resources whose lifetime is
//! tied to its GPU device, plus a size-scoped tier rebuilt on resize. Root
//! contents plug in through [`core::WindowRootContent`] and read both tiers
//! during rendering.

pub mod core;
pub mod device;
pub mod input;
pub mod logging;
pub mod resources;
pub mod time;
pub mod window;

mod diag;
