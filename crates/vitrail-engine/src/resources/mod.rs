//! Tiered resource graph.
//!
//! Resources live in typed dictionaries keyed by [`ResourceKey`]s and are
//! split into two tiers: application-lifetime values in
//! [`ApplicationResources`] and device-lifetime values in
//! [`DeviceResources`], which is torn down and rebuilt whenever a window
//! loses its GPU device. [`ResourceDescriptor`]s declare how a slot is
//! populated; repopulating descriptors additionally subscribe to a
//! [`StalenessSignal`] and rebuild their slot when it fires.

mod descriptor;
mod key;
mod scope;
mod signal;
mod store;

pub use descriptor::{ApplicationProvider, DeviceProvider, ResourceDescriptor};
pub use key::ResourceKey;
pub use scope::DisposalScope;
pub use signal::{StalenessSignal, Subscription};
pub use store::{
    ApplicationResource, ApplicationResources, DeviceResource, DeviceResources, Resource,
    ResourceError,
};
