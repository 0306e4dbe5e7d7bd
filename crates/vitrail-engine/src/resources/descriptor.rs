use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;

use super::key::ResourceKey;
use super::signal::{StalenessSignal, Subscription};
use super::store::{
    ApplicationResource, ApplicationResources, DeviceResource, DeviceResources, Resource,
    ResourceError,
};

use crate::device::DeviceContext;

/// Read-only view of the application tier handed to factories.
pub struct ApplicationProvider<'a> {
    application: &'a ApplicationResources,
}

impl<'a> ApplicationProvider<'a> {
    pub(crate) fn new(application: &'a ApplicationResources) -> Self {
        Self { application }
    }

    pub fn get<T: Resource>(&self, key: ResourceKey<T>) -> Result<&'a T, ResourceError> {
        self.application.get(key)
    }

    pub fn try_get<T: Resource>(&self, key: ResourceKey<T>) -> Option<&'a T> {
        self.application.try_get(key)
    }
}

/// Read-only view of both tiers handed to device-tier factories.
///
/// Lookups try the device tier first and fall back to the application tier,
/// so a device factory can name its inputs without caring which tier owns
/// them.
pub struct DeviceProvider<'a> {
    application: &'a ApplicationResources,
    device: &'a DeviceResources,
}

impl<'a> DeviceProvider<'a> {
    pub(crate) fn new(application: &'a ApplicationResources, device: &'a DeviceResources) -> Self {
        Self {
            application,
            device,
        }
    }

    pub fn get<T: Resource>(&self, key: ResourceKey<T>) -> Result<&'a T, ResourceError> {
        match self.device.try_get(key) {
            Some(value) => Ok(value),
            None => self.application.get(key),
        }
    }

    pub fn try_get<T: Resource>(&self, key: ResourceKey<T>) -> Option<&'a T> {
        self.device.try_get(key).or_else(|| self.application.try_get(key))
    }

    /// GPU handles for the current device lifetime.
    pub fn context(&self) -> Option<&'a DeviceContext> {
        self.device.context()
    }
}

type PopulateApp = Box<dyn FnMut(&mut ApplicationResources) -> Result<()>>;
type PopulateDevice = Box<dyn FnMut(&ApplicationResources, &mut DeviceResources) -> Result<()>>;

/// Declares how one resource slot is built, and when it is rebuilt.
///
/// Four shapes, closed set:
/// - application-tier, populated once per application run;
/// - device-tier, populated once per device lifetime (so again after every
///   device loss);
/// - the repopulating variants of both, which subscribe to a
///   [`StalenessSignal`] at population time and rebuild the slot on the next
///   repopulation pass after the signal fires.
///
/// Descriptors write through the unchecked path, and the subscription a
/// repopulating descriptor creates is parked in the same dictionary under a
/// fresh anonymous key, so it is cancelled by the tier teardown that
/// destroys the value it was refreshing.
pub enum ResourceDescriptor {
    ApplicationOnce {
        populate: PopulateApp,
    },
    DeviceOnce {
        populate: PopulateDevice,
    },
    RepopulatingApplication {
        populate: PopulateApp,
        repopulate: PopulateApp,
    },
    RepopulatingDevice {
        populate: PopulateDevice,
        repopulate: PopulateDevice,
    },
}

impl ResourceDescriptor {
    /// Application-tier slot built exactly once.
    pub fn application_once<T, F>(key: ResourceKey<T>, mut factory: F) -> Self
    where
        T: ApplicationResource,
        F: FnMut(&ApplicationProvider<'_>) -> Result<T> + 'static,
    {
        Self::ApplicationOnce {
            populate: Box::new(move |application| {
                let value = factory(&ApplicationProvider::new(&*application))?;
                application.unchecked_set(key, value);
                Ok(())
            }),
        }
    }

    /// Device-tier slot built once per device lifetime.
    pub fn device_once<T, F>(key: ResourceKey<T>, mut factory: F) -> Self
    where
        T: DeviceResource,
        F: FnMut(&DeviceProvider<'_>) -> Result<T> + 'static,
    {
        Self::DeviceOnce {
            populate: Box::new(move |application, device| {
                let value = factory(&DeviceProvider::new(application, &*device))?;
                device.unchecked_set(key, value);
                Ok(())
            }),
        }
    }

    /// Application-tier slot rebuilt when `signal` fires.
    ///
    /// The factory sees the latest payload (`None` on the initial build) and
    /// the previous value if one exists. Returning `Ok(None)` keeps the
    /// previous value untouched; returning `Ok(Some(new))` disposes the
    /// previous value and installs the new one.
    pub fn repopulating_application<T, P, F>(
        key: ResourceKey<T>,
        signal: StalenessSignal<P>,
        factory: F,
    ) -> Self
    where
        T: ApplicationResource,
        P: Clone + 'static,
        F: FnMut(&ApplicationProvider<'_>, Option<P>, Option<&T>) -> Result<Option<T>> + 'static,
    {
        let pending: Rc<RefCell<Option<P>>> = Rc::new(RefCell::new(None));
        let factory = Rc::new(RefCell::new(factory));

        let populate: PopulateApp = {
            let pending = pending.clone();
            let factory = factory.clone();
            Box::new(move |application| {
                let built =
                    (&mut *factory.borrow_mut())(&ApplicationProvider::new(&*application), None, None)?;
                if let Some(value) = built {
                    application.unchecked_set(key, value);
                }
                let subscription = signal.subscribe({
                    let pending = pending.clone();
                    move |payload: &P| {
                        *pending.borrow_mut() = Some(payload.clone());
                    }
                });
                application
                    .unchecked_set(ResourceKey::<Subscription>::new("staleness-subscription"), subscription);
                Ok(())
            })
        };

        let repopulate: PopulateApp = Box::new(move |application| {
            let Some(payload) = pending.borrow_mut().take() else {
                return Ok(());
            };
            let previous = application.take(key);
            let built = (&mut *factory.borrow_mut())(
                &ApplicationProvider::new(&*application),
                Some(payload),
                previous.as_deref(),
            )?;
            finish_rebuild(built, previous, |value| application.unchecked_set(key, value));
            Ok(())
        });

        Self::RepopulatingApplication {
            populate,
            repopulate,
        }
    }

    /// Device-tier slot rebuilt when `signal` fires. Same keep/replace
    /// contract as [`Self::repopulating_application`].
    pub fn repopulating_device<T, P, F>(
        key: ResourceKey<T>,
        signal: StalenessSignal<P>,
        factory: F,
    ) -> Self
    where
        T: DeviceResource,
        P: Clone + 'static,
        F: FnMut(&DeviceProvider<'_>, Option<P>, Option<&T>) -> Result<Option<T>> + 'static,
    {
        let pending: Rc<RefCell<Option<P>>> = Rc::new(RefCell::new(None));
        let factory = Rc::new(RefCell::new(factory));

        let populate: PopulateDevice = {
            let pending = pending.clone();
            let factory = factory.clone();
            Box::new(move |application, device| {
                let built = (&mut *factory.borrow_mut())(
                    &DeviceProvider::new(application, &*device),
                    None,
                    None,
                )?;
                if let Some(value) = built {
                    device.unchecked_set(key, value);
                }
                // A fresh pending slot would be cleaner, but keeping the shared
                // one means a payload latched between device lifetimes still
                // reaches the first repopulation pass of the new device.
                let subscription = signal.subscribe({
                    let pending = pending.clone();
                    move |payload: &P| {
                        *pending.borrow_mut() = Some(payload.clone());
                    }
                });
                device
                    .unchecked_set(ResourceKey::<Subscription>::new("staleness-subscription"), subscription);
                Ok(())
            })
        };

        let repopulate: PopulateDevice = Box::new(move |application, device| {
            let Some(payload) = pending.borrow_mut().take() else {
                return Ok(());
            };
            let previous = device.take(key);
            let built = (&mut *factory.borrow_mut())(
                &DeviceProvider::new(application, &*device),
                Some(payload),
                previous.as_deref(),
            )?;
            finish_rebuild(built, previous, |value| device.unchecked_set(key, value));
            Ok(())
        });

        Self::RepopulatingDevice {
            populate,
            repopulate,
        }
    }

    /// Runs this descriptor's application-tier population, if it has one.
    pub fn populate_application_tier(
        &mut self,
        application: &mut ApplicationResources,
    ) -> Result<()> {
        match self {
            Self::ApplicationOnce { populate }
            | Self::RepopulatingApplication { populate, .. } => populate(application),
            Self::DeviceOnce { .. } | Self::RepopulatingDevice { .. } => Ok(()),
        }
    }

    /// Runs this descriptor's device-tier population, if it has one.
    pub fn populate_device_tier(
        &mut self,
        application: &ApplicationResources,
        device: &mut DeviceResources,
    ) -> Result<()> {
        match self {
            Self::DeviceOnce { populate } | Self::RepopulatingDevice { populate, .. } => {
                populate(application, device)
            }
            Self::ApplicationOnce { .. } | Self::RepopulatingApplication { .. } => Ok(()),
        }
    }

    /// Rebuilds the application-tier slot if its signal fired since the last
    /// pass; otherwise does nothing.
    pub fn repopulate_application_tier(
        &mut self,
        application: &mut ApplicationResources,
    ) -> Result<()> {
        match self {
            Self::RepopulatingApplication { repopulate, .. } => repopulate(application),
            _ => Ok(()),
        }
    }

    /// Rebuilds the device-tier slot if its signal fired since the last
    /// pass; otherwise does nothing.
    pub fn repopulate_device_tier(
        &mut self,
        application: &ApplicationResources,
        device: &mut DeviceResources,
    ) -> Result<()> {
        match self {
            Self::RepopulatingDevice { repopulate, .. } => repopulate(application, device),
            _ => Ok(()),
        }
    }
}

/// Applies a repopulating factory's verdict: `Some(new)` disposes the old
/// value and installs the new one, `None` reinstates the old value as-is.
fn finish_rebuild<T: Resource>(
    built: Option<T>,
    previous: Option<Box<T>>,
    install: impl FnOnce(T),
) {
    match built {
        Some(value) => {
            if let Some(mut old) = previous {
                old.dispose();
            }
            install(value);
        }
        None => {
            if let Some(old) = previous {
                install(*old);
            }
        }
    }
}
