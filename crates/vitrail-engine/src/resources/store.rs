use std::any::{Any, type_name};
use std::collections::HashMap;

use thiserror::Error;

use crate::bug;
use crate::device::DeviceContext;

use super::key::ResourceKey;

/// A value owned by a resource dictionary.
///
/// `dispose` is the release hook: it runs exactly once, synchronously, when
/// the value is removed, replaced, or its tier is torn down. The default is
/// a no-op; plain `Drop` still runs afterwards as usual.
pub trait Resource: Any {
    fn dispose(&mut self) {}
}

/// Marker for values allowed in the application tier through `set`.
pub trait ApplicationResource: Resource {}

/// Marker for values allowed in the device tier through `set`.
pub trait DeviceResource: Resource {}

/// Lookup failure reported by [`ApplicationResources::get`] and
/// [`DeviceResources::get`].
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource `{key}` is not present")]
    NotFound { key: &'static str },

    #[error("resource `{key}` holds `{found}`, requested `{expected}`")]
    TypeMismatch {
        key: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

struct Slot {
    value: Box<dyn Resource>,
    type_name: &'static str,
    label: &'static str,
}

/// Type-erased slot map shared by both tiers.
#[derive(Default)]
struct ResourceStore {
    slots: HashMap<u64, Slot>,
}

impl ResourceStore {
    fn get<T: Resource>(&self, key: ResourceKey<T>) -> Result<&T, ResourceError> {
        let slot = self
            .slots
            .get(&key.raw())
            .ok_or(ResourceError::NotFound { key: key.label() })?;
        let value: &dyn Any = &*slot.value;
        value
            .downcast_ref::<T>()
            .ok_or(ResourceError::TypeMismatch {
                key: key.label(),
                expected: type_name::<T>(),
                found: slot.type_name,
            })
    }

    fn try_get<T: Resource>(&self, key: ResourceKey<T>) -> Option<&T> {
        let slot = self.slots.get(&key.raw())?;
        let value: &dyn Any = &*slot.value;
        match value.downcast_ref::<T>() {
            Some(v) => Some(v),
            None => bug!(
                "D7C41A02",
                "resource `{}` holds `{}`, requested `{}`",
                key.label(),
                slot.type_name,
                type_name::<T>()
            ),
        }
    }

    fn contains<T: Resource>(&self, key: ResourceKey<T>) -> bool {
        self.slots.contains_key(&key.raw())
    }

    /// Inserts, disposing whatever previously occupied the slot.
    fn set<T: Resource>(&mut self, key: ResourceKey<T>, value: T) {
        self.remove_raw(key.raw());
        self.slots.insert(
            key.raw(),
            Slot {
                value: Box::new(value),
                type_name: type_name::<T>(),
                label: key.label(),
            },
        );
    }

    fn remove_raw(&mut self, id: u64) -> bool {
        match self.slots.remove(&id) {
            Some(mut slot) => {
                slot.value.dispose();
                true
            }
            None => false,
        }
    }

    /// Extracts the value without running `dispose`. The caller becomes
    /// responsible for disposing or reinstating it.
    fn take<T: Resource>(&mut self, key: ResourceKey<T>) -> Option<Box<T>> {
        let slot = self.slots.remove(&key.raw())?;
        let found = slot.type_name;
        let value: Box<dyn Any> = slot.value;
        match value.downcast::<T>() {
            Ok(v) => Some(v),
            Err(_) => bug!(
                "91E6C4F0",
                "resource `{}` holds `{}`, requested `{}`",
                key.label(),
                found,
                type_name::<T>()
            ),
        }
    }

    fn clear(&mut self) {
        for (_, mut slot) in self.slots.drain() {
            log::trace!("disposing resource `{}`", slot.label);
            slot.value.dispose();
        }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

impl Drop for ResourceStore {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Application-lifetime resource dictionary (the device-independent tier).
///
/// Owned by the application; outlives every window and every GPU device.
#[derive(Default)]
pub struct ApplicationResources {
    store: ResourceStore,
}

impl ApplicationResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, disposing any previous occupant of the slot first.
    pub fn set<T: ApplicationResource>(&mut self, key: ResourceKey<T>, value: T) {
        self.store.set(key, value);
    }

    /// Tier-unchecked insert. Same replace semantics as `set`, without the
    /// application-tier bound; the escape hatch for runtime bookkeeping
    /// values such as staleness subscriptions.
    pub fn unchecked_set<T: Resource>(&mut self, key: ResourceKey<T>, value: T) {
        self.store.set(key, value);
    }

    pub fn get<T: Resource>(&self, key: ResourceKey<T>) -> Result<&T, ResourceError> {
        self.store.get(key)
    }

    /// Lookup that treats absence as ordinary. A present slot of the wrong
    /// type is a programming error and aborts.
    pub fn try_get<T: Resource>(&self, key: ResourceKey<T>) -> Option<&T> {
        self.store.try_get(key)
    }

    pub fn contains<T: Resource>(&self, key: ResourceKey<T>) -> bool {
        self.store.contains(key)
    }

    /// Removes and disposes the slot. Returns whether anything was present.
    pub fn remove<T: Resource>(&mut self, key: ResourceKey<T>) -> bool {
        self.store.remove_raw(key.raw())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }

    pub(crate) fn take<T: Resource>(&mut self, key: ResourceKey<T>) -> Option<Box<T>> {
        self.store.take(key)
    }

    pub(crate) fn clear(&mut self) {
        self.store.clear();
    }
}

/// Device-lifetime resource dictionary (the device-dependent tier).
///
/// One per window. Besides keyed slots it carries the built-in
/// [`DeviceContext`] the render host installs when the GPU device comes up;
/// both are dropped together on device loss.
#[derive(Default)]
pub struct DeviceResources {
    store: ResourceStore,
    context: Option<DeviceContext>,
}

impl DeviceResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// GPU handles for the current device lifetime, if one is active.
    pub fn context(&self) -> Option<&DeviceContext> {
        self.context.as_ref()
    }

    pub(crate) fn set_context(&mut self, context: DeviceContext) {
        self.context = Some(context);
    }

    /// Stores a value, disposing any previous occupant of the slot first.
    pub fn set<T: DeviceResource>(&mut self, key: ResourceKey<T>, value: T) {
        self.store.set(key, value);
    }

    /// Tier-unchecked insert; see [`ApplicationResources::unchecked_set`].
    pub fn unchecked_set<T: Resource>(&mut self, key: ResourceKey<T>, value: T) {
        self.store.set(key, value);
    }

    pub fn get<T: Resource>(&self, key: ResourceKey<T>) -> Result<&T, ResourceError> {
        self.store.get(key)
    }

    /// Lookup that treats absence as ordinary. A present slot of the wrong
    /// type is a programming error and aborts.
    pub fn try_get<T: Resource>(&self, key: ResourceKey<T>) -> Option<&T> {
        self.store.try_get(key)
    }

    pub fn contains<T: Resource>(&self, key: ResourceKey<T>) -> bool {
        self.store.contains(key)
    }

    /// Removes and disposes the slot. Returns whether anything was present.
    pub fn remove<T: Resource>(&mut self, key: ResourceKey<T>) -> bool {
        self.store.remove_raw(key.raw())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }

    pub(crate) fn take<T: Resource>(&mut self, key: ResourceKey<T>) -> Option<Box<T>> {
        self.store.take(key)
    }

    /// Disposes every slot, then drops the device context.
    pub(crate) fn clear(&mut self) {
        self.store.clear();
        self.context = None;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    struct Tracked {
        tag: u32,
        disposals: Rc<Cell<u32>>,
    }

    impl Tracked {
        fn new(tag: u32, disposals: &Rc<Cell<u32>>) -> Self {
            Self {
                tag,
                disposals: disposals.clone(),
            }
        }
    }

    impl Resource for Tracked {
        fn dispose(&mut self) {
            self.disposals.set(self.disposals.get() + 1);
        }
    }

    impl ApplicationResource for Tracked {}

    // ── lookup ──

    #[test]
    fn get_after_set_returns_the_value() {
        let mut dict = ApplicationResources::new();
        let key = ResourceKey::<Tracked>::new("tracked");
        let disposals = Rc::new(Cell::new(0));

        dict.set(key, Tracked::new(7, &disposals));

        assert_eq!(dict.get(key).unwrap().tag, 7);
        assert!(dict.contains(key));
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn get_missing_reports_not_found() {
        let dict = ApplicationResources::new();
        let key = ResourceKey::<Tracked>::new("absent");

        assert!(matches!(
            dict.get(key),
            Err(ResourceError::NotFound { key: "absent" })
        ));
        assert!(dict.try_get(key).is_none());
    }

    #[test]
    fn get_with_aliased_key_reports_type_mismatch() {
        let mut dict = ApplicationResources::new();
        let key = ResourceKey::<Tracked>::new("tracked");
        let disposals = Rc::new(Cell::new(0));
        dict.set(key, Tracked::new(1, &disposals));

        struct Other;
        impl Resource for Other {}

        let wrong: ResourceKey<Other> = key.aliased();
        assert!(matches!(
            dict.get(wrong),
            Err(ResourceError::TypeMismatch { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "bug D7C41A02")]
    fn try_get_with_aliased_key_aborts() {
        let mut dict = ApplicationResources::new();
        let key = ResourceKey::<Tracked>::new("tracked");
        let disposals = Rc::new(Cell::new(0));
        dict.set(key, Tracked::new(1, &disposals));

        struct Other;
        impl Resource for Other {}

        let wrong: ResourceKey<Other> = key.aliased();
        let _ = dict.try_get(wrong);
    }

    // ── disposal ──

    #[test]
    fn replacing_disposes_the_old_value_once() {
        let mut dict = ApplicationResources::new();
        let key = ResourceKey::<Tracked>::new("tracked");
        let disposals = Rc::new(Cell::new(0));

        dict.set(key, Tracked::new(1, &disposals));
        dict.set(key, Tracked::new(2, &disposals));

        assert_eq!(disposals.get(), 1);
        assert_eq!(dict.get(key).unwrap().tag, 2);
    }

    #[test]
    fn remove_disposes_and_is_idempotent() {
        let mut dict = ApplicationResources::new();
        let key = ResourceKey::<Tracked>::new("tracked");
        let disposals = Rc::new(Cell::new(0));

        dict.set(key, Tracked::new(1, &disposals));

        assert!(dict.remove(key));
        assert_eq!(disposals.get(), 1);
        assert!(!dict.remove(key));
        assert_eq!(disposals.get(), 1);
        assert!(dict.is_empty());
    }

    #[test]
    fn clear_disposes_everything_and_is_idempotent() {
        let mut dict = ApplicationResources::new();
        let a = ResourceKey::<Tracked>::new("a");
        let b = ResourceKey::<Tracked>::new("b");
        let disposals = Rc::new(Cell::new(0));

        dict.set(a, Tracked::new(1, &disposals));
        dict.set(b, Tracked::new(2, &disposals));

        dict.clear();
        assert_eq!(disposals.get(), 2);
        assert!(dict.is_empty());

        dict.clear();
        assert_eq!(disposals.get(), 2);
    }

    #[test]
    fn drop_disposes_remaining_values() {
        let disposals = Rc::new(Cell::new(0));
        {
            let mut dict = ApplicationResources::new();
            let key = ResourceKey::<Tracked>::new("tracked");
            dict.set(key, Tracked::new(1, &disposals));
        }
        assert_eq!(disposals.get(), 1);
    }

    #[test]
    fn take_skips_disposal() {
        let mut dict = ApplicationResources::new();
        let key = ResourceKey::<Tracked>::new("tracked");
        let disposals = Rc::new(Cell::new(0));

        dict.set(key, Tracked::new(9, &disposals));

        let taken = dict.take(key).unwrap();
        assert_eq!(taken.tag, 9);
        assert_eq!(disposals.get(), 0);
        assert!(!dict.contains(key));
    }

    #[test]
    fn same_type_under_two_keys_stays_distinct() {
        let mut dict = ApplicationResources::new();
        let a = ResourceKey::<Tracked>::new("a");
        let b = ResourceKey::<Tracked>::new("b");
        let disposals = Rc::new(Cell::new(0));

        dict.set(a, Tracked::new(1, &disposals));
        dict.set(b, Tracked::new(2, &disposals));

        assert_eq!(dict.get(a).unwrap().tag, 1);
        assert_eq!(dict.get(b).unwrap().tag, 2);
    }

    // ── device tier ──

    #[test]
    fn device_clear_drops_slots_and_context() {
        struct Thing;
        impl Resource for Thing {}
        impl DeviceResource for Thing {}

        let mut dict = DeviceResources::new();
        let key = ResourceKey::<Thing>::new("thing");
        dict.set(key, Thing);

        assert!(dict.context().is_none());
        dict.clear();
        assert!(dict.is_empty());
        assert!(dict.context().is_none());
    }
}
