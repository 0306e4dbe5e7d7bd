use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// Typed identity key for one dictionary slot.
///
/// Equality is by identity: two keys compare equal only when they came from
/// the same `new` call, so two keys of the same type still name distinct
/// slots. The label is diagnostic only. The type parameter pins what the
/// slot holds, which is what lets the dictionaries hand back typed
/// references without a cast at the call site.
pub struct ResourceKey<T: ?Sized> {
    id: u64,
    label: &'static str,
    _ty: PhantomData<fn() -> T>,
}

impl<T: ?Sized> ResourceKey<T> {
    /// Allocates a fresh key. Each call produces a distinct identity.
    pub fn new(label: &'static str) -> Self {
        Self {
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            label,
            _ty: PhantomData,
        }
    }

    /// Diagnostic label supplied at creation.
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn raw(&self) -> u64 {
        self.id
    }

    /// Reinterprets this key's slot as holding another type.
    ///
    /// Exists only so tests can manufacture a type-mismatched read; the
    /// typed API has no way to produce one otherwise.
    #[cfg(test)]
    pub(crate) fn aliased<U>(&self) -> ResourceKey<U> {
        ResourceKey {
            id: self.id,
            label: self.label,
            _ty: PhantomData,
        }
    }
}

impl<T: ?Sized> Copy for ResourceKey<T> {}

impl<T: ?Sized> Clone for ResourceKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> PartialEq for ResourceKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: ?Sized> Eq for ResourceKey<T> {}

impl<T: ?Sized> Hash for ResourceKey<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for ResourceKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceKey({}#{})", self.label, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_distinct_identities() {
        let a = ResourceKey::<u32>::new("slot");
        let b = ResourceKey::<u32>::new("slot");
        assert_ne!(a, b);
        assert_eq!(a, a);
    }

    #[test]
    fn copies_compare_equal() {
        let a = ResourceKey::<String>::new("text");
        let b = a;
        assert_eq!(a, b);
    }
}
