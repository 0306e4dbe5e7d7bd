use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::store::Resource;

use crate::bug;

struct Inner<P> {
    next_id: u64,
    subscribers: Vec<(u64, Rc<dyn Fn(&P)>)>,
}

/// Notification channel telling dependents that a value is out of date.
///
/// Handles are cheap clones sharing one subscriber list. `raise` invokes
/// every live callback synchronously with the payload; repopulating
/// descriptors use those callbacks to latch the latest payload and flag
/// their slot dirty, so the actual rebuild happens later, on the next
/// repopulation pass, not inside the raise.
pub struct StalenessSignal<P> {
    inner: Rc<RefCell<Inner<P>>>,
}

impl<P: 'static> Default for StalenessSignal<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Clone for StalenessSignal<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: 'static> StalenessSignal<P> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                next_id: 1,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Registers a callback; it stays live until the returned
    /// [`Subscription`] is cancelled, disposed, or dropped.
    pub fn subscribe(&self, callback: impl Fn(&P) + 'static) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, Rc::new(callback)));
            id
        };

        let weak: Weak<RefCell<Inner<P>>> = Rc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().subscribers.retain(|(sid, _)| *sid != id);
                }
            })),
        }
    }

    /// Invokes every subscriber with the payload.
    ///
    /// The list is snapshotted first, so callbacks may subscribe or cancel
    /// without tripping a borrow. Raising from inside a callback is a
    /// runtime defect.
    pub fn raise(&self, payload: P) {
        let callbacks: Vec<Rc<dyn Fn(&P)>> = match self.inner.try_borrow() {
            Ok(inner) => inner.subscribers.iter().map(|(_, cb)| cb.clone()).collect(),
            Err(_) => bug!("3A58F20C", "staleness signal raised re-entrantly"),
        };
        for callback in callbacks {
            callback(&payload);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }
}

/// Live registration on a [`StalenessSignal`].
///
/// Cancellation is idempotent and happens on explicit `cancel`, on
/// `dispose` (so a subscription parked in a resource dictionary dies with
/// its tier), or on drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_none()
    }
}

impl Resource for Subscription {
    fn dispose(&mut self) {
        self.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn raise_reaches_every_subscriber() {
        let signal = StalenessSignal::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _a = signal.subscribe({
            let seen = seen.clone();
            move |p| seen.borrow_mut().push(("a", *p))
        });
        let _b = signal.subscribe({
            let seen = seen.clone();
            move |p| seen.borrow_mut().push(("b", *p))
        });

        signal.raise(5);
        assert_eq!(*seen.borrow(), vec![("a", 5), ("b", 5)]);
    }

    #[test]
    fn cancelled_subscription_stops_receiving() {
        let signal = StalenessSignal::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let mut sub = signal.subscribe({
            let seen = seen.clone();
            move |p| seen.borrow_mut().push(*p)
        });

        signal.raise(1);
        sub.cancel();
        signal.raise(2);

        assert_eq!(*seen.borrow(), vec![1]);
        assert!(sub.is_cancelled());
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn dropping_the_subscription_unsubscribes() {
        let signal = StalenessSignal::<u32>::new();
        {
            let _sub = signal.subscribe(|_| {});
            assert_eq!(signal.subscriber_count(), 1);
        }
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn dispose_cancels_like_an_owned_resource() {
        let signal = StalenessSignal::<u32>::new();
        let mut sub = signal.subscribe(|_| {});

        sub.dispose();
        assert!(sub.is_cancelled());
        assert_eq!(signal.subscriber_count(), 0);

        // dispose again is a no-op
        sub.dispose();
    }

    #[test]
    fn subscription_outliving_the_signal_cancels_quietly() {
        let mut sub = {
            let signal = StalenessSignal::<u32>::new();
            signal.subscribe(|_| {})
        };
        sub.cancel();
    }

    #[test]
    fn callbacks_may_cancel_other_subscriptions_during_raise() {
        let signal = StalenessSignal::<u32>::new();
        let victim = Rc::new(RefCell::new(None::<Subscription>));
        let hits = Rc::new(RefCell::new(0u32));

        *victim.borrow_mut() = Some(signal.subscribe({
            let hits = hits.clone();
            move |_| *hits.borrow_mut() += 1
        }));

        let _killer = signal.subscribe({
            let victim = victim.clone();
            move |_| {
                if let Some(mut sub) = victim.borrow_mut().take() {
                    sub.cancel();
                }
            }
        });

        // Snapshot semantics: the victim still sees this raise, not later ones.
        signal.raise(0);
        signal.raise(0);
        assert_eq!(*hits.borrow(), 1);
    }
}
