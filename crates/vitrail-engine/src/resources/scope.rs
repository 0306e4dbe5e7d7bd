/// Ordered list of release actions for one lifetime scope.
///
/// `defer` registers an action; `release` runs all registered actions in
/// reverse registration order and empties the list. Dropping an unreleased
/// scope releases it. The window keeps one scope per tier so device- and
/// size-scoped cleanup can never interleave.
#[derive(Default)]
pub struct DisposalScope {
    entries: Vec<Box<dyn FnOnce()>>,
}

impl DisposalScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a release action. Later registrations run first.
    pub fn defer(&mut self, release: impl FnOnce() + 'static) {
        self.entries.push(Box::new(release));
    }

    /// Runs every deferred action, newest first, leaving the scope empty
    /// and reusable.
    pub fn release(&mut self) {
        while let Some(release) = self.entries.pop() {
            release();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for DisposalScope {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn releases_in_reverse_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut scope = DisposalScope::new();

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            scope.defer(move || order.borrow_mut().push(tag));
        }

        scope.release();
        assert_eq!(*order.borrow(), vec!["third", "second", "first"]);
        assert!(scope.is_empty());
    }

    #[test]
    fn scope_is_reusable_after_release() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut scope = DisposalScope::new();

        {
            let order = order.clone();
            scope.defer(move || order.borrow_mut().push(1));
        }
        scope.release();
        {
            let order = order.clone();
            scope.defer(move || order.borrow_mut().push(2));
        }
        scope.release();

        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn drop_releases_remaining_entries() {
        let order = Rc::new(RefCell::new(Vec::new()));
        {
            let mut scope = DisposalScope::new();
            let order = order.clone();
            scope.defer(move || order.borrow_mut().push("dropped"));
        }
        assert_eq!(*order.borrow(), vec!["dropped"]);
    }
}
