// Copyright 2026 the Softmask Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Explicit subscriber lists for engine-level notifications.
//!
//! The compositor broadcasts buffer-size changes through a [`CallbackList`]
//! so hosts can resize dependent resources. Registration returns a
//! [`CallbackId`] that must be kept to unsubscribe; there is no global event
//! bus.

use alloc::boxed::Box;
use alloc::vec::Vec;

/// Identifies one registered callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// An ordered list of subscribers invoked with a payload value.
pub struct CallbackList<A> {
    entries: Vec<(CallbackId, Box<dyn FnMut(&A)>)>,
    next_id: u64,
}

impl<A> core::fmt::Debug for CallbackList<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallbackList")
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl<A> Default for CallbackList<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> CallbackList<A> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Registers a subscriber and returns its id.
    pub fn add(&mut self, f: impl FnMut(&A) + 'static) -> CallbackId {
        self.next_id += 1;
        let id = CallbackId(self.next_id);
        self.entries.push((id, Box::new(f)));
        id
    }

    /// Unregisters a subscriber. Returns whether it was present.
    pub fn remove(&mut self, id: CallbackId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(cid, _)| *cid != id);
        self.entries.len() != before
    }

    /// Invokes every subscriber in registration order.
    pub fn invoke(&mut self, arg: &A) {
        for (_, f) in &mut self.entries {
            f(arg);
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use core::cell::RefCell;

    #[test]
    fn invoke_runs_in_registration_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut list: CallbackList<u32> = CallbackList::new();

        let s1 = Rc::clone(&seen);
        list.add(move |v| s1.borrow_mut().push(*v * 10));
        let s2 = Rc::clone(&seen);
        list.add(move |v| s2.borrow_mut().push(*v * 100));

        list.invoke(&3);
        assert_eq!(*seen.borrow(), alloc::vec![30, 300]);
    }

    #[test]
    fn removed_callback_is_not_invoked() {
        let seen = Rc::new(RefCell::new(0_u32));
        let mut list: CallbackList<()> = CallbackList::new();

        let s = Rc::clone(&seen);
        let id = list.add(move |()| *s.borrow_mut() += 1);
        list.invoke(&());
        assert!(list.remove(id));
        assert!(!list.remove(id));
        list.invoke(&());

        assert_eq!(*seen.borrow(), 1);
        assert!(list.is_empty());
    }
}
