//! Change notification channels
//!
//! A context announces changes to the names it resolves through an [`EventChannel`]; formulas
//! subscribe for as long as they are attached to the context. A [`Subscription`] unregisters its
//! listener when dropped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Change notifications published by contexts and re-published by formulas
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A name was added, removed or renamed; compiled formulas must be rebuilt
    NamespaceChanged { name: String },
    /// A referenced value changed; compiled formulas stay valid but results may differ
    DependentChanged { name: Option<String> },
}

type Listener<E> = Rc<dyn Fn(&E)>;

struct Listeners<E> {
    next_id: Cell<u64>,
    entries: RefCell<Vec<(u64, Listener<E>)>>,
}

/// A list of listeners for one kind of event
pub struct EventChannel<E> {
    listeners: Rc<Listeners<E>>,
}

impl<E: 'static> EventChannel<E> {
    pub fn new() -> Self {
        Self {
            listeners: Rc::new(Listeners {
                next_id: Cell::new(0),
                entries: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Register a listener. It stays registered until the returned subscription is dropped.
    #[must_use = "dropping the subscription unregisters the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + 'static,
    {
        let id = self.listeners.next_id.get();
        self.listeners.next_id.set(id + 1);
        self.listeners
            .entries
            .borrow_mut()
            .push((id, Rc::new(listener)));

        let listeners: Weak<Listeners<E>> = Rc::downgrade(&self.listeners);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(listeners) = listeners.upgrade() {
                    listeners
                        .entries
                        .borrow_mut()
                        .retain(|(entry_id, _)| *entry_id != id);
                }
            })),
        }
    }

    /// Deliver an event to every listener registered at the time of the call.
    ///
    /// Listeners may subscribe or unsubscribe while being notified.
    pub fn notify(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .entries
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.entries.borrow().len()
    }
}

impl<E: 'static> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("listeners", &self.listeners.entries.borrow().len())
            .finish()
    }
}

/// Registration handle; unregisters the listener on drop
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Unregister now
    pub fn cancel(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
