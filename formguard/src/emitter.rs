//! Typed broadcast channel used by the validate protocol.
//!
//! Emitting an event synchronously calls every listener currently
//! subscribed, in subscription order, and hands back what each one
//! returned. Nothing is buffered for listeners that subscribe later.

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};

use log::{trace, warn};

use crate::error::{ListenerPanic, panic_message};
use crate::lock;

/// Type alias for boxed futures returned by listeners and rules.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A listener for events of type `E` returning `R`.
pub type Listener<E, R> = Arc<dyn Fn(&E) -> R + Send + Sync>;

/// Handle identifying one subscription on one emitter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ListenerId(u64);

/// What a listener contributes to an emit.
///
/// `None` declines to contribute; `Value` is ready now; `Pending` resolves
/// later and must be awaited before merging.
pub enum ListenerResult<T> {
    None,
    Value(T),
    Pending(BoxFuture<'static, T>),
}

impl<T: Send + 'static> ListenerResult<T> {
    /// Turn every contributing variant into a future; `None` yields nothing.
    pub fn into_future(self) -> Option<BoxFuture<'static, T>> {
        match self {
            Self::None => None,
            Self::Value(value) => Some(Box::pin(futures::future::ready(value))),
            Self::Pending(future) => Some(future),
        }
    }
}

impl<T> ListenerResult<T> {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl<T: fmt::Debug> fmt::Debug for ListenerResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Pending(_) => write!(f, "Pending(..)"),
        }
    }
}

struct Registration<E, R> {
    id: ListenerId,
    listener: Listener<E, R>,
}

struct Listeners<E, R> {
    next_id: u64,
    registrations: Vec<Registration<E, R>>,
}

impl<E, R> Listeners<E, R> {
    fn contains(&self, id: ListenerId) -> bool {
        self.registrations.iter().any(|r| r.id == id)
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.id != id);
        before != self.registrations.len()
    }
}

/// Multi-listener broadcast channel for events of type `E`.
pub struct EventEmitter<E, R = ()> {
    name: &'static str,
    listeners: Arc<Mutex<Listeners<E, R>>>,
}

impl<E: 'static, R: 'static> EventEmitter<E, R> {
    /// Create an emitter. `name` shows up in logs and panic reports.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            listeners: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                registrations: Vec::new(),
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Subscribe a listener.
    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&E) -> R + Send + Sync + 'static,
    {
        self.on_shared(Arc::new(listener))
    }

    /// Subscribe a shared listener.
    ///
    /// Subscribing the same `Arc` twice returns the existing id.
    pub fn on_shared(&self, listener: Listener<E, R>) -> ListenerId {
        let mut listeners = lock(&self.listeners);
        if let Some(existing) = listeners
            .registrations
            .iter()
            .find(|r| Arc::ptr_eq(&r.listener, &listener))
        {
            return existing.id;
        }

        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners.registrations.push(Registration { id, listener });
        trace!("{}: subscribed listener {:?}", self.name, id);
        id
    }

    /// Unsubscribe a listener. Returns false if it was not subscribed.
    pub fn off(&self, id: ListenerId) -> bool {
        let removed = lock(&self.listeners).remove(id);
        if removed {
            trace!("{}: unsubscribed listener {:?}", self.name, id);
        }
        removed
    }

    /// Subscribe a listener for as long as the returned guard lives.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) -> R + Send + Sync + 'static,
    {
        let id = self.on(listener);
        let weak: Weak<Mutex<Listeners<E, R>>> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = weak.upgrade() {
                lock(&listeners).remove(id);
            }
        })
    }

    pub fn is_subscribed(&self, id: ListenerId) -> bool {
        lock(&self.listeners).contains(id)
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).registrations.len()
    }

    /// Call every subscribed listener with `event`.
    ///
    /// Results come back in subscription order. A listener that panics gets
    /// an `Err` in its slot and the remaining listeners still run. A
    /// listener removed while the emit is in progress is not called.
    pub fn emit(&self, event: &E) -> Vec<Result<R, ListenerPanic>> {
        // Listeners run without the lock so they may subscribe or unsubscribe.
        let snapshot: Vec<(ListenerId, Listener<E, R>)> = lock(&self.listeners)
            .registrations
            .iter()
            .map(|r| (r.id, Arc::clone(&r.listener)))
            .collect();

        trace!("{}: emitting to {} listener(s)", self.name, snapshot.len());

        let mut results = Vec::with_capacity(snapshot.len());
        for (id, listener) in snapshot {
            if !self.is_subscribed(id) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(result) => results.push(Ok(result)),
                Err(panic) => {
                    let message = panic_message(&panic);
                    warn!("{}: listener {:?} panicked: {}", self.name, id, message);
                    results.push(Err(ListenerPanic {
                        event: self.name,
                        message,
                    }));
                }
            }
        }
        results
    }
}

/// Guard that unsubscribes when dropped.
///
/// Dropping is synchronous and unsubscribing twice is harmless.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Unsubscribe now.
    pub fn cancel(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
