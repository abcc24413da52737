//! Single-value broadcast primitive
//!
//! A `Signal` remembers the last emitted value and fans every emission out to
//! its subscribers, synchronously and in registration order. It is not a
//! queue: re-emitting overwrites the stored value, and a panicking subscriber
//! unwinds into the emitter.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct Signal<T> {
    value: Mutex<Option<T>>,
    subscribers: Mutex<Vec<Subscriber<T>>>,
}

impl<T: Clone> Signal<T> {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Last emitted value
    pub fn value(&self) -> Option<T> {
        lock(&self.value).clone()
    }

    /// Register `subscriber` for every future emission
    pub fn subscribe(&self, subscriber: impl Fn(&T) + Send + Sync + 'static) {
        lock(&self.subscribers).push(Arc::new(subscriber));
    }

    /// Store `value` and invoke every current subscriber with it.
    ///
    /// Subscribers run outside the internal locks, so a subscriber may
    /// subscribe or emit again; those changes apply from the next emission.
    pub fn emit(&self, value: T) {
        *lock(&self.value) = Some(value.clone());
        let subscribers = lock(&self.subscribers).clone();
        for subscriber in subscribers {
            subscriber(&value);
        }
    }

    /// Drop every subscriber
    pub fn clear(&self) {
        lock(&self.subscribers).clear();
    }
}

impl<T: Clone> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
