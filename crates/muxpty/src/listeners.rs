use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

/// Callback invoked once per chunk delivered on its registered stream.
pub type Listener = Box<dyn FnMut(&[u8]) + Send>;

/// Named listener registry, mutable while dispatch is in flight.
///
/// Names are unique; adding under an existing name replaces the previous
/// callback. Mutation and dispatch serialize on an internal lock, so a
/// registration racing a dispatch takes effect from the next dispatch.
/// Callbacks must not touch the registry they run under — the lock is held
/// for the duration of a dispatch.
pub struct Listeners {
    inner: Mutex<HashMap<String, Listener>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Register `listener` under `name`, replacing any existing entry.
    pub fn add(&self, name: impl Into<String>, listener: Listener) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.insert(name.into(), listener);
        }
    }

    /// Remove the listener registered under `name`. No-op when absent.
    pub fn remove(&self, name: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.remove(name);
        }
    }

    /// Drop every registered listener.
    pub fn remove_all(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver one chunk to every registered listener.
    ///
    /// A panicking listener is logged and skipped; it never blocks delivery
    /// to the others and never tears down the calling loop.
    pub fn dispatch(&self, chunk: &[u8]) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        for (name, listener) in inner.iter_mut() {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(chunk))).is_err() {
                log::warn!("listener {name} panicked on a {}-byte chunk", chunk.len());
            }
        }
    }

    /// Move a staged listener map into the registry. Used once when an event
    /// loop is constructed, before its first dispatch.
    pub(crate) fn install(&self, seed: HashMap<String, Listener>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.extend(seed);
        }
    }
}

impl Default for Listeners {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn collector() -> (Arc<Mutex<Vec<u8>>>, Listener) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Listener = Box::new(move |chunk| {
            sink.lock().unwrap().extend_from_slice(chunk);
        });
        (seen, listener)
    }

    #[test]
    fn test_dispatch_reaches_all_listeners() {
        let listeners = Listeners::new();
        let (a_seen, a) = collector();
        let (b_seen, b) = collector();
        listeners.add("a", a);
        listeners.add("b", b);

        listeners.dispatch(b"chunk");

        assert_eq!(&*a_seen.lock().unwrap(), b"chunk");
        assert_eq!(&*b_seen.lock().unwrap(), b"chunk");
    }

    #[test]
    fn test_add_replaces_same_name() {
        let listeners = Listeners::new();
        let (first_seen, first) = collector();
        let (second_seen, second) = collector();
        listeners.add("tap", first);
        listeners.add("tap", second);
        assert_eq!(listeners.len(), 1);

        listeners.dispatch(b"x");

        assert!(first_seen.lock().unwrap().is_empty());
        assert_eq!(&*second_seen.lock().unwrap(), b"x");
    }

    #[test]
    fn test_remove_stops_delivery() {
        let listeners = Listeners::new();
        let (seen, listener) = collector();
        listeners.add("tap", listener);

        listeners.dispatch(b"one");
        listeners.remove("tap");
        listeners.dispatch(b"two");

        assert_eq!(&*seen.lock().unwrap(), b"one");
        // Removing a name that was never registered is a no-op.
        listeners.remove("ghost");
    }

    #[test]
    fn test_remove_all() {
        let listeners = Listeners::new();
        let (seen, listener) = collector();
        listeners.add("a", listener);
        listeners.add("b", Box::new(|_| {}));
        listeners.remove_all();
        assert!(listeners.is_empty());

        listeners.dispatch(b"gone");
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let listeners = Listeners::new();
        let (seen, listener) = collector();
        listeners.add("boom", Box::new(|_| panic!("listener bug")));
        listeners.add("tap", listener);

        listeners.dispatch(b"chunk");
        listeners.dispatch(b"chunk");

        // Delivery continued both times despite the panicking neighbor.
        assert_eq!(&*seen.lock().unwrap(), b"chunkchunk");
    }

    #[test]
    fn test_install_seeds_registry() {
        let listeners = Listeners::new();
        let (seen, listener) = collector();
        let mut seed: HashMap<String, Listener> = HashMap::new();
        seed.insert("staged".to_string(), listener);

        listeners.install(seed);
        listeners.dispatch(b"early");

        assert_eq!(&*seen.lock().unwrap(), b"early");
    }
}
