//! Engine event delivery
//!
//! Transitions enqueue events while the state lock is held, so queue order is
//! transition order. Delivery happens afterwards on the calling thread, one
//! deliverer at a time, which keeps listener callbacks outside every engine
//! lock and still guarantees an event reached listeners before the call that
//! caused it returns.

use super::state::EngineState;
use super::lock;
use log::debug;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

/// Notification emitted by an engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    StateChanged { old: EngineState, new: EngineState },
    SpeakableStarted { id: u64, text: String },
    SpeakableEnded { id: u64, text: String },
    SpeakableCancelled { id: u64, text: String },
    EngineError { item: Option<u64>, message: String },
}

/// Receives every event an engine emits
pub trait EngineListener: Send + Sync {
    fn engine_event(&self, event: &EngineEvent);
}

impl<F> EngineListener for F
where
    F: Fn(&EngineEvent) + Send + Sync,
{
    fn engine_event(&self, event: &EngineEvent) {
        self(event)
    }
}

thread_local! {
    /// Dispatchers this thread is currently delivering for
    static DELIVERING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Ordered event queue plus registered listeners
#[derive(Default)]
pub struct EventDispatcher {
    pending: Mutex<VecDeque<EngineEvent>>,
    listeners: RwLock<Vec<Arc<dyn EngineListener>>>,
    delivery: Mutex<()>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn EngineListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Remove a listener previously added (compared by pointer)
    pub fn remove_listener(&self, listener: &Arc<dyn EngineListener>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Append an event to the delivery queue
    pub fn post(&self, event: EngineEvent) {
        lock(&self.pending).push_back(event);
    }

    /// Deliver everything queued so far, in order
    ///
    /// Re-entrant calls from inside a listener return immediately; the outer
    /// delivery loop picks up whatever the listener caused.
    pub fn deliver(&self) {
        let key = self as *const Self as usize;
        let nested = DELIVERING.with(|d| d.borrow().contains(&key));
        if nested {
            return;
        }

        let _delivery = lock(&self.delivery);
        DELIVERING.with(|d| d.borrow_mut().push(key));

        loop {
            let event = lock(&self.pending).pop_front();
            let Some(event) = event else { break };

            let listeners: Vec<Arc<dyn EngineListener>> = self
                .listeners
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone();

            debug!("Delivering {:?} to {} listeners", event, listeners.len());
            for listener in &listeners {
                listener.engine_event(&event);
            }
        }

        DELIVERING.with(|d| d.borrow_mut().retain(|k| *k != key));
    }

    /// Post and immediately deliver
    pub fn emit(&self, event: EngineEvent) {
        self.post(event);
        self.deliver();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> (Arc<dyn EngineListener>, Arc<Mutex<Vec<EngineEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Arc<dyn EngineListener> =
            Arc::new(move |e: &EngineEvent| sink.lock().unwrap().push(e.clone()));
        (listener, seen)
    }

    fn error(message: &str) -> EngineEvent {
        EngineEvent::EngineError {
            item: None,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_delivery_order() {
        let dispatcher = EventDispatcher::new();
        let (listener, seen) = collector();
        dispatcher.add_listener(listener);

        dispatcher.post(error("one"));
        dispatcher.post(error("two"));
        dispatcher.deliver();
        dispatcher.emit(error("three"));

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![error("one"), error("two"), error("three")]);
    }

    #[test]
    fn test_remove_listener() {
        let dispatcher = EventDispatcher::new();
        let (listener, seen) = collector();
        dispatcher.add_listener(listener.clone());

        assert!(dispatcher.remove_listener(&listener));
        assert!(!dispatcher.remove_listener(&listener));

        dispatcher.emit(error("ignored"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reentrant_emit_is_delivered_after_current() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let (listener, seen) = collector();

        let inner = dispatcher.clone();
        let echo: Arc<dyn EngineListener> = Arc::new(move |e: &EngineEvent| {
            if *e == error("first") {
                inner.emit(error("second"));
            }
        });

        dispatcher.add_listener(echo);
        dispatcher.add_listener(listener);
        dispatcher.emit(error("first"));

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![error("first"), error("second")]);
    }
}
