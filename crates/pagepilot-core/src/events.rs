//! Typed observer lists with synchronous fan-out.
//!
//! Components that need lifecycle notifications (circuit breaker state
//! changes, remote-cache connection transitions, realtime metric ticks) hold
//! an [`EventListeners`] collection and emit concrete event types through it.
//! Listeners run synchronously in registration order; a panicking listener is
//! caught and logged so the remaining listeners still fire.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// An event emitted by a PagePilot component.
pub trait ComponentEvent: Send + Sync + fmt::Debug {
    /// Short event discriminator, e.g. `"state_transition"`.
    fn event_type(&self) -> &'static str;

    /// When the event occurred.
    fn timestamp(&self) -> Instant;

    /// Name of the component instance that emitted the event.
    fn component(&self) -> &str;
}

/// A subscriber for events of type `E`.
pub trait EventListener<E: ComponentEvent>: Send + Sync {
    /// Called synchronously for every emitted event.
    fn on_event(&self, event: &E);
}

/// A collection of listeners for one event type.
#[derive(Clone)]
pub struct EventListeners<E: ComponentEvent> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E: ComponentEvent> EventListeners<E> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Registers a listener.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits `event` to every listener in registration order.
    ///
    /// A listener that panics is logged and skipped; the rest still run.
    pub fn emit(&self, event: &E) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if result.is_err() {
                tracing::warn!(
                    listener_index = index,
                    component = event.component(),
                    event_type = event.event_type(),
                    "event listener panicked"
                );
            }
        }
    }

    /// Returns true if no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: ComponentEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A closure-backed listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Wraps `f` as a listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: ComponentEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestEvent {
        name: String,
        at: Instant,
    }

    impl ComponentEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            "test"
        }

        fn timestamp(&self) -> Instant {
            self.at
        }

        fn component(&self) -> &str {
            &self.name
        }
    }

    fn event() -> TestEvent {
        TestEvent {
            name: "unit".to_string(),
            at: Instant::now(),
        }
    }

    #[test]
    fn listeners_fire_in_order() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(move |_: &TestEvent| {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        listeners.emit(&event());
        listeners.emit(&event());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_listener_does_not_stop_fanout() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(|_: &TestEvent| panic!("boom")));
        listeners.add(FnListener::new(move |_: &TestEvent| {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        listeners.emit(&event());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_collection_reports_empty() {
        let listeners: EventListeners<TestEvent> = EventListeners::new();
        assert!(listeners.is_empty());
        assert_eq!(listeners.len(), 0);
    }
}
