// Author: Lukas Bower
// Purpose: Thread-safe FIFO of pending event lines and deferred actions.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Unit of work for the dispatcher.
pub enum Event {
    /// Event line read from the manager.
    Line(String),
    /// Closure run on the dispatcher thread.
    Deferred(Box<dyn FnOnce() + Send>),
}

impl Event {
    /// Wrap a closure.
    pub fn deferred<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::Deferred(Box::new(action))
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(line) => f.debug_tuple("Line").field(line).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<String> for Event {
    fn from(value: String) -> Self {
        Self::Line(value)
    }
}

impl From<&str> for Event {
    fn from(value: &str) -> Self {
        Self::Line(value.to_owned())
    }
}

/// Unbounded multi-producer FIFO with blocking pop.
#[derive(Debug, Default)]
pub struct EventQueue {
    items: Mutex<VecDeque<Event>>,
    ready: Condvar,
}

impl EventQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event and wake one waiter.
    pub fn push(&self, event: impl Into<Event>) {
        self.lock().push_back(event.into());
        self.ready.notify_one();
    }

    /// Remove the oldest event, blocking until one is available.
    pub fn pop(&self) -> Event {
        let mut items = self.lock();
        loop {
            if let Some(event) = items.pop_front() {
                return event;
            }
            items = self
                .ready
                .wait(items)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Remove the oldest event, waiting at most `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Event> {
        let items = self.lock();
        let (mut items, _) = self
            .ready
            .wait_timeout_while(items, timeout, |items| items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        items.pop_front()
    }

    /// Remove the oldest event without blocking.
    pub fn try_pop(&self) -> Option<Event> {
        self.lock().pop_front()
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
