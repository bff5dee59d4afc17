// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Drain the event queue on a supervised worker thread and fan events out to bindings.
// Author: Lukas Bower

//! Self-healing dispatcher.
//!
//! One worker thread pops events and runs every matching binding in table
//! order. A handler failure (an `Err` or a panic) is logged and stays local to
//! that invocation. Pushing an event while no worker is alive starts a fresh
//! one bound to the same queue and table, so events queued before a worker
//! died are still delivered in order.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use super::{Event, EventQueue, PatternTable};

const WORKER_NAME: &str = "wmiirc-dispatch";

struct DispatchState {
    queue: Arc<EventQueue>,
    table: Arc<PatternTable>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    starts: AtomicUsize,
}

/// Handle to the dispatch context; clones share one queue, table and worker.
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<DispatchState>,
}

impl Dispatcher {
    /// Dispatcher over a fresh queue.
    #[must_use]
    pub fn new(table: PatternTable) -> Self {
        Self::with_queue(Arc::new(EventQueue::new()), Arc::new(table))
    }

    /// Dispatcher over an existing queue and table.
    #[must_use]
    pub fn with_queue(queue: Arc<EventQueue>, table: Arc<PatternTable>) -> Self {
        Self {
            state: Arc::new(DispatchState {
                queue,
                table,
                running: AtomicBool::new(true),
                worker: Mutex::new(None),
                starts: AtomicUsize::new(0),
            }),
        }
    }

    /// Shared queue.
    #[must_use]
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.state.queue
    }

    /// Binding table.
    #[must_use]
    pub fn table(&self) -> &PatternTable {
        &self.state.table
    }

    /// Enqueue `event`, starting a worker if none is alive.
    pub fn push(&self, event: impl Into<Event>) {
        self.state.queue.push(event);
        if self.is_running() {
            self.ensure_worker();
        }
    }

    /// Enqueue a closure to run on the worker thread.
    pub fn defer<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Event::deferred(action));
    }

    /// Whether the running flag is still set.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Whether a worker thread is currently alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// How many worker threads have been started so far.
    #[must_use]
    pub fn starts(&self) -> usize {
        self.state.starts.load(Ordering::SeqCst)
    }

    /// Clear the running flag. A parked worker exits after its next pop.
    pub fn stop(&self) {
        if self.state.running.swap(false, Ordering::SeqCst) {
            info!("dispatcher stopping");
        }
    }

    /// Let the worker finish the events already queued, then stop it and
    /// wait for it to exit.
    pub fn shutdown(&self) {
        let state = Arc::downgrade(&self.state);
        self.state.queue.push(Event::deferred(move || {
            if let Some(state) = state.upgrade() {
                state.running.store(false, Ordering::SeqCst);
            }
        }));
        if self.is_running() {
            self.ensure_worker();
        }
        let handle = self.lock_worker().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("dispatcher worker exited by panic");
            }
        }
        self.stop();
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.state
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_worker(&self) {
        let mut worker = self.lock_worker();
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let restart = worker.take().is_some();
        let state = Arc::clone(&self.state);
        match thread::Builder::new()
            .name(WORKER_NAME.into())
            .spawn(move || run(&state))
        {
            Ok(handle) => {
                let count = self.state.starts.fetch_add(1, Ordering::SeqCst) + 1;
                if restart {
                    info!("dispatcher restarted (start #{count})");
                } else {
                    info!("dispatcher started");
                }
                *worker = Some(handle);
            }
            Err(err) => error!("failed to spawn dispatcher: {err}"),
        }
    }

    #[cfg(test)]
    fn replace_worker(&self, handle: JoinHandle<()>) {
        *self.lock_worker() = Some(handle);
    }
}

fn run(state: &DispatchState) {
    while state.running.load(Ordering::SeqCst) {
        match state.queue.pop() {
            Event::Line(line) => dispatch_line(&state.table, &line),
            Event::Deferred(action) => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(action)) {
                    error!("deferred action panicked: {}", panic_message(&*payload));
                }
            }
        }
    }
    debug!("dispatcher loop exited");
}

/// Run every binding of `table` matching `line`, in table order.
pub fn dispatch_line(table: &PatternTable, line: &str) {
    debug!("dispatch {line:?}");
    for binding in table.matching(line) {
        match panic::catch_unwind(AssertUnwindSafe(|| binding.invoke(line))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!("handler for {:?} failed on {line:?}: {err:#}", binding.pattern()),
            Err(payload) => error!(
                "handler for {:?} panicked on {line:?}: {}",
                binding.pattern(),
                panic_message(&*payload)
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic")
}
