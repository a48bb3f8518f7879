//! Asynchronous store requests.
//!
//! A [`Request`] is the only way results come back from the store. It is a
//! single-assignment slot plus a list of pending continuations:
//!
//! - `Pending → Done` is the only transition, and it happens exactly once
//! - a done request holds either a value or an error, never both
//! - every handler registered with [`Request::on_complete`] runs exactly
//!   once, whether it was registered before or after completion
//!
//! The store side resolves a request through its [`Completer`]. Dropping a
//! completer without resolving it completes the request with
//! [`StoreError::Closed`], so no request is ever left pending forever.

use crate::error::{StoreError, StoreResult};
use fieldsync_protocol::Value;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Readiness of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// The operation has not completed yet.
    Pending,
    /// The operation completed with a result or an error.
    Done,
}

type Handler<T> = Box<dyn FnOnce(&StoreResult<T>) + Send>;

struct Slot<T> {
    outcome: Option<Arc<StoreResult<T>>>,
    handlers: Vec<Handler<T>>,
    wakers: Vec<Waker>,
}

/// A single asynchronous store operation.
///
/// Cloning a request yields another view of the same slot.
pub struct Request<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for Request<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

impl<T> Request<T> {
    /// Creates a pending request and the completer that resolves it.
    pub(crate) fn pending() -> (Self, Completer<T>) {
        let slot = Arc::new(Mutex::new(Slot {
            outcome: None,
            handlers: Vec::new(),
            wakers: Vec::new(),
        }));
        let completer = Completer {
            slot: Some(Arc::clone(&slot)),
        };
        (Self { slot }, completer)
    }

    /// Creates a request that is already done.
    pub fn done(outcome: StoreResult<T>) -> Self {
        let (request, completer) = Self::pending();
        completer.complete(outcome);
        request
    }

    /// Returns the current readiness state.
    pub fn ready_state(&self) -> ReadyState {
        if self.slot.lock().outcome.is_some() {
            ReadyState::Done
        } else {
            ReadyState::Pending
        }
    }

    /// Returns true once the request has completed.
    pub fn is_done(&self) -> bool {
        self.ready_state() == ReadyState::Done
    }

    /// Returns the error, if the request completed with one.
    pub fn error(&self) -> Option<StoreError> {
        let slot = self.slot.lock();
        match slot.outcome.as_deref() {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }

    /// Registers a completion handler.
    ///
    /// The handler runs exactly once with the outcome. If the request is
    /// already done it runs immediately on the calling thread; otherwise it
    /// runs on the store worker when the request completes.
    pub fn on_complete<F>(&self, handler: F)
    where
        F: FnOnce(&StoreResult<T>) + Send + 'static,
    {
        let mut slot = self.slot.lock();
        match &slot.outcome {
            Some(outcome) => {
                let outcome = Arc::clone(outcome);
                drop(slot);
                handler(&outcome);
            }
            None => slot.handlers.push(Box::new(handler)),
        }
    }
}

impl<T: Clone> Request<T> {
    /// Returns the result if the request completed successfully.
    pub fn result(&self) -> Option<T> {
        let slot = self.slot.lock();
        match slot.outcome.as_deref() {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns the full outcome once the request is done.
    pub fn outcome(&self) -> Option<StoreResult<T>> {
        self.slot.lock().outcome.as_deref().cloned()
    }
}

impl Request<Option<Value>> {
    /// Returns the read value as an integer.
    pub fn result_as_integer(&self) -> Option<i64> {
        self.result().flatten().and_then(|v| v.as_i64())
    }

    /// Returns the read value as a boolean.
    pub fn result_as_bool(&self) -> Option<bool> {
        self.result().flatten().and_then(|v| v.as_bool())
    }

    /// Returns the read value as a double.
    pub fn result_as_double(&self) -> Option<f64> {
        self.result().flatten().and_then(|v| v.as_f64())
    }
}

impl<T: Clone> Future for Request<T> {
    type Output = StoreResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.lock();
        if let Some(outcome) = slot.outcome.as_deref() {
            return Poll::Ready(outcome.clone());
        }
        if !slot.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            slot.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

/// The store-side half of a request.
pub(crate) struct Completer<T> {
    slot: Option<Arc<Mutex<Slot<T>>>>,
}

impl<T> Completer<T> {
    /// Resolves the request. Consumes the completer, so it can only happen once.
    pub(crate) fn complete(mut self, outcome: StoreResult<T>) {
        if let Some(slot) = self.slot.take() {
            resolve(&slot, outcome);
        }
    }

    pub(crate) fn succeed(self, value: T) {
        self.complete(Ok(value));
    }

    pub(crate) fn fail(self, err: StoreError) {
        self.complete(Err(err));
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            resolve(&slot, Err(StoreError::Closed));
        }
    }
}

fn resolve<T>(slot: &Mutex<Slot<T>>, outcome: StoreResult<T>) {
    let (outcome, handlers, wakers) = {
        let mut slot = slot.lock();
        if slot.outcome.is_some() {
            return;
        }
        let outcome = Arc::new(outcome);
        slot.outcome = Some(Arc::clone(&outcome));
        (
            outcome,
            std::mem::take(&mut slot.handlers),
            std::mem::take(&mut slot.wakers),
        )
    };

    // Handlers may issue further requests, so the slot lock is released first.
    for handler in handlers {
        handler(&outcome);
    }
    for waker in wakers {
        waker.wake();
    }
}
