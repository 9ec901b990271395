//! Sync debouncer
//!
//! At most one sync body runs at a time. A caller arriving while a sync is in
//! flight queues as the single waiter for its kind and blocks until the
//! in-flight pass ends:
//!
//! - a queued full waiter absorbs later partial requests, which return
//!   `Superseded` immediately
//! - a new full request releases any queued waiter (`Superseded`) and takes
//!   its place; a new partial request releases a queued partial waiter
//! - when the pass ends the remaining waiter receives `Requeue`, the queue is
//!   cleared and the running flag drops
//!
//! `Requeue` tells the caller that its trigger arrived mid-pass and must be
//! retried; the watcher re-queues it, which yields exactly one more pass.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncKind {
    /// Domains, edges, tunnels and statuses
    Full,
    /// Edges only
    Partial,
}

/// How a sync request ended for its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// This caller executed the pass
    Ran,
    /// A broader request took this caller's place; nothing to do
    Superseded,
    /// A pass finished while this caller waited; trigger again
    Requeue,
}

#[derive(Debug, Default)]
struct State {
    running: bool,
    waiters: HashMap<SyncKind, oneshot::Sender<SyncOutcome>>,
}

#[derive(Debug, Default)]
pub struct Debouncer {
    state: Mutex<State>,
}

/// Result of asking to start a sync
#[derive(Debug)]
pub enum Admission<'a> {
    /// Run the body; dropping the guard ends the pass
    Run(SyncGuard<'a>),
    Wait(Waiter),
}

/// Held for the duration of a running pass
#[derive(Debug)]
pub struct SyncGuard<'a> {
    debouncer: &'a Debouncer,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.debouncer.done();
    }
}

/// A queued caller
#[derive(Debug)]
pub struct Waiter {
    receiver: Option<oneshot::Receiver<SyncOutcome>>,
}

impl Waiter {
    /// Block until the in-flight pass ends or `cancel` fires
    pub async fn wait(self, cancel: &CancellationToken) -> Result<SyncOutcome> {
        let Some(receiver) = self.receiver else {
            return Ok(SyncOutcome::Superseded);
        };
        tokio::select! {
            // a dropped sender means this waiter was released
            outcome = receiver => Ok(outcome.unwrap_or(SyncOutcome::Superseded)),
            _ = cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Debouncer mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn start(&self, kind: SyncKind) -> Admission<'_> {
        let mut state = self.lock();

        if !state.running {
            debug!("Sync start ({:?})", kind);
            state.running = true;
            return Admission::Run(SyncGuard { debouncer: self });
        }

        if state.waiters.contains_key(&SyncKind::Full) {
            if kind == SyncKind::Partial {
                debug!("Full sync already queued, partial request superseded");
                return Admission::Wait(Waiter { receiver: None });
            }
            state.waiters.remove(&SyncKind::Full);
        }
        // dropping a sender releases its waiter as superseded
        state.waiters.remove(&SyncKind::Partial);

        let (sender, receiver) = oneshot::channel();
        state.waiters.insert(kind, sender);
        debug!("Sync in flight, queued {:?} waiter", kind);
        Admission::Wait(Waiter {
            receiver: Some(receiver),
        })
    }

    fn done(&self) {
        let mut state = self.lock();
        let waiter = state
            .waiters
            .remove(&SyncKind::Full)
            .or_else(|| state.waiters.remove(&SyncKind::Partial));
        if let Some(sender) = waiter {
            // the waiter may have been cancelled already
            let _ = sender.send(SyncOutcome::Requeue);
        }
        state.waiters.clear();
        state.running = false;
        debug!("Sync done");
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }
}
