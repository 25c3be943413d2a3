//! Caller-driven watch dispatch.
//!
//! A [`WatchContext`] borrows one channel and keeps the watches registered against it. Each call
//! to [`WatchContext::iterate`] runs every watch through `prepare`/`check`/`dispatch`, invoking the
//! registered callback for watches whose condition holds. Nothing here ever waits: a watch that
//! is not ready is simply skipped until the next iteration.

use std::fmt;
use std::time::Duration;

use bitflags::bitflags;
use tracing::trace;

use crate::channel::{IoChannel, Readiness};

bitflags! {
    /// I/O conditions a watch can wait for. Bit values match the GLib `GIOCondition` layout.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct IoCondition: u16 {
        /// Data can be read.
        const IN = 1 << 0;
        const PRI = 1 << 1;
        /// Data can be written.
        const OUT = 1 << 2;
        const ERR = 1 << 3;
        const HUP = 1 << 4;
        const NVAL = 1 << 5;
    }
}

/// Result of [`WatchSource::prepare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prepare {
    /// The watch is ready and should be dispatched without polling.
    pub ready: bool,
    /// Upper bound the source places on how long the dispatcher may wait. A ready source returns
    /// `Some(Duration::ZERO)` so the dispatcher does not block; `None` leaves the wait unbounded.
    pub timeout: Option<Duration>,
}

/// Whether a watch stays registered after its callback ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Continue,
    Remove,
}

/// Callback invoked on dispatch with the channel and the satisfied condition mask.
pub type WatchCallback<'a, C> = dyn FnMut(&mut C, IoCondition) -> WatchAction + 'a;

/// Poll-source contract consumed by [`WatchContext`].
pub trait WatchSource<C: ?Sized> {
    /// The condition this watch was created for.
    fn condition(&self) -> IoCondition;

    fn prepare(&mut self, channel: &C) -> Prepare;

    fn check(&mut self, channel: &C) -> bool;

    fn dispatch(&mut self, channel: &mut C, callback: &mut WatchCallback<'_, C>) -> WatchAction;

    /// Called once when the watch is removed or its context is dropped.
    fn finalize(&mut self) {}
}

/// Watch that asks the channel's [`Readiness`] implementation on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessWatch {
    condition: IoCondition,
}

impl ReadinessWatch {
    pub fn new(condition: IoCondition) -> Self {
        Self { condition }
    }
}

impl<C: Readiness + ?Sized> WatchSource<C> for ReadinessWatch {
    fn condition(&self) -> IoCondition {
        self.condition
    }

    fn prepare(&mut self, channel: &C) -> Prepare {
        let ready = channel.is_ready(self.condition);
        Prepare {
            ready,
            timeout: ready.then_some(Duration::ZERO),
        }
    }

    fn check(&mut self, channel: &C) -> bool {
        channel.is_ready(self.condition)
    }

    fn dispatch(&mut self, channel: &mut C, callback: &mut WatchCallback<'_, C>) -> WatchAction {
        let satisfied = channel.poll_ready(self.condition);
        callback(channel, satisfied)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

struct Registered<'c, C: IoChannel> {
    id: WatchId,
    source: C::Watch,
    callback: Box<WatchCallback<'c, C>>,
}

/// The set of pending watches for one borrowed channel.
///
/// The context holds a `&mut` borrow of the channel, so the channel cannot be dropped while
/// watches are registered against it. Dropping the context finalizes every remaining watch.
pub struct WatchContext<'c, C: IoChannel> {
    channel: &'c mut C,
    watches: Vec<Registered<'c, C>>,
    next_id: u64,
}

impl<'c, C: IoChannel> WatchContext<'c, C> {
    pub fn new(channel: &'c mut C) -> Self {
        Self {
            channel,
            watches: Vec::new(),
            next_id: 1,
        }
    }

    pub fn channel(&self) -> &C {
        &*self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut *self.channel
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Register `callback` to run whenever `condition` holds on the channel.
    pub fn add_watch<F>(&mut self, condition: IoCondition, callback: F) -> WatchId
    where
        F: FnMut(&mut C, IoCondition) -> WatchAction + 'c,
    {
        let id = WatchId(self.next_id);
        self.next_id += 1;
        let source = self.channel.create_watch(condition);
        trace!(%id, ?condition, "watch registered");
        self.watches.push(Registered {
            id,
            source,
            callback: Box::new(callback),
        });
        id
    }

    /// Remove and finalize a watch. Returns `false` if the id is not registered.
    pub fn remove_watch(&mut self, id: WatchId) -> bool {
        match self.watches.iter().position(|w| w.id == id) {
            Some(idx) => {
                let mut entry = self.watches.remove(idx);
                finalize(&mut entry);
                true
            }
            None => false,
        }
    }

    /// Run one dispatch pass over all watches and return how many callbacks were invoked.
    pub fn iterate(&mut self) -> usize {
        let mut dispatched = 0;
        let mut idx = 0;
        while idx < self.watches.len() {
            let entry = &mut self.watches[idx];
            let prepared = entry.source.prepare(&*self.channel);
            let ready = prepared.ready || entry.source.check(&*self.channel);
            if !ready {
                idx += 1;
                continue;
            }

            dispatched += 1;
            let action = entry
                .source
                .dispatch(&mut *self.channel, entry.callback.as_mut());
            match action {
                WatchAction::Continue => idx += 1,
                WatchAction::Remove => {
                    let mut entry = self.watches.remove(idx);
                    finalize(&mut entry);
                }
            }
        }
        dispatched
    }

    /// Iterate until no watches remain, a pass dispatches nothing, or `max_iterations` passes
    /// have run. Returns the total number of callbacks invoked.
    pub fn run(&mut self, max_iterations: usize) -> usize {
        let mut total = 0;
        for _ in 0..max_iterations {
            if self.watches.is_empty() {
                break;
            }
            let dispatched = self.iterate();
            if dispatched == 0 {
                break;
            }
            total += dispatched;
        }
        total
    }
}

impl<C: IoChannel> Drop for WatchContext<'_, C> {
    fn drop(&mut self) {
        for entry in &mut self.watches {
            finalize(entry);
        }
    }
}

fn finalize<C: IoChannel>(entry: &mut Registered<'_, C>) {
    entry.source.finalize();
    trace!(id = %entry.id, "watch finalized");
}
