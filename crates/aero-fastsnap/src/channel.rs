use std::io::{IoSlice, IoSliceMut};

use crate::error::Result;
use crate::watch::{IoCondition, WatchSource};

/// Readiness query shared by every channel variant.
///
/// This replaces a native poll primitive: instead of registering a file descriptor with an event
/// loop, the dispatcher asks the channel which of the requested conditions currently hold.
pub trait Readiness {
    /// Return the subset of `condition` that is satisfied right now.
    fn poll_ready(&self, condition: IoCondition) -> IoCondition;

    fn is_ready(&self, condition: IoCondition) -> bool {
        !self.poll_ready(condition).is_empty()
    }
}

/// Capability set of a snapshot I/O channel: vectored reads and writes, blocking mode, close and
/// watch creation.
///
/// Implementations backed by real files or sockets may block or fail; the in-memory channel is a
/// degenerate case that never does either, but it is driven through the same interface.
pub trait IoChannel: Readiness {
    type Watch: WatchSource<Self>;

    /// Fill `bufs` in order. A short count (including 0) means end of data.
    fn readv(&mut self, bufs: &mut [IoSliceMut<'_>]) -> Result<usize>;

    /// Write every segment of `bufs` in order and return the number of bytes written.
    fn writev(&mut self, bufs: &[IoSlice<'_>]) -> Result<usize>;

    fn set_blocking(&mut self, enabled: bool) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Create a watch for `condition`. The watch does not own the channel; it is handed the
    /// channel by the dispatcher on every poll.
    fn create_watch(&self, condition: IoCondition) -> Self::Watch;
}

impl<T: Readiness + ?Sized> Readiness for &T {
    fn poll_ready(&self, condition: IoCondition) -> IoCondition {
        <T as Readiness>::poll_ready(&**self, condition)
    }
}

impl<T: Readiness + ?Sized> Readiness for &mut T {
    fn poll_ready(&self, condition: IoCondition) -> IoCondition {
        <T as Readiness>::poll_ready(&**self, condition)
    }
}
