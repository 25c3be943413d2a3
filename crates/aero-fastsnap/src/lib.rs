//! Fast-snapshot I/O for Aero.
//!
//! Device state for fast (incremental) snapshots is serialized straight into a session-owned
//! memory buffer rather than a file. This crate provides:
//!
//! - [`SnapshotBuffer`]: the backing bytes plus the I/O cursor
//! - [`MemoryChannel`]: an [`IoChannel`] that borrows a [`SnapshotBuffer`]
//! - [`WatchContext`]: caller-driven readiness dispatch for any [`IoChannel`]
//! - [`bitmap_size`] / [`dirty_stack_size`]: sizing for dirty-page tracking
//! - [`DirtyTracker`]: the dirty bitmap and dirty stack built from those sizes

#![deny(unsafe_code)]

mod buffer;
mod channel;
mod config;
mod dirty;
mod error;
mod mem_channel;
mod store;
mod tracker;
mod watch;

pub use crate::buffer::SnapshotBuffer;
pub use crate::channel::{IoChannel, Readiness};
pub use crate::config::FastSnapConfig;
pub use crate::dirty::{
    bitmap_size, dirty_stack_size, host_page_size, DirtySizing, DEFAULT_PAGE_SIZE, WORD_BYTES,
};
pub use crate::error::{FastSnapError, Result};
pub use crate::mem_channel::MemoryChannel;
pub use crate::store::FastSnapshotStore;
pub use crate::tracker::{DirtyBitmap, DirtyStack, DirtyTracker};
pub use crate::watch::{
    IoCondition, Prepare, ReadinessWatch, WatchAction, WatchCallback, WatchContext, WatchId,
    WatchSource,
};
