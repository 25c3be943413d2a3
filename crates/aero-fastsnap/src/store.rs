use tracing::debug;

use crate::buffer::SnapshotBuffer;
use crate::config::FastSnapConfig;
use crate::error::Result;
use crate::mem_channel::MemoryChannel;
use crate::tracker::DirtyTracker;

/// Session-owned state for fast snapshots: the device-state buffer and the dirty-page tracker.
///
/// Channels are opened on demand and borrow the buffer, so the store must outlive them.
#[derive(Debug)]
pub struct FastSnapshotStore {
    buffer: SnapshotBuffer,
    tracker: DirtyTracker,
}

impl FastSnapshotStore {
    pub fn new(config: &FastSnapConfig) -> Result<Self> {
        let sizing = config.sizing()?;
        let tracker = DirtyTracker::new(sizing)?;
        debug!(
            ram_size = config.ram_size,
            buffer_capacity = config.buffer_capacity,
            page_size = sizing.page_size,
            "fast snapshot store created"
        );
        Ok(Self {
            buffer: SnapshotBuffer::new(config.buffer_capacity),
            tracker,
        })
    }

    pub fn buffer(&self) -> &SnapshotBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut SnapshotBuffer {
        &mut self.buffer
    }

    pub fn tracker(&self) -> &DirtyTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut DirtyTracker {
        &mut self.tracker
    }

    /// Open a channel at the buffer's current cursor.
    pub fn channel(&mut self) -> MemoryChannel<'_> {
        MemoryChannel::new(&mut self.buffer)
    }

    pub fn rewind(&mut self) {
        self.buffer.rewind();
    }

    pub fn into_buffer(self) -> SnapshotBuffer {
        self.buffer
    }
}
