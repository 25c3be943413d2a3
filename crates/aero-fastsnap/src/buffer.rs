/// Backing memory for a fast snapshot: the bytes, their capacity and the current I/O cursor.
///
/// The buffer is owned by whoever drives the snapshot session. Channels opened over it only
/// borrow it (see [`crate::MemoryChannel`]), so a channel can never outlive the memory it reads
/// from or writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotBuffer {
    data: Box<[u8]>,
    pos: usize,
}

impl SnapshotBuffer {
    /// Allocate a zero-filled buffer of `capacity` bytes with the cursor at offset 0.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            pos: 0,
        }
    }

    /// Wrap existing bytes (e.g. a previously saved snapshot) with the cursor at offset 0.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: data.into_boxed_slice(),
            pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Move the cursor. Positions past the capacity are allowed; reads from there return 0.
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Bytes left between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The prefix written so far (`[0, pos)`, clamped to the capacity).
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.pos.min(self.data.len())]
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data.into_vec()
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
