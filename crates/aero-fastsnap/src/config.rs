use crate::dirty::{host_page_size, DirtySizing};
use crate::error::Result;

/// Parameters for one fast snapshot session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastSnapConfig {
    /// Guest RAM size in bytes; determines how many pages are tracked.
    pub ram_size: u64,
    /// Page size used for dirty tracking. `None` uses the host page size.
    pub page_size: Option<u64>,
    /// Capacity of the device-state buffer in bytes.
    pub buffer_capacity: usize,
}

impl Default for FastSnapConfig {
    fn default() -> Self {
        Self {
            ram_size: 64 * 1024 * 1024,
            page_size: None,
            buffer_capacity: 1024 * 1024,
        }
    }
}

impl FastSnapConfig {
    pub fn resolve_page_size(&self) -> Result<u64> {
        match self.page_size {
            Some(page_size) => Ok(page_size),
            None => host_page_size(),
        }
    }

    pub fn sizing(&self) -> Result<DirtySizing> {
        DirtySizing::new(self.ram_size, self.resolve_page_size()?)
    }
}
