//! Sizing of the dirty-page tracking structures.
//!
//! Both the bitmap and the stack are sized once per snapshot session from the guest RAM size and
//! the host page size. The page size is a runtime value: hosts with 16 KiB or 64 KiB pages exist,
//! so nothing here assumes 4 KiB.

use tracing::debug;

use crate::error::{FastSnapError, Result};

/// Size of one bitmap word / one stack slot in bytes.
pub const WORD_BYTES: u64 = 8;

/// Fallback page size on hosts without `sysconf(_SC_PAGESIZE)`.
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

fn page_count(total_bytes: u64, page_size: u64) -> Result<u64> {
    if page_size == 0 || !page_size.is_power_of_two() {
        return Err(FastSnapError::InvalidPageSize(page_size));
    }
    Ok(total_bytes / page_size)
}

/// Bytes needed for a dirty bitmap with one bit per page.
///
/// The result is rounded up to a whole number of 8-byte words because the bitmap is updated with
/// word-sized atomic test-and-set operations, which must never touch a partial trailing word.
/// A partial trailing page still gets a bit, so the bitmap covers every byte of `total_bytes`.
pub fn bitmap_size(total_bytes: u64, page_size: u64) -> Result<u64> {
    page_count(total_bytes, page_size)?;
    let pages = total_bytes.div_ceil(page_size);
    Ok(pages.div_ceil(8).next_multiple_of(WORD_BYTES))
}

/// Bytes needed for a dirty stack with one 8-byte page index slot per page.
pub fn dirty_stack_size(total_bytes: u64, page_size: u64) -> Result<u64> {
    let pages = page_count(total_bytes, page_size)?;
    pages
        .checked_mul(WORD_BYTES)
        .ok_or(FastSnapError::SizeOverflow {
            total_bytes,
            page_size,
        })
}

/// Page size of the running host.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn host_page_size() -> Result<u64> {
    // SAFETY: `sysconf` has no memory-safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        return Err(FastSnapError::PageSizeQuery(std::io::Error::last_os_error()));
    }
    Ok(size as u64)
}

#[cfg(not(unix))]
pub fn host_page_size() -> Result<u64> {
    Ok(DEFAULT_PAGE_SIZE)
}

/// Dirty-tracking sizes for one snapshot session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtySizing {
    pub page_size: u64,
    pub page_count: u64,
    pub bitmap_bytes: u64,
    pub stack_bytes: u64,
}

impl DirtySizing {
    pub fn new(total_bytes: u64, page_size: u64) -> Result<Self> {
        let sizing = Self {
            page_size,
            page_count: page_count(total_bytes, page_size)?,
            bitmap_bytes: bitmap_size(total_bytes, page_size)?,
            stack_bytes: dirty_stack_size(total_bytes, page_size)?,
        };
        debug!(
            total_bytes,
            page_size,
            page_count = sizing.page_count,
            bitmap_bytes = sizing.bitmap_bytes,
            stack_bytes = sizing.stack_bytes,
            "dirty tracking sized"
        );
        Ok(sizing)
    }

    /// Size for `total_bytes` of guest RAM using the host page size.
    pub fn for_host(total_bytes: u64) -> Result<Self> {
        Self::new(total_bytes, host_page_size()?)
    }

    /// Number of 8-byte words in the bitmap.
    pub fn bitmap_words(&self) -> u64 {
        self.bitmap_bytes / WORD_BYTES
    }

    /// Number of page index slots in the stack.
    pub fn stack_slots(&self) -> u64 {
        self.stack_bytes / WORD_BYTES
    }
}
