use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::dirty::DirtySizing;
use crate::error::{FastSnapError, Result};

fn to_usize(v: u64, sizing: &DirtySizing) -> Result<usize> {
    usize::try_from(v).map_err(|_| FastSnapError::SizeOverflow {
        total_bytes: sizing.page_count.saturating_mul(sizing.page_size),
        page_size: sizing.page_size,
    })
}

/// One bit per guest page, stored as 64-bit words.
///
/// Bits are set with a word-wide atomic `fetch_or`, which is why the bitmap is always allocated in
/// whole words (see [`crate::bitmap_size`]).
#[derive(Debug)]
pub struct DirtyBitmap {
    words: Box<[AtomicU64]>,
    pages: u64,
}

impl DirtyBitmap {
    pub fn new(sizing: &DirtySizing) -> Result<Self> {
        let words = to_usize(sizing.bitmap_words(), sizing)?;
        Ok(Self {
            words: (0..words).map(|_| AtomicU64::new(0)).collect(),
            pages: sizing.page_count,
        })
    }

    pub fn pages(&self) -> u64 {
        self.pages
    }

    /// Size of the allocation in bytes.
    pub fn len_bytes(&self) -> usize {
        self.words.len() * 8
    }

    fn locate(&self, page: u64) -> Result<(usize, u64)> {
        if page >= self.pages {
            return Err(FastSnapError::PageOutOfRange {
                page,
                pages: self.pages,
            });
        }
        Ok(((page / 64) as usize, 1u64 << (page % 64)))
    }

    /// Set the bit for `page` and return whether it was already set.
    pub fn test_and_set(&self, page: u64) -> Result<bool> {
        let (word, mask) = self.locate(page)?;
        let prev = self.words[word].fetch_or(mask, Ordering::AcqRel);
        Ok(prev & mask != 0)
    }

    pub fn test(&self, page: u64) -> Result<bool> {
        let (word, mask) = self.locate(page)?;
        Ok(self.words[word].load(Ordering::Acquire) & mask != 0)
    }

    pub fn clear_page(&self, page: u64) -> Result<()> {
        let (word, mask) = self.locate(page)?;
        self.words[word].fetch_and(!mask, Ordering::AcqRel);
        Ok(())
    }

    /// Clear a page already known to be below [`Self::pages`].
    pub(crate) fn clear_tracked_page(&self, page: u64) {
        debug_assert!(page < self.pages, "page {page} out of range");
        self.words[(page / 64) as usize].fetch_and(!(1u64 << (page % 64)), Ordering::AcqRel);
    }

    pub fn clear(&self) {
        for word in self.words.iter() {
            word.store(0, Ordering::Release);
        }
    }

    /// Indices of all set pages in ascending order.
    pub fn dirty_pages(&self) -> Vec<u64> {
        let mut pages = Vec::new();
        for (word_idx, word) in self.words.iter().enumerate() {
            let mut w = word.load(Ordering::Acquire);
            while w != 0 {
                let bit = w.trailing_zeros() as u64;
                let page = word_idx as u64 * 64 + bit;
                if page < self.pages {
                    pages.push(page);
                }
                w &= w - 1;
            }
        }
        pages
    }
}

/// Fixed-capacity stack of dirty page indices, one 8-byte slot per page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyStack {
    slots: Vec<u64>,
    capacity: usize,
}

impl DirtyStack {
    pub fn new(sizing: &DirtySizing) -> Result<Self> {
        let capacity = to_usize(sizing.stack_slots(), sizing)?;
        Ok(Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn push(&mut self, page: u64) -> Result<()> {
        if self.slots.len() >= self.capacity {
            return Err(FastSnapError::StackFull {
                capacity: self.capacity,
            });
        }
        self.slots.push(page);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<u64> {
        self.slots.pop()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.slots
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.slots.iter().copied()
    }
}

/// Dirty bitmap plus dirty stack: the bitmap deduplicates, the stack remembers first-touch order
/// so a snapshot increment only has to visit pages that actually changed.
#[derive(Debug)]
pub struct DirtyTracker {
    sizing: DirtySizing,
    bitmap: DirtyBitmap,
    stack: DirtyStack,
}

impl DirtyTracker {
    pub fn new(sizing: DirtySizing) -> Result<Self> {
        Ok(Self {
            bitmap: DirtyBitmap::new(&sizing)?,
            stack: DirtyStack::new(&sizing)?,
            sizing,
        })
    }

    pub fn sizing(&self) -> &DirtySizing {
        &self.sizing
    }

    pub fn bitmap(&self) -> &DirtyBitmap {
        &self.bitmap
    }

    pub fn stack(&self) -> &DirtyStack {
        &self.stack
    }

    /// Number of distinct pages dirtied since the last drain.
    pub fn dirty_count(&self) -> usize {
        self.stack.len()
    }

    /// Mark `page` dirty. Returns `true` the first time the page is marked since the last drain.
    pub fn mark_page(&mut self, page: u64) -> Result<bool> {
        if self.bitmap.test_and_set(page)? {
            return Ok(false);
        }
        // One slot per page and the bitmap filters repeats, so this cannot overflow.
        self.stack.push(page)?;
        Ok(true)
    }

    /// Mark the page containing guest physical address `addr` dirty.
    ///
    /// Only whole pages are tracked: an address in a partial trailing page of guest RAM reports
    /// [`FastSnapError::PageOutOfRange`], even though the bitmap reserves a bit for that page.
    pub fn mark_addr(&mut self, addr: u64) -> Result<bool> {
        self.mark_page(addr / self.sizing.page_size)
    }

    pub fn is_dirty(&self, page: u64) -> Result<bool> {
        self.bitmap.test(page)
    }

    /// Return the dirty pages in first-touch order and reset tracking.
    pub fn drain(&mut self) -> Vec<u64> {
        let pages = self.stack.as_slice().to_vec();
        for &page in &pages {
            // Every stacked page passed `test_and_set`, so it is in range.
            self.bitmap.clear_tracked_page(page);
        }
        self.stack.clear();
        debug!(pages = pages.len(), "dirty pages drained");
        pages
    }

    pub fn clear(&mut self) {
        self.bitmap.clear();
        self.stack.clear();
    }
}
