use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FastSnapError>;

#[derive(Debug, Error)]
pub enum FastSnapError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid page size {0} (expected a non-zero power of two)")]
    InvalidPageSize(u64),

    #[error("dirty tracking size overflow for {total_bytes} bytes at page size {page_size}")]
    SizeOverflow { total_bytes: u64, page_size: u64 },

    #[error("failed to query host page size: {0}")]
    PageSizeQuery(#[source] io::Error),

    #[error("page index {page} out of range (tracking {pages} pages)")]
    PageOutOfRange { page: u64, pages: u64 },

    #[error("dirty stack full ({capacity} slots)")]
    StackFull { capacity: usize },
}
