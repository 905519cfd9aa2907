//! Page abstraction: page numbers and the page-factory seam.
//!
//! The storage manager never interprets a page's internal byte layout. It
//! moves page-sized buffers between the backing file and the caller, and a
//! [`PageFactory`] turns those buffers into typed page objects (or
//! initializes fresh ones). [`heap_page`] provides the default slotted
//! implementation.

pub mod heap_page;

use std::fmt;

use thiserror::Error;

use crate::catalog::Schema;

pub use heap_page::{HeapPage, HeapPageFactory};

/// Number locating a page's byte extent as `number * page_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u64);

impl PageId {
    /// Byte offset of this page in the backing file.
    pub fn byte_offset(self, page_size: u32) -> u64 {
        self.0 * page_size as u64
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A page buffer failed factory-level structural validation.
#[derive(Error, Debug)]
#[error("{reason}")]
pub struct PageFormatError {
    pub reason: String,
}

impl PageFormatError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// An in-memory page wrapper that knows which page number it targets.
///
/// Batched writes take a run of these and verify the run is contiguous.
pub trait PageHandle {
    fn page_number(&self) -> PageId;

    /// Raw bytes of the page, exactly one page size long.
    fn data(&self) -> &[u8];
}

/// Parses raw page buffers into page objects bound to a schema, or
/// initializes fresh pages inside caller-owned buffers.
pub trait PageFactory {
    type Page<'a>: PageHandle;

    /// Initialize a fresh page structure inside `buffer` for `page_number`.
    fn init_page<'a>(
        &self,
        schema: &Schema,
        buffer: &'a mut [u8],
        page_number: PageId,
    ) -> Self::Page<'a>;

    /// Parse an existing page out of `buffer`.
    fn parse_page<'a>(
        &self,
        schema: &Schema,
        buffer: &'a mut [u8],
    ) -> Result<Self::Page<'a>, PageFormatError>;
}
