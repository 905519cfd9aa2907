//! Storage layer: on-disk management of a single table's backing file.
//!
//! A table file starts with a binary header carrying the table's schema,
//! followed by fixed-size data pages addressed by page number. Key
//! components:
//!
//! - **TableFile**: owns the file handle and its exclusive lock, tracks the
//!   allocated page range, and performs single and batched page I/O
//! - **PageFactory / PageHandle**: the seam between raw page buffers and
//!   structured page objects
//! - **HeapPage**: slotted page format for variable-length tuples
//!
//! Durability follows normal operating system write semantics; there is no
//! write-ahead logging or caching layer here.

pub mod error;
pub mod header;
pub mod io;
pub mod page;
pub mod table_file;

pub use error::{StorageError, StorageResult};
pub use page::{HeapPage, HeapPageFactory, PageFactory, PageFormatError, PageHandle, PageId};
pub use table_file::{delete_table, TableFile};
