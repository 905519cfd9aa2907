//! Lifecycle, exclusive locking, allocation bookkeeping, and page I/O for
//! one table's backing file.
//!
//! A [`TableFile`] owns the open file handle and the advisory lock on it for
//! its whole lifetime. The header occupies `[0, header_end)`; data pages
//! live at `page_number * page_size` for page numbers starting at
//! `first_data_page_number = header_end / page_size + 1` (the header always
//! consumes at least one full page slot). Page numbers grow by exactly one
//! per reservation and are never reused.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::debug;
use parking_lot::Mutex;

use crate::catalog::Schema;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::header;
use crate::storage::io as file_io;
use crate::storage::page::{PageFactory, PageHandle, PageId};

/// Storage manager for a single table's backing file.
///
/// Page read/write methods address the file by explicit byte offset and may
/// run concurrently from multiple threads; reservation, truncation, and the
/// allocation-range accessors serialize on an internal mutex. Closing
/// consumes the manager, so nothing can race a close.
pub struct TableFile<F: PageFactory> {
    file: File,
    path: PathBuf,
    schema: Schema,
    factory: F,
    header_end: u64,
    first_data_page: PageId,
    /// Last reserved data page number; `first_data_page - 1` when empty.
    last_data_page: Mutex<u64>,
}

impl<F: PageFactory> TableFile<F> {
    /// Open an existing table file.
    ///
    /// Fails with `NotFound` if the file is absent and with `LockConflict`
    /// if another manager (in this or any other process) holds the file.
    pub fn open(path: impl AsRef<Path>, factory: F) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => StorageError::NotFound { path: path.clone() },
                _ => StorageError::Io(e),
            })?;
        lock_exclusive(&file, &path)?;
        // From here on any early return drops `file`, which closes the fd
        // and releases the advisory lock with it.

        let (schema, header_end) = header::decode(&file)?;
        let page_size = schema.page_size() as u64;
        let first_data_page = PageId(header_end / page_size + 1);
        let file_size = file.metadata()?.len();
        let last_data_page = ((file_size - 1) / page_size).max(first_data_page.0 - 1);

        debug!(
            "opened table file {:?}: pages {}..={}",
            path, first_data_page.0, last_data_page
        );
        Ok(Self {
            file,
            path,
            schema,
            factory,
            header_end,
            first_data_page,
            last_data_page: Mutex::new(last_data_page),
        })
    }

    /// Create a table file for `schema`, or take over an existing file.
    ///
    /// The header is encoded and written once; the data page range starts
    /// out empty.
    pub fn create(path: impl AsRef<Path>, schema: Schema, factory: F) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        // Encode up front so a bad schema never touches the filesystem.
        let header_bytes = header::encode(&schema)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        lock_exclusive(&file, &path)?;

        file_io::write_all_at(&file, &header_bytes, 0)?;
        file.set_len(header_bytes.len() as u64)?;
        file.sync_all()?;

        let header_end = header_bytes.len() as u64;
        let first_data_page = PageId(header_end / schema.page_size() as u64 + 1);

        debug!(
            "created table file {:?}: header {} bytes, first data page {}",
            path, header_end, first_data_page
        );
        Ok(Self {
            file,
            path,
            schema,
            factory,
            header_end,
            first_data_page,
            last_data_page: Mutex::new(first_data_page.0 - 1),
        })
    }

    /// Release the lock and close the backing file.
    ///
    /// The file handle drops either way; a failed unlock is still followed
    /// by the fd close, which releases the lock as a fallback.
    pub fn close(self) -> StorageResult<()> {
        debug!("closing table file {:?}", self.path);
        self.file.unlock()?;
        Ok(())
    }

    /// Destroy all data pages: shrink the file back to the header extent
    /// and reset the allocation range to empty.
    pub fn truncate(&self) -> StorageResult<()> {
        let mut last = self.last_data_page.lock();
        self.file.set_len(self.header_end)?;
        *last = self.first_data_page.0 - 1;
        debug!("truncated table file {:?}", self.path);
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn page_size(&self) -> u32 {
        self.schema.page_size()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// First valid data page number; fixed for the manager's lifetime.
    pub fn first_data_page_number(&self) -> PageId {
        self.first_data_page
    }

    /// Last reserved data page number; `first_data_page_number() - 1` when
    /// the table holds no pages.
    pub fn last_data_page_number(&self) -> PageId {
        PageId(*self.last_data_page.lock())
    }

    pub fn is_empty(&self) -> bool {
        *self.last_data_page.lock() < self.first_data_page.0
    }

    /// Reserve the next page number and initialize a fresh page structure
    /// in `buffer`. Performs no file I/O; persisting the page is a separate
    /// explicit write.
    pub fn reserve_page<'a>(&self, buffer: &'a mut [u8]) -> StorageResult<F::Page<'a>> {
        self.validate_buffer(buffer.len())?;
        let mut last = self.last_data_page.lock();
        let next = if *last < self.first_data_page.0 {
            self.first_data_page
        } else {
            PageId(*last + 1)
        };
        let page = self.factory.init_page(&self.schema, buffer, next);
        *last = next.0;
        Ok(page)
    }

    /// Read one page into the caller's page-sized buffer and parse it.
    pub fn read_page<'a>(
        &self,
        page_number: PageId,
        buffer: &'a mut [u8],
    ) -> StorageResult<F::Page<'a>> {
        self.validate_page_args(page_number, buffer.len())?;
        let offset = page_number.byte_offset(self.page_size());
        file_io::read_exact_at(&self.file, buffer, offset)
            .map_err(|e| StorageError::page_io(page_number, page_number, e))?;
        self.factory
            .parse_page(&self.schema, buffer)
            .map_err(|e| StorageError::CorruptPage {
                page_number,
                reason: e.reason,
            })
    }

    /// Write one page-sized buffer to its page slot.
    pub fn write_page(&self, page_number: PageId, buffer: &[u8]) -> StorageResult<()> {
        self.validate_page_args(page_number, buffer.len())?;
        let offset = page_number.byte_offset(self.page_size());
        file_io::write_all_at(&self.file, buffer, offset)
            .map_err(|e| StorageError::page_io(page_number, page_number, e))
    }

    /// Read a contiguous run of pages in one scatter transfer and parse
    /// each buffer. A single parse failure fails the whole batch.
    pub fn read_pages<'a>(
        &self,
        first_page_number: PageId,
        buffers: &'a mut [&'a mut [u8]],
    ) -> StorageResult<Vec<F::Page<'a>>> {
        self.validate_batch_read(first_page_number, buffers)?;
        let page_size = self.page_size();
        let last_page_number = PageId(first_page_number.0 + buffers.len() as u64 - 1);

        file_io::read_exact_vectored_at(
            &self.file,
            buffers,
            page_size as usize,
            first_page_number.byte_offset(page_size),
        )
        .map_err(|e| StorageError::page_io(first_page_number, last_page_number, e))?;

        let mut pages = Vec::with_capacity(buffers.len());
        for (index, buffer) in buffers.iter_mut().enumerate() {
            let page_number = PageId(first_page_number.0 + index as u64);
            let page = self
                .factory
                .parse_page(&self.schema, &mut **buffer)
                .map_err(|e| StorageError::CorruptPage {
                    page_number,
                    reason: e.reason,
                })?;
            pages.push(page);
        }
        Ok(pages)
    }

    /// Write a contiguous run of pages in one gather transfer.
    ///
    /// `pages[i]` must target page number `first_page_number + i`.
    pub fn write_pages<H: PageHandle>(
        &self,
        first_page_number: PageId,
        pages: &[H],
    ) -> StorageResult<()> {
        self.validate_batch_write(first_page_number, pages)?;
        let page_size = self.page_size();
        let last_page_number = PageId(first_page_number.0 + pages.len() as u64 - 1);
        let buffers: Vec<&[u8]> = pages.iter().map(|page| page.data()).collect();

        file_io::write_all_vectored_at(
            &self.file,
            &buffers,
            page_size as usize,
            first_page_number.byte_offset(page_size),
        )
        .map_err(|e| StorageError::page_io(first_page_number, last_page_number, e))
    }

    // Checked-mode validation: buffer sizes and batch sequencing are
    // programmer errors and are only verified in debug builds; release
    // builds assume them satisfied.

    #[cfg(debug_assertions)]
    fn validate_buffer(&self, buffer_len: usize) -> StorageResult<()> {
        if buffer_len != self.page_size() as usize {
            return Err(StorageError::Validation(format!(
                "buffer size {} does not match page size {}",
                buffer_len,
                self.page_size()
            )));
        }
        Ok(())
    }

    #[cfg(not(debug_assertions))]
    fn validate_buffer(&self, _buffer_len: usize) -> StorageResult<()> {
        Ok(())
    }

    #[cfg(debug_assertions)]
    fn validate_page_args(&self, page_number: PageId, buffer_len: usize) -> StorageResult<()> {
        if page_number < self.first_data_page {
            return Err(StorageError::Validation(format!(
                "page number {} precedes first data page {}",
                page_number, self.first_data_page
            )));
        }
        self.validate_buffer(buffer_len)
    }

    #[cfg(not(debug_assertions))]
    fn validate_page_args(&self, _page_number: PageId, _buffer_len: usize) -> StorageResult<()> {
        Ok(())
    }

    #[cfg(debug_assertions)]
    fn validate_batch_read(
        &self,
        first_page_number: PageId,
        buffers: &[&mut [u8]],
    ) -> StorageResult<()> {
        if buffers.is_empty() {
            return Err(StorageError::Validation(
                "batched read requires at least one page".to_string(),
            ));
        }
        if first_page_number < self.first_data_page {
            return Err(StorageError::Validation(format!(
                "page number {} precedes first data page {}",
                first_page_number, self.first_data_page
            )));
        }
        for buffer in buffers {
            self.validate_buffer(buffer.len())?;
        }
        Ok(())
    }

    #[cfg(not(debug_assertions))]
    fn validate_batch_read(
        &self,
        _first_page_number: PageId,
        _buffers: &[&mut [u8]],
    ) -> StorageResult<()> {
        Ok(())
    }

    #[cfg(debug_assertions)]
    fn validate_batch_write<H: PageHandle>(
        &self,
        first_page_number: PageId,
        pages: &[H],
    ) -> StorageResult<()> {
        if pages.is_empty() {
            return Err(StorageError::Validation(
                "batched write requires at least one page".to_string(),
            ));
        }
        if first_page_number < self.first_data_page {
            return Err(StorageError::Validation(format!(
                "page number {} precedes first data page {}",
                first_page_number, self.first_data_page
            )));
        }
        for (index, page) in pages.iter().enumerate() {
            let expected = PageId(first_page_number.0 + index as u64);
            if page.page_number() != expected {
                return Err(StorageError::Validation(format!(
                    "non-sequential batch: page at index {} targets {} but the run expects {}",
                    index,
                    page.page_number(),
                    expected
                )));
            }
            self.validate_buffer(page.data().len())?;
        }
        Ok(())
    }

    #[cfg(not(debug_assertions))]
    fn validate_batch_write<H: PageHandle>(
        &self,
        _first_page_number: PageId,
        _pages: &[H],
    ) -> StorageResult<()> {
        Ok(())
    }
}

/// Delete a table's backing file.
pub fn delete_table(path: impl AsRef<Path>) -> StorageResult<()> {
    let path = path.as_ref();
    fs::remove_file(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound {
            path: path.to_path_buf(),
        },
        _ => StorageError::Io(e),
    })
}

fn lock_exclusive(file: &File, path: &Path) -> StorageResult<()> {
    file.try_lock_exclusive().map_err(|e| {
        if e.kind() == ErrorKind::WouldBlock {
            StorageError::LockConflict {
                path: path.to_path_buf(),
            }
        } else {
            StorageError::Io(e)
        }
    })
}
