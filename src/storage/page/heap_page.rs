//! Slotted heap page and its factory.
//!
//! The default page format: a fixed header, tuple data growing downward from
//! the header, and a slot directory growing upward from the page tail.

use anyhow::{bail, Result};

use crate::catalog::Schema;
use crate::storage::page::{PageFactory, PageFormatError, PageHandle, PageId};

// Header structure (16 bytes)
const HEADER_SIZE: usize = 16;
const PAGE_NUMBER_OFFSET: usize = 0;
const FREE_POINTER_OFFSET: usize = 8;
const TUPLE_COUNT_OFFSET: usize = 12;

// Slot size (4 bytes: 2 for offset, 2 for length)
const SLOT_SIZE: usize = 4;

/// A parsed or freshly initialized heap page over a caller-owned buffer.
pub struct HeapPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeapPage<'a> {
    /// Initialize a fresh page in `data` for `page_number`.
    pub fn init(data: &'a mut [u8], page_number: PageId) -> Self {
        data[PAGE_NUMBER_OFFSET..PAGE_NUMBER_OFFSET + 8]
            .copy_from_slice(&page_number.0.to_le_bytes());
        data[FREE_POINTER_OFFSET..FREE_POINTER_OFFSET + 4]
            .copy_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
        data[TUPLE_COUNT_OFFSET..HEADER_SIZE].fill(0);
        Self { data }
    }

    /// Parse an existing page, validating its structure.
    pub fn parse(data: &'a mut [u8]) -> Result<Self, PageFormatError> {
        if data.len() < HEADER_SIZE {
            return Err(PageFormatError::new(format!(
                "page buffer too small: {} bytes",
                data.len()
            )));
        }
        let page = Self { data };
        let free_pointer = page.free_pointer() as usize;
        let tuple_count = page.tuple_count() as usize;
        let slot_directory_start = page
            .data
            .len()
            .checked_sub(tuple_count * SLOT_SIZE)
            .filter(|&start| start >= HEADER_SIZE)
            .ok_or_else(|| {
                PageFormatError::new(format!(
                    "slot directory overflows page: {} slots",
                    tuple_count
                ))
            })?;
        if free_pointer < HEADER_SIZE || free_pointer > slot_directory_start {
            return Err(PageFormatError::new(format!(
                "free-space pointer {} outside valid range {}..={}",
                free_pointer, HEADER_SIZE, slot_directory_start
            )));
        }
        // Every slot's tuple extent must lie inside the data region, or a
        // later get_tuple would index past the buffer.
        for slot_id in 0..tuple_count {
            let slot_offset = page.data.len() - (slot_id + 1) * SLOT_SIZE;
            let tuple_offset =
                u16::from_le_bytes([page.data[slot_offset], page.data[slot_offset + 1]]) as usize;
            let tuple_length = u16::from_le_bytes([
                page.data[slot_offset + 2],
                page.data[slot_offset + 3],
            ]) as usize;
            if tuple_offset < HEADER_SIZE || tuple_offset + tuple_length > free_pointer {
                return Err(PageFormatError::new(format!(
                    "slot {}: tuple extent {}..{} outside data region {}..{}",
                    slot_id,
                    tuple_offset,
                    tuple_offset + tuple_length,
                    HEADER_SIZE,
                    free_pointer
                )));
            }
        }
        Ok(page)
    }

    pub fn free_space(&self) -> usize {
        let slot_directory_start = self.data.len() - self.tuple_count() as usize * SLOT_SIZE;
        slot_directory_start - self.free_pointer() as usize
    }

    pub fn tuple_count(&self) -> u16 {
        u16::from_le_bytes([
            self.data[TUPLE_COUNT_OFFSET],
            self.data[TUPLE_COUNT_OFFSET + 1],
        ])
    }

    fn free_pointer(&self) -> u32 {
        u32::from_le_bytes([
            self.data[FREE_POINTER_OFFSET],
            self.data[FREE_POINTER_OFFSET + 1],
            self.data[FREE_POINTER_OFFSET + 2],
            self.data[FREE_POINTER_OFFSET + 3],
        ])
    }

    fn set_free_pointer(&mut self, value: u32) {
        self.data[FREE_POINTER_OFFSET..FREE_POINTER_OFFSET + 4]
            .copy_from_slice(&value.to_le_bytes());
    }

    fn set_tuple_count(&mut self, value: u16) {
        self.data[TUPLE_COUNT_OFFSET..TUPLE_COUNT_OFFSET + 2]
            .copy_from_slice(&value.to_le_bytes());
    }

    /// Insert a tuple, returning its slot id.
    pub fn insert_tuple(&mut self, tuple_data: &[u8]) -> Result<u16> {
        if tuple_data.len() > u16::MAX as usize {
            bail!("Tuple size too large: {} bytes", tuple_data.len());
        }
        if self.free_space() < tuple_data.len() + SLOT_SIZE {
            bail!(
                "Not enough space in page: need {} bytes, have {}",
                tuple_data.len() + SLOT_SIZE,
                self.free_space()
            );
        }

        let tuple_offset = self.free_pointer() as usize;
        self.data[tuple_offset..tuple_offset + tuple_data.len()].copy_from_slice(tuple_data);
        self.set_free_pointer((tuple_offset + tuple_data.len()) as u32);

        let tuple_count = self.tuple_count();
        let slot_offset = self.data.len() - (tuple_count as usize + 1) * SLOT_SIZE;
        self.data[slot_offset..slot_offset + 2]
            .copy_from_slice(&(tuple_offset as u16).to_le_bytes());
        self.data[slot_offset + 2..slot_offset + 4]
            .copy_from_slice(&(tuple_data.len() as u16).to_le_bytes());

        self.set_tuple_count(tuple_count + 1);
        Ok(tuple_count)
    }

    /// Get a tuple by its slot id.
    pub fn get_tuple(&self, slot_id: u16) -> Result<&[u8]> {
        if slot_id >= self.tuple_count() {
            bail!("Invalid slot id: {}", slot_id);
        }
        let slot_offset = self.data.len() - (slot_id as usize + 1) * SLOT_SIZE;
        let tuple_offset =
            u16::from_le_bytes([self.data[slot_offset], self.data[slot_offset + 1]]) as usize;
        let tuple_length =
            u16::from_le_bytes([self.data[slot_offset + 2], self.data[slot_offset + 3]]) as usize;
        Ok(&self.data[tuple_offset..tuple_offset + tuple_length])
    }
}

impl PageHandle for HeapPage<'_> {
    fn page_number(&self) -> PageId {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[PAGE_NUMBER_OFFSET..PAGE_NUMBER_OFFSET + 8]);
        PageId(u64::from_le_bytes(bytes))
    }

    fn data(&self) -> &[u8] {
        self.data
    }
}

/// Factory producing [`HeapPage`]s. The heap format stores raw tuple bytes,
/// so the schema is not consulted structurally.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapPageFactory;

impl PageFactory for HeapPageFactory {
    type Page<'a> = HeapPage<'a>;

    fn init_page<'a>(
        &self,
        _schema: &Schema,
        buffer: &'a mut [u8],
        page_number: PageId,
    ) -> HeapPage<'a> {
        HeapPage::init(buffer, page_number)
    }

    fn parse_page<'a>(
        &self,
        _schema: &Schema,
        buffer: &'a mut [u8],
    ) -> Result<HeapPage<'a>, PageFormatError> {
        HeapPage::parse(buffer)
    }
}
