//! Table schema: page size plus an ordered sequence of columns.

use anyhow::{bail, Result};

use crate::catalog::column::ColumnDef;

/// Maximum number of columns a table may declare.
pub const MAX_COLUMNS: usize = 1024;

/// Exclusive upper bound on column name length, in UTF-16 code units.
pub const MAX_NAME_LENGTH: usize = 128;

/// Maximum element count for array-valued column types.
pub const MAX_ARRAY_LENGTH: usize = 8192;

/// Page sizes a table file may be created with.
pub const SUPPORTED_PAGE_SIZES: [u32; 6] = [512, 1024, 2048, 4096, 8192, 16384];

/// An ordered, incrementally buildable table schema.
///
/// Columns are appended one at a time; every append re-checks the bounds so
/// a schema that was accepted here is guaranteed to be encodable into a
/// valid table header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    page_size: u32,
    columns: Vec<ColumnDef>,
}

impl Schema {
    /// Create an empty schema for the given page size.
    pub fn new(page_size: u32) -> Result<Self> {
        if !SUPPORTED_PAGE_SIZES.contains(&page_size) {
            bail!(
                "Unsupported page size: {} (supported: {:?})",
                page_size,
                SUPPORTED_PAGE_SIZES
            );
        }
        Ok(Self {
            page_size,
            columns: Vec::new(),
        })
    }

    /// Append a column, validating its bounds.
    pub fn add_column(&mut self, column: ColumnDef) -> Result<()> {
        if self.columns.len() >= MAX_COLUMNS {
            bail!("Too many columns: the maximum is {}", MAX_COLUMNS);
        }
        let name_units = column.name.encode_utf16().count();
        if name_units == 0 || name_units >= MAX_NAME_LENGTH {
            bail!(
                "Column name length {} out of bounds (must be in 1..{})",
                name_units,
                MAX_NAME_LENGTH
            );
        }
        if column.data_type.is_array()
            && (column.length == 0 || column.length as usize > MAX_ARRAY_LENGTH)
        {
            bail!(
                "Array length {} for column '{}' out of bounds (must be in 1..={})",
                column.length,
                column.name,
                MAX_ARRAY_LENGTH
            );
        }
        self.columns.push(column);
        Ok(())
    }

    /// Build a schema from a column list in one go.
    pub fn with_columns(page_size: u32, columns: Vec<ColumnDef>) -> Result<Self> {
        let mut schema = Self::new(page_size)?;
        for column in columns {
            schema.add_column(column)?;
        }
        Ok(schema)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&ColumnDef> {
        self.columns.get(index)
    }
}
