//! Binary codec for the table header.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic:u32   version:u32   page_size:u32   column_count:u32
//! column_count x {
//!     type_id:u32  length:u32  attributes:u32  name_length:u32
//!     name: name_length x 2 bytes (UTF-16LE code units)
//! }
//! ```
//!
//! The header occupies the byte range `[0, header_end)` of the backing file
//! and is written exactly once, when the table is created.

use std::fs::File;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::catalog::schema::SUPPORTED_PAGE_SIZES;
use crate::catalog::{ColumnDef, DataType, Schema, MAX_ARRAY_LENGTH, MAX_COLUMNS, MAX_NAME_LENGTH};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::io;

/// Magic sentinel at byte 0 ("TBLF").
pub const TABLE_FILE_MAGIC: u32 = 0x5442_4C46;

/// The only header format version this codec understands.
pub const TABLE_FORMAT_VERSION: u32 = 0;

const PRELUDE_LEN: usize = 16;
const COLUMN_FIXED_LEN: usize = 16;

const ATTR_NULLABLE: u32 = 1 << 0;
const ATTR_UNIQUE: u32 = 1 << 1;

fn corrupt(reason: impl Into<String>) -> StorageError {
    StorageError::CorruptHeader {
        reason: reason.into(),
    }
}

/// Decode the header from the start of `file`.
///
/// Returns the reconstructed schema and `header_end`, the byte offset just
/// past the last column descriptor. Validation follows the field order:
/// magic, version, page size, column count, then each column descriptor.
pub fn decode(file: &File) -> StorageResult<(Schema, u64)> {
    let mut prelude = [0u8; PRELUDE_LEN];
    io::read_exact_at(file, &mut prelude, 0)?;
    let mut cursor = Cursor::new(&prelude[..]);

    let magic = cursor.read_u32::<LittleEndian>()?;
    if magic != TABLE_FILE_MAGIC {
        return Err(corrupt(format!(
            "bad magic: expected {:#010x}, found {:#010x}",
            TABLE_FILE_MAGIC, magic
        )));
    }

    let version = cursor.read_u32::<LittleEndian>()?;
    if version != TABLE_FORMAT_VERSION {
        return Err(StorageError::UnsupportedVersion { found: version });
    }

    let page_size = cursor.read_u32::<LittleEndian>()?;
    if !SUPPORTED_PAGE_SIZES.contains(&page_size) {
        return Err(corrupt(format!("unsupported page size: {}", page_size)));
    }

    let column_count = cursor.read_u32::<LittleEndian>()? as usize;
    if column_count == 0 || column_count > MAX_COLUMNS {
        return Err(corrupt(format!(
            "column count {} out of bounds (must be in 1..={})",
            column_count, MAX_COLUMNS
        )));
    }

    let mut schema = Schema::new(page_size).map_err(|e| corrupt(e.to_string()))?;
    let mut offset = PRELUDE_LEN as u64;

    for index in 0..column_count {
        let mut fixed = [0u8; COLUMN_FIXED_LEN];
        io::read_exact_at(file, &mut fixed, offset)?;
        offset += COLUMN_FIXED_LEN as u64;
        let mut cursor = Cursor::new(&fixed[..]);

        let type_id = cursor.read_u32::<LittleEndian>()?;
        let data_type = DataType::from_u32(type_id)
            .map_err(|_| corrupt(format!("column {}: unknown type id {}", index, type_id)))?;

        let length = cursor.read_u32::<LittleEndian>()?;
        if data_type.is_array() && (length == 0 || length as usize > MAX_ARRAY_LENGTH) {
            return Err(corrupt(format!(
                "column {}: array length {} out of bounds (must be in 1..={})",
                index, length, MAX_ARRAY_LENGTH
            )));
        }

        let attributes = cursor.read_u32::<LittleEndian>()?;

        let name_length = cursor.read_u32::<LittleEndian>()? as usize;
        if name_length == 0 || name_length >= MAX_NAME_LENGTH {
            return Err(corrupt(format!(
                "column {}: name length {} out of bounds (must be in 1..{})",
                index, name_length, MAX_NAME_LENGTH
            )));
        }

        let mut name_bytes = vec![0u8; name_length * 2];
        io::read_exact_at(file, &mut name_bytes, offset)?;
        offset += name_bytes.len() as u64;

        let units: Vec<u16> = name_bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let name = String::from_utf16(&units)
            .map_err(|_| corrupt(format!("column {}: name is not valid UTF-16", index)))?;

        let column = ColumnDef {
            name,
            data_type,
            length,
            nullable: attributes & ATTR_NULLABLE != 0,
            unique: attributes & ATTR_UNIQUE != 0,
        };
        schema
            .add_column(column)
            .map_err(|e| corrupt(format!("column {}: {}", index, e)))?;
    }

    Ok((schema, offset))
}

/// Encode `schema` into header bytes.
///
/// The exact dual of [`decode`]. Column names are re-validated before
/// emission so a bad schema fails here with a validation error instead of
/// producing a file that can never be decoded.
pub fn encode(schema: &Schema) -> StorageResult<Vec<u8>> {
    encode_parts(schema.page_size(), schema.columns())
}

fn encode_parts(page_size: u32, columns: &[ColumnDef]) -> StorageResult<Vec<u8>> {
    let mut out = Vec::with_capacity(PRELUDE_LEN + columns.len() * 64);

    out.write_u32::<LittleEndian>(TABLE_FILE_MAGIC)?;
    out.write_u32::<LittleEndian>(TABLE_FORMAT_VERSION)?;
    out.write_u32::<LittleEndian>(page_size)?;
    out.write_u32::<LittleEndian>(columns.len() as u32)?;

    for (index, column) in columns.iter().enumerate() {
        let units: Vec<u16> = column.name.encode_utf16().collect();
        if units.is_empty() || units.len() >= MAX_NAME_LENGTH {
            return Err(StorageError::Validation(format!(
                "column {}: name length {} out of bounds (must be in 1..{})",
                index,
                units.len(),
                MAX_NAME_LENGTH
            )));
        }

        let mut attributes = 0u32;
        if column.nullable {
            attributes |= ATTR_NULLABLE;
        }
        if column.unique {
            attributes |= ATTR_UNIQUE;
        }

        out.write_u32::<LittleEndian>(column.data_type as u32)?;
        out.write_u32::<LittleEndian>(column.length)?;
        out.write_u32::<LittleEndian>(attributes)?;
        out.write_u32::<LittleEndian>(units.len() as u32)?;
        for unit in units {
            out.write_u16::<LittleEndian>(unit)?;
        }
    }

    Ok(out)
}
