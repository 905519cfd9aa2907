//! Column definitions and data types.

use anyhow::{bail, Result};

/// Data types a column can hold.
///
/// The discriminants are the on-disk type ids and must never be renumbered.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Boolean = 1,
    Int = 2,
    BigInt = 3,
    Double = 4,
    Char = 5,
    VarChar = 6,
}

impl DataType {
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            1 => Ok(DataType::Boolean),
            2 => Ok(DataType::Int),
            3 => Ok(DataType::BigInt),
            4 => Ok(DataType::Double),
            5 => Ok(DataType::Char),
            6 => Ok(DataType::VarChar),
            _ => bail!("Unknown data type id: {}", value),
        }
    }

    /// Whether values of this type are arrays of elements, making the
    /// column's length field an element count rather than informational.
    pub fn is_array(&self) -> bool {
        matches!(self, DataType::Char | DataType::VarChar)
    }
}

/// A single column of a table schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    /// Element count for array types (`Char`, `VarChar`); informational
    /// for scalar types.
    pub length: u32,
    pub nullable: bool,
    pub unique: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType, length: u32) -> Self {
        Self {
            name: name.into(),
            data_type,
            length,
            nullable: false,
            unique: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}
