//! Schema model consumed by the storage layer.
//!
//! A table's schema is the ordered list of its column definitions plus the
//! page size of its backing file. The storage layer treats this model as
//! opaque: it only needs the page size, the column count, and per-column
//! read access when encoding the table header.

pub mod column;
pub mod schema;

pub use column::{ColumnDef, DataType};
pub use schema::{Schema, MAX_ARRAY_LENGTH, MAX_COLUMNS, MAX_NAME_LENGTH, SUPPORTED_PAGE_SIZES};
