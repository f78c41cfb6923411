// crates/engine_columns/src/lib.rs
//! Struct-of-arrays storage: one `Vec` per column type, one row per entity.

mod column;
mod error;
mod table;

pub use column::Column;
pub use error::TableError;
pub use table::{Row, RowRef, Table};
