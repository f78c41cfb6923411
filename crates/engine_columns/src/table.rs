// crates/engine_columns/src/table.rs

use std::any::{TypeId, type_name};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::column::Column;
use crate::error::TableError;

/// A set of parallel columns, one per Rust type.
///
/// Row `i` of every column describes the same entity, and every column
/// always has exactly `len()` elements.
///
/// POSITIONS ARE NOT STABLE. `erase` moves the last row into the erased
/// slot, so every position obtained before an `erase` is invalid after it.
/// Keep a key column and look rows up again with `find_by`.
pub struct Table {
    // Registration order; `erase` drops the removed row's values in this order.
    columns: Vec<Box<dyn Column>>,
    index: HashMap<TypeId, usize>,
    len: usize,
}

impl Table {
    /// Creates an empty table whose columns are the element types of `R`.
    ///
    /// Panics if `R` names the same type twice: columns are looked up by
    /// type, so that schema can never be addressed.
    pub fn for_row<R: Row>() -> Self {
        let mut table = Self {
            columns: Vec::new(),
            index: HashMap::new(),
            len: 0,
        };

        for (type_id, name, column) in R::empty_columns() {
            if table.index.contains_key(&type_id) {
                panic!(
                    "Column {name} registered twice. \
                     Every column of a table needs its own type; wrap it in a newtype."
                );
            }
            table.index.insert(type_id, table.columns.len());
            table.columns.push(column);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn has_column<T: 'static>(&self) -> bool {
        self.index.contains_key(&TypeId::of::<T>())
    }

    /// Appends one row across all columns and returns its position.
    ///
    /// The row's column set must match the table's exactly; otherwise
    /// nothing is pushed.
    pub fn push_row<R: Row>(&mut self, row: R) -> Result<usize, TableError> {
        let types = R::column_types();
        if types.len() != self.columns.len() {
            return Err(TableError::ColumnCountMismatch {
                expected: self.columns.len(),
                found: types.len(),
            });
        }

        let mut seen = HashSet::with_capacity(types.len());
        for (type_id, name) in types {
            if !self.index.contains_key(&type_id) {
                return Err(TableError::UnknownColumn(name));
            }
            if !seen.insert(type_id) {
                return Err(TableError::DuplicateColumn(name));
            }
        }

        let position = self.len;
        row.push_into(self);
        self.len += 1;

        debug_assert!(self.columns.iter().all(|c| c.rows() == self.len));
        Ok(position)
    }

    /// Linear scan of column `T` for `value`.
    pub fn find_by<T: PartialEq + 'static>(&self, value: &T) -> Option<usize> {
        self.column::<T>()?.iter().position(|v| v == value)
    }

    /// Linear scan of column `T` for the first element matching `predicate`.
    pub fn position_where<T: 'static>(&self, predicate: impl Fn(&T) -> bool) -> Option<usize> {
        self.column::<T>()?.iter().position(predicate)
    }

    pub fn at<T: 'static>(&self, position: usize) -> Option<&T> {
        self.column::<T>()?.get(position)
    }

    pub fn at_mut<T: 'static>(&mut self, position: usize) -> Option<&mut T> {
        self.column_mut::<T>()?.get_mut(position)
    }

    /// The whole of column `T`, in row order.
    pub fn column<T: 'static>(&self) -> Option<&[T]> {
        let slot = *self.index.get(&TypeId::of::<T>())?;
        self.columns[slot]
            .as_any()
            .downcast_ref::<Vec<T>>()
            .map(Vec::as_slice)
    }

    fn column_mut<T: 'static>(&mut self) -> Option<&mut Vec<T>> {
        let slot = *self.index.get(&TypeId::of::<T>())?;
        self.columns[slot].as_any_mut().downcast_mut::<Vec<T>>()
    }

    /// Removes the row at `position` with swap-and-pop on every column.
    /// Invalidates all previously obtained positions.
    pub fn erase(&mut self, position: usize) -> bool {
        if position >= self.len {
            return false;
        }
        for column in &mut self.columns {
            column.swap_erase(position);
        }
        self.len -= 1;
        true
    }

    /// Visits every row once, in position order.
    pub fn for_each(&self, mut visitor: impl FnMut(RowRef<'_>)) {
        for position in 0..self.len {
            visitor(RowRef {
                table: self,
                position,
            });
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = RowRef<'_>> {
        (0..self.len).map(move |position| RowRef {
            table: self,
            position,
        })
    }

    fn push_value<T: 'static>(&mut self, value: T) {
        match self.column_mut::<T>() {
            Some(column) => column.push(value),
            None => unreachable!("push_row validated column {}", type_name::<T>()),
        }
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("len", &self.len)
            .field(
                "columns",
                &self.columns.iter().map(|c| c.element_type()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Read-only view of one row during traversal.
#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    table: &'a Table,
    position: usize,
}

impl<'a> RowRef<'a> {
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn get<T: 'static>(&self) -> Option<&'a T> {
        self.table.at::<T>(self.position)
    }
}

impl fmt::Debug for RowRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowRef").field("position", &self.position).finish()
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A tuple of column values. Implemented for tuples of 1 to 12 elements.
pub trait Row: sealed::Sealed + 'static {
    #[doc(hidden)]
    fn column_types() -> Vec<(TypeId, &'static str)>;
    #[doc(hidden)]
    fn empty_columns() -> Vec<(TypeId, &'static str, Box<dyn Column>)>;
    #[doc(hidden)]
    fn push_into(self, table: &mut Table);
}

macro_rules! impl_row {
    ($($name:ident $idx:tt),+) => {
        impl<$($name: 'static),+> sealed::Sealed for ($($name,)+) {}

        impl<$($name: 'static),+> Row for ($($name,)+) {
            fn column_types() -> Vec<(TypeId, &'static str)> {
                vec![$((TypeId::of::<$name>(), type_name::<$name>())),+]
            }

            fn empty_columns() -> Vec<(TypeId, &'static str, Box<dyn Column>)> {
                vec![$((
                    TypeId::of::<$name>(),
                    type_name::<$name>(),
                    Box::new(Vec::<$name>::new()) as Box<dyn Column>,
                )),+]
            }

            fn push_into(self, table: &mut Table) {
                $(table.push_value::<$name>(self.$idx);)+
            }
        }
    };
}

impl_row!(A 0);
impl_row!(A 0, B 1);
impl_row!(A 0, B 1, C 2);
impl_row!(A 0, B 1, C 2, D 3);
impl_row!(A 0, B 1, C 2, D 3, E 4);
impl_row!(A 0, B 1, C 2, D 3, E 4, F 5);
impl_row!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_row!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);
impl_row!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8);
impl_row!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9);
impl_row!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10);
impl_row!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10, L 11);
