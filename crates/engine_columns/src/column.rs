// crates/engine_columns/src/column.rs
use std::any::{Any, type_name};

// The trait allows us to treat different column vectors generically
pub trait Column: Any {
    fn rows(&self) -> usize;

    /// Removes `position` by moving the last element into it.
    fn swap_erase(&mut self, position: usize);

    fn element_type(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> Column for Vec<T> {
    fn rows(&self) -> usize {
        self.len()
    }

    fn swap_erase(&mut self, position: usize) {
        drop(self.swap_remove(position));
    }

    fn element_type(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}
