mod sort;
mod table;

pub use sort::{SortOrder, sort_by_name};
pub use table::{Column, TablePrinter, human_duration};
