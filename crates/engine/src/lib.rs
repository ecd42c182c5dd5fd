pub mod address;
pub mod cell;
mod dep_graph;
pub mod error;
pub mod formula;
pub mod sheet;
pub mod value;

#[cfg(test)]
pub mod harness;

pub use address::{Address, Size, MAX_COLS, MAX_ROWS};
pub use cell::{Cell, CellContent};
pub use error::{FormulaError, FormulaSyntaxError, ParseAddressError, SheetError};
pub use formula::{CellLookup, Formula};
pub use sheet::{CellSnapshot, CellView, Sheet};
pub use value::Value;
