//! Cell addressing.
//!
//! An `Address` is a 0-based (row, col) coordinate. Its text form is the
//! familiar A1 notation: the column as a base-26 letter sequence followed by
//! the 1-based row number.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseAddressError;

/// Number of addressable rows.
pub const MAX_ROWS: usize = 16384;
/// Number of addressable columns.
pub const MAX_COLS: usize = 16384;

/// Longest A1 string accepted by `Address::from_str`.
const MAX_ADDRESS_LEN: usize = 17;
/// Most column letters accepted by `Address::from_str` (`XFD` is the last column).
const MAX_COL_LETTERS: usize = 3;
const LETTERS: usize = 26;

/// Identifier for a cell in a sheet.
///
/// Only equality and hashing matter to the engine. An address may be
/// constructed outside the grid bounds (formulas can mention `ZZZ1`), so
/// callers check `is_valid()` before using it as a storage key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Row index (0-based)
    pub row: usize,
    /// Column index (0-based)
    pub col: usize,
}

impl Address {
    /// Sentinel for "no such cell". Never valid.
    pub const NONE: Address = Address {
        row: usize::MAX,
        col: usize::MAX,
    };

    #[inline]
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// True if the address lies inside the `MAX_ROWS` x `MAX_COLS` grid.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.row < MAX_ROWS && self.col < MAX_COLS
    }
}

impl fmt::Display for Address {
    /// Renders A1 notation. Invalid addresses render as an empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return Ok(());
        }
        write!(f, "{}{}", col_to_letters(self.col), self.row + 1)
    }
}

impl FromStr for Address {
    type Err = ParseAddressError;

    /// Parses strict A1 notation: 1-3 uppercase letters then decimal digits.
    ///
    /// Well-formed text outside the grid (`XFE1`) parses to an address that
    /// fails `is_valid()`. A row of `0` or one too large for `usize` parses
    /// to `Address::NONE`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > MAX_ADDRESS_LEN {
            return Err(ParseAddressError::TooLong(s.len()));
        }

        let split = s
            .find(|c: char| !c.is_ascii_uppercase())
            .unwrap_or(s.len());
        let (letters, digits) = s.split_at(split);

        if letters.is_empty() {
            return Err(ParseAddressError::MissingColumn);
        }
        if letters.len() > MAX_COL_LETTERS {
            return Err(ParseAddressError::TooManyLetters(letters.len()));
        }
        if digits.is_empty() {
            return Err(ParseAddressError::MissingRow);
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseAddressError::InvalidRow(digits.to_string()));
        }

        let col = letters_to_col(letters);
        match digits.parse::<usize>() {
            Ok(row) if row > 0 => Ok(Address::new(row - 1, col)),
            _ => Ok(Address::NONE),
        }
    }
}

/// Bounding box of a sheet, in cells.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub rows: usize,
    pub cols: usize,
}

impl Size {
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Convert 0-based column index to letter(s): 0=A, 25=Z, 26=AA, ...
pub fn col_to_letters(col: usize) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % LETTERS) as u8) as char);
        if n < LETTERS {
            break;
        }
        n = n / LETTERS - 1;
    }
    result
}

/// Inverse of `col_to_letters`. Expects 1-3 uppercase ASCII letters.
fn letters_to_col(letters: &str) -> usize {
    letters
        .bytes()
        .fold(0usize, |acc, b| acc * LETTERS + (b - b'A') as usize + 1)
        - 1
}
