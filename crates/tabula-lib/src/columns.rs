//! Column identifiers: sanitized header names, synthetic positional names,
//! and the reserved row-number column.

use std::borrow::Borrow;
use std::fmt;

/// Name of the pseudo-column holding the 1-based ordinal of each data row.
pub const ROW_NUMBER: &str = "ROWNUM";

/// A printable column identifier, unique within one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnId(String);

impl ColumnId {
    pub fn new(name: impl Into<String>) -> Self {
        ColumnId(name.into())
    }

    pub fn row_number() -> Self {
        ColumnId(ROW_NUMBER.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_row_number(&self) -> bool {
        self.0 == ROW_NUMBER
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ColumnId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ColumnId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Synthetic name for a zero-based column position: bijective base-26
/// over lowercase letters (`0 -> a`, `25 -> z`, `26 -> aa`, `27 -> ab`).
pub fn synthetic_name(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'a' + (n % 26) as u8));
        n /= 26;
    }
    letters.iter().rev().collect()
}

/// Turn a header cell into a candidate identifier.
///
/// Surrounding whitespace is trimmed and every character that is not a
/// letter, digit or underscore becomes `_`. Returns `None` when nothing
/// is left.
pub fn sanitize(cell: &str) -> Option<String> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        trimmed
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect(),
    )
}

/// Assigns identifiers to column positions.
///
/// Positions are named in order. A position without a usable declared
/// name gets its synthetic name, prefixed with `_` until it no longer
/// collides with an identifier already assigned.
#[derive(Debug, Clone, Default)]
pub struct ColumnNamer {
    columns: Vec<ColumnId>,
}

impl ColumnNamer {
    /// A namer with no declared columns; every position is synthetic.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive names from a header row.
    ///
    /// A cell falls back to its synthetic name when it sanitizes to
    /// nothing, repeats a name already taken in this row, or would
    /// produce the reserved row-number name.
    pub fn from_header(cells: &[Option<String>]) -> Self {
        let mut namer = Self::new();
        for (index, cell) in cells.iter().enumerate() {
            let declared = cell
                .as_deref()
                .and_then(sanitize)
                .filter(|name| name != ROW_NUMBER)
                .filter(|name| !namer.contains(name));
            match declared {
                Some(name) => namer.columns.push(ColumnId(name)),
                None => {
                    namer.column(index);
                }
            }
        }
        namer
    }

    /// True when at least one cell of `cells` would yield a declared name.
    pub fn has_declared_name(cells: &[Option<String>]) -> bool {
        cells.iter().flatten().any(|cell| sanitize(cell).is_some())
    }

    /// Identifier for a position, naming any missing positions up to it.
    pub fn column(&mut self, index: usize) -> &ColumnId {
        while self.columns.len() <= index {
            let mut name = synthetic_name(self.columns.len());
            while self.contains(&name) {
                name.insert(0, '_');
            }
            self.columns.push(ColumnId(name));
        }
        &self.columns[index]
    }

    pub fn columns(&self) -> &[ColumnId] {
        &self.columns
    }

    /// Column identifiers in positional order, followed by the row number.
    pub fn variables(&self) -> Vec<ColumnId> {
        let mut vars = self.columns.clone();
        vars.push(ColumnId::row_number());
        vars
    }

    fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.as_str() == name)
    }
}
