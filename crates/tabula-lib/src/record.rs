//! Records: rows bound to column identifiers, plus the row number.

use crate::columns::{ColumnId, ColumnNamer, ROW_NUMBER};
use crate::decode::CharSource;
use crate::error::Result;
use crate::tokenizer::{is_blank, RawRow, RowTokenizer, Separators};

/// Control character that breaks text-based serializers downstream.
const FORBIDDEN: char = '\u{10}';

/// One data row. Columns whose cell was missing or empty are unbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    values: Vec<(ColumnId, String)>,
    row_number: u64,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(id, _)| id.as_str() == column)
            .map(|(_, v)| v.as_str())
    }

    /// Value of a column, with the row number available under its reserved name.
    pub fn value(&self, column: &str) -> Option<String> {
        if column == ROW_NUMBER {
            return Some(self.row_number.to_string());
        }
        self.get(column).map(str::to_string)
    }

    /// 1-based ordinal among non-blank data rows.
    pub fn row_number(&self) -> u64 {
        self.row_number
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnId, &str)> {
        self.values.iter().map(|(id, v)| (id, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Forward-only iterator of records over one pass of the input.
pub struct RecordSource<S> {
    tokenizer: RowTokenizer<S>,
    namer: ColumnNamer,
    header: bool,
    started: bool,
    lookahead: Option<Option<Record>>,
    row_number: u64,
    closed: bool,
}

impl<S: CharSource> RecordSource<S> {
    pub fn new(chars: S, separators: Separators, header: bool) -> Self {
        Self {
            tokenizer: RowTokenizer::new(chars, separators),
            namer: ColumnNamer::new(),
            header,
            started: false,
            lookahead: None,
            row_number: 0,
            closed: false,
        }
    }

    /// Column identifiers known after the header and the first data row,
    /// followed by the row number.
    pub fn variables(&mut self) -> Result<Vec<ColumnId>> {
        self.peek()?;
        Ok(self.namer.variables())
    }

    /// True when the input holds no data rows.
    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.peek()?.is_none())
    }

    pub fn next_record(&mut self) -> Result<Option<Record>> {
        match self.lookahead.take() {
            Some(record) => Ok(record),
            None => self.read_record(),
        }
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.tokenizer.close();
            self.closed = true;
        }
        self.lookahead = Some(None);
    }

    fn peek(&mut self) -> Result<Option<&Record>> {
        if self.lookahead.is_none() {
            let record = self.read_record()?;
            self.lookahead = Some(record);
        }
        Ok(self.lookahead.as_ref().and_then(Option::as_ref))
    }

    /// Skip leading rows until one yields a declared name; that row is
    /// the header.
    fn read_header(&mut self) -> Result<()> {
        self.started = true;
        if !self.header {
            return Ok(());
        }
        while let Some(row) = self.tokenizer.next_row()? {
            if ColumnNamer::has_declared_name(&row) {
                self.namer = ColumnNamer::from_header(&row);
                break;
            }
        }
        Ok(())
    }

    fn read_record(&mut self) -> Result<Option<Record>> {
        if self.closed {
            return Ok(None);
        }
        if !self.started {
            self.read_header()?;
        }
        loop {
            let Some(row) = self.tokenizer.next_row()? else {
                return Ok(None);
            };
            if is_blank(&row) {
                continue;
            }
            self.row_number += 1;
            return Ok(Some(self.bind(row)));
        }
    }

    fn bind(&mut self, row: RawRow) -> Record {
        let mut values = Vec::with_capacity(row.len());
        for (index, cell) in row.into_iter().enumerate() {
            let column = self.namer.column(index).clone();
            match cell {
                Some(value) if !value.is_empty() => {
                    let value = if value.contains(FORBIDDEN) {
                        value.replace(FORBIDDEN, "\u{FFFD}")
                    } else {
                        value
                    };
                    values.push((column, value));
                }
                _ => {}
            }
        }
        Record {
            values,
            row_number: self.row_number,
        }
    }
}

impl<S: CharSource> Iterator for RecordSource<S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
