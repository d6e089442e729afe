//! Splits a character stream into rows of raw fields.

use crate::decode::CharSource;
use crate::error::Result;
use tracing::warn;

/// One input line split into fields. An unquoted empty field is `None`.
pub type RawRow = Vec<Option<String>>;

/// True when every field of the row is missing or empty.
pub fn is_blank(row: &RawRow) -> bool {
    row.iter().all(|f| f.as_deref().map_or(true, str::is_empty))
}

/// Delimiter, quote and escape characters for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Separators {
    pub delimiter: char,
    pub quote: Option<char>,
    pub escape: Option<char>,
}

impl Default for Separators {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: None,
            escape: None,
        }
    }
}

pub struct RowTokenizer<S> {
    chars: S,
    separators: Separators,
    line: u64,
}

impl<S: CharSource> RowTokenizer<S> {
    pub fn new(chars: S, separators: Separators) -> Self {
        Self {
            chars,
            separators,
            line: 0,
        }
    }

    /// Read the next row, or `None` at end of input.
    ///
    /// Rules:
    /// - a quote at the start of a field opens a quoted section in which
    ///   delimiters and line breaks are literal
    /// - a doubled quote is one literal quote, inside or outside quotes
    /// - inside quotes, the escape character makes a following quote or
    ///   escape character literal; before anything else it is kept as is
    /// - rows end at `\n`, `\r\n` or a lone `\r`
    pub fn next_row(&mut self) -> Result<Option<RawRow>> {
        if self.chars.peek_char()?.is_none() {
            return Ok(None);
        }
        self.line += 1;
        let start_line = self.line;
        let Separators {
            delimiter,
            quote,
            escape,
        } = self.separators;

        let mut row = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut in_quotes = false;

        loop {
            let Some(c) = self.chars.next_char()? else {
                if in_quotes {
                    warn!(line = start_line, "unterminated quoted field at end of input");
                }
                break;
            };

            if in_quotes {
                if Some(c) == escape && Some(c) != quote {
                    match self.chars.peek_char()? {
                        Some(next) if Some(next) == quote || Some(next) == escape => {
                            self.chars.next_char()?;
                            field.push(next);
                        }
                        _ => field.push(c),
                    }
                } else if Some(c) == quote {
                    if self.chars.peek_char()? == quote {
                        self.chars.next_char()?;
                        field.push(c);
                    } else {
                        in_quotes = false;
                    }
                } else {
                    if c == '\n' {
                        self.line += 1;
                    }
                    field.push(c);
                }
                continue;
            }

            if c == delimiter {
                row.push(finish_field(&mut field, &mut quoted));
            } else if c == '\n' {
                break;
            } else if c == '\r' {
                if self.chars.peek_char()? == Some('\n') {
                    self.chars.next_char()?;
                }
                break;
            } else if Some(c) == quote {
                if field.is_empty() && !quoted {
                    quoted = true;
                    in_quotes = true;
                } else {
                    if self.chars.peek_char()? == quote {
                        self.chars.next_char()?;
                    }
                    field.push(c);
                }
            } else {
                field.push(c);
            }
        }

        row.push(finish_field(&mut field, &mut quoted));
        Ok(Some(row))
    }

    pub fn close(&mut self) {
        self.chars.close();
    }
}

fn finish_field(field: &mut String, quoted: &mut bool) -> Option<String> {
    let value = if field.is_empty() && !*quoted {
        None
    } else {
        Some(std::mem::take(field))
    };
    *quoted = false;
    value
}
