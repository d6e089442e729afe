//! Multi-pass view over a reopenable input.
//!
//! Every call to [`Table::rows`] opens the input again and runs a fresh
//! decoder, tokenizer and namer over it. Open passes live in an arena
//! owned by the table so that [`Table::close`] can release any pass the
//! caller did not drain.

use crate::columns::ColumnId;
use crate::decode::Decoder;
use crate::error::Result;
use crate::options::ParseOptions;
use crate::record::{Record, RecordSource};
use crate::source::InputSource;
use crate::tokenizer::Separators;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, trace};

type Pass = RecordSource<Decoder>;

#[derive(Default)]
struct OpenPasses {
    passes: BTreeMap<u64, Pass>,
    next_id: u64,
    size: Option<u64>,
}

impl OpenPasses {
    fn release(&mut self, id: u64) {
        if let Some(mut pass) = self.passes.remove(&id) {
            pass.close();
            trace!(pass = id, "pass closed");
        }
    }
}

pub struct Table {
    input: Box<dyn InputSource>,
    encoding: Option<String>,
    separators: Separators,
    header: bool,
    chunk_size: Option<usize>,
    /// Opened to compute the caches; handed to the next `rows()` call.
    primed: Option<Pass>,
    variables: Option<Vec<ColumnId>>,
    empty: Option<bool>,
    open: Rc<RefCell<OpenPasses>>,
}

impl Table {
    pub fn new(input: Box<dyn InputSource>, options: &ParseOptions) -> Self {
        Self {
            input,
            encoding: options.encoding.clone(),
            separators: options.separators(),
            header: options.header_or_default(),
            chunk_size: None,
            primed: None,
            variables: None,
            empty: None,
            open: Rc::new(RefCell::new(OpenPasses::default())),
        }
    }

    /// Decode in chunks of `size` bytes instead of the default.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    pub fn name(&self) -> String {
        self.input.describe()
    }

    /// Column identifiers in positional order with the row number last.
    ///
    /// Computed from the first pass ever opened and cached.
    pub fn variables(&mut self) -> Result<Vec<ColumnId>> {
        if self.variables.is_none() {
            let pass = self.open_pass()?;
            self.primed = Some(pass);
        }
        Ok(self.variables.clone().unwrap_or_default())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        if self.empty.is_none() {
            let pass = self.open_pass()?;
            self.primed = Some(pass);
        }
        Ok(self.empty.unwrap_or(true))
    }

    /// Number of records. Forces a full pass unless one has already
    /// been drained.
    pub fn size(&mut self) -> Result<u64> {
        if let Some(size) = self.open.borrow().size {
            return Ok(size);
        }
        let mut rows = self.rows()?;
        for record in rows.by_ref() {
            record?;
        }
        let size = self.open.borrow().size;
        Ok(size.unwrap_or(rows.count))
    }

    /// Start a new, independent pass over the input.
    pub fn rows(&mut self) -> Result<Rows> {
        let source = match self.primed.take() {
            Some(source) => source,
            None => self.open_pass()?,
        };
        let mut open = self.open.borrow_mut();
        let id = open.next_id;
        open.next_id += 1;
        open.passes.insert(id, source);
        debug!(table = %self.input.describe(), pass = id, "pass opened");
        Ok(Rows {
            id,
            count: 0,
            open: Rc::clone(&self.open),
        })
    }

    /// Number of passes handed out and not yet exhausted or closed.
    pub fn open_passes(&self) -> usize {
        self.open.borrow().passes.len()
    }

    /// Close every pass that is still open.
    pub fn close(&mut self) {
        let mut open = self.open.borrow_mut();
        let ids: Vec<u64> = open.passes.keys().copied().collect();
        if !ids.is_empty() {
            debug!(table = %self.input.describe(), count = ids.len(), "closing open passes");
        }
        for id in ids {
            open.release(id);
        }
        if let Some(mut primed) = self.primed.take() {
            primed.close();
        }
    }

    fn open_pass(&mut self) -> Result<Pass> {
        let stream = self.input.open()?;
        let mut decoder =
            Decoder::for_label(stream, self.encoding.as_deref(), self.input.describe());
        if let Some(size) = self.chunk_size {
            decoder = decoder.with_chunk_size(size);
        }
        let mut source = RecordSource::new(decoder, self.separators, self.header);
        if self.variables.is_none() {
            self.variables = Some(source.variables()?);
            self.empty = Some(source.is_empty()?);
        }
        Ok(source)
    }
}

/// One pass over a table. Dropping it closes the pass.
pub struct Rows {
    id: u64,
    count: u64,
    open: Rc<RefCell<OpenPasses>>,
}

impl Rows {
    /// Records produced so far by this pass.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn close(&mut self) {
        self.open.borrow_mut().release(self.id);
    }
}

impl Iterator for Rows {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut open = self.open.borrow_mut();
        let outcome = open.passes.get_mut(&self.id)?.next_record();
        match outcome {
            Ok(Some(record)) => {
                self.count += 1;
                Some(Ok(record))
            }
            Ok(None) => {
                open.release(self.id);
                if open.size.is_none() {
                    open.size = Some(self.count);
                }
                None
            }
            Err(e) => {
                open.release(self.id);
                Some(Err(e))
            }
        }
    }
}

impl Drop for Rows {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TabulaError;
    use crate::source::{BytesSource, SingleUseSource};
    use std::io::Cursor;

    fn table(input: &str, header: bool) -> Table {
        let options = ParseOptions::hard_defaults()
            .with_quote(Some('"'))
            .with_header(header);
        Table::new(Box::new(BytesSource::new("test", input)), &options)
    }

    fn values(rows: Rows, column: &str) -> Vec<String> {
        rows.map(|r| r.unwrap().get(column).unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn variables_and_emptiness_are_cached() {
        let mut t = table("X,Y\n1,2", true);
        let vars: Vec<String> = t.variables().unwrap().iter().map(|v| v.to_string()).collect();
        assert_eq!(vars, vec!["X", "Y", "ROWNUM"]);
        assert!(!t.is_empty().unwrap());
        assert_eq!(t.open_passes(), 0);
    }

    #[test]
    fn empty_table() {
        let mut t = table("X,Y\n", true);
        assert!(t.is_empty().unwrap());
        assert_eq!(t.size().unwrap(), 0);
    }

    #[test]
    fn passes_are_independent() {
        let mut t = table("a\n1\n2\n3", true);
        let mut first = t.rows().unwrap();
        let mut second = t.rows().unwrap();
        assert_eq!(t.open_passes(), 2);

        let mut seen_first = Vec::new();
        let mut seen_second = Vec::new();
        seen_first.push(first.next().unwrap().unwrap());
        seen_second.push(second.next().unwrap().unwrap());
        seen_second.push(second.next().unwrap().unwrap());
        seen_first.push(first.next().unwrap().unwrap());
        seen_first.extend(first.by_ref().map(|r| r.unwrap()));
        seen_second.extend(second.by_ref().map(|r| r.unwrap()));

        assert_eq!(seen_first, seen_second);
        assert_eq!(seen_first.len(), 3);
        assert_eq!(t.open_passes(), 0);
    }

    #[test]
    fn first_rows_call_reuses_primed_pass() {
        let mut t = table("a\n1\n2", true);
        t.variables().unwrap();
        let rows = t.rows().unwrap();
        assert_eq!(values(rows, "a"), vec!["1", "2"]);
    }

    #[test]
    fn size_is_cached_from_first_drained_pass() {
        let mut t = table("1\n2\n\n3\n", false);
        let rows = t.rows().unwrap();
        assert_eq!(values(rows, "a"), vec!["1", "2", "3"]);
        assert_eq!(t.size().unwrap(), 3);
        assert_eq!(t.open_passes(), 0);
    }

    #[test]
    fn size_forces_a_pass() {
        let mut t = table("1\n2\n", false);
        assert_eq!(t.size().unwrap(), 2);
        assert_eq!(t.size().unwrap(), 2);
    }

    #[test]
    fn explicit_close_does_not_set_size() {
        let mut t = table("1\n2\n3\n", false);
        let mut rows = t.rows().unwrap();
        rows.next().unwrap().unwrap();
        rows.close();
        assert_eq!(t.open_passes(), 0);
        assert!(rows.next().is_none());
        assert_eq!(t.size().unwrap(), 3);
    }

    #[test]
    fn close_releases_all_passes() {
        let mut t = table("1\n2\n3\n", false);
        let mut a = t.rows().unwrap();
        let mut b = t.rows().unwrap();
        a.next().unwrap().unwrap();
        t.close();
        assert_eq!(t.open_passes(), 0);
        assert!(a.next().is_none());
        assert!(b.next().is_none());
    }

    #[test]
    fn dropping_rows_closes_pass() {
        let mut t = table("1\n2\n", false);
        {
            let mut rows = t.rows().unwrap();
            rows.next();
            assert_eq!(t.open_passes(), 1);
        }
        assert_eq!(t.open_passes(), 0);
    }

    #[test]
    fn single_use_input_rejects_second_pass() {
        let input = SingleUseSource::new("pipe", Box::new(Cursor::new(b"a\n1\n".to_vec())));
        let mut t = Table::new(Box::new(input), &ParseOptions::new().with_header(true));
        let vars: Vec<String> = t.variables().unwrap().iter().map(|v| v.to_string()).collect();
        assert_eq!(vars, vec!["a", "ROWNUM"]);
        assert_eq!(values(t.rows().unwrap(), "a"), vec!["1"]);
        assert!(matches!(
            t.rows(),
            Err(TabulaError::MultiPassUnsupported(_))
        ));
    }

    #[test]
    fn small_chunks_give_same_records() {
        let input = "név,város\nÁdám,Győr\nÉva,Pécs\n";
        let options = ParseOptions::new().with_header(true).with_encoding("utf-8");
        let mut t = Table::new(Box::new(BytesSource::new("test", input)), &options)
            .with_chunk_size(2);
        let names = values(t.rows().unwrap(), "név");
        assert_eq!(names, vec!["Ádám", "Éva"]);
    }
}
