//! Evaluates mapping queries against a table, producing triples.

use crate::columns::ROW_NUMBER;
use crate::error::{Result, TabulaError};
use crate::functions::{FunctionContext, FunctionRegistry};
use crate::mapping::{Mapping, Part, Pattern, Query, TermTemplate, TripleTemplate};
use crate::rdf::{Term, Triple, XSD_INTEGER};
use crate::record::Record;
use crate::table::Table;
use percent_encoding::{percent_encode, AsciiSet, CONTROLS};
use std::io::Write;
use tracing::{debug, info, warn};
use url::Url;

/// ASCII characters that may not appear in an IRI. Non-ASCII text is kept.
const IRI_UNSAFE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'`');

/// Records shown by [`Engine::preview`].
pub const PREVIEW_ROWS: usize = 5;

/// Counts for one input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSummary {
    pub name: String,
    pub records: u64,
    pub triples: u64,
}

/// Accumulated across queries and inputs. Passed into every query
/// evaluation and handed back updated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub queries: usize,
    pub records: u64,
    pub triples: u64,
    pub inputs: Vec<InputSummary>,
    scopes: u64,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting for a new input.
    pub fn begin_input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(InputSummary {
            name: name.into(),
            ..Default::default()
        });
        self
    }

    fn next_scope(&mut self) -> u64 {
        self.scopes += 1;
        self.scopes
    }

    fn count(&mut self, triples: usize) {
        self.records += 1;
        self.triples += triples as u64;
        if let Some(input) = self.inputs.last_mut() {
            input.records += 1;
            input.triples += triples as u64;
        }
    }
}

pub struct Engine<'a> {
    mapping: &'a Mapping,
    registry: &'a FunctionRegistry,
    base: Option<Url>,
}

impl<'a> Engine<'a> {
    /// Checks function names, the base IRI and constant IRIs before any
    /// input is read.
    pub fn new(mapping: &'a Mapping, registry: &'a FunctionRegistry) -> Result<Self> {
        let base = match mapping.base.as_deref() {
            Some(b) => Some(Url::parse(b).map_err(|e| {
                TabulaError::mapping(mapping.name(), format!("invalid base IRI '{b}': {e}"))
            })?),
            None => None,
        };

        for (qi, query) in mapping.queries.iter().enumerate() {
            for (ti, template) in query.templates.iter().enumerate() {
                let location = format!(
                    "{}: query {}, construct {}",
                    mapping.name(),
                    qi + 1,
                    ti + 1
                );
                let functions = template.functions();
                if let Some(f) = functions.iter().find(|f| !registry.contains(f)) {
                    return Err(TabulaError::mapping(
                        location,
                        format!("unknown function '{f}'"),
                    ));
                }
                if base.is_none() {
                    check_absolute(template, &location)?;
                }
            }
        }

        Ok(Self {
            mapping,
            registry,
            base,
        })
    }

    /// Run one query over a fresh pass of `table`. Each record's triples
    /// are handed to `emit` as one batch.
    pub fn run_query(
        &self,
        query: &Query,
        table: &mut Table,
        mut summary: RunSummary,
        emit: &mut dyn FnMut(Vec<Triple>) -> Result<()>,
    ) -> Result<RunSummary> {
        self.warn_unknown_variables(query, table)?;

        let offset = query.offset.unwrap_or(0);
        let mut rows = table.rows()?;
        let mut skipped = 0u64;
        let mut produced = 0u64;
        let start = summary.triples;
        while query.limit.map_or(true, |limit| produced < limit) {
            let Some(record) = rows.next() else { break };
            let record = record?;
            if skipped < offset {
                skipped += 1;
                continue;
            }
            let scope = summary.next_scope();
            let triples: Vec<Triple> = query
                .templates
                .iter()
                .filter_map(|t| self.instantiate(t, &record, scope))
                .collect();
            summary.count(triples.len());
            produced += 1;
            emit(triples)?;
        }
        rows.close();

        summary.queries += 1;
        info!(
            table = %table.name(),
            records = produced,
            triples = summary.triples - start,
            "query evaluated"
        );
        Ok(summary)
    }

    /// Write the query's templates and the first records of `table` as
    /// a text table.
    pub fn preview(
        &self,
        number: usize,
        query: &Query,
        table: &mut Table,
        out: &mut dyn Write,
    ) -> Result<()> {
        let write_err = |e| TabulaError::io("output", e);
        let variables = table.variables()?;
        writeln!(out, "Query {number} on {}", table.name()).map_err(write_err)?;
        for template in &query.templates {
            writeln!(out, "    {}", template.text).map_err(write_err)?;
        }
        writeln!(out).map_err(write_err)?;

        let header: Vec<String> = variables.iter().map(|v| v.to_string()).collect();
        let mut rows: Vec<Vec<String>> = Vec::new();
        let offset = query.offset.unwrap_or(0) as usize;
        let mut pass = table.rows()?;
        for record in pass.by_ref().skip(offset).take(PREVIEW_ROWS) {
            let record = record?;
            rows.push(
                header
                    .iter()
                    .map(|v| record.value(v).unwrap_or_default())
                    .collect(),
            );
        }
        pass.close();

        let widths: Vec<usize> = header
            .iter()
            .enumerate()
            .map(|(i, h)| {
                rows.iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(h.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        let line = |cells: &[String]| {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{c:<width$}", width = *w))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };
        writeln!(out, "{}", line(&header)).map_err(write_err)?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(out, "{}", rule.join("-+-")).map_err(write_err)?;
        for row in &rows {
            writeln!(out, "{}", line(row)).map_err(write_err)?;
        }
        if rows.is_empty() {
            writeln!(out, "(no records)").map_err(write_err)?;
        }
        writeln!(out).map_err(write_err)?;
        Ok(())
    }

    fn warn_unknown_variables(&self, query: &Query, table: &mut Table) -> Result<()> {
        let variables = table.variables()?;
        let mut reported: Vec<&str> = Vec::new();
        for template in &query.templates {
            for v in template.variables() {
                let known = variables.iter().any(|c| c.as_str() == v);
                if !known && !reported.contains(&v) {
                    warn!(
                        table = %table.name(),
                        variable = v,
                        "template refers to a column the input does not have"
                    );
                    reported.push(v);
                }
            }
        }
        Ok(())
    }

    /// Build one triple, or `None` when the template needs a value the
    /// record does not bind.
    pub fn instantiate(
        &self,
        template: &TripleTemplate,
        record: &Record,
        scope: u64,
    ) -> Option<Triple> {
        let subject = self.term(&template.subject, record, scope)?;
        let predicate = self.term(&template.predicate, record, scope)?;
        let object = self.term(&template.object, record, scope)?;
        Some(Triple::new(subject, predicate, object))
    }

    fn term(&self, template: &TermTemplate, record: &Record, scope: u64) -> Option<Term> {
        match template {
            TermTemplate::Iri(pattern) => {
                let text = self.render(pattern, record, true)?;
                self.resolve(&text).map(Term::Iri)
            }
            TermTemplate::Blank(label) => Some(Term::blank(format!("{label}_{scope}"))),
            TermTemplate::Variable(name) => {
                let value = record.value(name)?;
                if name == ROW_NUMBER {
                    Some(Term::typed(value, XSD_INTEGER))
                } else {
                    Some(Term::literal(value))
                }
            }
            TermTemplate::Literal {
                lexical,
                datatype,
                language,
            } => {
                let lexical = self.render(lexical, record, false)?;
                if let Some(lang) = language {
                    return Some(Term::lang(lexical, lang.as_str()));
                }
                match datatype {
                    Some(dt) => {
                        let dt = self.render(dt, record, true)?;
                        Some(Term::typed(lexical, self.resolve(&dt)?))
                    }
                    None => Some(Term::literal(lexical)),
                }
            }
        }
    }

    fn render(&self, pattern: &Pattern, record: &Record, iri: bool) -> Option<String> {
        let context = FunctionContext {
            prefixes: &self.mapping.prefixes,
        };
        let mut out = String::new();
        for part in &pattern.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Placeholder {
                    variable,
                    function,
                    argument,
                } => {
                    let mut value = record.value(variable)?;
                    if let Some(f) = function {
                        value = self
                            .registry
                            .call(f, &value, argument.as_deref(), &context)?;
                    }
                    if iri {
                        out.push_str(&iri_escape(&value));
                    } else {
                        out.push_str(&value);
                    }
                }
            }
        }
        Some(out)
    }

    /// Absolute IRIs are kept verbatim; relative ones are resolved
    /// against the base.
    fn resolve(&self, text: &str) -> Option<String> {
        if Url::parse(text).is_ok() {
            return Some(text.to_string());
        }
        match self.base.as_ref().and_then(|b| b.join(text).ok()) {
            Some(url) => Some(url.to_string()),
            None => {
                debug!(iri = text, "dropping triple with unresolvable IRI");
                None
            }
        }
    }
}

fn iri_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii() {
            out.extend(percent_encode(&[c as u8], IRI_UNSAFE));
        } else {
            out.push(c);
        }
    }
    out
}

/// Without a base, constant IRIs must already be absolute.
fn check_absolute(template: &TripleTemplate, location: &str) -> Result<()> {
    let iris = [&template.subject, &template.predicate, &template.object]
        .into_iter()
        .filter_map(|t| match t {
            TermTemplate::Iri(p) => Some(p),
            TermTemplate::Literal {
                datatype: Some(p), ..
            } => Some(p),
            _ => None,
        });
    for pattern in iris {
        if !pattern.is_constant() {
            continue;
        }
        let text: String = pattern
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Placeholder { .. } => None,
            })
            .collect();
        if Url::parse(&text).is_err() {
            return Err(TabulaError::mapping(
                location,
                format!("relative IRI <{text}> needs a base"),
            ));
        }
    }
    Ok(())
}
