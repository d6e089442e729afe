//! Triple model and the two output serializations.

use crate::error::{Result, TabulaError};
use std::fmt;
use std::io::Write;

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal {
        lexical: String,
        datatype: Option<String>,
        language: Option<String>,
    },
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    pub fn blank(label: impl Into<String>) -> Self {
        Term::Blank(label.into())
    }

    /// A plain literal (`xsd:string`).
    pub fn literal(lexical: impl Into<String>) -> Self {
        Term::Literal {
            lexical: lexical.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        let datatype = datatype.into();
        Term::Literal {
            lexical: lexical.into(),
            datatype: (datatype != XSD_STRING).then_some(datatype),
            language: None,
        }
    }

    pub fn lang(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal {
            lexical: lexical.into(),
            datatype: None,
            language: Some(language.into().to_lowercase()),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal { .. })
    }
}

/// N-Triples form of a single term.
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{}>", escape_iri(iri)),
            Term::Blank(label) => write!(f, "_:{label}"),
            Term::Literal {
                lexical,
                datatype,
                language,
            } => {
                write!(f, "\"{}\"", escape_literal(lexical))?;
                if let Some(lang) = language {
                    write!(f, "@{lang}")
                } else if let Some(dt) = datatype {
                    write!(f, "^^<{}>", escape_iri(dt))
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Characters that may not appear raw inside `<...>`.
fn escape_iri(iri: &str) -> String {
    let mut out = String::with_capacity(iri.len());
    for c in iri.chars() {
        match c {
            '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\' => {
                out.push_str(&format!("\\u{:04X}", c as u32))
            }
            c if (c as u32) <= 0x20 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Receives the triple stream of a run.
pub trait TripleSink {
    fn start(&mut self) -> Result<()>;
    fn triple(&mut self, triple: &Triple) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

fn write_err(e: std::io::Error) -> TabulaError {
    TabulaError::io("output", e)
}

/// One triple per line.
pub struct NTriplesWriter<W: Write> {
    out: W,
}

impl<W: Write> NTriplesWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TripleSink for NTriplesWriter<W> {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn triple(&mut self, triple: &Triple) -> Result<()> {
        writeln!(self.out, "{triple}").map_err(write_err)
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush().map_err(write_err)
    }
}

/// Turtle output with prefixes and subject grouping.
pub struct TurtleWriter<W: Write> {
    out: W,
    base: Option<String>,
    write_base: bool,
    prefixes: Vec<(String, String)>,
    subject: Option<Term>,
}

impl<W: Write> TurtleWriter<W> {
    /// `rdf:` is registered automatically unless the name or the
    /// namespace is already taken.
    pub fn new(out: W, prefixes: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut prefixes: Vec<(String, String)> = prefixes.into_iter().collect();
        if !prefixes
            .iter()
            .any(|(name, ns)| name == "rdf" || ns == RDF_NS)
        {
            prefixes.push(("rdf".to_string(), RDF_NS.to_string()));
        }
        Self {
            out,
            base: None,
            write_base: false,
            prefixes,
            subject: None,
        }
    }

    /// Emit `@base` and write IRIs below it relative to it.
    pub fn with_base(mut self, base: Option<String>, write_base: bool) -> Self {
        self.base = base;
        self.write_base = write_base;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn iri(&self, iri: &str) -> String {
        let best = self
            .prefixes
            .iter()
            .filter(|(_, ns)| iri.starts_with(ns.as_str()))
            .filter(|(_, ns)| is_safe_local(&iri[ns.len()..]))
            .max_by_key(|(_, ns)| ns.len());
        if let Some((name, ns)) = best {
            return format!("{name}:{}", &iri[ns.len()..]);
        }
        if let Some(relative) = self.relative(iri) {
            return format!("<{}>", escape_iri(relative));
        }
        format!("<{}>", escape_iri(iri))
    }

    fn relative<'a>(&self, iri: &'a str) -> Option<&'a str> {
        if !self.write_base {
            return None;
        }
        let base = self.base.as_deref()?;
        if !base.ends_with('/') {
            return None;
        }
        let rest = iri.strip_prefix(base)?;
        let plain = !rest.is_empty()
            && !rest.starts_with('.')
            && !rest.contains([':', '/', '?', '#']);
        plain.then_some(rest)
    }

    fn term(&self, term: &Term) -> String {
        match term {
            Term::Iri(iri) => self.iri(iri),
            Term::Blank(label) => format!("_:{label}"),
            Term::Literal {
                lexical,
                datatype,
                language,
            } => {
                if let Some(lang) = language {
                    return format!("\"{}\"@{lang}", escape_literal(lexical));
                }
                match datatype.as_deref() {
                    None => format!("\"{}\"", escape_literal(lexical)),
                    Some(XSD_INTEGER) if is_integer(lexical) => lexical.clone(),
                    Some(dt) => format!("\"{}\"^^{}", escape_literal(lexical), self.iri(dt)),
                }
            }
        }
    }

    fn predicate(&self, term: &Term) -> String {
        match term {
            Term::Iri(iri) if iri == RDF_TYPE => "a".to_string(),
            other => self.term(other),
        }
    }
}

impl<W: Write> TripleSink for TurtleWriter<W> {
    fn start(&mut self) -> Result<()> {
        if self.write_base {
            if let Some(base) = &self.base {
                writeln!(self.out, "@base <{}> .", escape_iri(base)).map_err(write_err)?;
            }
        }
        for (name, ns) in &self.prefixes {
            writeln!(self.out, "@prefix {name}: <{}> .", escape_iri(ns)).map_err(write_err)?;
        }
        writeln!(self.out).map_err(write_err)
    }

    fn triple(&mut self, triple: &Triple) -> Result<()> {
        let predicate = self.predicate(&triple.predicate);
        let object = self.term(&triple.object);
        if self.subject.as_ref() == Some(&triple.subject) {
            write!(self.out, " ;\n    {predicate} {object}").map_err(write_err)?;
            return Ok(());
        }
        if self.subject.is_some() {
            write!(self.out, " .\n\n").map_err(write_err)?;
        }
        let subject = self.term(&triple.subject);
        write!(self.out, "{subject} {predicate} {object}").map_err(write_err)?;
        self.subject = Some(triple.subject.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.subject.take().is_some() {
            writeln!(self.out, " .").map_err(write_err)?;
        }
        self.out.flush().map_err(write_err)
    }
}

/// `PN_CHARS_BASE` from the Turtle grammar.
fn is_pn_chars_base(c: char) -> bool {
    matches!(c,
        'A'..='Z'
        | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

/// `PN_CHARS`: base characters plus `_`, `-`, digits and combining marks.
fn is_pn_chars(c: char) -> bool {
    is_pn_chars_base(c)
        || c.is_ascii_digit()
        || matches!(c, '_' | '-' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

/// Local parts that can be written as `prefix:local` without escaping.
fn is_safe_local(local: &str) -> bool {
    let (Some(first), Some(last)) = (local.chars().next(), local.chars().last()) else {
        return true;
    };
    let first_ok = is_pn_chars_base(first) || first == '_' || first.is_ascii_digit();
    first_ok && is_pn_chars(last) && local.chars().all(|c| is_pn_chars(c) || c == '.')
}

fn is_integer(lexical: &str) -> bool {
    let digits = lexical.strip_prefix(['+', '-']).unwrap_or(lexical);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}
