//! Mapping files: prefixes, a base IRI and CONSTRUCT-like queries.
//!
//! ```toml
//! base = "http://example.org/"
//!
//! [prefixes]
//! ex = "http://example.org/ns#"
//!
//! [[query]]
//! from = ["people.csv"]
//! construct = [
//!     "<person/{id}> a ex:Person",
//!     "<person/{id}> ex:name ?name",
//!     "<person/{id}> ex:born \"{born|date:%d/%m/%Y}\"^^xsd:date",
//! ]
//! ```

use crate::columns::ROW_NUMBER;
use crate::error::{Result, TabulaError};
use crate::rdf::{RDF_TYPE, XSD_NS};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingFile {
    base: Option<String>,
    #[serde(default)]
    prefixes: BTreeMap<String, String>,
    #[serde(default, rename = "query")]
    queries: Vec<QueryFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryFile {
    #[serde(default)]
    from: Vec<String>,
    offset: Option<u64>,
    limit: Option<u64>,
    #[serde(default)]
    construct: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Mapping {
    pub base: Option<String>,
    pub prefixes: BTreeMap<String, String>,
    pub queries: Vec<Query>,
    name: String,
}

#[derive(Debug, Clone)]
pub struct Query {
    pub from: Vec<String>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub templates: Vec<TripleTemplate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripleTemplate {
    pub subject: TermTemplate,
    pub predicate: TermTemplate,
    pub object: TermTemplate,
    /// Source text, for previews and messages.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TermTemplate {
    Iri(Pattern),
    /// Fresh for every record.
    Blank(String),
    /// The bound value as a literal.
    Variable(String),
    Literal {
        lexical: Pattern,
        datatype: Option<Pattern>,
        language: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Placeholder {
        variable: String,
        function: Option<String>,
        argument: Option<String>,
    },
}

/// Text with `{var}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pattern {
    pub parts: Vec<Part>,
}

fn placeholder_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{([\p{Alphabetic}\p{N}_]+)(?:\|([A-Za-z_][A-Za-z0-9_-]*)(?::([^}]*))?)?\}").ok()
    })
    .as_ref()
}

/// Same character set as sanitized column names.
fn is_variable_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

impl Pattern {
    pub fn parse(text: &str) -> Self {
        let mut pattern = Pattern::default();
        pattern.push_parsed(text);
        pattern
    }

    fn text(text: &str) -> Self {
        let mut pattern = Pattern::default();
        pattern.push_text(text);
        pattern
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Part::Text(last)) = self.parts.last_mut() {
            last.push_str(text);
        } else {
            self.parts.push(Part::Text(text.to_string()));
        }
    }

    fn push_parsed(&mut self, text: &str) {
        let Some(re) = placeholder_re() else {
            self.push_text(text);
            return;
        };
        let mut last = 0;
        for caps in re.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            self.push_text(&text[last..whole.start()]);
            self.parts.push(Part::Placeholder {
                variable: caps[1].to_string(),
                function: caps.get(2).map(|m| m.as_str().to_string()),
                argument: caps.get(3).map(|m| m.as_str().to_string()),
            });
            last = whole.end();
        }
        self.push_text(&text[last..]);
    }

    pub fn is_constant(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Text(_)))
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            Part::Placeholder { variable, .. } => Some(variable.as_str()),
            Part::Text(_) => None,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            Part::Placeholder {
                function: Some(f), ..
            } => Some(f.as_str()),
            _ => None,
        })
    }
}

impl TermTemplate {
    fn patterns(&self) -> Vec<&Pattern> {
        match self {
            TermTemplate::Iri(p) => vec![p],
            TermTemplate::Literal {
                lexical, datatype, ..
            } => std::iter::once(lexical).chain(datatype.as_ref()).collect(),
            TermTemplate::Blank(_) | TermTemplate::Variable(_) => Vec::new(),
        }
    }

    fn variables(&self) -> Vec<&str> {
        match self {
            TermTemplate::Variable(v) => vec![v.as_str()],
            other => other
                .patterns()
                .into_iter()
                .flat_map(Pattern::variables)
                .collect(),
        }
    }
}

impl TripleTemplate {
    fn terms(&self) -> [&TermTemplate; 3] {
        [&self.subject, &self.predicate, &self.object]
    }

    /// Variables referenced anywhere in the template, in order of appearance.
    pub fn variables(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for v in self.terms().into_iter().flat_map(TermTemplate::variables) {
            if !seen.contains(&v) {
                seen.push(v);
            }
        }
        seen
    }

    /// Function names used by placeholders.
    pub fn functions(&self) -> Vec<&str> {
        self.terms()
            .into_iter()
            .flat_map(TermTemplate::patterns)
            .flat_map(Pattern::functions)
            .collect()
    }
}

impl Mapping {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TabulaError::io(path.display().to_string(), e))?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parse mapping text. `name` labels error locations.
    pub fn parse(text: &str, name: &str) -> Result<Self> {
        let file: MappingFile =
            toml::from_str(text).map_err(|e| TabulaError::mapping(name, e.message()))?;
        if file.queries.is_empty() {
            return Err(TabulaError::mapping(name, "no [[query]] defined"));
        }
        for (prefix, ns) in &file.prefixes {
            let valid = !prefix.is_empty()
                && prefix
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(TabulaError::mapping(
                    name,
                    format!("invalid prefix name '{prefix}' for <{ns}>"),
                ));
            }
        }

        let mut queries = Vec::with_capacity(file.queries.len());
        for (qi, query) in file.queries.into_iter().enumerate() {
            let mut templates = Vec::with_capacity(query.construct.len());
            for (ti, text) in query.construct.iter().enumerate() {
                let location = format!("{name}: query {}, construct {}", qi + 1, ti + 1);
                templates.push(compile_triple(text, &file.prefixes, &location)?);
            }
            if templates.is_empty() {
                return Err(TabulaError::mapping(
                    format!("{name}: query {}", qi + 1),
                    "construct is empty",
                ));
            }
            queries.push(Query {
                from: query.from,
                offset: query.offset,
                limit: query.limit,
                templates,
            });
        }

        Ok(Mapping {
            base: file.base,
            prefixes: file.prefixes,
            queries,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Offset declared by the first query, shared with header detection.
    pub fn first_offset_mut(&mut self) -> Option<&mut Option<u64>> {
        self.queries.first_mut().map(|q| &mut q.offset)
    }

    pub fn first_from(&self) -> &[String] {
        self.queries.first().map(|q| q.from.as_slice()).unwrap_or(&[])
    }
}

/// Split a template line into its terms. Whitespace inside `<...>`,
/// quotes or placeholder braces does not separate terms.
fn split_terms(text: &str) -> std::result::Result<Vec<String>, String> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    let mut in_iri = false;
    let mut in_quote = false;
    let mut braces = 0usize;

    while let Some(c) = chars.next() {
        if in_quote {
            current.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            } else if c == '"' {
                in_quote = false;
            }
            continue;
        }
        match c {
            '{' => braces += 1,
            '}' => braces = braces.saturating_sub(1),
            '<' if braces == 0 => in_iri = true,
            '>' if braces == 0 => in_iri = false,
            '"' if braces == 0 && !in_iri => in_quote = true,
            _ => {}
        }
        if c.is_whitespace() && !in_iri && braces == 0 {
            if !current.is_empty() {
                terms.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(c);
    }
    if in_quote {
        return Err("unterminated literal".to_string());
    }
    if in_iri {
        return Err("unterminated IRI".to_string());
    }
    if !current.is_empty() {
        terms.push(current);
    }
    if terms.last().map(String::as_str) == Some(".") {
        terms.pop();
    }
    Ok(terms)
}

#[derive(Clone, Copy, PartialEq)]
enum Position {
    Subject,
    Predicate,
    Object,
}

fn compile_triple(
    text: &str,
    prefixes: &BTreeMap<String, String>,
    location: &str,
) -> Result<TripleTemplate> {
    let fail = |msg: String| TabulaError::mapping(location, msg);
    let terms = split_terms(text).map_err(|m| fail(format!("{m} in '{text}'")))?;
    let [s, p, o] = terms.as_slice() else {
        return Err(fail(format!(
            "expected three terms, found {} in '{text}'",
            terms.len()
        )));
    };
    let subject = compile_term(s, Position::Subject, prefixes).map_err(fail)?;
    let predicate = compile_term(p, Position::Predicate, prefixes).map_err(fail)?;
    let object = compile_term(o, Position::Object, prefixes).map_err(fail)?;
    Ok(TripleTemplate {
        subject,
        predicate,
        object,
        text: text.trim().to_string(),
    })
}

fn compile_term(
    token: &str,
    position: Position,
    prefixes: &BTreeMap<String, String>,
) -> std::result::Result<TermTemplate, String> {
    let term = if let Some(inner) = token.strip_prefix('<') {
        let inner = inner
            .strip_suffix('>')
            .ok_or_else(|| format!("malformed IRI '{token}'"))?;
        TermTemplate::Iri(Pattern::parse(inner))
    } else if token.starts_with('"') {
        compile_literal(token, prefixes)?
    } else if token == "a" {
        if position != Position::Predicate {
            return Err("'a' is only allowed as a predicate".to_string());
        }
        TermTemplate::Iri(Pattern::text(RDF_TYPE))
    } else if let Some(label) = token.strip_prefix("_:") {
        if !is_variable_name(label) {
            return Err(format!("invalid blank node label '{token}'"));
        }
        TermTemplate::Blank(label.to_string())
    } else if let Some(name) = token.strip_prefix(['?', '$']) {
        if !is_variable_name(name) {
            return Err(format!("invalid variable '{token}'"));
        }
        TermTemplate::Variable(name.to_string())
    } else if token.contains(':') {
        TermTemplate::Iri(compile_prefixed(token, prefixes)?)
    } else {
        return Err(format!("unrecognised term '{token}'"));
    };

    match (&term, position) {
        (TermTemplate::Literal { .. } | TermTemplate::Variable(_), Position::Subject) => {
            Err(format!("subject must be an IRI or blank node, found '{token}'"))
        }
        (TermTemplate::Iri(_), Position::Predicate) | (_, Position::Subject | Position::Object) => {
            Ok(term)
        }
        (_, Position::Predicate) => Err(format!("predicate must be an IRI, found '{token}'")),
    }
}

fn compile_prefixed(
    token: &str,
    prefixes: &BTreeMap<String, String>,
) -> std::result::Result<Pattern, String> {
    let (prefix, local) = token
        .split_once(':')
        .ok_or_else(|| format!("malformed prefixed name '{token}'"))?;
    let ns = match prefixes.get(prefix) {
        Some(ns) => ns.as_str(),
        None if prefix == "xsd" => XSD_NS,
        None if prefix == "rdf" => crate::rdf::RDF_NS,
        None => return Err(format!("unknown prefix '{prefix}' in '{token}'")),
    };
    let mut pattern = Pattern::text(ns);
    pattern.push_parsed(local);
    Ok(pattern)
}

fn compile_literal(
    token: &str,
    prefixes: &BTreeMap<String, String>,
) -> std::result::Result<TermTemplate, String> {
    let body = &token[1..];
    let mut lexical = String::new();
    let mut chars = body.char_indices();
    let mut close = None;
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => lexical.push('\n'),
                Some((_, 't')) => lexical.push('\t'),
                Some((_, 'r')) => lexical.push('\r'),
                Some((_, other)) => lexical.push(other),
                None => break,
            },
            '"' => {
                close = Some(i);
                break;
            }
            c => lexical.push(c),
        }
    }
    let close = close.ok_or_else(|| format!("unterminated literal {token}"))?;
    let suffix = &body[close + 1..];

    let (datatype, language) = if suffix.is_empty() {
        (None, None)
    } else if let Some(lang) = suffix.strip_prefix('@') {
        let valid = lang
            .split('-')
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric()));
        if !valid {
            return Err(format!("invalid language tag in {token}"));
        }
        (None, Some(lang.to_lowercase()))
    } else if let Some(dt) = suffix.strip_prefix("^^") {
        let pattern = if let Some(inner) = dt.strip_prefix('<') {
            let inner = inner
                .strip_suffix('>')
                .ok_or_else(|| format!("malformed datatype in {token}"))?;
            Pattern::parse(inner)
        } else {
            compile_prefixed(dt, prefixes)?
        };
        (Some(pattern), None)
    } else {
        return Err(format!("unexpected '{suffix}' after literal {token}"));
    };

    Ok(TermTemplate::Literal {
        lexical: Pattern::parse(&lexical),
        datatype,
        language,
    })
}

/// True when the template refers to the row number.
pub fn uses_row_number(template: &TripleTemplate) -> bool {
    template.variables().contains(&ROW_NUMBER)
}
