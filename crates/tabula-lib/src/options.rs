//! Parsing options and their resolution from locator fragments,
//! invocation-wide settings, dialect defaults and hard defaults.

use crate::tokenizer::Separators;
use tabula_cli::{parse_char_directive, CompressionFormat};
use std::path::Path;

/// Independently unset-able parsing options.
///
/// `quote` and `escape` distinguish "unset" (`None`) from "explicitly no
/// character" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOptions {
    pub encoding: Option<String>,
    pub header: Option<bool>,
    pub delimiter: Option<char>,
    pub quote: Option<Option<char>>,
    pub escape: Option<Option<char>>,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = Some(header);
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_quote(mut self, quote: Option<char>) -> Self {
        self.quote = Some(quote);
        self
    }

    pub fn with_escape(mut self, escape: Option<char>) -> Self {
        self.escape = Some(escape);
        self
    }

    /// Comma, no quote, no escape. Header presence stays unknown.
    pub fn hard_defaults() -> Self {
        Self::new()
            .with_delimiter(',')
            .with_quote(None)
            .with_escape(None)
    }

    /// Copy every field that is set in `other`; unset fields leave
    /// `self` untouched.
    pub fn override_with(&mut self, other: &ParseOptions) {
        if other.encoding.is_some() {
            self.encoding = other.encoding.clone();
        }
        if other.header.is_some() {
            self.header = other.header;
        }
        if other.delimiter.is_some() {
            self.delimiter = other.delimiter;
        }
        if other.quote.is_some() {
            self.quote = other.quote;
        }
        if other.escape.is_some() {
            self.escape = other.escape;
        }
    }

    pub fn separators(&self) -> Separators {
        let defaults = Separators::default();
        Separators {
            delimiter: self.delimiter.unwrap_or(defaults.delimiter),
            quote: self.quote.unwrap_or(defaults.quote),
            escape: self.escape.unwrap_or(defaults.escape),
        }
    }

    /// Header mode for building a table; on when nothing decided it.
    pub fn header_or_default(&self) -> bool {
        self.header.unwrap_or(true)
    }
}

/// Named bundle of delimiter and quote defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Csv,
    Tsv,
}

impl Dialect {
    pub fn defaults(self) -> ParseOptions {
        match self {
            Dialect::Csv => ParseOptions::new().with_delimiter(',').with_quote(Some('"')),
            Dialect::Tsv => ParseOptions::new().with_delimiter('\t').with_quote(None),
        }
    }

    /// Dialect implied by a file name, looking through a compression suffix.
    pub fn from_file_name(name: &str) -> Option<Dialect> {
        let mut name = name.to_lowercase();
        if let Some(format) = CompressionFormat::from_extension(Path::new(&name)) {
            let suffix = format!(".{}", format.extension());
            if let Some(stripped) = name.strip_suffix(&suffix) {
                name = stripped.to_string();
            } else if let Some(dot) = name.rfind('.') {
                name.truncate(dot);
            }
        }
        if name.ends_with(".csv") {
            Some(Dialect::Csv)
        } else if name.ends_with(".tsv") {
            Some(Dialect::Tsv)
        } else {
            None
        }
    }
}

/// A locator split into its address, the directives found in its
/// fragment, and whatever could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorOptions {
    /// Everything before `#`.
    pub address: String,
    /// Address plus the fragment parts that were not consumed.
    pub remainder: String,
    /// Directives given explicitly in the fragment.
    pub options: ParseOptions,
    /// Dialect implied by the file name.
    pub dialect: Option<Dialect>,
}

/// Parse `address#key=value;key=value`.
///
/// Recognized keys are `encoding`, `charset`, `header` (`present` or
/// `absent`), `delimiter`, `quotechar` and `escapechar`. Parts that are
/// not recognized or do not parse stay in the remainder.
pub fn parse_locator(locator: &str) -> LocatorOptions {
    let (address, fragment) = match locator.find('#') {
        Some(idx) => (&locator[..idx], Some(&locator[idx + 1..])),
        None => (locator, None),
    };
    let mut parsed = LocatorOptions {
        address: address.to_string(),
        remainder: address.to_string(),
        options: ParseOptions::new(),
        dialect: Dialect::from_file_name(address),
    };
    let Some(fragment) = fragment else {
        return parsed;
    };

    let mut separator = '#';
    for part in fragment.split(';') {
        if !apply_directive(&mut parsed.options, part) {
            parsed.remainder.push(separator);
            parsed.remainder.push_str(part);
            separator = ';';
        }
    }
    parsed
}

/// Apply one fragment part. Returns false when the part is not a
/// usable directive.
fn apply_directive(options: &mut ParseOptions, part: &str) -> bool {
    if let Some(value) = part
        .strip_prefix("encoding=")
        .or_else(|| part.strip_prefix("charset="))
    {
        options.encoding = Some(value.to_string());
        return true;
    }
    if let Some(value) = part.strip_prefix("header=") {
        return match value {
            "present" => {
                options.header = Some(true);
                true
            }
            "absent" => {
                options.header = Some(false);
                true
            }
            _ => false,
        };
    }
    if let Some(value) = part.strip_prefix("delimiter=") {
        return match parse_char_directive(value) {
            Ok(Some(c)) => {
                options.delimiter = Some(c);
                true
            }
            _ => false,
        };
    }
    if let Some(value) = part.strip_prefix("quotechar=") {
        return match parse_char_directive(value) {
            Ok(c) => {
                options.quote = Some(c);
                true
            }
            Err(_) => false,
        };
    }
    if let Some(value) = part.strip_prefix("escapechar=") {
        return match parse_char_directive(value) {
            Ok(c) => {
                options.escape = Some(c);
                true
            }
            Err(_) => false,
        };
    }
    false
}

/// Effective options for one resource.
///
/// Highest precedence first: fragment directives, invocation-wide
/// options, dialect defaults, hard defaults. The tab-separated dialect
/// applies when `tabs` is set or when the fragment or invocation
/// delimiter is a tab; otherwise the file name decides.
pub fn resolve(locator: &LocatorOptions, invocation: &ParseOptions, tabs: bool) -> ParseOptions {
    let tab_delimited = tabs
        || locator.options.delimiter == Some('\t')
        || invocation.delimiter == Some('\t');
    let dialect = if tab_delimited {
        Some(Dialect::Tsv)
    } else {
        locator.dialect
    };

    let mut effective = ParseOptions::hard_defaults();
    if let Some(dialect) = dialect {
        effective.override_with(&dialect.defaults());
    }
    effective.override_with(invocation);
    effective.override_with(&locator.options);
    effective
}

/// Settle header presence from a query's declared offset.
///
/// Only acts when header presence is still unknown: an offset of exactly
/// 1 means the first row is a header, which the tokenizer will consume,
/// so the offset becomes 0. Any other offset means no header.
pub fn couple_header_to_offset(options: &mut ParseOptions, offset: &mut Option<u64>) {
    if options.header.is_some() {
        return;
    }
    if *offset == Some(1) {
        *offset = Some(0);
        options.header = Some(true);
    } else {
        options.header = Some(false);
    }
}
