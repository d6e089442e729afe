//! Value functions usable in template placeholders (`{var|fn:arg}`).

use chrono::{NaiveDate, NaiveDateTime};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::{BTreeMap, HashMap};

/// Everything except RFC 3986 unreserved characters.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// ISO 4217 codes whose customary locale writes the decimal separator as a
/// comma. Every other code uses a point.
const DECIMAL_COMMA: &[&str] = &[
    "ARS", "BGN", "BRL", "CLP", "COP", "CZK", "DKK", "EUR", "HUF", "IDR", "ISK", "NOK", "PLN",
    "RON", "RUB", "RUR", "SEK", "TRY", "VND",
];

/// What a function can see besides its input value.
pub struct FunctionContext<'a> {
    pub prefixes: &'a BTreeMap<String, String>,
}

/// Returns `None` to leave the placeholder unbound.
pub type Function = fn(&str, Option<&str>, &FunctionContext<'_>) -> Option<String>;

/// Named functions, built once and shared by reference with the engine.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Function>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("trim", |v, _, _| Some(v.trim().to_string()));
        registry.register("lower", |v, _, _| Some(v.to_lowercase()));
        registry.register("upper", |v, _, _| Some(v.to_uppercase()));
        registry.register("slug", |v, _, _| Some(slug(v)));
        registry.register("encode", |v, _, _| {
            Some(utf8_percent_encode(v, COMPONENT).to_string())
        });
        registry.register("expand", expand);
        registry.register("ns", |v, _, ctx| ctx.prefixes.get(v.trim()).cloned());
        registry.register("date", date);
        registry.register("datetime", datetime);
        registry.register("currency", currency);
        registry
    }

    /// Add or replace a function.
    pub fn register(&mut self, name: &str, function: Function) {
        self.functions.insert(name.to_string(), function);
    }

    pub fn get(&self, name: &str) -> Option<Function> {
        self.functions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn call(
        &self,
        name: &str,
        value: &str,
        argument: Option<&str>,
        context: &FunctionContext<'_>,
    ) -> Option<String> {
        self.get(name).and_then(|f| f(value, argument, context))
    }
}

fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut dash = false;
    for c in value.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    if out.ends_with('-') {
        out.pop();
    }
    out
}

fn expand(value: &str, _: Option<&str>, ctx: &FunctionContext<'_>) -> Option<String> {
    let (prefix, local) = value.trim().split_once(':')?;
    ctx.prefixes.get(prefix).map(|ns| format!("{ns}{local}"))
}

fn date(value: &str, pattern: Option<&str>, _: &FunctionContext<'_>) -> Option<String> {
    let pattern = pattern.unwrap_or("%Y-%m-%d");
    match NaiveDate::parse_from_str(value.trim(), pattern) {
        Ok(d) => Some(d.format("%Y-%m-%d").to_string()),
        Err(_) => Some(value.to_string()),
    }
}

fn datetime(value: &str, pattern: Option<&str>, _: &FunctionContext<'_>) -> Option<String> {
    let pattern = pattern.unwrap_or("%Y-%m-%dT%H:%M:%S");
    let trimmed = value.trim();
    let parsed = NaiveDateTime::parse_from_str(trimmed, pattern).ok().or_else(|| {
        NaiveDate::parse_from_str(trimmed, pattern)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    });
    match parsed {
        Some(dt) => Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
        None => Some(value.to_string()),
    }
}

/// Parse a monetary amount such as `$2,783,918,982` or `1.234,50 €` into a
/// plain decimal. The optional ISO 4217 code picks the separators;
/// without one they are inferred from the value.
fn currency(value: &str, code: Option<&str>, _: &FunctionContext<'_>) -> Option<String> {
    Some(parse_amount(value, code).unwrap_or_else(|| value.to_string()))
}

fn parse_amount(value: &str, code: Option<&str>) -> Option<String> {
    let trimmed = value.trim();
    let negative = trimmed.starts_with('-')
        || trimmed.ends_with('-')
        || (trimmed.starts_with('(') && trimmed.ends_with(')'));
    let number: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if !number.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let decimal = match code.map(|c| c.trim().to_uppercase()) {
        Some(code) if DECIMAL_COMMA.contains(&code.as_str()) => ',',
        Some(_) => '.',
        None => guess_decimal_separator(&number),
    };
    let group = if decimal == '.' { ',' } else { '.' };
    let (int_part, frac_part) = match number.rfind(decimal) {
        Some(i) => (&number[..i], &number[i + 1..]),
        None => (number.as_str(), ""),
    };
    if int_part.contains(decimal) || frac_part.contains(group) {
        return None;
    }

    let digits: String = int_part.chars().filter(|&c| c != group).collect();
    let digits = digits.trim_start_matches('0');
    let fraction = frac_part.trim_end_matches('0');
    let mut out = String::new();
    if negative && !(digits.is_empty() && fraction.is_empty()) {
        out.push('-');
    }
    out.push_str(if digits.is_empty() { "0" } else { digits });
    if !fraction.is_empty() {
        out.push('.');
        out.push_str(fraction);
    }
    Some(out)
}

/// The later of `.` and `,` is the decimal separator. A lone separator
/// followed by exactly three digits, or one that repeats, groups thousands.
fn guess_decimal_separator(number: &str) -> char {
    match (number.rfind('.'), number.rfind(',')) {
        (Some(point), Some(comma)) => {
            if point > comma {
                '.'
            } else {
                ','
            }
        }
        (Some(i), None) | (None, Some(i)) => {
            let separator = char::from(number.as_bytes()[i]);
            let repeated = number.matches(separator).count() > 1;
            let trailing = number.len() - i - 1;
            match (repeated || trailing == 3, separator) {
                (false, sep) => sep,
                (true, '.') => ',',
                (true, _) => '.',
            }
        }
        (None, None) => '.',
    }
}
