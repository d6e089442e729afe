//! Shared CLI definitions for tabula.
//!
//! Used by the main application and by the build script (manpage) and
//! gen_docs binary (command-line-options markdown).

use clap::{CommandFactory, Parser, ValueEnum};
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};

/// Compression format for data files
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum CompressionFormat {
    /// Gzip compression (.gz) - Most common, good balance of speed and compression
    Gzip,
    /// Zstandard compression (.zst) - Modern, fast compression with good ratios
    Zstd,
    /// Bzip2 compression (.bz2) - Good compression ratio, slower than gzip
    Bzip2,
    /// XZ compression (.xz) - Excellent compression ratio, slower than bzip2
    Xz,
}

impl CompressionFormat {
    /// Detect compression format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            match ext.to_lowercase().as_str() {
                "gz" => Some(Self::Gzip),
                "zst" | "zstd" => Some(Self::Zstd),
                "bz2" | "bz" => Some(Self::Bzip2),
                "xz" => Some(Self::Xz),
                _ => None,
            }
        } else {
            None
        }
    }

    /// Get file extension for this compression format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Zstd => "zst",
            Self::Bzip2 => "bz2",
            Self::Xz => "xz",
        }
    }
}

/// Named characters accepted wherever a single character is expected
/// (command-line flags, config file, locator fragments). `None` means
/// "explicitly no character".
const CHAR_NAMES: &[(&str, Option<char>)] = &[
    ("tab", Some('\t')),
    ("comma", Some(',')),
    ("semicolon", Some(';')),
    ("singlequote", Some('\'')),
    ("doublequote", Some('"')),
    ("backslash", Some('\\')),
    ("none", None),
    ("", None),
];

/// Interpret a character directive: a name from the alias table
/// (case-insensitive), a `%XX`-encoded character, or a literal single
/// character.
///
/// Returns `Ok(None)` for the names that mean "no character".
pub fn parse_char_directive(value: &str) -> Result<Option<char>, String> {
    let lowered = value.to_lowercase();
    if let Some((_, c)) = CHAR_NAMES.iter().find(|(name, _)| *name == lowered) {
        return Ok(*c);
    }
    let decoded = percent_decode_str(value)
        .decode_utf8()
        .map_err(|_| format!("'{value}' does not decode to valid UTF-8"))?;
    let mut chars = decoded.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Some(c)),
        _ => Err(format!(
            "'{value}' must be a single character, %XX escape, or one of: tab, comma, semicolon, singlequote, doublequote, backslash, none"
        )),
    }
}

/// Value parser for flags that require an actual character (the delimiter).
pub fn parse_required_char(value: &str) -> Result<char, String> {
    parse_char_directive(value)?
        .ok_or_else(|| format!("'{value}' is not allowed here; a character is required"))
}

/// A character setting that may be explicitly disabled (`none`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharDirective(pub Option<char>);

/// Value parser for quote and escape characters, which accept `none`.
pub fn parse_optional_char(value: &str) -> Result<CharDirective, String> {
    parse_char_directive(value).map(CharDirective)
}

/// Command-line arguments for tabula
#[derive(Clone, Parser, Debug)]
#[command(
    name = "tabula",
    version,
    about = "Map delimited text files to RDF",
    long_about = include_str!("../long_about.txt")
)]
pub struct Args {
    /// Mapping file describing the triples to build from each record (not required with --generate-config)
    #[arg(required_unless_present = "generate_config", value_name = "MAPPING")]
    pub mapping: Option<PathBuf>,

    /// Input files. A `*` in the file name is expanded. Options may follow a `#`, e.g. data.txt#delimiter=tab;header=present.
    /// When omitted, the first query's `from` is used.
    #[arg(value_name = "INPUT")]
    pub inputs: Vec<String>,

    /// Read input from standard input (single pass only)
    #[arg(long = "stdin", action, conflicts_with = "inputs")]
    pub stdin: bool,

    /// Delimiter character: a literal character, %XX escape, or tab, comma, semicolon
    #[arg(short = 'd', long = "delimiter", value_name = "CHAR", value_parser = parse_required_char)]
    pub delimiter: Option<char>,

    /// Input is tab-separated (tab delimiter, no quote character)
    #[arg(short = 't', long = "tabs", action)]
    pub tabs: bool,

    /// Quote character, or `none` to disable quoting
    #[arg(long = "quotechar", value_name = "CHAR", value_parser = parse_optional_char)]
    pub quote_char: Option<CharDirective>,

    /// Escape character used inside quoted fields, or `none`
    #[arg(long = "escapechar", value_name = "CHAR", value_parser = parse_optional_char)]
    pub escape_char: Option<CharDirective>,

    /// Character encoding of the input. When omitted, the encoding is detected from the data
    #[arg(short = 'e', long = "encoding", value_name = "ENCODING")]
    pub encoding: Option<String>,

    /// The first row of the input holds column names
    #[arg(long = "header-row", action, conflicts_with = "no_header_row")]
    pub header_row: bool,

    /// The input has no header row; columns are named a, b, c, ...
    #[arg(short = 'H', long = "no-header-row", action)]
    pub no_header_row: bool,

    /// Suppress repeated triples within a trailing window of this many triples (0 disables)
    #[arg(long = "dedup", value_name = "N")]
    pub dedup: Option<usize>,

    /// Base IRI for resolving relative IRIs (overrides the mapping's base)
    #[arg(long = "base", value_name = "IRI")]
    pub base: Option<String>,

    /// Write an @base directive to Turtle output
    #[arg(long = "write-base", action)]
    pub write_base: bool,

    /// Write N-Triples instead of Turtle
    #[arg(long = "ntriples", action)]
    pub ntriples: bool,

    /// Specify the compression format explicitly (gzip, zstd, bzip2, xz)
    /// If not specified, compression is auto-detected from file extension.
    #[arg(long = "compression", value_enum)]
    pub compression: Option<CompressionFormat>,

    /// Show the mapping templates and the first records of each input instead of producing triples
    #[arg(long = "test", action)]
    pub test: bool,

    /// Enable debug logging on standard error
    #[arg(long = "debug", action)]
    pub debug: bool,

    /// Generate default configuration file at ~/.config/tabula/config.toml
    #[arg(long = "generate-config", action)]
    pub generate_config: bool,

    /// Force overwrite existing config file when using --generate-config
    #[arg(long = "force", requires = "generate_config", action)]
    pub force: bool,
}

impl Args {
    /// Header presence requested on the command line, if any.
    pub fn header(&self) -> Option<bool> {
        if self.header_row {
            Some(true)
        } else if self.no_header_row {
            Some(false)
        } else {
            None
        }
    }
}

/// Escape `|` and newlines for use in markdown table cells.
fn escape_table_cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn value_placeholder(arg: &clap::Arg) -> String {
    arg.get_value_names()
        .map(|names| {
            names
                .iter()
                .map(|n: &clap::builder::Str| format!("<{}>", n.as_ref() as &str))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

/// Render command-line options as markdown.
///
/// Used by the gen_docs binary; output is written to stdout.
pub fn render_options_markdown() -> String {
    let mut cmd = Args::command();
    cmd.build();

    let mut out = String::from("# Command Line Options\n\n");

    out.push_str("## Usage\n\n```\n");
    let usage = cmd.render_usage();
    out.push_str(&usage.to_string());
    out.push_str("\n```\n\n");

    out.push_str("## Options\n\n");
    out.push_str("| Option | Description |\n");
    out.push_str("|--------|-------------|\n");

    for arg in cmd.get_arguments() {
        let id = arg.get_id().as_ref().to_string();
        if id == "help" || id == "version" {
            continue;
        }

        let option_str = if arg.is_positional() {
            let placeholder = value_placeholder(arg);
            if arg.is_required_set() {
                placeholder
            } else {
                format!("[{placeholder}]")
            }
        } else {
            let mut parts = Vec::new();
            if let Some(s) = arg.get_short() {
                parts.push(format!("-{s}"));
            }
            if let Some(l) = arg.get_long() {
                parts.push(format!("--{l}"));
            }
            let op = parts.join(", ");
            let placeholder = if arg.get_action().takes_values() {
                value_placeholder(arg)
            } else {
                String::new()
            };
            if placeholder.is_empty() {
                op
            } else {
                format!("{op} {placeholder}")
            }
        };

        let help = arg
            .get_help()
            .map(|h| escape_table_cell(&h.to_string()))
            .unwrap_or_else(|| "-".to_string());

        out.push_str(&format!("| `{option_str}` | {help} |\n"));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_detection() {
        assert_eq!(
            CompressionFormat::from_extension(Path::new("file.csv.gz")),
            Some(CompressionFormat::Gzip)
        );
        assert_eq!(
            CompressionFormat::from_extension(Path::new("file.tsv.zst")),
            Some(CompressionFormat::Zstd)
        );
        assert_eq!(
            CompressionFormat::from_extension(Path::new("file.csv.bz2")),
            Some(CompressionFormat::Bzip2)
        );
        assert_eq!(
            CompressionFormat::from_extension(Path::new("file.csv.xz")),
            Some(CompressionFormat::Xz)
        );
        assert_eq!(
            CompressionFormat::from_extension(Path::new("file.csv")),
            None
        );
        assert_eq!(CompressionFormat::from_extension(Path::new("file")), None);
    }

    #[test]
    fn char_directive_aliases() {
        assert_eq!(parse_char_directive("tab"), Ok(Some('\t')));
        assert_eq!(parse_char_directive("TAB"), Ok(Some('\t')));
        assert_eq!(parse_char_directive("comma"), Ok(Some(',')));
        assert_eq!(parse_char_directive("semicolon"), Ok(Some(';')));
        assert_eq!(parse_char_directive("singlequote"), Ok(Some('\'')));
        assert_eq!(parse_char_directive("doublequote"), Ok(Some('"')));
        assert_eq!(parse_char_directive("backslash"), Ok(Some('\\')));
        assert_eq!(parse_char_directive("none"), Ok(None));
        assert_eq!(parse_char_directive(""), Ok(None));
    }

    #[test]
    fn char_directive_percent_and_literal() {
        assert_eq!(parse_char_directive("%09"), Ok(Some('\t')));
        assert_eq!(parse_char_directive("%20"), Ok(Some(' ')));
        assert_eq!(parse_char_directive("%3B"), Ok(Some(';')));
        assert_eq!(parse_char_directive("%2C"), Ok(Some(',')));
        assert_eq!(parse_char_directive("|"), Ok(Some('|')));
        assert_eq!(parse_char_directive("é"), Ok(Some('é')));
        assert!(parse_char_directive("foo").is_err());
        assert!(parse_char_directive("%41%42").is_err());
    }

    #[test]
    fn delimiter_flag_rejects_none() {
        assert!(parse_required_char("none").is_err());
        assert_eq!(parse_required_char("semicolon"), Ok(';'));
        assert_eq!(parse_optional_char("none"), Ok(CharDirective(None)));
    }

    #[test]
    fn args_parse_flags() {
        let args = Args::try_parse_from([
            "tabula",
            "map.toml",
            "a.csv",
            "b.csv",
            "-d",
            "semicolon",
            "--quotechar",
            "none",
            "-H",
            "--dedup",
            "0",
        ])
        .unwrap();
        assert_eq!(args.mapping, Some(PathBuf::from("map.toml")));
        assert_eq!(args.inputs, vec!["a.csv", "b.csv"]);
        assert_eq!(args.delimiter, Some(';'));
        assert_eq!(args.quote_char, Some(CharDirective(None)));
        assert_eq!(args.header(), Some(false));
        assert_eq!(args.dedup, Some(0));
    }

    #[test]
    fn args_reject_malformed_delimiter() {
        let err = Args::try_parse_from(["tabula", "map.toml", "--delimiter", "ab"]).unwrap_err();
        assert!(err.to_string().contains("--delimiter"), "{}", err);
    }

    #[test]
    fn args_stdin_conflicts_with_inputs() {
        assert!(Args::try_parse_from(["tabula", "map.toml", "a.csv", "--stdin"]).is_err());
        assert!(Args::try_parse_from(["tabula", "map.toml", "--stdin"]).is_ok());
    }

    #[test]
    fn mapping_not_required_for_generate_config() {
        let args = Args::try_parse_from(["tabula", "--generate-config"]).unwrap();
        assert!(args.mapping.is_none());
        assert!(Args::try_parse_from(["tabula"]).is_err());
    }

    #[test]
    fn options_markdown_lists_flags() {
        let md = render_options_markdown();
        assert!(md.contains("`-d, --delimiter <CHAR>`"));
        assert!(md.contains("`--ntriples`"));
        assert!(!md.contains("--help"));
    }
}
