//! Map delimited text files of unknown encoding and structure to RDF.
//!
//! The pipeline is pull-based: a [`table::Table`] opens its input once per
//! pass, each pass decodes bytes to characters ([`decode`]), splits them
//! into rows ([`tokenizer`]) and binds rows to column names ([`record`]).
//! The [`engine`] evaluates mapping queries over those records and the
//! resulting triples flow through a [`dedup::DedupWindow`] into an
//! [`rdf::TripleSink`].

use std::io::{self, Write};
use tracing::{debug, info};

pub mod columns;
pub mod config;
pub mod decode;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod error_display;
pub mod functions;
pub mod mapping;
pub mod options;
pub mod rdf;
pub mod record;
pub mod source;
pub mod table;
pub mod tokenizer;

pub use config::{AppConfig, ConfigManager};
pub use dedup::DedupWindow;
pub use engine::{Engine, RunSummary};
pub use error::{Result, TabulaError};
pub use functions::FunctionRegistry;
pub use mapping::Mapping;
pub use options::ParseOptions;
pub use table::Table;
pub use tabula_cli::{Args, CompressionFormat};

use options::{couple_header_to_offset, parse_locator, resolve};
use rdf::{NTriplesWriter, Triple, TripleSink, TurtleWriter};
use source::{decompress, expand_locator, open_locator, SingleUseSource};

pub const APP_NAME: &str = "tabula";

impl From<&Args> for ParseOptions {
    fn from(args: &Args) -> Self {
        let mut opts = ParseOptions::new();
        if let Some(encoding) = &args.encoding {
            opts = opts.with_encoding(encoding.clone());
        }
        if let Some(header) = args.header() {
            opts = opts.with_header(header);
        }
        if let Some(delimiter) = args.delimiter {
            opts = opts.with_delimiter(delimiter);
        }
        if let Some(quote) = args.quote_char {
            opts = opts.with_quote(quote.0);
        }
        if let Some(escape) = args.escape_char {
            opts = opts.with_escape(escape.0);
        }
        opts
    }
}

/// Invocation-wide options: command-line flags, falling back field by
/// field to the config file's `[input]` section.
pub fn invocation_options(args: &Args, config: &AppConfig) -> Result<ParseOptions> {
    let mut options = config.input.parse_options()?;
    options.override_with(&ParseOptions::from(args));
    Ok(options)
}

/// Where one table's data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Stdin,
    Locator(String),
}

impl Input {
    fn name(&self) -> &str {
        match self {
            Input::Stdin => "standard input",
            Input::Locator(locator) => locator,
        }
    }
}

/// Inputs named on the command line, or else the single `from` locator
/// of the mapping's first query.
pub fn select_inputs(args: &Args, mapping: &Mapping) -> Result<Vec<Input>> {
    if args.stdin {
        return Ok(vec![Input::Stdin]);
    }
    if !args.inputs.is_empty() {
        let mut inputs = Vec::new();
        for locator in &args.inputs {
            inputs.extend(expand_locator(locator)?.into_iter().map(Input::Locator));
        }
        return Ok(inputs);
    }
    match mapping.first_from() {
        [] => Err(TabulaError::mapping(mapping.name(), "No input file provided")),
        [one] => Ok(expand_locator(one)?.into_iter().map(Input::Locator).collect()),
        _ => Err(TabulaError::mapping(mapping.name(), "Too many input files")),
    }
}

/// Build the table for one input, settling header presence against the
/// first query's offset.
fn open_table(
    input: &Input,
    mapping: &mut Mapping,
    invocation: &ParseOptions,
    args: &Args,
) -> Result<Table> {
    let locator = match input {
        Input::Stdin => parse_locator(""),
        Input::Locator(text) => parse_locator(text),
    };
    let mut options = resolve(&locator, invocation, args.tabs);
    if let Some(offset) = mapping.first_offset_mut() {
        couple_header_to_offset(&mut options, offset);
    }
    debug!(input = input.name(), options = ?options, "resolved parse options");
    if !locator.remainder.is_empty() {
        debug!(input = input.name(), remainder = %locator.remainder, "uninterpreted fragment");
    }

    let source: Box<dyn source::InputSource> = match input {
        Input::Stdin => {
            let stream = decompress(Box::new(io::stdin()), args.compression, "standard input")?;
            Box::new(SingleUseSource::new("standard input", stream))
        }
        Input::Locator(_) => open_locator(&locator.address, args.compression)?,
    };
    Ok(Table::new(source, &options))
}

/// Map every input with every query of the mapping and write the triples
/// to `out`. With `--test`, write a preview instead.
pub fn run(args: &Args, config: &AppConfig, out: &mut dyn Write) -> Result<RunSummary> {
    let mapping_path = args
        .mapping
        .as_deref()
        .ok_or_else(|| TabulaError::Config("no mapping file given".to_string()))?;
    let mut mapping = Mapping::load(mapping_path)?;
    if let Some(base) = &args.base {
        mapping.base = Some(base.clone());
    }

    let registry = FunctionRegistry::with_builtins();
    let engine = Engine::new(&mapping, &registry)?;
    let invocation = invocation_options(args, config)?;
    let inputs = select_inputs(args, &mapping)?;

    if args.test {
        for input in &inputs {
            let mut per_input = mapping.clone();
            let mut table = open_table(input, &mut per_input, &invocation, args)?;
            for (i, query) in per_input.queries.iter().enumerate() {
                engine.preview(i + 1, query, &mut table, out)?;
            }
            table.close();
        }
        return Ok(RunSummary::new());
    }

    let ntriples = args.ntriples || config.output.ntriples;
    let write_base = args.write_base || config.output.write_base;
    let mut sink: Box<dyn TripleSink + '_> = if ntriples {
        Box::new(NTriplesWriter::new(&mut *out))
    } else {
        Box::new(
            TurtleWriter::new(&mut *out, mapping.prefixes.clone())
                .with_base(mapping.base.clone(), write_base),
        )
    };
    let mut window: DedupWindow<Triple> =
        DedupWindow::new(args.dedup.unwrap_or(config.output.dedup_window));

    sink.start()?;
    let mut summary = RunSummary::new();
    for input in &inputs {
        let mut per_input = mapping.clone();
        let mut table = open_table(input, &mut per_input, &invocation, args)?;
        summary = summary.begin_input(table.name());
        let mut emit = |batch: Vec<Triple>| -> Result<()> {
            for triple in window.filter(batch) {
                sink.triple(&triple)?;
            }
            Ok(())
        };
        for query in &per_input.queries {
            summary = engine.run_query(query, &mut table, summary, &mut emit)?;
        }
        table.close();
    }
    sink.finish()?;

    info!(
        inputs = summary.inputs.len(),
        records = summary.records,
        triples = summary.triples,
        "run finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("tabula").chain(argv.iter().copied())).unwrap()
    }

    fn mapping(text: &str) -> Mapping {
        Mapping::parse(text, "m.toml").unwrap()
    }

    #[test]
    fn args_to_parse_options() {
        let a = args(&["m.toml", "-d", ";", "--quotechar", "none", "-H", "-e", "latin1"]);
        let opts = ParseOptions::from(&a);
        assert_eq!(opts.delimiter, Some(';'));
        assert_eq!(opts.quote, Some(None));
        assert_eq!(opts.escape, None);
        assert_eq!(opts.header, Some(false));
        assert_eq!(opts.encoding.as_deref(), Some("latin1"));
    }

    #[test]
    fn command_line_overrides_config_field_by_field() {
        let mut config = AppConfig::default();
        config.input.delimiter = Some("semicolon".to_string());
        config.input.has_header = Some(true);
        let opts = invocation_options(&args(&["m.toml", "-H"]), &config).unwrap();
        assert_eq!(opts.delimiter, Some(';'));
        assert_eq!(opts.header, Some(false));
    }

    #[test]
    fn inputs_from_first_query() {
        let m = mapping("[[query]]\nfrom = [\"a.csv\"]\nconstruct = [\"_:x <http://e/p> ?v\"]");
        assert_eq!(
            select_inputs(&args(&["m.toml"]), &m).unwrap(),
            vec![Input::Locator("a.csv".to_string())]
        );
        assert_eq!(
            select_inputs(&args(&["m.toml", "b.csv"]), &m).unwrap(),
            vec![Input::Locator("b.csv".to_string())]
        );
        assert_eq!(
            select_inputs(&args(&["m.toml", "--stdin"]), &m).unwrap(),
            vec![Input::Stdin]
        );
    }

    #[test]
    fn input_count_errors() {
        let none = mapping("[[query]]\nconstruct = [\"_:x <http://e/p> ?v\"]");
        let err = select_inputs(&args(&["m.toml"]), &none).unwrap_err();
        assert!(err.to_string().contains("No input file provided"));

        let many = mapping(
            "[[query]]\nfrom = [\"a.csv\", \"b.csv\"]\nconstruct = [\"_:x <http://e/p> ?v\"]",
        );
        let err = select_inputs(&args(&["m.toml"]), &many).unwrap_err();
        assert!(err.to_string().contains("Too many input files"));
    }
}
