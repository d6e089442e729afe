use crate::dedup::DEFAULT_WINDOW;
use crate::error::TabulaError;
use crate::options::ParseOptions;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Manages config directory and config file operations
#[derive(Clone)]
pub struct ConfigManager {
    pub(crate) config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager with a custom config directory (primarily for testing)
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Create a new ConfigManager for the given app name
    pub fn new(app_name: &str) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre!("Could not determine config directory"))?
            .join(app_name);

        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get path to a specific config file
    pub fn config_path(&self, path: &str) -> PathBuf {
        self.config_dir.join(path)
    }

    /// Ensure the config directory exists
    pub fn ensure_config_dir(&self) -> Result<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Generate default configuration template as a string with comments.
    /// All fields are commented out so defaults are used, but users can uncomment to override
    pub fn generate_default_config(&self) -> Result<String> {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| eyre!("Failed to serialize default config: {}", e))?;

        let comments = Self::collect_all_comments();
        Ok(Self::comment_all_fields(toml_str, comments))
    }

    /// Collect all field comments from struct constants into a map
    fn collect_all_comments() -> HashMap<String, String> {
        let mut comments = HashMap::new();

        for (field, comment) in APP_COMMENTS {
            comments.insert(field.to_string(), comment.to_string());
        }
        for (field, comment) in INPUT_COMMENTS {
            comments.insert(format!("input.{}", field), comment.to_string());
        }
        for (field, comment) in OUTPUT_COMMENTS {
            comments.insert(format!("output.{}", field), comment.to_string());
        }
        for (field, comment) in DEBUG_COMMENTS {
            comments.insert(format!("debug.{}", field), comment.to_string());
        }

        comments
    }

    /// Comment out all fields in TOML and add comments.
    /// Also adds missing Option fields as commented-out `# field = ...` lines
    fn comment_all_fields(toml: String, comments: HashMap<String, String>) -> String {
        let mut result = String::new();
        result.push_str("# tabula configuration file\n");
        result
            .push_str("# This file uses TOML format. See https://toml.io/ for syntax reference.\n");
        result.push_str("# Command-line flags override every setting below.\n");
        result.push('\n');

        let mut current_section = String::new();
        let mut seen_fields: HashSet<String> = HashSet::new();

        for line in toml.lines() {
            if let Some(section) = Self::extract_section_name(line) {
                current_section = section.clone();

                if let Some(header) = SECTION_HEADERS.iter().find(|(s, _)| s == &section) {
                    result.push_str(header.1);
                    result.push('\n');
                }

                result.push_str("# ");
                result.push_str(line);
                result.push('\n');
                continue;
            }

            if let Some(field_path) = Self::extract_field_path(line, &current_section) {
                if let Some(comment) = comments.get(&field_path) {
                    for comment_line in comment.lines() {
                        result.push_str("# ");
                        result.push_str(comment_line);
                        result.push('\n');
                    }
                }
                seen_fields.insert(field_path);

                result.push_str("# ");
                result.push_str(line);
                result.push('\n');
            } else {
                result.push_str(line);
                result.push('\n');
            }
        }

        Self::add_missing_option_fields(result, &comments, &seen_fields)
    }

    /// Add Option fields that were not serialized because they are None
    fn add_missing_option_fields(
        mut result: String,
        comments: &HashMap<String, String>,
        seen_fields: &HashSet<String>,
    ) -> String {
        // (field path, example value)
        let option_fields = [
            ("input.delimiter", "\",\""),
            ("input.quote_char", "\"doublequote\""),
            ("input.escape_char", "\"backslash\""),
            ("input.encoding", "\"utf-8\""),
            ("input.has_header", "true"),
        ];

        let mut missing_by_section: Vec<(&str, Vec<(&str, &str)>)> = Vec::new();
        for (field_path, example) in option_fields {
            if seen_fields.contains(field_path) || !comments.contains_key(field_path) {
                continue;
            }
            if let Some((section, _)) = field_path.split_once('.') {
                match missing_by_section.iter_mut().find(|(s, _)| *s == section) {
                    Some((_, fields)) => fields.push((field_path, example)),
                    None => missing_by_section.push((section, vec![(field_path, example)])),
                }
            }
        }

        for (section, fields) in &missing_by_section {
            let section_header = format!("[{}]", section);
            let insert_pos = match result.find(&section_header) {
                Some(section_pos) => {
                    let after_header_start = section_pos + section_header.len();
                    let newline_pos = result[after_header_start..].find('\n').unwrap_or(0);
                    after_header_start + newline_pos + 1
                }
                None => {
                    // A section whose fields are all None may not be serialized at all
                    result.push('\n');
                    if let Some(header) = SECTION_HEADERS.iter().find(|(s, _)| s == section) {
                        result.push_str(header.1);
                        result.push('\n');
                    }
                    result.push_str(&format!("# {}\n", section_header));
                    result.len()
                }
            };

            let mut new_content = String::new();
            for (field_path, example) in fields {
                if let Some(comment) = comments.get(*field_path) {
                    for comment_line in comment.lines() {
                        new_content.push_str("# ");
                        new_content.push_str(comment_line);
                        new_content.push('\n');
                    }
                }
                let field_name = field_path.rsplit('.').next().unwrap_or(field_path);
                new_content.push_str(&format!("# {} = {}\n", field_name, example));
                new_content.push('\n');
            }

            result.insert_str(insert_pos, &new_content);
        }

        result
    }

    /// Extract section name from a TOML line like "[input]"
    fn extract_section_name(line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            Some(trimmed[1..trimmed.len() - 1].to_string())
        } else {
            None
        }
    }

    fn extract_field_path(line: &str, current_section: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('[') {
            return None;
        }

        let (field_name, _) = trimmed.split_once('=')?;
        let field_name = field_name.trim();
        if current_section.is_empty() {
            Some(field_name.to_string())
        } else {
            Some(format!("{}.{}", current_section, field_name))
        }
    }

    /// Write default configuration to config file
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let config_path = self.config_path("config.toml");

        if config_path.exists() && !force {
            return Err(eyre!(
                "Config file already exists at {}. Use --force to overwrite.",
                config_path.display()
            ));
        }

        self.ensure_config_dir()?;

        let template = self.generate_default_config()?;
        std::fs::write(&config_path, template)?;

        Ok(config_path)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration format version (for future compatibility)
    pub version: String,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub debug: DebugConfig,
}

// Field comments for AppConfig (top-level fields)
const APP_COMMENTS: &[(&str, &str)] = &[(
    "version",
    "Configuration format version (for future compatibility)",
)];

// Section header comments
const SECTION_HEADERS: &[(&str, &str)] = &[
    (
        "input",
        "# ============================================================================\n# Input Parsing Defaults\n# ============================================================================\n# Used when neither the command line nor an input's #fragment sets a value.\n# Characters may be written literally, as %XX, or by name:\n#   tab, comma, semicolon, singlequote, doublequote, backslash, none",
    ),
    (
        "output",
        "# ============================================================================\n# Output\n# ============================================================================",
    ),
    (
        "debug",
        "# ============================================================================\n# Debug Settings\n# ============================================================================",
    ),
];

/// Invocation-wide parsing defaults. Every field is optional so that the
/// file's dialect and fragment settings still apply when unset.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    pub delimiter: Option<String>,
    pub quote_char: Option<String>,
    pub escape_char: Option<String>,
    pub encoding: Option<String>,
    pub has_header: Option<bool>,
}

// Field comments for InputConfig
// Format: (field_name, comment_text)
const INPUT_COMMENTS: &[(&str, &str)] = &[
    (
        "delimiter",
        "Field delimiter\nIf not specified, taken from the file extension (.csv, .tsv)",
    ),
    (
        "quote_char",
        "Quote character, or \"none\" to disable quoting",
    ),
    (
        "escape_char",
        "Escape character inside quoted fields, or \"none\"",
    ),
    (
        "encoding",
        "Character encoding of input files\nIf not specified, it is detected from the data",
    ),
    (
        "has_header",
        "Whether the first non-empty row holds column names",
    ),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub dedup_window: usize,
    pub ntriples: bool,
    pub write_base: bool,
}

const OUTPUT_COMMENTS: &[(&str, &str)] = &[
    (
        "dedup_window",
        "Number of recent triples remembered to suppress repeats (0 disables)",
    ),
    (
        "ntriples",
        "Write N-Triples instead of Turtle",
    ),
    ("write_base", "Write an @base directive in Turtle output"),
];

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
}

const DEBUG_COMMENTS: &[(&str, &str)] = &[(
    "enabled",
    "Log at debug level (RUST_LOG takes precedence when set)",
)];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            input: InputConfig::default(),
            output: OutputConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dedup_window: DEFAULT_WINDOW,
            ntriples: false,
            write_base: false,
        }
    }
}

// Configuration loading and merging
impl AppConfig {
    /// Load configuration from all layers (default → user)
    pub fn load(app_name: &str) -> Result<Self> {
        Self::load_with(&ConfigManager::new(app_name)?)
    }

    /// Load from the directory managed by `manager`
    pub fn load_with(manager: &ConfigManager) -> Result<Self> {
        let mut config = AppConfig::default();
        let config_path = manager.config_path("config.toml");

        if let Some(user_config) = Self::load_user_config(&config_path)? {
            config.merge(user_config);
        }

        config.validate().map_err(|e| {
            eyre!(
                "Invalid configuration in {}: {}",
                config_path.display(),
                e
            )
        })?;

        Ok(config)
    }

    fn load_user_config(config_path: &Path) -> Result<Option<AppConfig>> {
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|e| {
            eyre!(
                "Failed to read config file at {}: {}",
                config_path.display(),
                e
            )
        })?;

        toml::from_str(&content).map(Some).map_err(|e| {
            eyre!(
                "Failed to parse config file at {}: {}",
                config_path.display(),
                e
            )
        })
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: AppConfig) {
        if other.version != AppConfig::default().version {
            self.version = other.version;
        }

        self.input.merge(other.input);
        self.output.merge(other.output);
        self.debug.merge(other.debug);
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.version.starts_with("0.1") {
            return Err(eyre!(
                "Unsupported config version: {}. Expected 0.1.x",
                self.version
            ));
        }

        self.input.parse_options().map_err(|e| eyre!("{}", e))?;

        Ok(())
    }
}

impl InputConfig {
    pub fn merge(&mut self, other: Self) {
        if other.delimiter.is_some() {
            self.delimiter = other.delimiter;
        }
        if other.quote_char.is_some() {
            self.quote_char = other.quote_char;
        }
        if other.escape_char.is_some() {
            self.escape_char = other.escape_char;
        }
        if other.encoding.is_some() {
            self.encoding = other.encoding;
        }
        if other.has_header.is_some() {
            self.has_header = other.has_header;
        }
    }

    /// The `[input]` section as parse options, leaving unset fields unset.
    pub fn parse_options(&self) -> std::result::Result<ParseOptions, TabulaError> {
        let mut options = ParseOptions::new();
        if let Some(value) = &self.delimiter {
            match parse_char("input.delimiter", value)? {
                Some(c) => options.delimiter = Some(c),
                None => {
                    return Err(TabulaError::MalformedOption {
                        option: "input.delimiter".to_string(),
                        value: value.clone(),
                        reason: "a delimiter is required".to_string(),
                    })
                }
            }
        }
        if let Some(value) = &self.quote_char {
            options.quote = Some(parse_char("input.quote_char", value)?);
        }
        if let Some(value) = &self.escape_char {
            options.escape = Some(parse_char("input.escape_char", value)?);
        }
        options.encoding = self.encoding.clone();
        options.header = self.has_header;
        Ok(options)
    }
}

fn parse_char(option: &str, value: &str) -> std::result::Result<Option<char>, TabulaError> {
    tabula_cli::parse_char_directive(value).map_err(|reason| TabulaError::MalformedOption {
        option: option.to_string(),
        value: value.to_string(),
        reason,
    })
}

impl OutputConfig {
    pub fn merge(&mut self, other: Self) {
        let default = OutputConfig::default();
        if other.dedup_window != default.dedup_window {
            self.dedup_window = other.dedup_window;
        }
        if other.ntriples != default.ntriples {
            self.ntriples = other.ntriples;
        }
        if other.write_base != default.write_base {
            self.write_base = other.write_base;
        }
    }
}

impl DebugConfig {
    pub fn merge(&mut self, other: Self) {
        let default = DebugConfig::default();
        if other.enabled != default.enabled {
            self.enabled = other.enabled;
        }
    }
}
