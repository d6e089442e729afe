//! User-facing error message formatting.
//!
//! Uses typed error matching (TabulaError variants, io::ErrorKind) rather than
//! string parsing to produce short, actionable messages.

use crate::error::TabulaError;
use std::io;

/// Format a TabulaError as a one-line message by matching on its variant.
pub fn user_message(err: &TabulaError) -> String {
    match err {
        TabulaError::NotFound(what) => format!("Not found: {}. Check the path or URL.", what),
        TabulaError::MalformedOption {
            option,
            value,
            reason,
        } => format!("Invalid value '{}' for {}: {}", value, option, reason),
        TabulaError::MultiPassUnsupported(name) => format!(
            "{} can only be read once, but the mapping needs another pass over it. \
             Read from a file instead.",
            name
        ),
        TabulaError::Io { context, source } => {
            user_message_from_io(source, Some(context.as_str()))
        }
        TabulaError::Mapping { location, message } => {
            format!("Mapping error in {}: {}", location, message)
        }
        TabulaError::Config(msg) => format!("Configuration error: {}", msg),
    }
}

/// Format an io::Error as a user-facing message by matching on ErrorKind.
pub fn user_message_from_io(err: &io::Error, context: Option<&str>) -> String {
    use std::io::ErrorKind;

    let base: String = match err.kind() {
        ErrorKind::NotFound => "File or directory not found.".to_string(),
        ErrorKind::PermissionDenied => "Permission denied. Check read access.".to_string(),
        ErrorKind::InvalidData | ErrorKind::InvalidInput => {
            "Invalid or corrupted data.".to_string()
        }
        ErrorKind::UnexpectedEof => "Unexpected end of file.".to_string(),
        ErrorKind::BrokenPipe => "Output closed before all data was written.".to_string(),
        ErrorKind::Interrupted => "Operation interrupted.".to_string(),
        ErrorKind::OutOfMemory => "Out of memory.".to_string(),
        ErrorKind::Other => {
            let msg = err.to_string();
            if msg.contains("No space left") {
                return "No space left on device. Free up disk space and try again.".to_string();
            }
            if msg.contains("Is a directory") {
                return "Path is a directory, not a file.".to_string();
            }
            return match context {
                Some(ctx) => format!("I/O error on {}: {}", ctx, msg),
                None => msg,
            };
        }
        _ => err.to_string(),
    };

    match context {
        Some(ctx) if !ctx.is_empty() => format!("{} ({})", base, ctx),
        _ => base,
    }
}

/// Format a color_eyre Report by downcasting to known error types.
/// Walks the cause chain to find a TabulaError or io::Error.
pub fn user_message_from_report(report: &color_eyre::eyre::Report) -> String {
    for cause in report.chain() {
        if let Some(err) = cause.downcast_ref::<TabulaError>() {
            return user_message(err);
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return user_message_from_io(io_err, None);
        }
    }

    // Fallback: use first line of display to avoid long tracebacks
    let display = report.to_string();
    display
        .lines()
        .next()
        .map(str::trim)
        .unwrap_or("An error occurred")
        .to_string()
}
