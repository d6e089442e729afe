use clap::Parser;
use color_eyre::Result;
use std::io::{self, BufWriter, Write};
use tabula::error_display::{user_message, user_message_from_io, user_message_from_report};
use tabula::{AppConfig, Args, ConfigManager, APP_NAME};
use tracing_subscriber::EnvFilter;

fn handle_early_exit_flags(args: &Args) -> Result<Option<()>> {
    if args.generate_config {
        let config_manager = ConfigManager::new(APP_NAME)?;
        match config_manager.write_default_config(args.force) {
            Ok(path) => {
                println!("Wrote default configuration to {}", path.display());
                return Ok(Some(()));
            }
            Err(e) => {
                eprintln!("Error writing config: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(None)
}

/// Logs go to stderr; stdout carries the triples.
fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(()) = handle_early_exit_flags(&args)? {
        return Ok(());
    }

    color_eyre::install()?;

    let config = match AppConfig::load(APP_NAME) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", user_message_from_report(&e));
            std::process::exit(1);
        }
    };
    init_tracing(args.debug || config.debug.enabled);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let result = tabula::run(&args, &config, &mut out);
    let flushed = out.flush();

    if let Err(e) = result {
        eprintln!("Error: {}", user_message(&e));
        std::process::exit(1);
    }
    if let Err(e) = flushed {
        // Downstream closed the pipe (e.g. `| head`); nothing left to report.
        if e.kind() != io::ErrorKind::BrokenPipe {
            eprintln!("Error: {}", user_message_from_io(&e, None));
            std::process::exit(1);
        }
    }
    Ok(())
}
