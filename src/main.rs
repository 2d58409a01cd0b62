//! paper-scout command-line entry point.

use std::io::Write;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use paper_scout::cli::{Cli, execute};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = execute(&cli)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

/// `PAPER_SCOUT_LOG` wins; otherwise `--verbose` selects debug.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env("PAPER_SCOUT_LOG").unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("paper_scout=debug")
        } else {
            EnvFilter::new("paper_scout=info")
        }
    });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}
