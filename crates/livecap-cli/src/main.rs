use clap::Parser;
use livecap_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging needs the verbosity flag, so it starts right after parsing.
    if let Err(err) = logging::init_logging(cli.verbose) {
        logging::init_logging_stderr(cli.verbose);
        tracing::warn!("file logging unavailable ({:#}); logging to stderr", err);
    }

    match cli.run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("livecap error: {:#}", err);
            std::process::exit(1);
        }
    }
}
