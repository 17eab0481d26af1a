//! moonhost CLI entry point
//!
//! Parsing, dispatch and response output live in the CLI module; this only
//! starts the runtime and turns a failure into a non-zero exit.

use moonhost::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run().await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
