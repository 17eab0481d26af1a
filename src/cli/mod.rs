//! CLI module for moonhost
//!
//! Thin front-end over the function host: manage functions, environment
//! variables and executions, invoke functions and run retention.

mod args;
mod commands;
mod errors;
mod io;
pub mod logging;

pub use args::{Cli, Command, EnvAction, FunctionAction};
pub use commands::{run_command, Engine};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_event, write_error, write_response};

use crate::config::EngineConfig;

/// Parse arguments, run one command and print its response line
///
/// Errors are printed as an error response and returned.
pub async fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    logging::init(cli.log_json);

    let result = dispatch(cli).await;
    match &result {
        Ok(data) => write_response(data)?,
        Err(e) => write_error(e)?,
    }
    result.map(|_| ())
}

async fn dispatch(cli: Cli) -> CliResult<serde_json::Value> {
    let config = EngineConfig::load(cli.config.as_deref())?;
    let engine = Engine::open(config)?;
    run_command(&engine, cli.command).await
}
