mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;
use shadowbridge_bridge::Logger;

use crate::cmd::Command;
use crate::exit::{io_error, CliError};
use crate::logging::{build_dispatch, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "shadowbridge", version, about = "gRPC to legacy TCP/TLS bridge")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    let dispatch = build_dispatch(cli.log_format, cli.log_level);
    let logger = Logger::new(dispatch.clone());

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = tracing::dispatcher::with_default(&dispatch, || {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| io_error("failed to start runtime", err))
            .and_then(|runtime| runtime.block_on(cmd::run(cli.command, format, logger)))
    });

    match result {
        Ok(code) => std::process::exit(code),
        Err(CliError { code, message }) => {
            eprintln!("error: {message}");
            std::process::exit(code);
        }
    }
}
