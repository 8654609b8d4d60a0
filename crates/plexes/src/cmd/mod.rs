use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod demo;
pub mod relay;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a two-duplex conversation and report how both sides stopped.
    Demo(DemoArgs),
    /// Relay stdin lines to stdout through a full duplex loopback.
    Relay(RelayArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Demo(args) => demo::run(args, format),
        Command::Relay(args) => relay::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Let each direction close on its own (full duplex).
    #[arg(long)]
    pub independent: bool,
    /// Message sent from `a` to `b` (repeatable); `b` echoes each one back.
    #[arg(long = "message", short = 'm', default_value = "hello")]
    pub messages: Vec<String>,
    /// End the conversation with an error instead of a close.
    #[arg(long)]
    pub fail: bool,
    /// Maximum time for the conversation to settle (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct RelayArgs {
    /// Fail the relay once this many lines went through.
    #[arg(long, value_name = "N")]
    pub fail_after: Option<usize>,
    /// Longest accepted input line, in bytes.
    #[arg(long, default_value_t = 64 * 1024)]
    pub max_line_length: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };
    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
