use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod get;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and echo every stream back to its sender.
    Serve(ServeArgs),
    /// Open one stream, send a request and print the response.
    Get(GetArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Get(args) => get::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (e.g. 127.0.0.1:8443).
    pub addr: String,
    /// Exit after the first connection ends.
    #[arg(long)]
    pub once: bool,
    /// Print the bound address on stdout once listening.
    #[arg(long)]
    pub print_addr: bool,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Address to connect to.
    pub addr: String,
    /// Request path.
    #[arg(long, default_value = "/")]
    pub path: String,
    /// Request method.
    #[arg(long, default_value = "GET")]
    pub method: String,
    /// Extra request header as NAME=VALUE. Repeatable.
    #[arg(long, short = 'H', value_name = "NAME=VALUE")]
    pub header: Vec<String>,
    /// Request body.
    #[arg(long, conflicts_with = "lines")]
    pub data: Option<String>,
    /// Send each line of stdin as its own data frame.
    #[arg(long, conflicts_with = "data")]
    pub lines: bool,
    /// Connect and response timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
