use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod demo;
pub mod inspect;
pub mod token;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate handshake tokens.
    Token(TokenArgs),
    /// Decode one wire payload and describe it.
    Inspect(InspectArgs),
    /// Run an in-memory host/extension session.
    Demo(DemoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Token(args) => token::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Demo(args) => demo::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Number of tokens to generate.
    #[arg(long, short = 'n', default_value = "1")]
    pub count: usize,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Payload text.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub data: Option<String>,
    /// Read the payload from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Run the extension in a sandboxed frame (origin "null").
    #[arg(long)]
    pub sandboxed: bool,
    /// Extension name sent in the initial handshake.
    #[arg(long, default_value = "sample-extension")]
    pub name: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
