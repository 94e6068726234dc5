use frameport_channel::new_handshake_token;
use serde::Serialize;

use crate::cmd::TokenArgs;
use crate::exit::{CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, print_table, OutputFormat};

const MAX_TOKENS: usize = 1000;

#[derive(Serialize)]
struct TokenOutput {
    schema_id: &'static str,
    tokens: Vec<String>,
}

pub fn run(args: TokenArgs, format: OutputFormat) -> CliResult<i32> {
    if args.count == 0 || args.count > MAX_TOKENS {
        return Err(CliError::new(
            USAGE,
            format!("--count must be between 1 and {MAX_TOKENS}"),
        ));
    }

    let tokens: Vec<String> = (0..args.count).map(|_| new_handshake_token()).collect();
    tracing::debug!(count = tokens.len(), "generated handshake tokens");

    match format {
        OutputFormat::Json => print_json(&TokenOutput {
            schema_id: "https://schemas.3leaps.dev/frameport/cli/v1/tokens.schema.json",
            tokens,
        }),
        OutputFormat::Table => print_table(
            &["#", "TOKEN"],
            tokens
                .into_iter()
                .enumerate()
                .map(|(i, token)| vec![(i + 1).to_string(), token])
                .collect(),
        ),
        OutputFormat::Pretty => {
            for token in tokens {
                println!("{token}");
            }
        }
    }
    Ok(SUCCESS)
}
