use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tapkit_card::SessionConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod formatters;

use commands::Context;
use formatters::FormatMode;

#[derive(Parser)]
#[command(name = "tapkit")]
#[command(about = "Contactless card toolkit - EMV discovery, MIFARE Classic analysis, card emulation")]
#[command(version)]
struct Args {
    /// Session configuration (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Reader name; the first reader is used when omitted
    #[arg(long, global = true)]
    reader: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List PC/SC readers
    Readers,

    /// Discover the payment application and read its records
    Emv {
        /// Output format mode
        #[arg(short, long, value_enum, default_value_t = FormatMode::Raw)]
        format: FormatMode,
        /// Print the discovery report as JSON
        #[arg(long)]
        json: bool,
        /// Append the report to a JSON lines file
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Dump every TLV object the card returned
    Dump,

    /// Authenticate and read every MIFARE Classic sector (read-only)
    Mifare {
        /// Key file, one hex key per line
        #[arg(long)]
        keys: Option<PathBuf>,
        /// Extra key as hex (repeatable)
        #[arg(long = "key")]
        key: Vec<String>,
        /// Print the scan report as JSON
        #[arg(long)]
        json: bool,
        /// Append the report to a JSON lines file
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Decode the access bits of a sector trailer
    Access {
        /// 16-byte sector trailer as hex
        trailer: String,
        /// Trailer of a 16-block sector (4K sectors 32-39)
        #[arg(long)]
        large_sector: bool,
    },

    /// Describe an ISO 7816-4 status word
    Status {
        /// Status word as hex, e.g. 6A82
        sw: String,
    },

    /// Run the emulation responder over scripted command APDUs
    Emulate {
        /// Answer SELECT for any AID
        #[arg(long)]
        global: bool,
        /// Command APDUs as hex, processed in order
        #[arg(required = true)]
        apdus: Vec<String>,
    },
}

fn run(args: Args) -> tapkit_card::Result<()> {
    let config = match &args.config {
        Some(path) => SessionConfig::from_file(path)?,
        None => SessionConfig::default(),
    };
    let ctx = Context {
        config,
        reader: args.reader,
    };

    match args.command {
        Command::Readers => commands::readers::cmd_readers(&ctx),
        Command::Emv { format, json, save } => commands::emv::cmd_emv(&ctx, format, json, save),
        Command::Dump => commands::dump::cmd_dump(&ctx),
        Command::Mifare {
            keys,
            key,
            json,
            save,
        } => commands::mifare::cmd_mifare(&ctx, keys, &key, json, save),
        Command::Access {
            trailer,
            large_sector,
        } => commands::access::cmd_access(&trailer, large_sector),
        Command::Status { sw } => commands::status::cmd_status(&sw),
        Command::Emulate { global, apdus } => commands::emulate::cmd_emulate(&ctx, global, &apdus),
    }
}

fn main() -> ExitCode {
    // Set RUST_LOG=debug for protocol steps, RUST_LOG=trace for raw frames.
    // Logs go to stderr so --json output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_mifare_keys() {
        let args = Args::try_parse_from([
            "tapkit", "--reader", "ACR122", "mifare", "--key", "A0A1A2A3A4A5", "--key", "B0B1B2B3B4B5",
        ])
        .unwrap();
        assert_eq!(args.reader.as_deref(), Some("ACR122"));
        match args.command {
            Command::Mifare { key, json, .. } => {
                assert_eq!(key.len(), 2);
                assert!(!json);
            }
            _ => panic!("expected mifare"),
        }
    }

    #[test]
    fn test_emulate_requires_apdus() {
        assert!(Args::try_parse_from(["tapkit", "emulate"]).is_err());
    }
}
