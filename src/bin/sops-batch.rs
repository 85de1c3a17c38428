//! sops-batch CLI - batch encryption of secret files with sops
//!
//! Plaintext secrets are named `*-secret.<ext>` and their encrypted
//! counterparts `*-secret.enc.<ext>`; both live side by side in the tree.

use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use tracing_subscriber::EnvFilter;

use sops_batch::batch::BatchOrchestrator;
use sops_batch::config::Config;
use sops_batch::crypto::SopsTransform;
use sops_batch::file_ops;
use sops_batch::{Error, ErrorCategory, ErrorKind};

#[derive(Parser)]
#[command(name = "sops-batch")]
#[command(version)]
#[command(
    about = "Encrypt and decrypt secret files in bulk with sops.",
    after_help = "Configuration is read from FILE_PATTERNS, SECRET_SUFFIX, ENCRYPTED_INFIX, \
                  IGNORE_PATTERNS, SEARCH_TOOL, FD_OPTIONS, FIND_OPTIONS, SOPS_BINARY and \
                  SOPS_OPTIONS. Run `sops-batch show-config` to see the active values."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt every plaintext secret under a directory
    #[command(alias = "ea")]
    EncryptAll {
        /// Re-encrypt even when the encrypted file is up to date
        #[arg(short, long)]
        force: bool,

        /// Directory to search (defaults to the current directory)
        #[arg(value_name = "DIRECTORY")]
        directory: Option<PathBuf>,
    },

    /// Decrypt every encrypted file under a directory
    #[command(alias = "da")]
    DecryptAll {
        /// Directory to search (defaults to the current directory)
        #[arg(value_name = "DIRECTORY")]
        directory: Option<PathBuf>,
    },

    /// Encrypt a single file
    #[command(alias = "e")]
    Encrypt {
        /// Re-encrypt even when the encrypted file is up to date
        #[arg(short, long)]
        force: bool,

        /// Path to the plaintext file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Decrypt a single file
    #[command(alias = "d")]
    Decrypt {
        /// Path to the encrypted file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the active configuration and usage
    ShowConfig,
}

fn main() {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => fail(&e),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Commands::ShowConfig = cli.command {
        let written = write!(out, "{}\n{}\n", config.describe(), Cli::command().render_long_help())
            .and_then(|()| out.flush());
        if let Err(e) = written {
            fail(&Error::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to write configuration",
                e,
            ));
        }
        return;
    }

    let sops = SopsTransform::from_config(&config);
    if let Err(e) = sops.check_available() {
        fail(&e.with_context("sops is required but not available"));
    }

    let result = match cli.command {
        Commands::EncryptAll { force, directory } => BatchOrchestrator::new(&config, &sops)
            .encrypt_all(directory.as_deref(), force, &mut out)
            .map(|_| ()),
        Commands::DecryptAll { directory } => BatchOrchestrator::new(&config, &sops)
            .decrypt_all(directory.as_deref(), &mut out)
            .map(|_| ()),
        Commands::Encrypt { force, file } => {
            file_ops::encrypt_one(&config, &sops, &file, force, &mut out).map(|_| ())
        }
        Commands::Decrypt { file } => {
            file_ops::decrypt_one(&config, &sops, &file, &mut out).map(|_| ())
        }
        Commands::ShowConfig => Ok(()),
    };

    if let Err(e) = result {
        let _ = out.flush();
        fail(&e);
    }
}

fn fail(e: &Error) -> ! {
    eprintln!("Error: {}", e.chain_message());
    process::exit(1);
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}
