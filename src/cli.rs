//! Command-line interface built on clap.
//!
//! [`Cli`] carries the subcommands ([`Command`]) and the global flags
//! (`--config`, `--verbose`).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::providers::ProviderId;

/// Multiscribe: transcribe audio with one or several speech-to-text providers.
#[derive(Debug, Parser)]
#[command(name = "multiscribe", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the TOML configuration file (default: ./multiscribe.toml).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Provider name accepted on the command line, mapped to [`ProviderId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderArg {
    Openai,
    Deepgram,
}

impl From<ProviderArg> for ProviderId {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Openai => ProviderId::OpenAi,
            ProviderArg::Deepgram => ProviderId::Deepgram,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API and the retention sweeper.
    Serve {
        /// Override the configured bind host.
        #[arg(long)]
        host: Option<String>,

        /// Override the configured port.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Transcribe a local audio file and wait for the result.
    Transcribe {
        /// Audio file to transcribe.
        file: PathBuf,

        /// Provider to use; repeat for a side-by-side comparison.
        /// Defaults to every configured provider.
        #[arg(long = "provider", short = 'p', value_enum)]
        providers: Vec<ProviderArg>,

        /// Language hint (e.g. "en"). Omit to let the provider detect it.
        #[arg(long, short)]
        language: Option<String>,

        /// Model override for OpenAI.
        #[arg(long)]
        openai_model: Option<String>,

        /// Model override for Deepgram.
        #[arg(long)]
        deepgram_model: Option<String>,

        /// Print the final job as JSON instead of a summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the known providers and whether they are configured.
    Providers,
}
