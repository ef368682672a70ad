//! # CLI Interface
//!
//! Defines the command-line argument structure for `keymaster-ceremony`
//! using `clap` derive. One subcommand per ceremony step: `keygen`,
//! `issue`, `decrypt`, `recover`, plus `inspect` and `version`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Keymaster key-recovery ceremony tool.
///
/// Splits the keymaster signing secret across custodians, and puts it back
/// together once enough of them cooperate.
#[derive(Parser, Debug)]
#[command(
    name = "keymaster-ceremony",
    about = "Keymaster threshold key-recovery ceremonies",
    version,
    propagate_version = true
)]
pub struct KeymasterCeremonyCli {
    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = "KEYMASTER_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Default log filter when `RUST_LOG` is not set.
    #[arg(
        long,
        global = true,
        env = "KEYMASTER_LOG",
        default_value = "keymaster_ceremony=info,keymaster_recovery=info"
    )]
    pub log_level: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a custodian keypair: an armored public key to hand to the
    /// operator and a passphrase-protected private key to keep.
    Keygen(KeygenArgs),
    /// Run an issuance ceremony and write the recovery configuration.
    Issue(IssueArgs),
    /// Custodian side: open your sealed share from a recovery configuration.
    Decrypt(DecryptArgs),
    /// Feed share documents into a recovery session and combine them.
    Recover(RecoverArgs),
    /// Summarize a recovery configuration without touching any secrets.
    Inspect(InspectArgs),
    /// Print version information and exit.
    Version,
}

/// Passphrase protecting a custodian private key file.
#[derive(Args, Debug, Clone)]
pub struct PassphraseArg {
    /// Prefer the environment variable over the flag; flags end up in shell
    /// history.
    #[arg(long, env = "KEYMASTER_PASSPHRASE", hide_env_values = true)]
    pub passphrase: String,
}

/// Arguments for the `keygen` subcommand.
#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Custodian identity, e.g. an email address. Ends up in the share
    /// document's `keyIdentity`.
    #[arg(long, short = 'i')]
    pub identity: String,

    /// Directory to write `<identity>.pub.asc` and `<identity>.key.asc` into.
    #[arg(long, short = 'o', default_value = ".")]
    pub out_dir: PathBuf,

    #[command(flatten)]
    pub passphrase: PassphraseArg,
}

/// Arguments for the `issue` subcommand.
#[derive(Parser, Debug)]
pub struct IssueArgs {
    /// Number of shares required to recover (K).
    #[arg(long, short = 'k')]
    pub threshold: usize,

    /// Armored custodian public key files, one per share (N).
    #[arg(long = "recipient", short = 'r', required = true)]
    pub recipients: Vec<PathBuf>,

    /// Where to write the recovery configuration (pretty JSON).
    #[arg(long, short = 'o')]
    pub out: PathBuf,

    /// File holding the secret to split, as hex. A fresh 32-byte secret is
    /// generated when omitted.
    #[arg(long)]
    pub secret_file: Option<PathBuf>,

    /// Write the generated secret (hex) here. Required unless
    /// `--secret-file` is given, so a generated secret is never discarded.
    #[arg(long, conflicts_with = "secret_file", required_unless_present = "secret_file")]
    pub emit_secret: Option<PathBuf>,

    /// Leave the secret check out of the configuration. Use for
    /// low-entropy secrets.
    #[arg(long)]
    pub no_secret_check: bool,
}

/// Arguments for the `decrypt` subcommand.
#[derive(Parser, Debug)]
pub struct DecryptArgs {
    /// Recovery configuration holding the sealed shares.
    #[arg(long, short = 'c')]
    pub config: PathBuf,

    /// Your passphrase-protected private key file.
    #[arg(long, short = 'K')]
    pub key: PathBuf,

    /// Where to write your share document. Submit this file unchanged.
    #[arg(long, short = 'o')]
    pub out: PathBuf,

    #[command(flatten)]
    pub passphrase: PassphraseArg,
}

/// Arguments for the `recover` subcommand.
#[derive(Parser, Debug)]
pub struct RecoverArgs {
    /// Recovery configuration to validate shares against.
    #[arg(long, short = 'c')]
    pub config: PathBuf,

    /// Share document files submitted by custodians.
    #[arg(long = "share", short = 's', required = true)]
    pub shares: Vec<PathBuf>,

    /// Write the recovered secret (hex) here instead of stdout.
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,
}

/// Arguments for the `inspect` subcommand.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Recovery configuration to summarize.
    #[arg(long, short = 'c')]
    pub config: PathBuf,
}
