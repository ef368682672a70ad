// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Keymaster Ceremony Tool
//!
//! Entry point for the `keymaster-ceremony` binary. Parses CLI arguments,
//! initializes logging, and runs one ceremony step.
//!
//! - `keygen`: create a custodian keypair
//! - `issue`: split the secret and write the recovery configuration
//! - `decrypt`: open a custodian's sealed share
//! - `recover`: combine submitted shares
//! - `inspect`: summarize a recovery configuration
//! - `version`: print build version information

mod cli;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;
use zeroize::Zeroizing;

use cli::{Commands, KeymasterCeremonyCli};
use logging::LogFormat;

fn main() -> Result<()> {
    let cli = KeymasterCeremonyCli::parse();

    match cli.command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        command => {
            logging::init_logging(&cli.log_level, LogFormat::from_str_lossy(&cli.log_format));
            run(command)
        }
    }
}

/// Runs one ceremony step and reports the result on stdout.
fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Keygen(args) => {
            let out = commands::keygen(&args)?;
            println!("Custodian keypair generated.");
            println!("  Identity    : {}", out.public_key.identity());
            println!("  Public key  : {}", out.public_path.display());
            println!("  Private key : {}", out.private_path.display());
            println!("Send the public key to the ceremony operator. Keep the private key.");
        }
        Commands::Issue(args) => {
            let config = commands::issue(&args)?;
            println!(
                "Issued {} shares, {} required to recover.",
                config.total_shares(),
                config.required_shares()
            );
            println!("  Configuration : {}", args.out.display());
        }
        Commands::Decrypt(args) => {
            let identity = commands::decrypt(&args)?;
            println!("Share for {identity} written to {}", args.out.display());
        }
        Commands::Recover(args) => {
            let outcome = commands::recover(&args)?;
            for (path, reason) in &outcome.rejected {
                eprintln!("rejected {}: {reason}", path.display());
            }
            if args.out.is_none() {
                let encoded = Zeroizing::new(hex::encode(&*outcome.secret));
                println!("{}", *encoded);
            }
            tracing::info!(
                accepted = outcome.accepted,
                rejected = outcome.rejected.len(),
                "recovery complete"
            );
        }
        Commands::Inspect(args) => {
            print!("{}", commands::inspect(&args)?);
        }
        Commands::Version => print_version(),
    }

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("keymaster-ceremony {}", env!("CARGO_PKG_VERSION"));
    println!(
        "share format        v{}",
        keymaster_recovery::config::SHARE_DOC_VERSION
    );
    println!("rustc               {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
