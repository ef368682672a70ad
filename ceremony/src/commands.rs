//! # Ceremony Commands
//!
//! One function per subcommand. Each takes its parsed arguments, does the
//! file I/O, and returns what `main` needs to report. Nothing here prints;
//! progress goes through `tracing`.
//!
//! Every output file is created with `create_new`; an existing file is
//! never overwritten. Files that hold secret material (private keys, share
//! documents, the recovered secret) additionally get mode `0600`.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, ensure, Context, Result};
use tracing::{info, warn};
use zeroize::Zeroizing;

use keymaster_recovery::config::{
    FINGERPRINT_ALGORITHM, KEY_AGREEMENT_ALGORITHM, SYMMETRIC_ALGORITHM,
};
use keymaster_recovery::crypto::{CustodianKeypair, CustodianPublicKey, SealedBox};
use keymaster_recovery::sharing::{
    Disposition, Fingerprint, IssueOptions, RecoveryConfiguration, RecoverySession, ShareIssuer,
};

use crate::cli::{DecryptArgs, InspectArgs, IssueArgs, KeygenArgs, RecoverArgs};

/// Files written by `keygen`.
#[derive(Debug)]
pub struct KeygenOutput {
    pub public_key: CustodianPublicKey,
    pub public_path: PathBuf,
    pub private_path: PathBuf,
}

/// Result of a `recover` run.
pub struct RecoverOutcome {
    pub accepted: usize,
    /// Share files the session refused, with the reason.
    pub rejected: Vec<(PathBuf, String)>,
    pub secret: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for RecoverOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoverOutcome")
            .field("accepted", &self.accepted)
            .field("rejected", &self.rejected)
            .finish_non_exhaustive()
    }
}

pub fn keygen(args: &KeygenArgs) -> Result<KeygenOutput> {
    if args.identity.trim().is_empty() {
        bail!("custodian identity must not be empty");
    }
    let keypair = CustodianKeypair::generate(args.identity.clone());
    let public_key = keypair.public_key();

    let stem = file_stem(&args.identity);
    let public_path = args.out_dir.join(format!("{stem}.pub.asc"));
    let private_path = args.out_dir.join(format!("{stem}.key.asc"));

    let private = keypair
        .to_protected_armored(&args.passphrase.passphrase)
        .context("failed to protect private key")?;
    write_private(&private_path, private.as_bytes())?;

    let public = public_key
        .to_armored()
        .context("failed to armor public key")?;
    write_public(&public_path, public.as_bytes())?;

    info!(
        custodian = %public_key,
        public = %public_path.display(),
        private = %private_path.display(),
        "custodian keypair generated"
    );
    Ok(KeygenOutput {
        public_key,
        public_path,
        private_path,
    })
}

pub fn issue(args: &IssueArgs) -> Result<RecoveryConfiguration> {
    for path in std::iter::once(&args.out).chain(&args.emit_secret) {
        ensure!(
            !path.exists(),
            "{} already exists (refusing to overwrite)",
            path.display()
        );
    }

    let recipients = args
        .recipients
        .iter()
        .map(|path| {
            let text = read_text(path)?;
            CustodianPublicKey::from_armored(&text)
                .with_context(|| format!("invalid public key file {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let issuer = ShareIssuer::with_options(
        SealedBox::new(),
        IssueOptions {
            embed_secret_check: !args.no_secret_check,
        },
    );

    let (config, generated) = match &args.secret_file {
        Some(path) => {
            let secret = read_hex_secret(path)?;
            let config = issuer
                .issue_shares(Some(secret.as_slice()), args.threshold, &recipients)
                .context("issuance failed")?;
            (config, None)
        }
        None => {
            let (config, secret) = issuer
                .issue_with_generated_secret(args.threshold, &recipients)
                .context("issuance failed")?;
            (config, Some(secret))
        }
    };

    let json = config
        .to_json_pretty()
        .context("failed to serialize recovery configuration")?;
    write_public(&args.out, (json + "\n").as_bytes())?;
    info!(
        ceremony_id = ?config.ceremony_id(),
        threshold = config.required_shares(),
        custodians = config.total_shares(),
        out = %args.out.display(),
        "recovery configuration written"
    );

    match (&generated, &args.emit_secret) {
        (Some(secret), Some(path)) => {
            let encoded = Zeroizing::new(hex::encode(&**secret));
            write_private(path, encoded.as_bytes())?;
            info!(path = %path.display(), "generated secret written");
        }
        (Some(_), None) => {
            warn!("generated secret was not written anywhere; only a recovery can reproduce it")
        }
        (None, _) => {}
    }
    Ok(config)
}

/// Returns the identity whose share was written.
pub fn decrypt(args: &DecryptArgs) -> Result<String> {
    let config = load_config(&args.config)?;
    let key_text = Zeroizing::new(read_text(&args.key)?);
    let keypair = CustodianKeypair::from_protected_armored(&key_text, &args.passphrase.passphrase)
        .with_context(|| format!("failed to unlock {}", args.key.display()))?;

    let descriptor = config
        .descriptor_for_identity(keypair.identity())
        .ok_or_else(|| anyhow!("no share was issued to {}", keypair.identity()))?;

    let doc = SealedBox::new()
        .open_armored(&keypair, &descriptor.encrypted_share)
        .context("failed to open sealed share")?;
    if Fingerprint::of(&doc) != descriptor.fingerprint {
        bail!("decrypted share does not match its published fingerprint");
    }

    write_private(&args.out, &doc)?;
    info!(custodian = keypair.identity(), out = %args.out.display(), "share decrypted");
    Ok(keypair.identity().to_string())
}

pub fn recover(args: &RecoverArgs) -> Result<RecoverOutcome> {
    let config = load_config(&args.config)?;
    let session = RecoverySession::new(config);
    let mut rejected = Vec::new();

    for path in &args.shares {
        let raw = read_share(path)?;
        match session.add_share(&raw) {
            Ok(known) => info!(share = %path.display(), known, "share accepted"),
            Err(e) if e.disposition() == Disposition::Rejected => {
                warn!(share = %path.display(), error = %e, "share rejected");
                rejected.push((path.clone(), e.to_string()));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to submit {}", path.display()))
            }
        }
    }

    let secret = session.combine().context("recovery failed")?;
    if let Some(out) = &args.out {
        let encoded = Zeroizing::new(hex::encode(&*secret));
        write_private(out, encoded.as_bytes())?;
        info!(out = %out.display(), "recovered secret written");
    }

    Ok(RecoverOutcome {
        accepted: session.known_count(),
        rejected,
        secret,
    })
}

/// Human-readable summary of a configuration.
pub fn inspect(args: &InspectArgs) -> Result<String> {
    let config = load_config(&args.config)?;
    let mut out = String::new();

    let id = config
        .ceremony_id()
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    let created = config
        .created_at()
        .map_or_else(|| "-".to_string(), |t| t.to_rfc3339());
    writeln!(out, "Ceremony      : {id}")?;
    writeln!(out, "Created       : {created}")?;
    writeln!(
        out,
        "Threshold     : {} of {}",
        config.required_shares(),
        config.total_shares()
    )?;
    writeln!(
        out,
        "Secret check  : {}",
        if config.secret_check().is_some() {
            "present"
        } else {
            "absent"
        }
    )?;
    writeln!(
        out,
        "Algorithms    : {FINGERPRINT_ALGORITHM} fingerprints, {KEY_AGREEMENT_ALGORITHM} + {SYMMETRIC_ALGORITHM} sealing"
    )?;
    writeln!(out, "Custodians    :")?;
    for descriptor in config.descriptors() {
        writeln!(
            out,
            "  {:<32} {}",
            descriptor.key_identity, descriptor.fingerprint
        )?;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<RecoveryConfiguration> {
    let json = read_text(path)?;
    RecoveryConfiguration::from_json(&json)
        .with_context(|| format!("invalid recovery configuration {}", path.display()))
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Read a submitted share document. Trailing whitespace is dropped, since
/// editors like to append a newline; everything else is passed through
/// byte for byte.
fn read_share(path: &Path) -> Result<Zeroizing<Vec<u8>>> {
    let mut raw = Zeroizing::new(
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?,
    );
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    raw.truncate(end);
    Ok(raw)
}

fn read_hex_secret(path: &Path) -> Result<Zeroizing<Vec<u8>>> {
    let text = Zeroizing::new(read_text(path)?);
    let secret = hex::decode(text.trim())
        .with_context(|| format!("{} is not hex", path.display()))?;
    Ok(Zeroizing::new(secret))
}

fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    write_new(&options, path, contents)
}

fn write_public(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    write_new(&options, path, contents)
}

fn write_new(options: &OpenOptions, path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = options
        .open(path)
        .with_context(|| format!("failed to create {} (refusing to overwrite)", path.display()))?;
    file.write_all(contents)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// File-name-safe form of a custodian identity.
fn file_stem(identity: &str) -> String {
    identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::PassphraseArg;
    use tempfile::tempdir;

    const PASSPHRASE: &str = "ceremony passphrase";

    fn passphrase() -> PassphraseArg {
        PassphraseArg {
            passphrase: PASSPHRASE.to_string(),
        }
    }

    fn keygen_in(dir: &Path, identity: &str) -> KeygenOutput {
        keygen(&KeygenArgs {
            identity: identity.to_string(),
            out_dir: dir.to_path_buf(),
            passphrase: passphrase(),
        })
        .unwrap()
    }

    #[test]
    fn file_stem_sanitizes() {
        assert_eq!(file_stem("alice@example.com"), "alice@example.com");
        assert_eq!(file_stem("../etc/passwd"), ".._etc_passwd");
        assert_eq!(file_stem("bob smith"), "bob_smith");
    }

    #[test]
    fn read_share_trims_trailing_whitespace_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("share.json");
        fs::write(&path, b"  {\"a\":1}\r\n\n").unwrap();
        assert_eq!(read_share(&path).unwrap().as_slice(), b"  {\"a\":1}");
    }

    #[test]
    fn full_ceremony_through_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let keys: Vec<_> = ["alice@example.com", "bob@example.com", "carol@example.com"]
            .iter()
            .map(|id| keygen_in(root, id))
            .collect();

        let config_path = root.join("recovery.json");
        let secret_path = root.join("secret.hex");
        let config = issue(&IssueArgs {
            threshold: 2,
            recipients: keys.iter().map(|k| k.public_path.clone()).collect(),
            out: config_path.clone(),
            secret_file: None,
            emit_secret: Some(secret_path.clone()),
            no_secret_check: false,
        })
        .unwrap();
        assert_eq!(config.total_shares(), 3);

        let summary = inspect(&InspectArgs {
            config: config_path.clone(),
        })
        .unwrap();
        assert!(summary.contains("2 of 3"));
        assert!(summary.contains("bob@example.com"));
        assert!(summary.contains("SHA-256 fingerprints, X25519 + AES-256-GCM sealing"));

        let mut share_paths = Vec::new();
        for key in &keys[1..] {
            let out = root.join(format!("{}.share.json", key.public_key.identity()));
            let identity = decrypt(&DecryptArgs {
                config: config_path.clone(),
                key: key.private_path.clone(),
                out: out.clone(),
                passphrase: passphrase(),
            })
            .unwrap();
            assert_eq!(identity, key.public_key.identity());
            share_paths.push(out);
        }

        // An editor added a newline to one of them.
        let mut appended = fs::read(&share_paths[0]).unwrap();
        appended.push(b'\n');
        fs::write(&share_paths[0], appended).unwrap();

        let outcome = recover(&RecoverArgs {
            config: config_path,
            shares: share_paths,
            out: None,
        })
        .unwrap();
        assert_eq!(outcome.accepted, 2);
        assert!(outcome.rejected.is_empty());

        let expected = fs::read_to_string(secret_path).unwrap();
        assert_eq!(hex::encode(&*outcome.secret), expected);
    }

    #[test]
    fn recover_skips_bad_shares_and_reports_shortfall() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let keys: Vec<_> = ["a", "b"].iter().map(|id| keygen_in(root, id)).collect();

        let secret_file = root.join("input.hex");
        fs::write(&secret_file, "00112233445566778899aabbccddeeff\n").unwrap();
        let config_path = root.join("recovery.json");
        issue(&IssueArgs {
            threshold: 2,
            recipients: keys.iter().map(|k| k.public_path.clone()).collect(),
            out: config_path.clone(),
            secret_file: Some(secret_file),
            emit_secret: None,
            no_secret_check: true,
        })
        .unwrap();

        let good = root.join("a.share.json");
        decrypt(&DecryptArgs {
            config: config_path.clone(),
            key: keys[0].private_path.clone(),
            out: good.clone(),
            passphrase: passphrase(),
        })
        .unwrap();
        let bogus = root.join("bogus.json");
        fs::write(&bogus, r#"{"version":1,"keyIdentity":"b","secretShare":"AQID"}"#).unwrap();

        let err = recover(&RecoverArgs {
            config: config_path,
            shares: vec![good.clone(), bogus, good],
            out: None,
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("insufficient shares: have 1, need 2"));
    }

    #[test]
    fn decrypt_with_wrong_passphrase_fails() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let key = keygen_in(root, "alice");
        let config_path = root.join("recovery.json");
        issue(&IssueArgs {
            threshold: 1,
            recipients: vec![key.public_path.clone()],
            out: config_path.clone(),
            secret_file: None,
            emit_secret: Some(root.join("secret.hex")),
            no_secret_check: false,
        })
        .unwrap();

        let result = decrypt(&DecryptArgs {
            config: config_path,
            key: key.private_path,
            out: root.join("share.json"),
            passphrase: PassphraseArg {
                passphrase: "not it".into(),
            },
        });
        assert!(result.is_err());
        assert!(!root.join("share.json").exists());
    }

    #[test]
    fn issue_refuses_to_overwrite_configuration() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let key = keygen_in(root, "alice");
        let config_path = root.join("recovery.json");
        let args = |emit: &str| IssueArgs {
            threshold: 1,
            recipients: vec![key.public_path.clone()],
            out: config_path.clone(),
            secret_file: None,
            emit_secret: Some(root.join(emit)),
            no_secret_check: false,
        };

        let first = issue(&args("first.hex")).unwrap();
        assert!(issue(&args("second.hex")).is_err());

        let on_disk = load_config(&config_path).unwrap();
        assert_eq!(on_disk.ceremony_id(), first.ceremony_id());
        assert!(!root.join("second.hex").exists());
    }

    #[test]
    fn issue_refuses_existing_secret_file_before_writing_configuration() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let key = keygen_in(root, "alice");
        let secret_path = root.join("secret.hex");
        fs::write(&secret_path, "keep me").unwrap();

        let result = issue(&IssueArgs {
            threshold: 1,
            recipients: vec![key.public_path.clone()],
            out: root.join("recovery.json"),
            secret_file: None,
            emit_secret: Some(secret_path.clone()),
            no_secret_check: false,
        });
        assert!(result.is_err());
        assert!(!root.join("recovery.json").exists());
        assert_eq!(fs::read_to_string(secret_path).unwrap(), "keep me");
    }

    #[test]
    fn keygen_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        keygen_in(dir.path(), "alice");
        let again = keygen(&KeygenArgs {
            identity: "alice".into(),
            out_dir: dir.path().to_path_buf(),
            passphrase: passphrase(),
        });
        assert!(again.is_err());
    }
}
