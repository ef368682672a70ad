//! Walkthrough of a 3-of-5 key-recovery ceremony.
//!
//! Five custodians generate keys, the operator issues shares of a fresh
//! secret, and three custodians later open their shares and submit them to
//! a recovery session. One bogus submission and one duplicate are thrown in
//! along the way to show how the session reacts.
//!
//! Run with:
//!   cargo run --example demo --release

use std::time::Instant;

use keymaster_recovery::crypto::{CustodianKeypair, SealedBox};
use keymaster_recovery::sharing::{RecoverySession, ShareIssuer};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";

fn step(title: &str) {
    println!("\n{BOLD}{CYAN}==> {title}{RESET}");
}

fn main() {
    let started = Instant::now();

    step("Custodians generate keypairs");
    let custodians: Vec<CustodianKeypair> = ["ana", "bruno", "carla", "davi", "elis"]
        .iter()
        .map(|name| CustodianKeypair::generate(format!("{name}@keymaster.example")))
        .collect();
    for c in &custodians {
        println!("  {}", c.public_key());
    }

    step("Operator issues 3-of-5 shares of a fresh secret");
    let recipients: Vec<_> = custodians.iter().map(|c| c.public_key()).collect();
    let issuer = ShareIssuer::new(SealedBox::new());
    let (config, secret) = issuer
        .issue_with_generated_secret(3, &recipients)
        .expect("issuance");
    println!(
        "  ceremony {} | {} shares | secret check: {}",
        config.ceremony_id().map(|id| id.to_string()).unwrap_or_default(),
        config.total_shares(),
        config.secret_check().is_some()
    );
    for d in config.descriptors() {
        println!("  {DIM}{:<28} {}{RESET}", d.key_identity, d.fingerprint);
    }

    step("Recovery: custodians open and submit shares");
    let session = RecoverySession::new(config.clone());
    let service = SealedBox::new();
    let open = |c: &CustodianKeypair| {
        let d = config.descriptor_for_identity(c.identity()).expect("descriptor");
        service.open_armored(c, &d.encrypted_share).expect("open share")
    };

    let report = |who: &str, result: Result<usize, _>| match result {
        Ok(n) => println!("  {GREEN}accepted{RESET} {who} ({n}/3)"),
        Err(e) => println!("  {YELLOW}rejected{RESET} {who}: {e}"),
    };

    let first = open(&custodians[4]);
    report(custodians[4].identity(), session.add_share(&first));
    report("a stranger", session.add_share(b"{\"version\":1}"));
    report(custodians[4].identity(), session.add_share(&first));
    report(custodians[0].identity(), session.add_share(&open(&custodians[0])));

    match session.combine() {
        Ok(_) => unreachable!("two shares cannot reach a 3-of-5 threshold"),
        Err(e) => println!("  {YELLOW}combine{RESET}: {e}"),
    }

    report(custodians[2].identity(), session.add_share(&open(&custodians[2])));
    let recovered = session.combine().expect("combine");

    step("Result");
    println!(
        "  recovered secret matches issued secret: {BOLD}{}{RESET}",
        recovered == secret
    );
    println!("  {DIM}finished in {:.2?}{RESET}", started.elapsed());
}
