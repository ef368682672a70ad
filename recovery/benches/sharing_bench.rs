// Threshold sharing benchmarks for keymaster-recovery.
//
// Covers the raw GF(256) split and recover at various share counts, sealing
// a share document to a custodian, and full ceremonies (issue + recover)
// with real encryption.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use keymaster_recovery::crypto::{
    recover_secret, split_secret, CustodianKeypair, EncryptionService, SealedBox, ShamirConfig,
};
use keymaster_recovery::sharing::{RecoverySession, ShareIssuer};

fn bench_split(c: &mut Criterion) {
    let secret = [0x2Au8; 32];
    let mut group = c.benchmark_group("shamir/split_32B");

    for (k, n) in [(2u8, 3u8), (3, 5), (5, 10), (16, 32)] {
        let config = ShamirConfig::new(k, n).unwrap();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{k}-of-{n}")),
            &config,
            |b, config| b.iter(|| split_secret(&secret, config).unwrap()),
        );
    }

    group.finish();
}

fn bench_recover(c: &mut Criterion) {
    let secret = [0x2Au8; 32];
    let mut group = c.benchmark_group("shamir/recover_32B");

    for k in [2u8, 5, 16, 64] {
        let config = ShamirConfig::new(k, k).unwrap();
        let shares = split_secret(&secret, &config).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(k), &shares, |b, shares| {
            b.iter(|| recover_secret(shares).unwrap());
        });
    }

    group.finish();
}

fn bench_seal_share(c: &mut Criterion) {
    let custodian = CustodianKeypair::generate("alice@example.com");
    let public = custodian.public_key();
    let doc = br#"{"version":1,"keyIdentity":"alice@example.com","secretShare":"AQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyAh"}"#;
    let service = SealedBox::new();

    c.bench_function("sealed_box/encrypt_share_doc", |b| {
        b.iter(|| service.encrypt_armored(&public, doc).unwrap());
    });

    let armored = service.encrypt_armored(&public, doc).unwrap();
    c.bench_function("sealed_box/open_share_doc", |b| {
        b.iter(|| service.open_armored(&custodian, &armored).unwrap());
    });
}

fn bench_ceremony(c: &mut Criterion) {
    let mut group = c.benchmark_group("ceremony/issue_and_recover");
    group.sample_size(20);

    for (k, n) in [(2usize, 3usize), (3, 5), (7, 15)] {
        let custodians: Vec<_> = (0..n)
            .map(|i| CustodianKeypair::generate(format!("custodian-{i}")))
            .collect();
        let recipients: Vec<_> = custodians.iter().map(|c| c.public_key()).collect();
        let issuer = ShareIssuer::new(SealedBox::new());

        group.bench_function(BenchmarkId::from_parameter(format!("{k}-of-{n}")), |b| {
            b.iter(|| {
                let config = issuer.issue_shares(None, k, &recipients).unwrap();
                let session = RecoverySession::new(config.clone());
                for custodian in custodians.iter().take(k) {
                    let descriptor = config
                        .descriptor_for_identity(custodian.identity())
                        .unwrap();
                    let doc = issuer
                        .service()
                        .open_armored(custodian, &descriptor.encrypted_share)
                        .unwrap();
                    session.add_share(&doc).unwrap();
                }
                session.combine().unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_split,
    bench_recover,
    bench_seal_share,
    bench_ceremony,
);
criterion_main!(benches);
