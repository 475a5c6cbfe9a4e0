use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::json;

use warden_client::{Identifier, PathConfig};

fn bench_identifier_roundtrip(c: &mut Criterion) {
    let ident = Identifier::new(
        "node-1-10.0.0.1-4242-deadbeef",
        json!({"role": "primary", "epoch": 7}),
    );
    let raw = ident.encode().unwrap();

    c.bench_function("identifier_encode", |b| {
        b.iter(|| black_box(&ident).encode().unwrap())
    });
    c.bench_function("identifier_decode", |b| {
        b.iter(|| Identifier::decode(black_box(&raw), "/warden/lock/bench").unwrap())
    });
}

fn bench_path_resolution(c: &mut Criterion) {
    let conf = PathConfig::default();

    c.bench_function("path_config_lock", |b| {
        b.iter(|| conf.lock(black_box("bench-lock.primary")).unwrap())
    });
}

fn bench_digest_acl(c: &mut Criterion) {
    let conf: PathConfig = serde_json::from_str(
        r#"{"acl": [
            {"username": "foo", "password": "bar", "perms": "cdrwa"},
            {"username": "xp", "password": "123", "perms": "rw"}
        ]}"#,
    )
    .unwrap();

    c.bench_function("path_config_digest_acl", |b| {
        b.iter(|| conf.digest_acl().unwrap())
    });
}

criterion_group!(
    benches,
    bench_identifier_roundtrip,
    bench_path_resolution,
    bench_digest_acl
);
criterion_main!(benches);
