//! Benchmarks for the client-facing DAP framing and the launcher-facing IPC
//! framing: encode throughput and incremental decode cost under both a
//! single large payload and many small back-to-back messages.

use criterion::{criterion_group, criterion_main, Criterion};
use dapper::framing::{dap, ipc};
use std::hint::black_box;

fn small_payload() -> Vec<u8> {
    br#"{"seq":1,"type":"request","command":"next","arguments":{"threadId":1}}"#.to_vec()
}

fn large_payload() -> Vec<u8> {
    let mut variables = Vec::new();
    for i in 0..2000 {
        variables.push(format!(r#"{{"name":"var{i}","value":"{i}","variablesReference":0}}"#));
    }
    format!(r#"{{"seq":1,"type":"response","variables":[{}]}}"#, variables.join(",")).into_bytes()
}

fn dap_encode(c: &mut Criterion) {
    let small = small_payload();
    let large = large_payload();

    c.bench_function("dap::encode small", |b| b.iter(|| black_box(dap::encode(&small))));
    c.bench_function("dap::encode large", |b| b.iter(|| black_box(dap::encode(&large))));
}

fn dap_decode(c: &mut Criterion) {
    let small_framed = dap::encode(&small_payload());
    let large_framed = dap::encode(&large_payload());

    c.bench_function("dap::decode single small message", |b| {
        b.iter(|| {
            let mut decoder = dap::Decoder::new();
            decoder.feed(&small_framed);
            black_box(decoder.try_decode().unwrap())
        });
    });

    c.bench_function("dap::decode single large message", |b| {
        b.iter(|| {
            let mut decoder = dap::Decoder::new();
            decoder.feed(&large_framed);
            black_box(decoder.try_decode().unwrap())
        });
    });

    c.bench_function("dap::decode 100 back-to-back small messages", |b| {
        let mut stream = Vec::new();
        for _ in 0..100 {
            stream.extend(&small_framed);
        }
        b.iter(|| {
            let mut decoder = dap::Decoder::new();
            decoder.feed(&stream);
            let mut count = 0;
            while let Some(msg) = decoder.try_decode().unwrap() {
                black_box(msg);
                count += 1;
            }
            count
        });
    });
}

fn ipc_encode(c: &mut Criterion) {
    let small = small_payload();
    let large = large_payload();

    c.bench_function("ipc::encode small", |b| {
        b.iter(|| black_box(ipc::encode(ipc::MessageKind::Command, &small)));
    });
    c.bench_function("ipc::encode large", |b| {
        b.iter(|| black_box(ipc::encode(ipc::MessageKind::Response, &large)));
    });
}

fn ipc_decode(c: &mut Criterion) {
    let small_framed = ipc::encode(ipc::MessageKind::Command, &small_payload());

    c.bench_function("ipc::decode single small frame", |b| {
        b.iter(|| {
            let mut decoder = ipc::Decoder::new();
            decoder.feed(&small_framed);
            black_box(decoder.try_decode().unwrap())
        });
    });

    c.bench_function("ipc::decode 100 back-to-back small frames", |b| {
        let mut stream = Vec::new();
        for _ in 0..100 {
            stream.extend(&small_framed);
        }
        b.iter(|| {
            let mut decoder = ipc::Decoder::new();
            decoder.feed(&stream);
            let mut count = 0;
            while let Some(msg) = decoder.try_decode().unwrap() {
                black_box(msg);
                count += 1;
            }
            count
        });
    });
}

criterion_group!(benches, dap_encode, dap_decode, ipc_encode, ipc_decode);
criterion_main!(benches);
