//! Packet encoding/decoding and chunking benchmarks.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use remotecall_client::chunked;
use remotecall_protocol::{frames, Packet, MAX_CHUNK_SIZE};

fn create_query(size: usize) -> Packet {
    Packet::query("x".repeat(size))
}

fn create_result(size: usize) -> Packet {
    Packet::QueryResult {
        query_id: 42,
        content: "x".repeat(size),
    }
}

fn bench_query_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_encode");

    for size in [16, 256, MAX_CHUNK_SIZE] {
        let packet = create_query(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &packet, |b, packet| {
            b.iter(|| black_box(packet.encode().unwrap()));
        });
    }

    group.finish();
}

fn bench_result_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_decode");

    for size in [16, 256, 1015] {
        let encoded = create_result(size).encode().unwrap();

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| black_box(Packet::decode(encoded).unwrap()));
        });
    }

    group.finish();
}

fn bench_coalesced_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("coalesced_frames");

    // Fixed-width frames read back to back in one buffer.
    for count in [1, 16, 128] {
        let mut read = BytesMut::new();
        for query_id in 0..count {
            read.extend_from_slice(&Packet::QueryAccepted { query_id }.encode().unwrap());
        }
        let read = read.freeze();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &read, |b, read| {
            b.iter(|| {
                let decoded: Vec<_> = frames(read).collect();
                black_box(decoded)
            });
        });
    }

    group.finish();
}

fn bench_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunking");

    for size in [1200, 16 * 1024, 65535] {
        let payload = Bytes::from(vec![b'x'; size]);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| {
                let packets: Vec<_> = chunked::chunks(payload, MAX_CHUNK_SIZE)
                    .map(Packet::query)
                    .collect();
                black_box(packets)
            });
        });
    }

    group.finish();
}

fn bench_chunk_encode(c: &mut Criterion) {
    let payload = Bytes::from(vec![b'x'; 65535]);

    c.bench_function("chunk_encode_max_payload", |b| {
        b.iter(|| {
            for chunk in chunked::chunks(&payload, MAX_CHUNK_SIZE) {
                black_box(Packet::query(chunk).encode().unwrap());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_query_encode,
    bench_result_decode,
    bench_coalesced_frames,
    bench_chunking,
    bench_chunk_encode,
);
criterion_main!(benches);
