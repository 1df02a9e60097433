use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use cql_proto::{
    Consistency, Direction, Message, Opcode, ProtocolVersion, Query, QueryOptions, Value,
};

fn query_message() -> Message {
    Message::Query(Query {
        query: "INSERT INTO ks.events (id, payload, ts) VALUES (?, ?, ?)".to_string(),
        options: QueryOptions {
            consistency: Consistency::LocalQuorum,
            positional_values: vec![
                Value::regular(vec![0x42; 16]),
                Value::regular(vec![0xAB; 256]),
                Value::regular(vec![0x00; 8]),
            ],
            page_size: Some(5000),
            default_timestamp: Some(1_600_000_000_000_000),
            ..Default::default()
        },
    })
}

fn bench_encode(c: &mut Criterion) {
    let message = query_message();
    let len = message.encoded_len(ProtocolVersion::V4).unwrap();

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(len as u64));
    group.bench_function("query_v4", |b| {
        let mut buf = Vec::with_capacity(len);
        b.iter(|| {
            buf.clear();
            message.encode(&mut buf, ProtocolVersion::V4).unwrap();
        });
    });
    group.bench_function("query_v4_encoded_len", |b| {
        b.iter(|| message.encoded_len(ProtocolVersion::V4).unwrap());
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let message = query_message();
    let bytes = message.encode_to_vec(ProtocolVersion::V4).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("query_v4", |b| {
        b.iter(|| {
            Message::decode(
                Direction::Request,
                Opcode::Query,
                &mut &bytes[..],
                ProtocolVersion::V4,
            )
            .unwrap()
        });
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
