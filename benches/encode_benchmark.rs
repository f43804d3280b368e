// encode_benchmark.rs - Hot-path benchmarks: full-stack frame encoding and
// typed payload decoding.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use etherip::protocol::{
    Command, Encapsulation, MessageRouter, Protocol, SendRRData, UnconnectedSend,
};
use etherip::CipData;

fn frame_encoding(c: &mut Criterion) {
    c.bench_function("encode_read_tag_frame", |b| {
        let read = MessageRouter::read_tag("Rust_Real", 1).unwrap();
        let frame = Encapsulation::new(
            Command::SendRRData,
            0x1234_5678,
            SendRRData::new(UnconnectedSend::new(1, read)),
        );
        let mut buf = BytesMut::with_capacity(600);
        b.iter(|| {
            buf.clear();
            frame.encode(&mut buf).unwrap();
            black_box(buf.len());
        });
    });

    c.bench_function("encode_write_tag_frame", |b| {
        let mut buf = BytesMut::with_capacity(600);
        b.iter(|| {
            let write = MessageRouter::write_tag("Setpoint", CipData::real(3.5)).unwrap();
            let frame = Encapsulation::new(
                Command::SendRRData,
                0x1234_5678,
                SendRRData::new(UnconnectedSend::new(1, write)),
            );
            buf.clear();
            frame.encode(&mut buf).unwrap();
            black_box(buf.len());
        });
    });
}

fn payload_decoding(c: &mut Criterion) {
    c.bench_function("decode_dint_array_100", |b| {
        let raw: Vec<u8> = (0..100i32).flat_map(i32::to_le_bytes).collect();
        b.iter(|| CipData::from_raw(0x00C4, black_box(&raw)).unwrap());
    });
}

criterion_group!(benches, frame_encoding, payload_decoding);
criterion_main!(benches);
