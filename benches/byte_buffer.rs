use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use sim_core::buffer::{ByteBuffer, ByteOrder};

fn benchmark_typed_writes(c: &mut Criterion) {
    let mut buf = ByteBuffer::direct(4096, ByteOrder::BigEndian).unwrap();

    c.bench_function("byte_buffer_put_u32", |bench| {
        bench.iter(|| {
            buf.clear().unwrap();
            for i in 0..1024u32 {
                buf.put_u32(black_box(i)).unwrap();
            }
        })
    });
}

fn benchmark_typed_reads(c: &mut Criterion) {
    let mut buf = ByteBuffer::direct(4096, ByteOrder::BigEndian).unwrap();
    for i in 0..1024u32 {
        buf.put_u32(i).unwrap();
    }

    c.bench_function("byte_buffer_get_u32", |bench| {
        bench.iter(|| {
            buf.rewind().unwrap();
            for _ in 0..1024 {
                black_box(buf.get_u32().unwrap());
            }
        })
    });
}

fn benchmark_varint(c: &mut Criterion) {
    let mut buf = ByteBuffer::direct(8192, ByteOrder::BigEndian).unwrap();

    c.bench_function("byte_buffer_varint_roundtrip", |bench| {
        bench.iter(|| {
            buf.clear().unwrap();
            for i in 0..512u32 {
                buf.put_var_int(black_box(i * 613)).unwrap();
            }
            buf.flip().unwrap();
            for _ in 0..512 {
                black_box(buf.get_var_int().unwrap());
            }
        })
    });
}

fn benchmark_crc32(c: &mut Criterion) {
    let payload = vec![0xA5u8; 4096];
    let buf = ByteBuffer::wrap(payload, ByteOrder::BigEndian);

    let mut group = c.benchmark_group("integrity");
    group.throughput(Throughput::Bytes(4096));
    group.bench_function("byte_buffer_crc32_4k", |bench| {
        bench.iter(|| black_box(buf.crc32().unwrap()))
    });
    group.bench_function("byte_buffer_fnv1a_4k", |bench| {
        bench.iter(|| black_box(buf.hash().unwrap()))
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_typed_writes,
    benchmark_typed_reads,
    benchmark_varint,
    benchmark_crc32
);
criterion_main!(benches);
