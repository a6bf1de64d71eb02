use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use kv_rs::codec::{read_record, write_record};
use kv_rs::record::Record;

fn bench_codec_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_codec");

    let records = [
        ("set", Record::set(1, "order_key", "a modestly sized value payload")),
        ("delete", Record::delete(1, "order_key")),
        ("commit", Record::commit(1)),
    ];

    for (name, record) in &records {
        let mut encoded = Vec::new();
        write_record(&mut encoded, record).unwrap();
        group.throughput(Throughput::Bytes(encoded.len() as u64));

        group.bench_with_input(BenchmarkId::new("write", name), record, |b, record| {
            b.iter(|| {
                let mut buf = Vec::with_capacity(64);
                write_record(&mut buf, black_box(record)).unwrap();
                buf
            });
        });

        group.bench_with_input(BenchmarkId::new("read", name), &encoded, |b, encoded| {
            b.iter(|| {
                let mut cursor = std::io::Cursor::new(encoded.as_slice());
                read_record(&mut cursor).unwrap().unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec_roundtrip);
criterion_main!(benches);
