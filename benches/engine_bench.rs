use std::io::Cursor;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use rand::Rng;

use celldb::wal::{Operation, WriteBatch};
use celldb::{DB, Key, Options, counter};

fn random_batch(rng: &mut impl Rng, ops: usize) -> WriteBatch {
    (0..ops)
        .map(|_| {
            let row = format!("row{:06}", rng.gen_range(0..100_000));
            let key = Key::new("bench", row, "col").at(rng.r#gen());
            let value: Vec<u8> = (0..64).map(|_| rng.r#gen()).collect();
            Operation::set(key, value)
        })
        .collect()
}

fn codec(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let batch = random_batch(&mut rng, 32);
    let encoded = batch.encode().unwrap();

    c.bench_function("encode_32_ops", |b| b.iter(|| black_box(&batch).encode().unwrap()));
    c.bench_function("decode_32_ops", |b| {
        b.iter(|| WriteBatch::decode(&mut Cursor::new(black_box(&encoded))).unwrap())
    });
}

fn commit(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(dir.path(), Options::default().with_pool_size(1)).unwrap();
    let conn = db.checkout().unwrap();
    let mut rng = rand::thread_rng();

    c.bench_function("commit_set", |b| {
        b.iter_batched(
            || random_batch(&mut rng, 1),
            |batch| assert!(conn.log().add(&batch)),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("commit_counter_add", |b| {
        b.iter(|| {
            let mut tx = conn.begin_transaction();
            tx.add(Key::new("bench", "counter", "hits").at(1), counter::encode(1));
            assert!(tx.commit());
        })
    });
}

criterion_group!(benches, codec, commit);
criterion_main!(benches);
