use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ixcore::fdset::{FdSet, Whence};
use rand::Rng;
use tempfile::tempdir;

const TYPE_NO: u32 = 1;

fn setup(limit: usize, files: u32) -> (tempfile::TempDir, FdSet) {
    let dir = tempdir().unwrap();
    let fdset = FdSet::new(limit);
    fdset.register_type(TYPE_NO, dir.path().join("P.bench.%u").to_str().unwrap(), true).unwrap();
    for fileno in 0..files {
        let fd = fdset.create(TYPE_NO, fileno).unwrap();
        fdset.write_at(&fd, 0, b"seed").unwrap();
        fdset.unpin(&fd).unwrap();
    }
    (dir, fdset)
}

/// Pin/unpin throughput when every file fits under the descriptor limit,
/// so no eviction sweep ever runs.
fn bench_pin_unpin_no_eviction(c: &mut Criterion) {
    let (_dir, fdset) = setup(64, 32);
    let mut rng = rand::thread_rng();
    c.bench_function("pin_unpin_no_eviction", |b| {
        b.iter(|| {
            let fileno = rng.gen_range(0..32);
            let fd = fdset.pin(TYPE_NO, fileno, 0, Whence::Start).unwrap();
            black_box(&fd);
            fdset.unpin(&fd).unwrap();
        });
    });
}

/// Pin/unpin throughput when the working set exceeds the descriptor limit,
/// forcing the clock sweep to evict on every other pin.
fn bench_pin_unpin_under_pressure(c: &mut Criterion) {
    let mut group = c.benchmark_group("pin_unpin_under_pressure");
    for limit in [4usize, 8, 16].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(limit), limit, |b, &limit| {
            let (_dir, fdset) = setup(limit, 64);
            let mut rng = rand::thread_rng();
            b.iter(|| {
                let fileno = rng.gen_range(0..64);
                let fd = fdset.pin(TYPE_NO, fileno, 0, Whence::Start).unwrap();
                black_box(&fd);
                fdset.unpin(&fd).unwrap();
            });
        });
    }
    group.finish();
}

/// Sequential read/write throughput through the pool's offset-tracked
/// read_at/write_at, independent of eviction behavior.
fn bench_read_write_at(c: &mut Criterion) {
    let (_dir, fdset) = setup(16, 1);
    let payload = vec![7u8; 4096];
    let mut buf = vec![0u8; 4096];
    c.bench_function("write_at_4k", |b| {
        b.iter(|| {
            let fd = fdset.pin(TYPE_NO, 0, 0, Whence::Start).unwrap();
            fdset.write_at(&fd, 0, black_box(&payload)).unwrap();
            fdset.unpin(&fd).unwrap();
        });
    });
    c.bench_function("read_at_4k", |b| {
        b.iter(|| {
            let fd = fdset.pin(TYPE_NO, 0, 0, Whence::Start).unwrap();
            fdset.read_at(&fd, 0, black_box(&mut buf)).unwrap();
            fdset.unpin(&fd).unwrap();
        });
    });
}

criterion_group!(benches, bench_pin_unpin_no_eviction, bench_pin_unpin_under_pressure, bench_read_write_at);
criterion_main!(benches);
