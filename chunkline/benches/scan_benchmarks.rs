use chunkline::{Coordinator, DiscardSink, MeasurementSink, ScanConfig};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::{fs::File, io::BufWriter, io::Write, num::NonZeroUsize, path::Path};
use tempfile::tempdir;

const STATIONS: [&str; 8] = [
    "Hamburg",
    "Bulawayo",
    "Palembang",
    "St. John's",
    "Cracow",
    "Bridgetown",
    "Istanbul",
    "Roseau",
];

fn create_measurements(path: &Path, line_count: usize) -> std::io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    for i in 0..line_count {
        let tenths = (i * 37 % 1999) as i64 - 999;
        writeln!(
            file,
            "{};{}{}.{}",
            STATIONS[i % STATIONS.len()],
            if tenths < 0 { "-" } else { "" },
            tenths.abs() / 10,
            tenths.abs() % 10
        )?;
    }
    file.flush()
}

fn config(path: &Path, worker_count: usize) -> ScanConfig {
    ScanConfig::new(path, NonZeroUsize::new(worker_count).unwrap())
}

fn bench_worker_scaling(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("measurements.txt");
    create_measurements(&path, 200_000).unwrap();

    let mut group = c.benchmark_group("Worker Scaling");
    for worker_count in [1, 2, 4, 8] {
        let coordinator = Coordinator::new(config(&path, worker_count));
        group.bench_function(format!("workers_{}", worker_count), |b| {
            b.iter(|| {
                let result = coordinator.run_with_sink(&mut DiscardSink).unwrap();
                black_box(result.total_lines())
            })
        });
    }
    group.finish();
}

fn bench_measurements(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("measurements.txt");
    create_measurements(&path, 200_000).unwrap();

    let mut group = c.benchmark_group("Measurements");
    for worker_count in [1, 4] {
        let coordinator = Coordinator::new(config(&path, worker_count));
        group.bench_function(format!("workers_{}", worker_count), |b| {
            b.iter(|| {
                let mut sink = MeasurementSink::new();
                coordinator.run_with_sink(&mut sink).unwrap();
                black_box(sink.to_string())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_worker_scaling, bench_measurements);
criterion_main!(benches);
