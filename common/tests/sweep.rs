use std::fs::write;

use common::{
    aggregate::{AggregateError, Aggregator},
    chart::{ChartOptions, render_chunk_means},
    chunk::{ChunkSize, ChunkSweep},
};
use tempfile::tempdir;

const LABELS: [&str; 12] = [
    "1K", "2K", "4K", "8K", "16K", "32K", "64K", "128K", "256K", "512K", "1M", "2M",
];

#[test]
fn full_sweep_renders_twelve_bars() {
    let dir = tempdir().unwrap();
    for (i, chunk_size) in ChunkSweep::default().sizes().unwrap().into_iter().enumerate() {
        for run in 1..=3 {
            let secs = 12.0 / (i + 1) as f64 + run as f64 * 0.1;
            write(
                dir.path().join(format!("output_{run}_{chunk_size}.log")),
                format!("used {secs:.2} secs to upload 'data.bin', while chunk size = {chunk_size}\n"),
            )
            .unwrap();
        }
    }

    let means = Aggregator::new(dir.path())
        .chunk_means(&ChunkSweep::default())
        .unwrap();
    assert_eq!(means.len(), 12);
    assert!(means.iter().all(|x| x.samples == 3));
    assert!((means[0].mean - 12.2).abs() < 1e-9);

    let chart = render_chunk_means(&means, &ChartOptions::default()).unwrap();
    let labels = chart.bars().iter().map(|x| x.label.as_str()).collect::<Vec<_>>();
    assert_eq!(labels, LABELS);
    assert_eq!(chart.bars()[0].value_label, "12.20");
    assert!(chart.y_range().end > 12.2);
}

#[test]
fn one_bad_log_aborts_the_sweep() {
    let dir = tempdir().unwrap();
    for chunk_size in ChunkSweep::default().sizes().unwrap() {
        write(
            dir.path().join(format!("output_1_{chunk_size}.log")),
            "used 1.00 secs\n",
        )
        .unwrap();
    }
    write(dir.path().join("output_2_65536.log"), "panic: connection reset\n").unwrap();

    let err = Aggregator::new(dir.path())
        .chunk_means(&ChunkSweep::default())
        .unwrap_err();
    match err {
        AggregateError::Format { path, line } => {
            assert!(path.ends_with("output_2_65536.log"));
            assert_eq!(line, "panic: connection reset");
        }
        other => panic!("expected format error, got {other:?}"),
    }
}

#[test]
fn end_to_end_1k_mean() {
    let dir = tempdir().unwrap();
    write(dir.path().join("output_1_1024.log"), "used 0.80 secs").unwrap();
    write(dir.path().join("output_2_1024.log"), "used 1.20 secs").unwrap();
    let mean = Aggregator::new(dir.path())
        .average_duration(ChunkSize::new(1024).unwrap())
        .unwrap();
    assert!((mean - 1.0).abs() < 1e-12);
}
