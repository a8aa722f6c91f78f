//! Integration tests for batch conversion to Parquet

use dasware_processor::constants::PROCESS_TIME_COLUMN;
use dasware_processor::{BatchProcessor, CompressionAlgorithm, InoculationOverrides, ProcessorConfig};
use polars::prelude::{ParquetReader, SerReader};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn export(units: &[u32]) -> String {
    let mut text = String::from("\"[Info]\"\n\"Module\";\"Version\"\n\"FngArchiv\";\"5.0.0\"\n");
    for unit in units {
        text.push_str(&format!(
            "\n\"[TrackData{u}]\"\n\"Timestamp\";\"Duration\";\"Unit{u}.InoculationTime{u}.PV\";\"Unit{u}.pH{u}.PV\"\n\
             \"2019-02-06 10:00:00\";0;\"1899-12-30 00:00:00\";7.0\n\
             \"2019-02-06 10:01:00\";0.000694;\"1899-12-30 00:01:00\";7.1\n\
             \"2019-02-06 10:02:00\";0.001389;\"1899-12-30 00:02:00\";7.2\n",
            u = unit
        ));
    }
    text
}

fn read_parquet(path: &Path) -> polars::prelude::DataFrame {
    ParquetReader::new(fs::File::open(path).unwrap()).finish().unwrap()
}

#[tokio::test]
async fn test_batch_writes_unit_series_and_narrow_tables() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let run_a = input.path().join("run_a.csv");
    let run_b = input.path().join("run_b.csv");
    fs::write(&run_a, export(&[1, 2])).unwrap();
    fs::write(&run_b, export(&[4])).unwrap();

    let config = ProcessorConfig::default()
        .with_compression(CompressionAlgorithm::Zstd)
        .with_narrow_export(PROCESS_TIME_COLUMN)
        .with_max_concurrent_files(2);

    let stats = BatchProcessor::new(vec![run_a, run_b], output.path().to_path_buf())
        .with_config(config)
        .with_progress(false)
        .process()
        .await
        .unwrap();

    assert_eq!(stats.files_processed, 2);
    assert_eq!(stats.files_failed, 0);
    assert_eq!(stats.units_written, 3);
    assert_eq!(stats.total_rows, 9);

    for path in [
        output.path().join("run_a").join("unit_1.parquet"),
        output.path().join("run_a").join("unit_2.parquet"),
        output.path().join("run_b").join("unit_4.parquet"),
    ] {
        let df = read_parquet(&path);
        assert_eq!(df.height(), 3);
        assert!(df.column("ph_pv").is_ok());
    }

    let narrow = read_parquet(&output.path().join("run_b").join("narrow.parquet"));
    assert_eq!(narrow.width(), 4);
    assert!(narrow.height() > 0);
}

#[tokio::test]
async fn test_batch_survives_a_broken_export() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let good = input.path().join("good.csv");
    let broken = input.path().join("broken.csv");
    fs::write(&good, export(&[1])).unwrap();
    fs::write(&broken, "\"[Info]\"\n\"Module\";\"Version\"\n\"FngArchiv\";\"3.0.0\"\n").unwrap();

    let stats = BatchProcessor::new(vec![broken, good], output.path().to_path_buf())
        .with_progress(false)
        .process()
        .await
        .unwrap();

    assert_eq!(stats.files_processed, 1);
    assert_eq!(stats.files_failed, 1);
    assert!(output.path().join("good").join("unit_1.parquet").exists());
    assert!(!output.path().join("broken").exists());
}

#[tokio::test]
async fn test_batch_override_applies_to_every_export() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let run = input.path().join("run.csv");
    fs::write(&run, export(&[1])).unwrap();

    let mut overrides = InoculationOverrides::new();
    overrides.insert(1, "2019-02-06T10:01:00Z".parse().unwrap());

    let stats = BatchProcessor::new(vec![run], output.path().to_path_buf())
        .with_overrides(overrides)
        .with_progress(false)
        .process()
        .await
        .unwrap();
    assert_eq!(stats.files_processed, 1);

    let df = read_parquet(&output.path().join("run").join("unit_1.parquet"));
    let process_time: Vec<Option<f64>> = df
        .column(PROCESS_TIME_COLUMN)
        .unwrap()
        .as_materialized_series()
        .f64()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(process_time, vec![None, Some(0.0), Some(1.0 / 60.0)]);
}
