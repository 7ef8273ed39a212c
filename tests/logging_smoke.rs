use std::fs;
use std::io;
use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use sales_features::{
    log_app_failure, log_app_start, log_run_config, run_pipeline, LoggingConfig, PipelineConfig,
    BRAND_FILE, PRODUCT_FILE, SALES_FILE, STORE_FILE,
};
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn seed_inputs(dir: &std::path::Path) {
    fs::write(dir.join(PRODUCT_FILE), "id,brand\np1,Acme\n").unwrap();
    fs::write(dir.join(BRAND_FILE), "id,name\n10,Acme\n").unwrap();
    fs::write(dir.join(STORE_FILE), "id\ns1\n").unwrap();
    fs::write(
        dir.join(SALES_FILE),
        "product,store,date,quantity\np1,s1,2021-02-01,3\nghost,s7,2021-02-01,1\np1,s9,2021-02-02,2\n",
    )
    .unwrap();
}

fn config_for(dir: &std::path::Path) -> PipelineConfig {
    PipelineConfig {
        data_dir: dir.to_path_buf(),
        output_path: dir.join("features.csv"),
        min_date: NaiveDate::from_ymd_opt(2021, 2, 1).unwrap(),
        max_date: NaiveDate::from_ymd_opt(2021, 2, 28).unwrap(),
        ..PipelineConfig::default()
    }
}

#[test]
fn pipeline_run_emits_stage_events() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(dir.path());
    let cfg = config_for(dir.path());

    let logs = capture_logs(Level::INFO, || {
        run_pipeline(&cfg).expect("pipeline succeeds");
    });

    for event in [
        "pipeline.run.start",
        "load.finish",
        "join.finish",
        "aggregate.finish",
        "merge.finish",
        "features.schema.built",
        "export.finish",
        "ranking.finish",
        "pipeline.run.finish",
    ] {
        assert!(
            logs.contains(&format!("\"event\":\"{event}\"")),
            "missing event {event} in {logs}"
        );
    }
}

#[test]
fn aggregations_on_worker_threads_reach_the_caller_subscriber() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(dir.path());
    let cfg = config_for(dir.path());

    let logs = capture_logs(Level::INFO, || {
        run_pipeline(&cfg).expect("pipeline succeeds");
    });

    for granularity in ["product", "brand", "store"] {
        let found = logs.lines().any(|line| {
            line.contains("\"event\":\"aggregate.finish\"")
                && line.contains(&format!("\"granularity\":\"{granularity}\""))
        });
        assert!(found, "missing aggregate.finish for {granularity} in {logs}");
    }
}

#[test]
fn run_finish_carries_the_json_report() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(dir.path());
    let cfg = config_for(dir.path());

    let logs = capture_logs(Level::INFO, || {
        run_pipeline(&cfg).expect("pipeline succeeds");
    });

    let finish: serde_json::Value = logs
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .find(|value| value["fields"]["event"] == "pipeline.run.finish")
        .expect("pipeline.run.finish is logged");
    let encoded = finish["fields"]["report"]
        .as_str()
        .expect("report field is a string");
    let report: serde_json::Value = serde_json::from_str(encoded).unwrap();

    assert_eq!(report["export"]["rows_written"], 2);
    assert_eq!(report["join"]["sales_without_product"], 1);
    assert_eq!(report["groups"]["product"], 2);
    assert!(report["wmape"]["entries"].is_array());
}

#[test]
fn join_losses_and_unknown_stores_are_warned() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(dir.path());
    let cfg = config_for(dir.path());

    let logs = capture_logs(Level::WARN, || {
        let report = run_pipeline(&cfg).expect("pipeline succeeds");
        assert_eq!(report.join.sales_without_product, 1);
        assert_eq!(report.join.unknown_store_rows, 1);
    });

    assert!(logs.contains("\"event\":\"join.rows_dropped\""));
    assert!(logs.contains("\"event\":\"join.unknown_store\""));
    assert!(!logs.contains("\"event\":\"join.finish\""));
}

#[test]
fn dropped_rows_are_traced_at_debug() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(dir.path());
    let cfg = config_for(dir.path());

    let logs = capture_logs(Level::DEBUG, || {
        run_pipeline(&cfg).expect("pipeline succeeds");
    });

    assert!(logs.contains("\"event\":\"join.sales.dropped\""));
    assert!(logs.contains("\"event\":\"load.table.read\""));
}

#[test]
fn lifecycle_helpers_emit_baseline_events() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_for(dir.path());
    let logs = capture_logs(Level::INFO, || {
        log_app_start(&LoggingConfig::default());
        log_run_config(&cfg);
        let err = run_pipeline(&cfg).expect_err("empty data dir must fail");
        log_app_failure(&err);
    });

    assert!(logs.contains("\"event\":\"app.start\""));
    assert!(logs.contains("\"event\":\"app.config\""));
    assert!(logs.contains("\"event\":\"app.failed\""));
}
