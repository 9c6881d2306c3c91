use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ironetl::testing::*;
use ironetl::*;

fn logged_pipeline(config: EtlConfig) -> (Pipeline, CollectingLogSink) {
    let sink = CollectingLogSink::new();
    let ctx = PipelineContext::new(config).with_log_sink(Arc::new(sink.clone()));
    (Pipeline::new(ctx), sink)
}

#[test]
fn config_loads_from_file_with_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("etl.json");
    std::fs::write(
        &path,
        r#"{"default_batch_size": 250, "connect_max_attempts": 5, "connect_retry_delay_ms": 20}"#,
    )?;

    let cfg = EtlConfig::from_json_file(&path)?;
    assert_eq!(cfg.default_batch_size, 250);
    assert_eq!(cfg.buffer_capacity, EtlConfig::default().buffer_capacity);
    assert_eq!(
        cfg.retry_policy(),
        RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(20),
        }
    );
    Ok(())
}

#[test]
fn invalid_config_is_a_configuration_error() {
    let err = EtlConfig::from_json_str(r#"{"buffer_capacity": "lots"}"#).expect_err("bad type");
    assert!(err.is_configuration());
}

#[test]
fn every_node_logs_start_and_end() -> Result<()> {
    let (p, sink) = logged_pipeline(EtlConfig::default());
    let source = MemorySource::new(&p, vec![1, 2, 3]).with_name("numbers");
    let double = RowTransformation::map(&p, |x: i32| x * 2);
    let dest = MemoryDestination::new(&p);
    source.link_to(&double)?;
    double.link_to(&dest)?;
    p.run()?;

    for task_type in ["MemorySource", "RowTransformation", "MemoryDestination"] {
        assert_eq!(sink.events_for(task_type, LogAction::Start).len(), 1, "{task_type}");
        assert_eq!(sink.events_for(task_type, LogAction::End).len(), 1, "{task_type}");
    }
    let start = &sink.events_for("MemorySource", LogAction::Start)[0];
    assert_eq!(start.message, "START numbers");
    assert_eq!(start.task_hash, task_hash("MemorySource", "numbers"));
    let end = &sink.events_for("MemorySource", LogAction::End)[0];
    assert_eq!(end.message, "END numbers (3 rows)");
    Ok(())
}

#[test]
fn progress_is_logged_every_threshold_rows() -> Result<()> {
    let config = EtlConfig {
        logging_threshold_rows: Some(10),
        stage: Some("staging".into()),
        run_id: Some(42),
        ..EtlConfig::default()
    };
    let (p, sink) = logged_pipeline(config);
    let source = MemorySource::new(&p, (0..35).collect::<Vec<i32>>());
    let dest = VoidDestination::new(&p);
    source.link_to(&dest)?;
    p.run()?;

    let progress = sink.events_for("MemorySource", LogAction::Log);
    assert_eq!(progress.len(), 3);
    assert_eq!(progress[2].message, "MemorySource: rows processed 30");
    assert_all(&sink.events(), |e| e.stage.as_deref() == Some("staging") && e.run_id == Some(42));
    Ok(())
}

#[test]
fn disabled_logging_emits_nothing() -> Result<()> {
    let config = EtlConfig {
        disable_logging: true,
        ..EtlConfig::default()
    };
    let (p, sink) = logged_pipeline(config);
    let source = MemorySource::new(&p, vec![1]);
    let dest = MemoryDestination::new(&p);
    source.link_to(&dest)?;
    p.run()?;

    assert!(sink.events().is_empty());
    assert_eq!(dest.data(), vec![1]);
    Ok(())
}

#[test]
fn task_hash_is_stable_and_distinct() {
    let a = task_hash("DbSource", "orders");
    assert_eq!(a.len(), 40);
    assert_eq!(a, task_hash("DbSource", "orders"));
    assert_ne!(a, task_hash("DbSource", "customers"));
    assert_ne!(a, task_hash("DbDestination", "orders"));
}

#[test]
fn log_events_serialize_uppercase_actions() -> Result<()> {
    let (p, sink) = logged_pipeline(EtlConfig::default());
    let _dest = MemoryDestination::<i32>::new(&p);
    p.run()?;

    let json = serde_json::to_value(&sink.events()[0])?;
    assert_eq!(json["action"], "START");
    assert_eq!(json["task_type"], "MemoryDestination");
    Ok(())
}

#[test]
fn small_buffers_still_complete() -> Result<()> {
    let config = EtlConfig {
        buffer_capacity: 1,
        ..EtlConfig::default()
    };
    let p = Pipeline::new(PipelineContext::new(config));
    let source = MemorySource::new(&p, (0..200).collect::<Vec<i32>>());
    let fan = Multicast::new(&p);
    let a = MemoryDestination::new(&p);
    let b = MemoryDestination::new(&p);
    source.link_to(&fan)?;
    fan.link_to(&a)?;
    fan.link_to(&b)?;
    p.run()?;

    assert_eq!(a.len(), 200);
    assert_eq!(b.data(), (0..200).collect::<Vec<i32>>());
    Ok(())
}
