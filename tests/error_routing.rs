use std::sync::{Arc, Mutex};

use anyhow::Result;
use ironetl::testing::*;
use ironetl::*;

#[test]
fn failing_row_is_routed_once_and_siblings_pass() -> Result<()> {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, sample_orders());
    let check = RowTransformation::new(&p, |o: Order| {
        if o.id == 2 {
            anyhow::bail!("order {} rejected", o.id);
        }
        Ok(o)
    });
    let good = MemoryDestination::new(&p);
    let errors = MemoryDestination::<ErrorRecord>::new(&p);
    source.link_to(&check)?;
    check.link_to(&good)?;
    check.link_errors_to(&errors)?;
    assert!(check.error_router().is_attached());
    p.run()?;

    let ids: Vec<i64> = good.data().iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![1, 3]);

    let routed = errors.data();
    assert_eq!(routed.len(), 1);
    assert_eq!(routed[0].error_text, "order 2 rejected");
    let row: Order = serde_json::from_str(&routed[0].record_json)?;
    assert_eq!(row, Order::new(2, "A", 20));
    assert!(matches!(routed[0].error, EtlError::Processing { .. }));
    Ok(())
}

#[test]
fn error_record_serializes_without_error_object() -> Result<()> {
    let record = ErrorRecord::new(EtlError::Field("bad".into()), &Order::new(1, "A", 1));
    let json = serde_json::to_value(&record)?;
    assert_eq!(json["error_text"], "field error: bad");
    assert!(json.get("error").is_none());
    assert!(json["report_time"].is_string());
    Ok(())
}

#[test]
fn custom_destination_routes_rejected_rows() -> Result<()> {
    let written = Arc::new(Mutex::new(Vec::new()));
    let p = Pipeline::default();
    let source = MemorySource::new(&p, vec![1, -1, 2]);
    let sink = Arc::clone(&written);
    let dest = CustomDestination::new(&p, move |x: i32| {
        anyhow::ensure!(x >= 0, "negative value {x}");
        sink.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.push(x);
        Ok(())
    });
    let errors = MemoryDestination::new(&p);
    source.link_to(&dest)?;
    dest.link_errors_to(&errors)?;
    p.run()?;

    assert_eq!(*written.lock().expect("lock"), vec![1, 2]);
    let routed: Vec<ErrorRecord> = errors.data();
    assert_eq!(routed.len(), 1);
    assert_eq!(routed[0].record_json, "-1");
    Ok(())
}

#[test]
fn custom_source_routes_failed_reads() -> Result<()> {
    let p = Pipeline::default();
    let mut n = 0;
    let mut reads = 0;
    let source = CustomSource::new(
        &p,
        move || {
            n += 1;
            if n == 2 {
                anyhow::bail!("read {n} failed");
            }
            Ok(n)
        },
        move || {
            reads += 1;
            reads > 3
        },
    );
    let dest = MemoryDestination::new(&p);
    let errors = MemoryDestination::<ErrorRecord>::new(&p);
    source.link_to(&dest)?;
    source.link_errors_to(&errors)?;
    p.run()?;

    assert_eq!(dest.data(), vec![1, 3]);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.data()[0].record_json, "");
    Ok(())
}

#[test]
fn aggregation_routes_rows_missing_a_field() -> Result<()> {
    let p = Pipeline::default();
    let mut rows = sample_order_maps();
    rows.push(map_row([("category", Value::from("A"))]));
    let source = MemorySource::new(&p, rows);
    let agg = Aggregation::<MapRow, MapRow>::new(
        &p,
        AggregationSchema::new()
            .group_by("category")
            .aggregate("amount", "total", AggregationMethod::Sum),
    )?;
    let dest = MemoryDestination::new(&p);
    let errors = MemoryDestination::<ErrorRecord>::new(&p);
    source.link_to(&agg)?;
    agg.link_to(&dest)?;
    agg.link_errors_to(&errors)?;
    p.run()?;

    assert_eq!(dest.data()[0]["total"], Value::Int(30));
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors.data()[0].error, EtlError::Field(_)));
    Ok(())
}

#[test]
fn merge_join_routes_failed_pairs() -> Result<()> {
    let p = Pipeline::default();
    let left = MemorySource::new(&p, vec![4, 0, 2]);
    let right = MemorySource::new(&p, vec![2, 2, 2]);
    let divide = MergeJoin::new(&p, |l: i32, r: i32| {
        anyhow::ensure!(l != 0, "zero numerator");
        Ok(l / r)
    });
    let dest = MemoryDestination::new(&p);
    let errors = MemoryDestination::<ErrorRecord>::new(&p);
    left.link_to(&divide.left())?;
    right.link_to(&divide.right())?;
    divide.link_to(&dest)?;
    divide.link_errors_to(&errors)?;
    p.run()?;

    assert_eq!(dest.data(), vec![2, 1]);
    assert_eq!(errors.data()[0].record_json, "[0,2]");
    Ok(())
}
