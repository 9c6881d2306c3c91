use std::time::Duration;

use anyhow::Result;
use ironetl::testing::*;
use ironetl::*;

#[test]
fn rows_arrive_in_source_order() -> Result<()> {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, (0..500).collect::<Vec<i64>>());
    let dest = MemoryDestination::new(&p);
    source.link_to(&dest)?;
    p.run()?;

    assert_eq!(dest.data(), (0..500).collect::<Vec<i64>>());
    assert!(dest.completion().is_done());
    Ok(())
}

#[test]
fn target_completes_after_every_predecessor() -> Result<()> {
    let p = Pipeline::default();
    let a = MemorySource::new(&p, vec![1, 2, 3]);
    let b = MemorySource::new(&p, vec![4, 5]);
    let dest = MemoryDestination::new(&p);
    a.link_to(&dest)?;
    b.link_to(&dest)?;
    assert_eq!(dest.input_port().predecessor_count(), 2);

    p.run()?;
    assert_collections_unordered_equal(&dest.data(), &[1, 2, 3, 4, 5]);
    assert!(matches!(a.completion().result(), Some(Ok(()))));
    assert!(matches!(b.completion().result(), Some(Ok(()))));
    Ok(())
}

#[test]
fn fault_propagates_to_successors() -> Result<()> {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, vec![1, 2, 3]);
    let failing = RowTransformation::new(&p, |x: i32| {
        if x == 2 {
            anyhow::bail!("two is not allowed");
        }
        Ok(x)
    })
    .with_name("reject twos");
    let dest = MemoryDestination::<i32>::new(&p);
    source.link_to(&failing)?;
    failing.link_to(&dest)?;

    let err = p.run().expect_err("run should fail");
    assert!(matches!(err, EtlError::Processing { ref node, .. } if node == "reject twos"));

    let downstream = dest.completion().result().expect("destination completed");
    match downstream {
        Err(EtlError::Upstream { cause, .. }) => {
            assert!(matches!(*cause, EtlError::Processing { .. }));
        }
        other => panic!("expected an upstream fault, got {other:?}"),
    }
    Ok(())
}

#[test]
fn root_cause_unwraps_upstream_chain() -> Result<()> {
    let p = Pipeline::default();
    let source = CustomSource::new(&p, || -> anyhow::Result<i32> { anyhow::bail!("broken reader") }, || false);
    let a = RowTransformation::map(&p, |x: i32| x);
    let b = RowTransformation::map(&p, |x: i32| x);
    let dest = MemoryDestination::<i32>::new(&p);
    source.link_to(&a)?;
    a.link_to(&b)?;
    b.link_to(&dest)?;

    p.run().expect_err("source fault");
    let Some(Err(err)) = dest.completion().result() else {
        panic!("destination should have faulted");
    };
    assert!(matches!(err, EtlError::Upstream { .. }));
    assert!(matches!(err.root_cause(), EtlError::Processing { .. }));
    Ok(())
}

#[mark_flaky_tests::flaky]
#[test]
fn successor_waits_for_every_predecessor_before_faulting() -> Result<()> {
    let p = Pipeline::default();
    let (open_gate, gate) = crossbeam_channel::bounded::<()>(1);
    let failing = CustomSource::new(&p, || -> anyhow::Result<i32> { anyhow::bail!("broken reader") }, || false);
    let mut asked = 0;
    let slow = CustomSource::new(
        &p,
        move || -> anyhow::Result<i32> {
            gate.recv()?;
            Ok(99)
        },
        move || {
            asked += 1;
            asked > 1
        },
    );
    let dest = MemoryDestination::<i32>::new(&p);
    failing.link_to(&dest)?;
    slow.link_to(&dest)?;

    let handle = p.start()?;
    let failed = failing.completion().wait_timeout(Duration::from_secs(5));
    assert!(failed.is_some_and(|r| r.is_err()));
    std::thread::sleep(Duration::from_millis(100));
    assert!(!slow.completion().is_done());
    assert!(!dest.completion().is_done(), "destination resolved while a predecessor was running");

    open_gate.send(())?;
    let err = handle.wait().expect_err("source fault");
    assert!(matches!(err, EtlError::Processing { .. }));
    assert!(matches!(slow.completion().result(), Some(Ok(()))));
    let Some(Err(downstream)) = dest.completion().result() else {
        panic!("destination should have faulted");
    };
    assert!(matches!(downstream, EtlError::Upstream { .. }));
    assert!(matches!(downstream.root_cause(), EtlError::Processing { .. }));
    Ok(())
}

#[test]
fn linking_after_start_is_rejected() -> Result<()> {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, vec![1]);
    let dest = MemoryDestination::new(&p);
    let handle = p.start()?;

    let err = source.link_to(&dest).expect_err("link after start");
    assert!(err.is_configuration());
    handle.wait()?;
    assert!(dest.is_empty());
    Ok(())
}

#[test]
fn pipeline_runs_once() -> Result<()> {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, vec![1]);
    let dest = MemoryDestination::new(&p);
    source.link_to(&dest)?;
    p.run()?;
    assert!(p.is_started());

    let err = p.run().expect_err("second run");
    assert!(err.is_configuration());
    assert_eq!(dest.data(), vec![1]);
    Ok(())
}

#[test]
fn unlinked_target_completes_empty() -> Result<()> {
    let p = Pipeline::default();
    let dest = MemoryDestination::<i32>::new(&p);
    p.run()?;
    assert!(dest.is_empty());
    assert!(matches!(dest.completion().result(), Some(Ok(()))));
    Ok(())
}

#[test]
fn predicates_pick_first_accepting_link() -> Result<()> {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, (1..=10).collect::<Vec<i32>>());
    let small = MemoryDestination::new(&p);
    let even = MemoryDestination::new(&p);
    source.link_to_if(&small, |x: &i32| *x <= 3)?;
    source.link_to_if(&even, |x: &i32| x % 2 == 0)?;
    p.run()?;

    assert_eq!(small.data(), vec![1, 2, 3]);
    // 2 already went to the first link.
    assert_eq!(even.data(), vec![4, 6, 8, 10]);
    Ok(())
}

#[test]
fn void_link_consumes_filtered_rows() -> Result<()> {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, (1..=6).collect::<Vec<i32>>());
    let kept = MemoryDestination::new(&p);
    let void = source.link_to_or_void(&kept, |x: &i32| *x > 4, |x: &i32| *x <= 4)?;
    p.run()?;

    assert_eq!(kept.data(), vec![5, 6]);
    assert!(matches!(void.completion().result(), Some(Ok(()))));
    Ok(())
}

#[test]
fn with_name_renames_node() {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, vec![1]).with_name("numbers");
    assert_eq!(source.name(), "numbers");
    let other = MemorySource::new(&p, vec![2]);
    assert_ne!(source.id(), other.id());
}

#[test]
fn panicking_node_faults_instead_of_hanging() -> Result<()> {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, vec![1, 2]);
    let boom = RowTransformation::map(&p, |x: i32| -> i32 {
        if x == 2 {
            panic!("boom");
        }
        x
    });
    let dest = MemoryDestination::new(&p);
    source.link_to(&boom)?;
    boom.link_to(&dest)?;

    let err = p.run().expect_err("panic becomes a fault");
    assert!(matches!(err, EtlError::Panicked { ref message, .. } if message.contains("boom")));
    Ok(())
}

#[mark_flaky_tests::flaky]
#[test]
fn cancellation_stops_sources() -> Result<()> {
    let p = Pipeline::default();
    let mut n = 0i64;
    let endless = CustomSource::new(
        &p,
        move || {
            n += 1;
            Ok(n)
        },
        || false,
    );
    let sink = VoidDestination::new(&p);
    endless.link_to(&sink)?;

    let handle = p.start()?;
    std::thread::sleep(std::time::Duration::from_millis(20));
    handle.cancel();
    let err = handle.wait().expect_err("cancelled run");
    assert!(matches!(err, EtlError::Cancelled));
    Ok(())
}
