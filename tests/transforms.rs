use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use ironetl::testing::*;
use ironetl::*;

#[test]
fn row_transformation_maps_each_row() -> Result<()> {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, vec![1, 2, 3]);
    let plus_ten = RowTransformation::map(&p, |x: i32| x + 10);
    let dest = MemoryDestination::new(&p);
    source.link_to(&plus_ten)?;
    plus_ten.link_to(&dest)?;
    p.run()?;

    assert_eq!(dest.data(), vec![11, 12, 13]);
    Ok(())
}

#[test]
fn init_hook_runs_once_before_first_row() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let p = Pipeline::default();
    let source = MemorySource::new(&p, vec!["a", "b", "c"]);
    let counter = Arc::clone(&calls);
    let upper = RowTransformation::map(&p, |s: &'static str| s.to_uppercase()).with_init(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let dest = MemoryDestination::new(&p);
    source.link_to(&upper)?;
    upper.link_to(&dest)?;
    p.run()?;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(dest.data(), vec!["A", "B", "C"]);
    Ok(())
}

#[test]
fn init_hook_skipped_without_rows() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let p = Pipeline::default();
    let source = MemorySource::new(&p, Vec::<i32>::new());
    let counter = Arc::clone(&calls);
    let t = RowTransformation::map(&p, |x: i32| x).with_init(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let dest = MemoryDestination::new(&p);
    source.link_to(&t)?;
    t.link_to(&dest)?;
    p.run()?;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn block_transformation_sees_whole_input() -> Result<()> {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, vec![3, 1, 3, 2, 1]);
    let dedupe = BlockTransformation::new(&p, |mut rows: Vec<i32>| {
        rows.sort_unstable();
        rows.dedup();
        Ok(rows)
    });
    let dest = MemoryDestination::new(&p);
    source.link_to(&dedupe)?;
    dedupe.link_to(&dest)?;
    p.run()?;

    assert_eq!(dest.data(), vec![1, 2, 3]);
    Ok(())
}

#[test]
fn sort_is_stable() -> Result<()> {
    let p = Pipeline::default();
    let rows = vec![(2, "x"), (1, "a"), (2, "y"), (1, "b")];
    let source = MemorySource::new(&p, rows);
    let sort = Sort::new(&p, |a: &(i32, &str), b: &(i32, &str)| a.0.cmp(&b.0));
    let dest = MemoryDestination::new(&p);
    source.link_to(&sort)?;
    sort.link_to(&dest)?;
    p.run()?;

    assert_eq!(dest.data(), vec![(1, "a"), (1, "b"), (2, "x"), (2, "y")]);
    Ok(())
}

#[test]
fn sort_by_fields_orders_rows() -> Result<()> {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, sample_orders());
    let sort = Sort::<Order>::by_fields(&p, fields(["amount"]));
    let dest = MemoryDestination::new(&p);
    source.link_to(&sort)?;
    sort.link_to(&dest)?;
    p.run()?;

    let ids: Vec<i64> = dest.data().iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![3, 1, 2]);
    Ok(())
}

#[test]
fn large_sort_uses_parallel_path() -> Result<()> {
    let config = EtlConfig {
        sort_parallel_threshold: 10,
        ..EtlConfig::default()
    };
    let p = Pipeline::new(PipelineContext::new(config));
    let source = MemorySource::new(&p, (0..1000).rev().collect::<Vec<i32>>());
    let sort = Sort::new(&p, |a: &i32, b: &i32| a.cmp(b));
    let dest = MemoryDestination::new(&p);
    source.link_to(&sort)?;
    sort.link_to(&dest)?;
    p.run()?;

    assert_eq!(dest.data(), (0..1000).collect::<Vec<i32>>());
    Ok(())
}

#[test]
fn multicast_branches_are_independent() -> Result<()> {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, sample_orders());
    let fan = Multicast::new(&p);
    let discount = RowTransformation::map(&p, |mut o: Order| {
        o.amount = 0;
        o
    });
    let discounted = MemoryDestination::new(&p);
    let original = MemoryDestination::new(&p);

    source.link_to(&fan)?;
    fan.link_to(&discount)?;
    fan.link_to(&original)?;
    discount.link_to(&discounted)?;
    p.run()?;

    assert_collections_equal(&original.data(), &sample_orders());
    assert_all(&discounted.data(), |o| o.amount == 0);
    assert_eq!(discounted.len(), 3);
    Ok(())
}

#[test]
fn aggregation_sums_per_group() -> Result<()> {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, sample_orders());
    let agg = Aggregation::<Order, MapRow>::new(
        &p,
        AggregationSchema::new()
            .group_by("category")
            .aggregate("amount", "total", AggregationMethod::Sum),
    )?;
    let dest = MemoryDestination::new(&p);
    source.link_to(&agg)?;
    agg.link_to(&dest)?;
    p.run()?;

    let expected = vec![
        map_row([("category", Value::from("A")), ("total", Value::Int(30))]),
        map_row([("category", Value::from("B")), ("total", Value::Int(5))]),
    ];
    assert_collections_equal(&dest.data(), &expected);
    Ok(())
}

#[test]
fn aggregation_min_max_count() -> Result<()> {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, sample_order_maps());
    let agg = Aggregation::<MapRow, MapRow>::new(
        &p,
        AggregationSchema::new()
            .group_by_as("category", "cat")
            .aggregate("amount", "low", AggregationMethod::Min)
            .aggregate("amount", "high", AggregationMethod::Max)
            .aggregate("amount", "n", AggregationMethod::Count),
    )?;
    let dest = MemoryDestination::new(&p);
    source.link_to(&agg)?;
    agg.link_to(&dest)?;
    p.run()?;

    let rows = dest.data();
    assert_eq!(rows.len(), 2);
    let a = &rows[0];
    assert_eq!(a["cat"], Value::from("A"));
    assert_eq!(a["low"], Value::Int(10));
    assert_eq!(a["high"], Value::Int(20));
    assert_eq!(a["n"], Value::Int(2));
    assert_eq!(rows[1]["n"], Value::Int(1));
    Ok(())
}

#[test]
fn aggregation_rejects_array_output() {
    let p = Pipeline::default();
    let result = Aggregation::<Order, Vec<Value>>::new(&p, AggregationSchema::new().group_by("category"));
    let err = result.err().expect("array output is a configuration error");
    assert!(err.is_configuration());
}

#[test]
fn aggregation_with_functions() -> Result<()> {
    let p = Pipeline::default();
    let source = MemorySource::new(&p, sample_orders());
    let agg = Aggregation::<Order, MapRow>::with_functions(
        &p,
        |o: &Order| GroupKey(vec![Value::from(o.category.clone())]),
        |o: &Order, out: &mut MapRow| {
            let total = out.get("total").and_then(Value::as_i64).unwrap_or(0);
            out.insert("total".into(), Value::Int(total + o.amount));
            Ok(())
        },
        |key: &GroupKey, out: &mut MapRow| {
            out.insert("category".into(), key.values()[0].clone());
        },
    )?;
    let dest = MemoryDestination::new(&p);
    source.link_to(&agg)?;
    agg.link_to(&dest)?;
    p.run()?;

    let rows = dest.data();
    assert_eq!(rows[0]["total"], Value::Int(30));
    assert_eq!(rows[1]["category"], Value::from("B"));
    Ok(())
}

#[test]
fn lookup_with_schema_copies_matching_fields() -> Result<()> {
    let p = Pipeline::default();
    let primary = MemorySource::new(
        &p,
        vec![
            map_row([("id", Value::Int(1)), ("cat", Value::Int(10))]),
            map_row([("id", Value::Int(2)), ("cat", Value::Int(99))]),
        ],
    );
    let side = MemorySource::new(&p, vec![map_row([("cid", Value::Int(10)), ("label", Value::from("books"))])]);
    let lookup = LookupTransformation::<MapRow, MapRow, MapRow>::with_schema(
        &p,
        LookupSchema::new().match_on("cat", "cid").retrieve("label", "cat_name"),
    )?;
    let dest = MemoryDestination::new(&p);
    primary.link_to(&lookup)?;
    side.link_to(&lookup.side_input())?;
    lookup.link_to(&dest)?;
    p.run()?;

    let rows = dest.data();
    assert_eq!(rows[0]["cat_name"], Value::from("books"));
    assert!(!rows[1].contains_key("cat_name"));
    Ok(())
}

#[test]
fn lookup_with_function() -> Result<()> {
    let p = Pipeline::default();
    let primary = MemorySource::new(&p, sample_orders());
    let side = MemorySource::new(&p, vec![("A".to_string(), 100i64), ("B".to_string(), 200i64)]);
    let lookup = LookupTransformation::new(&p, |mut o: Order, rates: &[(String, i64)]| {
        let rate = rates
            .iter()
            .find(|(c, _)| *c == o.category)
            .map(|(_, r)| *r)
            .ok_or_else(|| anyhow::anyhow!("no rate for {}", o.category))?;
        o.amount *= rate;
        Ok(o)
    });
    let dest = MemoryDestination::new(&p);
    primary.link_to(&lookup)?;
    side.link_to(&lookup.side_input())?;
    lookup.link_to(&dest)?;
    p.run()?;

    let amounts: Vec<i64> = dest.data().iter().map(|o| o.amount).collect();
    assert_eq!(amounts, vec![1000, 2000, 1000]);
    Ok(())
}

#[test]
fn lookup_without_side_source_is_a_configuration_error() -> Result<()> {
    let p = Pipeline::default();
    let primary = MemorySource::new(&p, sample_orders());
    let lookup = LookupTransformation::new(&p, |o: Order, _: &[Order]| Ok(o));
    let dest = MemoryDestination::new(&p);
    primary.link_to(&lookup)?;
    lookup.link_to(&dest)?;

    let err = p.run().expect_err("missing side input");
    assert!(err.is_configuration());
    Ok(())
}

#[test]
fn lookup_schema_needs_fields() {
    let p = Pipeline::default();
    let result = LookupTransformation::<MapRow, MapRow, MapRow>::with_schema(&p, LookupSchema::new());
    assert!(result.is_err());
}

#[test]
fn merge_join_pairs_rows_positionally() -> Result<()> {
    let p = Pipeline::default();
    let left = MemorySource::new(&p, vec![1, 2, 3]);
    let right = MemorySource::new(&p, vec!["a".to_string(), "b".to_string()]);
    let join = MergeJoin::new(&p, |l: i32, r: String| Ok(format!("{l}{r}")));
    let dest = MemoryDestination::new(&p);
    left.link_to(&join.left())?;
    right.link_to(&join.right())?;
    join.link_to(&dest)?;
    p.run()?;

    assert_eq!(dest.data(), vec!["1a".to_string(), "2b".to_string()]);
    Ok(())
}

#[test]
fn merge_join_drops_right_surplus() -> Result<()> {
    let p = Pipeline::default();
    let left = MemorySource::new(&p, vec![1]);
    let right = MemorySource::new(&p, vec![10, 20, 30]);
    let join = MergeJoin::new(&p, |l: i32, r: i32| Ok(l + r));
    let dest = MemoryDestination::new(&p);
    left.link_to(&join.left())?;
    right.link_to(&join.right())?;
    join.link_to(&dest)?;
    p.run()?;

    assert_eq!(dest.data(), vec![11]);
    Ok(())
}
