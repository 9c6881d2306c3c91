use std::sync::Arc;

use anyhow::Result;
use ironetl::testing::*;
use ironetl::*;

fn orders_db() -> Result<MemoryDatabase> {
    let db = MemoryDatabase::new();
    db.create_table(TableDefinition::new(
        "orders",
        vec![
            TableColumn::new("id", "INT").primary_key(),
            TableColumn::new("category", "NVARCHAR(10)"),
            TableColumn::new("amount", "INT"),
        ],
    ));
    let rows = sample_orders()
        .into_iter()
        .map(|o| vec![Value::Int(o.id), Value::Text(o.category), Value::Int(o.amount)])
        .collect();
    db.insert_rows("orders", rows)?;
    Ok(db)
}

fn pipeline_for(db: &MemoryDatabase) -> Pipeline {
    let config = EtlConfig {
        connect_retry_delay_ms: 1,
        ..EtlConfig::default()
    };
    Pipeline::new(PipelineContext::new(config).with_connection(Arc::new(db.clone())))
}

#[test]
fn reads_table_into_structs() -> Result<()> {
    let db = orders_db()?;
    let p = pipeline_for(&db);
    let source = DbSource::<Order>::table(&p, "orders");
    let dest = MemoryDestination::new(&p);
    source.link_to(&dest)?;
    p.run()?;

    assert_collections_equal(&dest.data(), &sample_orders());
    assert_eq!(db.statements()[0], "SELECT [id], [category], [amount] FROM [orders]");
    Ok(())
}

#[test]
fn reads_sql_into_maps_and_arrays() -> Result<()> {
    let db = orders_db()?;
    let p = pipeline_for(&db);
    let maps = DbSource::<MapRow>::sql(&p, "SELECT id, category FROM orders");
    let arrays = DbSource::<Vec<Value>>::sql(&p, "SELECT amount FROM orders");
    let map_dest = MemoryDestination::new(&p);
    let array_dest = MemoryDestination::new(&p);
    maps.link_to(&map_dest)?;
    arrays.link_to(&array_dest)?;
    p.run()?;

    let first = &map_dest.data()[0];
    assert_eq!(first["id"], Value::Int(1));
    assert_eq!(first["category"], Value::from("A"));
    assert!(!first.contains_key("amount"));
    assert_eq!(
        array_dest.data(),
        vec![vec![Value::Int(10)], vec![Value::Int(20)], vec![Value::Int(5)]]
    );
    Ok(())
}

#[test]
fn explicit_column_names_override_definition() -> Result<()> {
    let db = orders_db()?;
    let p = pipeline_for(&db);
    let source = DbSource::<MapRow>::table(&p, "orders").with_column_names(["amount"]);
    let dest = MemoryDestination::new(&p);
    source.link_to(&dest)?;
    p.run()?;

    assert_all(&dest.data(), |r| r.len() == 1 && r.contains_key("amount"));
    Ok(())
}

#[test]
fn unconvertible_rows_are_routed() -> Result<()> {
    let db = orders_db()?;
    db.insert_rows("orders", vec![vec![Value::Int(4), Value::from("C"), Value::from("lots")]])?;
    let p = pipeline_for(&db);
    let source = DbSource::<Order>::table(&p, "orders");
    let dest = MemoryDestination::new(&p);
    let errors = MemoryDestination::<ErrorRecord>::new(&p);
    source.link_to(&dest)?;
    source.link_errors_to(&errors)?;
    p.run()?;

    assert_eq!(dest.len(), 3);
    let routed = errors.data();
    assert_eq!(routed.len(), 1);
    assert!(matches!(routed[0].error, EtlError::Field(_)));
    Ok(())
}

#[test]
fn missing_connection_manager_is_a_configuration_error() -> Result<()> {
    let p = Pipeline::default();
    let source = DbSource::<MapRow>::table(&p, "orders");
    let dest = MemoryDestination::new(&p);
    source.link_to(&dest)?;

    let err = p.run().expect_err("no connection");
    assert!(err.is_configuration());
    Ok(())
}

#[test]
fn writes_batches_skipping_identity_columns() -> Result<()> {
    let db = MemoryDatabase::new();
    db.create_table(TableDefinition::new(
        "archive",
        vec![
            TableColumn::new("row_id", "INT").identity(100, 10),
            TableColumn::new("id", "INT"),
            TableColumn::new("category", "NVARCHAR(10)"),
            TableColumn::new("amount", "INT"),
        ],
    ));
    let p = pipeline_for(&db);
    let source = MemorySource::new(&p, sample_orders());
    let dest = DbDestination::<Order>::new(&p, "archive").with_batch_size(2);
    source.link_to(&dest)?;
    p.run()?;

    let rows = db.rows_as_maps("archive")?;
    let row_ids: Vec<Value> = rows.iter().map(|r| r["row_id"].clone()).collect();
    assert_eq!(row_ids, vec![Value::Int(100), Value::Int(110), Value::Int(120)]);
    assert_eq!(rows[2]["category"], Value::from("B"));

    let bulk: Vec<String> = db
        .statements()
        .into_iter()
        .filter(|s| s.starts_with("BULK INSERT"))
        .collect();
    assert_eq!(bulk, vec!["BULK INSERT archive (2 rows)", "BULK INSERT archive (1 rows)"]);
    Ok(())
}

#[test]
fn array_rows_map_positionally() -> Result<()> {
    let db = MemoryDatabase::new();
    db.create_table(TableDefinition::new(
        "pairs",
        vec![TableColumn::new("a", "INT"), TableColumn::new("b", "TEXT")],
    ));
    let p = pipeline_for(&db);
    let source = MemorySource::new(&p, vec![vec![Value::Int(1), Value::from("x")]]);
    let dest = DbDestination::<Vec<Value>>::new(&p, "pairs");
    source.link_to(&dest)?;
    p.run()?;

    assert_eq!(db.rows("pairs")?, vec![vec![Value::Int(1), Value::from("x")]]);
    Ok(())
}

#[test]
fn missing_destination_table_is_a_configuration_error() -> Result<()> {
    let db = MemoryDatabase::new();
    let p = pipeline_for(&db);
    let source = MemorySource::new(&p, sample_orders());
    let dest = DbDestination::<Order>::new(&p, "nowhere");
    source.link_to(&dest)?;

    let err = p.run().expect_err("missing table");
    assert!(err.is_configuration());
    assert!(err.to_string().contains("no table definition for nowhere"));
    Ok(())
}

#[test]
fn explicit_definition_skips_lookup() -> Result<()> {
    let db = orders_db()?;
    let p = pipeline_for(&db);
    let definition = TableDefinition::new(
        "orders",
        vec![
            TableColumn::new("id", "INT"),
            TableColumn::new("category", "NVARCHAR(10)"),
            TableColumn::new("amount", "INT").computed("id * 2"),
        ],
    );
    let source = MemorySource::new(&p, vec![Order::new(9, "Z", 99)]);
    let dest = DbDestination::<Order>::new(&p, "orders").with_table_definition(definition);
    source.link_to(&dest)?;
    p.run()?;

    let rows = db.rows_as_maps("orders")?;
    let last = rows.last().expect("inserted row");
    assert_eq!(last["id"], Value::Int(9));
    assert_eq!(last["amount"], Value::Null);
    Ok(())
}

#[test]
fn connection_is_retried() -> Result<()> {
    let db = orders_db()?;
    db.fail_next_opens(2);
    let p = pipeline_for(&db);
    let source = DbSource::<Order>::table(&p, "orders");
    let dest = MemoryDestination::new(&p);
    source.link_to(&dest)?;
    p.run()?;

    assert_eq!(db.open_count(), 3);
    assert_eq!(dest.len(), 3);
    Ok(())
}

#[test]
fn connection_gives_up_after_max_attempts() -> Result<()> {
    let db = orders_db()?;
    db.fail_next_opens(10);
    let p = pipeline_for(&db);
    let source = DbSource::<Order>::table(&p, "orders");
    let dest = MemoryDestination::new(&p);
    source.link_to(&dest)?;

    let err = p.run().expect_err("connection failure");
    assert!(matches!(err, EtlError::Connection { attempts: 3, .. }));
    assert_eq!(db.open_count(), 3);
    Ok(())
}

#[test]
fn node_connection_overrides_context() -> Result<()> {
    let ctx_db = MemoryDatabase::new();
    let own_db = orders_db()?;
    let p = pipeline_for(&ctx_db);
    let source = DbSource::<Order>::table(&p, "orders").with_connection(Arc::new(own_db.clone()));
    let dest = MemoryDestination::new(&p);
    source.link_to(&dest)?;
    p.run()?;

    assert_eq!(dest.len(), 3);
    assert_eq!(ctx_db.open_count(), 0);
    Ok(())
}
