use etl_data::{
    aggregate::{AggFunc, AggStrategy, AggregateSpec, aggregate_feature},
    config::Section,
    data::Value,
    error::EtlError,
    table::{Column, Table},
    transform::{ColumnModifications, TransformSpec, df_col_mods_feature, transform_feature},
};
use serde_json::json;

fn text(value: &str) -> Option<Value> {
    Some(Value::String(value.to_string()))
}

fn sales() -> Table {
    Table::from_columns(vec![
        Column::new("ID", (1..=5).map(|id| Some(Value::Integer(id))).collect()),
        Column::new(
            "QTY",
            vec![
                Some(Value::Integer(2)),
                Some(Value::Integer(1)),
                Some(Value::Integer(4)),
                Some(Value::Integer(3)),
                None,
            ],
        ),
        Column::new(
            "PRICE",
            vec![
                Some(Value::Float(10.0)),
                Some(Value::Float(5.5)),
                Some(Value::Float(2.5)),
                Some(Value::Float(1.0)),
                Some(Value::Float(7.0)),
            ],
        ),
        Column::new("REGION", vec![text("US"), text("EU"), text("US"), text("APAC"), None]),
        Column::new(
            "CLIENT",
            vec![text("acme"), text("globex"), text("initech"), text("acme"), text("acme")],
        ),
    ])
    .expect("sales table")
}

fn transformation_config(aggfunc: &str, strategy: &str) -> Section {
    Section::from_value(json!({
        "description": "Sales",
        "output": {
            "col_transforms": { "add": "TOTAL", "from": ["QTY", "PRICE"] },
            "sheet_naming": ["REGION", "CLIENT"],
            "dest_cols": ["TOTAL", "TOTAL_PCT"]
        },
        "aggregate": { "aggfunc": aggfunc, "type": strategy }
    }))
    .expect("section")
}

fn rows(table: &Table) -> Vec<(String, Option<f64>)> {
    (0..table.row_count())
        .map(|idx| {
            let row = table.row(idx);
            (
                row[0].map(Value::as_display).unwrap_or_default(),
                row[1].and_then(Value::as_f64),
            )
        })
        .collect()
}

#[test]
fn groupby_and_pivot_agree_per_category() {
    let mut table = sales();
    table
        .set_column(
            "TOTAL",
            vec![
                Some(Value::Float(20.0)),
                Some(Value::Float(5.5)),
                Some(Value::Float(10.0)),
                Some(Value::Float(3.0)),
                None,
            ],
        )
        .expect("total column");

    for func in [AggFunc::Sum, AggFunc::Mean, AggFunc::Max, AggFunc::Count] {
        let spec = |strategy| AggregateSpec {
            value_column: "TOTAL".into(),
            dest_column: "TOTAL".into(),
            func,
            strategy,
        };
        let grouped = aggregate_feature(&table, "REGION", &spec(AggStrategy::GroupBy)).expect("groupby");
        let pivoted = aggregate_feature(&table, "REGION", &spec(AggStrategy::Pivot)).expect("pivot");
        assert_eq!(grouped.column_names(), vec!["REGION", "TOTAL"]);
        assert_eq!(pivoted.column_names(), vec!["REGION", "TOTAL"]);

        let mut grouped_rows = rows(&grouped);
        grouped_rows.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(grouped_rows, rows(&pivoted), "{func}");
    }
}

#[test]
fn groupby_keeps_first_appearance_and_pivot_sorts() {
    let mut table = sales();
    table.broadcast("TOTAL", Some(Value::Integer(1)));
    let spec = |strategy| AggregateSpec {
        value_column: "TOTAL".into(),
        dest_column: "COUNT".into(),
        func: AggFunc::Sum,
        strategy,
    };
    let grouped = aggregate_feature(&table, "REGION", &spec(AggStrategy::GroupBy)).expect("groupby");
    let pivoted = aggregate_feature(&table, "REGION", &spec(AggStrategy::Pivot)).expect("pivot");
    assert_eq!(
        rows(&grouped),
        vec![("US".into(), Some(2.0)), ("EU".into(), Some(1.0)), ("APAC".into(), Some(1.0))]
    );
    assert_eq!(
        rows(&pivoted),
        vec![("APAC".into(), Some(1.0)), ("EU".into(), Some(1.0)), ("US".into(), Some(2.0))]
    );
}

#[test]
fn transform_feature_adds_shares_that_sum_to_one_hundred() {
    let spec = TransformSpec::from_section(&transformation_config("sum", "groupby")).expect("spec");
    let mut table = sales();
    let results = transform_feature(&mut table, &spec).expect("transform");

    assert_eq!(table.column_names().last(), Some(&"TOTAL"));
    assert_eq!(table.cell("TOTAL", 0), Some(&Value::Float(20.0)));
    assert_eq!(table.cell("TOTAL", 4), None);

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].column_names(), vec!["REGION", "TOTAL", "TOTAL_PCT"]);
    assert_eq!(results[1].column_names(), vec!["CLIENT", "TOTAL", "TOTAL_PCT"]);
    for result in &results {
        let share_total = result
            .column("TOTAL_PCT")
            .expect("pct column")
            .cells
            .iter()
            .flatten()
            .filter_map(Value::as_f64)
            .sum::<f64>();
        assert!((share_total - 100.0).abs() < 1e-9, "shares sum to {share_total}");
    }

    let by_region = &results[0];
    assert_eq!(by_region.cell("REGION", 0), Some(&Value::String("US".into())));
    assert_eq!(by_region.cell("TOTAL", 0), Some(&Value::Float(30.0)));
    let us_share = by_region.cell("TOTAL_PCT", 0).and_then(Value::as_f64).expect("US share");
    assert!((us_share - 100.0 * 30.0 / 38.5).abs() < 1e-9);
}

#[test]
fn transform_spec_requires_aggregation_keys() {
    let mut config = transformation_config("sum", "groupby").into_value();
    config["aggregate"]
        .as_object_mut()
        .expect("aggregate object")
        .remove("type");
    let err = TransformSpec::from_section(&Section::from_value(config).expect("section")).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EtlError>(),
        Some(EtlError::MissingKey(key)) if key == "type"
    ));

    let err = TransformSpec::from_section(&transformation_config("sum", "crosstab")).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EtlError>(),
        Some(EtlError::InvalidConfig(_))
    ));
}

#[test]
fn column_modifications_rename_before_assigning() {
    let output = Section::from_value(json!({
        "col_rename": { "CLIENT": "Customer", "ID": "Id" },
        "assign_static": { "Customer": "anonymous", "Source": "erp", "Batch": 7 }
    }))
    .expect("output section");
    let mods = ColumnModifications::from_output(&output).expect("mods");

    let mut table = sales();
    let modified = df_col_mods_feature(&mut table, &mods).expect("col mods");
    assert_eq!(
        modified.column_names(),
        vec!["Id", "QTY", "PRICE", "REGION", "Customer", "Source", "Batch"]
    );
    assert_eq!(table.cell("Customer", 3), Some(&Value::String("anonymous".into())));
    assert_eq!(table.cell("Batch", 0), Some(&Value::Integer(7)));
}

#[test]
fn renaming_absent_column_fails_without_changes() {
    let output = Section::from_value(json!({ "col_rename": { "ID": "Id", "DISCOUNT": "Rebate" } }))
        .expect("output section");
    let mods = ColumnModifications::from_output(&output).expect("mods");
    let mut table = sales();
    let err = df_col_mods_feature(&mut table, &mods).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EtlError>(),
        Some(EtlError::MissingColumn(name)) if name == "DISCOUNT"
    ));
    assert_eq!(table.column_names()[0], "ID");
}
