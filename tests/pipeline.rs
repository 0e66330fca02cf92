mod common;

use calamine::{Data, Reader, open_workbook_auto};
use etl_data::{
    config::{ArgMap, Section},
    data::Value,
    error::EtlError,
    pipeline::{ARG_INPUT_PATH, ARG_MAPPING_PATH, ARG_MODE, ARG_OUTPUT_PATH, Pipeline},
    table::Table,
};
use serde_json::json;

use common::{SALES_CSV, TestWorkspace, read_csv_rows};

fn args(pairs: &[(&str, &std::path::Path)]) -> ArgMap {
    pairs
        .iter()
        .map(|(key, path)| (key.to_string(), path.display().to_string()))
        .collect()
}

fn extraction_config() -> Section {
    Section::from_value(json!({
        "description": "Sales extraction",
        "input": {
            "read": {
                "path": "template.csv",
                "apply_dtype": { "ID": "int", "QTY": "int", "PRICE": "float", "CLIENT": "str" }
            },
            "plugin": "trim_strings"
        },
        "mapping": {
            "read": { "path": "template_mapping.csv" },
            "left_on": "CLIENT",
            "right_on": "CLIENT",
            "fill_column": "Segment"
        },
        "output": {
            "path": "template_out.csv",
            "file_type": "csv",
            "col_rename": { "CLIENT": "Client" },
            "assign_static": { "Source": "erp" }
        }
    }))
    .expect("extraction config")
}

fn transformation_config(file_type: &str) -> Section {
    Section::from_value(json!({
        "description": "Sales transformation",
        "input": {
            "read": {
                "path": "template.csv",
                "apply_dtype": { "ID": "int", "QTY": "int", "PRICE": "float", "REGION": "str" }
            }
        },
        "output": {
            "path": "template.xlsx",
            "file_type": file_type,
            "col_transforms": { "add": "TOTAL", "from": ["QTY", "PRICE"] },
            "sheet_naming": ["REGION"],
            "dest_cols": ["TOTAL", "TOTAL_PCT"]
        },
        "aggregate": { "aggfunc": "sum", "type": "groupby" }
    }))
    .expect("transformation config")
}

#[test]
fn extraction_reads_joins_modifies_and_writes() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("sales.csv", SALES_CSV);
    let mapping = workspace.write("clients.csv", "CLIENT,Segment\nacme,Enterprise\nglobex,SMB\n");
    let output = workspace.join("extracted.csv");
    let run_args = args(&[
        (ARG_INPUT_PATH, input.as_path()),
        (ARG_MAPPING_PATH, mapping.as_path()),
        (ARG_OUTPUT_PATH, output.as_path()),
    ]);

    let table = Pipeline::default()
        .run_extraction(&run_args, &extraction_config())
        .expect("extraction");
    assert_eq!(
        table.column_names(),
        vec!["ID", "QTY", "PRICE", "Client", "Segment", "Source"]
    );
    assert_eq!(table.cell("Segment", 2), Some(&Value::String("Other".into())));

    let (headers, rows) = read_csv_rows(&output);
    assert_eq!(headers, vec!["ID", "QTY", "PRICE", "Client", "Segment", "Source"]);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0], vec!["1", "2", "10.0", "acme", "Enterprise", "erp"]);
    assert_eq!(rows[2][4], "Other");
}

#[test]
fn transformation_writes_shares_and_returns_input_table() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("sales.csv", SALES_CSV);
    let output = workspace.join("summary.xlsx");
    let run_args = args(&[(ARG_INPUT_PATH, input.as_path()), (ARG_OUTPUT_PATH, output.as_path())]);

    let returned: Table = Pipeline::default()
        .run_transformation(&run_args, &transformation_config("excel"))
        .expect("transformation");
    assert_eq!(returned.row_count(), 4);
    assert_eq!(
        returned.column_names(),
        vec!["ID", "QTY", "PRICE", "REGION", "TOTAL"]
    );

    let mut workbook = open_workbook_auto(&output).expect("open summary");
    assert_eq!(workbook.sheet_names(), vec!["REGION".to_string()]);
    let range = workbook.worksheet_range("REGION").expect("region sheet");
    let rows = range.rows().collect::<Vec<_>>();
    assert_eq!(
        rows[0],
        &[
            Data::String("REGION".into()),
            Data::String("TOTAL".into()),
            Data::String("TOTAL_PCT".into())
        ]
    );
    assert_eq!(rows.len(), 4);
    let share_total = rows[1..]
        .iter()
        .filter_map(|row| match row[2] {
            Data::Float(share) => Some(share),
            _ => None,
        })
        .sum::<f64>();
    assert!((share_total - 100.0).abs() < 1e-9);
    assert_eq!(rows[1][0], Data::String("EU".into()));
    assert_eq!(rows[1][1], Data::Float(30.0));
}

#[test]
fn registered_plugin_runs_after_read() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("sales.csv", SALES_CSV);
    let output = workspace.join("summary.xlsx");
    let run_args = args(&[(ARG_INPUT_PATH, input.as_path()), (ARG_OUTPUT_PATH, output.as_path())]);

    let mut config = transformation_config("excel").into_value();
    config["input"]["plugin"] = json!(["unregistered", "first_two_rows"]);
    let config = Section::from_value(config).expect("config");

    let mut pipeline = Pipeline::default();
    pipeline
        .plugins_mut()
        .register("first_two_rows", |table: Table| Ok(table.take_rows(&[0, 1])));
    let returned = pipeline
        .run_transformation(&run_args, &config)
        .expect("transformation");
    assert_eq!(returned.row_count(), 2);
    assert_eq!(returned.cell("ID", 1), Some(&Value::Integer(2)));
}

#[test]
fn transformation_versions_existing_output_unless_overwriting() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("sales.csv", SALES_CSV);
    let output = workspace.join("summary.xlsx");
    let mut run_args = args(&[(ARG_INPUT_PATH, input.as_path()), (ARG_OUTPUT_PATH, output.as_path())]);
    let pipeline = Pipeline::default();
    let config = transformation_config("excel");

    pipeline.run_transformation(&run_args, &config).expect("first run");
    pipeline.run_transformation(&run_args, &config).expect("second run");
    run_args.insert(ARG_MODE.into(), "overwrite".into());
    pipeline.run_transformation(&run_args, &config).expect("third run");

    assert_eq!(
        workspace.file_names(),
        vec!["sales.csv", "summary.xlsx", "summary_1.xlsx"]
    );
}

#[test]
fn transformation_to_csv_is_unsupported() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("sales.csv", SALES_CSV);
    let output = workspace.join("summary.csv");
    let run_args = args(&[(ARG_INPUT_PATH, input.as_path()), (ARG_OUTPUT_PATH, output.as_path())]);

    let err = Pipeline::default()
        .run_transformation(&run_args, &transformation_config("csv"))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EtlError>(),
        Some(EtlError::Unsupported(_))
    ));
    assert!(!output.exists());
}

#[test]
fn missing_input_aborts_before_writing() {
    let workspace = TestWorkspace::new();
    let output = workspace.join("summary.xlsx");
    let run_args = args(&[
        (ARG_INPUT_PATH, workspace.join("absent.csv").as_path()),
        (ARG_OUTPUT_PATH, output.as_path()),
    ]);
    let err = Pipeline::default()
        .run_transformation(&run_args, &transformation_config("excel"))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EtlError>(),
        Some(EtlError::PathNotFound(_))
    ));
    assert!(workspace.file_names().is_empty());
}
