use std::path::PathBuf;

use etl_data::{
    aggregate::{AggFunc, AggStrategy},
    config::{ArgMap, FeatureKind, ProcessConfig},
    error::EtlError,
    join::MappingSpec,
    storage::{ColumnSelector, FileType, ReadSpec},
    transform::TransformSpec,
};

fn sample_config() -> ProcessConfig {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("config")
        .join("sales_report.json");
    ProcessConfig::load(&path).expect("load sample config")
}

#[test]
fn sample_extraction_section_parses() {
    let extraction = sample_config()
        .feature(FeatureKind::Extraction)
        .expect("extraction section");
    let read = extraction
        .require_section("input")
        .and_then(|input| input.require_section("read"))
        .and_then(|read| read.deserialize::<ReadSpec>())
        .expect("input read");
    assert_eq!(read.file_type, FileType::Csv);
    assert_eq!(read.separator, b',');
    let declared = read.apply_dtype.expect("apply_dtype").column_names();
    assert_eq!(declared, vec!["ID", "QTY", "PRICE", "COUNTRY", "CLIENT"]);

    let mapping = MappingSpec::from_section(&extraction.require_section("mapping").expect("mapping"))
        .expect("mapping spec");
    assert_eq!(mapping.left_on, vec!["COUNTRY"]);
    assert_eq!(mapping.fill_value, "Other");
    assert_eq!(
        mapping.read.use_cols,
        Some(vec![
            ColumnSelector::Name("CODE".into()),
            ColumnSelector::Name("Region".into())
        ])
    );
}

#[test]
fn sample_transformation_section_parses() {
    let transformation = sample_config()
        .feature(FeatureKind::Transformation)
        .expect("transformation section");
    let spec = TransformSpec::from_section(&transformation).expect("transform spec");
    assert_eq!(spec.derived.name, "TOTAL");
    assert_eq!(spec.categories, vec!["Region", "Client"]);
    assert_eq!(spec.dest_cols.1, "TOTAL_PCT");
    assert_eq!(spec.aggregate.func, AggFunc::Sum);
    assert_eq!(spec.aggregate.strategy, AggStrategy::GroupBy);
}

#[test]
fn sample_requires_input_and_output_arguments() {
    let config = sample_config();
    let mut args = ArgMap::new();
    args.insert("input_path".into(), "sales.csv".into());
    let err = config.validate_args(&args).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EtlError>(),
        Some(EtlError::MissingKey(key)) if key == "output_path"
    ));
    args.insert("output_path".into(), "report.xlsx".into());
    config.validate_args(&args).expect("all required arguments present");
}

#[test]
fn missing_feature_section_is_a_missing_key() {
    let config = ProcessConfig::from_json(r#"{"extraction": {"description": "only extraction"}}"#)
        .expect("config");
    let err = config.feature(FeatureKind::Transformation).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EtlError>(),
        Some(EtlError::MissingKey(key)) if key == "transformation"
    ));
}
