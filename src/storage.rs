//! File-backed table storage.
//!
//! [`DataStorage`] is the read/write capability the pipeline depends on;
//! [`FileDataStorage`] is its only implementation and handles delimited text
//! (through `csv`) and Excel workbooks (read through `calamine`, written
//! through `rust_xlsxwriter`).
//!
//! Reads validate the source path, load the table, trim header whitespace,
//! and apply the optional `apply_dtype` declaration. Writes route the
//! destination through [`versioning::resolve`] before touching the disk.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Reader, open_workbook_auto};
use log::{debug, error, info};
use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Deserializer, de};

use crate::{
    data::{Value, display_cell, parse_naive_datetime},
    error::EtlError,
    io_utils,
    schema::{DtypeDeclaration, apply_dtype_feature},
    table::Table,
    versioning,
};

const DEFAULT_SHEET_NAME: &str = "Sheet1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum FileType {
    Csv,
    Excel,
}

impl FileType {
    pub fn extension(self) -> &'static str {
        match self {
            FileType::Csv => "csv",
            FileType::Excel => "xlsx",
        }
    }
}

impl FromStr for FileType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(FileType::Csv),
            "excel" | "xlsx" => Ok(FileType::Excel),
            other => Err(anyhow!("Unknown file type '{other}'")),
        }
    }
}

impl TryFrom<String> for FileType {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileType::Csv => "csv",
            FileType::Excel => "excel",
        })
    }
}

/// Worksheet chosen by position or by name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SheetSelector {
    Index(usize),
    Name(String),
}

impl Default for SheetSelector {
    fn default() -> Self {
        SheetSelector::Index(0)
    }
}

/// Column chosen by header name or by zero-based position.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ColumnSelector {
    Index(usize),
    Name(String),
}

fn delimiter<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let label = String::deserialize(deserializer)?;
    io_utils::parse_delimiter(&label).map_err(de::Error::custom)
}

/// The `read` section of an input or mapping configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadSpec {
    pub description: String,
    pub path: PathBuf,
    pub file_type: FileType,
    #[serde(deserialize_with = "delimiter")]
    pub separator: u8,
    /// Physical lines (or worksheet rows) skipped before the header row.
    pub skip_rows: usize,
    pub use_cols: Option<Vec<ColumnSelector>>,
    pub sheet_name: SheetSelector,
    pub apply_dtype: Option<DtypeDeclaration>,
    pub encoding: Option<String>,
}

impl Default for ReadSpec {
    fn default() -> Self {
        Self {
            description: String::new(),
            path: PathBuf::new(),
            file_type: FileType::Csv,
            separator: io_utils::DEFAULT_CSV_DELIMITER,
            skip_rows: 0,
            use_cols: None,
            sheet_name: SheetSelector::default(),
            apply_dtype: None,
            encoding: None,
        }
    }
}

/// The `output` section as far as writing is concerned.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriteSpec {
    pub description: String,
    pub path: PathBuf,
    pub file_type: FileType,
    #[serde(deserialize_with = "delimiter")]
    pub separator: u8,
    pub mode: String,
    #[serde(deserialize_with = "crate::config::string_list")]
    pub sheet_naming: Vec<String>,
}

impl Default for WriteSpec {
    fn default() -> Self {
        Self {
            description: String::new(),
            path: PathBuf::new(),
            file_type: FileType::Excel,
            separator: io_utils::DEFAULT_CSV_DELIMITER,
            mode: versioning::MODE_NEW.to_string(),
            sheet_naming: Vec::new(),
        }
    }
}

/// What a write call receives: one table, or several destined for worksheets.
#[derive(Debug, Clone, Copy)]
pub enum Dataset<'a> {
    Single(&'a Table),
    Many(&'a [Table]),
}

impl Dataset<'_> {
    pub fn row_count(&self) -> usize {
        match self {
            Dataset::Single(table) => table.row_count(),
            Dataset::Many(tables) => tables.iter().map(Table::row_count).sum(),
        }
    }
}

pub trait DataStorage {
    fn read(&self, spec: &ReadSpec) -> Result<Table>;

    /// Writes `dataset` and returns the path actually written.
    fn write(&self, spec: &WriteSpec, dataset: Dataset<'_>) -> Result<PathBuf>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileDataStorage;

impl DataStorage for FileDataStorage {
    fn read(&self, spec: &ReadSpec) -> Result<Table> {
        debug!("Entering FileDataStorage::read");
        validate_path(&spec.path)?;
        let mut table = match spec.file_type {
            FileType::Csv => load_csv(spec),
            FileType::Excel => load_excel(spec),
        }
        .with_context(|| format!("Reading {} file {:?}", spec.file_type, spec.path))?;

        if let Some(selectors) = &spec.use_cols {
            table = select_use_cols(&table, selectors)?;
        }
        table.trim_headers();
        if let Some(declaration) = &spec.apply_dtype {
            table = apply_dtype_feature(table, declaration)
                .with_context(|| format!("Applying column types to {:?}", spec.path))?;
        }

        info!(
            "{} records <{}> were read from <{}>",
            spec.description,
            table.row_count(),
            spec.path.display()
        );
        debug!("Leaving FileDataStorage::read");
        Ok(table)
    }

    fn write(&self, spec: &WriteSpec, dataset: Dataset<'_>) -> Result<PathBuf> {
        debug!("Entering FileDataStorage::write");
        if let Dataset::Many(tables) = dataset {
            if spec.file_type == FileType::Csv {
                return Err(EtlError::Unsupported(
                    "CSV file can only handle one transformation. Please elect 'excel' for multiple transformations."
                        .to_string(),
                )
                .into());
            }
            if spec.sheet_naming.len() < tables.len() {
                return Err(EtlError::InvalidConfig(format!(
                    "{} table(s) to write but only {} sheet name(s) configured",
                    tables.len(),
                    spec.sheet_naming.len()
                ))
                .into());
            }
        }

        let final_path = versioning::resolve(&spec.path, spec.file_type, &spec.mode)?;
        match dataset {
            Dataset::Single(table) => match spec.file_type {
                FileType::Csv => write_csv(&final_path, table, spec.separator)?,
                FileType::Excel => write_workbook(&final_path, &[(table, DEFAULT_SHEET_NAME)])?,
            },
            Dataset::Many(tables) => {
                let sheets = tables
                    .iter()
                    .zip(spec.sheet_naming.iter())
                    .map(|(table, name)| (table, name.as_str()))
                    .collect::<Vec<_>>();
                write_workbook(&final_path, &sheets)?;
            }
        }

        info!(
            "{} records <{}> were written to <{}>",
            spec.description,
            dataset.row_count(),
            final_path.display()
        );
        debug!("Leaving FileDataStorage::write");
        Ok(final_path)
    }
}

pub fn validate_path(path: &Path) -> Result<()> {
    if !path.is_file() {
        error!("Provided file path is invalid: <{}>", path.display());
        return Err(EtlError::PathNotFound(path.to_path_buf()).into());
    }
    Ok(())
}

fn load_csv(spec: &ReadSpec) -> Result<Table> {
    let encoding = io_utils::resolve_encoding(spec.encoding.as_deref())?;
    let mut reader = io_utils::open_csv_reader(&spec.path, spec.separator, spec.skip_rows)?;
    let mut records = reader.byte_records();

    let headers = match records.next() {
        Some(record) => io_utils::decode_record(&record.context("Reading header row")?, encoding)?,
        None => return Ok(Table::new()),
    };

    let mut rows = Vec::new();
    for (row_idx, record) in records.enumerate() {
        let line = spec.skip_rows + row_idx + 2;
        let record = record.with_context(|| format!("Reading row {line}"))?;
        let decoded = io_utils::decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {line}"))?;
        if decoded.len() > headers.len() {
            return Err(anyhow!(
                "Row {line} has {} field(s) but the header has {}",
                decoded.len(),
                headers.len()
            ));
        }
        let mut cells = decoded
            .into_iter()
            .map(|field| (!field.is_empty()).then_some(Value::String(field)))
            .collect::<Vec<_>>();
        cells.resize(headers.len(), None);
        rows.push(cells);
    }
    Table::from_rows(headers, rows)
}

fn load_excel(spec: &ReadSpec) -> Result<Table> {
    let mut workbook = open_workbook_auto(&spec.path)
        .with_context(|| format!("Opening workbook {:?}", spec.path))?;
    let sheet_names = workbook.sheet_names();

    // A single-sheet workbook is read regardless of the selector.
    let selector = if sheet_names.len() == 1 {
        SheetSelector::Index(0)
    } else {
        spec.sheet_name.clone()
    };
    let range = match &selector {
        SheetSelector::Index(idx) => workbook
            .worksheet_range_at(*idx)
            .ok_or_else(|| anyhow!("Worksheet #{idx} not found in {:?}", spec.path))?
            .with_context(|| format!("Reading worksheet #{idx}"))?,
        SheetSelector::Name(name) => workbook
            .worksheet_range(name)
            .with_context(|| format!("Reading worksheet '{name}'"))?,
    };

    let mut sheet_rows = range.rows().skip(spec.skip_rows);
    let headers = match sheet_rows.next() {
        Some(row) => row
            .iter()
            .enumerate()
            .map(|(idx, cell)| match excel_cell(cell) {
                Some(value) => value.as_display(),
                None => format!("Unnamed: {idx}"),
            })
            .collect::<Vec<_>>(),
        None => return Ok(Table::new()),
    };
    let rows = sheet_rows
        .map(|row| {
            let mut cells = row.iter().map(excel_cell).collect::<Vec<_>>();
            cells.resize(headers.len(), None);
            cells
        })
        .collect::<Vec<_>>();
    Table::from_rows(headers, rows)
}

fn excel_cell(data: &Data) -> Option<Value> {
    match data {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => Some(Value::String(s.clone())),
        Data::Int(i) => Some(Value::Integer(*i)),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 9.0e15 {
                Some(Value::Integer(*f as i64))
            } else {
                Some(Value::Float(*f))
            }
        }
        Data::Bool(b) => Some(Value::String(b.to_string())),
        Data::DateTime(dt) => dt.as_datetime().map(Value::Date),
        Data::DateTimeIso(s) => Some(
            parse_naive_datetime(s)
                .map(Value::Date)
                .unwrap_or_else(|_| Value::String(s.clone())),
        ),
        Data::DurationIso(s) => Some(Value::String(s.clone())),
    }
}

fn select_use_cols(table: &Table, selectors: &[ColumnSelector]) -> Result<Table> {
    let names = table.column_names();
    let mut wanted = Vec::with_capacity(selectors.len());
    for selector in selectors {
        let idx = match selector {
            ColumnSelector::Name(name) => table
                .column_index(name)
                .ok_or_else(|| EtlError::MissingColumn(name.clone()))?,
            ColumnSelector::Index(idx) if *idx < names.len() => *idx,
            ColumnSelector::Index(idx) => {
                return Err(EtlError::MissingColumn(format!("#{idx}")).into());
            }
        };
        wanted.push(idx);
    }
    // Loaded columns keep their file order.
    wanted.sort_unstable();
    wanted.dedup();
    let selected = wanted
        .into_iter()
        .map(|idx| names[idx].to_string())
        .collect::<Vec<_>>();
    table.select(&selected)
}

fn write_csv(path: &Path, table: &Table, separator: u8) -> Result<()> {
    debug!(
        "Writing csv {:?} with separator '{}'",
        path,
        io_utils::printable_delimiter(separator)
    );
    let mut writer = io_utils::open_csv_writer(path, separator)?;
    writer
        .write_record(table.column_names())
        .context("Writing header row")?;
    for row_idx in 0..table.row_count() {
        let row = table.row(row_idx);
        writer
            .write_record(row.into_iter().map(display_cell))
            .with_context(|| format!("Writing row {}", row_idx + 2))?;
    }
    writer.flush().context("Flushing csv output")?;
    Ok(())
}

fn write_workbook(path: &Path, sheets: &[(&Table, &str)]) -> Result<()> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let date_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");

    for (table, name) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(*name)
            .with_context(|| format!("Naming worksheet '{name}'"))?;
        for (col_idx, column) in table.columns().iter().enumerate() {
            let col = u16::try_from(col_idx).context("Too many columns for a worksheet")?;
            worksheet.write_string_with_format(0, col, &column.name, &header_format)?;
            for (row_idx, cell) in column.cells.iter().enumerate() {
                let row = u32::try_from(row_idx + 1).context("Too many rows for a worksheet")?;
                match cell {
                    None => {}
                    Some(Value::String(s)) => {
                        worksheet.write_string(row, col, s)?;
                    }
                    Some(Value::Integer(i)) => {
                        worksheet.write_number(row, col, *i as f64)?;
                    }
                    Some(Value::Float(f)) => {
                        worksheet.write_number(row, col, *f)?;
                    }
                    Some(Value::Date(dt)) => {
                        worksheet.write_datetime_with_format(row, col, dt, &date_format)?;
                    }
                }
            }
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("Saving workbook {path:?}"))?;
    Ok(())
}
