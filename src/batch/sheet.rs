use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Component, Path};

use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::batch::WorkItem;
use crate::error::SheetError;

/// A CSV row: `custom_params` holds a JSON object as text
#[derive(Debug, Deserialize)]
struct CsvRow {
    sample_id: String,
    data_folder: String,
    pipeline: String,
    reference: String,
    #[serde(default)]
    target_bed: Option<String>,
    #[serde(default)]
    custom_params: Option<String>,
}

/// A YAML or JSON row: `custom_params` is already a mapping
#[derive(Debug, Deserialize)]
struct StructuredRow {
    sample_id: String,
    data_folder: String,
    pipeline: String,
    reference: String,
    #[serde(default)]
    target_bed: Option<String>,
    #[serde(default)]
    custom_params: Option<Value>,
}

/// Read a sample sheet, picking the format from the file extension
///
/// `.csv` is CSV with a header row, `.json` is a JSON array, anything else is a YAML sequence.
/// The whole sheet is validated before any item is returned: a bad row or a repeated sample id
/// rejects the sheet.
pub fn read_sample_sheet(path: &Path) -> Result<Vec<WorkItem>, SheetError> {
    info!("Reading sample sheet {}", path.display());
    let contents = fs::read_to_string(path).map_err(|source| {
        warn!("Can't read sample sheet at {}", path.display());
        SheetError::Read { path: path.to_path_buf(), source }
    })?;

    let items = match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => parse_csv(&contents)?,
        Some("json") => {
            let rows: Vec<Value> = serde_json::from_str(&contents)
                .map_err(|err| SheetError::Decode(err.to_string()))?;
            parse_structured(rows)?
        }
        _ => {
            let rows: Vec<Value> = serde_yaml::from_str(&contents)
                .map_err(|err| SheetError::Decode(err.to_string()))?;
            parse_structured(rows)?
        }
    };

    check_unique(&items)?;
    info!("Sample sheet has {} work items", items.len());
    Ok(items)
}

pub fn parse_csv(contents: &str) -> Result<Vec<WorkItem>, SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());

    let mut items = Vec::new();
    for (i, record) in reader.deserialize::<CsvRow>().enumerate() {
        let row = i + 1;
        let raw = record.map_err(|err| SheetError::Row { row, message: err.to_string() })?;
        let custom = match non_empty(raw.custom_params) {
            Some(text) => {
                let value: Value = serde_json::from_str(&text)
                    .map_err(|err| SheetError::Row { row, message: format!("custom_params is not JSON: {err}") })?;
                Some(value)
            }
            None => None,
        };
        items.push(build(row, raw.sample_id, raw.data_folder, raw.pipeline, raw.reference, raw.target_bed, custom)?);
    }
    Ok(items)
}

fn parse_structured(rows: Vec<Value>) -> Result<Vec<WorkItem>, SheetError> {
    rows.into_iter()
        .enumerate()
        .map(|(i, value)| {
            let row = i + 1;
            let raw: StructuredRow = serde_json::from_value(value)
                .map_err(|err| SheetError::Row { row, message: err.to_string() })?;
            build(row, raw.sample_id, raw.data_folder, raw.pipeline, raw.reference, raw.target_bed, raw.custom_params)
        })
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn build(
    row: usize,
    sample_id: String,
    data_folder: String,
    pipeline: String,
    reference: String,
    target_bed: Option<String>,
    custom: Option<Value>,
) -> Result<WorkItem, SheetError> {
    let required = [("sample_id", &sample_id), ("data_folder", &data_folder), ("pipeline", &pipeline), ("reference", &reference)];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(SheetError::Row { row, message: format!("{name} is empty") });
        }
    }

    // the id names the item's results directory, so it must stay a single plain component
    let mut components = Path::new(sample_id.trim()).components();
    if !matches!((components.next(), components.next()), (Some(Component::Normal(_)), None)) {
        return Err(SheetError::Row { row, message: format!("sample_id '{}' is not a plain name", sample_id.trim()) });
    }

    let custom_parameters: BTreeMap<String, Value> = match custom {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(map)) => map.into_iter().collect(),
        Some(other) => {
            return Err(SheetError::Row { row, message: format!("custom_params must be a mapping, got {other}") });
        }
    };

    let mut item = WorkItem::new(sample_id.trim(), data_folder.trim(), pipeline.trim(), reference.trim());
    if let Some(bed) = non_empty(target_bed) {
        item = item.with_target_regions(bed.trim());
    }
    item.custom_parameters = custom_parameters;
    Ok(item)
}

fn check_unique(items: &[WorkItem]) -> Result<(), SheetError> {
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item.id.as_str()) {
            return Err(SheetError::Duplicate(item.id.clone()));
        }
    }
    Ok(())
}
