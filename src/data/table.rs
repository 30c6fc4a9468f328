//! CSV input and output tables

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// One row of an input table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Example {
    pub path: PathBuf,
    pub label: Option<usize>,
}

/// Generic table with string cells
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|r| r.map(|rec| rec.iter().map(str::to_string).collect()))
            .collect::<std::result::Result<Vec<Vec<String>>, csv::Error>>()?;
        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a named column
    pub fn column(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::ConfigError(format!("missing column '{name}'")))
    }

    /// Serialise as CSV bytes
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

fn resolve(root: Option<&Path>, cell: &str) -> PathBuf {
    match root {
        Some(root) => root.join(cell),
        None => PathBuf::from(cell),
    }
}

/// Read the training table (`path`, `label`)
pub fn read_train_table(
    path: &Path,
    root: Option<&Path>,
    num_classes: usize,
) -> Result<Vec<Example>> {
    let table = Table::read(path)?;
    let path_col = table.column("path")?;
    let label_col = table.column("label")?;

    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let raw = row[label_col].trim();
            let label: usize = raw.parse().map_err(|_| {
                Error::ConfigError(format!("row {}: label '{raw}' is not a class index", i + 1))
            })?;
            if label >= num_classes {
                return Err(Error::ConfigError(format!(
                    "row {}: label {label} outside [0, {num_classes})",
                    i + 1
                )));
            }
            Ok(Example {
                path: resolve(root, &row[path_col]),
                label: Some(label),
            })
        })
        .collect()
}

/// Read the test table (`path`)
pub fn read_test_table(path: &Path, root: Option<&Path>) -> Result<Vec<Example>> {
    let table = Table::read(path)?;
    let path_col = table.column("path")?;
    Ok(table
        .rows
        .iter()
        .map(|row| Example {
            path: resolve(root, &row[path_col]),
            label: None,
        })
        .collect())
}

/// Label distribution, for logging
pub fn class_counts(examples: &[Example]) -> HashMap<usize, usize> {
    let mut counts = HashMap::new();
    for label in examples.iter().filter_map(|e| e.label) {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}
