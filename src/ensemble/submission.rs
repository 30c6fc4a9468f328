//! Run-level output tables

use ndarray::Array2;
use std::path::Path;

use super::checkpoint::class_columns;
use crate::data::Table;
use crate::error::{Error, Result};
use crate::io::write_atomic;

/// Column holding the fold of origin in the OOF table
pub const FOLD_COLUMN: &str = "fold";

/// Column holding the predicted class in the submission
pub const LABEL_COLUMN: &str = "label";

/// Most probable class per row, lowest index on ties
pub fn finalize(running_sum: &Array2<f32>) -> Vec<usize> {
    running_sum
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (c, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = c;
                }
            }
            best
        })
        .collect()
}

fn check_rows(template: &Table, rows: usize) -> Result<()> {
    if template.len() != rows {
        return Err(Error::ShapeMismatch {
            expected: vec![template.len()],
            got: vec![rows],
        });
    }
    Ok(())
}

/// Template columns whose header is not a class column
fn non_class_columns(template: &Table, classes: &[String]) -> Vec<usize> {
    (0..template.headers.len())
        .filter(|&i| !classes.contains(&template.headers[i]))
        .collect()
}

/// Submission template followed by the class probability columns
///
/// Template columns named like a class column are replaced.
pub fn sum_table(template: &Table, running_sum: &Array2<f32>) -> Result<Table> {
    check_rows(template, running_sum.nrows())?;
    let classes = class_columns(running_sum.ncols());
    let keep = non_class_columns(template, &classes);

    let mut headers: Vec<String> = keep.iter().map(|&i| template.headers[i].clone()).collect();
    headers.extend(classes);
    let rows = template
        .rows
        .iter()
        .zip(running_sum.rows())
        .map(|(cells, probs)| {
            let mut row: Vec<String> = keep.iter().map(|&i| cells[i].clone()).collect();
            row.extend(probs.iter().map(|p| p.to_string()));
            row
        })
        .collect();
    Ok(Table { headers, rows })
}

/// Out-of-fold probabilities and fold of origin, one row per training example
///
/// Rows of folds that have not run yet are empty cells.
pub fn oof_table(oof: &Array2<f32>, folds: &[Option<usize>]) -> Result<Table> {
    if folds.len() != oof.nrows() {
        return Err(Error::ShapeMismatch {
            expected: vec![oof.nrows()],
            got: vec![folds.len()],
        });
    }
    let mut headers = class_columns(oof.ncols());
    headers.push(FOLD_COLUMN.to_string());

    let rows = oof
        .rows()
        .into_iter()
        .zip(folds)
        .map(|(probs, fold)| {
            let mut row: Vec<String> = probs
                .iter()
                .map(|p| if p.is_nan() { String::new() } else { p.to_string() })
                .collect();
            row.push(fold.map(|f| (f + 1).to_string()).unwrap_or_default());
            row
        })
        .collect();
    Ok(Table { headers, rows })
}

/// Submission template with the predicted `label` column
///
/// Template columns named like one of the `num_classes` class columns are
/// dropped.
pub fn submission_table(template: &Table, labels: &[usize], num_classes: usize) -> Result<Table> {
    check_rows(template, labels.len())?;
    let keep = non_class_columns(template, &class_columns(num_classes));
    let mut headers: Vec<String> = keep.iter().map(|&i| template.headers[i].clone()).collect();
    let column = match headers.iter().position(|h| h == LABEL_COLUMN) {
        Some(column) => column,
        None => {
            headers.push(LABEL_COLUMN.to_string());
            headers.len() - 1
        }
    };
    let rows = template
        .rows
        .iter()
        .zip(labels)
        .map(|(cells, label)| {
            let mut row: Vec<String> = keep.iter().map(|&i| cells[i].clone()).collect();
            if column == row.len() {
                row.push(label.to_string());
            } else {
                row[column] = label.to_string();
            }
            row
        })
        .collect();
    Ok(Table { headers, rows })
}

/// Write the predicted labels of `running_sum` into `path` as a submission
pub fn write_submission(path: &Path, template: &Table, running_sum: &Array2<f32>) -> Result<()> {
    let table = submission_table(template, &finalize(running_sum), running_sum.ncols())?;
    write_atomic(path, &table.to_csv()?)
}
