//! Per-fold prediction files and checkpoint reconstruction

use ndarray::Array2;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::manifest::{sha256_hex, Manifest};
use crate::cv::fold_dir_name;
use crate::data::Table;
use crate::error::{Error, Result};

pub const TEST_PREDICTIONS_FILE: &str = "test_predictions.csv";
pub const VALID_PREDICTIONS_FILE: &str = "valid_predictions.csv";

/// Column name of the training row in validation prediction files
pub const INDEX_COLUMN: &str = "index";

/// Probability column names `0..classes`
pub fn class_columns(classes: usize) -> Vec<String> {
    (0..classes).map(|c| c.to_string()).collect()
}

pub fn test_predictions_path(run_dir: &Path, fold: usize) -> PathBuf {
    run_dir.join(fold_dir_name(fold)).join(TEST_PREDICTIONS_FILE)
}

pub fn valid_predictions_path(run_dir: &Path, fold: usize) -> PathBuf {
    run_dir.join(fold_dir_name(fold)).join(VALID_PREDICTIONS_FILE)
}

/// CSV bytes of a probability matrix, optionally prefixed by row indices
pub fn predictions_csv(probs: &Array2<f32>, index: Option<&[usize]>) -> Result<Vec<u8>> {
    let mut headers = Vec::new();
    if index.is_some() {
        headers.push(INDEX_COLUMN.to_string());
    }
    headers.extend(class_columns(probs.ncols()));

    let rows = probs
        .rows()
        .into_iter()
        .enumerate()
        .map(|(r, row)| {
            let mut cells = Vec::with_capacity(headers.len());
            if let Some(index) = index {
                cells.push(index[r].to_string());
            }
            cells.extend(row.iter().map(|p| p.to_string()));
            cells
        })
        .collect();

    Table { headers, rows }.to_csv()
}

/// Parse a file written by [`predictions_csv`]
pub fn parse_predictions(
    bytes: &[u8],
    classes: usize,
) -> Result<(Option<Vec<usize>>, Array2<f32>)> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let indexed = headers.first().map(String::as_str) == Some(INDEX_COLUMN);
    let offset = usize::from(indexed);
    if headers[offset..] != class_columns(classes)[..] {
        return Err(Error::Checkpoint(format!(
            "unexpected prediction columns {headers:?}"
        )));
    }

    let mut index = Vec::new();
    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        if indexed {
            index.push(record[0].parse::<usize>().map_err(|e| {
                Error::Checkpoint(format!("bad row index '{}': {e}", &record[0]))
            })?);
        }
        for cell in record.iter().skip(offset) {
            values.push(cell.parse::<f32>().map_err(|e| {
                Error::Checkpoint(format!("bad probability '{cell}': {e}"))
            })?);
        }
    }

    let rows = values.len() / classes.max(1);
    let probs = Array2::from_shape_vec((rows, classes), values)
        .map_err(|e| Error::Checkpoint(e.to_string()))?;
    Ok((indexed.then_some(index), probs))
}

/// State rebuilt from the completed folds of a run
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// Test probabilities per completed fold
    pub contributions: BTreeMap<usize, Array2<f32>>,
    /// Out-of-fold probabilities, NaN for rows of unfinished folds
    pub oof: Array2<f32>,
    /// Fold that produced each OOF row
    pub oof_fold: Vec<Option<usize>>,
}

impl Checkpoint {
    /// Empty state for a run with the given shape
    pub fn empty(num_train: usize, classes: usize) -> Self {
        Self {
            contributions: BTreeMap::new(),
            oof: Array2::from_elem((num_train, classes), f32::NAN),
            oof_fold: vec![None; num_train],
        }
    }

    /// Elementwise sum of the fold contributions, in fold order
    pub fn running_sum(&self, num_test: usize, classes: usize) -> Array2<f32> {
        let mut sum = Array2::zeros((num_test, classes));
        for probs in self.contributions.values() {
            sum += probs;
        }
        sum
    }
}

fn read_verified(path: &Path, expected_sha: &str) -> Result<Vec<u8>> {
    let bytes = fs::read(path).map_err(|e| {
        Error::Checkpoint(format!("cannot read {}: {e}", path.display()))
    })?;
    let actual = sha256_hex(&bytes);
    if actual != expected_sha {
        return Err(Error::Checkpoint(format!(
            "checksum mismatch for {}: manifest {expected_sha}, file {actual}",
            path.display()
        )));
    }
    Ok(bytes)
}

/// Rebuild the running sum and OOF matrix from manifest-listed folds
///
/// Every file is checked against its manifest checksum. Folds the manifest
/// does not list are ignored, whatever files they left behind.
pub fn load_checkpoint(
    run_dir: &Path,
    manifest: &Manifest,
    num_train: usize,
) -> Result<Checkpoint> {
    let classes = manifest.fingerprint.num_classes;
    let num_test = manifest.fingerprint.num_test;
    let mut state = Checkpoint::empty(num_train, classes);

    for record in &manifest.folds {
        let bytes = read_verified(
            &test_predictions_path(run_dir, record.fold),
            &record.test_sha256,
        )?;
        let (_, test) = parse_predictions(&bytes, classes)?;
        if test.dim() != (num_test, classes) {
            return Err(Error::Checkpoint(format!(
                "fold {} test predictions have shape {:?}, expected {:?}",
                record.fold + 1,
                test.dim(),
                (num_test, classes)
            )));
        }
        state.contributions.insert(record.fold, test);

        let bytes = read_verified(
            &valid_predictions_path(run_dir, record.fold),
            &record.valid_sha256,
        )?;
        let (index, valid) = parse_predictions(&bytes, classes)?;
        let index = index.ok_or_else(|| {
            Error::Checkpoint(format!("fold {} validation file has no index", record.fold + 1))
        })?;
        if index.len() != record.valid_size {
            return Err(Error::Checkpoint(format!(
                "fold {} lists {} validation rows, file has {}",
                record.fold + 1,
                record.valid_size,
                index.len()
            )));
        }
        for (row, &i) in index.iter().enumerate() {
            if i >= num_train {
                return Err(Error::Checkpoint(format!(
                    "fold {} validation row {i} outside [0, {num_train})",
                    record.fold + 1
                )));
            }
            state.oof.row_mut(i).assign(&valid.row(row));
            state.oof_fold[i] = Some(record.fold);
        }
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::SplitFingerprint;
    use crate::ensemble::manifest::{FoldRecord, RunFingerprint};
    use ndarray::array;
    use tempfile::TempDir;

    fn write(path: PathBuf, bytes: &[u8]) -> String {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bytes).unwrap();
        sha256_hex(bytes)
    }

    fn manifest() -> Manifest {
        Manifest::new(RunFingerprint {
            split: SplitFingerprint::new(&[0, 1, 0, 1], 2, 1),
            num_classes: 2,
            num_test: 2,
        })
    }

    fn commit(
        dir: &Path,
        m: &mut Manifest,
        fold: usize,
        test: &Array2<f32>,
        idx: &[usize],
        valid: &Array2<f32>,
    ) {
        let test_sha = write(
            test_predictions_path(dir, fold),
            &predictions_csv(test, None).unwrap(),
        );
        let valid_sha = write(
            valid_predictions_path(dir, fold),
            &predictions_csv(valid, Some(idx)).unwrap(),
        );
        m.record(FoldRecord {
            fold,
            valid_size: idx.len(),
            test_sha256: test_sha,
            valid_sha256: valid_sha,
            completed_at: chrono::Utc::now(),
        });
    }

    fn commit_first(dir: &Path, m: &mut Manifest) {
        commit(
            dir,
            m,
            0,
            &array![[0.5, 0.5], [0.25, 0.75]],
            &[0, 3],
            &array![[0.875, 0.125], [0.375, 0.625]],
        );
    }

    #[test]
    fn test_predictions_csv_format() {
        let bytes = predictions_csv(&array![[0.25, 0.75]], Some(&[3])).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "index,0,1\n3,0.25,0.75\n");
    }

    #[test]
    fn test_parse_predictions_exact() {
        let probs = array![[0.1f32, 0.9], [1.0 / 3.0, 2.0 / 3.0]];
        let bytes = predictions_csv(&probs, Some(&[4, 0])).unwrap();
        let (index, parsed) = parse_predictions(&bytes, 2).unwrap();
        assert_eq!(index, Some(vec![4, 0]));
        assert_eq!(parsed, probs);

        assert!(parse_predictions(&bytes, 3).is_err());
    }

    #[test]
    fn test_load_checkpoint_rebuilds_sum_and_oof() {
        let dir = TempDir::new().unwrap();
        let mut m = manifest();
        commit_first(dir.path(), &mut m);
        commit(
            dir.path(),
            &mut m,
            1,
            &array![[0.125, 0.875], [0.5, 0.5]],
            &[1, 2],
            &array![[0.25, 0.75], [0.75, 0.25]],
        );

        let state = load_checkpoint(dir.path(), &m, 4).unwrap();
        // Dyadic values: the sums are exact
        assert_eq!(state.running_sum(2, 2), array![[0.625, 1.375], [0.75, 1.25]]);
        assert_eq!(state.oof.row(3).to_vec(), vec![0.375, 0.625]);
        assert_eq!(state.oof_fold, vec![Some(0), Some(1), Some(1), Some(0)]);
    }

    #[test]
    fn test_unlisted_fold_is_ignored() {
        let dir = TempDir::new().unwrap();
        let mut m = manifest();
        commit_first(dir.path(), &mut m);
        // Interrupted fold: files written, never committed
        let mut scratch = manifest();
        commit(
            dir.path(),
            &mut scratch,
            1,
            &array![[1.0, 0.0], [1.0, 0.0]],
            &[1, 2],
            &array![[1.0, 0.0], [1.0, 0.0]],
        );

        let state = load_checkpoint(dir.path(), &m, 4).unwrap();
        assert_eq!(state.contributions.len(), 1);
        assert!(state.oof.row(1).iter().all(|v| v.is_nan()));
        assert_eq!(state.oof_fold[1], None);
    }

    #[test]
    fn test_tampered_file_is_detected() {
        let dir = TempDir::new().unwrap();
        let mut m = manifest();
        commit_first(dir.path(), &mut m);
        fs::write(test_predictions_path(dir.path(), 0), "0,1\n1,0\n0,1\n").unwrap();

        let err = load_checkpoint(dir.path(), &m, 4).unwrap_err();
        assert!(matches!(err, Error::Checkpoint(_)));
    }

    #[test]
    fn test_missing_file_is_detected() {
        let dir = TempDir::new().unwrap();
        let mut m = manifest();
        commit_first(dir.path(), &mut m);
        fs::remove_file(valid_predictions_path(dir.path(), 0)).unwrap();

        assert!(matches!(
            load_checkpoint(dir.path(), &m, 4),
            Err(Error::Checkpoint(_))
        ));
    }
}
