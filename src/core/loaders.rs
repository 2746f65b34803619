//! CSV loaders for embeddings, labels, auxiliary scores and centroids.
//!
//! Every file carries a header row:
//! - Embeddings and centroids: one numeric column per dimension
//! - Labels: a `label` column (other columns such as `index` are ignored)
//! - Scores: a `score` column

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use csv::{Reader, ReaderBuilder};
use thiserror::Error;

use super::embeddings::{EmbeddingSet, InputError};

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid data: {0}")]
    Input(#[from] InputError),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

fn open_csv(path: &Path) -> Result<Reader<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file)))
}

fn parse_field<T: FromStr>(value: &str, row: usize, column: &str) -> Result<T> {
    value.parse().map_err(|_| {
        LoaderError::ParseError(format!(
            "row {}, column '{}': cannot parse '{}'",
            row + 1,
            column,
            value
        ))
    })
}

/// Read every column of every record as `f64`.
fn read_matrix(path: &Path) -> Result<Vec<Vec<f64>>> {
    let mut reader = open_csv(path)?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let values = record
            .iter()
            .zip(headers.iter())
            .map(|(value, column)| parse_field(value, row, column))
            .collect::<Result<Vec<f64>>>()?;
        rows.push(values);
    }

    if rows.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }
    Ok(rows)
}

/// Read the named column (case-insensitive) of every record.
fn read_column<T: FromStr>(path: &Path, column: &str) -> Result<Vec<T>> {
    let mut reader = open_csv(path)?;
    let idx = reader
        .headers()?
        .iter()
        .position(|name| name.eq_ignore_ascii_case(column))
        .ok_or_else(|| {
            LoaderError::MissingColumns(format!("'{}' in {}", column, path.display()))
        })?;

    let mut values = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let value = record.get(idx).ok_or_else(|| {
            LoaderError::ParseError(format!("row {}: missing '{}' field", row + 1, column))
        })?;
        values.push(parse_field(value, row, column)?);
    }

    if values.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }
    Ok(values)
}

/// Load an embedding matrix; rows are items, columns are dimensions.
pub fn load_embeddings_csv<P: AsRef<Path>>(path: P) -> Result<EmbeddingSet> {
    let rows = read_matrix(path.as_ref())?;
    Ok(EmbeddingSet::from_rows(rows)?)
}

/// Load cluster labels from the `label` column.
pub fn load_labels_csv<P: AsRef<Path>>(path: P) -> Result<Vec<i32>> {
    read_column(path.as_ref(), "label")
}

/// Load per-item auxiliary scores from the `score` column.
pub fn load_scores_csv<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    read_column(path.as_ref(), "score")
}

/// Load centroid coordinates, one row per cluster.
pub fn load_centroids_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<f64>>> {
    let rows = read_matrix(path.as_ref())?;
    // Reuse the embedding checks for shape and finiteness
    EmbeddingSet::from_rows(rows.clone())?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[test]
    fn test_load_embeddings_csv() -> Result<()> {
        let file = csv_file(&["e0,e1,e2", "1.0,2.0,3.0", "4.0, 5.0,6.5"]);
        let embeddings = load_embeddings_csv(file.path())?;

        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings.dim(), 3);
        assert_eq!(embeddings.row(1), &[4.0, 5.0, 6.5]);
        Ok(())
    }

    #[test]
    fn test_load_embeddings_rejects_bad_values() {
        let file = csv_file(&["a,b", "1.0,oops"]);
        let err = load_embeddings_csv(file.path()).unwrap_err();
        assert!(matches!(err, LoaderError::ParseError(_)));

        let file = csv_file(&["a,b", "1.0,NaN"]);
        let err = load_embeddings_csv(file.path()).unwrap_err();
        assert!(matches!(
            err,
            LoaderError::Input(InputError::NonFinite { row: 0, column: 1 })
        ));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let file = csv_file(&["a,b", "1.0,2.0", "3.0"]);
        assert!(load_embeddings_csv(file.path()).is_err());
    }

    #[test]
    fn test_header_only_is_empty() {
        let file = csv_file(&["a,b"]);
        let err = load_embeddings_csv(file.path()).unwrap_err();
        assert!(matches!(err, LoaderError::EmptyFile(_)));
    }

    #[test]
    fn test_load_labels_csv() -> Result<()> {
        let file = csv_file(&["index,Label", "0,0", "1,-1", "2,3"]);
        assert_eq!(load_labels_csv(file.path())?, vec![0, -1, 3]);
        Ok(())
    }

    #[test]
    fn test_missing_label_column() {
        let file = csv_file(&["index,cluster", "0,1"]);
        let err = load_labels_csv(file.path()).unwrap_err();
        assert!(matches!(err, LoaderError::MissingColumns(_)));
    }

    #[test]
    fn test_load_scores_csv() -> Result<()> {
        let file = csv_file(&["id,score", "a,0.25", "b,0.75"]);
        assert_eq!(load_scores_csv(file.path())?, vec![0.25, 0.75]);
        Ok(())
    }

    #[test]
    fn test_load_centroids_csv() -> Result<()> {
        let file = csv_file(&["x,y", "0.5,0.5", "10.0,10.0"]);
        let centroids = load_centroids_csv(file.path())?;
        assert_eq!(centroids, vec![vec![0.5, 0.5], vec![10.0, 10.0]]);
        Ok(())
    }
}
