use crate::domain::model::LabeledDataset;
use crate::utils::error::{EnsembleError, Result};
use ndarray::{Array2, ArrayView2};
use std::io::{Read, Write};
use std::path::Path;

const MISSING_MARKERS: [&str; 5] = ["", "NA", "NaN", "nan", "?"];

/// Reads a header-bearing CSV. The target defaults to the last column; every
/// other column must be numeric (missing markers become NaN).
pub fn read_dataset<P: AsRef<Path>>(path: P, target: Option<&str>) -> Result<LabeledDataset> {
    let file = std::fs::File::open(path.as_ref())?;
    read_dataset_from_reader(file, target)
}

pub fn read_dataset_from_reader<R: Read>(reader: R, target: Option<&str>) -> Result<LabeledDataset> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    if headers.len() < 2 {
        return Err(EnsembleError::DataError {
            message: format!(
                "expected at least one feature column and a target column, found {} columns",
                headers.len()
            ),
        });
    }

    let target_idx = match target {
        Some(name) => headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| EnsembleError::DataError {
                message: format!("target column '{}' not found in header {:?}", name, headers),
            })?,
        None => headers.len() - 1,
    };

    let feature_names: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != target_idx)
        .map(|(_, h)| h.clone())
        .collect();

    let mut values = Vec::new();
    let mut labels = Vec::new();
    for (row_no, record) in rdr.records().enumerate() {
        let record = record?;
        for (col, cell) in record.iter().enumerate() {
            if col == target_idx {
                labels.push(cell.to_string());
            } else {
                values.push(parse_cell(cell, row_no, &headers[col])?);
            }
        }
    }

    let features = to_matrix(values, labels.len(), feature_names.len())?;
    tracing::debug!(
        "Read {} rows, {} features, target '{}'",
        features.nrows(),
        features.ncols(),
        headers[target_idx]
    );

    Ok(LabeledDataset {
        feature_names,
        target_name: headers[target_idx].clone(),
        features,
        labels,
    })
}

/// Reads every column as a feature, skipping `drop_column` if it is present.
pub fn read_features<P: AsRef<Path>>(path: P, drop_column: Option<&str>) -> Result<(Vec<String>, Array2<f64>)> {
    let file = std::fs::File::open(path.as_ref())?;
    read_features_from_reader(file, drop_column)
}

pub fn read_features_from_reader<R: Read>(
    reader: R,
    drop_column: Option<&str>,
) -> Result<(Vec<String>, Array2<f64>)> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let skip = drop_column.and_then(|name| headers.iter().position(|h| h == name));
    let names: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != skip)
        .map(|(_, h)| h.clone())
        .collect();
    if names.is_empty() {
        return Err(EnsembleError::DataError {
            message: "no feature columns found".to_string(),
        });
    }

    let mut values = Vec::new();
    let mut n_rows = 0;
    for (row_no, record) in rdr.records().enumerate() {
        let record = record?;
        for (col, cell) in record.iter().enumerate() {
            if Some(col) != skip {
                values.push(parse_cell(cell, row_no, &headers[col])?);
            }
        }
        n_rows += 1;
    }

    let features = to_matrix(values, n_rows, names.len())?;
    Ok((names, features))
}

pub fn write_predictions<P: AsRef<Path>>(
    path: P,
    labels: &[String],
    probs: Option<(&[String], ArrayView2<f64>)>,
) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_predictions_to(file, labels, probs)
}

/// Writes `prediction[,proba_<class>...]` rows.
pub fn write_predictions_to<W: Write>(
    writer: W,
    labels: &[String],
    probs: Option<(&[String], ArrayView2<f64>)>,
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["prediction".to_string()];
    if let Some((classes, matrix)) = &probs {
        if matrix.nrows() != labels.len() || matrix.ncols() != classes.len() {
            return Err(EnsembleError::ShapeError {
                message: format!(
                    "{} predictions with a {:?} probability matrix over {} classes",
                    labels.len(),
                    matrix.dim(),
                    classes.len()
                ),
            });
        }
        header.extend(classes.iter().map(|c| format!("proba_{}", c)));
    }
    wtr.write_record(&header)?;

    for (i, label) in labels.iter().enumerate() {
        let mut row = vec![label.clone()];
        if let Some((_, matrix)) = &probs {
            row.extend(matrix.row(i).iter().map(|p| format!("{:.6}", p)));
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn parse_cell(cell: &str, row_no: usize, column: &str) -> Result<f64> {
    if MISSING_MARKERS.contains(&cell) {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>().map_err(|_| EnsembleError::DataError {
        message: format!(
            "row {}, column '{}': '{}' is not a number",
            row_no + 1,
            column,
            cell
        ),
    })
}

fn to_matrix(values: Vec<f64>, n_rows: usize, n_cols: usize) -> Result<Array2<f64>> {
    if n_rows == 0 {
        return Err(EnsembleError::DataError {
            message: "CSV contains no data rows".to_string(),
        });
    }
    Array2::from_shape_vec((n_rows, n_cols), values).map_err(|e| EnsembleError::ShapeError {
        message: format!("could not build a {}x{} matrix: {}", n_rows, n_cols, e),
    })
}
