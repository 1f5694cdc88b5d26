// Pure conversions from host values into driver value types.
// Each function validates eagerly and either fully succeeds or aborts the
// call with a descriptive message; nothing is partially extracted.
use tracing::trace;

use crate::core::error::{Error, ErrorKind};
use crate::core::matrix::DenseMatrixView;
use crate::core::value::{Fields, NumArray, Value};
use crate::driver::{Dipole, FittedDriverData};

fn expect_double<'a>(value: &'a Value, what: &str) -> Result<&'a NumArray<f64>, Error> {
    value.as_double().ok_or_else(|| {
        Error::new(ErrorKind::UnsupportedFieldType)
            .with_message(format!("expected double matrix for {what}, got {}", value.class_name()))
    })
}

/// Extract a single dipole from a 6-element double buffer
/// `(px, py, pz, mx, my, mz)`.
pub fn extract_dipole(value: &Value) -> Result<Dipole, Error> {
    let array = expect_double(value, "dipole")?;
    if array.len() != 6 {
        return Err(Error::new(ErrorKind::ShapeMismatch)
            .with_message("number of elements has to be two times the number of dims, i.e. 6"));
    }
    let data = array.data();
    let mut position = [0.0; 3];
    let mut moment = [0.0; 3];
    position.copy_from_slice(&data[..3]);
    moment.copy_from_slice(&data[3..6]);
    Ok(Dipole::new(position, moment))
}

/// Extract dipoles from a 6×N double buffer, one dipole per column.
pub fn extract_dipoles(value: &Value) -> Result<Vec<Dipole>, Error> {
    let array = expect_double(value, "dipoles")?;
    if array.rows() != 6 {
        return Err(Error::new(ErrorKind::ShapeMismatch)
            .with_message("number of rows has to be two times the number of dims, i.e. 6"));
    }
    let mut output = Vec::with_capacity(array.cols());
    for i in 0..array.cols() {
        let column = array.column(i);
        let mut position = [0.0; 3];
        let mut moment = [0.0; 3];
        position.copy_from_slice(&column[..3]);
        moment.copy_from_slice(&column[3..6]);
        trace!(?position, ?moment, "extracted dipole");
        output.push(Dipole::new(position, moment));
    }
    Ok(output)
}

/// Extract 3-D points from a 3×N double buffer, one point per column.
pub fn extract_field_vectors(value: &Value) -> Result<Vec<[f64; 3]>, Error> {
    let array = expect_double(value, "field vectors")?;
    if array.rows() != 3 {
        return Err(Error::new(ErrorKind::ShapeMismatch)
            .with_message("number of rows has to be the number of dims, i.e. 3"));
    }
    let mut output = Vec::with_capacity(array.cols());
    for i in 0..array.cols() {
        let column = array.column(i);
        let mut point = [0.0; 3];
        point.copy_from_slice(column);
        trace!(?point, "extracted field vector");
        output.push(point);
    }
    Ok(output)
}

/// Extract per-sensor projection directions from an R×N double buffer where R
/// is a positive multiple of 3; each column yields R/3 vectors.
pub fn extract_projections(value: &Value) -> Result<Vec<Vec<[f64; 3]>>, Error> {
    let array = expect_double(value, "projections")?;
    if array.rows() == 0 || array.rows() % 3 != 0 {
        return Err(Error::new(ErrorKind::ShapeMismatch)
            .with_message("number of rows has to be a positive multiple of the number of dims, i.e. 3"));
    }
    let mut output = Vec::with_capacity(array.cols());
    for i in 0..array.cols() {
        let column = array.column(i);
        let mut current = Vec::with_capacity(array.rows() / 3);
        for chunk in column.chunks_exact(3) {
            let mut vector = [0.0; 3];
            vector.copy_from_slice(chunk);
            current.push(vector);
        }
        output.push(current);
    }
    Ok(output)
}

/// Borrow a host matrix as a row-major view with dimensions transposed.
///
/// The host buffer is column-major; re-declaring it row-major with
/// `rows = host cols` aliases the same bytes in the layout the driver
/// interface expects. No validation beyond the class check.
pub fn extract_dense_matrix(value: &Value) -> Result<DenseMatrixView<'_>, Error> {
    let array = expect_double(value, "dense matrix")?;
    DenseMatrixView::new(array.cols(), array.rows(), array.data())
}

/// Assemble `FittedDriverData` from the `volume_conductor` sub-record of a
/// creation config, if present.
///
/// Mirrors the flattener's permissiveness for absent branches: missing or
/// wrong-class sub-fields leave the corresponding data empty. Shape, index
/// bounds, and label counts of present branches are validated strictly.
pub fn extract_fitted_driver_data(config: &Fields) -> Result<FittedDriverData, Error> {
    let mut data = FittedDriverData::default();
    let Some(vc) = config.get("volume_conductor").and_then(Value::as_struct) else {
        return Ok(data);
    };

    if let Some(grid) = vc.get("grid").and_then(Value::as_struct) {
        let nodes = grid.get("nodes").and_then(Value::as_double);
        let elements = grid.get("elements").and_then(Value::as_uint64);
        if let (Some(nodes), Some(elements)) = (nodes, elements) {
            if nodes.rows() != 3 {
                return Err(Error::new(ErrorKind::ShapeMismatch)
                    .with_message("number of rows of the node array has to match the dimension"));
            }
            for i in 0..nodes.cols() {
                let column = nodes.column(i);
                let mut coordinate = [0.0; 3];
                coordinate.copy_from_slice(column);
                data.nodes.push(coordinate);
            }
            for i in 0..elements.cols() {
                let element: Vec<u64> = elements.column(i).to_vec();
                for &index in &element {
                    if index as usize >= data.nodes.len() {
                        return Err(Error::new(ErrorKind::IndexOutOfBounds).with_message(format!(
                            "node index {index} out of bounds ({})",
                            data.nodes.len()
                        )));
                    }
                }
                data.elements.push(element);
            }
        }
    }

    if let Some(tensors) = vc.get("tensors").and_then(Value::as_struct) {
        let labels = tensors.get("labels").and_then(Value::as_uint64);
        let conductivities = tensors.get("conductivities").and_then(Value::as_double);
        if let (Some(labels), Some(conductivities)) = (labels, conductivities) {
            data.labels.extend_from_slice(labels.data());
            data.conductivities.extend_from_slice(conductivities.data());
        }
        if let Some(explicit) = tensors.get("tensors").and_then(Value::as_double) {
            if explicit.rows() != 9 {
                return Err(Error::new(ErrorKind::ShapeMismatch)
                    .with_message("tensor array needs nine rows, one 3x3 tensor per column"));
            }
            for i in 0..explicit.cols() {
                let column = explicit.column(i);
                let mut tensor = [[0.0; 3]; 3];
                for col in 0..3 {
                    for row in 0..3 {
                        tensor[row][col] = column[col * 3 + row];
                    }
                }
                data.tensors.push(tensor);
            }
        }
    }

    if !data.labels.is_empty() && !data.elements.is_empty() && data.labels.len() != data.elements.len()
    {
        return Err(Error::new(ErrorKind::CountMismatch).with_message(format!(
            "number of labels ({}) does not match number of elements ({})",
            data.labels.len(),
            data.elements.len()
        )));
    }

    Ok(data)
}
