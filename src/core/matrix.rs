// Dense matrix types at the binding boundary.
//
// The host stores matrices column-major; the driver interface consumes and
// produces row-major data. Both directions therefore swap (rows, cols) and
// pass the linear buffer through untouched. That transposition is part of
// the wire contract and must stay bit-exact.
use crate::core::error::{Error, ErrorKind};

/// Read-only row-major view over a caller-owned buffer.
///
/// The borrow ties the view to a single call; it is never stored.
#[derive(Clone, Copy, Debug)]
pub struct DenseMatrixView<'a> {
    rows: usize,
    cols: usize,
    data: &'a [f64],
}

impl<'a> DenseMatrixView<'a> {
    pub fn new(rows: usize, cols: usize, data: &'a [f64]) -> Result<Self, Error> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(Error::new(ErrorKind::ShapeMismatch).with_message(format!(
                "matrix view data length {} does not match {rows}x{cols}",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn data(&self) -> &'a [f64] {
        self.data
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }
}

/// Owned row-major matrix returned by transfer-matrix computations.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl TransferMatrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, Error> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(Error::new(ErrorKind::ShapeMismatch).with_message(format!(
                "transfer matrix data length {} does not match {rows}x{cols}",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::{DenseMatrixView, TransferMatrix};

    #[test]
    fn view_indexes_row_major() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let view = DenseMatrixView::new(2, 3, &data).unwrap();
        assert_eq!(view.get(0, 0), 1.0);
        assert_eq!(view.get(0, 2), 3.0);
        assert_eq!(view.get(1, 0), 4.0);
    }

    #[test]
    fn view_rejects_bad_shape() {
        let data = [1.0, 2.0, 3.0];
        assert!(DenseMatrixView::new(2, 2, &data).is_err());
    }

    #[test]
    fn transfer_matrix_round_trips_data() {
        let mut tm = TransferMatrix::zeros(2, 2);
        tm.set(1, 0, 7.0);
        assert_eq!(tm.get(1, 0), 7.0);
        assert_eq!(tm.into_data(), vec![0.0, 0.0, 7.0, 0.0]);
    }
}
