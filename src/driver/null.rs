// Diagnostic backend. Implements the full driver interface with
// shape-correct, deterministic results and no numerics, so the dispatch and
// marshaling layers can be exercised end to end without a solver library.
use std::any::Any;
use std::fs;

use tracing::debug;

use crate::core::config::ParamTree;
use crate::core::error::{Error, ErrorKind};
use crate::core::matrix::{DenseMatrixView, TransferMatrix};
use crate::driver::{
    Dipole, DomainFunction, DriverResult, FittedDriverData, ForwardDriver, VolumeWriter,
};

#[derive(Debug, Default)]
pub struct NullFunction {
    pub values: Vec<f64>,
}

impl DomainFunction for NullFunction {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn as_null_function(solution: &dyn DomainFunction) -> DriverResult<&NullFunction> {
    solution.as_any().downcast_ref::<NullFunction>().ok_or_else(|| {
        Error::new(ErrorKind::Driver)
            .with_message("domain function does not belong to the null backend")
    })
}

fn as_null_function_mut(solution: &mut dyn DomainFunction) -> DriverResult<&mut NullFunction> {
    solution
        .as_any_mut()
        .downcast_mut::<NullFunction>()
        .ok_or_else(|| {
            Error::new(ErrorKind::Driver)
                .with_message("domain function does not belong to the null backend")
        })
}

fn filename(config: &ParamTree, what: &str) -> DriverResult<String> {
    config
        .get("filename")
        .map(str::to_string)
        .ok_or_else(|| {
            Error::new(ErrorKind::Driver)
                .with_message(format!("{what} requires a \"filename\" config entry"))
        })
}

fn write_file(path: &str, contents: String) -> DriverResult<()> {
    fs::write(path, contents).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message(format!("failed to write {path}"))
            .with_source(err)
    })
}

/// Transfer matrices are filled with a row-major index ramp, which keeps the
/// host-side dimension swap observable.
fn ramp(rows: usize, cols: usize) -> TransferMatrix {
    let mut matrix = TransferMatrix::zeros(rows, cols);
    for row in 0..rows {
        for col in 0..cols {
            matrix.set(row, col, (row * cols + col) as f64);
        }
    }
    matrix
}

pub struct NullDriver {
    node_count: usize,
    element_count: usize,
    electrodes: Vec<[f64; 3]>,
    coils: Vec<[f64; 3]>,
    projections: Vec<Vec<[f64; 3]>>,
}

impl NullDriver {
    pub fn new(_config: &ParamTree, data: FittedDriverData) -> DriverResult<Self> {
        debug!(
            nodes = data.nodes.len(),
            elements = data.elements.len(),
            "creating null driver"
        );
        Ok(Self {
            node_count: data.nodes.len(),
            element_count: data.elements.len(),
            electrodes: Vec::new(),
            coils: Vec::new(),
            projections: Vec::new(),
        })
    }

    fn meg_channel_count(&self) -> usize {
        self.projections.iter().map(Vec::len).sum()
    }
}

impl ForwardDriver for NullDriver {
    fn make_domain_function(&mut self) -> DriverResult<Box<dyn DomainFunction>> {
        Ok(Box::new(NullFunction {
            values: vec![0.0; self.node_count],
        }))
    }

    fn solve_eeg_forward(
        &mut self,
        _dipole: &Dipole,
        solution: &mut dyn DomainFunction,
        _config: &ParamTree,
    ) -> DriverResult<()> {
        let solution = as_null_function_mut(solution)?;
        solution.values = vec![0.0; self.node_count];
        Ok(())
    }

    fn solve_meg_forward(
        &mut self,
        solution: &dyn DomainFunction,
        _config: &ParamTree,
    ) -> DriverResult<Vec<f64>> {
        as_null_function(solution)?;
        Ok(vec![0.0; self.meg_channel_count()])
    }

    fn compute_eeg_transfer_matrix(&mut self, _config: &ParamTree) -> DriverResult<TransferMatrix> {
        Ok(ramp(self.electrodes.len(), self.node_count))
    }

    fn compute_meg_transfer_matrix(&mut self, _config: &ParamTree) -> DriverResult<TransferMatrix> {
        Ok(ramp(self.meg_channel_count(), self.node_count))
    }

    fn apply_eeg_transfer(
        &mut self,
        transfer: &DenseMatrixView<'_>,
        dipoles: &[Dipole],
        _config: &ParamTree,
    ) -> DriverResult<Vec<Vec<f64>>> {
        Ok(dipoles
            .iter()
            .map(|_| vec![0.0; transfer.rows()])
            .collect())
    }

    fn apply_meg_transfer(
        &mut self,
        transfer: &DenseMatrixView<'_>,
        dipoles: &[Dipole],
        _config: &ParamTree,
    ) -> DriverResult<Vec<Vec<f64>>> {
        Ok(dipoles
            .iter()
            .map(|_| vec![0.0; transfer.rows()])
            .collect())
    }

    fn set_electrodes(&mut self, electrodes: &[[f64; 3]], _config: &ParamTree) -> DriverResult<()> {
        self.electrodes = electrodes.to_vec();
        Ok(())
    }

    fn projected_electrodes(&self) -> DriverResult<Vec<[f64; 3]>> {
        // A real backend projects onto the mesh surface; diagnostics echo.
        Ok(self.electrodes.clone())
    }

    fn set_coils_and_projections(
        &mut self,
        coils: &[[f64; 3]],
        projections: &[Vec<[f64; 3]>],
    ) -> DriverResult<()> {
        if coils.len() != projections.len() {
            return Err(Error::new(ErrorKind::CountMismatch).with_message(format!(
                "number of coils ({}) does not match number of projection sets ({})",
                coils.len(),
                projections.len()
            )));
        }
        self.coils = coils.to_vec();
        self.projections = projections.to_vec();
        Ok(())
    }

    fn evaluate_at_electrodes(&self, solution: &dyn DomainFunction) -> DriverResult<Vec<f64>> {
        as_null_function(solution)?;
        Ok(vec![0.0; self.electrodes.len()])
    }

    fn write(&self, config: &ParamTree) -> DriverResult<()> {
        let path = filename(config, "write")?;
        write_file(
            &path,
            format!(
                "null volume conductor: {} nodes, {} elements\n",
                self.node_count, self.element_count
            ),
        )
    }

    fn write_function(
        &self,
        solution: &dyn DomainFunction,
        config: &ParamTree,
    ) -> DriverResult<()> {
        let solution = as_null_function(solution)?;
        let path = filename(config, "write")?;
        write_file(
            &path,
            format!("null solution field: {} values\n", solution.values.len()),
        )
    }

    fn volume_conductor_vtk_writer(
        &self,
        _config: &ParamTree,
    ) -> DriverResult<Box<dyn VolumeWriter>> {
        Ok(Box::new(NullWriter {
            vertex_data: Vec::new(),
        }))
    }

    fn citations(&self) -> DriverResult<Vec<String>> {
        Ok(vec![
            "meegbind null backend: diagnostics only, cite your solver library instead".to_string(),
        ])
    }
}

pub struct NullWriter {
    vertex_data: Vec<String>,
}

impl VolumeWriter for NullWriter {
    fn add_vertex_data(&mut self, function: &dyn DomainFunction, name: &str) -> DriverResult<()> {
        as_null_function(function)?;
        self.vertex_data.push(name.to_string());
        Ok(())
    }

    fn write(&self, config: &ParamTree) -> DriverResult<()> {
        let path = filename(config, "writer_write")?;
        let mut contents = String::from("null vtk writer\n");
        for name in &self.vertex_data {
            contents.push_str("vertex data: ");
            contents.push_str(name);
            contents.push('\n');
        }
        write_file(&path, contents)
    }
}
