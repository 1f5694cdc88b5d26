//! Purpose: Define the solver collaborator interface consumed by the binding.
//! Exports: `ForwardDriver`, `DomainFunction`, `VolumeWriter`, `Dipole`,
//! `FittedDriverData`, and the backend `factory` registry.
//! Role: Fixed seam between command handlers and external numerics engines.
//! Invariants: No solver mathematics lives in this crate; every method here is
//! implemented by a registered backend.
//! Invariants: All methods report failure through the crate `Error` type so the
//! host sees one uniform fatal-message channel.

pub mod factory;
pub mod null;

use std::any::Any;

use crate::core::config::ParamTree;
use crate::core::error::Error;
use crate::core::matrix::{DenseMatrixView, TransferMatrix};

pub type DriverResult<T> = Result<T, Error>;

/// A point source: position and moment.
///
/// The host encodes a dipole as six doubles `(px, py, pz, mx, my, mz)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dipole {
    pub position: [f64; 3],
    pub moment: [f64; 3],
}

impl Dipole {
    pub fn new(position: [f64; 3], moment: [f64; 3]) -> Self {
        Self { position, moment }
    }
}

/// Discretized volume conductor handed to fitted backends at creation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FittedDriverData {
    pub nodes: Vec<[f64; 3]>,
    pub elements: Vec<Vec<u64>>,
    pub labels: Vec<u64>,
    pub conductivities: Vec<f64>,
    pub tensors: Vec<[[f64; 3]; 3]>,
}

impl FittedDriverData {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.elements.is_empty()
    }
}

/// Opaque solution field (e.g. a potential distribution).
///
/// Backends downcast through `as_any`; the binding never looks inside.
pub trait DomainFunction: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Visualization writer produced by a driver.
pub trait VolumeWriter {
    fn add_vertex_data(&mut self, function: &dyn DomainFunction, name: &str) -> DriverResult<()>;
    fn write(&self, config: &ParamTree) -> DriverResult<()>;
}

/// The forward-modeling driver: one configured problem instance.
pub trait ForwardDriver {
    fn make_domain_function(&mut self) -> DriverResult<Box<dyn DomainFunction>>;

    fn solve_eeg_forward(
        &mut self,
        dipole: &Dipole,
        solution: &mut dyn DomainFunction,
        config: &ParamTree,
    ) -> DriverResult<()>;

    fn solve_meg_forward(
        &mut self,
        solution: &dyn DomainFunction,
        config: &ParamTree,
    ) -> DriverResult<Vec<f64>>;

    fn compute_eeg_transfer_matrix(&mut self, config: &ParamTree) -> DriverResult<TransferMatrix>;

    fn compute_meg_transfer_matrix(&mut self, config: &ParamTree) -> DriverResult<TransferMatrix>;

    fn apply_eeg_transfer(
        &mut self,
        transfer: &DenseMatrixView<'_>,
        dipoles: &[Dipole],
        config: &ParamTree,
    ) -> DriverResult<Vec<Vec<f64>>>;

    fn apply_meg_transfer(
        &mut self,
        transfer: &DenseMatrixView<'_>,
        dipoles: &[Dipole],
        config: &ParamTree,
    ) -> DriverResult<Vec<Vec<f64>>>;

    fn set_electrodes(&mut self, electrodes: &[[f64; 3]], config: &ParamTree) -> DriverResult<()>;

    fn projected_electrodes(&self) -> DriverResult<Vec<[f64; 3]>>;

    fn set_coils_and_projections(
        &mut self,
        coils: &[[f64; 3]],
        projections: &[Vec<[f64; 3]>],
    ) -> DriverResult<()>;

    fn evaluate_at_electrodes(&self, solution: &dyn DomainFunction) -> DriverResult<Vec<f64>>;

    fn write(&self, config: &ParamTree) -> DriverResult<()>;

    fn write_function(
        &self,
        solution: &dyn DomainFunction,
        config: &ParamTree,
    ) -> DriverResult<()>;

    fn volume_conductor_vtk_writer(
        &self,
        config: &ParamTree,
    ) -> DriverResult<Box<dyn VolumeWriter>>;

    fn citations(&self) -> DriverResult<Vec<String>>;
}
