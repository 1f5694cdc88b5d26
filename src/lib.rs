//! Purpose: Binding layer exposing an EEG/MEG forward-modeling driver to
//! numeric host environments.
//! Exports: `core` (values, marshaling, handles, errors), `driver` (solver
//! collaborator seam), `dispatch` (command table + binding), `abi` (C surface).
//! Role: Library backing the `meegbind` binary, the C ABI, and embedders.
//! Invariants: No solver mathematics lives here; all numerics are delegated
//! through the `driver` traits.
//! Invariants: Every failure reaches the host through the single
//! `core::error::Error` fatal-message channel.
pub mod abi;
pub mod core;
pub mod dispatch;
pub mod driver;
