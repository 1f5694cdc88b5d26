//! Purpose: Command table and dispatcher for the binding surface.
//! Exports: `Binding`, `CommandTable`, `CommandSpec`, `CallContext`.
//! Role: Routes one host call to exactly one handler and back.
//! Invariants: The table is immutable after construction; there is no lazily
//! initialized global state anywhere in the dispatch path.
//! Invariants: Handlers receive the inputs shifted left by one; the command
//! name itself never reaches them.

mod handlers;

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::handle::HandleRegistry;
use crate::core::value::Value;
use crate::driver::factory::FactoryRegistry;

/// Per-call view handed to handlers: the live object registry plus the
/// backend factories. Nothing else is ambient.
pub struct CallContext<'a> {
    pub registry: &'a mut HandleRegistry,
    pub factories: &'a FactoryRegistry,
}

pub type Handler = fn(&mut CallContext<'_>, usize, &[Value]) -> Result<Vec<Value>, Error>;

pub struct CommandSpec {
    pub name: &'static str,
    pub summary: &'static str,
    handler: Handler,
}

pub struct CommandTable {
    entries: BTreeMap<&'static str, CommandSpec>,
}

impl CommandTable {
    /// The full command set of the binding.
    pub fn standard() -> Self {
        let mut table = Self {
            entries: BTreeMap::new(),
        };
        table.insert("create", "create a driver from a configuration struct", handlers::create);
        table.insert(
            "make_domain_function",
            "create a solution field for a driver",
            handlers::make_domain_function,
        );
        table.insert(
            "delete_function",
            "destroy a solution field",
            handlers::delete_function,
        );
        table.insert(
            "solve_eeg_forward",
            "solve the EEG forward problem into a solution field",
            handlers::solve_eeg_forward,
        );
        table.insert(
            "solve_meg_forward",
            "solve the MEG forward problem from an EEG solution",
            handlers::solve_meg_forward,
        );
        table.insert(
            "compute_eeg_transfer_matrix",
            "precompute the EEG transfer matrix",
            handlers::compute_eeg_transfer_matrix,
        );
        table.insert(
            "compute_meg_transfer_matrix",
            "precompute the MEG transfer matrix",
            handlers::compute_meg_transfer_matrix,
        );
        table.insert(
            "apply_eeg_transfer",
            "apply an EEG transfer matrix to dipoles",
            handlers::apply_eeg_transfer,
        );
        table.insert(
            "apply_meg_transfer",
            "apply an MEG transfer matrix to dipoles",
            handlers::apply_meg_transfer,
        );
        table.insert(
            "set_electrodes",
            "set electrode positions on a driver",
            handlers::set_electrodes,
        );
        table.insert(
            "get_projected_electrodes",
            "read back mesh-projected electrode positions",
            handlers::get_projected_electrodes,
        );
        table.insert(
            "set_coils_and_projections",
            "set MEG coil positions and projection directions",
            handlers::set_coils_and_projections,
        );
        table.insert(
            "evaluate_at_electrodes",
            "evaluate a solution field at the electrodes",
            handlers::evaluate_at_electrodes,
        );
        table.insert(
            "write",
            "write the volume conductor or a solution field",
            handlers::write,
        );
        table.insert(
            "print_citations",
            "log the citations for the active backend",
            handlers::print_citations,
        );
        table.insert("delete", "destroy a driver", handlers::delete);
        table.insert(
            "volume_conductor_vtk_writer",
            "create a visualization writer for the volume conductor",
            handlers::volume_conductor_vtk_writer,
        );
        table.insert(
            "writer_add_vertex_data",
            "attach a solution field to a writer",
            handlers::writer_add_vertex_data,
        );
        table.insert(
            "writer_write",
            "flush a visualization writer",
            handlers::writer_write,
        );
        table.insert(
            "delete_writer",
            "destroy a visualization writer",
            handlers::delete_writer,
        );
        table
    }

    fn insert(&mut self, name: &'static str, summary: &'static str, handler: Handler) {
        self.entries.insert(
            name,
            CommandSpec {
                name,
                summary,
                handler,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandSpec> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One binding session: command table, live objects, and backends.
pub struct Binding {
    table: CommandTable,
    registry: HandleRegistry,
    factories: FactoryRegistry,
}

impl Binding {
    pub fn new(factories: FactoryRegistry) -> Self {
        Self {
            table: CommandTable::standard(),
            registry: HandleRegistry::new(),
            factories,
        }
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Number of live native objects held on behalf of the host.
    pub fn live_objects(&self) -> usize {
        self.registry.live()
    }

    /// Dispatch one host call.
    ///
    /// The first input is the command name; the handler sees the rest.
    /// `nargout` is the number of output values the host expects.
    pub fn call(&mut self, nargout: usize, args: &[Value]) -> Result<Vec<Value>, Error> {
        let Some(first) = args.first() else {
            return Err(
                Error::new(ErrorKind::MissingCommand).with_message("please provide a command")
            );
        };
        let Some(name) = first.as_str() else {
            return Err(Error::new(ErrorKind::MissingCommand)
                .with_message("the first argument has to be the command name string"));
        };
        let Some(spec) = self.table.get(name) else {
            return Err(Error::new(ErrorKind::UnknownCommand)
                .with_message(format!("command \"{name}\" not found"))
                .with_command(name));
        };
        debug!(command = name, nargin = args.len() - 1, nargout, "dispatching");
        let mut ctx = CallContext {
            registry: &mut self.registry,
            factories: &self.factories,
        };
        (spec.handler)(&mut ctx, nargout, &args[1..]).map_err(|err| {
            if err.command().is_none() {
                err.with_command(spec.name)
            } else {
                err
            }
        })
    }
}
