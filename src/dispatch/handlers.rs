// One handler per command. Each validates its own input and output arity,
// marshals arguments, calls exactly one driver method, and marshals the
// result. The arity checks are repeated on purpose; their messages name the
// arguments a caller has to supply.
use tracing::{debug, info};

use crate::core::config::ParamTree;
use crate::core::error::{Error, ErrorKind};
use crate::core::handle::{NativeObject, decode_handle};
use crate::core::marshal;
use crate::core::value::Value;
use crate::dispatch::CallContext;

type HandlerResult = Result<Vec<Value>, Error>;

fn arity(message: &str) -> Error {
    Error::new(ErrorKind::ArityMismatch).with_message(message)
}

fn config_tree(value: &Value) -> Result<ParamTree, Error> {
    let fields = value.as_struct().ok_or_else(|| {
        Error::new(ErrorKind::UnsupportedFieldType).with_message(format!(
            "expected a configuration struct, got {}",
            value.class_name()
        ))
    })?;
    Ok(ParamTree::from_struct(fields))
}

/// Stack result columns into a host matrix, one column per dipole.
fn columns_to_matrix(rows: usize, columns: Vec<Vec<f64>>) -> Result<Value, Error> {
    let cols = columns.len();
    let mut data = Vec::with_capacity(rows * cols);
    for column in &columns {
        if column.len() != rows {
            return Err(Error::new(ErrorKind::Driver).with_message(format!(
                "driver returned a column of {} values, expected {rows}",
                column.len()
            )));
        }
        data.extend_from_slice(column);
    }
    Value::matrix(rows, cols, data)
}

pub(super) fn create(ctx: &mut CallContext<'_>, nargout: usize, args: &[Value]) -> HandlerResult {
    if nargout != 1 {
        return Err(arity("the method returns a handle"));
    }
    if args.len() != 1 {
        return Err(arity("one input required, the configuration struct"));
    }
    let fields = args[0].as_struct().ok_or_else(|| {
        Error::new(ErrorKind::UnsupportedFieldType).with_message(format!(
            "expected a configuration struct, got {}",
            args[0].class_name()
        ))
    })?;
    let data = marshal::extract_fitted_driver_data(fields)?;
    let config = ParamTree::from_struct(fields);
    let driver = ctx.factories.make_driver(&config, data)?;
    let handle = ctx.registry.insert(NativeObject::Driver(driver));
    debug!(handle, "created driver, acquired module lock");
    Ok(vec![Value::uint64_scalar(handle)])
}

pub(super) fn make_domain_function(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
) -> HandlerResult {
    if nargout != 1 {
        return Err(arity("the method returns a handle"));
    }
    if args.len() != 1 {
        return Err(arity("please provide a driver handle"));
    }
    let driver_handle = decode_handle(&args[0])?;
    let function = ctx.registry.driver_mut(driver_handle)?.make_domain_function()?;
    let handle = ctx.registry.insert(NativeObject::Function(function));
    debug!(handle, "created domain function, acquired module lock");
    Ok(vec![Value::uint64_scalar(handle)])
}

pub(super) fn delete_function(
    ctx: &mut CallContext<'_>,
    _nargout: usize,
    args: &[Value],
) -> HandlerResult {
    if args.len() != 1 {
        return Err(arity("please provide a function handle"));
    }
    let handle = decode_handle(&args[0])?;
    ctx.registry.remove_function(handle)?;
    debug!(handle, "deleted domain function, released module lock");
    Ok(Vec::new())
}

pub(super) fn solve_eeg_forward(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
) -> HandlerResult {
    if args.len() < 4 {
        return Err(arity(
            "please provide a handle to the object, the dipole, the solution function and a configuration struct",
        ));
    }
    if nargout != 0 {
        return Err(arity("the method does not return variables"));
    }
    let driver_handle = decode_handle(&args[0])?;
    let dipole = marshal::extract_dipole(&args[1])?;
    let function_handle = decode_handle(&args[2])?;
    let config = config_tree(&args[3])?;
    let (driver, solution) = ctx
        .registry
        .driver_and_function_mut(driver_handle, function_handle)?;
    driver.solve_eeg_forward(&dipole, solution, &config)?;
    Ok(Vec::new())
}

pub(super) fn solve_meg_forward(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
) -> HandlerResult {
    if args.len() < 3 {
        return Err(arity(
            "please provide a handle to the object, a handle to the eeg solution and a configuration struct",
        ));
    }
    if nargout != 1 {
        return Err(arity("the method returns a matrix"));
    }
    let driver_handle = decode_handle(&args[0])?;
    let function_handle = decode_handle(&args[1])?;
    let config = config_tree(&args[2])?;
    let (driver, solution) = ctx
        .registry
        .driver_and_function_mut(driver_handle, function_handle)?;
    let result = driver.solve_meg_forward(&*solution, &config)?;
    Ok(vec![Value::column_vector(result)])
}

fn compute_transfer_matrix(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
    eeg: bool,
) -> HandlerResult {
    if args.len() < 2 {
        return Err(arity(
            "please provide a handle to the object and a configuration struct",
        ));
    }
    if nargout != 1 {
        return Err(arity("the method returns a matrix"));
    }
    let handle = decode_handle(&args[0])?;
    let config = config_tree(&args[1])?;
    let driver = ctx.registry.driver_mut(handle)?;
    let tm = if eeg {
        driver.compute_eeg_transfer_matrix(&config)?
    } else {
        driver.compute_meg_transfer_matrix(&config)?
    };
    // The driver's row-major buffer is handed to the column-major host with
    // the dimensions swapped; the linear data crosses untouched.
    let (rows, cols) = (tm.rows(), tm.cols());
    Ok(vec![Value::matrix(cols, rows, tm.into_data())?])
}

pub(super) fn compute_eeg_transfer_matrix(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
) -> HandlerResult {
    compute_transfer_matrix(ctx, nargout, args, true)
}

pub(super) fn compute_meg_transfer_matrix(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
) -> HandlerResult {
    compute_transfer_matrix(ctx, nargout, args, false)
}

fn apply_transfer(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
    eeg: bool,
) -> HandlerResult {
    if args.len() < 4 {
        return Err(arity(
            "please provide a handle to the object, the transfer matrix, the dipoles and a configuration struct",
        ));
    }
    if nargout != 1 {
        return Err(arity("the method returns a matrix"));
    }
    let handle = decode_handle(&args[0])?;
    let transfer = marshal::extract_dense_matrix(&args[1])?;
    let dipoles = marshal::extract_dipoles(&args[2])?;
    let config = config_tree(&args[3])?;
    let driver = ctx.registry.driver_mut(handle)?;
    let columns = if eeg {
        driver.apply_eeg_transfer(&transfer, &dipoles, &config)?
    } else {
        driver.apply_meg_transfer(&transfer, &dipoles, &config)?
    };
    Ok(vec![columns_to_matrix(transfer.rows(), columns)?])
}

pub(super) fn apply_eeg_transfer(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
) -> HandlerResult {
    apply_transfer(ctx, nargout, args, true)
}

pub(super) fn apply_meg_transfer(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
) -> HandlerResult {
    apply_transfer(ctx, nargout, args, false)
}

pub(super) fn set_electrodes(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
) -> HandlerResult {
    if args.len() < 3 {
        return Err(arity(
            "please provide a handle to the object, the electrodes and a configuration struct",
        ));
    }
    if nargout != 0 {
        return Err(arity("the method does not return variables"));
    }
    let handle = decode_handle(&args[0])?;
    let electrodes = marshal::extract_field_vectors(&args[1])?;
    let config = config_tree(&args[2])?;
    ctx.registry.driver_mut(handle)?.set_electrodes(&electrodes, &config)?;
    Ok(Vec::new())
}

pub(super) fn get_projected_electrodes(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
) -> HandlerResult {
    if args.is_empty() {
        return Err(arity("please provide a handle to the object"));
    }
    if nargout != 1 {
        return Err(arity("the method returns a matrix"));
    }
    let handle = decode_handle(&args[0])?;
    let electrodes = ctx.registry.driver(handle)?.projected_electrodes()?;
    let mut data = Vec::with_capacity(electrodes.len() * 3);
    for point in &electrodes {
        data.extend_from_slice(point);
    }
    Ok(vec![Value::matrix(3, electrodes.len(), data)?])
}

pub(super) fn set_coils_and_projections(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
) -> HandlerResult {
    if args.len() < 3 {
        return Err(arity(
            "please provide a handle to the object, the coils and the projections",
        ));
    }
    if nargout != 0 {
        return Err(arity("the method does not return variables"));
    }
    let handle = decode_handle(&args[0])?;
    let coils = marshal::extract_field_vectors(&args[1])?;
    let projections = marshal::extract_projections(&args[2])?;
    ctx.registry
        .driver_mut(handle)?
        .set_coils_and_projections(&coils, &projections)?;
    Ok(Vec::new())
}

pub(super) fn evaluate_at_electrodes(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
) -> HandlerResult {
    if args.len() < 2 {
        return Err(arity(
            "please provide a handle to the object and a handle to the function",
        ));
    }
    if nargout != 1 {
        return Err(arity("the method returns a matrix"));
    }
    let driver_handle = decode_handle(&args[0])?;
    let function_handle = decode_handle(&args[1])?;
    let driver = ctx.registry.driver(driver_handle)?;
    let solution = ctx.registry.function(function_handle)?;
    let result = driver.evaluate_at_electrodes(solution)?;
    Ok(vec![Value::column_vector(result)])
}

pub(super) fn write(ctx: &mut CallContext<'_>, nargout: usize, args: &[Value]) -> HandlerResult {
    if nargout != 0 {
        return Err(arity("the method does not return variables"));
    }
    match args.len() {
        2 => {
            let handle = decode_handle(&args[0])?;
            let config = config_tree(&args[1])?;
            ctx.registry.driver(handle)?.write(&config)?;
        }
        3 => {
            let driver_handle = decode_handle(&args[0])?;
            let function_handle = decode_handle(&args[1])?;
            let config = config_tree(&args[2])?;
            let driver = ctx.registry.driver(driver_handle)?;
            let solution = ctx.registry.function(function_handle)?;
            driver.write_function(solution, &config)?;
        }
        _ => {
            return Err(arity(
                "please provide a handle to the object, optionally a handle to the function and a configuration struct",
            ));
        }
    }
    Ok(Vec::new())
}

pub(super) fn print_citations(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
) -> HandlerResult {
    if nargout != 0 {
        return Err(arity("the method does not return variables"));
    }
    if args.len() != 1 {
        return Err(arity("please provide a handle to the object"));
    }
    let handle = decode_handle(&args[0])?;
    for citation in ctx.registry.driver(handle)?.citations()? {
        info!("{citation}");
    }
    Ok(Vec::new())
}

pub(super) fn delete(ctx: &mut CallContext<'_>, _nargout: usize, args: &[Value]) -> HandlerResult {
    if args.is_empty() {
        return Err(arity("please provide a handle to the object"));
    }
    let handle = decode_handle(&args[0])?;
    ctx.registry.remove_driver(handle)?;
    debug!(handle, "deleted driver, released module lock");
    Ok(Vec::new())
}

pub(super) fn volume_conductor_vtk_writer(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
) -> HandlerResult {
    if nargout != 1 {
        return Err(arity("the method returns a handle"));
    }
    if args.len() < 2 {
        return Err(arity(
            "please provide a handle to the object and a configuration struct",
        ));
    }
    let driver_handle = decode_handle(&args[0])?;
    let config = config_tree(&args[1])?;
    let writer = ctx
        .registry
        .driver(driver_handle)?
        .volume_conductor_vtk_writer(&config)?;
    let handle = ctx.registry.insert(NativeObject::Writer(writer));
    debug!(handle, "created writer, acquired module lock");
    Ok(vec![Value::uint64_scalar(handle)])
}

pub(super) fn writer_add_vertex_data(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
) -> HandlerResult {
    if nargout != 0 {
        return Err(arity("the method does not return variables"));
    }
    if args.len() < 3 {
        return Err(arity(
            "please provide a writer handle, a function handle and the data name",
        ));
    }
    let writer_handle = decode_handle(&args[0])?;
    let function_handle = decode_handle(&args[1])?;
    let name = args[2].as_str().ok_or_else(|| {
        Error::new(ErrorKind::UnsupportedFieldType).with_message(format!(
            "expected a char array for the data name, got {}",
            args[2].class_name()
        ))
    })?;
    let (writer, function) = ctx
        .registry
        .writer_and_function_mut(writer_handle, function_handle)?;
    writer.add_vertex_data(function, name)?;
    Ok(Vec::new())
}

pub(super) fn writer_write(
    ctx: &mut CallContext<'_>,
    nargout: usize,
    args: &[Value],
) -> HandlerResult {
    if nargout != 0 {
        return Err(arity("the method does not return variables"));
    }
    if args.len() < 2 {
        return Err(arity("please provide a writer handle and a configuration struct"));
    }
    let handle = decode_handle(&args[0])?;
    let config = config_tree(&args[1])?;
    ctx.registry.writer(handle)?.write(&config)?;
    Ok(Vec::new())
}

pub(super) fn delete_writer(
    ctx: &mut CallContext<'_>,
    _nargout: usize,
    args: &[Value],
) -> HandlerResult {
    if args.len() != 1 {
        return Err(arity("please provide a writer handle"));
    }
    let handle = decode_handle(&args[0])?;
    ctx.registry.remove_writer(handle)?;
    debug!(handle, "deleted writer, released module lock");
    Ok(Vec::new())
}
