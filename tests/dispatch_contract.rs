// End-to-end dispatch contract against the null backend.
use std::sync::{Arc, Mutex};

use meegbind::core::config::ParamTree;
use meegbind::core::error::ErrorKind;
use meegbind::core::value::{Fields, Value};
use meegbind::dispatch::Binding;
use meegbind::driver::factory::FactoryRegistry;
use meegbind::driver::null::NullDriver;
use meegbind::driver::ForwardDriver;

fn binding() -> Binding {
    Binding::new(FactoryRegistry::with_defaults())
}

/// Creation config: null backend, a four-node one-element mesh, and a nested
/// electrodes sub-record.
fn create_config() -> Value {
    let nodes = Value::matrix(
        3,
        4,
        vec![
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0,
        ],
    )
    .unwrap();
    let elements = Value::uint64_matrix(4, 1, vec![0, 1, 2, 3]).unwrap();
    let grid = Fields::new().with("nodes", nodes).with("elements", elements);
    let vc = Fields::new().with("grid", Value::Struct(grid));
    Value::Struct(
        Fields::new()
            .with("type", Value::string("null"))
            .with(
                "electrodes",
                Value::Struct(Fields::new().with("model", Value::string("test"))),
            )
            .with("volume_conductor", Value::Struct(vc)),
    )
}

fn empty_config() -> Value {
    Value::Struct(Fields::new())
}

fn create_driver(binding: &mut Binding) -> Value {
    let outputs = binding
        .call(1, &[Value::string("create"), create_config()])
        .expect("create");
    assert_eq!(outputs.len(), 1);
    outputs.into_iter().next().unwrap()
}

fn electrodes_3x2() -> Value {
    Value::matrix(3, 2, vec![0.0, 0.0, 1.0, 0.0, 0.0, -1.0]).unwrap()
}

#[test]
fn handles_are_uint64_scalars_and_lifecycle_balances() {
    let mut binding = binding();
    let driver = create_driver(&mut binding);
    let array = driver.as_uint64().expect("driver handle class");
    assert_eq!((array.rows(), array.cols()), (1, 1));
    assert_eq!(binding.live_objects(), 1);

    let function = binding
        .call(1, &[Value::string("make_domain_function"), driver.clone()])
        .expect("make_domain_function")
        .remove(0);
    assert_eq!(binding.live_objects(), 2);

    binding
        .call(0, &[Value::string("delete_function"), function])
        .expect("delete_function");
    binding
        .call(0, &[Value::string("delete"), driver])
        .expect("delete");
    assert_eq!(binding.live_objects(), 0);
}

#[test]
fn eeg_solve_and_evaluate_round_trip() {
    let mut binding = binding();
    let driver = create_driver(&mut binding);
    binding
        .call(
            0,
            &[
                Value::string("set_electrodes"),
                driver.clone(),
                electrodes_3x2(),
                empty_config(),
            ],
        )
        .expect("set_electrodes");
    let function = binding
        .call(1, &[Value::string("make_domain_function"), driver.clone()])
        .expect("make_domain_function")
        .remove(0);
    binding
        .call(
            0,
            &[
                Value::string("solve_eeg_forward"),
                driver.clone(),
                Value::matrix(6, 1, vec![0.0, 0.0, 0.5, 0.0, 0.0, 1.0]).unwrap(),
                function.clone(),
                empty_config(),
            ],
        )
        .expect("solve_eeg_forward");
    let result = binding
        .call(
            1,
            &[
                Value::string("evaluate_at_electrodes"),
                driver.clone(),
                function.clone(),
            ],
        )
        .expect("evaluate_at_electrodes")
        .remove(0);
    let array = result.as_double().expect("double result");
    assert_eq!((array.rows(), array.cols()), (2, 1));
    assert!(array.data().iter().all(|&v| v == 0.0));

    binding
        .call(0, &[Value::string("delete_function"), function])
        .unwrap();
    binding.call(0, &[Value::string("delete"), driver]).unwrap();
}

#[test]
fn meg_solve_returns_one_value_per_projection() {
    let mut binding = binding();
    let driver = create_driver(&mut binding);
    // Two coils, two projection directions per coil.
    let coils = Value::matrix(3, 2, vec![0.0, 0.0, 2.0, 0.0, 0.0, -2.0]).unwrap();
    let projections = Value::matrix(
        6,
        2,
        vec![
            1.0, 0.0, 0.0, 0.0, 1.0, 0.0, //
            1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        ],
    )
    .unwrap();
    binding
        .call(
            0,
            &[
                Value::string("set_coils_and_projections"),
                driver.clone(),
                coils,
                projections,
            ],
        )
        .expect("set_coils_and_projections");
    let function = binding
        .call(1, &[Value::string("make_domain_function"), driver.clone()])
        .unwrap()
        .remove(0);
    let result = binding
        .call(
            1,
            &[
                Value::string("solve_meg_forward"),
                driver.clone(),
                function.clone(),
                empty_config(),
            ],
        )
        .expect("solve_meg_forward")
        .remove(0);
    let array = result.as_double().unwrap();
    assert_eq!((array.rows(), array.cols()), (4, 1));

    binding
        .call(0, &[Value::string("delete_function"), function])
        .unwrap();
    binding.call(0, &[Value::string("delete"), driver]).unwrap();
}

#[test]
fn transfer_matrix_reaches_host_with_dimensions_swapped() {
    let mut binding = binding();
    let driver = create_driver(&mut binding);
    binding
        .call(
            0,
            &[
                Value::string("set_electrodes"),
                driver.clone(),
                electrodes_3x2(),
                empty_config(),
            ],
        )
        .unwrap();

    // The null backend produces a row-major 2x4 index ramp; the host must see
    // a 4x2 value carrying the identical linear data.
    let result = binding
        .call(
            1,
            &[
                Value::string("compute_eeg_transfer_matrix"),
                driver.clone(),
                empty_config(),
            ],
        )
        .expect("compute_eeg_transfer_matrix")
        .remove(0);
    let array = result.as_double().unwrap();
    assert_eq!((array.rows(), array.cols()), (4, 2));
    let expected: Vec<f64> = (0..8).map(|v| v as f64).collect();
    assert_eq!(array.data(), expected.as_slice());

    binding.call(0, &[Value::string("delete"), driver]).unwrap();
}

#[test]
fn apply_transfer_stacks_one_column_per_dipole() {
    let mut binding = binding();
    let driver = create_driver(&mut binding);
    // Host-side 2x3 transfer matrix: the borrowed view is 3x2, so each
    // result column has three values.
    let transfer = Value::matrix(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let dipoles = Value::matrix(
        6,
        2,
        vec![
            0.0, 0.0, 0.0, 0.0, 0.0, 1.0, //
            0.0, 0.0, 1.0, 0.0, 1.0, 0.0,
        ],
    )
    .unwrap();
    let result = binding
        .call(
            1,
            &[
                Value::string("apply_eeg_transfer"),
                driver.clone(),
                transfer,
                dipoles,
                empty_config(),
            ],
        )
        .expect("apply_eeg_transfer")
        .remove(0);
    let array = result.as_double().unwrap();
    assert_eq!((array.rows(), array.cols()), (3, 2));

    binding.call(0, &[Value::string("delete"), driver]).unwrap();
}

#[test]
fn projected_electrodes_come_back_three_by_n() {
    let mut binding = binding();
    let driver = create_driver(&mut binding);
    binding
        .call(
            0,
            &[
                Value::string("set_electrodes"),
                driver.clone(),
                electrodes_3x2(),
                empty_config(),
            ],
        )
        .unwrap();
    let result = binding
        .call(1, &[Value::string("get_projected_electrodes"), driver.clone()])
        .expect("get_projected_electrodes")
        .remove(0);
    let array = result.as_double().unwrap();
    assert_eq!((array.rows(), array.cols()), (3, 2));
    assert_eq!(array.column(1), &[0.0, 0.0, -1.0]);

    binding.call(0, &[Value::string("delete"), driver]).unwrap();
}

#[test]
fn arity_violations_abort_eagerly() {
    let mut binding = binding();
    let err = binding
        .call(0, &[Value::string("create"), create_config()])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArityMismatch);

    let driver = create_driver(&mut binding);
    let err = binding
        .call(0, &[Value::string("solve_eeg_forward"), driver.clone()])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArityMismatch);
    assert!(err.to_string().contains("dipole"));
    // The failed call left no partial state behind.
    assert_eq!(binding.live_objects(), 1);

    binding.call(0, &[Value::string("delete"), driver]).unwrap();
}

#[test]
fn stale_and_wrong_kind_handles_are_typed_errors() {
    let mut binding = binding();
    let driver = create_driver(&mut binding);
    let function = binding
        .call(1, &[Value::string("make_domain_function"), driver.clone()])
        .unwrap()
        .remove(0);

    // Function handle where a driver is expected.
    let err = binding
        .call(
            1,
            &[
                Value::string("evaluate_at_electrodes"),
                function.clone(),
                function.clone(),
            ],
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidHandle);

    binding
        .call(0, &[Value::string("delete_function"), function.clone()])
        .unwrap();
    // Double delete of the same handle.
    let err = binding
        .call(0, &[Value::string("delete_function"), function])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidHandle);

    binding.call(0, &[Value::string("delete"), driver]).unwrap();
    assert_eq!(binding.live_objects(), 0);
}

#[test]
fn create_config_flattens_to_dotted_keys_for_the_backend() {
    let seen: Arc<Mutex<Option<ParamTree>>> = Arc::new(Mutex::new(None));
    let mut factories = FactoryRegistry::new();
    let record = seen.clone();
    factories.register("null", move |config, data| {
        *record.lock().unwrap() = Some(config.clone());
        Ok(Box::new(NullDriver::new(config, data)?) as Box<dyn ForwardDriver>)
    });

    let mut binding = Binding::new(factories);
    let driver = create_driver(&mut binding);

    let config = seen.lock().unwrap().clone().expect("backend saw a config");
    assert_eq!(config.get("electrodes.model"), Some("test"));
    assert_eq!(config.get("type"), Some("null"));
    // The embedded mesh arrays are not part of the flat tree.
    assert!(!config.contains("volume_conductor.grid.nodes"));

    binding.call(0, &[Value::string("delete"), driver]).unwrap();
}

#[test]
fn write_commands_produce_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut binding = binding();
    let driver = create_driver(&mut binding);
    let function = binding
        .call(1, &[Value::string("make_domain_function"), driver.clone()])
        .unwrap()
        .remove(0);

    let vc_path = dir.path().join("vc.txt");
    let config = Value::Struct(
        Fields::new().with("filename", Value::string(vc_path.to_string_lossy())),
    );
    binding
        .call(0, &[Value::string("write"), driver.clone(), config])
        .expect("write");
    assert!(vc_path.exists());

    let solution_path = dir.path().join("solution.txt");
    let config = Value::Struct(
        Fields::new().with("filename", Value::string(solution_path.to_string_lossy())),
    );
    binding
        .call(
            0,
            &[
                Value::string("write"),
                driver.clone(),
                function.clone(),
                config,
            ],
        )
        .expect("write with function");
    assert!(solution_path.exists());

    binding
        .call(0, &[Value::string("delete_function"), function])
        .unwrap();
    binding.call(0, &[Value::string("delete"), driver]).unwrap();
}

#[test]
fn writer_lifecycle_flushes_vertex_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut binding = binding();
    let driver = create_driver(&mut binding);
    let function = binding
        .call(1, &[Value::string("make_domain_function"), driver.clone()])
        .unwrap()
        .remove(0);

    let writer = binding
        .call(
            1,
            &[
                Value::string("volume_conductor_vtk_writer"),
                driver.clone(),
                empty_config(),
            ],
        )
        .expect("volume_conductor_vtk_writer")
        .remove(0);
    assert_eq!(binding.live_objects(), 3);

    binding
        .call(
            0,
            &[
                Value::string("writer_add_vertex_data"),
                writer.clone(),
                function.clone(),
                Value::string("potential"),
            ],
        )
        .expect("writer_add_vertex_data");

    let out_path = dir.path().join("vc.vtk");
    let config = Value::Struct(
        Fields::new().with("filename", Value::string(out_path.to_string_lossy())),
    );
    binding
        .call(0, &[Value::string("writer_write"), writer.clone(), config])
        .expect("writer_write");
    let contents = std::fs::read_to_string(&out_path).unwrap();
    assert!(contents.contains("potential"));

    binding
        .call(0, &[Value::string("delete_writer"), writer])
        .unwrap();
    binding
        .call(0, &[Value::string("delete_function"), function])
        .unwrap();
    binding.call(0, &[Value::string("delete"), driver]).unwrap();
    assert_eq!(binding.live_objects(), 0);
}
