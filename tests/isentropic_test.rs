use atmos_bench::config::Constants;
use atmos_bench::data_io::utils::{get_coordinate_attributes, get_variable_attributes};
use atmos_bench::data_io::{Coordinate, DatasetLayout, FieldSpec, GridDataset};
use atmos_bench::isentropic::IsentropicMethod;
use atmos_bench::math::{potential_temperature, InterpolationError};
use atmos_bench::operations::{run_in_memory, Operation};
use atmos_bench::parallel::{ChunkShape, PipelineError};
use ndarray::{Array1, ArrayD, IxDyn};

const NT: usize = 2;
const NY: usize = 3;
const NX: usize = 4;

/// Pressure levels 100, 110, ..., 1000 hPa
fn levels() -> Vec<f64> {
    (10..=100).map(|k| k as f64 * 10.0).collect()
}

/// Theta linear in pressure: 300 K at 1000 hPa, 390 K at 100 hPa
fn theta_of(p: f64) -> f64 {
    300.0 + 0.1 * (1000.0 - p)
}

/// Dataset whose temperature follows a known theta profile in every column.
/// `u` equals pressure and `v` its negative, so winds are linear in theta.
fn profile_dataset() -> GridDataset {
    let constants = Constants::default();
    let plev = levels();
    let nz = plev.len();

    let mut layout = DatasetLayout::new();
    layout.add_coordinate(
        Coordinate::new("time", Array1::from(vec![0.5, 1.0]), get_coordinate_attributes("time")),
        true,
    );
    layout.add_coordinate(
        Coordinate::new(
            "plev",
            plev.iter().map(|&p| p as f32).collect(),
            get_coordinate_attributes("plev"),
        ),
        false,
    );
    layout.add_coordinate(
        Coordinate::new("lat", Array1::from(vec![-30.0, 0.0, 30.0]), get_coordinate_attributes("lat")),
        false,
    );
    layout.add_coordinate(
        Coordinate::new(
            "lon",
            Array1::from(vec![-135.0, -45.0, 45.0, 135.0]),
            get_coordinate_attributes("lon"),
        ),
        false,
    );
    for name in ["u", "v", "t"] {
        layout.add_field(FieldSpec::new(
            name,
            &["time", "plev", "lat", "lon"],
            get_variable_attributes(name),
        ));
    }

    let shape = IxDyn(&[NT, nz, NY, NX]);
    let t = ArrayD::from_shape_fn(shape.clone(), |idx| {
        let p = plev[idx[1]];
        (theta_of(p) / (constants.p0 / p).powf(constants.kappa)) as f32
    });
    let u = ArrayD::from_shape_fn(shape.clone(), |idx| plev[idx[1]] as f32);
    let v = u.mapv(|x| -x);

    let mut dataset = GridDataset::new(layout);
    dataset.set_field("t", t).unwrap();
    dataset.set_field("u", u).unwrap();
    dataset.set_field("v", v).unwrap();
    dataset
}

fn isentropes(method: IsentropicMethod, levels: &[f64]) -> Operation {
    Operation::Isentropes {
        method,
        levels: levels.to_vec(),
    }
}

const TARGETS: [f64; 5] = [305.5, 310.0, 330.0, 350.0, 370.0];

fn expected_pressure(theta: f64) -> f64 {
    1000.0 - (theta - 300.0) / 0.1
}

#[test]
fn test_direct_recovers_known_pressure_and_theta() {
    let constants = Constants::default();
    let out = run_in_memory(
        &isentropes(IsentropicMethod::Direct, &TARGETS),
        &profile_dataset(),
        &ChunkShape::unchunked(),
    )
    .unwrap();

    assert_eq!(out.layout.dim_len("thlev"), Some(TARGETS.len()));
    let p = out.field("p").unwrap();
    let t = out.field("t").unwrap();
    let u = out.field("u").unwrap();
    assert_eq!(p.shape(), &[NT, TARGETS.len(), NY, NX]);

    for ((idx, &pressure), &temperature) in p.indexed_iter().zip(t.iter()) {
        let target = TARGETS[idx[1]];
        assert!(
            (pressure as f64 - expected_pressure(target)).abs() < 0.5,
            "theta {} gave p = {}",
            target,
            pressure
        );
        // Recomputed theta reproduces the target
        let theta = potential_temperature(temperature as f64, pressure as f64, &constants);
        assert!((theta - target).abs() < 0.01, "theta {} recomputed as {}", target, theta);
        // Winds follow pressure
        assert!((u[&idx] - pressure).abs() < 0.5);
    }
}

#[test]
fn test_transform_recovers_known_pressure() {
    let constants = Constants::default();
    let out = run_in_memory(
        &isentropes(IsentropicMethod::Transform, &TARGETS),
        &profile_dataset(),
        &ChunkShape::unchunked(),
    )
    .unwrap();

    let p = out.field("p").unwrap();
    let t = out.field("t").unwrap();
    let v = out.field("v").unwrap();
    for ((idx, &pressure), &temperature) in p.indexed_iter().zip(t.iter()) {
        let target = TARGETS[idx[1]];
        assert!((pressure as f64 - expected_pressure(target)).abs() < 0.5);
        let theta = potential_temperature(temperature as f64, pressure as f64, &constants);
        assert!((theta - target).abs() < 0.2, "theta {} recomputed as {}", target, theta);
        assert!((v[&idx] + pressure).abs() < 0.5);
    }
}

#[test]
fn test_methods_agree_loosely() {
    let dataset = profile_dataset();
    let direct = run_in_memory(
        &isentropes(IsentropicMethod::Direct, &TARGETS),
        &dataset,
        &ChunkShape::unchunked(),
    )
    .unwrap();
    let transform = run_in_memory(
        &isentropes(IsentropicMethod::Transform, &TARGETS),
        &dataset,
        &ChunkShape::unchunked(),
    )
    .unwrap();

    for name in ["p", "t", "u"] {
        let a = direct.field(name).unwrap();
        let b = transform.field(name).unwrap();
        for (&x, &y) in a.iter().zip(b.iter()) {
            assert!(((x - y) / x).abs() < 0.01, "{}: {} vs {}", name, x, y);
        }
    }
}

#[test]
fn test_direct_rejects_levels_above_data() {
    let err = run_in_memory(
        &isentropes(IsentropicMethod::Direct, &[310.0, 400.0]),
        &profile_dataset(),
        &ChunkShape::along_time(1),
    )
    .unwrap_err();

    match err {
        PipelineError::Interpolation(InterpolationError::LevelOutOfBounds { requested, available }) => {
            assert_eq!(requested, 400.0);
            assert!(available < 400.0);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_transform_masks_levels_outside_column() {
    let out = run_in_memory(
        &isentropes(IsentropicMethod::Transform, &[290.0, 310.0, 400.0]),
        &profile_dataset(),
        &ChunkShape::unchunked(),
    )
    .unwrap();

    let p = out.field("p").unwrap();
    for (idx, &pressure) in p.indexed_iter() {
        match idx[1] {
            1 => assert!(pressure.is_finite()),
            _ => assert!(pressure.is_nan()),
        }
    }
}

#[test]
fn test_direct_rejects_non_monotonic_levels() {
    let mut dataset = profile_dataset();
    if let Some(plev) = dataset.layout.coordinates.iter_mut().find(|c| c.name == "plev") {
        plev.values[1] = plev.values[0];
    }
    let err = run_in_memory(
        &Operation::isentropes(IsentropicMethod::Direct),
        &dataset,
        &ChunkShape::unchunked(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Interpolation(InterpolationError::NonMonotonicCoordinate(_))
    ));
}

#[test]
fn test_chunked_matches_unchunked() {
    let dataset = profile_dataset();
    for method in [IsentropicMethod::Direct, IsentropicMethod::Transform] {
        let op = isentropes(method, &TARGETS);
        let whole = run_in_memory(&op, &dataset, &ChunkShape::unchunked()).unwrap();
        for chunks in [ChunkShape::along_time(1), ChunkShape { time: 1, lat: Some(2) }] {
            let tiled = run_in_memory(&op, &dataset, &chunks).unwrap();
            for name in ["p", "t", "u", "v"] {
                assert_eq!(whole.field(name), tiled.field(name), "{} {:?} {}", method, chunks, name);
            }
        }
    }
}

#[test]
fn test_output_layout_metadata() {
    let out = run_in_memory(
        &isentropes(IsentropicMethod::Direct, &TARGETS),
        &profile_dataset(),
        &ChunkShape::unchunked(),
    )
    .unwrap();

    let thlev = out.layout.coordinate("thlev").unwrap();
    assert_eq!(
        thlev.attributes.get("long_name").and_then(|v| v.as_text()),
        Some("potential_temperature")
    );
    assert_eq!(thlev.values[2], 330.0);

    let p = out.layout.field("p").unwrap();
    assert_eq!(p.dims, vec!["time", "thlev", "lat", "lon"]);
    assert_eq!(p.attributes, get_variable_attributes("p"));
    assert_eq!(out.layout.field("t").unwrap().attributes, get_variable_attributes("t"));
    assert!(out.layout.coordinate("plev").is_none());
}
