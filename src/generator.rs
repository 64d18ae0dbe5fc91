use crate::config::{Constants, GeneratorConfig};
use crate::data_io::utils::{get_coordinate_attributes, get_variable_attributes, GENERATED_FIELDS};
use crate::data_io::{
    AttributeValue, Coordinate, DataWriter, DatasetLayout, FieldSpec, GridDataset, NetCDFWriter,
    WriteError,
};
use crate::math::{arange, bin_midpoints, synthetic_temperature};
use crate::parallel::with_threads;
use crate::time_utils;
use ndarray::{Array1, Array2, Array4, Axis, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Invalid generator arguments: {0}")]
    InvalidArguments(String),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error("Thread pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Latitude centers `-90 + r/2, -90 + 3r/2, ...` strictly below 90
pub fn latitudes(resolution: f64) -> Vec<f64> {
    arange(-90.0 + resolution / 2.0, 90.0, resolution)
}

/// Longitude centers `-180 + r/2, ...` strictly below 180
pub fn longitudes(resolution: f64) -> Vec<f64> {
    arange(-180.0 + resolution / 2.0, 180.0, resolution)
}

/// Pressure levels (hPa): one fixed level, or bin midpoints of `[0, p_surface]`
pub fn pressure_levels(nlev: usize, constants: &Constants) -> Vec<f64> {
    if nlev <= 1 {
        vec![constants.single_level_pressure]
    } else {
        bin_midpoints(0.0, constants.pressure_surface, nlev)
    }
}

/// Time values (days) on the 360-day calendar
pub fn time_values(ntime: usize, constants: &Constants) -> Vec<f64> {
    time_utils::time_axis(ntime, constants.time_step_divisor)
}

fn to_f32(values: &[f64]) -> Array1<f32> {
    values.iter().map(|&v| v as f32).collect()
}

/// Layout of a generated dataset: `u`, `v`, `t` over (time, plev, lat, lon)
pub fn dataset_layout(config: &GeneratorConfig, seed: u64) -> DatasetLayout {
    let constants = &config.constants;
    let mut layout = DatasetLayout::new();

    let axes = [
        ("time", time_values(config.ntime, constants), true),
        ("plev", pressure_levels(config.nlev, constants), false),
        ("lat", latitudes(config.resolution), false),
        ("lon", longitudes(config.resolution), false),
    ];
    for (name, values, unlimited) in axes {
        layout.add_coordinate(
            Coordinate::new(name, to_f32(&values), get_coordinate_attributes(name)),
            unlimited,
        );
    }

    for &name in GENERATED_FIELDS {
        layout.add_field(FieldSpec::new(
            name,
            &["time", "plev", "lat", "lon"],
            get_variable_attributes(name),
        ));
    }

    layout
        .global_attributes
        .insert("title".to_string(), AttributeValue::from("Synthetic atmospheric dataset"));
    layout
        .global_attributes
        .insert("noise_seed".to_string(), AttributeValue::from(seed.to_string()));
    layout
}

/// File name `dataN{nlat:04}T{ntime}_{3|4}.nc` inside the output directory
pub fn output_path(config: &GeneratorConfig) -> PathBuf {
    let nlat = latitudes(config.resolution).len();
    config.output_dir().join(format!(
        "dataN{:04}T{}_{}.nc",
        nlat,
        config.ntime,
        config.format.suffix()
    ))
}

/// Random-walk winds over (time, lon), shared by every level and latitude
#[derive(Debug, Clone)]
pub struct WindNoise {
    pub u: Array2<f32>,
    pub v: Array2<f32>,
}

impl WindNoise {
    /// Standard-normal increments accumulated along time
    pub fn new(ntime: usize, nlon: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut draw = || {
            let mut walk =
                Array2::<f64>::from_shape_simple_fn((ntime, nlon), || rng.sample(StandardNormal));
            walk.accumulate_axis_inplace(Axis(0), |&prev, curr| *curr += prev);
            walk.mapv(|x| x as f32)
        };
        let u = draw();
        let v = draw();
        Self { u, v }
    }
}

/// Fill `sink` with the synthetic fields, one time block at a time
pub fn generate_into<W: DataWriter>(
    config: &GeneratorConfig,
    layout: &DatasetLayout,
    noise: &WindNoise,
    sink: &mut W,
) -> Result<(), GeneratorError> {
    let coord = |name: &str| {
        layout
            .coordinate(name)
            .map(|c| c.values.clone())
            .ok_or_else(|| GeneratorError::InvalidArguments(format!("missing {} axis", name)))
    };
    let plev = coord("plev")?;
    let lat = coord("lat")?;
    let (ntime, nz, ny, nx) = (config.ntime, plev.len(), lat.len(), coord("lon")?.len());

    if noise.u.dim() != (ntime, nx) || noise.v.dim() != (ntime, nx) {
        return Err(GeneratorError::InvalidArguments(format!(
            "wind noise shape {:?} does not match (time, lon) = ({}, {})",
            noise.u.dim(),
            ntime,
            nx
        )));
    }

    // Temperature depends on level and latitude only
    let profile = Array2::from_shape_fn((nz, ny), |(k, j)| {
        synthetic_temperature(plev[k] as f64, lat[j] as f64, &config.constants) as f32
    });

    let step = if config.chunk == 0 { ntime } else { config.chunk };
    for t0 in (0..ntime).step_by(step.max(1)) {
        let nt = step.min(ntime - t0);
        let shape = (nt, nz, ny, nx);

        let mut t = Array4::<f32>::zeros(shape);
        Zip::indexed(&mut t).par_for_each(|(_, k, j, _), x| *x = profile[[k, j]]);
        sink.write_block("t", &[t0, 0, 0, 0], t.view().into_dyn())?;
        drop(t);

        for (name, walk) in [("u", &noise.u), ("v", &noise.v)] {
            let mut field = Array4::<f32>::zeros(shape);
            Zip::indexed(&mut field).par_for_each(|(it, _, _, i), x| *x = walk[[t0 + it, i]]);
            sink.write_block(name, &[t0, 0, 0, 0], field.view().into_dyn())?;
        }
        log::debug!("Generated time steps {}..{}", t0, t0 + nt);
    }
    Ok(())
}

/// Open a sink, fill it and hand it to `close`, all on the pool selected
/// by `config.threads`
fn fill_on_pool<W, T, O, C>(
    config: &GeneratorConfig,
    layout: &DatasetLayout,
    noise: &WindNoise,
    open: O,
    close: C,
) -> Result<T, GeneratorError>
where
    W: DataWriter,
    T: Send,
    O: FnOnce() -> Result<W, GeneratorError> + Send,
    C: FnOnce(W) -> Result<T, GeneratorError> + Send,
{
    with_threads(config.threads, || {
        let mut sink = open()?;
        generate_into(config, layout, noise, &mut sink)?;
        close(sink)
    })
}

fn resolve_seed(config: &GeneratorConfig) -> u64 {
    match config.seed {
        Some(seed) => seed,
        None => {
            let seed = rand::random::<u64>();
            log::info!("Drew wind noise seed {}", seed);
            seed
        }
    }
}

/// Generate the dataset described by `config` and write it to disk.
/// Returns the path of the written file.
pub fn generate(config: &GeneratorConfig) -> Result<PathBuf, GeneratorError> {
    config.validate().map_err(GeneratorError::InvalidArguments)?;
    let start = Instant::now();
    let seed = resolve_seed(config);
    let layout = dataset_layout(config, seed);
    let path = output_path(config);

    log::info!(
        "Directory: {} Resolution: {} ({} levels, {} time steps)",
        config.output_dir().display(),
        config.resolution,
        config.nlev,
        config.ntime
    );

    let nlon = layout.dim_len("lon").unwrap_or(0);
    let noise = WindNoise::new(config.ntime, nlon, seed);

    fill_on_pool(
        config,
        &layout,
        &noise,
        || Ok(NetCDFWriter::create(&path, &layout, config.format)?),
        |mut writer: NetCDFWriter| Ok(writer.finish()?),
    )?;

    if let Some(time) = layout.coordinate("time") {
        if let (Some(first), Some(last)) = (time.values.first(), time.values.last()) {
            log::debug!(
                "Time axis {} to {}",
                time_utils::days_to_date(*first as f64),
                time_utils::days_to_date(*last as f64)
            );
        }
    }
    log::info!(
        "Wrote {} in {:.2}s",
        path.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(path)
}

/// Generate the dataset in memory
pub fn generate_in_memory(config: &GeneratorConfig) -> Result<GridDataset, GeneratorError> {
    config.validate().map_err(GeneratorError::InvalidArguments)?;
    let seed = resolve_seed(config);
    let layout = dataset_layout(config, seed);
    let nlon = layout.dim_len("lon").unwrap_or(0);
    let noise = WindNoise::new(config.ntime, nlon, seed);

    fill_on_pool(
        config,
        &layout,
        &noise,
        || Ok(GridDataset::new(layout.clone())),
        Ok,
    )
}
