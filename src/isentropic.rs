//! Interpolation from pressure levels onto isentropic (constant theta) levels.
//!
//! Two independent algorithms are provided:
//!
//! * [`IsentropicMethod::Direct`] brackets each target theta in every
//!   column, assumes temperature linear in `ln p` across the bracket and
//!   Newton-solves the Poisson relation for pressure. Temperature follows
//!   from the solved pressure; winds are linear in theta. Requires strictly
//!   monotonic pressure levels and fails when the largest target exceeds
//!   the largest theta in the data or a Newton solve does not converge.
//! * [`IsentropicMethod::Transform`] computes theta from the Poisson
//!   relation and linearly remaps every variable with theta as the new
//!   vertical coordinate, pressure in log space. Targets outside a column
//!   are `NaN`.
//!
//! The two agree closely but not exactly.

use crate::config::Constants;
use crate::data_io::utils::{get_coordinate_attributes, get_variable_attributes};
use crate::data_io::{Coordinate, DataReader, DatasetLayout, FieldSpec};
use crate::math::{
    exner_factor, find_bounding_index, interp_1d, interp_bracketed, solve_isentropic_log_pressure,
    strict_monotonic_direction, temperature_from_potential, InterpolationError,
};
use crate::parallel::{read_tile, ChunkPlan, FieldBlocks, PipelineError, Tile, TileTransform};
use ndarray::{Array1, Array4, ArrayView1, ArrayView4, ArrayViewMut1, Axis, Ix4, Zip};
use std::fmt;
use std::str::FromStr;

/// Default target levels (K)
pub const DEFAULT_THETA_LEVELS: [f64; 15] = [
    265.0, 275.0, 285.0, 300.0, 315.0, 330.0, 350.0, 370.0, 395.0, 430.0, 475.0, 530.0, 600.0,
    700.0, 850.0,
];

const INPUT_DIMS: [&str; 4] = ["time", "plev", "lat", "lon"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsentropicMethod {
    Direct,
    Transform,
}

impl IsentropicMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsentropicMethod::Direct => "direct",
            IsentropicMethod::Transform => "transform",
        }
    }
}

impl fmt::Display for IsentropicMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsentropicMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(IsentropicMethod::Direct),
            "transform" => Ok(IsentropicMethod::Transform),
            other => Err(format!("Unknown isentropic method: {}", other)),
        }
    }
}

/// Parse a comma separated list of theta levels
pub fn parse_levels(list: &str) -> Result<Vec<f64>, String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().map_err(|_| format!("Invalid theta level: {}", s)))
        .collect()
}

/// Pressure levels sorted bottom-up (descending pressure)
#[derive(Debug, Clone)]
struct VerticalGrid {
    /// File level index for each sorted position
    order: Vec<usize>,
    log_p: Vec<f64>,
    /// `(p0/p)^kappa` per sorted position
    exner: Vec<f64>,
    /// `(p0/p)^kappa` per file level
    exner_by_level: Vec<f64>,
    max_pressure: f64,
}

impl VerticalGrid {
    fn new(plev: &[f32], constants: &Constants) -> Result<Self, InterpolationError> {
        if let Some(bad) = plev.iter().find(|&&p| !(p.is_finite() && p > 0.0)) {
            return Err(InterpolationError::NonPositiveCoordinate(format!("plev contains {}", bad)));
        }
        let mut order: Vec<usize> = (0..plev.len()).collect();
        order.sort_by(|&a, &b| plev[b].total_cmp(&plev[a]));

        let exner_by_level: Vec<f64> = plev
            .iter()
            .map(|&p| exner_factor(p as f64, constants))
            .collect();
        Ok(Self {
            log_p: order.iter().map(|&k| (plev[k] as f64).ln()).collect(),
            exner: order.iter().map(|&k| exner_by_level[k]).collect(),
            max_pressure: order.first().map(|&k| plev[k] as f64).unwrap_or(0.0),
            exner_by_level,
            order,
        })
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    /// Sorted copy of a column
    fn gather(&self, column: &ArrayView1<f32>) -> Vec<f64> {
        self.order.iter().map(|&k| column[k] as f64).collect()
    }

    /// Sorted temperature and theta of a column
    fn theta_column(&self, temperature: &ArrayView1<f32>) -> (Vec<f64>, Vec<f64>) {
        let temps = self.gather(temperature);
        let theta = temps.iter().zip(&self.exner).map(|(t, e)| t * e).collect();
        (temps, theta)
    }
}

fn plev_values(layout: &DatasetLayout) -> Result<Vec<f32>, PipelineError> {
    layout
        .coordinate("plev")
        .map(|c| c.values.to_vec())
        .ok_or_else(|| PipelineError::InvalidInput("missing coordinate plev".to_string()))
}

fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

/// Isentropic interpolation transform
#[derive(Debug, Clone)]
pub struct IsentropicInterpolation {
    pub method: IsentropicMethod,
    /// Target theta levels (K), strictly increasing
    pub levels: Vec<f64>,
    pub constants: Constants,
}

impl IsentropicInterpolation {
    pub fn new(method: IsentropicMethod) -> Self {
        Self {
            method,
            levels: DEFAULT_THETA_LEVELS.to_vec(),
            constants: Constants::default(),
        }
    }

    pub fn with_levels(mut self, levels: Vec<f64>) -> Self {
        self.levels = levels;
        self
    }

    pub fn validate_levels(&self) -> Result<(), InterpolationError> {
        let finite = self.levels.iter().all(|l| l.is_finite());
        let ascending = self.levels.windows(2).all(|w| w[1] > w[0]);
        if self.levels.is_empty() || !finite || !ascending {
            return Err(InterpolationError::UnsortedLevels);
        }
        Ok(())
    }

    /// Pressure and temperature where `level` crosses the column; `None`
    /// when no layer brackets it or the solution lies below the surface
    fn solve_level(
        &self,
        grid: &VerticalGrid,
        temps: &[f64],
        theta: &[f64],
        level: f64,
    ) -> Result<Option<(f64, f64)>, InterpolationError> {
        let Some(above) = find_bounding_index(theta, level) else {
            return Ok(None);
        };
        let below = above - 1;
        let (lp_above, lp_below) = (grid.log_p[above], grid.log_p[below]);

        let a = (temps[above] - temps[below]) / (lp_above - lp_below);
        if !a.is_finite() {
            return Ok(None);
        }
        let b = temps[above] - a * lp_above;
        let first_guess = 0.5 * (lp_above + lp_below);

        let pressure = solve_isentropic_log_pressure(level, a, b, first_guess, &self.constants)?.exp();
        if !(pressure <= grid.max_pressure || is_close(pressure, grid.max_pressure)) {
            return Ok(None);
        }
        Ok(Some((pressure, temperature_from_potential(level, pressure, &self.constants))))
    }

    /// Pressure and temperature of one column on the target levels
    fn pressure_column(
        &self,
        grid: &VerticalGrid,
        temperature: ArrayView1<f32>,
        mut p_out: ArrayViewMut1<f32>,
        mut t_out: ArrayViewMut1<f32>,
    ) -> Result<(), InterpolationError> {
        let (temps, theta) = grid.theta_column(&temperature);
        match self.method {
            IsentropicMethod::Direct => {
                for (i, &level) in self.levels.iter().enumerate() {
                    let (p, t) = self
                        .solve_level(grid, &temps, &theta, level)?
                        .unwrap_or((f64::NAN, f64::NAN));
                    p_out[i] = p as f32;
                    t_out[i] = t as f32;
                }
            }
            IsentropicMethod::Transform => {
                for (i, &level) in self.levels.iter().enumerate() {
                    p_out[i] = interp_bracketed(level, &theta, &grid.log_p).exp() as f32;
                    t_out[i] = interp_bracketed(level, &theta, &temps) as f32;
                }
            }
        }
        Ok(())
    }

    /// Winds of one column on the target levels, linear in theta
    fn wind_column(
        &self,
        grid: &VerticalGrid,
        temperature: ArrayView1<f32>,
        winds: [ArrayView1<f32>; 2],
        outputs: [&mut ArrayViewMut1<f32>; 2],
    ) {
        let (_, theta) = grid.theta_column(&temperature);
        match self.method {
            IsentropicMethod::Direct => {
                let mut idx: Vec<usize> = (0..theta.len()).filter(|&k| theta[k].is_finite()).collect();
                idx.sort_by(|&a, &b| theta[a].total_cmp(&theta[b]));
                let xp: Vec<f64> = idx.iter().map(|&k| theta[k]).collect();
                for (wind, out) in winds.iter().zip(outputs) {
                    let fp: Vec<f64> = idx.iter().map(|&k| wind[grid.order[k]] as f64).collect();
                    for (i, &level) in self.levels.iter().enumerate() {
                        out[i] = interp_1d(level, &xp, &fp) as f32;
                    }
                }
            }
            IsentropicMethod::Transform => {
                for (wind, out) in winds.iter().zip(outputs) {
                    let values = grid.gather(wind);
                    for (i, &level) in self.levels.iter().enumerate() {
                        out[i] = interp_bracketed(level, &theta, &values) as f32;
                    }
                }
            }
        }
    }

    /// Interpolate a (time, plev, lat, lon) block; returns p, t, u, v on
    /// (time, thlev, lat, lon)
    pub fn interpolate(
        &self,
        plev: &[f32],
        t: ArrayView4<f32>,
        u: ArrayView4<f32>,
        v: ArrayView4<f32>,
    ) -> Result<[Array4<f32>; 4], PipelineError> {
        let grid = VerticalGrid::new(plev, &self.constants)?;
        let (nt, nz, ny, nx) = t.dim();
        if nz != grid.len() || u.dim() != t.dim() || v.dim() != t.dim() {
            return Err(PipelineError::InvalidInput(format!(
                "block shapes t={:?} u={:?} v={:?} do not match {} levels",
                t.dim(),
                u.dim(),
                v.dim(),
                grid.len()
            )));
        }

        let shape = (nt, self.levels.len(), ny, nx);
        let mut p_out = Array4::<f32>::zeros(shape);
        let mut t_out = Array4::<f32>::zeros(shape);
        let mut u_out = Array4::<f32>::zeros(shape);
        let mut v_out = Array4::<f32>::zeros(shape);

        // First failing column aborts the block
        Zip::from(p_out.lanes_mut(Axis(1)))
            .and(t_out.lanes_mut(Axis(1)))
            .and(t.lanes(Axis(1)))
            .par_fold(
                || Ok(()),
                |acc, p_col, t_col, temperature| {
                    acc.and_then(|_| self.pressure_column(&grid, temperature, p_col, t_col))
                },
                Result::and,
            )?;

        Zip::from(u_out.lanes_mut(Axis(1)))
            .and(v_out.lanes_mut(Axis(1)))
            .and(t.lanes(Axis(1)))
            .and(u.lanes(Axis(1)))
            .and(v.lanes(Axis(1)))
            .par_for_each(|mut u_col, mut v_col, temperature, u_in, v_in| {
                self.wind_column(&grid, temperature, [u_in, v_in], [&mut u_col, &mut v_col])
            });

        Ok([p_out, t_out, u_out, v_out])
    }

    /// Largest theta anywhere in the source, scanned tile by tile.
    /// Stops early once `stop_at` is reached.
    pub fn max_source_theta(
        &self,
        source: &dyn DataReader,
        plan: &ChunkPlan,
        stop_at: f64,
    ) -> Result<f64, PipelineError> {
        let layout = source.layout();
        let grid = VerticalGrid::new(&plev_values(layout)?, &self.constants)?;
        let fields = vec!["t".to_string()];
        let mut max_theta = f64::NEG_INFINITY;

        for tile in &plan.tiles {
            let blocks = read_tile(source, layout, &fields, tile)?;
            for (_, block) in &blocks {
                let t = block
                    .view()
                    .into_dimensionality::<Ix4>()
                    .map_err(|_| PipelineError::InvalidInput("t is not four-dimensional".to_string()))?;
                for ((_, k, _, _), &x) in t.indexed_iter() {
                    let theta = x as f64 * grid.exner_by_level[k];
                    if theta > max_theta {
                        max_theta = theta;
                    }
                }
            }
            if max_theta >= stop_at {
                break;
            }
        }
        Ok(max_theta)
    }
}

fn field_4d<'a>(fields: &'a FieldBlocks, name: &str) -> Result<ArrayView4<'a, f32>, PipelineError> {
    let (_, data) = fields
        .iter()
        .find(|(n, _)| n == name)
        .ok_or_else(|| PipelineError::InvalidInput(format!("missing field {}", name)))?;
    data.view()
        .into_dimensionality::<Ix4>()
        .map_err(|_| PipelineError::InvalidInput(format!("{} is not four-dimensional", name)))
}

impl TileTransform for IsentropicInterpolation {
    fn name(&self) -> String {
        format!("isentropes[{}]", self.method)
    }

    fn input_fields(&self, _input: &DatasetLayout) -> Vec<String> {
        vec!["t".to_string(), "u".to_string(), "v".to_string()]
    }

    fn output_layout(&self, input: &DatasetLayout) -> Result<DatasetLayout, PipelineError> {
        self.validate_levels()?;

        let mut specs = Vec::new();
        for name in ["t", "u", "v"] {
            let spec = input
                .field(name)
                .ok_or_else(|| PipelineError::InvalidInput(format!("missing field {}", name)))?;
            if !spec.has_dims(&INPUT_DIMS) {
                return Err(PipelineError::InvalidInput(format!(
                    "{} has dimensions {:?}, expected {:?}",
                    name, spec.dims, INPUT_DIMS
                )));
            }
            specs.push(spec.clone());
        }

        let plev = plev_values(input)?;
        VerticalGrid::new(&plev, &self.constants)?;
        if self.method == IsentropicMethod::Direct && strict_monotonic_direction(&plev).is_none() {
            return Err(InterpolationError::NonMonotonicCoordinate(format!("plev = {:?}", plev)).into());
        }

        let mut layout = DatasetLayout::new();
        if !layout.copy_coordinate_from(input, "time") {
            return Err(PipelineError::InvalidInput("missing coordinate time".to_string()));
        }
        let thlev: Array1<f32> = self.levels.iter().map(|&l| l as f32).collect();
        layout.add_coordinate(
            Coordinate::new("thlev", thlev, get_coordinate_attributes("thlev")),
            false,
        );
        for name in ["lat", "lon"] {
            if !layout.copy_coordinate_from(input, name) {
                return Err(PipelineError::InvalidInput(format!("missing coordinate {}", name)));
            }
        }

        let out_dims = ["time", "thlev", "lat", "lon"];
        layout.add_field(FieldSpec::new("p", &out_dims, get_variable_attributes("p")));
        for spec in specs {
            layout.add_field(FieldSpec::new(&spec.name, &out_dims, spec.attributes));
        }
        Ok(layout)
    }

    fn check_source(&self, source: &dyn DataReader, plan: &ChunkPlan) -> Result<(), PipelineError> {
        if self.method != IsentropicMethod::Direct {
            return Ok(());
        }
        let Some(&requested) = self.levels.last() else {
            return Ok(());
        };
        let available = self.max_source_theta(source, plan, requested)?;
        log::debug!("Largest source theta {:.2} K", available);
        if available < requested {
            return Err(InterpolationError::LevelOutOfBounds {
                requested,
                available,
            }
            .into());
        }
        Ok(())
    }

    fn apply(
        &self,
        input: &DatasetLayout,
        _tile: &Tile,
        fields: FieldBlocks,
    ) -> Result<FieldBlocks, PipelineError> {
        let plev = plev_values(input)?;
        let t = field_4d(&fields, "t")?;
        let u = field_4d(&fields, "u")?;
        let v = field_4d(&fields, "v")?;

        let [p_out, t_out, u_out, v_out] = self.interpolate(&plev, t, u, v)?;
        Ok(vec![
            ("p".to_string(), p_out.into_dyn()),
            ("t".to_string(), t_out.into_dyn()),
            ("u".to_string(), u_out.into_dyn()),
            ("v".to_string(), v_out.into_dyn()),
        ])
    }
}
