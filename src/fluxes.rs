//! Zonal eddy fluxes: longitude-mean covariance of anomalies.
//!
//! `emf = [(u - [u]) (v - [v])]` and `ehf = [(t - [t]) (v - [v])]` where
//! `[.]` is the mean over longitude. Means and products are accumulated in
//! `f64` so a field that is constant along longitude has anomalies of
//! exactly zero.

use crate::data_io::utils::get_variable_attributes;
use crate::data_io::{DatasetLayout, FieldSpec};
use crate::parallel::{FieldBlocks, PipelineError, Tile, TileTransform};
use ndarray::{Array3, ArrayView1, ArrayView4, Axis, Ix4, Zip};
use std::fmt;
use std::str::FromStr;

const INPUT_DIMS: [&str; 4] = ["time", "plev", "lat", "lon"];

/// Array approach used for the flux reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluxMethod {
    /// Whole-array longitude means broadcast back over longitude
    Broadcast,
    /// Independent reduction of every longitude row, rows in parallel
    Rows,
}

impl FluxMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FluxMethod::Broadcast => "broadcast",
            FluxMethod::Rows => "rows",
        }
    }
}

impl fmt::Display for FluxMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FluxMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broadcast" => Ok(FluxMethod::Broadcast),
            "rows" => Ok(FluxMethod::Rows),
            other => Err(format!("Unknown flux method: {}", other)),
        }
    }
}

/// Longitude-mean covariance of the anomalies of `a` and `b`
pub fn eddy_flux(a: ArrayView4<f32>, b: ArrayView4<f32>, method: FluxMethod) -> Array3<f32> {
    let (nt, nz, ny, nx) = a.dim();
    if nx == 0 {
        return Array3::from_elem((nt, nz, ny), f32::NAN);
    }
    match method {
        FluxMethod::Broadcast => broadcast_flux(a, b),
        FluxMethod::Rows => rows_flux(a, b),
    }
}

fn broadcast_flux(a: ArrayView4<f32>, b: ArrayView4<f32>) -> Array3<f32> {
    let (nt, nz, ny, _) = a.dim();
    let a = a.mapv(f64::from);
    let b = b.mapv(f64::from);
    let (Some(a_mean), Some(b_mean)) = (a.mean_axis(Axis(3)), b.mean_axis(Axis(3))) else {
        return Array3::from_elem((nt, nz, ny), f32::NAN);
    };

    let a_anom = &a - &a_mean.insert_axis(Axis(3));
    let b_anom = &b - &b_mean.insert_axis(Axis(3));
    match (a_anom * b_anom).mean_axis(Axis(3)) {
        Some(flux) => flux.mapv(|x| x as f32),
        None => Array3::from_elem((nt, nz, ny), f32::NAN),
    }
}

fn rows_flux(a: ArrayView4<f32>, b: ArrayView4<f32>) -> Array3<f32> {
    let (nt, nz, ny, _) = a.dim();
    let mut out = Array3::<f32>::zeros((nt, nz, ny));
    Zip::from(&mut out)
        .and(a.lanes(Axis(3)))
        .and(b.lanes(Axis(3)))
        .par_for_each(|o, row_a, row_b| *o = row_covariance(row_a, row_b));
    out
}

fn row_covariance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let n = a.len() as f64;
    let mean_a = a.iter().map(|&x| f64::from(x)).sum::<f64>() / n;
    let mean_b = b.iter().map(|&x| f64::from(x)).sum::<f64>() / n;
    let cov = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| (f64::from(x) - mean_a) * (f64::from(y) - mean_b))
        .sum::<f64>()
        / n;
    cov as f32
}

/// Eddy momentum and heat flux transform
#[derive(Debug, Clone)]
pub struct EddyFluxes {
    pub method: FluxMethod,
}

impl EddyFluxes {
    pub fn new(method: FluxMethod) -> Self {
        Self { method }
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

impl TileTransform for EddyFluxes {
    fn name(&self) -> String {
        format!("fluxes[{}]", self.method)
    }

    fn input_fields(&self, _input: &DatasetLayout) -> Vec<String> {
        vec!["u".to_string(), "v".to_string(), "t".to_string()]
    }

    fn output_layout(&self, input: &DatasetLayout) -> Result<DatasetLayout, PipelineError> {
        for name in ["u", "v", "t"] {
            let spec = input
                .field(name)
                .ok_or_else(|| PipelineError::InvalidInput(format!("missing field {}", name)))?;
            if !spec.has_dims(&INPUT_DIMS) {
                return Err(PipelineError::InvalidInput(format!(
                    "{} has dimensions {:?}, expected {:?}",
                    name, spec.dims, INPUT_DIMS
                )));
            }
        }

        let mut layout = DatasetLayout::new();
        for name in ["time", "plev", "lat"] {
            if !layout.copy_coordinate_from(input, name) {
                return Err(PipelineError::InvalidInput(format!("missing coordinate {}", name)));
            }
        }
        for name in ["emf", "ehf"] {
            layout.add_field(FieldSpec::new(
                name,
                &["time", "plev", "lat"],
                get_variable_attributes(name),
            ));
        }
        Ok(layout)
    }

    fn apply(
        &self,
        _input: &DatasetLayout,
        _tile: &Tile,
        fields: FieldBlocks,
    ) -> Result<FieldBlocks, PipelineError> {
        let u = field_4d(&fields, "u")?;
        let v = field_4d(&fields, "v")?;
        let t = field_4d(&fields, "t")?;

        let emf = eddy_flux(u, v, self.method);
        let ehf = eddy_flux(t, v, self.method);
        Ok(vec![
            ("emf".to_string(), emf.into_dyn()),
            ("ehf".to_string(), ehf.into_dyn()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_methods_agree() {
        let a = Array4::from_shape_fn((2, 3, 4, 8), |(t, k, j, i)| {
            (t * 7 + k * 3 + j) as f32 + (i as f32 * 0.7).sin()
        });
        let b = Array4::from_shape_fn((2, 3, 4, 8), |(t, k, j, i)| {
            (t + k * j) as f32 * 0.5 + (i as f32 * 1.3).cos()
        });
        let x = eddy_flux(a.view(), b.view(), FluxMethod::Broadcast);
        let y = eddy_flux(a.view(), b.view(), FluxMethod::Rows);
        for (p, q) in x.iter().zip(y.iter()) {
            assert!((p - q).abs() <= 1e-6 * p.abs().max(1.0));
        }
    }

    #[test]
    fn test_known_covariance() {
        // Anomalies (-1, 1) and (-2, 2): covariance 2
        let a = Array4::from_shape_vec((1, 1, 1, 2), vec![1.0, 3.0]).unwrap();
        let b = Array4::from_shape_vec((1, 1, 1, 2), vec![0.0, 4.0]).unwrap();
        for method in [FluxMethod::Broadcast, FluxMethod::Rows] {
            assert_eq!(eddy_flux(a.view(), b.view(), method)[[0, 0, 0]], 2.0);
        }
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("rows".parse::<FluxMethod>(), Ok(FluxMethod::Rows));
        assert!("xarray".parse::<FluxMethod>().is_err());
        assert_eq!(FluxMethod::Broadcast.to_string(), "broadcast");
    }
}
