use crate::config::RunConfig;
use crate::data_io::{GridDataset, NetCDFReader, NetCDFWriter};
use crate::fluxes::{EddyFluxes, FluxMethod};
use crate::isentropic::{IsentropicInterpolation, IsentropicMethod, DEFAULT_THETA_LEVELS};
use crate::parallel::{run_pipeline, with_threads, ChunkShape, PipelineError, PipelineStats, TileTransform};
use crate::slicing::{PrefixSlice, SliceAxis};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A benchmarked analysis operation
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Fluxes(FluxMethod),
    Isentropes {
        method: IsentropicMethod,
        levels: Vec<f64>,
    },
    Slice {
        axis: SliceAxis,
        count: usize,
    },
}

impl Operation {
    pub fn isentropes(method: IsentropicMethod) -> Self {
        Operation::Isentropes {
            method,
            levels: DEFAULT_THETA_LEVELS.to_vec(),
        }
    }

    pub fn transform(&self) -> Result<Box<dyn TileTransform>, PipelineError> {
        let transform: Box<dyn TileTransform> = match self {
            Operation::Fluxes(method) => Box::new(EddyFluxes::new(*method)),
            Operation::Isentropes { method, levels } => {
                Box::new(IsentropicInterpolation::new(*method).with_levels(levels.clone()))
            }
            Operation::Slice { axis, count } => Box::new(PrefixSlice::new(*axis, *count)?),
        };
        Ok(transform)
    }

    /// Output file name; encodes the method and the chunk parameters
    pub fn output_name(&self, chunks: &ChunkShape) -> String {
        let tag = match chunks.lat {
            Some(lat) if chunks.is_chunked() => format!("{}_lat{}", chunks.time, lat),
            _ => chunks.time.to_string(),
        };
        match self {
            Operation::Fluxes(method) => format!("fluxes_{}{}.nc", method, tag),
            Operation::Isentropes { method, .. } => format!("isentropes_{}{}.nc", method, tag),
            Operation::Slice { axis, count } => format!("slice_{}{}_{}.nc", axis, count, tag),
        }
    }

    /// Fields compared when validating outputs of this operation
    pub fn output_fields(&self) -> Vec<&'static str> {
        match self {
            Operation::Fluxes(_) => vec!["emf", "ehf"],
            Operation::Isentropes { .. } => vec!["p", "t", "u", "v"],
            Operation::Slice { .. } => vec!["u", "v", "t"],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operation::Fluxes(method) => write!(f, "fluxes:{}", method),
            Operation::Isentropes { method, .. } => write!(f, "isentropes:{}", method),
            Operation::Slice { axis, count } => write!(f, "slice:{}:{}", axis, count),
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    /// `fluxes[:broadcast|rows]`, `isentropes[:direct|transform]` or
    /// `slice[:time|lat][:count]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        match parts.as_slice() {
            ["fluxes"] => Ok(Operation::Fluxes(FluxMethod::Broadcast)),
            ["fluxes", method] => Ok(Operation::Fluxes(method.parse()?)),
            ["isentropes"] => Ok(Operation::isentropes(IsentropicMethod::Direct)),
            ["isentropes", method] => Ok(Operation::isentropes(method.parse()?)),
            ["slice"] => Ok(Operation::Slice {
                axis: SliceAxis::Time,
                count: 10,
            }),
            ["slice", axis] => Ok(Operation::Slice {
                axis: axis.parse()?,
                count: 10,
            }),
            ["slice", axis, count] => match count.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Operation::Slice {
                    axis: axis.parse()?,
                    count: n,
                }),
                _ => Err(format!("Invalid slice count: {}", count)),
            },
            _ => Err(format!("Unknown operation: {}", s)),
        }
    }
}

/// Result of running one operation to a file
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub output: PathBuf,
    pub stats: PipelineStats,
}

/// Run an operation from the configured input file to a file in the output directory
pub fn run_operation(operation: &Operation, config: &RunConfig) -> Result<OperationOutcome, PipelineError> {
    let output = config.output_dir().join(operation.output_name(&config.chunks));
    let transform = operation.transform()?;
    let input = &config.input;
    let format = config.format;

    log::info!(
        "Running {} on {} -> {}",
        operation,
        input.display(),
        output.display()
    );

    let out_path = &output;
    let stats = with_threads(config.threads, || {
        run_pipeline(
            || NetCDFReader::open(input),
            transform.as_ref(),
            &config.chunks,
            config.prefetch_depth,
            |layout| NetCDFWriter::create(out_path, layout, format),
        )
        .map(|(stats, _)| stats)
    })?;

    Ok(OperationOutcome { output, stats })
}

/// Run an operation entirely in memory
pub fn run_in_memory(
    operation: &Operation,
    dataset: &GridDataset,
    chunks: &ChunkShape,
) -> Result<GridDataset, PipelineError> {
    let transform = operation.transform()?;
    let (_, out) = run_pipeline(
        || Ok(dataset),
        transform.as_ref(),
        chunks,
        crate::config::DEFAULT_PREFETCH_DEPTH,
        |layout| Ok(GridDataset::new(layout.clone())),
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_names_encode_chunks() {
        let op = Operation::Fluxes(FluxMethod::Broadcast);
        assert_eq!(op.output_name(&ChunkShape::unchunked()), "fluxes_broadcast0.nc");
        assert_eq!(op.output_name(&ChunkShape::along_time(10)), "fluxes_broadcast10.nc");

        let op = Operation::isentropes(IsentropicMethod::Transform);
        let chunks = ChunkShape { time: 5, lat: Some(8) };
        assert_eq!(op.output_name(&chunks), "isentropes_transform5_lat8.nc");

        let op = Operation::Slice {
            axis: SliceAxis::Lat,
            count: 3,
        };
        assert_eq!(op.output_name(&ChunkShape::unchunked()), "slice_lat3_0.nc");
    }

    #[test]
    fn test_operation_parsing() {
        assert_eq!("fluxes".parse::<Operation>(), Ok(Operation::Fluxes(FluxMethod::Broadcast)));
        assert_eq!(
            "isentropes:transform".parse::<Operation>(),
            Ok(Operation::isentropes(IsentropicMethod::Transform))
        );
        assert_eq!(
            "slice:lat:4".parse::<Operation>(),
            Ok(Operation::Slice {
                axis: SliceAxis::Lat,
                count: 4
            })
        );
        assert!("regrid".parse::<Operation>().is_err());
        assert!("slice:time:x".parse::<Operation>().is_err());
        assert!("slice:lat:0".parse::<Operation>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let op = Operation::Slice {
            axis: SliceAxis::Time,
            count: 7,
        };
        assert_eq!(op.to_string().parse::<Operation>(), Ok(op));
    }
}
