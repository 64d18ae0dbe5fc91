use super::{AttributeValue, Attributes, Coordinate, DataReader, DatasetLayout, DimensionSpec, FieldSpec};
use ndarray::{ArrayD, IxDyn};
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("Variable not found: {0}")]
    MissingVariable(String),

    #[error("Data conversion error")]
    ConversionError,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Block out of bounds: {0}")]
    OutOfBounds(String),
}

/// NetCDF reader for gridded datasets
///
/// The layout is scanned once on open. A one-dimensional variable named
/// after its own dimension is treated as a coordinate; every other
/// variable is a field read lazily through [`DataReader::read_block`].
pub struct NetCDFReader {
    pub file_path: PathBuf,
    file: netcdf::File,
    layout: DatasetLayout,
}

impl NetCDFReader {
    /// Open a file and scan its dimensions, coordinates and fields
    pub fn open(file_path: impl AsRef<Path>) -> Result<Self, ReaderError> {
        let path = file_path.as_ref();
        if !path.exists() {
            return Err(ReaderError::FileNotFound(path.display().to_string()));
        }

        let file = netcdf::open(path)?;
        let mut layout = DatasetLayout::new();

        for dim in file.dimensions() {
            layout.dimensions.push(DimensionSpec {
                name: dim.name(),
                len: dim.len(),
                unlimited: dim.is_unlimited(),
            });
        }

        for var in file.variables() {
            let name = var.name();
            let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
            let attributes = read_attributes(var.attributes());

            if dims.len() == 1 && dims[0] == name {
                let values: Vec<f32> = var.get_values::<f32, _>(..)?;
                layout.coordinates.push(Coordinate {
                    name,
                    values: values.into(),
                    attributes,
                });
            } else {
                layout.fields.push(FieldSpec {
                    name,
                    dims,
                    attributes,
                });
            }
        }

        layout.global_attributes = read_attributes(file.attributes());

        log::debug!(
            "Opened {} with {} dimensions, {} coordinates, {} fields",
            path.display(),
            layout.dimensions.len(),
            layout.coordinates.len(),
            layout.fields.len()
        );

        Ok(Self {
            file_path: path.to_path_buf(),
            file,
            layout,
        })
    }
}

impl DataReader for NetCDFReader {
    fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    fn read_block(&self, name: &str, ranges: &[Range<usize>]) -> Result<ArrayD<f32>, ReaderError> {
        let shape = self
            .layout
            .field_shape(name)
            .or_else(|| self.layout.coordinate(name).map(|c| vec![c.len()]))
            .ok_or_else(|| ReaderError::MissingVariable(name.to_string()))?;

        if ranges.len() != shape.len()
            || ranges
                .iter()
                .zip(&shape)
                .any(|(r, &len)| r.start > r.end || r.end > len)
        {
            return Err(ReaderError::OutOfBounds(format!(
                "{}: {:?} for shape {:?}",
                name, ranges, shape
            )));
        }

        let count: Vec<usize> = ranges.iter().map(|r| r.end - r.start).collect();
        if count.iter().any(|&n| n == 0) {
            return Ok(ArrayD::zeros(IxDyn(&count)));
        }
        let start: Vec<usize> = ranges.iter().map(|r| r.start).collect();

        let var = self
            .file
            .variable(name)
            .ok_or_else(|| ReaderError::MissingVariable(name.to_string()))?;
        let values: Vec<f32> = var.get_values::<f32, _>((&start[..], &count[..]))?;

        ArrayD::from_shape_vec(IxDyn(&count), values).map_err(|_| ReaderError::ConversionError)
    }
}

fn read_attributes<'f>(attrs: impl Iterator<Item = netcdf::Attribute<'f>>) -> Attributes {
    let mut out = Attributes::new();
    for attr in attrs {
        match attr.value() {
            Ok(value) => {
                if let Some(converted) = convert_attribute(value) {
                    out.insert(attr.name().to_string(), converted);
                }
            }
            Err(e) => log::warn!("Skipping unreadable attribute {}: {}", attr.name(), e),
        }
    }
    out
}

fn convert_attribute(value: netcdf::AttributeValue) -> Option<AttributeValue> {
    use netcdf::AttributeValue as Nc;
    match value {
        Nc::Str(s) => Some(AttributeValue::Text(s)),
        Nc::Strs(s) => Some(AttributeValue::Text(s.join(", "))),
        Nc::Int(v) => Some(AttributeValue::Int(v)),
        Nc::Short(v) => Some(AttributeValue::Int(v.into())),
        Nc::Float(v) => Some(AttributeValue::Float(v)),
        Nc::Double(v) => Some(AttributeValue::Double(v)),
        Nc::Floats(v) => Some(AttributeValue::Floats(v)),
        Nc::Doubles(v) => Some(AttributeValue::Doubles(v)),
        Nc::Ints(v) => Some(AttributeValue::Doubles(v.into_iter().map(f64::from).collect())),
        _ => None,
    }
}
