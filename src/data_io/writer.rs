use super::{AttributeValue, Attributes, DataWriter, DatasetLayout};
use chrono::Utc;
use ndarray::ArrayViewD;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Variable not defined: {0}")]
    MissingVariable(String),

    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error("Unknown dimension: {0}")]
    UnknownDimension(String),
}

/// On-disk container variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NcFormat {
    /// NetCDF-3 classic
    Classic,
    /// NetCDF-4 (HDF5 based)
    Netcdf4,
}

impl NcFormat {
    /// Numeric suffix used in generated file names
    pub fn suffix(&self) -> u8 {
        match self {
            NcFormat::Classic => 3,
            NcFormat::Netcdf4 => 4,
        }
    }

    fn options(&self) -> netcdf::Options {
        match self {
            NcFormat::Classic => netcdf::Options::empty(),
            NcFormat::Netcdf4 => netcdf::Options::NETCDF4,
        }
    }
}

impl FromStr for NcFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "classic" | "3" | "netcdf3" => Ok(NcFormat::Classic),
            "netcdf4" | "4" | "nc4" => Ok(NcFormat::Netcdf4),
            other => Err(format!("Unknown NetCDF format: {}", other)),
        }
    }
}

/// NetCDF writer that defines a full layout up front and accepts field blocks
pub struct NetCDFWriter {
    pub file_path: PathBuf,
    file: Option<netcdf::FileMut>,
    layout: DatasetLayout,
}

impl NetCDFWriter {
    /// Create the output file with every dimension, coordinate and field defined.
    ///
    /// An existing file at `file_path` is removed first and missing parent
    /// directories are created. Coordinate values are written immediately;
    /// fields are filled later through [`DataWriter::write_block`]. No
    /// `_FillValue` attribute is added.
    pub fn create(
        file_path: impl AsRef<Path>,
        layout: &DatasetLayout,
        format: NcFormat,
    ) -> Result<Self, WriteError> {
        let path = file_path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if path.exists() {
            log::debug!("Removing existing file {}", path.display());
            fs::remove_file(path)?;
        }

        let mut file = netcdf::create_with(path, format.options())?;

        for dim in &layout.dimensions {
            if dim.unlimited {
                file.add_unlimited_dimension(&dim.name)?;
            } else {
                file.add_dimension(&dim.name, dim.len)?;
            }
        }

        for (name, value) in &layout.global_attributes {
            if name != "history" {
                put_global(&mut file, name, value)?;
            }
        }
        if !layout.global_attributes.contains_key("Conventions") {
            file.add_attribute("Conventions", "CF-1.6")?;
        }
        let creation_time = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        let history = match layout.global_attributes.get("history").and_then(|v| v.as_text()) {
            Some(previous) => format!("Created on {}\n{}", creation_time, previous),
            None => format!("Created on {}", creation_time),
        };
        file.add_attribute("history", history)?;

        for coord in &layout.coordinates {
            let mut var = file.add_variable::<f32>(&coord.name, &[coord.name.as_str()])?;
            put_attributes(&mut var, &coord.attributes)?;
        }

        for field in &layout.fields {
            for dim in &field.dims {
                if layout.dimension(dim).is_none() {
                    return Err(WriteError::UnknownDimension(format!("{} in {}", dim, field.name)));
                }
            }
            let dims: Vec<&str> = field.dims.iter().map(String::as_str).collect();
            let mut var = file.add_variable::<f32>(&field.name, &dims)?;
            put_attributes(&mut var, &field.attributes)?;
        }

        for coord in &layout.coordinates {
            if coord.is_empty() {
                continue;
            }
            let mut var = file
                .variable_mut(&coord.name)
                .ok_or_else(|| WriteError::MissingVariable(coord.name.clone()))?;
            let values = coord.values.to_vec();
            var.put_values(&values, (&[0usize][..], &[values.len()][..]))?;
        }

        log::debug!(
            "Created {} ({:?}) with fields {:?}",
            path.display(),
            format,
            layout.field_names()
        );

        Ok(Self {
            file_path: path.to_path_buf(),
            file: Some(file),
            layout: layout.clone(),
        })
    }
}

impl DataWriter for NetCDFWriter {
    fn write_block(
        &mut self,
        name: &str,
        offset: &[usize],
        block: ArrayViewD<'_, f32>,
    ) -> Result<(), WriteError> {
        let shape = self
            .layout
            .field_shape(name)
            .ok_or_else(|| WriteError::MissingVariable(name.to_string()))?;
        if offset.len() != shape.len() || block.ndim() != shape.len() {
            return Err(WriteError::Shape(format!(
                "{}: block of rank {} at {:?} for shape {:?}",
                name,
                block.ndim(),
                offset,
                shape
            )));
        }
        for ((&start, &len), &full) in offset.iter().zip(block.shape()).zip(&shape) {
            if start + len > full {
                return Err(WriteError::Shape(format!(
                    "{}: block {:?} at {:?} exceeds shape {:?}",
                    name,
                    block.shape(),
                    offset,
                    shape
                )));
            }
        }
        if block.is_empty() {
            return Ok(());
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| WriteError::MissingVariable(format!("{} (file closed)", name)))?;
        let mut var = file
            .variable_mut(name)
            .ok_or_else(|| WriteError::MissingVariable(name.to_string()))?;

        let data: Vec<f32> = block.iter().copied().collect();
        let count: Vec<usize> = block.shape().to_vec();
        var.put_values(&data, (offset, &count[..]))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), WriteError> {
        if let Some(file) = self.file.take() {
            drop(file);
            log::debug!("Closed {}", self.file_path.display());
        }
        Ok(())
    }
}

fn put_attributes(var: &mut netcdf::VariableMut<'_>, attrs: &Attributes) -> Result<(), WriteError> {
    for (name, value) in attrs {
        if name == "_FillValue" {
            continue;
        }
        match value {
            AttributeValue::Text(v) => var.put_attribute(name, v.as_str())?,
            AttributeValue::Int(v) => var.put_attribute(name, *v)?,
            AttributeValue::Float(v) => var.put_attribute(name, *v)?,
            AttributeValue::Double(v) => var.put_attribute(name, *v)?,
            AttributeValue::Floats(v) => var.put_attribute(name, v.clone())?,
            AttributeValue::Doubles(v) => var.put_attribute(name, v.clone())?,
        };
    }
    Ok(())
}

fn put_global(file: &mut netcdf::FileMut, name: &str, value: &AttributeValue) -> Result<(), WriteError> {
    match value {
        AttributeValue::Text(v) => file.add_attribute(name, v.as_str())?,
        AttributeValue::Int(v) => file.add_attribute(name, *v)?,
        AttributeValue::Float(v) => file.add_attribute(name, *v)?,
        AttributeValue::Double(v) => file.add_attribute(name, *v)?,
        AttributeValue::Floats(v) => file.add_attribute(name, v.clone())?,
        AttributeValue::Doubles(v) => file.add_attribute(name, v.clone())?,
    };
    Ok(())
}
