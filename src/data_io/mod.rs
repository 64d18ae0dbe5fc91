pub mod reader;
pub mod utils;
pub mod writer;

pub use reader::{NetCDFReader, ReaderError};
pub use writer::{NcFormat, NetCDFWriter, WriteError};

use ndarray::{Array1, ArrayD, ArrayViewD, IxDyn, Slice};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

/// Attribute value attached to a variable or to the file itself
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Int(i32),
    Float(f32),
    Double(f64),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<f32> for AttributeValue {
    fn from(value: f32) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Double(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(value)
    }
}

/// Attributes keyed by name, kept in a stable order for writing
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Named dimension of a dataset
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionSpec {
    pub name: String,
    pub len: usize,
    pub unlimited: bool,
}

/// One-dimensional coordinate variable sharing its name with its dimension
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub name: String,
    pub values: Array1<f32>,
    pub attributes: Attributes,
}

impl Coordinate {
    pub fn new(name: &str, values: Array1<f32>, attributes: Attributes) -> Self {
        Self {
            name: name.to_string(),
            values,
            attributes,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Coordinate restricted to its first `count` values
    pub fn prefix(&self, count: usize) -> Self {
        let count = count.min(self.len());
        Self {
            name: self.name.clone(),
            values: self.values.slice(ndarray::s![..count]).to_owned(),
            attributes: self.attributes.clone(),
        }
    }
}

/// Data variable description: ordered dimension names plus attributes
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub dims: Vec<String>,
    pub attributes: Attributes,
}

impl FieldSpec {
    pub fn new(name: &str, dims: &[&str], attributes: Attributes) -> Self {
        Self {
            name: name.to_string(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            attributes,
        }
    }

    pub fn has_dims(&self, dims: &[&str]) -> bool {
        self.dims.len() == dims.len() && self.dims.iter().zip(dims).all(|(a, b)| a == b)
    }
}

/// Everything about a dataset except the field values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetLayout {
    pub dimensions: Vec<DimensionSpec>,
    pub coordinates: Vec<Coordinate>,
    pub fields: Vec<FieldSpec>,
    pub global_attributes: Attributes,
}

impl DatasetLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimension(&self, name: &str) -> Option<&DimensionSpec> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn dim_len(&self, name: &str) -> Option<usize> {
        self.dimension(name).map(|d| d.len)
    }

    pub fn coordinate(&self, name: &str) -> Option<&Coordinate> {
        self.coordinates.iter().find(|c| c.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Shape of a field, resolved through the dimension table
    pub fn field_shape(&self, name: &str) -> Option<Vec<usize>> {
        let spec = self.field(name)?;
        spec.dims.iter().map(|d| self.dim_len(d)).collect()
    }

    /// Register a coordinate together with the dimension it defines
    pub fn add_coordinate(&mut self, coordinate: Coordinate, unlimited: bool) {
        self.dimensions.retain(|d| d.name != coordinate.name);
        self.coordinates.retain(|c| c.name != coordinate.name);
        self.dimensions.push(DimensionSpec {
            name: coordinate.name.clone(),
            len: coordinate.len(),
            unlimited,
        });
        self.coordinates.push(coordinate);
    }

    pub fn add_field(&mut self, field: FieldSpec) {
        self.fields.retain(|f| f.name != field.name);
        self.fields.push(field);
    }

    /// Copy a coordinate and its dimension from another layout
    pub fn copy_coordinate_from(&mut self, other: &DatasetLayout, name: &str) -> bool {
        match (other.coordinate(name), other.dimension(name)) {
            (Some(coord), Some(dim)) => {
                self.add_coordinate(coord.clone(), dim.unlimited);
                true
            }
            _ => false,
        }
    }
}

/// Source of field values addressed by per-dimension index ranges
pub trait DataReader {
    /// Layout of the underlying dataset
    fn layout(&self) -> &DatasetLayout;

    /// Read a hyperslab of a field; one range per field dimension
    fn read_block(&self, name: &str, ranges: &[Range<usize>]) -> Result<ArrayD<f32>, ReaderError>;

    /// Read a whole field
    fn read_field(&self, name: &str) -> Result<ArrayD<f32>, ReaderError> {
        let shape = self
            .layout()
            .field_shape(name)
            .ok_or_else(|| ReaderError::MissingVariable(name.to_string()))?;
        let ranges: Vec<Range<usize>> = shape.into_iter().map(|n| 0..n).collect();
        self.read_block(name, &ranges)
    }
}

impl<T: DataReader + ?Sized> DataReader for &T {
    fn layout(&self) -> &DatasetLayout {
        (**self).layout()
    }

    fn read_block(&self, name: &str, ranges: &[Range<usize>]) -> Result<ArrayD<f32>, ReaderError> {
        (**self).read_block(name, ranges)
    }
}

/// Sink for field blocks placed at per-dimension offsets
pub trait DataWriter {
    fn write_block(
        &mut self,
        name: &str,
        offset: &[usize],
        block: ArrayViewD<'_, f32>,
    ) -> Result<(), WriteError>;

    /// Flush and close; called once after the last block
    fn finish(&mut self) -> Result<(), WriteError> {
        Ok(())
    }
}

/// In-memory dataset with materialized fields
#[derive(Debug, Clone)]
pub struct GridDataset {
    pub layout: DatasetLayout,
    pub fields: HashMap<String, ArrayD<f32>>,
}

impl GridDataset {
    /// Allocate zero-filled fields for every field in the layout
    pub fn new(layout: DatasetLayout) -> Self {
        let fields = layout
            .fields
            .iter()
            .filter_map(|f| {
                layout
                    .field_shape(&f.name)
                    .map(|shape| (f.name.clone(), ArrayD::zeros(IxDyn(&shape))))
            })
            .collect();
        Self { layout, fields }
    }

    pub fn field(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.fields.get(name)
    }

    /// Replace a field's values; the shape must match the layout
    pub fn set_field(&mut self, name: &str, data: ArrayD<f32>) -> Result<(), WriteError> {
        let shape = self
            .layout
            .field_shape(name)
            .ok_or_else(|| WriteError::MissingVariable(name.to_string()))?;
        if data.shape() != shape.as_slice() {
            return Err(WriteError::Shape(format!(
                "{} expects shape {:?}, got {:?}",
                name,
                shape,
                data.shape()
            )));
        }
        self.fields.insert(name.to_string(), data);
        Ok(())
    }
}

fn check_ranges(name: &str, shape: &[usize], ranges: &[Range<usize>]) -> Result<(), String> {
    if ranges.len() != shape.len() {
        return Err(format!(
            "{}: {} ranges given for {} dimensions",
            name,
            ranges.len(),
            shape.len()
        ));
    }
    for (axis, (range, &len)) in ranges.iter().zip(shape).enumerate() {
        if range.start > range.end || range.end > len {
            return Err(format!(
                "{}: range {:?} outside axis {} of length {}",
                name, range, axis, len
            ));
        }
    }
    Ok(())
}

impl DataReader for GridDataset {
    fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    fn read_block(&self, name: &str, ranges: &[Range<usize>]) -> Result<ArrayD<f32>, ReaderError> {
        let data = self
            .fields
            .get(name)
            .ok_or_else(|| ReaderError::MissingVariable(name.to_string()))?;
        check_ranges(name, data.shape(), ranges).map_err(ReaderError::OutOfBounds)?;
        Ok(data
            .slice_each_axis(|ax| Slice::from(ranges[ax.axis.index()].clone()))
            .to_owned())
    }
}

impl DataWriter for GridDataset {
    fn write_block(
        &mut self,
        name: &str,
        offset: &[usize],
        block: ArrayViewD<'_, f32>,
    ) -> Result<(), WriteError> {
        let data = self
            .fields
            .get_mut(name)
            .ok_or_else(|| WriteError::MissingVariable(name.to_string()))?;
        if offset.len() != block.ndim() {
            return Err(WriteError::Shape(format!(
                "{}: {} offsets for a {}-dimensional block",
                name,
                offset.len(),
                block.ndim()
            )));
        }
        let ranges: Vec<Range<usize>> = offset
            .iter()
            .zip(block.shape())
            .map(|(&start, &len)| start..start + len)
            .collect();
        check_ranges(name, data.shape(), &ranges).map_err(WriteError::Shape)?;
        data.slice_each_axis_mut(|ax| Slice::from(ranges[ax.axis.index()].clone()))
            .assign(&block);
        Ok(())
    }
}
