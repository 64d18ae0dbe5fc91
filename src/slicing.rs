use crate::data_io::DatasetLayout;
use crate::parallel::{FieldBlocks, PipelineError, Tile, TileTransform};
use std::fmt;
use std::str::FromStr;

/// Axis a prefix slice is taken along
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceAxis {
    Time,
    Lat,
}

impl SliceAxis {
    pub fn dim_name(&self) -> &'static str {
        match self {
            SliceAxis::Time => "time",
            SliceAxis::Lat => "lat",
        }
    }
}

impl fmt::Display for SliceAxis {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.dim_name())
    }
}

impl FromStr for SliceAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time" => Ok(SliceAxis::Time),
            "lat" => Ok(SliceAxis::Lat),
            other => Err(format!("Unknown slice axis: {}", other)),
        }
    }
}

/// First `count` entries along one axis, everything else unchanged.
/// The count is clamped to the axis length and must be positive.
#[derive(Debug, Clone)]
pub struct PrefixSlice {
    pub axis: SliceAxis,
    pub count: usize,
}

impl PrefixSlice {
    pub fn new(axis: SliceAxis, count: usize) -> Result<Self, PipelineError> {
        if count == 0 {
            return Err(PipelineError::EmptySlice(axis.to_string()));
        }
        Ok(Self { axis, count })
    }

    /// Length of the sliced axis for a given input length
    pub fn clamped(&self, len: usize) -> usize {
        self.count.min(len)
    }
}

impl TileTransform for PrefixSlice {
    fn name(&self) -> String {
        format!("slice[{}<{}]", self.axis, self.count)
    }

    fn input_fields(&self, input: &DatasetLayout) -> Vec<String> {
        input.field_names()
    }

    fn output_layout(&self, input: &DatasetLayout) -> Result<DatasetLayout, PipelineError> {
        let dim = self.axis.dim_name();
        let len = input
            .dim_len(dim)
            .ok_or_else(|| PipelineError::InvalidInput(format!("missing dimension {}", dim)))?;
        let kept = self.clamped(len);

        let mut layout = input.clone();
        for d in layout.dimensions.iter_mut().filter(|d| d.name == dim) {
            d.len = kept;
        }
        for c in layout.coordinates.iter_mut().filter(|c| c.name == dim) {
            *c = c.prefix(kept);
        }
        Ok(layout)
    }

    fn domain(&self, input: &DatasetLayout) -> Result<(usize, usize), PipelineError> {
        let (nt, ny) = match (input.dim_len("time"), input.dim_len("lat")) {
            (Some(nt), Some(ny)) => (nt, ny),
            _ => {
                return Err(PipelineError::InvalidInput(
                    "input needs time and lat dimensions".to_string(),
                ))
            }
        };
        Ok(match self.axis {
            SliceAxis::Time => (self.clamped(nt), ny),
            SliceAxis::Lat => (nt, self.clamped(ny)),
        })
    }

    fn apply(
        &self,
        _input: &DatasetLayout,
        _tile: &Tile,
        fields: FieldBlocks,
    ) -> Result<FieldBlocks, PipelineError> {
        // Tiles never reach past the kept prefix
        Ok(fields)
    }
}
