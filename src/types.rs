//! Core data types for voxstream

use crate::error::{Result, VoxError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar sample types supported by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ScalarType {
    /// Unsigned 8-bit integer
    U8 = 0,
    /// Unsigned 16-bit integer
    U16 = 1,
    /// 32-bit floating point
    F32 = 2,
}

impl ScalarType {
    /// Size in bytes of one sample
    pub fn size_in_bytes(&self) -> usize {
        match self {
            ScalarType::U8 => 1,
            ScalarType::U16 => 2,
            ScalarType::F32 => 4,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, ScalarType::F32)
    }

    /// Parse a descriptor type name ("uint8", "uint16", "float32")
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "uint8" => Ok(ScalarType::U8),
            "uint16" => Ok(ScalarType::U16),
            "float32" => Ok(ScalarType::F32),
            other => Err(VoxError::InvalidMetadata(format!(
                "Unsupported data type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One of the three orthogonal volume axes.
///
/// Z is the native axis (slices are stored/decoded along it); X and Y are
/// derived axes reconstructed from many native planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    /// Convert from usize index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Axis::X),
            1 => Some(Axis::Y),
            2 => Some(Axis::Z),
            _ => None,
        }
    }

    /// Convert to usize index
    pub fn to_index(&self) -> usize {
        *self as usize
    }

    /// Whether planes along this axis are stored contiguously in source order
    pub fn is_native(&self) -> bool {
        matches!(self, Axis::Z)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Value range for a volume
///
/// Exact for fully materialized grids; approximate (sampled) for streaming
/// volumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }

    /// Grow the range to include `value`
    pub fn expand(&mut self, value: f64) {
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

/// Immutable description of a volume: dimensions, physical spacing, sample
/// type, and best known value range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMetadata {
    /// Voxel counts (nx, ny, nz)
    pub dimensions: [usize; 3],

    /// Physical units per voxel (sx, sy, sz)
    pub spacing: [f64; 3],

    /// Sample type of the stored data
    pub scalar_type: ScalarType,

    /// Best known value range
    pub value_range: ValueRange,
}

impl VolumeMetadata {
    /// Create new metadata, validating dimensions and spacing
    pub fn new(dimensions: [usize; 3], spacing: [f64; 3], scalar_type: ScalarType) -> Result<Self> {
        if dimensions.iter().any(|&d| d == 0) {
            return Err(VoxError::InvalidMetadata(format!(
                "Dimensions must be positive, got {:?}",
                dimensions
            )));
        }
        if spacing.iter().any(|&s| !(s > 0.0) || !s.is_finite()) {
            return Err(VoxError::InvalidMetadata(format!(
                "Spacing must be positive and finite, got {:?}",
                spacing
            )));
        }

        Ok(Self {
            dimensions,
            spacing,
            scalar_type,
            value_range: ValueRange::new(0.0, 0.0),
        })
    }

    /// Set the value range
    pub fn with_value_range(mut self, range: ValueRange) -> Self {
        self.value_range = range;
        self
    }

    /// Total number of voxels
    pub fn voxel_count(&self) -> usize {
        self.dimensions.iter().product()
    }

    /// Size in bytes of the fully materialized volume
    pub fn full_size_bytes(&self) -> usize {
        self.voxel_count() * self.scalar_type.size_in_bytes()
    }

    /// Number of planes along `axis`
    pub fn axis_len(&self, axis: Axis) -> usize {
        self.dimensions[axis.to_index()]
    }

    /// Output plane shape (width, height) for a plane perpendicular to `axis`
    ///
    /// Z planes are (nx, ny); Y planes are (nx, nz); X planes are (ny, nz).
    pub fn plane_dims(&self, axis: Axis) -> (usize, usize) {
        let [nx, ny, nz] = self.dimensions;
        match axis {
            Axis::Z => (nx, ny),
            Axis::Y => (nx, nz),
            Axis::X => (ny, nz),
        }
    }

    /// Flat buffer index for voxel (x, y, z), row-major with X fastest
    #[inline]
    pub fn voxel_index(&self, x: usize, y: usize, z: usize) -> usize {
        let [nx, ny, _] = self.dimensions;
        x + nx * (y + ny * z)
    }

    /// Check whether a voxel coordinate is inside the volume
    pub fn is_in_bounds(&self, x: usize, y: usize, z: usize) -> bool {
        x < self.dimensions[0] && y < self.dimensions[1] && z < self.dimensions[2]
    }
}

/// JSON sidecar descriptor for raw volume files
///
/// Matches the format emitted by the dataset generation tooling:
/// `{"dimensions": [64, 64, 64], "dataType": "uint8",
///   "byteOrder": "little-endian", "spacing": [1.0, 1.0, 1.0]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub dimensions: [usize; 3],

    #[serde(rename = "dataType")]
    pub data_type: String,

    #[serde(rename = "byteOrder", default = "default_byte_order")]
    pub byte_order: String,

    #[serde(default = "default_spacing")]
    pub spacing: [f64; 3],

    #[serde(default)]
    pub description: Option<String>,
}

fn default_byte_order() -> String {
    "little-endian".to_string()
}

fn default_spacing() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

impl DatasetDescriptor {
    /// Parse a descriptor from its JSON sidecar text
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Whether the raw payload is big-endian
    pub fn big_endian(&self) -> Result<bool> {
        match self.byte_order.as_str() {
            "little-endian" => Ok(false),
            "big-endian" => Ok(true),
            other => Err(VoxError::InvalidMetadata(format!(
                "Unsupported byte order: {}",
                other
            ))),
        }
    }

    /// Build validated volume metadata from this descriptor
    pub fn to_metadata(&self) -> Result<VolumeMetadata> {
        let scalar_type = ScalarType::from_name(&self.data_type)?;
        VolumeMetadata::new(self.dimensions, self.spacing, scalar_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_type_sizes() {
        assert_eq!(ScalarType::U8.size_in_bytes(), 1);
        assert_eq!(ScalarType::U16.size_in_bytes(), 2);
        assert_eq!(ScalarType::F32.size_in_bytes(), 4);
    }

    #[test]
    fn test_scalar_type_from_name() {
        assert_eq!(ScalarType::from_name("uint8").unwrap(), ScalarType::U8);
        assert_eq!(ScalarType::from_name("uint16").unwrap(), ScalarType::U16);
        assert_eq!(ScalarType::from_name("float32").unwrap(), ScalarType::F32);
        assert!(ScalarType::from_name("int64").is_err());
    }

    #[test]
    fn test_axis_conversion() {
        assert_eq!(Axis::from_index(0), Some(Axis::X));
        assert_eq!(Axis::from_index(2), Some(Axis::Z));
        assert_eq!(Axis::from_index(3), None);
        assert!(Axis::Z.is_native());
        assert!(!Axis::X.is_native());
    }

    #[test]
    fn test_metadata_validation() {
        assert!(VolumeMetadata::new([64, 64, 10], [1.0, 1.0, 2.5], ScalarType::U16).is_ok());
        assert!(VolumeMetadata::new([0, 64, 10], [1.0, 1.0, 1.0], ScalarType::U8).is_err());
        assert!(VolumeMetadata::new([64, 64, 10], [1.0, -1.0, 1.0], ScalarType::U8).is_err());
        assert!(VolumeMetadata::new([64, 64, 10], [1.0, f64::NAN, 1.0], ScalarType::U8).is_err());
    }

    #[test]
    fn test_plane_dims() {
        let meta = VolumeMetadata::new([64, 32, 10], [1.0; 3], ScalarType::U16).unwrap();
        assert_eq!(meta.plane_dims(Axis::Z), (64, 32));
        assert_eq!(meta.plane_dims(Axis::Y), (64, 10));
        assert_eq!(meta.plane_dims(Axis::X), (32, 10));
        assert_eq!(meta.axis_len(Axis::Z), 10);
        assert_eq!(meta.full_size_bytes(), 64 * 32 * 10 * 2);
    }

    #[test]
    fn test_voxel_index() {
        let meta = VolumeMetadata::new([4, 3, 2], [1.0; 3], ScalarType::U8).unwrap();
        assert_eq!(meta.voxel_index(0, 0, 0), 0);
        assert_eq!(meta.voxel_index(1, 0, 0), 1);
        assert_eq!(meta.voxel_index(0, 1, 0), 4);
        assert_eq!(meta.voxel_index(0, 0, 1), 12);
        assert_eq!(meta.voxel_index(3, 2, 1), 23);
    }

    #[test]
    fn test_value_range_expand() {
        let mut range = ValueRange::default();
        range.expand(3.0);
        range.expand(-1.0);
        assert_eq!(range.min, -1.0);
        assert_eq!(range.max, 3.0);
        assert!(range.is_valid());
    }

    #[test]
    fn test_descriptor_parsing() {
        let json = r#"{
            "dimensions": [64, 64, 64],
            "dataType": "uint8",
            "byteOrder": "little-endian",
            "spacing": [1.0, 1.0, 1.0],
            "description": "Test gradient volume (uint8)"
        }"#;
        let desc = DatasetDescriptor::from_json(json).unwrap();
        assert!(!desc.big_endian().unwrap());
        let meta = desc.to_metadata().unwrap();
        assert_eq!(meta.dimensions, [64, 64, 64]);
        assert_eq!(meta.scalar_type, ScalarType::U8);
    }

    #[test]
    fn test_descriptor_defaults() {
        let json = r#"{"dimensions": [8, 8, 8], "dataType": "float32"}"#;
        let desc = DatasetDescriptor::from_json(json).unwrap();
        assert_eq!(desc.byte_order, "little-endian");
        assert_eq!(desc.spacing, [1.0, 1.0, 1.0]);
    }
}
