//! Dense voxel grid - the fully materialized terminal representation

use crate::error::{Result, VoxError};
use crate::types::{Axis, ScalarType, ValueRange, VolumeMetadata};
use crate::volume::{PlaneData, VolumeInfo, VolumeQuery};
use async_trait::async_trait;

/// Tagged contiguous voxel storage.
///
/// Closed over the supported sample types so every numeric site matches
/// exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

impl VoxelBuffer {
    /// Number of voxels stored
    pub fn len(&self) -> usize {
        match self {
            VoxelBuffer::U8(v) => v.len(),
            VoxelBuffer::U16(v) => v.len(),
            VoxelBuffer::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample type of the stored voxels
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            VoxelBuffer::U8(_) => ScalarType::U8,
            VoxelBuffer::U16(_) => ScalarType::U16,
            VoxelBuffer::F32(_) => ScalarType::F32,
        }
    }

    /// Allocate a zero-filled buffer of `len` voxels
    pub fn zeroed(scalar_type: ScalarType, len: usize) -> Self {
        match scalar_type {
            ScalarType::U8 => VoxelBuffer::U8(vec![0; len]),
            ScalarType::U16 => VoxelBuffer::U16(vec![0; len]),
            ScalarType::F32 => VoxelBuffer::F32(vec![0.0; len]),
        }
    }

    /// Reinterpret raw bytes as voxels of `scalar_type`.
    ///
    /// Fails when the byte length is not a whole number of samples.
    pub fn from_bytes(scalar_type: ScalarType, bytes: &[u8], big_endian: bool) -> Result<Self> {
        let width = scalar_type.size_in_bytes();
        if bytes.len() % width != 0 {
            return Err(VoxError::BufferSizeMismatch {
                expected: (bytes.len() / width) * width,
                actual: bytes.len(),
            });
        }

        let buffer = match scalar_type {
            ScalarType::U8 => VoxelBuffer::U8(bytes.to_vec()),
            ScalarType::U16 => {
                let samples = bytes
                    .chunks_exact(2)
                    .map(|c| {
                        let pair = [c[0], c[1]];
                        if big_endian {
                            u16::from_be_bytes(pair)
                        } else {
                            u16::from_le_bytes(pair)
                        }
                    })
                    .collect();
                VoxelBuffer::U16(samples)
            }
            ScalarType::F32 => {
                let samples = bytes
                    .chunks_exact(4)
                    .map(|c| {
                        let quad = [c[0], c[1], c[2], c[3]];
                        if big_endian {
                            f32::from_be_bytes(quad)
                        } else {
                            f32::from_le_bytes(quad)
                        }
                    })
                    .collect();
                VoxelBuffer::F32(samples)
            }
        };

        Ok(buffer)
    }

    /// Read one voxel as f32
    #[inline]
    pub fn get_f32(&self, index: usize) -> f32 {
        match self {
            VoxelBuffer::U8(v) => v[index] as f32,
            VoxelBuffer::U16(v) => v[index] as f32,
            VoxelBuffer::F32(v) => v[index],
        }
    }

    /// Read one voxel as f64
    #[inline]
    pub fn get_f64(&self, index: usize) -> f64 {
        match self {
            VoxelBuffer::U8(v) => v[index] as f64,
            VoxelBuffer::U16(v) => v[index] as f64,
            VoxelBuffer::F32(v) => v[index] as f64,
        }
    }

    /// Copy voxels `[start, end)` from `src` into the same range of `self`.
    ///
    /// Both buffers must share a sample type and cover the range.
    pub fn copy_range(&mut self, src: &VoxelBuffer, start: usize, end: usize) -> Result<()> {
        if end > self.len() || end > src.len() || start > end {
            return Err(VoxError::OutOfBounds(format!(
                "Copy range [{}, {}) exceeds buffer length {}",
                start,
                end,
                self.len().min(src.len())
            )));
        }

        match (self, src) {
            (VoxelBuffer::U8(dst), VoxelBuffer::U8(s)) => dst[start..end].copy_from_slice(&s[start..end]),
            (VoxelBuffer::U16(dst), VoxelBuffer::U16(s)) => dst[start..end].copy_from_slice(&s[start..end]),
            (VoxelBuffer::F32(dst), VoxelBuffer::F32(s)) => dst[start..end].copy_from_slice(&s[start..end]),
            (dst, s) => {
                return Err(VoxError::Configuration(format!(
                    "Sample type mismatch in block copy: {} vs {}",
                    dst.scalar_type(),
                    s.scalar_type()
                )))
            }
        }

        Ok(())
    }

    /// Exact min/max over all voxels
    pub fn value_range(&self) -> ValueRange {
        let mut range = ValueRange::default();
        match self {
            VoxelBuffer::U8(v) => {
                for &s in v {
                    range.expand(s as f64);
                }
            }
            VoxelBuffer::U16(v) => {
                for &s in v {
                    range.expand(s as f64);
                }
            }
            VoxelBuffer::F32(v) => {
                for &s in v {
                    range.expand(s as f64);
                }
            }
        }
        range
    }
}

/// In-memory 3D scalar array with metadata.
///
/// Row-major with X fastest, then Y, then Z. The value range is the exact
/// min/max over all voxels, computed once at construction.
#[derive(Debug, Clone)]
pub struct DenseVoxelGrid {
    meta: VolumeMetadata,
    data: VoxelBuffer,
}

impl DenseVoxelGrid {
    /// Construct a grid, validating that the buffer matches the dimensions.
    ///
    /// The metadata's value range is replaced by the exact range of `data`.
    pub fn new(meta: VolumeMetadata, data: VoxelBuffer) -> Result<Self> {
        let expected = meta.voxel_count();
        if data.len() != expected {
            return Err(VoxError::BufferSizeMismatch {
                expected: expected * meta.scalar_type.size_in_bytes(),
                actual: data.len() * data.scalar_type().size_in_bytes(),
            });
        }
        if data.scalar_type() != meta.scalar_type {
            return Err(VoxError::Configuration(format!(
                "Buffer sample type {} does not match metadata {}",
                data.scalar_type(),
                meta.scalar_type
            )));
        }

        let range = data.value_range();
        let meta = meta.with_value_range(range);
        Ok(Self { meta, data })
    }

    /// Construct from raw bytes plus metadata
    pub fn from_bytes(meta: VolumeMetadata, bytes: &[u8], big_endian: bool) -> Result<Self> {
        let expected = meta.full_size_bytes();
        if bytes.len() != expected {
            return Err(VoxError::BufferSizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        let data = VoxelBuffer::from_bytes(meta.scalar_type, bytes, big_endian)?;
        Self::new(meta, data)
    }

    pub fn metadata(&self) -> &VolumeMetadata {
        &self.meta
    }

    pub fn buffer(&self) -> &VoxelBuffer {
        &self.data
    }

    /// Extract the plane perpendicular to `axis` at `index`.
    ///
    /// Native (Z) planes are a contiguous sub-range copy; derived (X/Y)
    /// planes require a strided scan of the grid.
    pub fn plane_sync(&self, axis: Axis, index: usize) -> Result<PlaneData> {
        let len = self.meta.axis_len(axis);
        if index >= len {
            return Err(VoxError::OutOfBounds(format!(
                "Plane index {} out of range for axis {} (length {})",
                index, axis, len
            )));
        }

        let (width, height) = self.meta.plane_dims(axis);
        let mut out = vec![0.0f32; width * height];
        let [nx, ny, _] = self.meta.dimensions;

        match axis {
            Axis::Z => {
                let base = index * nx * ny;
                for (i, sample) in out.iter_mut().enumerate() {
                    *sample = self.data.get_f32(base + i);
                }
            }
            Axis::Y => {
                // width = nx, height = nz
                for z in 0..height {
                    for x in 0..width {
                        out[z * width + x] = self.data.get_f32(self.meta.voxel_index(x, index, z));
                    }
                }
            }
            Axis::X => {
                // width = ny, height = nz
                for z in 0..height {
                    for y in 0..width {
                        out[z * width + y] = self.data.get_f32(self.meta.voxel_index(index, y, z));
                    }
                }
            }
        }

        Ok(PlaneData {
            data: out,
            width,
            height,
            is_low_res: false,
        })
    }

    /// Read one voxel
    pub fn value_sync(&self, x: usize, y: usize, z: usize) -> Result<f64> {
        if !self.meta.is_in_bounds(x, y, z) {
            return Err(VoxError::OutOfBounds(format!(
                "Voxel ({}, {}, {}) outside dimensions {:?}",
                x, y, z, self.meta.dimensions
            )));
        }
        Ok(self.data.get_f64(self.meta.voxel_index(x, y, z)))
    }

    fn info_sync(&self) -> VolumeInfo {
        VolumeInfo {
            dimensions: self.meta.dimensions,
            spacing: self.meta.spacing,
            scalar_type: self.meta.scalar_type,
            value_range: self.meta.value_range,
            exact_range: true,
        }
    }
}

#[async_trait]
impl VolumeQuery for DenseVoxelGrid {
    async fn plane(&self, axis: Axis, index: usize) -> Result<PlaneData> {
        self.plane_sync(axis, index)
    }

    async fn value(&self, x: usize, y: usize, z: usize) -> Result<f64> {
        self.value_sync(x, y, z)
    }

    fn info(&self) -> VolumeInfo {
        self.info_sync()
    }
}
