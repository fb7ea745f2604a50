//! Slice manifests and the on-demand plane decoder.
//!
//! A manifest describes how to read and decode one 2D plane from an
//! arbitrary byte range of a source, without materializing anything beyond
//! that plane. Decoding is a pure function of the manifest: no shared mutable
//! state, so concurrent builds may decode different indices freely.

use crate::error::{Result, VoxError};
use crate::source::ByteSource;
use num_traits::ToPrimitive;
use std::sync::Arc;

/// Decode parameters shared by every slice of a series
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    /// Rows in the plane (Y extent)
    pub rows: usize,
    /// Columns in the plane (X extent)
    pub cols: usize,
    /// Bits per raw sample, 8 or 16
    pub bits_per_sample: u8,
    /// Whether raw samples are signed
    pub signed: bool,
    /// Whether 16-bit samples are big-endian
    pub big_endian: bool,
    /// Linear rescale slope
    pub slope: f32,
    /// Linear rescale intercept
    pub intercept: f32,
    /// Mirror columns
    pub flip_x: bool,
    /// Mirror rows
    pub flip_y: bool,
}

impl DecodeParams {
    /// Plain unsigned parameters with identity rescale
    pub fn simple(rows: usize, cols: usize, bits_per_sample: u8) -> Self {
        Self {
            rows,
            cols,
            bits_per_sample,
            signed: false,
            big_endian: false,
            slope: 1.0,
            intercept: 0.0,
            flip_x: false,
            flip_y: false,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(VoxError::InvalidManifest(format!(
                "Plane shape must be positive, got {}x{}",
                self.rows, self.cols
            )));
        }
        if self.bits_per_sample != 8 && self.bits_per_sample != 16 {
            return Err(VoxError::InvalidManifest(format!(
                "Unsupported bit depth: {}",
                self.bits_per_sample
            )));
        }
        Ok(())
    }
}

/// Descriptor for decoding one native-axis plane from a byte range.
///
/// Created once at dataset-open time and read-only thereafter.
#[derive(Clone)]
pub struct SliceManifest {
    source: Arc<dyn ByteSource>,
    offset: u64,
    frame_len: usize,
    params: DecodeParams,
}

impl SliceManifest {
    /// Create a manifest, validating the decode parameters
    pub fn new(
        source: Arc<dyn ByteSource>,
        offset: u64,
        frame_len: usize,
        params: DecodeParams,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            source,
            offset,
            frame_len,
            params,
        })
    }

    /// Build a manifest series for a multi-frame single-file source, where
    /// frame `i` starts at `base_offset + i * frame_stride`.
    pub fn series_from_frames(
        source: Arc<dyn ByteSource>,
        base_offset: u64,
        frame_stride: u64,
        frame_count: usize,
        params: DecodeParams,
    ) -> Result<Vec<Self>> {
        params.validate()?;
        let frame_len = params.rows * params.cols * (params.bits_per_sample as usize / 8);
        (0..frame_count)
            .map(|i| {
                Self::new(
                    Arc::clone(&source),
                    base_offset + i as u64 * frame_stride,
                    frame_len,
                    params,
                )
            })
            .collect()
    }

    /// Validate a per-slice series: non-empty with consistent plane shapes.
    ///
    /// Runs before any decode attempt so a malformed dataset never opens.
    pub fn validate_series(series: &[SliceManifest]) -> Result<()> {
        let first = series.first().ok_or_else(|| {
            VoxError::InvalidManifest("Slice series is empty".to_string())
        })?;

        for (i, manifest) in series.iter().enumerate() {
            if manifest.rows() != first.rows() || manifest.cols() != first.cols() {
                return Err(VoxError::InvalidManifest(format!(
                    "Inconsistent slice dimensions: slice 0 is {}x{} but slice {} is {}x{}",
                    first.rows(),
                    first.cols(),
                    i,
                    manifest.rows(),
                    manifest.cols()
                )));
            }
        }
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.params.rows
    }

    pub fn cols(&self) -> usize {
        self.params.cols
    }

    pub fn params(&self) -> &DecodeParams {
        &self.params
    }

    /// Decode this plane into `rows * cols` f32 samples.
    ///
    /// Applies `value = raw * slope + intercept` and the axis flips. A short
    /// read decodes the missing samples as zero.
    pub async fn decode(&self) -> Result<Vec<f32>> {
        let bytes = self.source.read_range(self.offset, self.frame_len).await?;
        Ok(decode_frame(&bytes, &self.params))
    }
}

impl std::fmt::Debug for SliceManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceManifest")
            .field("offset", &self.offset)
            .field("frame_len", &self.frame_len)
            .field("params", &self.params)
            .finish()
    }
}

#[inline]
fn to_f32<T: ToPrimitive>(value: T) -> f32 {
    value.to_f32().unwrap_or(0.0)
}

/// Raw sample at index `i`, or zero when the payload is truncated
#[inline]
fn sample_at(bytes: &[u8], i: usize, params: &DecodeParams) -> f32 {
    match (params.bits_per_sample, params.signed) {
        (8, false) => bytes.get(i).copied().map(to_f32).unwrap_or(0.0),
        (8, true) => bytes.get(i).map(|&b| to_f32(b as i8)).unwrap_or(0.0),
        (16, _) => {
            let lo = bytes.get(i * 2).copied().unwrap_or(0);
            let hi = bytes.get(i * 2 + 1).copied().unwrap_or(0);
            let raw = if params.big_endian {
                u16::from_be_bytes([lo, hi])
            } else {
                u16::from_le_bytes([lo, hi])
            };
            if params.signed {
                to_f32(raw as i16)
            } else {
                to_f32(raw)
            }
        }
        _ => 0.0,
    }
}

/// Pure frame decoder: same bytes and params always yield the same plane
fn decode_frame(bytes: &[u8], params: &DecodeParams) -> Vec<f32> {
    let count = params.rows * params.cols;
    let mut out = vec![0.0f32; count];

    if !params.flip_x && !params.flip_y {
        // Fast path: single linear pass
        for (i, sample) in out.iter_mut().enumerate() {
            *sample = sample_at(bytes, i, params) * params.slope + params.intercept;
        }
    } else {
        for row in 0..params.rows {
            let src_row = if params.flip_y {
                params.rows - 1 - row
            } else {
                row
            };
            for col in 0..params.cols {
                let src_col = if params.flip_x {
                    params.cols - 1 - col
                } else {
                    col
                };
                let raw = sample_at(bytes, src_row * params.cols + src_col, params);
                out[row * params.cols + col] = raw * params.slope + params.intercept;
            }
        }
    }

    out
}
