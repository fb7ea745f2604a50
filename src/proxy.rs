//! Low-resolution proxy construction.
//!
//! The proxy is a small, fully materialized stand-in shown before and while
//! the full dataset loads. Two paths exist: box-average downsampling when the
//! full buffer is already resident (collecting the exact value range as a
//! byproduct of the single full pass), and nearest-neighbor sampling of a
//! subset of native slices when the source is file-backed (value range
//! approximate, from sampled points only).

use crate::error::{Result, VoxError};
use crate::grid::{DenseVoxelGrid, VoxelBuffer};
use crate::manifest::SliceManifest;
use crate::types::{ScalarType, ValueRange, VolumeMetadata};
use crate::utils::ceil_div;
use log::warn;

// Z slices processed between suspension points
const YIELD_EVERY_SLICES: usize = 8;

fn proxy_metadata(meta: &VolumeMetadata, factor: usize) -> Result<VolumeMetadata> {
    if factor == 0 {
        return Err(VoxError::Configuration(
            "Proxy downsample factor must be positive".to_string(),
        ));
    }
    let dims = [
        ceil_div(meta.dimensions[0], factor),
        ceil_div(meta.dimensions[1], factor),
        ceil_div(meta.dimensions[2], factor),
    ];
    let spacing = [
        meta.spacing[0] * factor as f64,
        meta.spacing[1] * factor as f64,
        meta.spacing[2] * factor as f64,
    ];
    VolumeMetadata::new(dims, spacing, ScalarType::F32)
}

/// Box-average downsampling of a resident buffer.
///
/// Returns the proxy grid and the exact value range of the full data,
/// collected during the same pass. Suspends between slabs of Z slices so the
/// host loop can run.
pub async fn box_average_proxy(
    full: &VoxelBuffer,
    meta: &VolumeMetadata,
    factor: usize,
) -> Result<(DenseVoxelGrid, ValueRange)> {
    let proxy_meta = proxy_metadata(meta, factor)?;
    if full.len() != meta.voxel_count() {
        return Err(VoxError::BufferSizeMismatch {
            expected: meta.full_size_bytes(),
            actual: full.len() * full.scalar_type().size_in_bytes(),
        });
    }

    let [nx, ny, nz] = meta.dimensions;
    let [pnx, pny, _] = proxy_meta.dimensions;
    let cells = proxy_meta.voxel_count();

    let mut sums = vec![0.0f64; cells];
    let mut counts = vec![0u32; cells];
    let mut range = ValueRange::default();

    for z in 0..nz {
        let pz = z / factor;
        for y in 0..ny {
            let py = y / factor;
            let row = nx * (y + ny * z);
            let prow = pnx * (py + pny * pz);
            for x in 0..nx {
                let value = full.get_f64(row + x);
                range.expand(value);
                let cell = prow + x / factor;
                sums[cell] += value;
                counts[cell] += 1;
            }
        }
        if (z + 1) % YIELD_EVERY_SLICES == 0 {
            tokio::task::yield_now().await;
        }
    }

    let data: Vec<f32> = sums
        .iter()
        .zip(counts.iter())
        .map(|(&sum, &count)| {
            if count == 0 {
                0.0
            } else {
                (sum / count as f64) as f32
            }
        })
        .collect();

    let grid = DenseVoxelGrid::new(proxy_meta, VoxelBuffer::F32(data))?;
    Ok((grid, range))
}

/// Nearest-neighbor proxy over a sampled subset of native slices.
///
/// Only every `factor`-th Z slice is decoded, so the returned value range is
/// approximate. A slice that fails to decode contributes zeros and is logged
/// rather than aborting the proxy.
pub async fn sampled_proxy(
    manifests: &[SliceManifest],
    meta: &VolumeMetadata,
    factor: usize,
) -> Result<(DenseVoxelGrid, ValueRange)> {
    let proxy_meta = proxy_metadata(meta, factor)?;
    if manifests.len() != meta.dimensions[2] {
        return Err(VoxError::InvalidManifest(format!(
            "Expected {} slice manifests, got {}",
            meta.dimensions[2],
            manifests.len()
        )));
    }

    let [nx, ny, nz] = meta.dimensions;
    if manifests[0].cols() != nx || manifests[0].rows() != ny {
        return Err(VoxError::InvalidManifest(format!(
            "Slice shape {}x{} does not match volume dimensions {}x{}",
            manifests[0].rows(),
            manifests[0].cols(),
            ny,
            nx
        )));
    }
    let [pnx, pny, pnz] = proxy_meta.dimensions;

    let mut data = vec![0.0f32; proxy_meta.voxel_count()];
    let mut range = ValueRange::default();

    for pz in 0..pnz {
        let z = (pz * factor).min(nz - 1);
        match manifests[z].decode().await {
            Ok(plane) => {
                for py in 0..pny {
                    let y = (py * factor).min(ny - 1);
                    for px in 0..pnx {
                        let x = (px * factor).min(nx - 1);
                        let value = plane[y * nx + x];
                        range.expand(value as f64);
                        data[px + pnx * (py + pny * pz)] = value;
                    }
                }
            }
            Err(e) => {
                warn!("Proxy sampling skipped slice {}: {}", z, e);
            }
        }
        tokio::task::yield_now().await;
    }

    if !range.is_valid() {
        range = ValueRange::new(0.0, 0.0);
    }

    let grid = DenseVoxelGrid::new(proxy_meta, VoxelBuffer::F32(data))?;
    Ok((grid, range))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::DecodeParams;
    use crate::source::MemorySource;
    use std::sync::Arc;

    fn gradient_meta() -> VolumeMetadata {
        VolumeMetadata::new([64, 64, 10], [1.0; 3], ScalarType::U16).unwrap()
    }

    fn gradient_buffer(meta: &VolumeMetadata) -> VoxelBuffer {
        // Value increases with Z, constant within a slice
        let [nx, ny, nz] = meta.dimensions;
        let mut data = Vec::with_capacity(meta.voxel_count());
        for z in 0..nz {
            data.extend(std::iter::repeat((z * 100) as u16).take(nx * ny));
        }
        VoxelBuffer::U16(data)
    }

    #[tokio::test]
    async fn test_box_average_dimensions_and_range() {
        let meta = gradient_meta();
        let full = gradient_buffer(&meta);
        let (proxy, range) = box_average_proxy(&full, &meta, 4).await.unwrap();

        assert_eq!(proxy.metadata().dimensions, [16, 16, 3]);
        assert_eq!(proxy.metadata().spacing, [4.0, 4.0, 4.0]);
        assert_eq!(range, ValueRange::new(0.0, 900.0));
    }

    #[tokio::test]
    async fn test_box_average_values() {
        let meta = gradient_meta();
        let full = gradient_buffer(&meta);
        let (proxy, _) = box_average_proxy(&full, &meta, 4).await.unwrap();

        // First proxy slab averages source slices z = 0..4: (0+100+200+300)/4
        assert_eq!(proxy.value_sync(0, 0, 0).unwrap(), 150.0);
        // Last slab is clipped to z = 8..10: (800+900)/2
        assert_eq!(proxy.value_sync(15, 15, 2).unwrap(), 850.0);
    }

    #[tokio::test]
    async fn test_box_average_rejects_wrong_buffer() {
        let meta = gradient_meta();
        let short = VoxelBuffer::U16(vec![0; 10]);
        assert!(box_average_proxy(&short, &meta, 4).await.is_err());
        let full = gradient_buffer(&meta);
        assert!(box_average_proxy(&full, &meta, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_sampled_proxy_dimensions_and_values() {
        let meta = VolumeMetadata::new([8, 8, 8], [1.0; 3], ScalarType::U8).unwrap();

        // One file per slice, slice z filled with value z * 10
        let manifests: Vec<SliceManifest> = (0..8)
            .map(|z| {
                let bytes = vec![(z * 10) as u8; 64];
                SliceManifest::new(
                    Arc::new(MemorySource::new(bytes)),
                    0,
                    64,
                    DecodeParams::simple(8, 8, 8),
                )
                .unwrap()
            })
            .collect();

        let (proxy, range) = sampled_proxy(&manifests, &meta, 2).await.unwrap();
        assert_eq!(proxy.metadata().dimensions, [4, 4, 4]);
        // Nearest-neighbor: proxy z takes source slice 2 * z
        assert_eq!(proxy.value_sync(0, 0, 0).unwrap(), 0.0);
        assert_eq!(proxy.value_sync(0, 0, 1).unwrap(), 20.0);
        assert_eq!(proxy.value_sync(3, 3, 3).unwrap(), 60.0);
        // Range comes from sampled slices only: 0, 20, 40, 60
        assert_eq!(range, ValueRange::new(0.0, 60.0));
    }

    #[tokio::test]
    async fn test_sampled_proxy_wrong_manifest_count() {
        let meta = VolumeMetadata::new([8, 8, 8], [1.0; 3], ScalarType::U8).unwrap();
        assert!(sampled_proxy(&[], &meta, 2).await.is_err());
    }

    #[tokio::test]
    async fn test_sampled_proxy_rejects_shape_mismatch() {
        // Internally consistent 4x4 slices under metadata claiming 8x8
        let meta = VolumeMetadata::new([8, 8, 4], [1.0; 3], ScalarType::U8).unwrap();
        let manifests: Vec<SliceManifest> = (0..4)
            .map(|_| {
                SliceManifest::new(
                    Arc::new(MemorySource::new(vec![0u8; 16])),
                    0,
                    16,
                    DecodeParams::simple(4, 4, 8),
                )
                .unwrap()
            })
            .collect();

        let err = sampled_proxy(&manifests, &meta, 2).await.unwrap_err();
        assert!(matches!(err, VoxError::InvalidManifest(_)));
        assert!(err.to_string().contains("does not match"));
    }
}
