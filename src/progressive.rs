//! Progressive volume - a dense grid revealed to consumers in ordered blocks.
//!
//! The full-resolution buffer will eventually hold the whole dataset, but its
//! Z range becomes visible block by block. Until a block is active, queries
//! into it fall back to nearest-neighbor resampled proxy data, never to the
//! zeroed backing memory.

use crate::error::{Result, VoxError};
use crate::grid::{DenseVoxelGrid, VoxelBuffer};
use crate::types::{Axis, VolumeMetadata};
use crate::utils::{ceil_div, center_out_order};
use crate::volume::{PlaneData, VolumeInfo, VolumeQuery};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Global load state of a progressive volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// No block is active yet; every query falls back to the proxy
    LowResOnly,
    /// Some blocks are active
    PartiallyActive,
    /// All blocks are active
    FullyLoaded,
}

/// Ascending Z boundaries splitting `[0, nz)` into contiguous blocks.
///
/// Block sizes are `ceil(nz / num_blocks)` except the last, which is clamped
/// to `nz`.
#[derive(Debug, Clone)]
pub struct BlockPartition {
    bounds: Vec<usize>,
    block_size: usize,
}

impl BlockPartition {
    pub fn new(nz: usize, num_blocks: usize) -> Result<Self> {
        if nz == 0 {
            return Err(VoxError::InvalidMetadata(
                "Cannot partition an empty Z range".to_string(),
            ));
        }
        if num_blocks == 0 {
            return Err(VoxError::Configuration(
                "Block count must be positive".to_string(),
            ));
        }

        let num_blocks = num_blocks.min(nz);
        let block_size = ceil_div(nz, num_blocks);
        // A coarse block size can cover nz in fewer blocks than requested;
        // re-derive the count so the bounds stay strictly ascending and no
        // zero-width block gets an activation slot.
        let num_blocks = ceil_div(nz, block_size);
        let bounds = (0..=num_blocks).map(|i| (i * block_size).min(nz)).collect();

        Ok(Self { bounds, block_size })
    }

    pub fn num_blocks(&self) -> usize {
        self.bounds.len() - 1
    }

    pub fn bounds(&self) -> &[usize] {
        &self.bounds
    }

    /// Z range `[start, end)` covered by `block`
    pub fn range(&self, block: usize) -> (usize, usize) {
        (self.bounds[block], self.bounds[block + 1])
    }

    /// Block containing Z index `z`
    pub fn block_of(&self, z: usize) -> usize {
        (z / self.block_size).min(self.num_blocks() - 1)
    }

    /// Activation order: center block first, alternating outward
    pub fn activation_order(&self) -> Vec<usize> {
        center_out_order(self.num_blocks())
    }
}

/// A dense grid in progress: full-resolution data valid only inside active
/// blocks, a fully valid low-resolution proxy everywhere else.
pub struct ProgressiveVolume {
    meta: VolumeMetadata,
    full: RwLock<VoxelBuffer>,
    partition: BlockPartition,
    active: Vec<AtomicBool>,
    fully_loaded: AtomicBool,
    low_res: DenseVoxelGrid,
    factor: usize,
}

impl ProgressiveVolume {
    /// Create a volume with a zero-filled full buffer and no blocks active.
    ///
    /// `meta.value_range` should already carry the exact range (collected
    /// while the source buffer was scanned for the proxy); it is reported
    /// unchanged.
    pub fn new(
        meta: VolumeMetadata,
        low_res: DenseVoxelGrid,
        factor: usize,
        num_blocks: usize,
    ) -> Result<Self> {
        if factor == 0 {
            return Err(VoxError::Configuration(
                "Proxy downsample factor must be positive".to_string(),
            ));
        }
        let partition = BlockPartition::new(meta.dimensions[2], num_blocks)?;
        let active = (0..partition.num_blocks())
            .map(|_| AtomicBool::new(false))
            .collect();
        let full = RwLock::new(VoxelBuffer::zeroed(meta.scalar_type, meta.voxel_count()));

        Ok(Self {
            meta,
            full,
            partition,
            active,
            fully_loaded: AtomicBool::new(false),
            low_res,
            factor,
        })
    }

    pub fn metadata(&self) -> &VolumeMetadata {
        &self.meta
    }

    pub fn partition(&self) -> &BlockPartition {
        &self.partition
    }

    pub fn low_res(&self) -> &DenseVoxelGrid {
        &self.low_res
    }

    pub fn is_block_active(&self, block: usize) -> bool {
        self.active[block].load(Ordering::Acquire)
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.fully_loaded.load(Ordering::Acquire)
    }

    pub fn load_state(&self) -> LoadState {
        if self.is_fully_loaded() {
            LoadState::FullyLoaded
        } else if self.active.iter().any(|a| a.load(Ordering::Acquire)) {
            LoadState::PartiallyActive
        } else {
            LoadState::LowResOnly
        }
    }

    /// Copy `block`'s Z range from `staging` into the full buffer, then flip
    /// the block active.
    ///
    /// The write completes before the flag flips, so a concurrent query sees
    /// either the proxy fallback or the complete block, never a half-written
    /// one.
    pub fn commit_block(&self, block: usize, staging: &VoxelBuffer) -> Result<()> {
        if block >= self.partition.num_blocks() {
            return Err(VoxError::OutOfBounds(format!(
                "Block {} out of range ({} blocks)",
                block,
                self.partition.num_blocks()
            )));
        }

        let (z_start, z_end) = self.partition.range(block);
        let slab = self.meta.dimensions[0] * self.meta.dimensions[1];
        {
            let mut full = self.full.write();
            full.copy_range(staging, z_start * slab, z_end * slab)?;
        }
        self.active[block].store(true, Ordering::Release);

        if self.active.iter().all(|a| a.load(Ordering::Acquire)) {
            self.fully_loaded.store(true, Ordering::Release);
        }
        Ok(())
    }

    /// Nearest-neighbor proxy sample for a full-resolution coordinate
    fn proxy_value(&self, x: usize, y: usize, z: usize) -> f64 {
        let pmeta = self.low_res.metadata();
        let px = (x / self.factor).min(pmeta.dimensions[0] - 1);
        let py = (y / self.factor).min(pmeta.dimensions[1] - 1);
        let pz = (z / self.factor).min(pmeta.dimensions[2] - 1);
        self.low_res.buffer().get_f64(pmeta.voxel_index(px, py, pz))
    }

    fn plane_impl(&self, axis: Axis, index: usize) -> Result<PlaneData> {
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
        let full = self.full.read();
        let mut any_pending = false;

        match axis {
            Axis::Z => {
                if self.is_block_active(self.partition.block_of(index)) {
                    let base = index * nx * ny;
                    for (i, sample) in out.iter_mut().enumerate() {
                        *sample = full.get_f32(base + i);
                    }
                } else {
                    any_pending = true;
                    for y in 0..height {
                        for x in 0..width {
                            out[y * width + x] = self.proxy_value(x, y, index) as f32;
                        }
                    }
                }
            }
            Axis::Y => {
                // width = nx, height = nz; one row per Z slice
                for z in 0..height {
                    if self.is_block_active(self.partition.block_of(z)) {
                        for x in 0..width {
                            out[z * width + x] = full.get_f32(self.meta.voxel_index(x, index, z));
                        }
                    } else {
                        any_pending = true;
                        for x in 0..width {
                            out[z * width + x] = self.proxy_value(x, index, z) as f32;
                        }
                    }
                }
            }
            Axis::X => {
                // width = ny, height = nz
                for z in 0..height {
                    if self.is_block_active(self.partition.block_of(z)) {
                        for y in 0..width {
                            out[z * width + y] = full.get_f32(self.meta.voxel_index(index, y, z));
                        }
                    } else {
                        any_pending = true;
                        for y in 0..width {
                            out[z * width + y] = self.proxy_value(index, y, z) as f32;
                        }
                    }
                }
            }
        }

        Ok(PlaneData {
            data: out,
            width,
            height,
            is_low_res: any_pending,
        })
    }

    fn value_impl(&self, x: usize, y: usize, z: usize) -> Result<f64> {
        if !self.meta.is_in_bounds(x, y, z) {
            return Err(VoxError::OutOfBounds(format!(
                "Voxel ({}, {}, {}) outside dimensions {:?}",
                x, y, z, self.meta.dimensions
            )));
        }

        if self.is_block_active(self.partition.block_of(z)) {
            let full = self.full.read();
            Ok(full.get_f64(self.meta.voxel_index(x, y, z)))
        } else {
            Ok(self.proxy_value(x, y, z))
        }
    }
}

#[async_trait]
impl VolumeQuery for ProgressiveVolume {
    async fn plane(&self, axis: Axis, index: usize) -> Result<PlaneData> {
        self.plane_impl(axis, index)
    }

    async fn value(&self, x: usize, y: usize, z: usize) -> Result<f64> {
        self.value_impl(x, y, z)
    }

    fn info(&self) -> VolumeInfo {
        VolumeInfo {
            dimensions: self.meta.dimensions,
            spacing: self.meta.spacing,
            scalar_type: self.meta.scalar_type,
            value_range: self.meta.value_range,
            exact_range: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::box_average_proxy;
    use crate::types::ScalarType;

    #[test]
    fn test_partition_boundaries() {
        let partition = BlockPartition::new(100, 5).unwrap();
        assert_eq!(partition.bounds(), &[0, 20, 40, 60, 80, 100]);
        assert_eq!(partition.activation_order(), vec![2, 1, 3, 0, 4]);
    }

    #[test]
    fn test_partition_clamps_last_block() {
        let partition = BlockPartition::new(10, 4).unwrap();
        assert_eq!(partition.bounds(), &[0, 3, 6, 9, 10]);
        assert_eq!(partition.range(3), (9, 10));
        assert_eq!(partition.block_of(9), 3);
        assert_eq!(partition.block_of(0), 0);
        assert_eq!(partition.block_of(5), 1);
    }

    #[test]
    fn test_partition_more_blocks_than_slices() {
        let partition = BlockPartition::new(3, 5).unwrap();
        assert_eq!(partition.num_blocks(), 3);
        assert_eq!(partition.bounds(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_partition_bounds_strictly_ascending() {
        // 5 slices in 4 requested blocks of ceil size 2 only need 3 blocks
        let partition = BlockPartition::new(5, 4).unwrap();
        assert_eq!(partition.bounds(), &[0, 2, 4, 5]);
        assert_eq!(partition.num_blocks(), 3);
        assert_eq!(partition.range(2), (4, 5));
        assert_eq!(partition.block_of(4), 2);

        for nz in 1..20 {
            for requested in 1..8 {
                let partition = BlockPartition::new(nz, requested).unwrap();
                assert!(
                    partition.bounds().windows(2).all(|w| w[0] < w[1]),
                    "nz={} requested={} bounds={:?}",
                    nz,
                    requested,
                    partition.bounds()
                );
            }
        }
    }

    #[test]
    fn test_partition_rejects_empty() {
        assert!(BlockPartition::new(0, 5).is_err());
        assert!(BlockPartition::new(10, 0).is_err());
    }

    async fn gradient_volume() -> (ProgressiveVolume, VoxelBuffer) {
        // 8x8x10, value = z * 100 + x
        let meta = VolumeMetadata::new([8, 8, 10], [1.0; 3], ScalarType::U16).unwrap();
        let mut data = Vec::with_capacity(meta.voxel_count());
        for z in 0..10u16 {
            for _y in 0..8 {
                for x in 0..8u16 {
                    data.push(z * 100 + x);
                }
            }
        }
        let staging = VoxelBuffer::U16(data);
        let (low_res, range) = box_average_proxy(&staging, &meta, 2).await.unwrap();
        let meta = meta.with_value_range(range);
        let volume = ProgressiveVolume::new(meta, low_res, 2, 5).unwrap();
        (volume, staging)
    }

    #[tokio::test]
    async fn test_pending_block_falls_back_to_proxy() {
        let (volume, _staging) = gradient_volume().await;
        assert_eq!(volume.load_state(), LoadState::LowResOnly);

        // z = 5 lives in a pending block: expect resampled proxy data, not zero
        let value = volume.value_impl(0, 0, 5).unwrap();
        assert!(value > 0.0, "pending query must not read zeroed memory");

        let plane = volume.plane_impl(Axis::Z, 5).unwrap();
        assert!(plane.is_low_res);
        assert!(plane.data.iter().any(|&v| v > 0.0));
    }

    #[tokio::test]
    async fn test_active_block_is_bit_identical() {
        let (volume, staging) = gradient_volume().await;

        // Block 2 covers z in [4, 6)
        volume.commit_block(2, &staging).unwrap();
        assert_eq!(volume.load_state(), LoadState::PartiallyActive);
        assert!(volume.is_block_active(2));

        let plane = volume.plane_impl(Axis::Z, 5).unwrap();
        assert!(!plane.is_low_res);
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(plane.at(x, y), (500 + x) as f32);
            }
        }
        assert_eq!(volume.value_impl(3, 0, 4).unwrap(), 403.0);
    }

    #[tokio::test]
    async fn test_derived_plane_mixes_full_and_proxy() {
        let (volume, staging) = gradient_volume().await;
        volume.commit_block(2, &staging).unwrap();

        let plane = volume.plane_impl(Axis::Y, 0).unwrap();
        assert!(plane.is_low_res, "pending rows keep the plane low-res");
        // Rows for active z values are exact
        assert_eq!(plane.at(3, 4), 403.0);
        assert_eq!(plane.at(3, 5), 503.0);
        // Pending rows are proxy samples, not zero
        assert!(plane.at(3, 0) > 0.0);
    }

    #[tokio::test]
    async fn test_full_activation() {
        let (volume, staging) = gradient_volume().await;
        for block in volume.partition().activation_order() {
            volume.commit_block(block, &staging).unwrap();
        }
        assert!(volume.is_fully_loaded());
        assert_eq!(volume.load_state(), LoadState::FullyLoaded);

        let plane = volume.plane_impl(Axis::X, 7).unwrap();
        assert!(!plane.is_low_res);
        for z in 0..10 {
            for y in 0..8 {
                assert_eq!(plane.at(y, z), (z * 100 + 7) as f32);
            }
        }
    }

    #[tokio::test]
    async fn test_commit_block_bounds() {
        let (volume, staging) = gradient_volume().await;
        assert!(volume.commit_block(5, &staging).is_err());
    }
}
