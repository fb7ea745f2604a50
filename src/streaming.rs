//! Streaming volume - grid queries backed by on-demand slice decoding.
//!
//! No full-resolution buffer exists. Native (Z) queries are a direct
//! cache-or-decode call; derived (X/Y) queries stitch the requested plane
//! incrementally from many native planes, visiting slices center-out and
//! publishing partial results after every slice. A new request for a
//! different index on the same axis cancels the in-flight build
//! cooperatively: decode calls already issued complete, but their results are
//! discarded once the build is superseded.

use crate::cache::{PlaneKey, SliceCache};
use crate::error::{Result, VoxError};
use crate::grid::DenseVoxelGrid;
use crate::manifest::SliceManifest;
use crate::types::{Axis, VolumeMetadata};
use crate::utils::center_out_order;
use crate::volume::{publish, EventSender, PlaneData, VolumeEvent, VolumeInfo, VolumeQuery};
use async_trait::async_trait;
use log::warn;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-derived-axis build state
struct AxisBuild {
    /// Epoch of the live request; bumping it cancels the previous build
    epoch: AtomicU64,
    /// Most recently published plane for this axis
    latest: Mutex<Option<(usize, Arc<PlaneData>)>>,
}

impl AxisBuild {
    fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
            latest: Mutex::new(None),
        }
    }
}

/// Cancellation token for one derived-plane build, checked at every
/// suspension point
struct BuildToken<'a> {
    slot: &'a AxisBuild,
    epoch: u64,
}

impl BuildToken<'_> {
    fn is_live(&self) -> bool {
        self.slot.epoch.load(Ordering::Acquire) == self.epoch
    }
}

/// Volume backed by a slice manifest series instead of a resident buffer
pub struct StreamingVolume {
    meta: VolumeMetadata,
    manifests: Vec<SliceManifest>,
    cache: SliceCache,
    low_res: DenseVoxelGrid,
    /// Build slots for the derived axes, X then Y
    builds: [AxisBuild; 2],
    events: EventSender,
}

impl StreamingVolume {
    /// Create a streaming volume over a validated manifest series.
    ///
    /// Fails fast, before any decode attempt, when the series is empty,
    /// inconsistent, or does not match the metadata dimensions.
    pub fn new(
        meta: VolumeMetadata,
        manifests: Vec<SliceManifest>,
        low_res: DenseVoxelGrid,
        cache_capacity: usize,
        events: EventSender,
    ) -> Result<Self> {
        SliceManifest::validate_series(&manifests)?;

        let [nx, ny, nz] = meta.dimensions;
        if manifests.len() != nz {
            return Err(VoxError::InvalidManifest(format!(
                "Expected {} slice manifests for nz = {}, got {}",
                nz,
                nz,
                manifests.len()
            )));
        }
        if manifests[0].cols() != nx || manifests[0].rows() != ny {
            return Err(VoxError::InvalidManifest(format!(
                "Slice shape {}x{} does not match volume dimensions {}x{}",
                manifests[0].rows(),
                manifests[0].cols(),
                ny,
                nx
            )));
        }

        Ok(Self {
            meta,
            manifests,
            cache: SliceCache::new(cache_capacity),
            low_res,
            builds: [AxisBuild::new(), AxisBuild::new()],
            events,
        })
    }

    pub fn metadata(&self) -> &VolumeMetadata {
        &self.meta
    }

    pub fn low_res(&self) -> &DenseVoxelGrid {
        &self.low_res
    }

    pub fn cache(&self) -> &SliceCache {
        &self.cache
    }

    /// Most recently published plane for a derived axis, if any
    pub fn latest_plane(&self, axis: Axis) -> Option<(usize, Arc<PlaneData>)> {
        match axis {
            Axis::Z => None,
            _ => self.build_slot(axis).latest.lock().clone(),
        }
    }

    fn build_slot(&self, axis: Axis) -> &AxisBuild {
        match axis {
            Axis::X => &self.builds[0],
            Axis::Y => &self.builds[1],
            Axis::Z => unreachable!("native axis has no build slot"),
        }
    }

    /// Cache-or-decode one native plane
    async fn native_plane(&self, z: usize) -> Result<Arc<PlaneData>> {
        if z >= self.meta.dimensions[2] {
            return Err(VoxError::OutOfBounds(format!(
                "Plane index {} out of range for axis Z (length {})",
                z, self.meta.dimensions[2]
            )));
        }

        let key = PlaneKey::native(z);
        if let Some(plane) = self.cache.get(&key) {
            return Ok(plane);
        }

        let data = self.manifests[z].decode().await?;
        let plane = Arc::new(PlaneData {
            data,
            width: self.meta.dimensions[0],
            height: self.meta.dimensions[1],
            is_low_res: false,
        });
        self.cache.put(key, Arc::clone(&plane));
        Ok(plane)
    }

    /// Copy the row/column of `native` relevant to derived coordinate `k`
    /// into the output row for slice `z`
    fn stitch_line(&self, axis: Axis, k: usize, z: usize, native: &PlaneData, out: &mut [f32]) {
        let [nx, _, _] = self.meta.dimensions;
        match axis {
            Axis::Y => {
                // Output row z is native row k, a contiguous copy
                let src = &native.data[k * nx..(k + 1) * nx];
                out[z * nx..(z + 1) * nx].copy_from_slice(src);
            }
            Axis::X => {
                // Output row z is native column k
                let ny = native.height;
                for y in 0..ny {
                    out[z * ny + y] = native.data[y * nx + k];
                }
            }
            Axis::Z => unreachable!("native axis is never stitched"),
        }
    }

    /// Incrementally stitch the derived plane at coordinate `k` along `axis`.
    ///
    /// Returns `VoxError::Cancelled` when a newer request for the same axis
    /// supersedes this build; nothing is published after that point.
    async fn build_derived(&self, axis: Axis, k: usize) -> Result<PlaneData> {
        let len = self.meta.axis_len(axis);
        if k >= len {
            return Err(VoxError::OutOfBounds(format!(
                "Plane index {} out of range for axis {} (length {})",
                k, axis, len
            )));
        }

        let slot = self.build_slot(axis);
        let epoch = slot.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let token = BuildToken { slot, epoch };

        let (width, height) = self.meta.plane_dims(axis);
        let nz = self.meta.dimensions[2];
        let mut out = vec![0.0f32; width * height];
        let mut visited = 0usize;

        for z in center_out_order(nz) {
            if !token.is_live() {
                return Err(VoxError::Cancelled);
            }

            match self.native_plane(z).await {
                Ok(native) => self.stitch_line(axis, k, z, &native, &mut out),
                Err(e) => {
                    // One unreadable slice degrades one row, not the whole view
                    warn!("Skipping slice {} during {} build at {}: {}", z, axis, k, e);
                }
            }
            visited += 1;

            // The decode above may have completed for a superseded build;
            // drop its output rather than publishing stale state.
            if !token.is_live() {
                return Err(VoxError::Cancelled);
            }

            let is_low_res = visited < nz;
            let snapshot = Arc::new(PlaneData {
                data: out.clone(),
                width,
                height,
                is_low_res,
            });
            *slot.latest.lock() = Some((k, snapshot));
            publish(
                &self.events,
                VolumeEvent::PlaneReady {
                    axis,
                    index: k,
                    is_low_res,
                },
            );
            tokio::task::yield_now().await;
        }

        Ok(PlaneData {
            data: out,
            width,
            height,
            is_low_res: false,
        })
    }
}

#[async_trait]
impl VolumeQuery for StreamingVolume {
    async fn plane(&self, axis: Axis, index: usize) -> Result<PlaneData> {
        match axis {
            Axis::Z => {
                let plane = self.native_plane(index).await?;
                Ok(plane.as_ref().clone())
            }
            Axis::X | Axis::Y => self.build_derived(axis, index).await,
        }
    }

    async fn value(&self, x: usize, y: usize, z: usize) -> Result<f64> {
        if !self.meta.is_in_bounds(x, y, z) {
            return Err(VoxError::OutOfBounds(format!(
                "Voxel ({}, {}, {}) outside dimensions {:?}",
                x, y, z, self.meta.dimensions
            )));
        }
        let plane = self.native_plane(z).await?;
        Ok(plane.data[y * self.meta.dimensions[0] + x] as f64)
    }

    fn info(&self) -> VolumeInfo {
        VolumeInfo {
            dimensions: self.meta.dimensions,
            spacing: self.meta.spacing,
            scalar_type: self.meta.scalar_type,
            value_range: self.meta.value_range,
            exact_range: false,
        }
    }
}
