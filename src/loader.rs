//! Loader/orchestrator - chooses the backing strategy, builds the proxy,
//! drives block activation, and reports progress.
//!
//! The strategy is decided once per dataset: slice-manifest sources whose
//! estimated full-resolution size exceeds the streaming threshold become
//! streaming volumes; everything else is materialized and revealed
//! progressively. The returned live volume is usable immediately (proxy
//! resolution); the caller re-queries the same object as blocks activate.

use crate::error::{Result, VoxError};
use crate::grid::VoxelBuffer;
use crate::manifest::SliceManifest;
use crate::progressive::ProgressiveVolume;
use crate::proxy::{box_average_proxy, sampled_proxy};
use crate::streaming::StreamingVolume;
use crate::types::{ScalarType, VolumeMetadata};
use crate::volume::{publish, EventSender, LoadStage, VolumeEvent, VolumeQuery};
use bytes::Bytes;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Numeric knobs controlling the load strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// File-backed datasets larger than this stream instead of materializing
    pub streaming_threshold_bytes: usize,

    /// Number of progressive activation blocks
    pub num_blocks: usize,

    /// Proxy downsample factor along each axis
    pub proxy_downsample: usize,

    /// Bounded slice cache capacity (planes)
    pub cache_capacity: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            streaming_threshold_bytes: 64 * 1024 * 1024,
            num_blocks: 5,
            proxy_downsample: 4,
            cache_capacity: 32,
        }
    }
}

impl LoaderConfig {
    fn validate(&self) -> Result<()> {
        if self.num_blocks == 0 || self.proxy_downsample == 0 || self.cache_capacity == 0 {
            return Err(VoxError::Configuration(
                "num_blocks, proxy_downsample and cache_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Input to a load: a resident buffer or a per-slice manifest series
pub enum VolumeSource {
    /// One contiguous raw voxel buffer
    Buffer { data: Bytes, big_endian: bool },

    /// Ordered per-slice byte-source descriptors, one per native Z index
    Slices(Vec<SliceManifest>),
}

/// The live volume handed to the consumer; evolves as the load progresses
#[derive(Clone)]
pub enum LiveVolume {
    Progressive(Arc<ProgressiveVolume>),
    Streaming(Arc<StreamingVolume>),
}

impl std::fmt::Debug for LiveVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiveVolume::Progressive(_) => f.write_str("LiveVolume::Progressive"),
            LiveVolume::Streaming(_) => f.write_str("LiveVolume::Streaming"),
        }
    }
}

impl LiveVolume {
    /// The uniform query interface, independent of backing strategy
    pub fn as_query(&self) -> Arc<dyn VolumeQuery> {
        match self {
            LiveVolume::Progressive(v) => Arc::clone(v) as Arc<dyn VolumeQuery>,
            LiveVolume::Streaming(v) => Arc::clone(v) as Arc<dyn VolumeQuery>,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, LiveVolume::Streaming(_))
    }
}

/// Orchestrates dataset opening
pub struct VolumeLoader {
    config: LoaderConfig,
}

impl VolumeLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Open a dataset and return a live volume.
    ///
    /// The proxy is built before this returns; full-resolution data arrives
    /// asynchronously afterwards, reported on `events`.
    pub async fn load(
        &self,
        source: VolumeSource,
        meta: VolumeMetadata,
        events: EventSender,
    ) -> Result<LiveVolume> {
        self.config.validate()?;

        match source {
            VolumeSource::Buffer { data, big_endian } => {
                self.load_resident(data, big_endian, meta, events).await
            }
            VolumeSource::Slices(manifests) => {
                // Series validation runs before any decode attempt
                SliceManifest::validate_series(&manifests)?;

                if meta.full_size_bytes() > self.config.streaming_threshold_bytes {
                    self.load_streaming(manifests, meta, events).await
                } else {
                    self.load_materialized(manifests, meta, events).await
                }
            }
        }
    }

    /// Progressive load of an already resident buffer
    async fn load_resident(
        &self,
        data: Bytes,
        big_endian: bool,
        meta: VolumeMetadata,
        events: EventSender,
    ) -> Result<LiveVolume> {
        let expected = meta.full_size_bytes();
        if data.len() != expected {
            return Err(VoxError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let staging = VoxelBuffer::from_bytes(meta.scalar_type, &data, big_endian)?;
        self.finish_progressive(staging, meta, events).await
    }

    /// Materialize a small slice series, then reveal it progressively.
    ///
    /// Decoded output is float32 by contract, so the materialized volume
    /// carries `ScalarType::F32` regardless of the raw sample type.
    async fn load_materialized(
        &self,
        manifests: Vec<SliceManifest>,
        meta: VolumeMetadata,
        events: EventSender,
    ) -> Result<LiveVolume> {
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

        let slab = nx * ny;
        let mut samples = vec![0.0f32; meta.voxel_count()];
        for (z, manifest) in manifests.iter().enumerate() {
            match manifest.decode().await {
                Ok(plane) => samples[z * slab..(z + 1) * slab].copy_from_slice(&plane),
                Err(e) => {
                    warn!("Materialization skipped slice {}: {}", z, e);
                }
            }
            publish(
                &events,
                VolumeEvent::Progress {
                    stage: LoadStage::Materialize,
                    percent: (z + 1) as f32 / nz as f32 * 100.0,
                },
            );
            tokio::task::yield_now().await;
        }

        let meta = VolumeMetadata::new(meta.dimensions, meta.spacing, ScalarType::F32)?;
        self.finish_progressive(VoxelBuffer::F32(samples), meta, events)
            .await
    }

    /// Shared tail of both progressive paths: proxy, volume, block activation
    async fn finish_progressive(
        &self,
        staging: VoxelBuffer,
        meta: VolumeMetadata,
        events: EventSender,
    ) -> Result<LiveVolume> {
        let factor = self.config.proxy_downsample;
        let (low_res, range) = box_average_proxy(&staging, &meta, factor).await?;
        let meta = meta.with_value_range(range);
        publish(
            &events,
            VolumeEvent::Progress {
                stage: LoadStage::Proxy,
                percent: 100.0,
            },
        );
        publish(
            &events,
            VolumeEvent::LowResReady {
                dimensions: low_res.metadata().dimensions,
            },
        );

        debug!(
            "Progressive load: {} in {} blocks",
            meta.voxel_count(),
            self.config.num_blocks
        );

        let volume = Arc::new(ProgressiveVolume::new(
            meta,
            low_res,
            factor,
            self.config.num_blocks,
        )?);

        // Strictly sequential block activation; one block in flight at a time
        let worker = Arc::clone(&volume);
        tokio::spawn(async move {
            let order = worker.partition().activation_order();
            let total = order.len();
            for (i, block) in order.into_iter().enumerate() {
                if let Err(e) = worker.commit_block(block, &staging) {
                    warn!("Block {} activation failed: {}", block, e);
                    return;
                }
                let (z_start, z_end) = worker.partition().range(block);
                publish(
                    &events,
                    VolumeEvent::BlockReady {
                        block,
                        z_start,
                        z_end,
                    },
                );
                publish(
                    &events,
                    VolumeEvent::Progress {
                        stage: LoadStage::Blocks,
                        percent: (i + 1) as f32 / total as f32 * 100.0,
                    },
                );
                tokio::task::yield_now().await;
            }
            publish(&events, VolumeEvent::AllBlocksReady);
        });

        Ok(LiveVolume::Progressive(volume))
    }

    /// Streaming load: proxy from sampled slices, decode-on-demand afterwards
    async fn load_streaming(
        &self,
        manifests: Vec<SliceManifest>,
        meta: VolumeMetadata,
        events: EventSender,
    ) -> Result<LiveVolume> {
        let factor = self.config.proxy_downsample;
        let (low_res, range) = sampled_proxy(&manifests, &meta, factor).await?;
        let meta = meta.with_value_range(range);

        publish(
            &events,
            VolumeEvent::Progress {
                stage: LoadStage::Proxy,
                percent: 100.0,
            },
        );
        publish(
            &events,
            VolumeEvent::LowResReady {
                dimensions: low_res.metadata().dimensions,
            },
        );

        debug!(
            "Streaming load: {} slices, cache capacity {}",
            manifests.len(),
            self.config.cache_capacity
        );

        let volume = StreamingVolume::new(
            meta,
            manifests,
            low_res,
            self.config.cache_capacity,
            events,
        )?;
        Ok(LiveVolume::Streaming(Arc::new(volume)))
    }
}

impl Default for VolumeLoader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::DecodeParams;
    use crate::source::MemorySource;
    use crate::types::Axis;
    use crate::volume::event_channel;

    fn slice_series(nx: usize, ny: usize, nz: usize) -> Vec<SliceManifest> {
        (0..nz)
            .map(|z| {
                let bytes = vec![z as u8; nx * ny];
                SliceManifest::new(
                    Arc::new(MemorySource::new(bytes)),
                    0,
                    nx * ny,
                    DecodeParams::simple(ny, nx, 8),
                )
                .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_decision_rule_threshold() {
        let meta = VolumeMetadata::new([8, 8, 8], [1.0; 3], ScalarType::U8).unwrap();
        let (tx, _rx) = event_channel();

        // Above threshold: streaming
        let loader = VolumeLoader::new(LoaderConfig {
            streaming_threshold_bytes: 0,
            ..LoaderConfig::default()
        });
        let live = loader
            .load(VolumeSource::Slices(slice_series(8, 8, 8)), meta.clone(), tx)
            .await
            .unwrap();
        assert!(live.is_streaming());

        // Below threshold: materialized progressive
        let (tx, _rx) = event_channel();
        let loader = VolumeLoader::default();
        let live = loader
            .load(VolumeSource::Slices(slice_series(8, 8, 8)), meta, tx)
            .await
            .unwrap();
        assert!(!live.is_streaming());
    }

    #[tokio::test]
    async fn test_streaming_load_rejects_shape_mismatch() {
        // Slices agree with each other but not with the metadata; the
        // streaming path must fail before any decode, not panic mid-proxy
        let meta = VolumeMetadata::new([64, 64, 4], [1.0; 3], ScalarType::U8).unwrap();
        let (tx, _rx) = event_channel();
        let loader = VolumeLoader::new(LoaderConfig {
            streaming_threshold_bytes: 0,
            ..LoaderConfig::default()
        });
        let err = loader
            .load(VolumeSource::Slices(slice_series(32, 32, 4)), meta, tx)
            .await
            .unwrap_err();
        assert!(matches!(err, VoxError::InvalidManifest(_)));
        assert!(err.to_string().contains("does not match"));
    }

    #[tokio::test]
    async fn test_buffer_load_rejects_size_mismatch() {
        let meta = VolumeMetadata::new([8, 8, 8], [1.0; 3], ScalarType::U16).unwrap();
        let (tx, _rx) = event_channel();
        let result = VolumeLoader::default()
            .load(
                VolumeSource::Buffer {
                    data: Bytes::from(vec![0u8; 100]),
                    big_endian: false,
                },
                meta,
                tx,
            )
            .await;
        assert!(matches!(result, Err(VoxError::BufferSizeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_invalid_series_fails_before_decode() {
        let meta = VolumeMetadata::new([8, 8, 2], [1.0; 3], ScalarType::U8).unwrap();
        let source: Arc<dyn crate::source::ByteSource> =
            Arc::new(MemorySource::new(vec![0u8; 256]));
        let manifests = vec![
            SliceManifest::new(Arc::clone(&source), 0, 64, DecodeParams::simple(8, 8, 8)).unwrap(),
            SliceManifest::new(Arc::clone(&source), 64, 36, DecodeParams::simple(6, 6, 8)).unwrap(),
        ];
        let (tx, _rx) = event_channel();
        let result = VolumeLoader::default()
            .load(VolumeSource::Slices(manifests), meta, tx)
            .await;
        assert!(matches!(result, Err(VoxError::InvalidManifest(_))));
    }

    #[tokio::test]
    async fn test_progressive_events_follow_block_order() {
        let meta = VolumeMetadata::new([4, 4, 10], [1.0; 3], ScalarType::U8).unwrap();
        let data: Vec<u8> = (0..meta.voxel_count()).map(|i| (i % 251) as u8).collect();
        let (tx, mut rx) = event_channel();

        let loader = VolumeLoader::new(LoaderConfig {
            num_blocks: 5,
            proxy_downsample: 2,
            ..LoaderConfig::default()
        });
        let live = loader
            .load(
                VolumeSource::Buffer {
                    data: Bytes::from(data),
                    big_endian: false,
                },
                meta,
                tx,
            )
            .await
            .unwrap();

        let mut block_order = Vec::new();
        loop {
            match rx.recv().await.expect("event stream ended early") {
                VolumeEvent::BlockReady { block, .. } => block_order.push(block),
                VolumeEvent::AllBlocksReady => break,
                _ => {}
            }
        }
        assert_eq!(block_order, vec![2, 1, 3, 0, 4]);

        if let LiveVolume::Progressive(volume) = live {
            assert!(volume.is_fully_loaded());
        } else {
            panic!("expected progressive volume");
        }
    }

    #[tokio::test]
    async fn test_materialized_volume_serves_derived_planes() {
        let meta = VolumeMetadata::new([4, 4, 4], [1.0; 3], ScalarType::U8).unwrap();
        let (tx, mut rx) = event_channel();
        let live = VolumeLoader::default()
            .load(VolumeSource::Slices(slice_series(4, 4, 4)), meta, tx)
            .await
            .unwrap();

        // Drain until fully loaded so values are exact
        loop {
            if rx.recv().await.expect("event stream ended early") == VolumeEvent::AllBlocksReady {
                break;
            }
        }

        let query = live.as_query();
        assert_eq!(query.value(0, 0, 3).await.unwrap(), 3.0);
        let plane = query.plane(Axis::X, 2).await.unwrap();
        for z in 0..4 {
            for y in 0..4 {
                assert_eq!(plane.at(y, z), z as f32);
            }
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.num_blocks, 5);
        assert_eq!(config.proxy_downsample, 4);
        assert!(config.cache_capacity > 0);
        assert!(config.streaming_threshold_bytes > 0);
    }
}
