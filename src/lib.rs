//! Voxstream - progressive/streaming access to large 3D scalar volumes
//!
//! A pipeline for inspecting CT/MRI-style volumetric datasets (tens of MB to
//! many GB) without ever holding the whole dataset in memory, while
//! presenting something interactive within milliseconds.
//!
//! # Features
//!
//! - Dense voxel grids with a uniform plane/value query contract
//! - Slice manifests: decode one 2D plane from an arbitrary byte range
//! - Bounded recency cache of decoded planes
//! - Streaming volumes: derived planes stitched center-out, with cooperative
//!   cancellation when the requested index changes mid-build
//! - Progressive volumes: full-resolution data revealed in ordered blocks
//!   over a low-resolution proxy
//! - Typed event stream for load progress and plane readiness
//!
//! # Example
//!
//! ```rust,ignore
//! use voxstream::{
//!     event_channel, Axis, LoaderConfig, ScalarType, VolumeLoader, VolumeMetadata, VolumeSource,
//! };
//!
//! # async fn example() -> voxstream::Result<()> {
//! let meta = VolumeMetadata::new([512, 512, 300], [0.7, 0.7, 1.25], ScalarType::U16)?;
//! let (events, mut progress) = event_channel();
//!
//! let loader = VolumeLoader::new(LoaderConfig::default());
//! let live = loader.load(VolumeSource::Slices(manifests), meta, events).await?;
//!
//! // Usable immediately at proxy resolution; re-query as blocks activate
//! let query = live.as_query();
//! let axial = query.plane(Axis::Z, 150).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod grid;
pub mod loader;
pub mod manifest;
pub mod progressive;
pub mod proxy;
pub mod source;
pub mod streaming;
pub mod types;
pub mod utils;
pub mod volume;

// Re-exports
pub use cache::{PlaneKey, SliceCache};
pub use error::{Result, VoxError};
pub use grid::{DenseVoxelGrid, VoxelBuffer};
pub use loader::{LiveVolume, LoaderConfig, VolumeLoader, VolumeSource};
pub use manifest::{DecodeParams, SliceManifest};
pub use progressive::{BlockPartition, LoadState, ProgressiveVolume};
pub use proxy::{box_average_proxy, sampled_proxy};
pub use source::{ByteSource, FileSource, MemorySource};
pub use streaming::StreamingVolume;
pub use types::{Axis, DatasetDescriptor, ScalarType, ValueRange, VolumeMetadata};
pub use volume::{
    event_channel, EventReceiver, EventSender, LoadStage, PlaneData, VolumeEvent, VolumeInfo,
    VolumeQuery,
};

/// Version of the voxstream implementation
pub const VOXSTREAM_VERSION: &str = env!("CARGO_PKG_VERSION");
