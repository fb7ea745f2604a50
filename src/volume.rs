//! Uniform volume-query contract and the event stream published during loads

use crate::error::Result;
use crate::types::{Axis, ScalarType, ValueRange};
use crate::utils::format_bytes;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// One extracted 2D plane of 32-bit float samples
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneData {
    /// Row-major samples, `width * height` long
    pub data: Vec<f32>,

    /// Number of columns
    pub width: usize,

    /// Number of rows
    pub height: usize,

    /// True while the plane is a partial or downsampled stand-in for the
    /// fully resolved plane
    pub is_low_res: bool,
}

impl PlaneData {
    /// Allocate a zero-filled plane
    pub fn zeroed(width: usize, height: usize) -> Self {
        Self {
            data: vec![0.0; width * height],
            width,
            height,
            is_low_res: true,
        }
    }

    /// Sample at (col, row)
    #[inline]
    pub fn at(&self, col: usize, row: usize) -> f32 {
        self.data[row * self.width + col]
    }
}

/// Summary of a volume, identical across backing strategies
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub dimensions: [usize; 3],
    pub spacing: [f64; 3],
    pub scalar_type: ScalarType,
    pub value_range: ValueRange,
    /// False when the range was estimated from sampled points only
    pub exact_range: bool,
}

impl VolumeInfo {
    pub fn summary(&self) -> String {
        let bytes = self.dimensions.iter().product::<usize>() * self.scalar_type.size_in_bytes();
        format!(
            "{} x {} x {} ({}), range [{:.2}, {:.2}]{}, {} full-res",
            self.dimensions[0],
            self.dimensions[1],
            self.dimensions[2],
            self.scalar_type,
            self.value_range.min,
            self.value_range.max,
            if self.exact_range { "" } else { " (approx)" },
            format_bytes(bytes),
        )
    }
}

/// Uniform query contract implemented by every volume backing strategy.
///
/// A renderer holds a `dyn VolumeQuery` and never needs to know whether the
/// data is fully resident, progressively revealed, or streamed on demand.
#[async_trait]
pub trait VolumeQuery: Send + Sync {
    /// Extract the plane perpendicular to `axis` at `index`
    async fn plane(&self, axis: Axis, index: usize) -> Result<PlaneData>;

    /// Read one voxel value
    async fn value(&self, x: usize, y: usize, z: usize) -> Result<f64>;

    /// Metadata summary
    fn info(&self) -> VolumeInfo;
}

/// Load phase, carried in progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadStage {
    /// Building the low-resolution proxy
    Proxy,
    /// Materializing slices into the full-resolution buffer
    Materialize,
    /// Activating blocks of the full-resolution buffer
    Blocks,
}

/// Typed events published by the loader and by streaming rebuilds.
///
/// Consumers subscribe to the receiving end of the channel instead of
/// passing ad hoc callback functions.
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeEvent {
    /// The low-resolution proxy is ready for display
    LowResReady { dimensions: [usize; 3] },

    /// A block's Z range is now full resolution
    BlockReady {
        block: usize,
        z_start: usize,
        z_end: usize,
    },

    /// Every block is active; the volume is fully loaded
    AllBlocksReady,

    /// A derived plane was (re)published by a streaming build
    PlaneReady {
        axis: Axis,
        index: usize,
        is_low_res: bool,
    },

    /// Phase progress, percent in [0, 100]
    Progress { stage: LoadStage, percent: f32 },
}

/// Sending half of the volume event stream
pub type EventSender = UnboundedSender<VolumeEvent>;

/// Receiving half of the volume event stream
pub type EventReceiver = UnboundedReceiver<VolumeEvent>;

/// Create a volume event channel
pub fn event_channel() -> (EventSender, EventReceiver) {
    unbounded_channel()
}

/// Publish an event, ignoring a disconnected consumer
pub(crate) fn publish(events: &EventSender, event: VolumeEvent) {
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_data_zeroed() {
        let plane = PlaneData::zeroed(4, 3);
        assert_eq!(plane.data.len(), 12);
        assert!(plane.is_low_res);
        assert_eq!(plane.at(3, 2), 0.0);
    }

    #[test]
    fn test_info_summary() {
        let info = VolumeInfo {
            dimensions: [64, 64, 10],
            spacing: [1.0; 3],
            scalar_type: ScalarType::U16,
            value_range: ValueRange::new(0.0, 4095.0),
            exact_range: false,
        };
        let summary = info.summary();
        assert!(summary.contains("64 x 64 x 10"));
        assert!(summary.contains("approx"));
    }

    #[test]
    fn test_event_channel_roundtrip() {
        let (tx, mut rx) = event_channel();
        publish(
            &tx,
            VolumeEvent::BlockReady {
                block: 2,
                z_start: 40,
                z_end: 60,
            },
        );
        drop(tx);
        assert_eq!(
            rx.blocking_recv(),
            Some(VolumeEvent::BlockReady {
                block: 2,
                z_start: 40,
                z_end: 60
            })
        );
        assert_eq!(rx.blocking_recv(), None);
    }

    #[test]
    fn test_publish_ignores_closed_channel() {
        let (tx, rx) = event_channel();
        drop(rx);
        publish(&tx, VolumeEvent::AllBlocksReady);
    }
}
