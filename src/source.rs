//! Byte sources - read-only random access to the backing data of a dataset

use crate::error::{Result, VoxError};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Read-only random access to a byte range of a file or buffer.
///
/// Implementations never write; a short read (the range extends past the end
/// of the source) returns the bytes that exist rather than failing.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Read up to `len` bytes starting at `offset`
    async fn read_range(&self, offset: u64, len: usize) -> Result<Bytes>;

    /// Total length of the source in bytes
    async fn len(&self) -> Result<u64>;
}

/// In-memory byte source
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn read_range(&self, offset: u64, len: usize) -> Result<Bytes> {
        let start = (offset as usize).min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());
        Ok(self.data.slice(start..end))
    }

    async fn len(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

/// File-backed byte source
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ByteSource for FileSource {
    async fn read_range(&self, offset: u64, len: usize) -> Result<Bytes> {
        let mut file = fs::File::open(&self.path).await.map_err(VoxError::Io)?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(VoxError::Io)?;

        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = file.read(&mut buf[filled..]).await.map_err(VoxError::Io)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    async fn len(&self) -> Result<u64> {
        let metadata = fs::metadata(&self.path).await.map_err(VoxError::Io)?;
        Ok(metadata.len())
    }
}
