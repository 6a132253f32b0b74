//! Capture-side collaborators.
//!
//! The pipeline never touches storage directly.  It sees the capture queue
//! through [`QueueStore`] and resolves item locators through [`FileReader`].
//!
//! [`DirectoryQueue`] and [`FsReader`] are the filesystem adapters used by
//! the binary: each queue is a directory, each file one item, the item kind
//! taken from the file extension.

pub mod directory;

pub use directory::{DirectoryQueue, FsReader};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::QueueItem;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("I/O error on {locator}: {source}")]
    Io {
        locator: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not valid UTF-8 text")]
    NotUtf8(String),

    #[error("no item at {0}")]
    NotFound(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Which buffered queue to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Items for initial processing.
    Main,
    /// Extra screenshots captured for debug mode.
    Extra,
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn list_queue_items(&self, queue: QueueKind) -> Result<Vec<QueueItem>, CaptureError>;
    async fn clear_queue(&self, queue: QueueKind) -> Result<(), CaptureError>;
}

#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read_text(&self, locator: &str) -> Result<String, CaptureError>;
    async fn read_binary(&self, locator: &str) -> Result<Vec<u8>, CaptureError>;
}

// ---------------------------------------------------------------------------
// In-memory doubles
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use memory::{MemoryQueue, MemoryReader};
