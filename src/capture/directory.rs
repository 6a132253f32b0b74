//! Directory-backed queue store and file reader.
//!
//! Files are listed in file-name order so a batch is deterministic.  Files
//! whose extension maps to no [`InputKind`] are skipped with a warning.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{CaptureError, FileReader, QueueKind, QueueStore};
use crate::types::{InputKind, QueueItem};

// ---------------------------------------------------------------------------
// DirectoryQueue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DirectoryQueue {
    main_dir: PathBuf,
    extra_dir: PathBuf,
}

impl DirectoryQueue {
    pub fn new(main_dir: impl Into<PathBuf>, extra_dir: impl Into<PathBuf>) -> Self {
        Self {
            main_dir: main_dir.into(),
            extra_dir: extra_dir.into(),
        }
    }

    fn dir(&self, queue: QueueKind) -> &Path {
        match queue {
            QueueKind::Main => &self.main_dir,
            QueueKind::Extra => &self.extra_dir,
        }
    }

    async fn files(&self, queue: QueueKind) -> Result<Vec<PathBuf>, CaptureError> {
        let dir = self.dir(queue);
        let io_err = |source: std::io::Error| CaptureError::Io {
            locator: dir.display().to_string(),
            source,
        };

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            // A queue that was never written to is simply empty.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl QueueStore for DirectoryQueue {
    async fn list_queue_items(&self, queue: QueueKind) -> Result<Vec<QueueItem>, CaptureError> {
        let items = self
            .files(queue)
            .await?
            .into_iter()
            .filter_map(|path| {
                let kind = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(InputKind::from_extension);
                match kind {
                    Some(kind) => Some(QueueItem::new(kind, path.display().to_string())),
                    None => {
                        log::warn!("capture: skipping unrecognised file {}", path.display());
                        None
                    }
                }
            })
            .collect();
        Ok(items)
    }

    async fn clear_queue(&self, queue: QueueKind) -> Result<(), CaptureError> {
        for path in self.files(queue).await? {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|source| CaptureError::Io {
                    locator: path.display().to_string(),
                    source,
                })?;
        }
        log::debug!("capture: cleared {:?} queue", queue);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FsReader
// ---------------------------------------------------------------------------

/// Treats locators as filesystem paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReader;

#[async_trait]
impl FileReader for FsReader {
    async fn read_text(&self, locator: &str) -> Result<String, CaptureError> {
        let bytes = self.read_binary(locator).await?;
        String::from_utf8(bytes).map_err(|_| CaptureError::NotUtf8(locator.to_string()))
    }

    async fn read_binary(&self, locator: &str) -> Result<Vec<u8>, CaptureError> {
        tokio::fs::read(locator).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CaptureError::NotFound(locator.to_string())
            } else {
                CaptureError::Io {
                    locator: locator.to_string(),
                    source,
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn lists_items_by_extension_in_name_order() {
        let dir = tempdir().expect("temp dir");
        std::fs::write(dir.path().join("b.png"), [0u8]).unwrap();
        std::fs::write(dir.path().join("a.txt"), "hi").unwrap();
        std::fs::write(dir.path().join("c.wav"), [0u8]).unwrap();
        std::fs::write(dir.path().join("d.exe"), [0u8]).unwrap();

        let queue = DirectoryQueue::new(dir.path(), dir.path().join("extra"));
        let items = queue.list_queue_items(QueueKind::Main).await.unwrap();

        let kinds: Vec<InputKind> = items.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![InputKind::Text, InputKind::Screenshot, InputKind::Audio]
        );
        assert!(items[0].locator.ends_with("a.txt"));
    }

    #[tokio::test]
    async fn missing_directory_is_an_empty_queue() {
        let dir = tempdir().expect("temp dir");
        let queue = DirectoryQueue::new(dir.path().join("nope"), dir.path().join("nada"));
        assert!(queue
            .list_queue_items(QueueKind::Extra)
            .await
            .unwrap()
            .is_empty());
        queue.clear_queue(QueueKind::Main).await.unwrap();
    }

    #[tokio::test]
    async fn clear_removes_only_that_queue() {
        let dir = tempdir().expect("temp dir");
        let main = dir.path().join("main");
        let extra = dir.path().join("extra");
        std::fs::create_dir_all(&main).unwrap();
        std::fs::create_dir_all(&extra).unwrap();
        std::fs::write(main.join("one.png"), [0u8]).unwrap();
        std::fs::write(extra.join("two.png"), [0u8]).unwrap();

        let queue = DirectoryQueue::new(&main, &extra);
        queue.clear_queue(QueueKind::Main).await.unwrap();

        assert!(queue.list_queue_items(QueueKind::Main).await.unwrap().is_empty());
        assert_eq!(queue.list_queue_items(QueueKind::Extra).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fs_reader_reads_text_and_reports_missing() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("q.txt");
        std::fs::write(&path, "two sum").unwrap();

        let reader = FsReader;
        let text = reader.read_text(path.to_str().unwrap()).await.unwrap();
        assert_eq!(text, "two sum");

        let missing = dir.path().join("missing.txt");
        let err = reader.read_text(missing.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, CaptureError::NotFound(_)));
    }
}
