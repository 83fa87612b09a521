//! File-backed event journal.
//!
//! The journal is a single append-only file of frames:
//!
//! ```text
//! [u32 little-endian payload length][bincode SerializedEvent]
//! ```
//!
//! Each append writes all of its frames in one buffer and then calls
//! `sync_data`, so an append either becomes durable as a whole or is rolled
//! back by truncating the file to its previous length. If that truncation
//! fails too, the journal refuses every later append.

use card_market_core::{EventJournal, JournalError, SerializedEvent};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const FRAME_HEADER: usize = 4;

#[derive(Debug)]
struct Tail {
    file: File,
    bytes: u64,
    entries: u64,
    poisoned: bool,
}

impl Tail {
    /// Records the outcome of truncating away a failed append.
    ///
    /// A failed truncation leaves a partial frame on disk; anything appended
    /// after it would be unreadable on the next open.
    fn after_rollback(&mut self, rollback: std::io::Result<()>, path: &Path) {
        if let Err(error) = rollback {
            tracing::error!(path = %path.display(), %error, "journal rollback failed, refusing further appends");
            self.poisoned = true;
        }
    }
}

/// Append-only journal stored in a local file.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    tail: Mutex<Tail>,
}

impl FileJournal {
    /// Opens (or creates) the journal at `path` and validates its contents.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Io`] if the file cannot be opened and
    /// [`JournalError::Corrupted`] if existing contents do not parse.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;
        let contents = tokio::fs::read(&path).await?;
        let entries = decode_frames(&contents)?.len() as u64;

        tracing::debug!(path = %path.display(), entries, "opened file journal");

        Ok(Self {
            path,
            tail: Mutex::new(Tail {
                file,
                bytes: contents.len() as u64,
                entries,
                poisoned: false,
            }),
        })
    }

    /// Location of the journal file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries written so far
    pub async fn len(&self) -> u64 {
        self.tail.lock().await.entries
    }

    /// Checks if the journal holds no entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn encode_frames(events: &[SerializedEvent]) -> Result<Vec<u8>, JournalError> {
    let mut buffer = Vec::new();
    for event in events {
        let payload =
            bincode::serialize(event).map_err(|e| JournalError::Serialization(e.to_string()))?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            JournalError::Serialization(format!("{} event exceeds frame size", event.event_type))
        })?;
        buffer.extend_from_slice(&len.to_le_bytes());
        buffer.extend_from_slice(&payload);
    }
    Ok(buffer)
}

fn decode_frames(bytes: &[u8]) -> Result<Vec<SerializedEvent>, JournalError> {
    let mut events = Vec::new();
    let mut offset = 0_usize;
    while offset < bytes.len() {
        let corrupted = |reason: String| JournalError::Corrupted {
            offset: offset as u64,
            reason,
        };
        let header: [u8; FRAME_HEADER] = bytes
            .get(offset..offset + FRAME_HEADER)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| corrupted("truncated frame header".to_string()))?;
        let len = u32::from_le_bytes(header) as usize;
        let start = offset + FRAME_HEADER;
        let payload = bytes
            .get(start..start + len)
            .ok_or_else(|| corrupted(format!("frame of {len} bytes is truncated")))?;
        let event: SerializedEvent =
            bincode::deserialize(payload).map_err(|e| corrupted(e.to_string()))?;
        events.push(event);
        offset = start + len;
    }
    Ok(events)
}

impl EventJournal for FileJournal {
    fn append(
        &self,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, JournalError>> + Send + '_>> {
        Box::pin(async move {
            let buffer = encode_frames(&events)?;
            let mut tail = self.tail.lock().await;
            if tail.poisoned {
                return Err(JournalError::Unavailable(format!(
                    "{} ends in a partial frame from a failed append",
                    self.path.display()
                )));
            }
            if buffer.is_empty() {
                return Ok(tail.entries);
            }

            let written = async {
                tail.file.write_all(&buffer).await?;
                tail.file.sync_data().await
            }
            .await;

            if let Err(error) = written {
                tracing::error!(path = %self.path.display(), %error, "journal append failed");
                let previous = tail.bytes;
                let rollback = tail.file.set_len(previous).await;
                tail.after_rollback(rollback, &self.path);
                return Err(error.into());
            }

            tail.bytes += buffer.len() as u64;
            tail.entries += events.len() as u64;
            Ok(tail.entries)
        })
    }

    fn load_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, JournalError>> + Send + '_>> {
        Box::pin(async move {
            // Holding the tail keeps readers from seeing a half-written append.
            let _tail = self.tail.lock().await;
            let contents = tokio::fs::read(&self.path).await?;
            decode_frames(&contents)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stored(kind: &str, data: &[u8]) -> SerializedEvent {
        SerializedEvent::new(kind.to_string(), data.to_vec())
    }

    #[tokio::test]
    async fn appends_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.bin");

        let journal = FileJournal::open(&path).await.unwrap();
        assert!(journal.is_empty().await);
        assert_eq!(
            journal
                .append(vec![stored("CardMinted.v1", b"one"), stored("CardListed.v1", b"two")])
                .await
                .unwrap(),
            2
        );
        assert_eq!(journal.append(vec![stored("CardSold.v1", b"three")]).await.unwrap(), 3);
        drop(journal);

        let reopened = FileJournal::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 3);
        let events = reopened.load_all().await.unwrap();
        assert_eq!(events[2], stored("CardSold.v1", b"three"));
    }

    #[tokio::test]
    async fn truncated_tail_is_reported_as_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.bin");

        let journal = FileJournal::open(&path).await.unwrap();
        journal.append(vec![stored("CardMinted.v1", b"one")]).await.unwrap();
        drop(journal);

        let mut bytes = tokio::fs::read(&path).await.unwrap();
        let intact = bytes.len() as u64;
        bytes.extend_from_slice(&[42, 0, 0, 0, 1, 2]);
        tokio::fs::write(&path, &bytes).await.unwrap();

        let error = FileJournal::open(&path).await.unwrap_err();
        assert!(matches!(error, JournalError::Corrupted { offset, .. } if offset == intact));
    }

    #[tokio::test]
    async fn failed_rollback_refuses_later_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.bin");
        let journal = FileJournal::open(&path).await.unwrap();
        journal.append(vec![stored("CardMinted.v1", b"one")]).await.unwrap();

        journal.tail.lock().await.after_rollback(Ok(()), &path);
        journal.append(vec![stored("CardListed.v1", b"two")]).await.unwrap();

        journal
            .tail
            .lock()
            .await
            .after_rollback(Err(std::io::Error::other("device removed")), &path);
        let error = journal
            .append(vec![stored("CardSold.v1", b"three")])
            .await
            .unwrap_err();
        assert!(matches!(error, JournalError::Unavailable(_)));
        assert_eq!(journal.len().await, 2);
        assert_eq!(journal.load_all().await.unwrap().len(), 2);
    }

    #[test]
    fn empty_input_has_no_frames() {
        assert!(decode_frames(&[]).unwrap().is_empty());
        assert!(encode_frames(&[]).unwrap().is_empty());
    }
}
