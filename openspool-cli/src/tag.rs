use openspool_dto::TagRecord;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("NFC is not supported on this device: {0}")]
    Unsupported(String),
    #[error("NFC scan cancelled")]
    Cancelled,
    #[error("Failed to read NFC tag: {0}")]
    Read(String),
    #[error("Failed to write NFC tag: {0}")]
    Write(String),
    #[error("tag i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything read from one tag tap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagRead {
    pub serial_number: String,
    pub records: Vec<TagRecord>,
}

/// An NFC reader. Scans for one tag at a time and writes JSON payloads to it.
pub trait TagDevice {
    /// Waits for a tag and reads its records. Resolves once, with the tag, a
    /// read failure, or [`TagError::Cancelled`].
    async fn scan(&self, cancel: CancelSignal) -> Result<TagRead, TagError>;

    /// Replaces the tag's contents with a single JSON record holding `payload`.
    async fn write<P: Serialize + Sync + ?Sized>(&self, payload: &P) -> Result<(), TagError>;
}

/// Receiving end of a scan's cancellation.
#[derive(Clone, Debug)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves when the scan is cancelled or its session is gone.
    pub async fn cancelled(&mut self) {
        loop {
            if self.is_cancelled() || self.0.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Owns the one scan allowed at a time. Starting a scan cancels the previous
/// one; dropping the session cancels the current one.
#[derive(Debug, Default)]
pub struct ScanSession {
    active: Option<watch::Sender<bool>>,
}

impl ScanSession {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn start(&mut self) -> CancelSignal {
        self.cancel();
        let (tx, rx) = watch::channel(false);
        self.active = Some(tx);
        CancelSignal(rx)
    }

    pub fn cancel(&mut self) {
        if let Some(tx) = self.active.take() {
            debug!("cancelling active scan");
            // No receivers left means the scan already finished.
            let _ = tx.send(true);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// The on-disk layout of a tag image.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TagImage {
    serial_number: String,
    records: Vec<TagRecord>,
}

/// Stands in for the reader with a tag image on disk. The image existing
/// means a tag is on the reader.
#[derive(Debug, Clone)]
pub struct FileTagDevice {
    path: PathBuf,
    poll_interval: Duration,
}

/// Opens the configured device. No device means no NFC support.
pub fn open_device(path: Option<&Path>) -> Result<FileTagDevice, TagError> {
    match path {
        Some(path) => FileTagDevice::open(path),
        None => Err(TagError::Unsupported(
            "no tag reader configured (set --tag or OPENSPOOL_TAG)".to_string(),
        )),
    }
}

impl FileTagDevice {
    /// The image's directory must exist. The image itself may not.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TagError> {
        let path = path.into();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        if !parent.is_dir() {
            return Err(TagError::Unsupported(format!(
                "{} is not a directory",
                parent.display()
            )));
        }

        Ok(Self {
            path,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_image(&self) -> Result<Option<TagImage>, TagError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| TagError::Read(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl TagDevice for FileTagDevice {
    async fn scan(&self, mut cancel: CancelSignal) -> Result<TagRead, TagError> {
        info!(path = %self.path.display(), "hold the tag near the reader");
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            if cancel.is_cancelled() {
                return Err(TagError::Cancelled);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(TagError::Cancelled),
                _ = ticker.tick() => {
                    if let Some(image) = self.read_image().await? {
                        debug!(
                            serial_number = %image.serial_number,
                            records = image.records.len(),
                            "tag read"
                        );
                        return Ok(TagRead {
                            serial_number: image.serial_number,
                            records: image.records,
                        });
                    }
                }
            }
        }
    }

    async fn write<P: Serialize + Sync + ?Sized>(&self, payload: &P) -> Result<(), TagError> {
        let record = TagRecord::json(payload).map_err(|e| TagError::Write(e.to_string()))?;

        // A blank or unreadable tag gets a fresh serial number.
        let serial_number = match self.read_image().await {
            Ok(Some(image)) => image.serial_number,
            _ => new_serial_number(),
        };

        let image = TagImage {
            serial_number,
            records: vec![record],
        };
        let bytes = serde_json::to_vec_pretty(&image).map_err(|e| TagError::Write(e.to_string()))?;

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        info!(
            path = %self.path.display(),
            serial_number = %image.serial_number,
            "tag written"
        );
        Ok(())
    }
}

/// A 7 byte UID in the usual colon separated form.
fn new_serial_number() -> String {
    uuid::Uuid::new_v4().as_bytes()[..7]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use openspool_dto::{find_descriptor, map_spool, ScanOutcome, Spool};
    use pretty_assertions::assert_eq;

    fn device(dir: &tempfile::TempDir) -> FileTagDevice {
        FileTagDevice::open(dir.path().join("tag.json"))
            .unwrap()
            .with_poll_interval(Duration::from_millis(10))
    }

    fn spool(id: i64) -> Spool {
        Spool {
            id,
            ..Default::default()
        }
    }

    #[test]
    fn no_device_is_unsupported() {
        assert!(matches!(open_device(None), Err(TagError::Unsupported(_))));
        assert!(matches!(
            FileTagDevice::open("/definitely/not/here/tag.json"),
            Err(TagError::Unsupported(_))
        ));
    }

    #[test]
    fn serial_numbers_look_like_uids() {
        let serial = new_serial_number();
        assert_eq!(serial.len(), 20);
        assert_eq!(serial.matches(':').count(), 6);
    }

    #[test]
    fn new_scan_cancels_previous() {
        let mut session = ScanSession::new();
        let first = session.start();
        let second = session.start();

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(session.is_active());

        drop(session);
        assert!(second.is_cancelled());
    }

    #[tokio::test]
    async fn write_then_scan() {
        let dir = tempfile::tempdir().unwrap();
        let device = device(&dir);
        let descriptor = map_spool(&spool(12));

        device.write(&descriptor).await.unwrap();

        let mut session = ScanSession::new();
        let read = device.scan(session.start()).await.unwrap();

        assert_eq!(read.records.len(), 1);
        assert_eq!(find_descriptor(&read.records), ScanOutcome::Found(descriptor));
    }

    #[tokio::test]
    async fn rewriting_keeps_serial_number() {
        let dir = tempfile::tempdir().unwrap();
        let device = device(&dir);
        let mut session = ScanSession::new();

        device.write(&map_spool(&spool(1))).await.unwrap();
        let first = device.scan(session.start()).await.unwrap();

        device.write(&map_spool(&spool(2))).await.unwrap();
        let second = device.scan(session.start()).await.unwrap();

        assert_eq!(first.serial_number, second.serial_number);
        assert_ne!(first.records, second.records);
    }

    #[tokio::test]
    async fn scan_waits_for_tag() {
        let dir = tempfile::tempdir().unwrap();
        let reader = device(&dir);
        let writer = reader.clone();
        let mut session = ScanSession::new();

        let scan = tokio::spawn({
            let signal = session.start();
            async move { reader.scan(signal).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!scan.is_finished());

        writer.write(&map_spool(&spool(3))).await.unwrap();
        let read = scan.await.unwrap().unwrap();
        assert_eq!(
            find_descriptor(&read.records).descriptor().and_then(|d| d.spool_id),
            Some(3)
        );
    }

    #[tokio::test]
    async fn cancelled_scan_stops() {
        let dir = tempfile::tempdir().unwrap();
        let reader = device(&dir);
        let mut session = ScanSession::new();

        let scan = tokio::spawn({
            let signal = session.start();
            async move { reader.scan(signal).await }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        session.cancel();

        assert!(matches!(scan.await.unwrap(), Err(TagError::Cancelled)));
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn unreadable_tag_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let device = device(&dir);
        std::fs::write(device.path(), b"not json").unwrap();

        let mut session = ScanSession::new();
        assert!(matches!(
            device.scan(session.start()).await,
            Err(TagError::Read(_))
        ));
    }
}
