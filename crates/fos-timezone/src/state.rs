//! Durable shared state
//!
//! Single source of truth for the current detection result, the user
//! settings and the connectivity retry schedule. Every write persists
//! the whole document first and only then notifies subscribers.
//!
//! Each field has exactly one writer role:
//! - detection result: the provider race
//! - settings: the settings layer
//! - retry schedule: the connectivity supervisor

use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Application directory under the platform data dir
const APP_DIR: &str = "fos-wb";

/// State file name
const STATE_FILE: &str = "timezone-state.json";

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No user data directory available")]
    NoDataDir,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt state document: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Outcome of one successful detection cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub timezone_id: String,
    pub source_provider_id: String,
}

impl DetectionResult {
    pub fn new(timezone_id: impl Into<String>, source_provider_id: impl Into<String>) -> Self {
        Self {
            timezone_id: timezone_id.into(),
            source_provider_id: source_provider_id.into(),
        }
    }
}

/// Pending connectivity retry, in wall-clock terms so it survives a
/// restart of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySchedule {
    /// Unix time (ms) at which the next check is due
    pub due_at_ms: i64,
    /// Delay to use if that check fails too (ms)
    pub next_delay_ms: u64,
}

impl RetrySchedule {
    /// Time left until the retry is due, zero if overdue
    pub fn remaining(&self, now_ms: i64) -> Duration {
        Duration::from_millis(self.due_at_ms.saturating_sub(now_ms).max(0) as u64)
    }

    /// Delay to use after the next failure
    pub fn next_delay(&self) -> Duration {
        Duration::from_millis(self.next_delay_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Document {
    detection: Option<DetectionResult>,
    settings: Settings,
    retry: Option<RetrySchedule>,
}

/// Shared state handle. Wrap in `Arc` to share between tasks.
#[derive(Debug)]
pub struct SharedState {
    doc: Mutex<Document>,
    path: Option<PathBuf>,
    generation: AtomicU64,
    detection_tx: watch::Sender<Option<DetectionResult>>,
    settings_tx: watch::Sender<Settings>,
}

impl SharedState {
    fn from_document(doc: Document, path: Option<PathBuf>) -> Self {
        let (detection_tx, _) = watch::channel(doc.detection.clone());
        let (settings_tx, _) = watch::channel(doc.settings.clone());
        Self {
            doc: Mutex::new(doc),
            path,
            generation: AtomicU64::new(0),
            detection_tx,
            settings_tx,
        }
    }

    /// Volatile state, nothing touches disk
    pub fn in_memory(settings: Settings) -> Self {
        Self::from_document(
            Document {
                settings: settings.normalized(),
                ..Document::default()
            },
            None,
        )
    }

    /// Default location: `<data dir>/fos-wb/timezone-state.json`
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let base = dirs::data_dir().ok_or(StoreError::NoDataDir)?;
        Ok(base.join(APP_DIR).join(STATE_FILE))
    }

    /// Load state from `path`, starting fresh if the file does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let doc = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<Document>(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state at {}, starting fresh", path.display());
                Document::default()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        info!(
            "Loaded timezone state (zone: {:?}, retry pending: {})",
            doc.detection.as_ref().map(|d| d.timezone_id.as_str()),
            doc.retry.is_some()
        );
        Ok(Self::from_document(doc, Some(path)))
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Document> {
        self.doc.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `change` to a copy of `doc`, persist the copy, then swap it
    /// in. On failure memory keeps the previous document, so readers and
    /// subscribers stay in agreement.
    fn write(&self, doc: &mut Document, change: impl FnOnce(&mut Document)) -> Result<(), StoreError> {
        let mut next = doc.clone();
        change(&mut next);
        self.persist(&next)?;
        *doc = next;
        Ok(())
    }

    // Runs under the document lock so the on-disk order matches the
    // notification order. The document is a few hundred bytes.
    fn persist(&self, doc: &Document) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let io = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(io)?;
        }

        // Write-then-rename so readers never see a partial document
        let tmp = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(doc)?;
        std::fs::write(&tmp, text).map_err(io)?;
        std::fs::rename(&tmp, path).map_err(io)?;
        Ok(())
    }

    // === Detection ===

    /// Current detection result
    pub fn detection(&self) -> Option<DetectionResult> {
        self.lock().detection.clone()
    }

    /// Stored zone id, if known
    pub fn zone(&self) -> Option<String> {
        self.lock().detection.as_ref().map(|d| d.timezone_id.clone())
    }

    /// Replace the detection result (`None` clears it)
    pub fn set_detection(&self, result: Option<DetectionResult>) -> Result<(), StoreError> {
        let mut doc = self.lock();
        self.write(&mut doc, |d| d.detection = result.clone())?;
        drop(doc);

        self.detection_tx.send_replace(result);
        Ok(())
    }

    /// Clear the detection result
    pub fn clear_detection(&self) -> Result<(), StoreError> {
        self.set_detection(None)
    }

    /// Subscribe to detection changes (value or cleared)
    pub fn subscribe_detection(&self) -> watch::Receiver<Option<DetectionResult>> {
        self.detection_tx.subscribe()
    }

    /// Start a new detection cycle, superseding any running one
    pub fn begin_cycle(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Most recently started cycle
    pub fn current_cycle(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Clear-then-set the result for cycle `generation`.
    ///
    /// Returns `Ok(false)` without writing anything when a newer cycle has
    /// started since.
    pub fn commit_detection(
        &self,
        generation: u64,
        result: DetectionResult,
    ) -> Result<bool, StoreError> {
        let mut doc = self.lock();
        if generation != self.current_cycle() {
            warn!(
                "Discarding late result {} from cycle {} (current {})",
                result.timezone_id,
                generation,
                self.current_cycle()
            );
            return Ok(false);
        }

        if doc.detection.is_some() {
            self.write(&mut doc, |d| d.detection = None)?;
            self.detection_tx.send_replace(None);
        }

        self.write(&mut doc, |d| d.detection = Some(result.clone()))?;
        drop(doc);

        self.detection_tx.send_replace(Some(result));
        Ok(true)
    }

    // === Settings ===

    /// Current settings
    pub fn settings(&self) -> Settings {
        self.lock().settings.clone()
    }

    /// Replace settings (normalized first)
    pub fn set_settings(&self, settings: Settings) -> Result<(), StoreError> {
        let settings = settings.normalized();
        let mut doc = self.lock();
        self.write(&mut doc, |d| d.settings = settings.clone())?;
        drop(doc);

        self.settings_tx.send_replace(settings);
        Ok(())
    }

    /// Subscribe to settings changes
    pub fn subscribe_settings(&self) -> watch::Receiver<Settings> {
        self.settings_tx.subscribe()
    }

    // === Connectivity retry ===

    /// Pending retry, if any
    pub fn retry_schedule(&self) -> Option<RetrySchedule> {
        self.lock().retry
    }

    /// Replace the retry schedule (`None` clears it)
    pub fn set_retry_schedule(&self, retry: Option<RetrySchedule>) -> Result<(), StoreError> {
        let mut doc = self.lock();
        self.write(&mut doc, |d| d.retry = retry)
    }
}
