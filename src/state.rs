//! # State Management Module
//!
//! Questo modulo gestisce il tracking delle conversioni della sessione corrente.
//!
//! ## Responsabilità:
//! - Definisce `ConversionRecord`: lo stato di conversione di un singolo file
//! - Definisce `History`: lista ordinata dei record + flag di elaborazione batch
//! - Applica la macchina a stati `Pending → Processing → Completed | Failed`
//! - Deriva il nome di destinazione (`.webp` → `.png`, case-insensitive)
//! - Rilascia gli handle di download quando la history viene svuotata
//!
//! ## Strutture dati:
//! - `RecordId`: Identificativo opaco (hash SHA-256 troncato)
//! - `ConversionStatus`: Stato corrente di un record
//! - `ConversionRecord`: Nome originale, nome target, stato, dati PNG, handle
//! - `History`: Record più recenti per primi, nessuna persistenza su disco
//!
//! ## Invarianti:
//! - `target_name` è sempre derivato da `original_name`, mai modificato
//! - Dati codificati e handle vengono impostati insieme, una sola volta,
//!   solo entrando in `Completed`
//! - Nessuna regressione di stato: `Completed` e `Failed` sono terminali

use crate::download::{DownloadHandle, HandleRegistry};
use crate::error::{ConvertError, ConvertResult};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

const WEBP_SUFFIX: &str = ".webp";

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Derive the PNG filename for a source filename.
///
/// A trailing `.webp` (any case) becomes `.png`; any other name is returned unchanged.
pub fn target_name_for(original_name: &str) -> String {
    let Some(split) = original_name.len().checked_sub(WEBP_SUFFIX.len()) else {
        return original_name.to_string();
    };

    if original_name.is_char_boundary(split)
        && original_name[split..].eq_ignore_ascii_case(WEBP_SUFFIX)
    {
        format!("{}.png", &original_name[..split])
    } else {
        original_name.to_string()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Opaque record identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Hashed so ids stay opaque and do not collide across processes
    fn generate(name: &str, created_at: u64) -> Self {
        let sequence = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);

        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update(created_at.to_le_bytes());
        hasher.update(sequence.to_le_bytes());
        hasher.update(std::process::id().to_le_bytes());

        Self(hex::encode(hasher.finalize())[..12].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Conversion status of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ConversionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn can_transition_to(&self, next: ConversionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Tracked state of one file's conversion
#[derive(Debug)]
pub struct ConversionRecord {
    id: RecordId,
    original_name: String,
    target_name: String,
    status: ConversionStatus,
    encoded_data: Option<Arc<[u8]>>,
    download_handle: Option<DownloadHandle>,
    byte_size: u64,
    created_at: u64,
    error_detail: Option<String>,
}

impl ConversionRecord {
    /// Create a pending record for a source file
    pub fn new(original_name: impl Into<String>) -> Self {
        let original_name = original_name.into();
        let created_at = now_millis();

        Self {
            id: RecordId::generate(&original_name, created_at),
            target_name: target_name_for(&original_name),
            original_name,
            status: ConversionStatus::Pending,
            encoded_data: None,
            download_handle: None,
            byte_size: 0,
            created_at,
            error_detail: None,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn status(&self) -> ConversionStatus {
        self.status
    }

    pub fn encoded_data(&self) -> Option<&[u8]> {
        self.encoded_data.as_deref()
    }

    pub fn download_handle(&self) -> Option<&DownloadHandle> {
        self.download_handle.as_ref()
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    fn transition(&mut self, next: ConversionStatus) -> ConvertResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ConvertError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Mark the record as being converted
    pub fn start_processing(&mut self) -> ConvertResult<()> {
        self.transition(ConversionStatus::Processing)
    }

    /// Store the PNG bytes and their handle, moving to `Completed`
    pub fn complete(&mut self, data: Arc<[u8]>, handle: DownloadHandle) -> ConvertResult<()> {
        if data.is_empty() {
            return Err(ConvertError::Encode(format!("no PNG data for {}", self.original_name)));
        }
        self.transition(ConversionStatus::Completed)?;

        self.byte_size = data.len() as u64;
        self.encoded_data = Some(data);
        self.download_handle = Some(handle);
        Ok(())
    }

    /// Move to `Failed` with a user-facing message
    pub fn fail(&mut self, detail: impl Into<String>) -> ConvertResult<()> {
        self.transition(ConversionStatus::Failed)?;
        self.error_detail = Some(detail.into());
        Ok(())
    }

    fn take_handle(&mut self) -> Option<DownloadHandle> {
        self.download_handle.take()
    }
}

/// Records of the current session plus the batch processing flag
#[derive(Debug, Default)]
pub struct History {
    records: Vec<ConversionRecord>,
    processing: bool,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records, most recent submission first
    pub fn records(&self) -> &[ConversionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn get(&self, id: &RecordId) -> Option<&ConversionRecord> {
        self.records.iter().find(|record| record.id() == id)
    }

    pub(crate) fn get_mut(&mut self, id: &RecordId) -> Option<&mut ConversionRecord> {
        self.records.iter_mut().find(|record| record.id() == id)
    }

    pub(crate) fn set_processing(&mut self, processing: bool) {
        self.processing = processing;
    }

    /// Insert a submission's records ahead of older ones, keeping their order
    pub(crate) fn prepend_batch(&mut self, batch: Vec<ConversionRecord>) {
        self.records.splice(0..0, batch);
    }

    /// Empty the history and release every download handle it holds.
    ///
    /// Returns the number of handles released.
    pub fn clear(&mut self, registry: &HandleRegistry) -> usize {
        let released = self
            .records
            .iter_mut()
            .filter_map(ConversionRecord::take_handle)
            .filter(|handle| registry.release(handle))
            .count();

        self.records.clear();
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_name_swaps_webp_suffix() {
        assert_eq!(target_name_for("photo.webp"), "photo.png");
        assert_eq!(target_name_for("Photo.WEBP"), "Photo.png");
        assert_eq!(target_name_for("archive.tar.WebP"), "archive.tar.png");
        assert_eq!(target_name_for(".webp"), ".png");
    }

    #[test]
    fn test_target_name_leaves_other_names_unchanged() {
        assert_eq!(target_name_for("photo.jpg"), "photo.jpg");
        assert_eq!(target_name_for("webp"), "webp");
        assert_eq!(target_name_for("photo.webp.bak"), "photo.webp.bak");
        assert_eq!(target_name_for("fotografìa"), "fotografìa");
    }

    #[test]
    fn test_record_ids_are_unique() {
        let a = ConversionRecord::new("same.webp");
        let b = ConversionRecord::new("same.webp");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().as_str().len(), 12);
    }

    #[test]
    fn test_record_lifecycle_completed() {
        let registry = HandleRegistry::new();
        let mut record = ConversionRecord::new("photo.webp");
        assert_eq!(record.status(), ConversionStatus::Pending);
        assert_eq!(record.byte_size(), 0);

        record.start_processing().unwrap();
        let data: Arc<[u8]> = Arc::from(vec![1u8, 2, 3]);
        let handle = registry.create(Arc::clone(&data));
        record.complete(data, handle).unwrap();

        assert_eq!(record.status(), ConversionStatus::Completed);
        assert_eq!(record.byte_size(), 3);
        assert_eq!(record.encoded_data(), Some(&[1u8, 2, 3][..]));
        assert!(record.download_handle().is_some());
        assert!(record.error_detail().is_none());
    }

    #[test]
    fn test_record_never_regresses() {
        let mut record = ConversionRecord::new("photo.webp");

        // Pending cannot jump straight to a terminal state
        assert!(matches!(
            record.fail("boom"),
            Err(ConvertError::InvalidTransition { .. })
        ));

        record.start_processing().unwrap();
        record.fail("Failed to convert").unwrap();
        assert_eq!(record.status(), ConversionStatus::Failed);
        assert_eq!(record.error_detail(), Some("Failed to convert"));
        assert!(record.encoded_data().is_none());

        assert!(record.start_processing().is_err());
        assert!(record.fail("again").is_err());
        assert_eq!(record.error_detail(), Some("Failed to convert"));
    }

    #[test]
    fn test_complete_rejects_empty_data() {
        let registry = HandleRegistry::new();
        let mut record = ConversionRecord::new("photo.webp");
        record.start_processing().unwrap();

        let empty: Arc<[u8]> = Arc::from(Vec::new());
        let handle = registry.create(Arc::clone(&empty));
        assert!(record.complete(empty, handle).is_err());
        assert_eq!(record.status(), ConversionStatus::Processing);
        assert!(record.encoded_data().is_none());
    }

    #[test]
    fn test_history_prepends_and_clears() {
        let registry = HandleRegistry::new();
        let mut history = History::new();

        history.prepend_batch(vec![ConversionRecord::new("old.webp")]);
        history.prepend_batch(vec![
            ConversionRecord::new("new-1.webp"),
            ConversionRecord::new("new-2.webp"),
        ]);

        let names: Vec<&str> = history.records().iter().map(|r| r.original_name()).collect();
        assert_eq!(names, vec!["new-1.webp", "new-2.webp", "old.webp"]);

        let id = history.records()[0].id().clone();
        let data: Arc<[u8]> = Arc::from(vec![9u8; 8]);
        let handle = registry.create(Arc::clone(&data));
        {
            let record = history.get_mut(&id).unwrap();
            record.start_processing().unwrap();
            record.complete(data, handle).unwrap();
        }
        assert_eq!(registry.live_count(), 1);

        assert_eq!(history.clear(&registry), 1);
        assert!(history.is_empty());
        assert_eq!(registry.live_count(), 0);
    }
}
