//! # Batch Converter
//!
//! Orchestratore principale: valida il batch, crea i record, converte un
//! file alla volta e avvia il download di ogni PNG riuscito.
//!
//! ## Sequenza:
//! 1. Flag `processing` attivo prima di toccare qualsiasi record
//! 2. Validazione dell'intero batch (rifiuto se nessun file è idoneo)
//! 3. Record `Pending` creati tutti insieme, in testa alla history
//! 4. Conversione sequenziale nell'ordine di invio
//! 5. `Completed` → download automatico, `Failed` → messaggio generico
//! 6. Flag `processing` disattivato dopo l'ultimo record

use crate::{
    codec::{ImageCodec, ImageRsCodec},
    config::Config,
    converter::progress_tracker::ProgressTracker,
    download::{DownloadSource, DownloadTrigger, HandleRegistry, SaveSink},
    error::{ConvertError, ConvertResult},
    file_manager::FileDescriptor,
    image_processor::ImageProcessor,
    progress::ConversionStats,
    state::{ConversionRecord, ConversionStatus, History, RecordId},
    validator::FormatValidator,
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Message stored on records that failed to convert
pub const GENERIC_FAILURE: &str = "Failed to convert";

/// Batch validato, con i record già in history
pub(crate) struct PendingBatch {
    files: Vec<FileDescriptor>,
    ids: Vec<RecordId>,
    stats: ConversionStats,
}

/// Orchestratore dei batch di conversione
pub struct BatchConverter<C = ImageRsCodec> {
    config: Config,
    validator: FormatValidator,
    processor: ImageProcessor<C>,
    downloads: DownloadTrigger,
}

impl BatchConverter<ImageRsCodec> {
    /// Crea un orchestratore con il codec di default
    pub fn new(config: Config, sink: Arc<dyn SaveSink>) -> Result<Self> {
        Self::with_codec(config, ImageRsCodec, sink)
    }
}

impl<C: ImageCodec> BatchConverter<C> {
    /// Crea un orchestratore con un codec custom
    pub fn with_codec(config: Config, codec: C, sink: Arc<dyn SaveSink>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            validator: FormatValidator::from_config(&config),
            processor: ImageProcessor::with_codec(codec, &config),
            downloads: DownloadTrigger::new(sink, config.release_delay()),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        self.downloads.registry()
    }

    /// Converte un batch di file, aggiornando `history`.
    ///
    /// Gli errori sui singoli file finiscono nei record; solo il rifiuto
    /// dell'intero batch viene restituito come errore.
    pub async fn submit(
        &self,
        history: &mut History,
        files: Vec<FileDescriptor>,
    ) -> ConvertResult<ConversionStats> {
        let start_time = Instant::now();
        let batch = self.begin_batch(history, files)?;
        Ok(self.run_batch(history, batch, start_time).await)
    }

    /// Valida il batch e inserisce tutti i record `Pending`, senza decodificare nulla
    pub(crate) fn begin_batch(
        &self,
        history: &mut History,
        files: Vec<FileDescriptor>,
    ) -> ConvertResult<PendingBatch> {
        history.set_processing(true);

        let submitted = files.len();
        let eligible = match self.validator.filter_batch(files) {
            Ok(eligible) => eligible,
            Err(e) => {
                history.set_processing(false);
                warn!("Rejected submission of {} file(s): {}", submitted, e);
                return Err(e);
            }
        };

        let mut stats = ConversionStats::new();
        stats.files_skipped = submitted - eligible.len();

        let records: Vec<ConversionRecord> = eligible
            .iter()
            .map(|file| ConversionRecord::new(file.name()))
            .collect();
        let ids = records.iter().map(|record| record.id().clone()).collect();
        history.prepend_batch(records);

        Ok(PendingBatch {
            files: eligible,
            ids,
            stats,
        })
    }

    /// Converte in ordine i record di un batch già inserito
    pub(crate) async fn run_batch(
        &self,
        history: &mut History,
        batch: PendingBatch,
        start_time: Instant,
    ) -> ConversionStats {
        let PendingBatch { files, ids, mut stats } = batch;

        let tracker = ProgressTracker::new(files.len(), &self.config);
        if !files.is_empty() {
            tracker.start(&self.config, self.config.output_path.clone(), history.is_processing());
        }

        for (index, (file, id)) in files.iter().zip(&ids).enumerate() {
            self.convert_record(history, file, id, index, &tracker, &mut stats)
                .await;
        }

        history.set_processing(false);
        if !files.is_empty() {
            tracker.finish(&stats, start_time.elapsed(), history);
        }

        stats
    }

    /// Porta un record da `Pending` a uno stato terminale
    async fn convert_record(
        &self,
        history: &mut History,
        file: &FileDescriptor,
        id: &RecordId,
        index: usize,
        tracker: &ProgressTracker,
        stats: &mut ConversionStats,
    ) {
        let Some(record) = history.get_mut(id) else {
            warn!("Record {} for {} is no longer in the history", id, file.name());
            return;
        };

        if let Err(e) = record.start_processing() {
            warn!("Cannot convert {}: {}", file.name(), e);
            return;
        }
        tracker.file_started(record, index);
        debug!("Converting {} ({})", file.name(), file.media_type());

        match self.processor.convert_file(file).await {
            Ok(png) => self.finish_completed(record, png, stats),
            Err(e) => {
                error!("Conversion failed for {}: {}", file.name(), e);
                Self::finish_failed(record, stats);
            }
        }

        tracker.file_finished(record, stats);
    }

    fn finish_completed(&self, record: &mut ConversionRecord, png: Vec<u8>, stats: &mut ConversionStats) {
        let data: Arc<[u8]> = Arc::from(png);
        let handle = self.registry().create(Arc::clone(&data));

        match record.complete(data, handle.clone()) {
            Ok(()) => {
                stats.add_converted(record.byte_size());
                info!(
                    "Converted {} -> {} ({} bytes)",
                    record.original_name(),
                    record.target_name(),
                    record.byte_size()
                );
                if let Err(e) = self
                    .downloads
                    .trigger(DownloadSource::Handle(handle), record.target_name())
                {
                    warn!("Automatic download of {} failed: {}", record.target_name(), e);
                }
            }
            Err(e) => {
                self.registry().release(&handle);
                error!("Could not store PNG for {}: {}", record.original_name(), e);
                Self::finish_failed(record, stats);
            }
        }
    }

    fn finish_failed(record: &mut ConversionRecord, stats: &mut ConversionStats) {
        if let Err(e) = record.fail(GENERIC_FAILURE) {
            warn!("Cannot mark {} as failed: {}", record.original_name(), e);
        }
        stats.add_error();
    }

    /// Salva di nuovo il PNG di un record completato, riusando il suo handle
    pub fn redownload(&self, history: &History, id: &RecordId) -> ConvertResult<()> {
        let record = history
            .get(id)
            .ok_or_else(|| ConvertError::RecordNotFound(id.to_string()))?;

        match (record.status(), record.download_handle()) {
            (ConversionStatus::Completed, Some(handle)) => {
                self.downloads
                    .trigger(DownloadSource::Handle(handle.clone()), record.target_name())
            }
            _ => Err(ConvertError::NotDownloadable(id.to_string())),
        }
    }

    /// Svuota la history rilasciando gli handle dei record
    pub fn clear_history(&self, history: &mut History) -> usize {
        let released = history.clear(self.registry());
        debug!("Cleared history, released {} download handle(s)", released);
        released
    }

    /// Attende il termine di tutti i download avviati
    pub async fn flush_downloads(&self) {
        self.downloads.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::MemorySink;
    use image::{DynamicImage, ImageFormat, RgbaImage};
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Decodes payloads starting with `ok`, remembers the order of decode calls
    #[derive(Default)]
    struct ScriptedCodec {
        decoded: Mutex<Vec<Vec<u8>>>,
    }

    impl ImageCodec for ScriptedCodec {
        fn decode(&self, source: Cursor<&[u8]>) -> ConvertResult<DynamicImage> {
            let data = source.into_inner();
            self.decoded.lock().unwrap().push(data.to_vec());
            if data.starts_with(b"ok") {
                Ok(DynamicImage::new_rgba8(2, 2))
            } else {
                Err(ConvertError::Decode("unrecognised payload".to_string()))
            }
        }

        fn encode_png(&self, surface: &RgbaImage) -> ConvertResult<Vec<u8>> {
            ImageRsCodec.encode_png(surface)
        }
    }

    fn test_config() -> Config {
        Config {
            show_progress: false,
            release_delay_ms: 0,
            ..Default::default()
        }
    }

    fn webp(name: &str, data: &[u8]) -> FileDescriptor {
        FileDescriptor::from_bytes(name, "image/webp", data.to_vec())
    }

    fn scripted(config: Config) -> (BatchConverter<ScriptedCodec>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let converter = BatchConverter::with_codec(config, ScriptedCodec::default(), sink.clone()).unwrap();
        (converter, sink)
    }

    fn real_webp() -> Vec<u8> {
        let img = RgbaImage::from_fn(4, 3, |x, y| image::Rgba([x as u8 * 60, y as u8 * 80, 200, 255]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buffer, ImageFormat::WebP)
            .unwrap();
        buffer.into_inner()
    }

    #[tokio::test]
    async fn test_single_webp_is_converted_and_saved() {
        let sink = Arc::new(MemorySink::new());
        let converter = BatchConverter::new(test_config(), sink.clone()).unwrap();
        let mut history = History::new();

        let stats = converter
            .submit(&mut history, vec![webp("photo.webp", &real_webp())])
            .await
            .unwrap();
        converter.flush_downloads().await;

        assert_eq!(stats.files_converted, 1);
        assert_eq!(history.len(), 1);
        assert!(!history.is_processing());

        let record = &history.records()[0];
        assert_eq!(record.target_name(), "photo.png");
        assert_eq!(record.status(), ConversionStatus::Completed);
        assert!(record.byte_size() > 0);
        assert_eq!(record.byte_size(), record.encoded_data().unwrap().len() as u64);

        let saved = sink.saved_files();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].filename, "photo.png");
        assert_eq!(&saved[0].data[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(saved[0].data, record.encoded_data().unwrap());
    }

    #[tokio::test]
    async fn test_batch_without_eligible_files_is_rejected() {
        let (converter, sink) = scripted(test_config());
        let mut history = History::new();

        let notes = FileDescriptor::from_bytes("notes.txt", "text/plain", b"ok".to_vec());
        let result = converter.submit(&mut history, vec![notes]).await;
        converter.flush_downloads().await;

        assert!(matches!(result, Err(ConvertError::ValidationRejection(_))));
        assert!(history.is_empty());
        assert!(!history.is_processing());
        assert!(sink.saved_files().is_empty());
    }

    #[tokio::test]
    async fn test_empty_submission_creates_nothing() {
        let (converter, _sink) = scripted(test_config());
        let mut history = History::new();

        let stats = converter.submit(&mut history, Vec::new()).await.unwrap();
        assert_eq!(stats, ConversionStats::new());
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_the_batch() {
        let (converter, sink) = scripted(test_config());
        let mut history = History::new();

        let stats = converter
            .submit(
                &mut history,
                vec![webp("a.webp", b"ok-a"), webp("corrupt.webp", b"garbage")],
            )
            .await
            .unwrap();
        converter.flush_downloads().await;

        assert_eq!(stats.files_processed, 2);
        assert_eq!(stats.files_converted, 1);
        assert_eq!(stats.errors, 1);

        let a = &history.records()[0];
        assert_eq!(a.original_name(), "a.webp");
        assert_eq!(a.status(), ConversionStatus::Completed);

        let corrupt = &history.records()[1];
        assert_eq!(corrupt.original_name(), "corrupt.webp");
        assert_eq!(corrupt.status(), ConversionStatus::Failed);
        assert_eq!(corrupt.error_detail(), Some(GENERIC_FAILURE));
        assert!(corrupt.encoded_data().is_none());
        assert!(corrupt.download_handle().is_none());
        assert_eq!(corrupt.byte_size(), 0);

        let saved: Vec<String> = sink.saved_files().into_iter().map(|f| f.filename).collect();
        assert_eq!(saved, vec!["a.png".to_string()]);
    }

    #[tokio::test]
    async fn test_mixed_case_extension_and_skipped_files() {
        let (converter, _sink) = scripted(test_config());
        let mut history = History::new();

        let files = vec![
            FileDescriptor::from_bytes("Photo.WEBP", "", b"ok".to_vec()),
            FileDescriptor::from_bytes("notes.txt", "text/plain", b"ok".to_vec()),
        ];
        let stats = converter.submit(&mut history, files).await.unwrap();

        assert_eq!(stats.files_skipped, 1);
        assert_eq!(history.len(), 1);
        assert_eq!(history.records()[0].target_name(), "Photo.png");
        assert_eq!(history.records()[0].status(), ConversionStatus::Completed);
    }

    #[tokio::test]
    async fn test_conversion_is_sequential_and_newest_batch_first() {
        let sink = Arc::new(MemorySink::new());
        let converter =
            BatchConverter::with_codec(test_config(), ScriptedCodec::default(), sink.clone()).unwrap();
        let mut history = History::new();

        converter
            .submit(&mut history, vec![webp("first.webp", b"ok-1")])
            .await
            .unwrap();
        converter
            .submit(
                &mut history,
                vec![webp("second.webp", b"ok-2"), webp("third.webp", b"ok-3")],
            )
            .await
            .unwrap();

        let order = converter.processor.codec().decoded.lock().unwrap().clone();
        assert_eq!(order, vec![b"ok-1".to_vec(), b"ok-2".to_vec(), b"ok-3".to_vec()]);

        let names: Vec<&str> = history.records().iter().map(|r| r.original_name()).collect();
        assert_eq!(names, vec!["second.webp", "third.webp", "first.webp"]);
        assert!(history
            .records()
            .iter()
            .all(|r| r.status().is_terminal()));
    }

    #[tokio::test]
    async fn test_permissive_policy_accepts_other_images() {
        let strict = scripted(test_config()).0;
        let jpeg = || FileDescriptor::from_bytes("photo.jpg", "image/jpeg", b"ok".to_vec());

        let mut history = History::new();
        assert!(strict.submit(&mut history, vec![jpeg()]).await.is_err());

        let permissive = scripted(Config {
            accept_any_image: true,
            ..test_config()
        })
        .0;
        permissive.submit(&mut history, vec![jpeg()]).await.unwrap();
        assert_eq!(history.records()[0].target_name(), "photo.jpg");
        assert_eq!(history.records()[0].status(), ConversionStatus::Completed);
    }

    #[tokio::test]
    async fn test_redownload_reuses_record_handle() {
        let (converter, sink) = scripted(test_config());
        let mut history = History::new();

        converter
            .submit(
                &mut history,
                vec![webp("a.webp", b"ok"), webp("bad.webp", b"nope")],
            )
            .await
            .unwrap();

        let completed = history.records()[0].id().clone();
        let failed = history.records()[1].id().clone();

        converter.redownload(&history, &completed).unwrap();
        assert!(matches!(
            converter.redownload(&history, &failed),
            Err(ConvertError::NotDownloadable(_))
        ));

        let other = History::new();
        assert!(matches!(
            converter.redownload(&other, &completed),
            Err(ConvertError::RecordNotFound(_))
        ));

        converter.flush_downloads().await;
        assert_eq!(sink.saved_files().len(), 2);
        assert_eq!(converter.registry().live_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_history_releases_handles() {
        let (converter, _sink) = scripted(test_config());
        let mut history = History::new();

        converter
            .submit(
                &mut history,
                vec![webp("a.webp", b"ok-a"), webp("b.webp", b"ok-b"), webp("c.webp", b"bad")],
            )
            .await
            .unwrap();
        converter.flush_downloads().await;
        assert_eq!(converter.registry().live_count(), 2);

        assert_eq!(converter.clear_history(&mut history), 2);
        assert!(history.is_empty());
        assert_eq!(converter.registry().live_count(), 0);
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let config = Config {
            max_surface_pixels: 0,
            ..test_config()
        };
        assert!(BatchConverter::new(config, Arc::new(MemorySink::new())).is_err());
    }

    #[tokio::test]
    async fn test_records_are_pending_before_first_decode() {
        let (converter, _sink) = scripted(test_config());
        let mut history = History::new();

        let batch = converter
            .begin_batch(
                &mut history,
                vec![webp("a.webp", b"ok-a"), webp("b.webp", b"ok-b"), webp("c.webp", b"ok-c")],
            )
            .unwrap();

        assert!(history.is_processing());
        assert_eq!(history.len(), 3);
        assert!(history
            .records()
            .iter()
            .all(|r| r.status() == ConversionStatus::Pending));
        assert!(converter.processor.codec().decoded.lock().unwrap().is_empty());

        let stats = converter.run_batch(&mut history, batch, Instant::now()).await;
        assert!(!history.is_processing());
        assert_eq!(stats.files_converted, 3);
        assert_eq!(converter.processor.codec().decoded.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_redownload_outside_runtime_is_an_error() {
        let (converter, sink) = scripted(test_config());
        let mut history = History::new();

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            converter
                .submit(&mut history, vec![webp("photo.webp", b"ok")])
                .await
                .unwrap();
            converter.flush_downloads().await;
        });

        let id = history.records()[0].id().clone();
        assert!(matches!(
            converter.redownload(&history, &id),
            Err(ConvertError::Task(_))
        ));
        assert_eq!(sink.saved_files().len(), 1);
        assert_eq!(converter.registry().live_count(), 1);
    }
}
