//! # Progress Tracking Module
//!
//! Unifica progress bar ed eventi JSON per un batch di conversione.
//! Il batch è sequenziale: nessun lock, un solo chiamante.

use crate::{
    config::Config,
    json_output::{JsonConfig, JsonMessage},
    progress::{ConversionStats, ProgressManager},
    state::{ConversionRecord, ConversionStatus, History},
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Tracker progress per un singolo batch
pub struct ProgressTracker {
    pub total_files: usize,
    json_output: bool,
    progress_manager: ProgressManager,
}

impl ProgressTracker {
    /// Crea un nuovo tracker in base alla configurazione
    pub fn new(total_files: usize, config: &Config) -> Self {
        let progress_manager = if config.show_progress && !config.json_output && total_files > 0 {
            ProgressManager::new(total_files as u64)
        } else {
            ProgressManager::hidden()
        };

        Self {
            total_files,
            json_output: config.json_output,
            progress_manager,
        }
    }

    /// Annuncia l'inizio del batch
    pub fn start(&self, config: &Config, output_dir: Option<PathBuf>, processing: bool) {
        if self.json_output {
            JsonMessage::start(self.total_files, output_dir, JsonConfig::from(config), processing).emit();
        } else {
            info!("Converting {} WebP file(s) to PNG", self.total_files);
        }
    }

    /// Un record è passato a `Processing`
    pub fn file_started(&self, record: &ConversionRecord, index: usize) {
        if self.json_output {
            JsonMessage::file_start(record, index, self.total_files).emit();
        } else {
            self.progress_manager
                .set_message(&format!("Converting {}", record.original_name()));
        }
    }

    /// Un record ha raggiunto uno stato terminale
    pub fn file_finished(&self, record: &ConversionRecord, stats: &ConversionStats) {
        if self.json_output {
            JsonMessage::file_complete(record).emit();
            JsonMessage::progress(stats.files_processed, self.total_files, stats).emit();
        }

        let message = match record.status() {
            ConversionStatus::Completed => format!("[OK] {}", record.target_name()),
            _ => format!("[ERROR] {}", record.original_name()),
        };
        self.progress_manager.update(&message);
    }

    /// Finalizza il batch
    pub fn finish(&self, stats: &ConversionStats, elapsed: Duration, history: &History) {
        if self.json_output {
            JsonMessage::complete(stats, elapsed.as_secs_f64(), history).emit();
        } else {
            self.progress_manager.finish(&stats.format_summary());
            info!("Batch finished in {:.2}s", elapsed.as_secs_f64());
        }
    }
}
