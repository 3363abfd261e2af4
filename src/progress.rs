//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di conversione.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per feedback real-time
//! - Tracking statistiche di conversione (file convertiti, falliti, saltati)
//! - Report finale con statistiche aggregate
//!
//! ## Componenti principali:
//! - `ProgressManager`: Gestisce la progress bar principale
//! - `ConversionStats`: Traccia statistiche cumulative di un batch
//!
//! ## Statistiche tracciate:
//! - **files_processed**: File arrivati a uno stato terminale
//! - **files_converted**: File convertiti in PNG
//! - **files_skipped**: File del batch scartati dal validatore
//! - **errors**: File finiti in `Failed`
//! - **total_output_bytes**: Byte PNG prodotti
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:03] [========================================] 12/12 (100%) [OK] photo.png
//! ```

use crate::file_manager::FileManager;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

/// Manages progress reporting for a conversion batch
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Progress manager that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Set a custom message without incrementing
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

/// Statistics tracker for a conversion batch
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    pub files_processed: usize,
    pub files_converted: usize,
    pub files_skipped: usize,
    pub errors: usize,
    pub total_output_bytes: u64,
}

impl ConversionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_converted(&mut self, output_size: u64) {
        self.files_processed += 1;
        self.files_converted += 1;
        self.total_output_bytes += output_size;
    }

    pub fn add_error(&mut self) {
        self.files_processed += 1;
        self.errors += 1;
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} files | Converted: {} | Skipped: {} | Errors: {} | PNG output: {}",
            self.files_processed,
            self.files_converted,
            self.files_skipped,
            self.errors,
            FileManager::format_size(self.total_output_bytes)
        )
    }
}
