//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di conversione
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `output_path`: Directory di download per i PNG (default: None = risolta dalla CLI)
//! - `recursive`: Scansione ricorsiva delle directory in input (default: false)
//! - `accept_any_image`: Accetta anche altri tipi `image/*` oltre a WebP (default: false)
//! - `overwrite`: Sovrascrive file esistenti invece di generare `nome (n).png` (default: false)
//! - `release_delay_ms`: Ritardo prima del rilascio di un handle temporaneo (default: 100)
//! - `max_surface_dimension`: Lato massimo della superficie di pixel (default: 32767)
//! - `max_surface_pixels`: Area massima della superficie di pixel (default: 268435456)
//! - `show_progress`: Progress bar con `indicatif` (default: true)
//! - `json_output`: Eventi JSON su stdout (default: false)
//!
//! ## Validazione:
//! - Controlla che le dimensioni massime della superficie siano > 0
//! - Controlla che `release_delay_ms` non superi 60 secondi
//! - Controlla che `output_path`, se presente, sia una directory esistente
//!
//! ## Esempio:
//! ```ignore
//! let config = Config {
//!     accept_any_image: true,
//!     overwrite: true,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Longest accepted delay before a trigger-owned download handle is released
const MAX_RELEASE_DELAY_MS: u64 = 60_000;

/// Configuration for WebP to PNG conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Download directory for converted files (None = resolved by the caller)
    pub output_path: Option<PathBuf>,
    /// Scan input directories recursively
    pub recursive: bool,
    /// Accept any `image/*` media type, not only WebP
    pub accept_any_image: bool,
    /// Replace existing files in the download directory
    pub overwrite: bool,
    /// Delay before releasing a handle created by the download trigger
    pub release_delay_ms: u64,
    /// Maximum width or height of the pixel surface
    pub max_surface_dimension: u32,
    /// Maximum number of pixels of the pixel surface
    pub max_surface_pixels: u64,
    /// Show a progress bar while converting
    pub show_progress: bool,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_path: None,
            recursive: false,
            accept_any_image: false,
            overwrite: false,
            release_delay_ms: 100,
            max_surface_dimension: 32_767,
            max_surface_pixels: 268_435_456,
            show_progress: true,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.max_surface_dimension == 0 {
            return Err(anyhow::anyhow!("Maximum surface dimension must be greater than 0"));
        }

        if self.max_surface_pixels == 0 {
            return Err(anyhow::anyhow!("Maximum surface pixels must be greater than 0"));
        }

        if self.release_delay_ms > MAX_RELEASE_DELAY_MS {
            return Err(anyhow::anyhow!(
                "Release delay must be at most {} ms",
                MAX_RELEASE_DELAY_MS
            ));
        }

        if let Some(ref output_path) = self.output_path {
            if !output_path.exists() {
                return Err(anyhow::anyhow!("Output path does not exist: {}", output_path.display()));
            }
            if !output_path.is_dir() {
                return Err(anyhow::anyhow!("Output path is not a directory: {}", output_path.display()));
            }
        }

        Ok(())
    }

    /// Delay before a trigger-owned download handle is released
    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.release_delay_ms)
    }

    /// Load configuration from file
    pub async fn from_file(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
