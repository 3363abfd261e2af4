//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso programmatico.
//!
//! ## Responsabilità:
//! - Emette messaggi JSON strutturati per eventi di conversione
//! - Utilizza `ConversionRecord` e `ConversionStats` come sorgente dei dati
//! - Fornisce interfaccia standardizzata per comunicazione inter-processo
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio della conversione di un batch
//! - `rejected`: Batch rifiutato (nessun file idoneo)
//! - `file_start`: Inizio conversione di un file
//! - `file_complete`: Fine conversione di un file (completato o fallito)
//! - `progress`: Progresso corrente del batch
//! - `complete`: Fine batch con statistiche e history
//! - `error`: Errore generale

use crate::config::Config;
use crate::error::ConvertError;
use crate::progress::ConversionStats;
use crate::state::{ConversionRecord, ConversionStatus, History, RecordId};
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    /// Inizio della conversione
    #[serde(rename = "start")]
    Start {
        total_files: usize,
        output_dir: Option<PathBuf>,
        config: JsonConfig,
        processing: bool,
    },

    /// Batch rifiutato dal validatore
    #[serde(rename = "rejected")]
    Rejected { submitted: usize, message: String },

    /// Inizio conversione di un file
    #[serde(rename = "file_start")]
    FileStart {
        id: RecordId,
        name: String,
        index: usize,
        total: usize,
    },

    /// Fine conversione di un file
    #[serde(rename = "file_complete")]
    FileComplete(HistoryEntry),

    /// Progresso corrente
    #[serde(rename = "progress")]
    Progress {
        current: usize,
        total: usize,
        percentage: f64,
        files_converted: usize,
        errors: usize,
    },

    /// Batch completato
    #[serde(rename = "complete")]
    Complete {
        #[serde(flatten)]
        stats: ConversionStats,
        duration_seconds: f64,
        processing: bool,
        history: Vec<HistoryEntry>,
    },

    /// Errore generale
    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

/// Configurazione per output JSON
#[derive(Debug, Serialize)]
pub struct JsonConfig {
    pub accept_any_image: bool,
    pub overwrite: bool,
    pub recursive: bool,
}

/// Vista serializzabile di un record (senza dati PNG)
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: RecordId,
    pub original_name: String,
    pub target_name: String,
    pub status: ConversionStatus,
    pub size: u64,
    pub created_at: u64,
    pub error: Option<String>,
}

impl From<&ConversionRecord> for HistoryEntry {
    fn from(record: &ConversionRecord) -> Self {
        Self {
            id: record.id().clone(),
            original_name: record.original_name().to_string(),
            target_name: record.target_name().to_string(),
            status: record.status(),
            size: record.byte_size(),
            created_at: record.created_at(),
            error: record.error_detail().map(str::to_string),
        }
    }
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    /// Crea un messaggio di inizio
    pub fn start(
        total_files: usize,
        output_dir: Option<PathBuf>,
        config: JsonConfig,
        processing: bool,
    ) -> Self {
        Self::Start {
            total_files,
            output_dir,
            config,
            processing,
        }
    }

    /// Crea un messaggio di rifiuto
    pub fn rejected(submitted: usize, message: impl Into<String>) -> Self {
        Self::Rejected {
            submitted,
            message: message.into(),
        }
    }

    /// Crea un messaggio di inizio file
    pub fn file_start(record: &ConversionRecord, index: usize, total: usize) -> Self {
        Self::FileStart {
            id: record.id().clone(),
            name: record.original_name().to_string(),
            index,
            total,
        }
    }

    /// Crea un messaggio di completamento file
    pub fn file_complete(record: &ConversionRecord) -> Self {
        Self::FileComplete(HistoryEntry::from(record))
    }

    /// Crea un messaggio di progresso
    pub fn progress(current: usize, total: usize, stats: &ConversionStats) -> Self {
        let percentage = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        Self::Progress {
            current,
            total,
            percentage,
            files_converted: stats.files_converted,
            errors: stats.errors,
        }
    }

    /// Crea un messaggio di completamento generale
    pub fn complete(stats: &ConversionStats, duration_seconds: f64, history: &History) -> Self {
        Self::Complete {
            stats: stats.clone(),
            duration_seconds,
            processing: history.is_processing(),
            history: history.records().iter().map(HistoryEntry::from).collect(),
        }
    }

    /// Evento `error` per un errore fatale; `None` per un batch rifiutato,
    /// già annunciato con `rejected`
    pub fn for_failure(error: &anyhow::Error) -> Option<Self> {
        match error.downcast_ref::<ConvertError>() {
            Some(ConvertError::ValidationRejection(_)) => None,
            _ => Some(Self::error(
                error.to_string(),
                error.chain().nth(1).map(|cause| cause.to_string()),
            )),
        }
    }

    /// Crea un messaggio di errore
    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}

/// Converti Config esistente in JsonConfig
impl From<&Config> for JsonConfig {
    fn from(config: &Config) -> Self {
        Self {
            accept_any_image: config.accept_any_image,
            overwrite: config.overwrite,
            recursive: config.recursive,
        }
    }
}
