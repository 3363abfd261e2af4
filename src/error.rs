//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della libreria.
//!
//! ## Responsabilità:
//! - Definisce `ConvertError` enum per categorizzare tutti gli errori possibili
//! - Fornisce messaggi di errore descrittivi e strutturati
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `ValidationRejection`: Nessun file idoneo in un batch non vuoto
//! - `NotAnImage`: Il file non è un'immagine (né WebP né `image/*`)
//! - `Decode`: Bytes corrotti o formato non supportato dal codec
//! - `SurfaceUnavailable`: Impossibile allocare la superficie di pixel
//! - `Encode`: La serializzazione PNG non ha prodotto dati
//! - `Io`: Errori di I/O (lettura sorgente, scrittura download)
//! - `Task`: Il task bloccante di decode/encode è fallito
//! - `InvalidTransition`: Transizione di stato non ammessa per un record
//! - `InvalidHandle` / `RecordNotFound` / `NotDownloadable`: Download manuale
//!
//! ## Propagazione:
//! Gli errori per singolo file vengono catturati dall'orchestratore e
//! trasformati in un record `Failed` con messaggio generico. Solo
//! `ValidationRejection` raggiunge il chiamante di `submit`.

use crate::state::ConversionStatus;

/// Custom error types for WebP to PNG conversion
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error("Submission rejected: {0}")]
    ValidationRejection(String),

    #[error("File is not an image: {0}")]
    NotAnImage(String),

    #[error("Failed to load image: {0}")]
    Decode(String),

    #[error("Could not get a {width}x{height} drawing surface")]
    SurfaceUnavailable { width: u32, height: u32 },

    #[error("Conversion yielded empty PNG data: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Conversion task failed: {0}")]
    Task(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ConversionStatus,
        to: ConversionStatus,
    },

    #[error("Download handle {0} has been released")]
    InvalidHandle(u64),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Record {0} has no converted data to download")]
    NotDownloadable(String),
}

impl From<tokio::task::JoinError> for ConvertError {
    fn from(err: tokio::task::JoinError) -> Self {
        ConvertError::Task(err.to_string())
    }
}

pub type ConvertResult<T> = std::result::Result<T, ConvertError>;
