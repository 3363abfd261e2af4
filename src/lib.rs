//! # WebP2PNG Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom per le conversioni
//! - `state`: Record di conversione e history della sessione
//! - `file_manager`: Descrizione dei file in input e discovery
//! - `validator`: Idoneità dei file (WebP per tipo o estensione)
//! - `codec`: Capacità di decode/encode iniettabile
//! - `image_processor`: Conversione bytes WebP → bytes PNG
//! - `download`: Salvataggio dei PNG e gestione degli handle
//! - `converter`: Orchestratore dei batch
//! - `progress` / `json_output`: Feedback all'utente
//!
//! ## Utilizzo:
//! ```ignore
//! use webp2png::{BatchConverter, Config, DirectorySink, FileManager, History};
//!
//! let sink = Arc::new(DirectorySink::new(&output_dir, false));
//! let converter = BatchConverter::new(Config::default(), sink)?;
//! let mut history = History::new();
//! let file = FileManager::describe(&path).await?;
//! converter.submit(&mut history, vec![file]).await?;
//! converter.flush_downloads().await;
//! ```

pub mod codec;
pub mod config;
pub mod converter;
pub mod download;
pub mod error;
pub mod file_manager;
pub mod image_processor;
pub mod json_output;
pub mod progress;
pub mod state;
pub mod validator;

pub use codec::{ImageCodec, ImageRsCodec};
pub use config::Config;
pub use converter::BatchConverter;
pub use download::{DirectorySink, DownloadSource, DownloadTrigger, HandleRegistry, MemorySink, SaveSink};
pub use error::ConvertError;
pub use file_manager::{FileDescriptor, FileManager};
pub use image_processor::ImageProcessor;
pub use state::{ConversionRecord, ConversionStatus, History, RecordId};
pub use validator::{FormatValidator, ValidationPolicy};
