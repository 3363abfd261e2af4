//! # Converter Module
//!
//! Modulo che separa le responsabilità in sottomoduli:
//! - `batch_converter`: Orchestratore dei batch
//! - `progress_tracker`: Gestione progress unificata (barra + JSON)
//! - `path_resolver`: Logica di calcolo path di download centralizzata

pub mod batch_converter;
pub mod progress_tracker;
pub mod path_resolver;

pub use batch_converter::{BatchConverter, GENERIC_FAILURE};
pub use progress_tracker::ProgressTracker;
pub use path_resolver::PathResolver;
