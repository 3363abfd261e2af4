//! # WebP2PNG - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Costruzione della configurazione (file JSON + flag CLI)
//! - Descrizione dei file in input e avvio del batch
//! - Stampa della history finale
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (input, output, flag di validazione)
//! 2. Configura il logging (INFO o DEBUG, stderr in modalità JSON)
//! 3. Risolve e crea la directory di download
//! 4. Descrive ogni file (nome + media type dichiarato)
//! 5. Converte il batch e attende il termine di tutti i salvataggi
//!
//! ## Esempio di utilizzo:
//! ```bash
//! webp2png ~/Pictures/stickers --output ./png --recursive --verbose
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use webp2png::{
    converter::PathResolver,
    json_output::JsonMessage,
    validator::REJECTION_NOTICE,
    BatchConverter, Config, ConversionStatus, ConvertError, DirectorySink, FileManager, History,
};

#[derive(Parser)]
#[command(name = "webp2png")]
#[command(about = "Convert WebP images to PNG locally, no uploads")]
struct Args {
    /// WebP files or directories to convert
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Download directory (default: the user's download directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Scan input directories recursively
    #[arg(short, long)]
    recursive: bool,

    /// Also accept other image types, not only WebP
    #[arg(long)]
    accept_any_image: bool,

    /// Replace existing files instead of saving as "name (n).png"
    #[arg(long)]
    overwrite: bool,

    /// Load configuration from a JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective configuration to a JSON file
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Output progress and status as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    if args.json {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let json = args.json;
    let result = run(args).await;
    if let Err(ref e) = result {
        if json {
            if let Some(message) = JsonMessage::for_failure(e) {
                message.emit();
            }
        }
    }
    result
}

/// Merge CLI flags over the loaded configuration
fn apply_args(config: &mut Config, args: &Args) {
    if args.output.is_some() {
        config.output_path = args.output.clone();
    }
    config.recursive |= args.recursive;
    config.accept_any_image |= args.accept_any_image;
    config.overwrite |= args.overwrite;
    config.json_output |= args.json;
    if args.quiet {
        config.show_progress = false;
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match args.config {
        Some(ref path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    apply_args(&mut config, &args);

    // Validate and create download directory
    let output_dir = PathResolver::resolve_output_dir(&config)?;
    if !output_dir.exists() {
        PathResolver::ensure_dir(&output_dir).await?;
        info!("Created output directory: {}", output_dir.display());
    }
    config.output_path = Some(output_dir.clone());
    config.validate()?;

    if let Some(ref path) = args.save_config {
        config.save_to_file(path).await?;
        info!("Saved configuration to {}", path.display());
    }

    let paths = FileManager::collect_inputs(&args.inputs, config.recursive)?;
    if paths.is_empty() {
        info!("No files found to convert");
        return Ok(());
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        match FileManager::describe(path).await {
            Ok(file) => files.push(file),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    let json_output = config.json_output;
    let sink = Arc::new(DirectorySink::new(&output_dir, config.overwrite));
    let converter = BatchConverter::new(config, sink)?;
    let mut history = History::new();

    let stats = match converter.submit(&mut history, files).await {
        Ok(stats) => stats,
        Err(e @ ConvertError::ValidationRejection(_)) => {
            if json_output {
                JsonMessage::rejected(paths.len(), REJECTION_NOTICE).emit();
            } else {
                error!("{}", REJECTION_NOTICE);
            }
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    converter.flush_downloads().await;

    if !json_output {
        print_history(&history);
        info!("{}", stats.format_summary());
    }

    if stats.errors > 0 {
        return Err(anyhow::anyhow!("{} file(s) failed to convert", stats.errors));
    }

    Ok(())
}

/// Recent conversions, most recent first
fn print_history(history: &History) {
    info!("Recent conversions:");
    for record in history.records() {
        match record.status() {
            ConversionStatus::Completed => info!(
                "  ✅ {} -> {} ({})",
                record.original_name(),
                record.target_name(),
                FileManager::format_size(record.byte_size())
            ),
            ConversionStatus::Failed => warn!(
                "  ❌ {}: {}",
                record.original_name(),
                record.error_detail().unwrap_or_default()
            ),
            status => info!("  … {} ({})", record.original_name(), status),
        }
    }
}
