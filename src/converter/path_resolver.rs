//! # Path Resolution Module
//!
//! Centralizza tutta la logica di calcolo dei path di download.
//! Evita duplicazione tra DownloadTrigger e main.rs.

use crate::config::Config;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fallback name when a download filename has no usable final component
const FALLBACK_NAME: &str = "download.png";

/// Utility per calcolare i path di download in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// Determina la directory di download: config, poi cartella Download, poi cwd
    pub fn resolve_output_dir(config: &Config) -> Result<PathBuf> {
        if let Some(ref output_dir) = config.output_path {
            return Ok(output_dir.clone());
        }

        let dir = match dirs::download_dir() {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        debug!("Resolved download directory: {}", dir.display());
        Ok(dir)
    }

    /// Tiene solo l'ultimo componente del nome (niente directory o `..`)
    pub fn sanitize_filename(filename: &str) -> String {
        Path::new(filename)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| FALLBACK_NAME.to_string())
    }

    /// Nome candidato numero `attempt`: `foto.png`, `foto (1).png`, `foto (2).png`...
    pub fn numbered_name(filename: &str, attempt: usize) -> String {
        if attempt == 0 {
            return filename.to_string();
        }

        let path = Path::new(filename);
        match (path.file_stem(), path.extension()) {
            (Some(stem), Some(ext)) => format!(
                "{} ({}).{}",
                stem.to_string_lossy(),
                attempt,
                ext.to_string_lossy()
            ),
            _ => format!("{} ({})", filename, attempt),
        }
    }

    /// Crea la directory di download se necessario
    pub async fn ensure_dir(path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create directory {}: {}", path.display(), e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(PathResolver::sanitize_filename("photo.png"), "photo.png");
        assert_eq!(PathResolver::sanitize_filename("../../etc/photo.png"), "photo.png");
        assert_eq!(PathResolver::sanitize_filename("dir/sub/photo.png"), "photo.png");
        assert_eq!(PathResolver::sanitize_filename(".."), FALLBACK_NAME);
        assert_eq!(PathResolver::sanitize_filename(""), FALLBACK_NAME);
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(PathResolver::numbered_name("photo.png", 0), "photo.png");
        assert_eq!(PathResolver::numbered_name("photo.png", 1), "photo (1).png");
        assert_eq!(PathResolver::numbered_name("a.tar.png", 3), "a.tar (3).png");
        assert_eq!(PathResolver::numbered_name("README", 2), "README (2)");
    }

    #[test]
    fn test_resolve_output_dir_prefers_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            output_path: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(PathResolver::resolve_output_dir(&config).unwrap(), temp_dir.path());
    }

    #[tokio::test]
    async fn test_ensure_dir_creates_nested() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");
        PathResolver::ensure_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
    }
}
