//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file in input e la loro descrizione.
//!
//! ## Responsabilità:
//! - Espansione degli input CLI (file singoli e directory)
//! - Costruzione di `FileDescriptor`: nome, media type dichiarato, sorgente bytes
//! - Determinazione del media type (estensione, poi sniffing del contenuto)
//! - Formattazione human-readable delle dimensioni
//!
//! ## Media type dichiarato:
//! Come fa un browser con un file selezionato, il media type deriva
//! dall'estensione (`.webp` → `image/webp`, `.txt` → `text/plain`).
//! Per estensioni sconosciute si leggono i primi bytes con `image::guess_format`;
//! se il formato non è riconosciuto il tipo è `application/octet-stream`.
//!
//! ## Esempio:
//! ```ignore
//! let paths = FileManager::collect_inputs(&inputs, false)?;
//! for path in paths {
//!     let file = FileManager::describe(&path).await?;
//!     println!("{} ({})", file.name(), file.media_type());
//! }
//! ```

use anyhow::Result;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::warn;
use walkdir::WalkDir;

/// Media type used when nothing better is known
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Bytes read from the start of a file to guess its format
const SNIFF_LEN: u64 = 64;

/// Where a file's bytes come from
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Arc<[u8]>),
}

/// A submitted file: name, declared media type and byte source
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    name: String,
    media_type: String,
    source: FileSource,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, source: FileSource) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            source,
        }
    }

    /// Describe an in-memory file
    pub fn from_bytes(
        name: impl Into<String>,
        media_type: impl Into<String>,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self::new(name, media_type, FileSource::Memory(data.into()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Read the full contents
    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Path(path) => tokio::fs::read(path).await,
            FileSource::Memory(data) => Ok(data.to_vec()),
        }
    }
}

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Expand CLI inputs into a list of files, keeping the given order.
    ///
    /// Directories contribute their files sorted by name; subdirectories are
    /// only entered when `recursive` is set.
    pub fn collect_inputs(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for input in inputs {
            if input.is_dir() {
                let max_depth = if recursive { usize::MAX } else { 1 };
                for entry in WalkDir::new(input)
                    .max_depth(max_depth)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                {
                    files.push(entry.path().to_path_buf());
                }
            } else if input.is_file() {
                files.push(input.clone());
            } else {
                return Err(anyhow::anyhow!("Input does not exist: {}", input.display()));
            }
        }

        Ok(files)
    }

    /// Build a descriptor for a file on disk
    pub async fn describe(path: &Path) -> Result<FileDescriptor> {
        let name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", path.display()))?
            .to_string_lossy()
            .into_owned();

        let media_type = match Self::media_type_from_extension(path) {
            Some(media_type) => media_type,
            None => match Self::sniff_media_type(path).await {
                Ok(media_type) => media_type,
                Err(e) => {
                    warn!("Cannot sniff {}: {}", path.display(), e);
                    OCTET_STREAM
                }
            },
        };

        Ok(FileDescriptor::new(name, media_type, FileSource::Path(path.to_path_buf())))
    }

    /// Media type for well-known extensions (case-insensitive)
    pub fn media_type_from_extension(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        let media_type = match ext.as_str() {
            "webp" => "image/webp",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            "tif" | "tiff" => "image/tiff",
            "ico" => "image/x-icon",
            "avif" => "image/avif",
            "svg" => "image/svg+xml",
            "txt" => "text/plain",
            "htm" | "html" => "text/html",
            "json" => "application/json",
            "pdf" => "application/pdf",
            "zip" => "application/zip",
            _ => return None,
        };
        Some(media_type)
    }

    /// Media type from the first bytes of the file
    async fn sniff_media_type(path: &Path) -> Result<&'static str> {
        let file = tokio::fs::File::open(path).await?;
        let mut head = Vec::with_capacity(SNIFF_LEN as usize);
        file.take(SNIFF_LEN).read_to_end(&mut head).await?;

        Ok(image::guess_format(&head)
            .map(Self::media_type_from_format)
            .unwrap_or(OCTET_STREAM))
    }

    /// Media type of a format recognised by the image codec
    pub fn media_type_from_format(format: ImageFormat) -> &'static str {
        match format {
            ImageFormat::WebP => "image/webp",
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::Ico => "image/x-icon",
            ImageFormat::Avif => "image/avif",
            _ => "image/unknown",
        }
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_media_type_from_extension() {
        assert_eq!(FileManager::media_type_from_extension(Path::new("a.webp")), Some("image/webp"));
        assert_eq!(FileManager::media_type_from_extension(Path::new("A.WEBP")), Some("image/webp"));
        assert_eq!(FileManager::media_type_from_extension(Path::new("notes.txt")), Some("text/plain"));
        assert_eq!(FileManager::media_type_from_extension(Path::new("blob.xyz")), None);
        assert_eq!(FileManager::media_type_from_extension(Path::new("noext")), None);
    }

    #[tokio::test]
    async fn test_describe_sniffs_unknown_extensions() {
        let temp_dir = TempDir::new().unwrap();

        let disguised = temp_dir.path().join("picture.bin");
        std::fs::write(&disguised, b"RIFF\x24\x00\x00\x00WEBPVP8L").unwrap();
        let file = FileManager::describe(&disguised).await.unwrap();
        assert_eq!(file.name(), "picture.bin");
        assert_eq!(file.media_type(), "image/webp");

        let unknown = temp_dir.path().join("data.bin");
        std::fs::write(&unknown, b"hello").unwrap();
        let file = FileManager::describe(&unknown).await.unwrap();
        assert_eq!(file.media_type(), OCTET_STREAM);

        let notes = temp_dir.path().join("notes.txt");
        std::fs::write(&notes, b"RIFF\x24\x00\x00\x00WEBPVP8L").unwrap();
        let file = FileManager::describe(&notes).await.unwrap();
        assert_eq!(file.media_type(), "text/plain");
    }

    #[tokio::test]
    async fn test_describe_unreadable_file_is_octet_stream() {
        let temp_dir = TempDir::new().unwrap();
        let vanished = temp_dir.path().join("vanished.bin");

        let file = FileManager::describe(&vanished).await.unwrap();
        assert_eq!(file.name(), "vanished.bin");
        assert_eq!(file.media_type(), OCTET_STREAM);
        assert!(file.read_bytes().await.is_err());
    }

    #[test]
    fn test_collect_inputs() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(temp_dir.path().join("b.webp"), b"b").unwrap();
        std::fs::write(temp_dir.path().join("a.webp"), b"a").unwrap();
        std::fs::write(nested.join("c.webp"), b"c").unwrap();

        let shallow = FileManager::collect_inputs(&[temp_dir.path().to_path_buf()], false).unwrap();
        assert_eq!(
            shallow,
            vec![temp_dir.path().join("a.webp"), temp_dir.path().join("b.webp")]
        );

        let deep = FileManager::collect_inputs(&[temp_dir.path().to_path_buf()], true).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep.contains(&nested.join("c.webp")));

        let missing = temp_dir.path().join("missing.webp");
        assert!(FileManager::collect_inputs(&[missing], false).is_err());
    }

    #[tokio::test]
    async fn test_read_bytes_from_memory_and_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.webp");
        std::fs::write(&path, b"disk").unwrap();

        let on_disk = FileManager::describe(&path).await.unwrap();
        assert_eq!(on_disk.read_bytes().await.unwrap(), b"disk");

        let in_memory = FileDescriptor::from_bytes("b.webp", "image/webp", b"memory".to_vec());
        assert_eq!(in_memory.read_bytes().await.unwrap(), b"memory");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(0), "0 B");
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(1536), "1.50 KB");
        assert_eq!(FileManager::format_size(5 * 1024 * 1024), "5.00 MB");
    }
}
