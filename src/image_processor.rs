//! # Image Processing Module
//!
//! Questo modulo converte i bytes di un'immagine WebP in bytes PNG,
//! interamente in locale, tramite un `ImageCodec` iniettato.
//!
//! ## Pipeline di Conversione
//!
//! 1. **Sorgente transitoria**: i bytes vengono avvolti in un `Cursor` locale
//! 2. **Decodifica**: il codec legge l'immagine dalla sorgente
//! 3. **Rilascio**: il `Cursor` viene consumato dal codec e rilasciato subito,
//!    sia in caso di successo che di errore
//! 4. **Superficie**: allocazione RGBA esattamente `width × height`
//!    (nessuno scaling, nessun crop)
//! 5. **Copia**: i pixel decodificati vengono copiati in (0,0) senza trasformazioni
//! 6. **Codifica**: la superficie viene serializzata in PNG
//! 7. **Risultato**: bytes PNG, oppure errore se la serializzazione è vuota
//!
//! ## Errori
//!
//! | Errore | Causa |
//! |--------|-------|
//! | `Decode` | Bytes corrotti o formato non supportato |
//! | `SurfaceUnavailable` | Immagine vuota o oltre i limiti della superficie |
//! | `Encode` | Serializzazione PNG fallita o vuota |
//! | `NotAnImage` | Pre-check: né WebP né `image/*` |
//!
//! Nessun retry: un fallimento viene riportato al chiamante così com'è.
//!
//! ## Concorrenza
//!
//! Decodifica e codifica girano su `tokio::task::spawn_blocking`: ognuna è un
//! punto di sospensione per il chiamante, che riprende solo a lavoro finito.
//!
//! ## Esempio
//!
//! ```ignore
//! let processor = ImageProcessor::new(&Config::default());
//! let png = processor.convert(webp_bytes).await?;
//! ```

use crate::codec::{ImageCodec, ImageRsCodec};
use crate::config::Config;
use crate::error::{ConvertError, ConvertResult};
use crate::file_manager::FileDescriptor;
use crate::validator::FormatValidator;
use image::{DynamicImage, GenericImageView, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// Size limits for the pixel surface a decoded image is drawn onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceLimits {
    pub max_dimension: u32,
    pub max_pixels: u64,
}

impl SurfaceLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_dimension: config.max_surface_dimension,
            max_pixels: config.max_surface_pixels,
        }
    }

    /// Whether a `width × height` surface can be allocated
    pub fn allows(&self, width: u32, height: u32) -> bool {
        width > 0
            && height > 0
            && width <= self.max_dimension
            && height <= self.max_dimension
            && u64::from(width) * u64::from(height) <= self.max_pixels
    }
}

impl Default for SurfaceLimits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Decode/re-encode adapter: image bytes in, PNG bytes out.
///
/// The codec is injected so the conversion pipeline can run against a fake
/// codec in tests. `ImageProcessor::new` uses [`ImageRsCodec`].
pub struct ImageProcessor<C = ImageRsCodec> {
    /// Decoder/encoder collaborator
    codec: Arc<C>,
    /// Limits applied when allocating the pixel surface
    limits: SurfaceLimits,
}

impl ImageProcessor<ImageRsCodec> {
    /// Creates a processor backed by the `image` crate.
    pub fn new(config: &Config) -> Self {
        Self::with_codec(ImageRsCodec, config)
    }
}

impl<C: ImageCodec> ImageProcessor<C> {
    /// Creates a processor with a custom codec.
    pub fn with_codec(codec: C, config: &Config) -> Self {
        Self {
            codec: Arc::new(codec),
            limits: SurfaceLimits::from_config(config),
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn limits(&self) -> SurfaceLimits {
        self.limits
    }

    /// Converts a submitted file.
    ///
    /// Refuses files that are neither WebP nor declared as an image, then
    /// reads the bytes and runs [`convert`](Self::convert).
    ///
    /// # Errors
    /// - `NotAnImage` if the pre-check fails
    /// - `Io` if the bytes cannot be read
    /// - any error of [`convert`](Self::convert)
    pub async fn convert_file(&self, file: &FileDescriptor) -> ConvertResult<Vec<u8>> {
        if !FormatValidator::accepts_for_conversion(file) {
            return Err(ConvertError::NotAnImage(file.name().to_string()));
        }

        let data = file.read_bytes().await?;
        debug!("Read {} bytes from {}", data.len(), file.name());
        self.convert(data).await
    }

    /// Decodes image bytes and re-encodes them as PNG.
    ///
    /// # Arguments
    /// * `data` - Raw bytes of the source image (WebP, or any format the codec reads)
    ///
    /// # Returns
    /// * `ConvertResult<Vec<u8>>` - Non-empty PNG-encoded bytes
    ///
    /// # Errors
    /// - `Decode` when the codec cannot read the bytes
    /// - `SurfaceUnavailable` when the decoded size is zero or beyond [`SurfaceLimits`]
    /// - `Encode` when PNG serialization fails or produces nothing
    /// - `Task` when the blocking task panics
    pub async fn convert(&self, data: Vec<u8>) -> ConvertResult<Vec<u8>> {
        let codec = Arc::clone(&self.codec);
        let limits = self.limits;
        let surface = tokio::task::spawn_blocking(move || {
            let decoded = codec.decode(Cursor::new(data.as_slice()))?;
            draw_surface(&decoded, limits)
        })
        .await??;

        debug!("Decoded {}x{} image", surface.width(), surface.height());

        let codec = Arc::clone(&self.codec);
        let png = tokio::task::spawn_blocking(move || codec.encode_png(&surface)).await??;

        if png.is_empty() {
            return Err(ConvertError::Encode("encoder returned no data".to_string()));
        }

        Ok(png)
    }
}

/// Allocate a surface of the image's exact size and copy its pixels at the origin
fn draw_surface(decoded: &DynamicImage, limits: SurfaceLimits) -> ConvertResult<RgbaImage> {
    let (width, height) = decoded.dimensions();
    if !limits.allows(width, height) {
        return Err(ConvertError::SurfaceUnavailable { width, height });
    }

    let mut surface = RgbaImage::new(width, height);
    image::imageops::replace(&mut surface, decoded, 0, 0);
    Ok(surface)
}
