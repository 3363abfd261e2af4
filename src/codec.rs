//! # Image Codec Module
//!
//! Capacità di decodifica/codifica iniettata nell'`ImageProcessor`.
//!
//! ## Responsabilità:
//! - `ImageCodec`: trait con `decode` (bytes → pixel) e `encode_png` (superficie → PNG)
//! - `ImageRsCodec`: implementazione di default basata sul crate `image`
//!
//! Il trait permette di testare la pipeline con codec finti, senza
//! dipendere da immagini reali.

use crate::error::{ConvertError, ConvertResult};
use image::{DynamicImage, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;

/// Decode and PNG-encode capability used by the conversion adapter
pub trait ImageCodec: Send + Sync + 'static {
    /// Decode the image read from `source`. Animated images yield their first frame.
    fn decode(&self, source: Cursor<&[u8]>) -> ConvertResult<DynamicImage>;

    /// Serialize an RGBA surface as PNG
    fn encode_png(&self, surface: &RgbaImage) -> ConvertResult<Vec<u8>>;
}

/// Codec backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageRsCodec;

impl ImageCodec for ImageRsCodec {
    fn decode(&self, source: Cursor<&[u8]>) -> ConvertResult<DynamicImage> {
        ImageReader::new(source)
            .with_guessed_format()?
            .decode()
            .map_err(|e| ConvertError::Decode(e.to_string()))
    }

    fn encode_png(&self, surface: &RgbaImage) -> ConvertResult<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        surface
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| ConvertError::Encode(e.to_string()))?;
        Ok(buffer.into_inner())
    }
}
