//! # Format Validator Module
//!
//! Decide se un file è idoneo alla conversione in base al media type
//! dichiarato e all'estensione del nome.
//!
//! ## Politica:
//! - Idoneo se il media type è `image/webp` oppure il nome termina in `.webp`
//!   (case-insensitive)
//! - Tipi non-immagine senza estensione `.webp` sono sempre rifiutati
//! - Altri tipi `image/*`: rifiutati con `ValidationPolicy::Strict` (default),
//!   accettati con `ValidationPolicy::Permissive`
//! - Un batch non vuoto senza file idonei viene rifiutato per intero

use crate::config::Config;
use crate::error::{ConvertError, ConvertResult};
use crate::file_manager::FileDescriptor;
use tracing::debug;

/// Canonical WebP media type
pub const WEBP_MEDIA_TYPE: &str = "image/webp";

const IMAGE_MEDIA_PREFIX: &str = "image/";

/// Notice shown when a submission has no eligible file
pub const REJECTION_NOTICE: &str = "Please upload .webp files.";

/// How other `image/*` types are treated by the batch filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationPolicy {
    /// Only WebP media type or `.webp` extension
    #[default]
    Strict,
    /// Also any `image/*` media type
    Permissive,
}

/// Decides which submitted files get converted
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatValidator {
    policy: ValidationPolicy,
}

impl FormatValidator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &Config) -> Self {
        if config.accept_any_image {
            Self::new(ValidationPolicy::Permissive)
        } else {
            Self::new(ValidationPolicy::Strict)
        }
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    /// True when the name ends in `.webp`, any case
    pub fn has_webp_extension(name: &str) -> bool {
        name.to_lowercase().ends_with(".webp")
    }

    /// WebP by declared type or by name
    pub fn is_webp(file: &FileDescriptor) -> bool {
        file.media_type().trim().eq_ignore_ascii_case(WEBP_MEDIA_TYPE)
            || Self::has_webp_extension(file.name())
    }

    /// Declared type is some `image/*`
    pub fn is_image(file: &FileDescriptor) -> bool {
        file.media_type()
            .trim()
            .to_ascii_lowercase()
            .starts_with(IMAGE_MEDIA_PREFIX)
    }

    /// Whether the batch filter accepts this file
    pub fn is_eligible(&self, file: &FileDescriptor) -> bool {
        Self::is_webp(file) || (self.policy == ValidationPolicy::Permissive && Self::is_image(file))
    }

    /// Pre-check of the conversion adapter: WebP, or anything declared as an image
    pub fn accepts_for_conversion(file: &FileDescriptor) -> bool {
        Self::is_webp(file) || Self::is_image(file)
    }

    /// Keep the eligible files of a submission, in order.
    ///
    /// A non-empty submission with no eligible file is rejected as a whole.
    pub fn filter_batch(&self, files: Vec<FileDescriptor>) -> ConvertResult<Vec<FileDescriptor>> {
        let submitted = files.len();
        let eligible: Vec<FileDescriptor> = files
            .into_iter()
            .filter(|file| {
                let eligible = self.is_eligible(file);
                if !eligible {
                    debug!("Skipping {} ({}): not eligible", file.name(), file.media_type());
                }
                eligible
            })
            .collect();

        if eligible.is_empty() && submitted > 0 {
            return Err(ConvertError::ValidationRejection(REJECTION_NOTICE.to_string()));
        }

        Ok(eligible)
    }
}
