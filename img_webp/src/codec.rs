//! WebP codec adapter
//!
//! Decodes JPEG/PNG with the `image` crate and re-encodes to WebP. The
//! encoder is lossless; it is the only WebP encoder `image` ships.

use crate::candidate::is_supported_image;
use crate::error::{ConvertError, Result};
use image::codecs::webp::WebPEncoder;
use image::{ColorType, DynamicImage, ImageError, ImageFormat, ImageReader};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Source image → WebP bytes. Implementations must be shareable across the
/// worker pool.
pub trait WebpEncode: Send + Sync {
    fn encode(&self, input: &Path) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WebpCodec;

impl WebpCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn encoder_available() -> bool {
        ImageFormat::WebP.writing_enabled()
    }
}

impl WebpEncode for WebpCodec {
    fn encode(&self, input: &Path) -> Result<Vec<u8>> {
        if !is_supported_image(input) {
            return Err(ConvertError::UnsupportedFormat(input.display().to_string()));
        }
        if !Self::encoder_available() {
            return Err(ConvertError::NoEncoderAvailable);
        }

        let img = decode(input)?;
        let bytes = encode_webp(&img)?;
        debug!(
            file = %input.display(),
            width = img.width(),
            height = img.height(),
            encoded = bytes.len(),
            "Encoded WebP"
        );
        Ok(bytes)
    }
}

fn decode(input: &Path) -> Result<DynamicImage> {
    let reader = ImageReader::open(input)?.with_guessed_format()?;
    reader.decode().map_err(|e| match e {
        ImageError::IoError(io) => ConvertError::Io(io),
        other => ConvertError::DecodeError(other.to_string()),
    })
}

/// The WebP encoder only accepts 8-bit RGB/RGBA; everything else is
/// converted first.
fn to_encodable(img: &DynamicImage) -> std::borrow::Cow<'_, DynamicImage> {
    use std::borrow::Cow;
    match img.color() {
        ColorType::Rgb8 | ColorType::Rgba8 => Cow::Borrowed(img),
        c if c.has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(img.to_rgba8())),
        _ => Cow::Owned(DynamicImage::ImageRgb8(img.to_rgb8())),
    }
}

fn encode_webp(img: &DynamicImage) -> Result<Vec<u8>> {
    let img = to_encodable(img);
    let mut bytes = Vec::new();
    img.write_with_encoder(WebPEncoder::new_lossless(&mut bytes))
        .map_err(|e| match e {
            ImageError::IoError(io) => ConvertError::Io(io),
            other => ConvertError::EncodeError(other.to_string()),
        })?;
    Ok(bytes)
}

/// Encode `input` and write the result to `output`. Returns the output size.
///
/// Bytes go to a temporary file in the destination directory that is renamed
/// over `output` only after a complete write, so a failure never leaves a
/// partial file behind. An existing `output` is replaced.
pub fn convert_to_file<E: WebpEncode + ?Sized>(
    encoder: &E,
    input: &Path,
    output: &Path,
) -> Result<u64> {
    if input == output {
        return Err(ConvertError::OutputPathCollision(input.to_path_buf()));
    }
    let bytes = encoder.encode(input)?;
    write_atomically(output, &bytes)?;
    Ok(bytes.len() as u64)
}

fn write_atomically(output: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".img-webp-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(output).map_err(|e| ConvertError::Io(e.error))?;
    Ok(())
}
