//! Format detection, downscaling, transcoding, and size enforcement for
//! image attachments before they reach OCR or captioning (component C4).
//! Grounded on `ferrex-core`'s image service: singleflight-free here since
//! each call is already scoped to one attachment, but the same
//! worker-plus-cancellation shape.

use image::codecs::gif::GifDecoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{AnimationDecoder, DynamicImage, GenericImageView, ImageEncoder, ImageFormat};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const JPEG_QUALITY: u8 = 85;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("could not determine image format")]
    UnrecognizedFormat,

    #[error("could not decode image: {0}")]
    DecodeFailed(String),

    #[error("could not encode image: {0}")]
    EncodeFailed(String),

    #[error("image exceeds size ceiling after transcoding: {0} bytes")]
    TooLarge(usize),

    #[error("image processing was cancelled")]
    Cancelled,

    #[error("image worker task failed: {0}")]
    JoinFailed(String),
}

/// Where the prepared image is headed next, which governs the edge/size
/// ceilings and the set of acceptable output formats (§4.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Destination {
    LocalOllama,
    Cloud,
}

impl Destination {
    fn max_edge(self) -> u32 {
        match self {
            Destination::LocalOllama => 1024,
            Destination::Cloud => 2048,
        }
    }

    fn size_ceiling_bytes(self) -> usize {
        match self {
            Destination::LocalOllama => 10 * 1024 * 1024,
            Destination::Cloud => 20 * 1024 * 1024,
        }
    }

    fn accepts(self, format: ImageFormat) -> bool {
        match self {
            Destination::LocalOllama => matches!(format, ImageFormat::Png),
            Destination::Cloud => matches!(format, ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProcessedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub dims: (u32, u32),
}

fn mime_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        _ => "application/octet-stream",
    }
}

fn longest_edge(w: u32, h: u32) -> u32 {
    w.max(h)
}

fn downscale_if_needed(image: DynamicImage, max_edge: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    if longest_edge(w, h) <= max_edge {
        return image;
    }
    let scale = max_edge as f64 / longest_edge(w, h) as f64;
    let new_w = ((w as f64) * scale).round().max(1.0) as u32;
    let new_h = ((h as f64) * scale).round().max(1.0) as u32;
    image.resize(new_w, new_h, image::imageops::FilterType::Lanczos3)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(image.as_bytes(), image.width(), image.height(), image.color().into())
        .map_err(|err| ImageError::EncodeFailed(err.to_string()))?;
    Ok(out)
}

fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::new();
    let rgb = image.to_rgb8();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .write_image(&rgb, rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
        .map_err(|err| ImageError::EncodeFailed(err.to_string()))?;
    Ok(out)
}

/// Extracts the first frame of an animated GIF and decodes it standalone.
fn first_gif_frame(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    let decoder = GifDecoder::new(std::io::Cursor::new(bytes))
        .map_err(|err| ImageError::DecodeFailed(err.to_string()))?;
    let mut frames = decoder.into_frames();
    let frame = frames
        .next()
        .ok_or_else(|| ImageError::DecodeFailed("GIF has no frames".into()))?
        .map_err(|err| ImageError::DecodeFailed(err.to_string()))?;
    Ok(DynamicImage::ImageRgba8(frame.into_buffer()))
}

fn process_sync(bytes: &[u8], destination: Destination) -> Result<ProcessedImage, ImageError> {
    let format = image::guess_format(bytes).map_err(|_| ImageError::UnrecognizedFormat)?;
    let ceiling = destination.size_ceiling_bytes();

    // Already compliant: right format family, within the edge bound, and
    // under the size ceiling. No re-encode.
    if destination.accepts(format) && bytes.len() <= ceiling {
        if let Ok(dims) = image::image_dimensions(std::io::Cursor::new(bytes))
            .or_else(|_| image::load_from_memory_with_format(bytes, format).map(|img| img.dimensions()))
        {
            if longest_edge(dims.0, dims.1) <= destination.max_edge() {
                return Ok(ProcessedImage {
                    bytes: bytes.to_vec(),
                    mime: mime_for(format).to_string(),
                    dims,
                });
            }
        }
    }

    if format == ImageFormat::Gif && (bytes.len() > ceiling || destination == Destination::LocalOllama) {
        let frame = first_gif_frame(bytes)?;
        let frame = downscale_if_needed(frame, destination.max_edge());
        let dims = frame.dimensions();
        let encoded = encode_png(&frame)?;
        if encoded.len() > ceiling {
            return Err(ImageError::TooLarge(encoded.len()));
        }
        return Ok(ProcessedImage { bytes: encoded, mime: "image/png".to_string(), dims });
    }

    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|err| ImageError::DecodeFailed(err.to_string()))?;
    let decoded = downscale_if_needed(decoded, destination.max_edge());
    let dims = decoded.dimensions();

    let (encoded, mime) = if destination == Destination::LocalOllama {
        (encode_png(&decoded)?, "image/png")
    } else {
        match format {
            ImageFormat::Jpeg => (encode_jpeg(&decoded)?, "image/jpeg"),
            _ => (encode_png(&decoded)?, "image/png"),
        }
    };

    if encoded.len() > ceiling {
        return Err(ImageError::TooLarge(encoded.len()));
    }

    Ok(ProcessedImage { bytes: encoded, mime: mime.to_string(), dims })
}

/// Prepares raw image bytes for a destination, running the CPU-bound work
/// on a blocking thread and honoring cooperative cancellation.
pub async fn prepare(
    bytes: Vec<u8>,
    destination: Destination,
    cancel: CancellationToken,
) -> Result<ProcessedImage, ImageError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ImageError::Cancelled),
        result = tokio::task::spawn_blocking(move || process_sync(&bytes, destination)) => {
            result.map_err(|err| ImageError::JoinFailed(err.to_string()))?
        }
    }
}
