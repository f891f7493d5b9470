use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader, Rgb, RgbImage, Rgba};
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to encode webp: {0}")]
    Encode(String),
}

/// Optional downscale bounds. Images are never enlarged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResizeSpec {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub keep_aspect_ratio: bool,
}

impl ResizeSpec {
    pub fn is_noop(&self) -> bool {
        self.max_width.is_none() && self.max_height.is_none()
    }

    /// Target dimensions for a `width` x `height` source, or `None` if it already fits.
    pub fn target(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        if self.is_noop() || width == 0 || height == 0 {
            return None;
        }

        let (new_width, new_height) = if self.keep_aspect_ratio {
            let scale_w = self.max_width.map_or(1.0, |m| m as f64 / width as f64);
            let scale_h = self.max_height.map_or(1.0, |m| m as f64 / height as f64);
            let scale = scale_w.min(scale_h);
            if scale >= 1.0 {
                return None;
            }
            (
                ((width as f64 * scale).round() as u32).max(1),
                ((height as f64 * scale).round() as u32).max(1),
            )
        } else {
            (
                self.max_width.map_or(width, |m| m.min(width)),
                self.max_height.map_or(height, |m| m.min(height)),
            )
        };

        ((new_width, new_height) != (width, height)).then_some((new_width, new_height))
    }
}

/// Decoder/encoder the pipeline hands every accepted upload to.
pub trait ImageCodec: Send + Sync {
    fn to_webp(&self, source: &[u8], resize: &ResizeSpec) -> Result<Vec<u8>, CodecError>;
}

/// Lossy WebP encoder backed by `image` for decoding and libwebp for encoding.
#[derive(Clone, Debug)]
pub struct WebpCodec {
    quality: u8,
}

impl WebpCodec {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100),
        }
    }
}

impl ImageCodec for WebpCodec {
    fn to_webp(&self, source: &[u8], resize: &ResizeSpec) -> Result<Vec<u8>, CodecError> {
        let mut image = decode(source)?;

        if let Some((width, height)) = resize.target(image.width(), image.height()) {
            debug!(
                from_width = image.width(),
                from_height = image.height(),
                width,
                height,
                "Resizing image"
            );
            image = image.resize_exact(width, height, FilterType::Lanczos3);
        }

        let rgb = flatten_onto_white(image);
        let (width, height) = rgb.dimensions();
        let encoded = webp::Encoder::from_rgb(rgb.as_raw(), width, height)
            .encode_simple(false, f32::from(self.quality))
            .map_err(|error| CodecError::Encode(format!("{error:?}")))?;

        Ok(encoded.to_vec())
    }
}

/// Decode any supported raster format, applying its EXIF orientation.
fn decode(source: &[u8]) -> Result<DynamicImage, CodecError> {
    let mut decoder = ImageReader::new(Cursor::new(source))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;

    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Composite transparent pixels over opaque white, or plain RGB conversion if
/// the image has no alpha channel. Palette PNGs arrive expanded by the decoder.
pub fn flatten_onto_white(image: DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.into_rgb8();
    }

    let rgba = image.into_rgba8();
    let (width, height) = rgba.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        Rgb([over_white(r, a), over_white(g, a), over_white(b, a)])
    })
}

fn over_white(channel: u8, alpha: u8) -> u8 {
    let (c, a) = (u16::from(channel), u16::from(alpha));
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}
