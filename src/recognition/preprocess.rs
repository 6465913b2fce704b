use image::{imageops::FilterType, DynamicImage, GenericImageView};

use super::RecognitionError;

pub const DEFAULT_MAX_DIMENSION: u32 = 1024;

/// An image ready for recognition plus the per-axis factors that map its
/// pixel coordinates back onto the original frame. Rounding during the
/// resize makes the two factors differ slightly.
pub struct Prepared {
    pub image: DynamicImage,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl Prepared {
    pub fn is_resized(&self) -> bool {
        self.scale_x != 1.0 || self.scale_y != 1.0
    }
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, RecognitionError> {
    image::load_from_memory(bytes).map_err(|err| RecognitionError::Decode(err.to_string()))
}

/// Shrinks images wider or taller than `max_dimension`, keeping aspect ratio.
/// Images already within bounds are returned untouched.
pub fn downscale(image: DynamicImage, max_dimension: u32) -> Prepared {
    let (width, height) = image.dimensions();
    if width <= max_dimension && height <= max_dimension {
        return Prepared {
            image,
            scale_x: 1.0,
            scale_y: 1.0,
        };
    }

    let resized = image.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    Prepared {
        scale_x: width as f32 / resized.width().max(1) as f32,
        scale_y: height as f32 / resized.height().max(1) as f32,
        image: resized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn blank(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
    }

    #[test]
    fn in_bounds_images_pass_through() {
        let prepared = downscale(blank(800, 600), 1024);
        assert_eq!(prepared.image.dimensions(), (800, 600));
        assert!(!prepared.is_resized());
    }

    #[test]
    fn oversized_images_shrink_preserving_aspect_ratio() {
        let prepared = downscale(blank(2048, 1024), 1024);
        assert_eq!(prepared.image.dimensions(), (1024, 512));
        assert_eq!((prepared.scale_x, prepared.scale_y), (2.0, 2.0));

        let tall = downscale(blank(500, 3000), 1024);
        assert_eq!(tall.image.height(), 1024);
        assert!(tall.image.width() <= 171 && tall.image.width() >= 170);
        assert!((tall.scale_y - 3000.0 / 1024.0).abs() < 1e-6);
        assert!((tall.scale_x * tall.image.width() as f32 - 500.0).abs() < 1e-3);
    }

    #[test]
    fn decodes_png_and_rejects_garbage() {
        let mut png = Vec::new();
        blank(4, 4)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        assert!(decode(&png).is_ok());

        let err = decode(b"\x89PNG\r\n\x1a\nnot really").unwrap_err();
        assert_eq!(err.reason(), "decode_failure");
    }
}
