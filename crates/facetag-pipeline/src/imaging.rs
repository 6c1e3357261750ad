//! Image header probing, cropping and JPEG encoding.

use std::io::Cursor;

use facetag_models::FaceBounds;
use image::{DynamicImage, ImageOutputFormat};

/// Errors from decoding or encoding image bytes.
pub type ImagingResult<T> = Result<T, image::ImageError>;

/// Read pixel dimensions from the image header without decoding pixels.
///
/// Works on a prefix of the file as long as the header fits in it.
pub fn dimensions(bytes: &[u8]) -> ImagingResult<(u32, u32)> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
}

/// Result of cutting a face out of a source image.
#[derive(Debug)]
pub enum Crop {
    /// Encoded JPEG of the clamped rectangle.
    Jpeg { bytes: Vec<u8>, bounds: FaceBounds },
    /// Nothing of the rectangle lies inside the image.
    Empty,
}

/// Decode `source`, clamp `bounds` to it, and encode the region as JPEG.
pub fn crop_to_jpeg(source: &[u8], bounds: &FaceBounds, quality: u8) -> ImagingResult<Crop> {
    let image = image::load_from_memory(source)?;

    let Some(clamped) = bounds.clamped_to(image.width(), image.height()) else {
        return Ok(Crop::Empty);
    };

    let region = image.crop_imm(clamped.x, clamped.y, clamped.width, clamped.height);
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(region.to_rgb8());

    let mut bytes = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Jpeg(quality))?;

    Ok(Crop::Jpeg {
        bytes,
        bounds: clamped,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    /// Encode a solid-color test image.
    pub(crate) fn test_image(width: u32, height: u32, format: ImageOutputFormat) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 120, 40]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    #[test]
    fn test_dimensions_from_full_file() {
        let png = test_image(1000, 500, ImageOutputFormat::Png);
        assert_eq!(dimensions(&png).unwrap(), (1000, 500));

        let jpeg = test_image(64, 48, ImageOutputFormat::Jpeg(80));
        assert_eq!(dimensions(&jpeg).unwrap(), (64, 48));
    }

    #[test]
    fn test_dimensions_from_prefix() {
        let noisy = RgbImage::from_fn(300, 200, |x, y| {
            Rgb([(x * 7 ^ y * 13) as u8, (x * y) as u8, (x + y) as u8])
        });
        for format in [ImageOutputFormat::Png, ImageOutputFormat::Jpeg(90)] {
            let mut bytes = Vec::new();
            DynamicImage::ImageRgb8(noisy.clone())
                .write_to(&mut Cursor::new(&mut bytes), format)
                .unwrap();
            let prefix = &bytes[..bytes.len() / 2];
            assert_eq!(dimensions(prefix).unwrap(), (300, 200));
        }
    }

    #[test]
    fn test_dimensions_of_garbage_fails() {
        assert!(dimensions(b"definitely not an image").is_err());
        assert!(dimensions(&[]).is_err());
    }

    #[test]
    fn test_crop_produces_jpeg_of_requested_size() {
        let png = test_image(200, 200, ImageOutputFormat::Png);
        let crop = crop_to_jpeg(&png, &FaceBounds::new(0, 0, 100, 100), 90).unwrap();

        let Crop::Jpeg { bytes, bounds } = crop else {
            panic!("expected a crop");
        };
        assert_eq!(bounds, FaceBounds::new(0, 0, 100, 100));
        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Jpeg);
        assert_eq!(dimensions(&bytes).unwrap(), (100, 100));
    }

    #[test]
    fn test_crop_is_clamped() {
        let png = test_image(100, 80, ImageOutputFormat::Png);
        let crop = crop_to_jpeg(&png, &FaceBounds::new(60, 40, 100, 100), 90).unwrap();
        let Crop::Jpeg { bytes, bounds } = crop else {
            panic!("expected a crop");
        };
        assert_eq!(bounds, FaceBounds::new(60, 40, 40, 40));
        assert_eq!(dimensions(&bytes).unwrap(), (40, 40));
    }

    #[test]
    fn test_crop_outside_image_is_empty() {
        let png = test_image(50, 50, ImageOutputFormat::Png);
        let crop = crop_to_jpeg(&png, &FaceBounds::new(50, 0, 10, 10), 90).unwrap();
        assert!(matches!(crop, Crop::Empty));
    }

    #[test]
    fn test_crop_drops_alpha() {
        let img = RgbaImage::from_pixel(20, 20, Rgba([10, 20, 30, 128]));
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
            .unwrap();

        let crop = crop_to_jpeg(&png, &FaceBounds::new(0, 0, 10, 10), 90).unwrap();
        assert!(matches!(crop, Crop::Jpeg { .. }));
    }

    #[test]
    fn test_crop_of_garbage_fails() {
        assert!(crop_to_jpeg(b"nope", &FaceBounds::new(0, 0, 1, 1), 90).is_err());
    }
}
