//! Raster artwork embedding as PDF image XObjects.
//!
//! Artwork is decoded with the `image` crate, split into an RGB pixel
//! stream plus an optional alpha channel, and embedded as an XObject with
//! an SMask so transparent signature backgrounds stay transparent.

use image::GenericImageView;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};
use crate::geometry::Rect;

/// Decoded artwork ready for embedding.
#[derive(Debug)]
pub struct DecodedArtwork {
    /// Pixel width
    pub width: u32,
    /// Pixel height
    pub height: u32,
    rgb: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

/// Decode raster bytes (PNG or JPEG) into embeddable channels.
///
/// The alpha channel is kept only when it actually masks something.
pub fn decode(bytes: &[u8]) -> Result<DecodedArtwork> {
    let img = image::load_from_memory(bytes).map_err(|e| Error::Image(e.to_string()))?;
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::Image("artwork has zero size".to_string()));
    }

    let rgba = img.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in rgba.pixels() {
        rgb.push(pixel.0[0]);
        rgb.push(pixel.0[1]);
        rgb.push(pixel.0[2]);
        alpha.push(pixel.0[3]);
    }

    let alpha = if alpha.iter().any(|&a| a != u8::MAX) {
        Some(alpha)
    } else {
        None
    };

    Ok(DecodedArtwork {
        width,
        height,
        rgb,
        alpha,
    })
}

/// Add the artwork's image (and SMask) streams to a document.
///
/// Returns the image XObject id for resource registration.
pub fn embed(doc: &mut Document, art: &DecodedArtwork) -> ObjectId {
    let smask_id = art.alpha.as_ref().map(|alpha| {
        doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => art.width as i64,
                "Height" => art.height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha.clone(),
        ))
    });

    let mut image_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => art.width as i64,
        "Height" => art.height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    if let Some(id) = smask_id {
        image_dict.set("SMask", Object::Reference(id));
    }

    doc.add_object(Stream::new(image_dict, art.rgb.clone()))
}

/// Scale the artwork to fit inside `rect` inset by `padding`, preserving
/// aspect ratio and centering the result.
pub fn fit_rect(rect: Rect, img_width: u32, img_height: u32, padding: f64) -> Rect {
    let inner = rect.inset(padding);
    if inner.width <= 0.0 || inner.height <= 0.0 || img_width == 0 || img_height == 0 {
        return Rect::new(inner.x, inner.y, 0.0, 0.0);
    }
    let scale = (inner.width / img_width as f64).min(inner.height / img_height as f64);
    let width = img_width as f64 * scale;
    let height = img_height as f64 * scale;
    Rect::new(
        inner.x + (inner.width - width) / 2.0,
        inner.y + (inner.height - height) / 2.0,
        width,
        height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{png_with_alpha, solid_png};

    #[test]
    fn test_decode_opaque_png_drops_alpha() {
        let art = decode(&solid_png(4, 2)).unwrap();
        assert_eq!((art.width, art.height), (4, 2));
        assert_eq!(art.rgb.len(), 4 * 2 * 3);
        assert!(art.alpha.is_none());
    }

    #[test]
    fn test_decode_transparent_png_keeps_alpha() {
        let art = decode(&png_with_alpha(3, 3)).unwrap();
        assert!(art.alpha.is_some());
        assert_eq!(art.alpha.as_ref().map(Vec::len), Some(9));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, Error::Image(_)));
    }

    #[test]
    fn test_fit_rect_wide_image() {
        // 2:1 image inside a 220x100 stamp rect inset by 8: inner is
        // 204x84, width-limited scale puts the image at 204x102 > 84, so
        // the height clamps the fit.
        let rect = Rect::new(50.0, 642.0, 220.0, 100.0);
        let fitted = fit_rect(rect, 200, 100, 8.0);
        assert!((fitted.height - 84.0).abs() < 1e-9);
        assert!((fitted.width - 168.0).abs() < 1e-9);
        // Centered horizontally inside the inner box.
        assert!((fitted.x - (58.0 + (204.0 - 168.0) / 2.0)).abs() < 1e-9);
        assert!((fitted.y - 650.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_rect_never_exceeds_inner_box() {
        let rect = Rect::new(0.0, 0.0, 220.0, 100.0);
        for (w, h) in [(10u32, 4000u32), (4000, 10), (84, 84)] {
            let fitted = fit_rect(rect, w, h, 8.0);
            assert!(fitted.width <= 204.0 + 1e-9);
            assert!(fitted.height <= 84.0 + 1e-9);
        }
    }

    #[test]
    fn test_embed_adds_smask_only_when_needed() {
        let mut doc = Document::with_version("1.5");
        let art = decode(&solid_png(2, 2)).unwrap();
        let id = embed(&mut doc, &art);
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert!(stream.dict.get(b"SMask").is_err());

        let art = decode(&png_with_alpha(2, 2)).unwrap();
        let id = embed(&mut doc, &art);
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert!(stream.dict.get(b"SMask").is_ok());
    }
}
