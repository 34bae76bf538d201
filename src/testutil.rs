//! Shared fixtures for unit tests.

use std::io::Cursor;

use lopdf::{dictionary, Document, Object, Stream};

/// Build a minimal n-page PDF with the given page size.
pub(crate) fn minimal_pdf(pages: usize, width: f64, height: f64) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(pages);
    for _ in 0..pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"q Q".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(width as f32),
                Object::Real(height as f32),
            ]),
            "Contents" => Object::Reference(content_id),
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => Object::Array(kids),
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("fixture PDF serializes");
    out
}

/// Fully opaque colored PNG.
pub(crate) fn solid_png(width: u32, height: u32) -> Vec<u8> {
    encode_png(image::RgbaImage::from_pixel(
        width,
        height,
        image::Rgba([20, 30, 180, 255]),
    ))
}

/// Mostly transparent PNG with one opaque pixel.
pub(crate) fn png_with_alpha(width: u32, height: u32) -> Vec<u8> {
    let mut img = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 0]));
    img.put_pixel(0, 0, image::Rgba([200, 30, 30, 255]));
    encode_png(img)
}

fn encode_png(img: image::RgbaImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, image::ImageOutputFormat::Png)
        .expect("fixture PNG encodes");
    buf.into_inner()
}

/// Byte-level substring search over serialized PDF output.
pub(crate) fn contains(haystack: &[u8], needle: &str) -> bool {
    let needle = needle.as_bytes();
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}
