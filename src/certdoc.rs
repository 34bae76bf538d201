//! Generated certificate summary document.
//!
//! The certificate fetch endpoint can return a one-page PDF rendition of
//! the certificate metadata instead of JSON. The page is synthesized from
//! scratch with the stamper's content builder.

use lopdf::{dictionary, Document, Object, Stream};

use crate::error::Result;
use crate::geometry::PageSize;
use crate::identity::CertificateInfo;
use crate::stamper::content::ContentBuilder;

const TITLE_FONT: &str = "CertHelvB";
const BODY_FONT: &str = "CertHelv";
const MARGIN: f64 = 72.0;

/// Render certificate metadata as a single-page PDF.
pub fn render(display_name: &str, info: &CertificateInfo) -> Result<Vec<u8>> {
    let page = PageSize::letter();
    let mut builder = ContentBuilder::new();

    let x = MARGIN;
    let mut y = page.height - MARGIN;

    builder.text_line(TITLE_FONT, 18.0, x, y, "Signature Certificate");
    y -= 30.0;
    builder.text_line(BODY_FONT, 11.0, x, y, display_name);

    y -= 28.0;
    let mut field = |builder: &mut ContentBuilder, label: &str, value: &str| {
        builder.text_line(TITLE_FONT, 10.0, x, y, label);
        y -= 14.0;
        builder.text_line(BODY_FONT, 10.0, x, y, value);
        y -= 22.0;
    };

    field(&mut builder, "Issued to", &info.subject);
    field(&mut builder, "Issued by", &info.issuer);
    field(&mut builder, "Serial number", &info.serial_number);
    field(
        &mut builder,
        "Valid from",
        &info.valid_from.format("%Y-%m-%d %H:%M UTC").to_string(),
    );
    field(
        &mut builder,
        "Valid to",
        &info.valid_to.format("%Y-%m-%d %H:%M UTC").to_string(),
    );

    builder.text_line(TITLE_FONT, 10.0, x, y, "SHA-256 fingerprint");
    y -= 14.0;
    for chunk in fingerprint_lines(&info.fingerprint) {
        builder.text_line(BODY_FONT, 9.0, x, y, chunk);
        y -= 12.0;
    }

    y -= 16.0;
    let status = if info.is_valid {
        "This certificate is currently valid."
    } else {
        "This certificate is expired or not yet valid."
    };
    builder.text_line(BODY_FONT, 10.0, x, y, status);

    single_page_pdf(page, builder.build())
}

/// Break a colon-separated fingerprint into display lines.
fn fingerprint_lines(fingerprint: &str) -> Vec<String> {
    let pairs: Vec<&str> = fingerprint.split(':').collect();
    pairs.chunks(16).map(|chunk| chunk.join(":")).collect()
}

fn single_page_pdf(page: PageSize, content: Vec<u8>) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let helvetica = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let helvetica_bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "MediaBox" => Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(page.width as f32),
            Object::Real(page.height as f32),
        ]),
        "Resources" => Object::Dictionary(dictionary! {
            "Font" => Object::Dictionary(dictionary! {
                BODY_FONT => Object::Reference(helvetica),
                TITLE_FONT => Object::Reference(helvetica_bold),
            }),
        }),
        "Contents" => Object::Reference(content_id),
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => Object::Array(vec![Object::Reference(page_id)]),
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::certificate::{self, IdentityAttrs};
    use crate::testutil::contains;

    #[test]
    fn test_render_contains_certificate_fields() {
        let creds = certificate::issue(&IdentityAttrs {
            common_name: "Iris Nakamura".to_string(),
            organization: "Paperless KK".to_string(),
            locality: "Osaka".to_string(),
            email: "iris@paperless.example".to_string(),
        })
        .unwrap();
        let info = certificate::describe(&creds.certificate_pem).unwrap();

        let pdf = render("Main signature", &info).unwrap();
        assert!(contains(&pdf, "%PDF"));
        assert!(contains(&pdf, "Signature Certificate"));
        assert!(contains(&pdf, "Main signature"));
        assert!(contains(&pdf, "Iris Nakamura"));
        assert!(contains(&pdf, "currently valid"));
    }

    #[test]
    fn test_fingerprint_lines_wrap() {
        let fp = (0..32).map(|_| "AB").collect::<Vec<_>>().join(":");
        let lines = fingerprint_lines(&fp);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split(':').count(), 16);
    }

    #[test]
    fn test_render_loads_as_pdf() {
        let creds = certificate::issue(&IdentityAttrs {
            common_name: "A".to_string(),
            organization: "B".to_string(),
            locality: "C".to_string(),
            email: "a@b.example".to_string(),
        })
        .unwrap();
        let info = certificate::describe(&creds.certificate_pem).unwrap();
        let pdf = render("sig", &info).unwrap();
        let doc = lopdf::Document::load_mem(&pdf).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }
}
