//! Stamping resolved placements onto PDF pages.
//!
//! A stamp is either the signer's raster artwork scaled into the resolved
//! rectangle, or a synthesized text block with the signer's name, company,
//! location, localized signing time and a fixed verified marker. Nothing
//! else is drawn: no background fill, no border.
//!
//! Artwork failures degrade to the text path instead of aborting the
//! operation; unrecoverable PDF structure errors propagate.

pub mod content;
pub mod image_xobject;

use chrono::{DateTime, FixedOffset, Utc};
use log::warn;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::identity::SignatureIdentity;
use content::ContentBuilder;

/// Padding between the resolved rectangle and embedded artwork, in points.
pub const STAMP_PADDING: f64 = 8.0;
/// Fixed marker line closing every text stamp.
pub const VERIFIED_MARKER: &str = "Digitally verified";

const FONT_REGULAR: &str = "SigHelv";
const FONT_BOLD: &str = "SigHelvB";

/// Signer metadata rendered by the text path.
#[derive(Debug, Clone)]
pub struct SignerStamp {
    /// Full legal name (drawn bold)
    pub full_name: String,
    /// Company line
    pub company: String,
    /// Location line
    pub location: String,
    /// Signing instant, already localized to the signer's timezone
    pub signed_at: DateTime<FixedOffset>,
}

impl SignerStamp {
    /// Build the stamp text block for an identity and an apply instant.
    pub fn for_identity(identity: &SignatureIdentity, applied_at: DateTime<Utc>) -> Self {
        Self {
            full_name: identity.profile.full_name.clone(),
            company: identity.profile.company.clone(),
            location: identity.profile.location.clone(),
            signed_at: identity.profile.localize(applied_at),
        }
    }
}

/// One stamp to draw: where, who, and optional artwork.
#[derive(Debug, Clone)]
pub struct StampPlan {
    /// 1-based target page
    pub page: u32,
    /// Resolved page-space rectangle
    pub rect: Rect,
    /// Signer text block
    pub signer: SignerStamp,
    /// Raster artwork bytes, when the identity has an image
    pub artwork: Option<Vec<u8>>,
}

/// Stamp every plan onto a document and return the new bytes.
pub fn stamp_document(bytes: &[u8], plans: &[StampPlan]) -> Result<Vec<u8>> {
    let mut doc = Document::load_mem(bytes)?;
    for (seq, plan) in plans.iter().enumerate() {
        stamp_page(&mut doc, plan, seq)?;
    }
    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

/// Draw one stamp onto one page of an in-memory document.
///
/// `seq` keeps XObject resource names unique across stamps on the same
/// document. Later stamps paint over earlier ones where rectangles
/// overlap; there is no collision avoidance.
pub fn stamp_page(doc: &mut Document, plan: &StampPlan, seq: usize) -> Result<()> {
    let page_id = *doc
        .get_pages()
        .get(&plan.page)
        .ok_or_else(|| Error::Processing(format!("page {} does not exist", plan.page)))?;

    normalize_resources(doc, page_id)?;

    let stream = match &plan.artwork {
        Some(artwork) => match artwork_stream(doc, page_id, plan, seq, artwork) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(
                    "artwork embed failed on page {}, falling back to text stamp: {err}",
                    plan.page
                );
                text_stream(doc, page_id, plan)?
            },
        },
        None => text_stream(doc, page_id, plan)?,
    };

    doc.add_page_contents(page_id, stream)?;
    Ok(())
}

/// Decode and embed artwork, returning the draw stream.
fn artwork_stream(
    doc: &mut Document,
    page_id: ObjectId,
    plan: &StampPlan,
    seq: usize,
    artwork: &[u8],
) -> Result<Vec<u8>> {
    let art = image_xobject::decode(artwork)?;
    let xobject_id = image_xobject::embed(doc, &art);
    let name = format!("SigImg{seq}");
    set_resource(doc, page_id, "XObject", &name, Object::Reference(xobject_id))?;

    let draw = image_xobject::fit_rect(plan.rect, art.width, art.height, STAMP_PADDING);
    let mut builder = ContentBuilder::new();
    builder
        .save_state()
        .transform(draw.width, 0.0, 0.0, draw.height, draw.x, draw.y)
        .paint_xobject(name)
        .restore_state();
    Ok(builder.build())
}

/// Register the stamp fonts and lay out the signer text block.
fn text_stream(doc: &mut Document, page_id: ObjectId, plan: &StampPlan) -> Result<Vec<u8>> {
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
    set_resource(doc, page_id, "Font", FONT_REGULAR, Object::Reference(helvetica))?;
    set_resource(doc, page_id, "Font", FONT_BOLD, Object::Reference(helvetica_bold))?;

    let rect = plan.rect;
    let signer = &plan.signer;
    let x = rect.x;
    let mut y = rect.top() - 14.0;

    let mut builder = ContentBuilder::new();
    builder.text_line(FONT_BOLD, 12.0, x, y, &signer.full_name);
    if !signer.company.is_empty() {
        y -= 14.0;
        builder.text_line(FONT_REGULAR, 10.0, x, y, &signer.company);
    }
    if !signer.location.is_empty() {
        y -= 12.0;
        builder.text_line(FONT_REGULAR, 10.0, x, y, &signer.location);
    }
    y -= 12.0;
    let timestamp = signer.signed_at.format("%Y-%m-%d %H:%M UTC%:z").to_string();
    builder.text_line(FONT_REGULAR, 9.0, x, y, timestamp);
    y -= 12.0;
    builder.text_line(FONT_REGULAR, 9.0, x, y, VERIFIED_MARKER);

    Ok(builder.build())
}

/// Rewrite the page's Resources (and its Font/XObject subdictionaries)
/// as inline dictionaries so later registration is a plain mutation.
fn normalize_resources(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let resources: Dictionary = {
        let page = doc.get_object(page_id)?.as_dict()?;
        match page.get(b"Resources") {
            Ok(Object::Reference(id)) => doc.get_object(*id)?.as_dict()?.clone(),
            Ok(Object::Dictionary(dict)) => dict.clone(),
            _ => Dictionary::new(),
        }
    };
    let resources = inline_subdict(doc, resources, b"Font")?;
    let resources = inline_subdict(doc, resources, b"XObject")?;

    let page = doc
        .get_object_mut(page_id)?
        .as_dict_mut()
        .map_err(|_| Error::Processing("page object is not a dictionary".to_string()))?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

fn inline_subdict(doc: &Document, mut resources: Dictionary, key: &[u8]) -> Result<Dictionary> {
    let inline = match resources.get(key) {
        Ok(Object::Reference(id)) => doc.get_object(*id)?.as_dict()?.clone(),
        Ok(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };
    resources.set(key, Object::Dictionary(inline));
    Ok(resources)
}

fn set_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    name: &str,
    value: Object,
) -> Result<()> {
    let page = doc
        .get_object_mut(page_id)?
        .as_dict_mut()
        .map_err(|_| Error::Processing("page object is not a dictionary".to_string()))?;
    let resources = page
        .get_mut(b"Resources")
        .and_then(Object::as_dict_mut)
        .map_err(|_| Error::Processing("page resources missing".to_string()))?;
    let sub = resources
        .get_mut(category.as_bytes())
        .and_then(Object::as_dict_mut)
        .map_err(|_| Error::Processing(format!("{category} resources missing")))?;
    sub.set(name, value);
    Ok(())
}
