use crate::canvas::Overlay;
use crate::error::{StampaError, lopdf_err};
use crate::page_template::TemplateDocument;
use crate::pdf::{EncodeStats, OVERLAY_FONT_RESOURCE, encode_overlay_with_stats, overlay_font_dictionary};
use crate::pdfinspect::{inherited_attribute, page_box};
use lopdf::{
    Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream,
    dictionary,
};
use std::collections::BTreeMap;

/// One output page: the template prototype it sits on and the overlay drawn
/// over it.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPage {
    pub prototype_index: usize,
    pub overlay: Overlay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeSummary {
    pub pages_written: usize,
    pub forms_written: usize,
    /// Encoding stats of each page's overlay, in output order.
    pub overlays: Vec<EncodeStats>,
}

// Page attributes that may live on an ancestor Pages node.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

fn import_document_objects(
    dst: &mut LoDocument,
    mut src: LoDocument,
) -> Result<Vec<LoObjectId>, StampaError> {
    if src.is_encrypted() {
        return Err(StampaError::InvalidConfiguration(
            "template PDF is encrypted".to_string(),
        ));
    }
    let start_id = dst.max_id + 1;
    src.renumber_objects_with(start_id);
    let page_ids: Vec<LoObjectId> = src.get_pages().values().copied().collect();
    if src.max_id > dst.max_id {
        dst.max_id = src.max_id;
    }
    dst.objects.extend(src.objects);
    Ok(page_ids)
}

fn page_resources_object(doc: &LoDocument, page_id: LoObjectId) -> LoObject {
    match inherited_attribute(doc, page_id, b"Resources") {
        Some(LoObject::Reference(id)) => doc
            .get_object(*id)
            .cloned()
            .unwrap_or_else(|_| LoObject::Dictionary(lopdf::Dictionary::new())),
        Some(LoObject::Dictionary(d)) => LoObject::Dictionary(d.clone()),
        _ => LoObject::Dictionary(lopdf::Dictionary::new()),
    }
}

fn box_object(bbox: [f32; 4]) -> LoObject {
    LoObject::Array(bbox.iter().map(|v| LoObject::from(*v)).collect())
}

fn save_to_bytes(doc: &mut LoDocument) -> Result<Vec<u8>, StampaError> {
    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|err| StampaError::Pdf(format!("pdf write error: {err}")))?;
    Ok(out)
}

fn form_name(prototype_index: usize) -> String {
    format!("STP_TPL_{}", prototype_index + 1)
}

/// Builds the output document: each page draws its prototype as a Form
/// XObject, then its overlay at identity placement. Overlays already carry
/// document coordinates, so no further transform is applied here.
pub fn compose_pages(
    template: &TemplateDocument,
    pages: &[ComposedPage],
) -> Result<(Vec<u8>, ComposeSummary), StampaError> {
    if pages.is_empty() {
        return Err(StampaError::InvalidConfiguration(
            "compose plan cannot be empty".to_string(),
        ));
    }

    let mut composed = LoDocument::with_version("1.7");
    let template_pages = import_document_objects(&mut composed, template.load()?)?;

    for (idx, page) in pages.iter().enumerate() {
        if page.prototype_index >= template_pages.len() {
            return Err(StampaError::InvalidConfiguration(format!(
                "page {} prototype out of range: {} (allowed 0..{})",
                idx + 1,
                page.prototype_index,
                template_pages.len().saturating_sub(1)
            )));
        }
    }

    let pages_id = composed.new_object_id();
    let font_id = composed.add_object(overlay_font_dictionary());
    let mut forms: BTreeMap<usize, (LoObjectId, [f32; 4])> = BTreeMap::new();
    let mut kids: Vec<LoObject> = Vec::with_capacity(pages.len());
    let mut overlays: Vec<EncodeStats> = Vec::with_capacity(pages.len());

    for page in pages {
        let (form_id, bbox) = match forms.get(&page.prototype_index) {
            Some(entry) => *entry,
            None => {
                let template_page_id = template_pages[page.prototype_index];
                let content = composed
                    .get_page_content(template_page_id)
                    .map_err(lopdf_err)?;
                let bbox = page_box(&composed, template_page_id);
                let resources = page_resources_object(&composed, template_page_id);
                let form_id = composed.add_object(LoStream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Form",
                        "FormType" => 1,
                        "BBox" => box_object(bbox),
                        "Resources" => resources,
                    },
                    content,
                ));
                forms.insert(page.prototype_index, (form_id, bbox));
                (form_id, bbox)
            }
        };

        let name = form_name(page.prototype_index);
        let mut content = format!("q 1 0 0 1 0 0 cm /{} Do Q\nq\n", name).into_bytes();
        let (overlay_bytes, stats) = encode_overlay_with_stats(&page.overlay);
        content.extend_from_slice(&overlay_bytes);
        content.extend_from_slice(b"Q\n");
        overlays.push(stats);
        let content_id = composed.add_object(LoStream::new(dictionary! {}, content));

        let page_id = composed.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    name => form_id,
                },
                "Font" => dictionary! {
                    OVERLAY_FONT_RESOURCE => font_id,
                },
            },
            "MediaBox" => box_object(bbox),
        });
        kids.push(LoObject::Reference(page_id));
    }

    composed.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
        }),
    );
    let catalog_id = composed.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    composed.trailer.set("Root", catalog_id);
    composed.prune_objects();
    composed.renumber_objects();
    composed.compress();

    let bytes = save_to_bytes(&mut composed)?;
    Ok((
        bytes,
        ComposeSummary {
            pages_written: pages.len(),
            forms_written: forms.len(),
            overlays,
        },
    ))
}

/// Copies the given 0-based pages of `source` into a new document, in source
/// order. Objects no longer reachable from the kept pages are dropped.
pub fn extract_pages(source: &[u8], page_indices: &[usize]) -> Result<Vec<u8>, StampaError> {
    let mut doc = LoDocument::load_mem(source).map_err(lopdf_err)?;
    if doc.is_encrypted() {
        return Err(StampaError::InvalidConfiguration(
            "source PDF is encrypted".to_string(),
        ));
    }
    let page_ids: Vec<LoObjectId> = doc.get_pages().values().copied().collect();

    let mut wanted: Vec<usize> = page_indices.to_vec();
    wanted.sort_unstable();
    wanted.dedup();
    if wanted.is_empty() {
        return Err(StampaError::NoPagesSelected);
    }
    if let Some(bad) = wanted.iter().find(|idx| **idx >= page_ids.len()) {
        return Err(StampaError::InvalidConfiguration(format!(
            "page index out of range: {} (allowed 0..{})",
            bad,
            page_ids.len().saturating_sub(1)
        )));
    }

    let pages_id = doc.new_object_id();
    let mut kids: Vec<LoObject> = Vec::with_capacity(wanted.len());
    for idx in &wanted {
        let page_id = page_ids[*idx];
        let inherited: Vec<(&[u8], LoObject)> = INHERITABLE_KEYS
            .iter()
            .filter_map(|key| {
                inherited_attribute(&doc, page_id, key).map(|value| (*key, value.clone()))
            })
            .collect();
        let page = doc
            .get_object_mut(page_id)
            .and_then(LoObject::as_dict_mut)
            .map_err(lopdf_err)?;
        for (key, value) in inherited {
            if !page.has(key) {
                page.set(key.to_vec(), value);
            }
        }
        page.set("Parent", pages_id);
        kids.push(LoObject::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => wanted.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.prune_objects();
    doc.renumber_objects();
    doc.compress();
    save_to_bytes(&mut doc)
}
