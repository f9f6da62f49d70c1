use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, dictionary};
use std::path::PathBuf;

/// One page per label, each stamped with its label so prototypes can be told
/// apart in composed output.
pub(crate) fn make_pdf_bytes(labels: &[&str], size: [f32; 2]) -> Vec<u8> {
    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids = Vec::new();
    for label in labels {
        let content = format!("BT /F1 18 Tf 72 720 Td ({}) Tj ET", label).into_bytes();
        let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), size[0].into(), size[1].into()],
        });
        kids.push(LoObject::Reference(page_id));
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save");
    out
}

pub(crate) fn make_pdf_bytes_with_inherited_box(media_box: [f32; 4]) -> Vec<u8> {
    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(LoStream::new(dictionary! {}, b"0 0 m 10 10 l S".to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![LoObject::Reference(page_id)],
            "Count" => 1,
            "MediaBox" => media_box.iter().map(|v| LoObject::from(*v)).collect::<Vec<_>>(),
            "Resources" => dictionary! {},
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save");
    out
}

/// Decoded content of every page, in page order.
pub(crate) fn page_contents(bytes: &[u8]) -> Vec<String> {
    let doc = LoDocument::load_mem(bytes).expect("load pdf");
    doc.get_pages()
        .values()
        .map(|page_id| {
            let content = doc.get_page_content(*page_id).expect("page content");
            String::from_utf8_lossy(&content).into_owned()
        })
        .collect()
}

/// Page content plus the content of every Form XObject it draws, so the
/// template background and the overlay can both be asserted on.
pub(crate) fn page_texts(bytes: &[u8]) -> Vec<String> {
    let doc = LoDocument::load_mem(bytes).expect("load pdf");
    doc.get_pages()
        .values()
        .map(|page_id| {
            let mut text = String::from_utf8_lossy(
                &doc.get_page_content(*page_id).expect("page content"),
            )
            .into_owned();
            let page = doc
                .get_object(*page_id)
                .and_then(LoObject::as_dict)
                .expect("page dict");
            let resources = page
                .get(b"Resources")
                .and_then(LoObject::as_dict)
                .expect("resources");
            if let Ok(xobjects) = resources.get(b"XObject").and_then(LoObject::as_dict) {
                for (_, obj) in xobjects.iter() {
                    let Ok(id) = obj.as_reference() else {
                        continue;
                    };
                    let Ok(stream) = doc.get_object(id).and_then(LoObject::as_stream) else {
                        continue;
                    };
                    let data = stream
                        .decompressed_content()
                        .unwrap_or_else(|_| stream.content.clone());
                    text.push('\n');
                    text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            text
        })
        .collect()
}

pub(crate) fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "stampa_{}_{}_{}",
        tag,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("mkdir");
    dir
}
