use crate::types::Size;
use lopdf::{Document as LoDocument, Object as LoObject, ObjectId as LoObjectId};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfInspectErrorCode {
    PdfParseFailed,
    PdfEncryptedUnsupported,
    PdfEmptyOrNoPages,
    PdfIoError,
}

impl PdfInspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdfInspectErrorCode::PdfParseFailed => "PDF_PARSE_FAILED",
            PdfInspectErrorCode::PdfEncryptedUnsupported => "PDF_ENCRYPTED_UNSUPPORTED",
            PdfInspectErrorCode::PdfEmptyOrNoPages => "PDF_EMPTY_OR_NO_PAGES",
            PdfInspectErrorCode::PdfIoError => "PDF_IO_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInspectError {
    pub code: PdfInspectErrorCode,
    pub message: String,
}

impl std::fmt::Display for PdfInspectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for PdfInspectError {}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfInspectReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    pub page_sizes: Vec<Size>,
    /// Effective box of each page as `[llx, lly, urx, ury]`.
    pub page_boxes: Vec<[f32; 4]>,
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfInspectReport, PdfInspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfParseFailed,
        message: err.to_string(),
    })?;

    let page_boxes = pdf
        .get_pages()
        .values()
        .map(|page_id| page_box(&pdf, *page_id))
        .collect::<Vec<_>>();
    let page_sizes = page_boxes
        .iter()
        .map(|[x0, y0, x1, y1]| Size::new((x1 - x0).abs(), (y1 - y0).abs()))
        .collect::<Vec<_>>();

    Ok(PdfInspectReport {
        pdf_version: pdf.version.clone(),
        page_count: page_sizes.len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
        page_sizes,
        page_boxes,
    })
}

pub fn inspect_pdf_path(path: impl AsRef<Path>) -> Result<PdfInspectReport, PdfInspectError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfIoError,
        message: format!("{}: {}", path.display(), err),
    })?;
    inspect_pdf_bytes(&bytes)
}

/// Rejects documents that cannot serve as a composition source.
pub fn require_composable(report: &PdfInspectReport) -> Result<(), PdfInspectError> {
    if report.encrypted {
        return Err(PdfInspectError {
            code: PdfInspectErrorCode::PdfEncryptedUnsupported,
            message: "encrypted pdf documents are not supported".to_string(),
        });
    }
    if report.page_count == 0 {
        return Err(PdfInspectError {
            code: PdfInspectErrorCode::PdfEmptyOrNoPages,
            message: "pdf has no pages".to_string(),
        });
    }
    Ok(())
}

const MAX_INHERIT_DEPTH: usize = 32;

/// Looks `key` up on the page and then up the `Parent` chain, as page
/// attributes such as MediaBox and Resources are inheritable.
pub(crate) fn inherited_attribute<'a>(
    doc: &'a LoDocument,
    page_id: LoObjectId,
    key: &[u8],
) -> Option<&'a LoObject> {
    let mut current = doc.get_object(page_id).and_then(LoObject::as_dict).ok()?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").and_then(LoObject::as_reference).ok()?;
        current = doc.get_object(parent).and_then(LoObject::as_dict).ok()?;
    }
    None
}

fn object_number(doc: &LoDocument, obj: &LoObject) -> Option<f32> {
    match obj {
        LoObject::Integer(v) => Some(*v as f32),
        LoObject::Real(v) => Some(*v as f32),
        LoObject::Reference(id) => object_number(doc, doc.get_object(*id).ok()?),
        _ => None,
    }
}

/// CropBox, else MediaBox, else US letter.
pub(crate) fn page_box(doc: &LoDocument, page_id: LoObjectId) -> [f32; 4] {
    for key in [b"CropBox".as_slice(), b"MediaBox".as_slice()] {
        let Some(obj) = inherited_attribute(doc, page_id, key) else {
            continue;
        };
        let arr = match obj {
            LoObject::Reference(id) => doc.get_object(*id).and_then(LoObject::as_array).ok(),
            other => other.as_array().ok(),
        };
        let Some(arr) = arr else {
            continue;
        };
        if arr.len() != 4 {
            continue;
        }
        let values: Vec<f32> = arr.iter().filter_map(|v| object_number(doc, v)).collect();
        if let [x0, y0, x1, y1] = values.as_slice() {
            return [*x0, *y0, *x1, *y1];
        }
    }
    [0.0, 0.0, 612.0, 792.0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_pdf_bytes, make_pdf_bytes_with_inherited_box};

    #[test]
    fn inspect_pdf_bytes_reads_version_page_count_and_sizes() {
        let bytes = make_pdf_bytes(&["FIRST", "LAST"], [595.28, 841.89]);
        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        assert_eq!(report.page_count, 2);
        assert!(!report.encrypted);
        assert_eq!(report.file_size_bytes, bytes.len());
        assert!(!report.pdf_version.is_empty());
        assert_eq!(report.page_sizes[0], Size::a4());
        assert_eq!(report.page_sizes[1], Size::a4());
    }

    #[test]
    fn inspect_pdf_bytes_rejects_malformed_data() {
        let err = inspect_pdf_bytes(b"not a pdf").expect_err("invalid");
        assert_eq!(err.code, PdfInspectErrorCode::PdfParseFailed);
    }

    #[test]
    fn inspect_pdf_path_reports_missing_file() {
        let path = crate::test_support::temp_dir("inspect_missing").join("absent.pdf");
        let err = inspect_pdf_path(&path).expect_err("missing");
        assert_eq!(err.code, PdfInspectErrorCode::PdfIoError);
        assert!(err.to_string().starts_with("PDF_IO_ERROR"));
    }

    #[test]
    fn page_size_is_inherited_from_page_tree() {
        let bytes = make_pdf_bytes_with_inherited_box([0.0, 0.0, 400.0, 300.0]);
        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        assert_eq!(report.page_sizes, vec![Size::new(400.0, 300.0)]);
        assert_eq!(report.page_boxes, vec![[0.0, 0.0, 400.0, 300.0]]);
    }

    #[test]
    fn offset_box_keeps_its_origin() {
        let bytes = make_pdf_bytes_with_inherited_box([20.0, 100.0, 420.0, 400.0]);
        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        assert_eq!(report.page_sizes, vec![Size::new(400.0, 300.0)]);
        assert_eq!(report.page_boxes, vec![[20.0, 100.0, 420.0, 400.0]]);
    }

    #[test]
    fn composable_rejects_encrypted_and_empty() {
        let mut report = PdfInspectReport {
            pdf_version: "1.7".to_string(),
            page_count: 1,
            encrypted: true,
            file_size_bytes: 0,
            page_sizes: vec![Size::a4()],
            page_boxes: vec![[0.0, 0.0, 595.28, 841.89]],
        };
        let err = require_composable(&report).expect_err("encrypted");
        assert_eq!(err.code, PdfInspectErrorCode::PdfEncryptedUnsupported);

        report.encrypted = false;
        report.page_count = 0;
        report.page_sizes.clear();
        report.page_boxes.clear();
        let err = require_composable(&report).expect_err("empty");
        assert_eq!(err.code, PdfInspectErrorCode::PdfEmptyOrNoPages);
        assert!(err.to_string().starts_with("PDF_EMPTY_OR_NO_PAGES"));
    }
}
