use crate::error::{StampaError, lopdf_err};
use crate::pdfinspect::{PdfInspectErrorCode, inspect_pdf_bytes, require_composable};
use crate::template::PageRole;
use crate::types::{Pt, Size};
use lopdf::Document as LoDocument;
use std::sync::Arc;

/// Role -> physical page index. Roles without a dedicated page use index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrototypeTable {
    pub first: usize,
    pub last: usize,
    pub intermediate: usize,
}

impl PrototypeTable {
    pub fn for_page_count(page_count: usize) -> Self {
        Self {
            first: 0,
            last: if page_count > 1 { 1 } else { 0 },
            intermediate: if page_count > 2 { 2 } else { 0 },
        }
    }

    pub fn index_for(&self, role: PageRole) -> usize {
        match role {
            PageRole::First => self.first,
            PageRole::Last => self.last,
            PageRole::Intermediate => self.intermediate,
        }
    }

    pub fn is_fallback(&self, role: PageRole) -> bool {
        role != PageRole::First && self.index_for(role) == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePrototype {
    pub index: usize,
    pub page_size: Size,
    /// `[llx, lly, urx, ury]` of the page's effective box.
    pub page_box: [f32; 4],
}

impl PagePrototype {
    /// Left edge of the box in document coordinates.
    pub fn left(&self) -> Pt {
        Pt::from_f32(self.page_box[0].min(self.page_box[2]))
    }

    /// Top edge of the box in document coordinates; editor y = 0 lands here.
    pub fn top(&self) -> Pt {
        Pt::from_f32(self.page_box[1].max(self.page_box[3]))
    }
}

/// The operator-authored template PDF. Bytes are kept rather than a parsed
/// document so the template can be shared freely between render workers; each
/// composition parses its own copy.
#[derive(Debug, Clone)]
pub struct TemplateDocument {
    bytes: Arc<[u8]>,
    prototypes: Vec<PagePrototype>,
    table: PrototypeTable,
}

impl TemplateDocument {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, StampaError> {
        let bytes: Vec<u8> = bytes.into();
        let report = inspect_pdf_bytes(&bytes).map_err(|err| {
            StampaError::InvalidConfiguration(format!("template document: {err}"))
        })?;
        if let Err(err) = require_composable(&report) {
            return Err(match err.code {
                PdfInspectErrorCode::PdfEmptyOrNoPages => StampaError::MissingFirstPage,
                _ => StampaError::InvalidConfiguration(format!("template document: {err}")),
            });
        }

        let prototypes = report
            .page_sizes
            .iter()
            .zip(report.page_boxes.iter())
            .enumerate()
            .take(3)
            .map(|(index, (page_size, page_box))| PagePrototype {
                index,
                page_size: *page_size,
                page_box: *page_box,
            })
            .collect::<Vec<_>>();
        let table = PrototypeTable::for_page_count(prototypes.len());

        Ok(Self {
            bytes: Arc::from(bytes),
            prototypes,
            table,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn table(&self) -> PrototypeTable {
        self.table
    }

    pub fn prototypes(&self) -> &[PagePrototype] {
        &self.prototypes
    }

    pub fn prototype_for(&self, role: PageRole) -> PagePrototype {
        let index = self.table.index_for(role);
        // `from_bytes` guarantees a first page, and table indices never exceed
        // the prototype count.
        self.prototypes[index]
    }

    pub(crate) fn load(&self) -> Result<LoDocument, StampaError> {
        LoDocument::load_mem(&self.bytes).map_err(lopdf_err)
    }
}
