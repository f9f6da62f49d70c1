mod cache;
mod canvas;
mod debug;
mod error;
mod expr;
mod finalize;
mod loops;
mod metrics;
mod overlay;
mod page_template;
mod pdf;
mod pdfinspect;
mod perf;
mod plan;
mod template;
#[cfg(test)]
mod test_support;
mod types;
mod value;

pub use cache::{
    CacheEntry, CacheIndex, DEFAULT_TTL, Extraction, ExtractionCache, ExtractionCacheBuilder,
    ExtractionSource, MemoryCacheIndex, RecordPageMap, cache_key,
};
pub use canvas::{Canvas, Command, Overlay};
use debug::DebugLogger;
pub use error::StampaError;
pub use expr::{Expression, Path, Segment, Term, evaluate, format_value};
pub use finalize::{ComposeSummary, ComposedPage, compose_pages, extract_pages};
pub use loops::{BoundMapping, LoopRegion, MappingKind, WILDCARD_MARKER, classify_expression};
pub use metrics::{PageMetrics, RenderMetrics};
pub use overlay::{META_ROLE_KEY, META_ROW_KEY, render_overlay, to_document_x, to_document_y};
pub use page_template::{PagePrototype, PrototypeTable, TemplateDocument};
pub use pdf::{EncodeStats, OVERLAY_FONT_RESOURCE, encode_overlay, encode_overlay_with_stats};
pub use pdfinspect::{
    PdfInspectError, PdfInspectErrorCode, PdfInspectReport, inspect_pdf_bytes, inspect_pdf_path,
    require_composable,
};
use perf::PerfLogger;
pub use plan::{BOTTOM_MARGIN, PageInstance, RenderPlan, items_per_page, plan_pages};
pub use template::{
    DEFAULT_FONT_SIZE, FieldMapping, MergeMode, PageRole, PageSelector, PreparedTemplate,
    TemplateDefinition,
};
pub use types::{Pt, Size};
pub use value::{DataRecord, Value};

use serde_json::json;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_ROW_PITCH: f32 = 20.0;

/// Merged output: one PDF holding every record's pages in caller order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    /// Pages produced by each record, indexed like the input records.
    pub record_pages: Vec<Range<usize>>,
}

impl GeneratedDocument {
    /// Views this document as a source for per-recipient extraction.
    /// `record_ids` names the input records, in input order.
    pub fn extraction_source<'a>(
        &'a self,
        identity: &'a str,
        record_ids: &'a [String],
    ) -> ExtractionSource<'a> {
        ExtractionSource {
            identity,
            bytes: &self.bytes,
            record_ids,
            record_pages: Some(&self.record_pages),
        }
    }
}

pub struct MergeEngine {
    bottom_margin: Pt,
    default_row_pitch: Pt,
    parallel: bool,
    debug: Option<Arc<DebugLogger>>,
    perf: Option<Arc<PerfLogger>>,
}

#[derive(Clone)]
pub struct MergeEngineBuilder {
    bottom_margin: f32,
    default_row_pitch: f32,
    parallel: bool,
    debug_path: Option<PathBuf>,
    perf_enabled: bool,
    perf_path: Option<PathBuf>,
}

impl Default for MergeEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeEngineBuilder {
    pub fn new() -> Self {
        Self {
            bottom_margin: BOTTOM_MARGIN,
            default_row_pitch: DEFAULT_ROW_PITCH,
            parallel: true,
            debug_path: None,
            perf_enabled: false,
            perf_path: None,
        }
    }

    // Space kept free below the last loop row.
    pub fn bottom_margin(mut self, margin: f32) -> Self {
        self.bottom_margin = margin;
        self
    }

    // Row pitch for loop mappings when neither the mapping nor the template sets one.
    pub fn default_row_pitch(mut self, pitch: f32) -> Self {
        self.default_row_pitch = pitch;
        self
    }

    // Fan records out on the rayon pool. Output is identical either way.
    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    // Enable debug logging to a JSONL file.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    // Enable performance logging to a JSONL file for timing/counter inspection.
    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_enabled = true;
        self.perf_path = Some(path.into());
        self
    }

    // Toggle performance logging (uses default file when enabled and no path is set).
    pub fn perf_enabled(mut self, enabled: bool) -> Self {
        self.perf_enabled = enabled;
        self
    }

    pub fn build(self) -> Result<MergeEngine, StampaError> {
        if !self.bottom_margin.is_finite() || self.bottom_margin < 0.0 {
            return Err(StampaError::InvalidConfiguration(
                "bottom_margin must be finite and >= 0".to_string(),
            ));
        }
        if !self.default_row_pitch.is_finite() || self.default_row_pitch <= 0.0 {
            return Err(StampaError::InvalidConfiguration(
                "default_row_pitch must be finite and > 0".to_string(),
            ));
        }
        let debug = if let Some(path) = self.debug_path {
            Some(Arc::new(DebugLogger::new(path)?))
        } else {
            None
        };
        let perf = if self.perf_enabled || self.perf_path.is_some() {
            let path = self
                .perf_path
                .unwrap_or_else(|| PathBuf::from(perf::DEFAULT_PERF_LOG));
            Some(Arc::new(PerfLogger::new(path)?))
        } else {
            None
        };
        Ok(MergeEngine {
            bottom_margin: Pt::from_f32(self.bottom_margin),
            default_row_pitch: Pt::from_f32(self.default_row_pitch),
            parallel: self.parallel,
            debug,
            perf,
        })
    }
}

// One record's share of the output, produced independently of the others.
struct RecordPages {
    pages: Vec<ComposedPage>,
    rows: usize,
}

// Every composed page of a batch with what composition reported about it.
struct RenderedBatch {
    pages: Vec<ComposedPage>,
    summary: ComposeSummary,
}

impl MergeEngine {
    pub fn builder() -> MergeEngineBuilder {
        MergeEngineBuilder::new()
    }

    /// Validates the template document and classifies every mapping. Done
    /// once; the result is reused across renders.
    pub fn prepare(
        &self,
        definition: &TemplateDefinition,
        template_pdf: impl Into<Vec<u8>>,
    ) -> Result<PreparedTemplate, StampaError> {
        let started = Instant::now();
        let document = TemplateDocument::from_bytes(template_pdf)?;
        let table = document.table();
        for role in [PageRole::Last, PageRole::Intermediate] {
            if table.is_fallback(role) {
                self.log_event(
                    "stampa.prototype_fallback",
                    json!({
                        "role": role.as_str(),
                        "prototype_index": table.index_for(role),
                        "template_pages": document.prototypes().len(),
                    }),
                );
            }
        }
        let prepared = PreparedTemplate::new(definition, document, self.default_row_pitch)?;
        self.log_span("template.load", None, started);
        Ok(prepared)
    }

    /// Page instances a cumulative render of `record` produces.
    pub fn plan(&self, template: &PreparedTemplate, record: &Value) -> RenderPlan {
        let Some(region) = template.loop_region() else {
            return plan_pages(0, 1);
        };
        let total = region.resolve_items(record).len();
        let page_height = template.document().prototype_for(PageRole::First).page_size.height;
        let k = items_per_page(
            page_height,
            region.anchor_y(),
            self.bottom_margin,
            region.row_pitch(),
        );
        plan_pages(total, k)
    }

    pub fn render(
        &self,
        template: &PreparedTemplate,
        record: &Value,
    ) -> Result<GeneratedDocument, StampaError> {
        self.render_batch(template, std::slice::from_ref(record))
    }

    /// Renders every record according to the template's merge mode and
    /// concatenates the pages in caller order.
    pub fn render_batch(
        &self,
        template: &PreparedTemplate,
        records: &[Value],
    ) -> Result<GeneratedDocument, StampaError> {
        let (document, _) = self.render_inner(template, records)?;
        self.emit_debug_summary("render");
        Ok(document)
    }

    pub fn render_with_metrics(
        &self,
        template: &PreparedTemplate,
        records: &[Value],
    ) -> Result<(GeneratedDocument, RenderMetrics), StampaError> {
        let started = Instant::now();
        let (document, rendered) = self.render_inner(template, records)?;
        let page_metrics: Vec<PageMetrics> = rendered
            .pages
            .iter()
            .zip(rendered.summary.overlays.iter())
            .enumerate()
            .map(|(idx, (page, stats))| PageMetrics::from_overlay(idx + 1, &page.overlay, stats))
            .collect();
        let total_ms = started.elapsed().as_secs_f64() * 1000.0;
        let metrics = RenderMetrics::from_pages(page_metrics, total_ms, document.bytes.len());
        self.emit_debug_summary("render_with_metrics");
        Ok((document, metrics))
    }

    fn render_inner(
        &self,
        template: &PreparedTemplate,
        records: &[Value],
    ) -> Result<(GeneratedDocument, RenderedBatch), StampaError> {
        use rayon::prelude::*;

        if records.is_empty() {
            return Err(StampaError::EmptyRecordSet);
        }
        let started = Instant::now();

        let mut slots: Vec<Option<RecordPages>> = (0..records.len()).map(|_| None).collect();
        let fill = |(record_id, (slot, record)): (usize, (&mut Option<RecordPages>, &Value))| {
            *slot = Some(self.render_record(template, record_id, record));
        };
        if self.parallel {
            slots
                .par_iter_mut()
                .zip(records.par_iter())
                .enumerate()
                .for_each(fill);
        } else {
            slots
                .iter_mut()
                .zip(records.iter())
                .enumerate()
                .for_each(fill);
        }

        let mut pages = Vec::new();
        let mut record_pages = Vec::with_capacity(records.len());
        let mut total_rows = 0usize;
        for slot in slots {
            let Some(rendered) = slot else {
                return Err(StampaError::InvalidConfiguration(
                    "record slot left unfilled".to_string(),
                ));
            };
            let start = pages.len();
            pages.extend(rendered.pages);
            record_pages.push(start..pages.len());
            total_rows += rendered.rows;
        }

        let t_compose = Instant::now();
        let (bytes, summary) = compose_pages(template.document(), &pages)?;
        self.log_span("compose", None, t_compose);
        if let Some(perf) = self.perf.as_deref() {
            perf.log_counts(
                "batch",
                None,
                &[
                    ("records", records.len() as u64),
                    ("pages", summary.pages_written as u64),
                    ("forms", summary.forms_written as u64),
                    ("rows", total_rows as u64),
                    (
                        "replaced_chars",
                        summary
                            .overlays
                            .iter()
                            .map(|stats| stats.replaced_chars as u64)
                            .sum::<u64>(),
                    ),
                    ("bytes", bytes.len() as u64),
                ],
            );
        }
        self.log_span("batch", None, started);

        Ok((
            GeneratedDocument {
                bytes,
                page_count: summary.pages_written,
                record_pages,
            },
            RenderedBatch { pages, summary },
        ))
    }

    fn render_record(&self, template: &PreparedTemplate, record_id: usize, record: &Value) -> RecordPages {
        let t_plan = Instant::now();
        let all_items = template
            .loop_region()
            .map(|region| region.resolve_items(record))
            .unwrap_or(&[]);
        let (plan, items) = match template.merge_mode() {
            MergeMode::CumulativeMultiPage => (self.plan(template, record), all_items),
            // One page per record: a record-scoped view sees at most one item.
            MergeMode::OnePagePerRecord => {
                let items = &all_items[..all_items.len().min(1)];
                (plan_pages(items.len(), 1), items)
            }
        };
        self.log_span("plan", Some(record_id), t_plan);
        self.log_event(
            "stampa.plan",
            json!({
                "record_id": record_id,
                "items": items.len(),
                "items_per_page": plan.items_per_page,
                "pages": plan.pages.iter().map(|p| p.role.as_str()).collect::<Vec<_>>(),
            }),
        );

        let t_overlay = Instant::now();
        let table = template.document().table();
        let pages: Vec<ComposedPage> = plan
            .pages
            .iter()
            .map(|instance| ComposedPage {
                prototype_index: table.index_for(instance.role),
                overlay: render_overlay(template, instance, record, items),
            })
            .collect();
        self.log_span("overlay", Some(record_id), t_overlay);

        RecordPages {
            pages,
            rows: plan.total_items(),
        }
    }

    fn log_event(&self, event: &str, fields: serde_json::Value) {
        if let Some(logger) = self.debug.as_deref() {
            logger.increment(event, 1);
            logger.event(event, fields);
        }
    }

    fn log_span(&self, name: &str, record_id: Option<usize>, started: Instant) {
        if let Some(perf) = self.perf.as_deref() {
            perf.log_span_ms(name, record_id, started.elapsed().as_secs_f64() * 1000.0);
        }
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = self.debug.as_deref() {
            logger.emit_summary(context);
            logger.flush();
        }
        if let Some(perf) = self.perf.as_deref() {
            perf.flush();
        }
    }
}
