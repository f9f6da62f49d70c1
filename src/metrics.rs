use crate::canvas::Overlay;
use crate::overlay::{META_ROLE_KEY, META_ROW_KEY};
use crate::pdf::EncodeStats;
use crate::template::PageRole;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetrics {
    pub page_number: usize,
    pub role: Option<PageRole>,
    pub rows: usize,
    pub command_count: usize,
    pub content_bytes: usize,
    /// Characters the overlay font could not encode.
    pub replaced_chars: usize,
}

impl PageMetrics {
    /// Reads the role and row markers the overlay renderer leaves behind;
    /// sizes come from the encoding done at composition.
    pub(crate) fn from_overlay(page_number: usize, overlay: &Overlay, stats: &EncodeStats) -> Self {
        let role = overlay
            .meta_values(META_ROLE_KEY)
            .next()
            .and_then(|value| match value {
                "first" => Some(PageRole::First),
                "last" => Some(PageRole::Last),
                "intermediate" => Some(PageRole::Intermediate),
                _ => None,
            });
        Self {
            page_number,
            role,
            rows: overlay.meta_values(META_ROW_KEY).count(),
            command_count: overlay.commands.len(),
            content_bytes: stats.bytes,
            replaced_chars: stats.replaced_chars,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderMetrics {
    pub pages: Vec<PageMetrics>,
    pub total_rows: usize,
    pub total_ms: f64,
    pub total_bytes: usize,
}

impl RenderMetrics {
    pub(crate) fn from_pages(pages: Vec<PageMetrics>, total_ms: f64, total_bytes: usize) -> Self {
        let total_rows = pages.iter().map(|page| page.rows).sum();
        Self {
            pages,
            total_rows,
            total_ms,
            total_bytes,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::types::{Pt, Size};

    #[test]
    fn page_metrics_count_row_markers() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.meta(META_ROLE_KEY, "last");
        canvas.meta(META_ROW_KEY, "4");
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "a");
        canvas.meta(META_ROW_KEY, "5");
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "b");
        let overlay = canvas.finish();

        let stats = EncodeStats {
            strings: 2,
            replaced_chars: 1,
            bytes: 120,
        };
        let page = PageMetrics::from_overlay(3, &overlay, &stats);
        assert_eq!(page.role, Some(PageRole::Last));
        assert_eq!(page.rows, 2);
        assert_eq!(page.command_count, 5);
        assert_eq!(page.content_bytes, 120);
        assert_eq!(page.replaced_chars, 1);

        let totals = RenderMetrics::from_pages(vec![page.clone(), page], 1.5, 900);
        assert_eq!(totals.total_rows, 4);
        assert_eq!(totals.page_count(), 2);
    }
}
