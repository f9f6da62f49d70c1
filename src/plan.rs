use crate::template::PageRole;
use crate::types::Pt;
use std::ops::Range;

/// Space kept free below the last loop row, in layout units.
pub const BOTTOM_MARGIN: f32 = 50.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInstance {
    pub role: PageRole,
    pub items: Range<usize>,
}

impl PageInstance {
    pub fn new(role: PageRole, items: Range<usize>) -> Self {
        Self { role, items }
    }

    pub fn row_count(&self) -> usize {
        self.items.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderPlan {
    pub items_per_page: usize,
    pub pages: Vec<PageInstance>,
}

impl RenderPlan {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn total_items(&self) -> usize {
        self.pages.iter().map(PageInstance::row_count).sum()
    }
}

/// `floor((page_height - anchor_y - bottom_margin) / row_pitch)`, never below 1.
/// Computed on milli-point integers so the split is exact.
pub fn items_per_page(page_height: Pt, anchor_y: Pt, bottom_margin: Pt, row_pitch: Pt) -> usize {
    let pitch = row_pitch.to_milli_i64();
    if pitch <= 0 {
        return 1;
    }
    let available =
        page_height.to_milli_i64() - anchor_y.to_milli_i64() - bottom_margin.to_milli_i64();
    if available <= 0 {
        return 1;
    }
    ((available / pitch) as usize).max(1)
}

pub fn plan_pages(total: usize, items_per_page: usize) -> RenderPlan {
    let k = items_per_page.max(1);
    let mut pages = Vec::new();

    if total <= k {
        pages.push(PageInstance::new(PageRole::First, 0..total));
    } else if total <= 2 * k {
        pages.push(PageInstance::new(PageRole::First, 0..k));
        pages.push(PageInstance::new(PageRole::Last, k..total));
    } else {
        // An exact multiple keeps a full last page rather than an empty one.
        let last_count = match total % k {
            0 => k,
            rem => rem,
        };
        let intermediate = (total - k - last_count).div_ceil(k);
        pages.push(PageInstance::new(PageRole::First, 0..k));
        let mut start = k;
        for _ in 0..intermediate {
            pages.push(PageInstance::new(PageRole::Intermediate, start..start + k));
            start += k;
        }
        pages.push(PageInstance::new(PageRole::Last, start..total));
    }

    RenderPlan {
        items_per_page: k,
        pages,
    }
}
