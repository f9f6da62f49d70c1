use crate::canvas::{Canvas, Overlay};
use crate::loops::MappingKind;
use crate::plan::PageInstance;
use crate::template::{PageRole, PreparedTemplate};
use crate::types::Pt;
use crate::value::Value;

pub const META_ROW_KEY: &str = "stampa.row";
pub const META_ROLE_KEY: &str = "stampa.role";

/// Editor coordinates grow downward from the top edge of the page box; PDF
/// coordinates grow upward. This is the only place the flip happens.
pub fn to_document_y(top_edge: Pt, editor_y: Pt) -> Pt {
    top_edge - editor_y
}

/// Editor x is measured from the left edge of the page box.
pub fn to_document_x(left_edge: Pt, editor_x: Pt) -> Pt {
    left_edge + editor_x
}

/// Draws one page instance. `items` is the full bound array; the instance
/// selects its slice.
pub fn render_overlay(
    template: &PreparedTemplate,
    instance: &PageInstance,
    record: &Value,
    items: &[Value],
) -> Overlay {
    let prototype = template.document().prototype_for(instance.role);
    let (left, top) = (prototype.left(), prototype.top());
    let mut canvas = Canvas::new(prototype.page_size);
    canvas.meta(META_ROLE_KEY, instance.role.as_str());

    if instance.role != PageRole::Intermediate {
        for mapping in template.scalar_mappings_for(instance.role) {
            let MappingKind::Scalar(expression) = &mapping.kind else {
                continue;
            };
            let text = expression.evaluate(record);
            if text.is_empty() {
                continue;
            }
            canvas.set_font_size(mapping.font_size);
            canvas.draw_string(
                to_document_x(left, mapping.x),
                to_document_y(top, mapping.y),
                text,
            );
        }
    }

    let start = instance.items.start.min(items.len());
    let end = instance.items.end.min(items.len());
    let slice = &items[start..end];
    let loop_mappings = template.loop_mappings_for(instance.role);

    for (row, item) in slice.iter().enumerate() {
        canvas.meta(META_ROW_KEY, (start + row).to_string());
        for mapping in &loop_mappings {
            let MappingKind::Loop { sub_expression, .. } = &mapping.kind else {
                continue;
            };
            let text = sub_expression.evaluate(item);
            if text.is_empty() {
                continue;
            }
            let y = to_document_y(top, mapping.y) - mapping.row_pitch * row as i32;
            canvas.set_font_size(mapping.font_size);
            canvas.draw_string(to_document_x(left, mapping.x), y, text);
        }
    }

    canvas.finish()
}
