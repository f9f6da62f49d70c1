use crate::error::StampaError;
use crate::expr::{Expression, Path, Term};
use crate::template::{PageRole, TemplateDefinition};
use crate::types::Pt;
use crate::value::Value;

pub const WILDCARD_MARKER: &str = "[*]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingKind {
    Scalar(Expression),
    Loop {
        array_path: String,
        sub_expression: Expression,
    },
}

/// A field mapping after load-time classification, in layout units.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundMapping {
    pub role: PageRole,
    pub x: Pt,
    pub y: Pt,
    pub font_size: Pt,
    pub row_pitch: Pt,
    pub kind: MappingKind,
}

impl BoundMapping {
    pub fn is_loop(&self) -> bool {
        matches!(self.kind, MappingKind::Loop { .. })
    }
}

/// The single repeating region of a template.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopRegion {
    array_path: String,
    path: Path,
    row_pitch: Pt,
    anchor_y: Pt,
}

impl LoopRegion {
    pub fn array_path(&self) -> &str {
        &self.array_path
    }

    pub fn row_pitch(&self) -> Pt {
        self.row_pitch
    }

    /// Editor y of the topmost loop row on the first page.
    pub fn anchor_y(&self) -> Pt {
        self.anchor_y
    }

    pub fn resolve_items<'a>(&self, record: &'a Value) -> &'a [Value] {
        self.path
            .resolve(record)
            .and_then(Value::as_list)
            .unwrap_or(&[])
    }
}

/// Classifies an expression by its parsed path terms. The first path with a
/// `[*]` names the array; every `<array>[*]...` path is rebased onto `$` so the
/// rest evaluates against one element. Literal text is never inspected.
pub fn classify_expression(expression: &str) -> Result<MappingKind, StampaError> {
    let parsed = Expression::parse(expression);

    if let Some(raw) = parsed.terms().iter().find_map(|term| match term {
        Term::Unresolvable(raw) if raw.contains(WILDCARD_MARKER) => Some(raw),
        _ => None,
    }) {
        return Err(StampaError::InvalidMapping(format!(
            "malformed loop array path {:?} in {}",
            raw, expression
        )));
    }

    let Some(array) = parsed.terms().iter().find_map(|term| match term {
        Term::Path(path) => path.wildcard_prefix(),
        _ => None,
    }) else {
        return Ok(MappingKind::Scalar(parsed));
    };

    let mut terms = Vec::with_capacity(parsed.terms().len());
    for term in parsed.terms() {
        let term = match term {
            Term::Path(path) if path.has_wildcard() => {
                let element = path
                    .element_path(&array)
                    .filter(|element| !element.has_wildcard())
                    .ok_or_else(|| {
                        StampaError::InvalidMapping(format!(
                            "expression binds more than one array: {}",
                            expression
                        ))
                    })?;
                Term::Path(element)
            }
            other => other.clone(),
        };
        terms.push(term);
    }

    Ok(MappingKind::Loop {
        array_path: array.to_string(),
        sub_expression: Expression::from_terms(terms, parsed.is_concatenated()),
    })
}

pub(crate) fn bind_mappings(
    definition: &TemplateDefinition,
    default_row_pitch: Pt,
) -> Result<(Vec<BoundMapping>, Option<LoopRegion>), StampaError> {
    let template_pitch = definition.row_pitch.map(Pt::from_f32);
    let mut mappings = Vec::with_capacity(definition.fields.len());
    let mut region: Option<LoopRegion> = None;

    for (idx, field) in definition.fields.iter().enumerate() {
        if !field.x.is_finite() || !field.y.is_finite() || !field.font_size.is_finite() {
            return Err(StampaError::InvalidMapping(format!(
                "field {} has non-finite coordinates or font size",
                idx
            )));
        }
        let role = field.page.role()?;
        let row_pitch = field
            .row_pitch
            .map(Pt::from_f32)
            .or(template_pitch)
            .unwrap_or(default_row_pitch);
        let kind = classify_expression(&field.expression)?;

        if let MappingKind::Loop { array_path, .. } = &kind {
            match &region {
                Some(existing) if existing.array_path != *array_path => {
                    return Err(StampaError::LoopPathConflict {
                        expected: existing.array_path.clone(),
                        found: array_path.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    // Checked parseable by classify_expression.
                    let path = Path::parse(array_path).unwrap_or_default();
                    region = Some(LoopRegion {
                        array_path: array_path.clone(),
                        path,
                        row_pitch: template_pitch.unwrap_or(row_pitch),
                        anchor_y: Pt::from_f32(field.y),
                    });
                }
            }
        }

        mappings.push(BoundMapping {
            role,
            x: Pt::from_f32(field.x),
            y: Pt::from_f32(field.y),
            font_size: Pt::from_f32(field.font_size),
            row_pitch,
            kind,
        });
    }

    if let Some(region) = region.as_mut() {
        let first_page_rows = mappings
            .iter()
            .filter(|m| m.is_loop() && m.role == PageRole::First);
        let any_rows = mappings.iter().filter(|m| m.is_loop());
        let anchor = first_page_rows
            .map(|m| m.y)
            .reduce(|a, b| if b < a { b } else { a })
            .or_else(|| any_rows.map(|m| m.y).reduce(|a, b| if b < a { b } else { a }));
        if let Some(anchor) = anchor {
            region.anchor_y = anchor;
        }
        if region.row_pitch <= Pt::ZERO {
            return Err(StampaError::InvalidMapping(format!(
                "loop row pitch must be positive for {}",
                region.array_path
            )));
        }
    }

    Ok((mappings, region))
}
