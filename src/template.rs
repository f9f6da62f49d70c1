use crate::error::StampaError;
use crate::loops::{BoundMapping, LoopRegion, MappingKind, bind_mappings};
use crate::page_template::TemplateDocument;
use crate::types::Pt;
use serde::Deserialize;

pub const DEFAULT_FONT_SIZE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageRole {
    First,
    Last,
    Intermediate,
}

impl PageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageRole::First => "first",
            PageRole::Last => "last",
            PageRole::Intermediate => "intermediate",
        }
    }

    // Template documents carry prototypes at 0 (first), 1 (last), 2 (intermediate).
    pub fn from_prototype_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(PageRole::First),
            1 => Some(PageRole::Last),
            2 => Some(PageRole::Intermediate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PageSelector {
    Role(PageRole),
    Index(usize),
}

impl Default for PageSelector {
    fn default() -> Self {
        PageSelector::Role(PageRole::First)
    }
}

impl PageSelector {
    pub fn role(&self) -> Result<PageRole, StampaError> {
        match self {
            PageSelector::Role(role) => Ok(*role),
            PageSelector::Index(index) => PageRole::from_prototype_index(*index).ok_or_else(|| {
                StampaError::InvalidMapping(format!(
                    "page index {} has no prototype role (allowed 0..2)",
                    index
                ))
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeMode {
    OnePagePerRecord,
    #[default]
    CumulativeMultiPage,
}

fn default_font_size() -> f32 {
    DEFAULT_FONT_SIZE
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldMapping {
    pub expression: String,
    #[serde(default, rename = "page")]
    pub page: PageSelector,
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default)]
    pub row_pitch: Option<f32>,
}

impl FieldMapping {
    pub fn new(expression: impl Into<String>, role: PageRole, x: f32, y: f32) -> Self {
        Self {
            expression: expression.into(),
            page: PageSelector::Role(role),
            x,
            y,
            font_size: DEFAULT_FONT_SIZE,
            row_pitch: None,
        }
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.page = PageSelector::Index(index);
        self
    }

    pub fn with_font_size(mut self, font_size: f32) -> Self {
        self.font_size = font_size;
        self
    }

    pub fn with_row_pitch(mut self, row_pitch: f32) -> Self {
        self.row_pitch = Some(row_pitch);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct TemplateDefinition {
    #[serde(default)]
    pub merge_mode: MergeMode,
    #[serde(default)]
    pub row_pitch: Option<f32>,
    #[serde(default)]
    pub fields: Vec<FieldMapping>,
}

impl TemplateDefinition {
    pub fn new(merge_mode: MergeMode) -> Self {
        Self {
            merge_mode,
            row_pitch: None,
            fields: Vec::new(),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, StampaError> {
        serde_json::from_str(raw).map_err(|err| {
            StampaError::InvalidConfiguration(format!("template definition: {err}"))
        })
    }

    pub fn with_row_pitch(mut self, row_pitch: f32) -> Self {
        self.row_pitch = Some(row_pitch);
        self
    }

    pub fn field(mut self, mapping: FieldMapping) -> Self {
        self.fields.push(mapping);
        self
    }
}

/// A template whose mappings have been classified and whose document has been
/// validated. Immutable and shareable across render workers.
#[derive(Debug, Clone)]
pub struct PreparedTemplate {
    merge_mode: MergeMode,
    mappings: Vec<BoundMapping>,
    loop_region: Option<LoopRegion>,
    document: TemplateDocument,
}

impl PreparedTemplate {
    pub(crate) fn new(
        definition: &TemplateDefinition,
        document: TemplateDocument,
        default_row_pitch: Pt,
    ) -> Result<Self, StampaError> {
        let (mappings, loop_region) = bind_mappings(definition, default_row_pitch)?;
        Ok(Self {
            merge_mode: definition.merge_mode,
            mappings,
            loop_region,
            document,
        })
    }

    pub fn merge_mode(&self) -> MergeMode {
        self.merge_mode
    }

    pub fn mappings(&self) -> &[BoundMapping] {
        &self.mappings
    }

    pub fn loop_region(&self) -> Option<&LoopRegion> {
        self.loop_region.as_ref()
    }

    pub fn document(&self) -> &TemplateDocument {
        &self.document
    }

    pub fn scalar_mappings_for(&self, role: PageRole) -> impl Iterator<Item = &BoundMapping> {
        self.mappings
            .iter()
            .filter(move |m| m.role == role && matches!(m.kind, MappingKind::Scalar(_)))
    }

    /// Loop mappings drawn on a page of `role`. A role without its own loop
    /// mappings borrows those of the first role that declares any, in the
    /// order first, intermediate, last.
    pub fn loop_mappings_for(&self, role: PageRole) -> Vec<&BoundMapping> {
        let own = self.declared_loop_mappings(role);
        if !own.is_empty() {
            return own;
        }
        [PageRole::First, PageRole::Intermediate, PageRole::Last]
            .into_iter()
            .map(|fallback| self.declared_loop_mappings(fallback))
            .find(|mappings| !mappings.is_empty())
            .unwrap_or_default()
    }

    fn declared_loop_mappings(&self, role: PageRole) -> Vec<&BoundMapping> {
        self.mappings
            .iter()
            .filter(|m| m.role == role && m.is_loop())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_loads_from_json() {
        let raw = r#"{
            "merge_mode": "one-page-per-record",
            "row_pitch": 18,
            "fields": [
                {"expression": "$.delegato.nome", "page": "first", "x": 100, "y": 120},
                {"expression": "$.designazioni[*].cognome", "page": 2, "x": 60, "y": 650, "font_size": 9, "row_pitch": 22.5},
                {"expression": "'Firma'", "x": 300, "y": 780}
            ]
        }"#;
        let definition = TemplateDefinition::from_json_str(raw).expect("definition");
        assert_eq!(definition.merge_mode, MergeMode::OnePagePerRecord);
        assert_eq!(definition.row_pitch, Some(18.0));
        assert_eq!(definition.fields.len(), 3);
        assert_eq!(definition.fields[0].page, PageSelector::Role(PageRole::First));
        assert_eq!(definition.fields[0].font_size, DEFAULT_FONT_SIZE);
        assert_eq!(definition.fields[1].page, PageSelector::Index(2));
        assert_eq!(definition.fields[1].row_pitch, Some(22.5));
        assert_eq!(definition.fields[2].page, PageSelector::default());
    }

    #[test]
    fn merge_mode_defaults_to_cumulative() {
        let definition = TemplateDefinition::from_json_str(r#"{"fields": []}"#).expect("definition");
        assert_eq!(definition.merge_mode, MergeMode::CumulativeMultiPage);
    }

    #[test]
    fn malformed_definition_is_a_configuration_error() {
        let err = TemplateDefinition::from_json_str(r#"{"fields": [{"x": 1}]}"#)
            .expect_err("missing expression");
        assert!(err.to_string().contains("template definition"));
    }

    #[test]
    fn page_indices_normalise_to_roles() {
        assert_eq!(PageSelector::Index(0).role().expect("first"), PageRole::First);
        assert_eq!(PageSelector::Index(1).role().expect("last"), PageRole::Last);
        assert_eq!(
            PageSelector::Index(2).role().expect("intermediate"),
            PageRole::Intermediate
        );
        let err = PageSelector::Index(3).role().expect_err("out of range");
        assert!(err.to_string().contains("page index 3"));
    }
}
