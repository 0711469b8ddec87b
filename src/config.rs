use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GridfitError;
use crate::grid::ColumnGrid;
use crate::types::{ColorSpace, Margins, Size};

/// Page geometry and layout thresholds, fixed for the lifetime of a
/// [`crate::Typesetter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    page_width_pt: f32,
    page_height_pt: f32,
    /// top, right, bottom, left
    margins_pt: [f32; 4],
    column_count: usize,
    gutter_width_pt: f32,
    tolerance_factor: f32,
    /// Omitted span fields follow `column_count`: a third, two thirds, and
    /// the regular span for the subgrid.
    #[serde(skip_serializing_if = "Option::is_none")]
    regular_columns: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extended_columns: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subgrid_columns: Option<usize>,
    align_tables_to_subgrid: bool,
    float_max_width_ratio: f32,
    float_text_ratio: f32,
    min_float_height_pt: f32,
    max_two_col_float_height_pt: f32,
    float_end_tags: Vec<String>,
    debug_highlight: bool,
    color_space: ColorSpace,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            page_width_pt: 595.0,
            page_height_pt: 842.0,
            margins_pt: [40.0, 40.0, 60.0, 40.0],
            column_count: 12,
            gutter_width_pt: 16.0,
            tolerance_factor: 1.1,
            regular_columns: None,
            extended_columns: None,
            subgrid_columns: None,
            align_tables_to_subgrid: false,
            float_max_width_ratio: 0.7,
            float_text_ratio: 0.5,
            min_float_height_pt: 120.0,
            max_two_col_float_height_pt: 360.0,
            float_end_tags: vec!["h1".to_string(), "table".to_string(), "hr".to_string()],
            debug_highlight: false,
            color_space: ColorSpace::Rgb,
        }
    }
}

impl LayoutConfig {
    pub fn builder() -> LayoutConfigBuilder {
        LayoutConfigBuilder::new()
    }

    /// Start a builder from this config, e.g. to layer command line
    /// overrides over a file.
    pub fn into_builder(self) -> LayoutConfigBuilder {
        LayoutConfigBuilder { config: self }
    }

    pub fn from_json_str(json: &str) -> Result<Self, GridfitError> {
        let config: LayoutConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, GridfitError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn page_size(&self) -> Size {
        Size::new(self.page_width_pt, self.page_height_pt)
    }

    pub fn margins(&self) -> Margins {
        let [top, right, bottom, left] = self.margins_pt;
        Margins::new(top, right, bottom, left)
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn gutter_width_pt(&self) -> f32 {
        self.gutter_width_pt
    }

    pub fn tolerance_factor(&self) -> f32 {
        self.tolerance_factor
    }

    pub fn regular_columns(&self) -> usize {
        self.regular_columns
            .unwrap_or((self.column_count / 3).max(1))
    }

    pub fn extended_columns(&self) -> usize {
        self.extended_columns
            .unwrap_or((self.column_count * 2 / 3).max(self.regular_columns()))
    }

    pub fn subgrid_columns(&self) -> usize {
        self.subgrid_columns.unwrap_or(self.regular_columns())
    }

    pub fn align_tables_to_subgrid(&self) -> bool {
        self.align_tables_to_subgrid
    }

    pub fn float_max_width_ratio(&self) -> f32 {
        self.float_max_width_ratio
    }

    pub fn float_text_ratio(&self) -> f32 {
        self.float_text_ratio
    }

    pub fn min_float_height_pt(&self) -> f32 {
        self.min_float_height_pt
    }

    pub fn max_two_col_float_height_pt(&self) -> f32 {
        self.max_two_col_float_height_pt
    }

    pub fn is_float_end_tag(&self, tag: &str) -> bool {
        self.float_end_tags
            .iter()
            .any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn debug_highlight(&self) -> bool {
        self.debug_highlight
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    /// Derive the column grid. Valid configs always produce a grid.
    pub fn grid(&self) -> Result<ColumnGrid, GridfitError> {
        let [_, right, _, left] = self.margins_pt;
        ColumnGrid::new(
            self.page_width_pt,
            left,
            right,
            self.column_count,
            self.gutter_width_pt,
            self.tolerance_factor,
        )
    }

    fn validate(&self) -> Result<(), GridfitError> {
        let invalid = |msg: String| Err(GridfitError::InvalidConfiguration(msg));
        if !(self.page_width_pt > 0.0 && self.page_height_pt > 0.0) {
            return invalid(format!(
                "page size must be positive (got {}x{})",
                self.page_width_pt, self.page_height_pt
            ));
        }
        if self.margins_pt.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return invalid("margins must be finite and >= 0".to_string());
        }
        if self.column_count == 0 {
            return invalid("column_count must be >= 1".to_string());
        }
        let (regular, extended) = (self.regular_columns(), self.extended_columns());
        if !(1..=self.column_count).contains(&regular)
            || !(regular..=self.column_count).contains(&extended)
        {
            return invalid(format!(
                "require 1 <= regular_columns <= extended_columns <= column_count (got {regular} / {extended} / {})",
                self.column_count
            ));
        }
        if !(1..=self.column_count).contains(&self.subgrid_columns()) {
            return invalid(format!(
                "subgrid_columns must be within 1..={} (got {})",
                self.column_count,
                self.subgrid_columns()
            ));
        }
        if !(self.gutter_width_pt.is_finite() && self.gutter_width_pt >= 0.0) {
            return invalid("gutter_width_pt must be >= 0".to_string());
        }
        if !(self.tolerance_factor.is_finite() && self.tolerance_factor >= 1.0) {
            return invalid("tolerance_factor must be >= 1".to_string());
        }
        for (name, ratio) in [
            ("float_max_width_ratio", self.float_max_width_ratio),
            ("float_text_ratio", self.float_text_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return invalid(format!("{name} must be within (0, 1] (got {ratio})"));
            }
        }
        if !(self.min_float_height_pt > 0.0 && self.max_two_col_float_height_pt > 0.0) {
            return invalid("float height thresholds must be > 0".to_string());
        }
        self.grid().map(|_| ())
    }
}

#[derive(Debug, Clone)]
pub struct LayoutConfigBuilder {
    config: LayoutConfig,
}

impl Default for LayoutConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LayoutConfig::default(),
        }
    }

    pub fn page_size(mut self, width_pt: f32, height_pt: f32) -> Self {
        self.config.page_width_pt = width_pt;
        self.config.page_height_pt = height_pt;
        self
    }

    pub fn margins(mut self, top: f32, right: f32, bottom: f32, left: f32) -> Self {
        self.config.margins_pt = [top, right, bottom, left];
        self
    }

    pub fn columns(mut self, count: usize, gutter_width_pt: f32) -> Self {
        self.config.column_count = count;
        self.config.gutter_width_pt = gutter_width_pt;
        self
    }

    pub fn tolerance_factor(mut self, factor: f32) -> Self {
        self.config.tolerance_factor = factor;
        self
    }

    // Spans (in grid columns) of one text column and of two text columns.
    pub fn text_column_spans(mut self, regular: usize, extended: usize) -> Self {
        self.config.regular_columns = Some(regular);
        self.config.extended_columns = Some(extended);
        self
    }

    pub fn subgrid_columns(mut self, columns: usize) -> Self {
        self.config.subgrid_columns = Some(columns);
        self
    }

    pub fn align_tables_to_subgrid(mut self, enabled: bool) -> Self {
        self.config.align_tables_to_subgrid = enabled;
        self
    }

    pub fn float_ratios(mut self, max_width_ratio: f32, text_ratio: f32) -> Self {
        self.config.float_max_width_ratio = max_width_ratio;
        self.config.float_text_ratio = text_ratio;
        self
    }

    pub fn min_float_height(mut self, height_pt: f32) -> Self {
        self.config.min_float_height_pt = height_pt;
        self
    }

    pub fn max_two_col_float_height(mut self, height_pt: f32) -> Self {
        self.config.max_two_col_float_height_pt = height_pt;
        self
    }

    pub fn float_end_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.float_end_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn debug_highlight(mut self, enabled: bool) -> Self {
        self.config.debug_highlight = enabled;
        self
    }

    pub fn color_space(mut self, color_space: ColorSpace) -> Self {
        self.config.color_space = color_space;
        self
    }

    pub fn build(self) -> Result<LayoutConfig, GridfitError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
