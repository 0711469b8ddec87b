use crate::error::GridfitError;
use crate::types::Pt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnSpan {
    /// Fits within `k` adjacent grid columns.
    Columns(usize),
    /// Wider than the full grid but within tolerance; scale down by `scale`.
    OverWide { scale: f32 },
    /// No horizontal fit even with tolerance.
    Rotated,
}

impl ColumnSpan {
    /// CSS class emitted for this span.
    pub fn class_name(&self) -> String {
        match self {
            ColumnSpan::Columns(k) => format!("col-{k}"),
            ColumnSpan::OverWide { .. } => "over-wide".to_string(),
            ColumnSpan::Rotated => "rotated-table".to_string(),
        }
    }
}

/// Fixed N-column page grid. `cumulative[k - 1]` is the width covered by
/// `k` adjacent columns including the `k - 1` gutters between them.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnGrid {
    column_width: Pt,
    gutter: Pt,
    cumulative: Vec<Pt>,
    tolerated_over_width: Pt,
}

impl ColumnGrid {
    pub fn new(
        page_width: f32,
        margin_left: f32,
        margin_right: f32,
        columns: usize,
        gutter: f32,
        tolerance: f32,
    ) -> Result<Self, GridfitError> {
        if columns == 0 {
            return Err(GridfitError::InvalidConfiguration(
                "grid needs at least one column".to_string(),
            ));
        }
        let usable = page_width - margin_left - margin_right - (columns as f32 - 1.0) * gutter;
        let column_width = Pt::from_f32(usable / columns as f32);
        if column_width <= Pt::ZERO {
            return Err(GridfitError::InvalidConfiguration(format!(
                "no room for {columns} columns with {gutter}pt gutters on a {page_width}pt page"
            )));
        }
        let gutter = Pt::from_f32(gutter);
        let mut cumulative = Vec::with_capacity(columns);
        let mut covered = column_width;
        cumulative.push(covered);
        for _ in 1..columns {
            covered += gutter + column_width;
            cumulative.push(covered);
        }
        let tolerated_over_width = covered * tolerance;
        Ok(Self {
            column_width,
            gutter,
            cumulative,
            tolerated_over_width,
        })
    }

    pub fn columns(&self) -> usize {
        self.cumulative.len()
    }

    pub fn column_width(&self) -> Pt {
        self.column_width
    }

    pub fn gutter(&self) -> Pt {
        self.gutter
    }

    /// Width of `k` adjacent columns, clamped to `1..=N`.
    pub fn span_width(&self, k: usize) -> Pt {
        let idx = k.clamp(1, self.columns()) - 1;
        self.cumulative[idx]
    }

    pub fn full_width(&self) -> Pt {
        self.span_width(self.columns())
    }

    pub fn tolerated_over_width(&self) -> Pt {
        self.tolerated_over_width
    }

    /// Classify `width` into the smallest span that strictly exceeds it.
    ///
    /// With `align = Some(unit)` the span is rounded up to a multiple of
    /// `unit` columns (never past the full grid).
    pub fn classify_width(&self, width: Pt, align: Option<usize>) -> ColumnSpan {
        match self.cumulative.iter().position(|c| *c > width) {
            Some(idx) => {
                let mut k = idx + 1;
                if let Some(unit) = align.filter(|u| *u > 1) {
                    k = k.div_ceil(unit) * unit;
                }
                ColumnSpan::Columns(k.min(self.columns()))
            }
            None if width <= self.tolerated_over_width => ColumnSpan::OverWide {
                scale: self.full_width().to_f32() / width.to_f32(),
            },
            None => ColumnSpan::Rotated,
        }
    }
}
