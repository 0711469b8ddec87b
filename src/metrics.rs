use std::path::PathBuf;

use crate::decisions::LayoutSummary;
use crate::measure_log::CaptureStats;
use crate::pdfinspect::PdfInspectReport;

#[derive(Debug, Clone, Default)]
pub struct PassTimings {
    pub measure_ms: f64,
    pub layout_ms: f64,
    pub final_ms: f64,
    pub cmyk_ms: f64,
}

impl PassTimings {
    pub fn total_ms(&self) -> f64 {
        self.measure_ms + self.layout_ms + self.final_ms + self.cmyk_ms
    }
}

/// Result of one full two-pass render.
#[derive(Debug, Clone)]
pub struct RenderReport {
    pub output: PathBuf,
    pub timings: PassTimings,
    pub capture: CaptureStats,
    pub layout: LayoutSummary,
    /// `None` when verification is disabled.
    pub pdf: Option<PdfInspectReport>,
    pub cmyk_converted: bool,
}
