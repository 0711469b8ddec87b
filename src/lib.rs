mod config;
mod debug;
mod decisions;
pub mod dom;
mod error;
mod geometry;
mod grid;
mod measure_log;
mod metrics;
mod pdfinspect;
mod renderer;
mod stylesheet;
mod types;
mod units;

use std::path::{Path, PathBuf};
use std::time::Instant;

pub use config::{LayoutConfig, LayoutConfigBuilder};
pub use debug::DebugLogger;
pub use decisions::{
    FLOAT_TABLE, LayoutSummary, NO_FLOAT, OVER_WIDE_WRAPPER, REGULAR_TABLE, SINGLE_COL,
    TWO_COL_SPAN, WIDE_TABLE, apply_layout_rules, is_floatable, resize_node_width_to_columns,
};
pub use dom::{parse_html, serialize};
pub use error::GridfitError;
pub use geometry::{
    ATTR_BOX_ID, ATTR_HEIGHT, ATTR_WIDTH, BoxGeometry, GeometryMap, TagSummary, apply_geometry,
    node_size, propagate_widths, remove_geometry_attributes, tag_nodes,
};
pub use grid::{ColumnGrid, ColumnSpan};
pub use measure_log::{
    CaptureStats, MeasureLogParser, capture_geometry, capture_geometry_from_reader,
};
pub use metrics::{PassTimings, RenderReport};
pub use pdfinspect::{
    PdfInspectError, PdfInspectErrorCode, PdfInspectReport, inspect_pdf_bytes, inspect_pdf_path,
    verify_rendered_pdf,
};
pub use renderer::{
    CmykConverter, CommandRenderer, DEFAULT_CMYK_CONVERTER, DEFAULT_RENDERER, DEFAULT_TIMEOUT,
    LayoutRenderer, RenderOutcome, RenderPass, RenderRequest,
};
pub use stylesheet::{MEASURE_SCRIPT, PassAssets, grid_stylesheet};
pub use types::{ColorSpace, Margins, Pt, Size};
pub use units::{ConvertedLength, LengthUnit, LengthValue, convert_length, parse_length};

const DEBUG_HTML: &str = "debug.html";
const DEBUG_FINAL_HTML: &str = "debug_final.html";

/// Two-pass typesetter: measure with the renderer, apply the layout rules,
/// render again.
pub struct Typesetter {
    config: LayoutConfig,
    grid: ColumnGrid,
    renderer: Box<dyn LayoutRenderer>,
    stylesheets: Vec<PathBuf>,
    debug: Option<DebugLogger>,
    debug_html_dir: Option<PathBuf>,
    verify_output: bool,
    cmyk: CmykConverter,
}

/// Tree after the measurement pass and the layout rules, ready for the
/// final render.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub html: String,
    pub tagging: TagSummary,
    pub capture: CaptureStats,
    pub layout: LayoutSummary,
    pub measure_ms: f64,
    pub layout_ms: f64,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl Typesetter {
    pub fn builder() -> TypesetterBuilder {
        TypesetterBuilder::new()
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn grid(&self) -> &ColumnGrid {
        &self.grid
    }

    /// Measurement pass and layout rules only.
    pub fn prepare(&self, html: &str) -> Result<PreparedDocument, GridfitError> {
        let assets = PassAssets::write(&self.config)?;
        let prepared = self.prepare_with(html, &assets);
        self.finish_debug("prepare");
        prepared
    }

    pub fn render_to_file(
        &self,
        html: &str,
        output: impl AsRef<Path>,
    ) -> Result<RenderReport, GridfitError> {
        let output = output.as_ref();
        let assets = PassAssets::write(&self.config)?;
        let report = self.render_with(html, output, &assets);
        self.finish_debug("render_to_file");
        report
    }

    fn render_with(
        &self,
        html: &str,
        output: &Path,
        assets: &PassAssets,
    ) -> Result<RenderReport, GridfitError> {
        let prepared = self.prepare_with(html, assets)?;

        let stylesheets = assets.stylesheets(&self.stylesheets);
        let request = RenderRequest {
            pass: RenderPass::Final,
            stylesheets: &stylesheets,
            script: None,
            output: Some(output),
        };
        let start = Instant::now();
        self.renderer.render(&prepared.html, &request)?;
        let final_ms = elapsed_ms(start);
        self.trace_pass(RenderPass::Final, final_ms);
        log::info!("final pass wrote {} in {final_ms:.0} ms", output.display());

        let mut cmyk_ms = 0.0;
        let mut cmyk_converted = false;
        if self.config.color_space() == ColorSpace::Cmyk {
            let start = Instant::now();
            cmyk_converted = self.cmyk.convert(output)?;
            cmyk_ms = elapsed_ms(start);
        }

        let pdf = if self.verify_output {
            let report = verify_rendered_pdf(output)?;
            log::info!(
                "{}: {} page(s), PDF {}, {} bytes, sha256 {}",
                output.display(),
                report.page_count,
                report.pdf_version,
                report.file_size_bytes,
                report.sha256
            );
            Some(report)
        } else {
            None
        };

        Ok(RenderReport {
            output: output.to_path_buf(),
            timings: PassTimings {
                measure_ms: prepared.measure_ms,
                layout_ms: prepared.layout_ms,
                final_ms,
                cmyk_ms,
            },
            capture: prepared.capture,
            layout: prepared.layout,
            pdf,
            cmyk_converted,
        })
    }

    fn prepare_with(
        &self,
        html: &str,
        assets: &PassAssets,
    ) -> Result<PreparedDocument, GridfitError> {
        let doc = parse_html(html);
        let tagging = tag_nodes(&doc);
        if let Some(dir) = &self.debug_html_dir {
            if let Ok(body) = doc.select_first("body") {
                dom::append_class(body.as_node(), "debug");
            }
            self.dump_html(dir, DEBUG_HTML, &doc)?;
        }

        let stylesheets = assets.stylesheets(&self.stylesheets);
        let request = RenderRequest {
            pass: RenderPass::Measure,
            stylesheets: &stylesheets,
            script: Some(assets.script()),
            output: None,
        };
        let start = Instant::now();
        let outcome = self.renderer.render(&serialize(&doc), &request)?;
        let (geometry, capture) = capture_geometry_from_reader(outcome.open_log()?)?;
        let measure_ms = elapsed_ms(start);
        self.trace_pass(RenderPass::Measure, measure_ms);
        if let Some(debug) = &self.debug {
            debug.capture(&capture);
        }
        log::info!(
            "measure pass: {} of {} element(s) reported in {measure_ms:.0} ms",
            capture.boxes,
            tagging.tagged
        );
        if capture.boxes == 0 {
            log::warn!("renderer reported no boxes; layout rules will see no geometry");
        }

        let start = Instant::now();
        apply_geometry(&doc, &geometry);
        propagate_widths(&doc);
        let layout = apply_layout_rules(&doc, &self.config, &self.grid, self.debug.as_ref());
        remove_geometry_attributes(&doc);
        let layout_ms = elapsed_ms(start);
        log::info!(
            "layout: {} decision(s) in {layout_ms:.1} ms ({} col, {} over-wide, {} rotated, {} float)",
            layout.decisions(),
            layout.column_classes,
            layout.over_wide,
            layout.rotated,
            layout.float_tables
        );

        if let Some(dir) = &self.debug_html_dir {
            self.dump_html(dir, DEBUG_FINAL_HTML, &doc)?;
        }

        Ok(PreparedDocument {
            html: serialize(&doc),
            tagging,
            capture,
            layout,
            measure_ms,
            layout_ms,
        })
    }

    fn dump_html(&self, dir: &Path, name: &str, doc: &kuchiki::NodeRef) -> Result<(), GridfitError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(name);
        std::fs::write(&path, serialize(doc))?;
        log::debug!("wrote {}", path.display());
        Ok(())
    }

    fn trace_pass(&self, pass: RenderPass, ms: f64) {
        if let Some(debug) = &self.debug {
            debug.render_pass(
                self.renderer.name(),
                pass,
                std::time::Duration::from_secs_f64(ms / 1000.0),
            );
        }
    }

    fn finish_debug(&self, context: &str) {
        if let Some(debug) = &self.debug {
            debug.emit_summary(context);
            debug.flush();
        }
    }
}

pub struct TypesetterBuilder {
    config: LayoutConfig,
    renderer: Option<Box<dyn LayoutRenderer>>,
    stylesheets: Vec<PathBuf>,
    debug_path: Option<PathBuf>,
    debug_html_dir: Option<PathBuf>,
    verify_output: bool,
    cmyk: CmykConverter,
}

impl TypesetterBuilder {
    pub fn new() -> Self {
        Self {
            config: LayoutConfig::default(),
            renderer: None,
            stylesheets: Vec::new(),
            debug_path: None,
            debug_html_dir: None,
            verify_output: true,
            cmyk: CmykConverter::default(),
        }
    }

    pub fn config(mut self, config: LayoutConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to [`CommandRenderer`] running `prince`.
    pub fn renderer(mut self, renderer: impl LayoutRenderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    pub fn stylesheet(mut self, path: impl Into<PathBuf>) -> Self {
        self.stylesheets.push(path.into());
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    /// Dump the tagged and the final tree as HTML into `dir`.
    pub fn debug_html_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_html_dir = Some(dir.into());
        self
    }

    /// Inspect the final artifact as PDF. On by default.
    pub fn verify_output(mut self, enabled: bool) -> Self {
        self.verify_output = enabled;
        self
    }

    pub fn cmyk_converter(mut self, converter: CmykConverter) -> Self {
        self.cmyk = converter;
        self
    }

    pub fn build(self) -> Result<Typesetter, GridfitError> {
        let grid = self.config.grid()?;
        for sheet in &self.stylesheets {
            if !sheet.is_file() {
                return Err(GridfitError::InvalidConfiguration(format!(
                    "stylesheet not found: {}",
                    sheet.display()
                )));
            }
        }
        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        Ok(Typesetter {
            config: self.config,
            grid,
            renderer: self
                .renderer
                .unwrap_or_else(|| Box::new(CommandRenderer::default())),
            stylesheets: self.stylesheets,
            debug,
            debug_html_dir: self.debug_html_dir,
            verify_output: self.verify_output,
            cmyk: self.cmyk,
        })
    }
}

impl Default for TypesetterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
