use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::config::LayoutConfig;
use crate::error::GridfitError;

/// Sizing script for the measurement pass.
pub const MEASURE_SCRIPT: &str = include_str!("../assets/measure.js");

const GRID_SHEET_NAME: &str = "gridfit-grid.css";
const SCRIPT_NAME: &str = "gridfit-measure.js";

/// Page box, grid custom properties and one `.col-k` rule per span.
pub fn grid_stylesheet(config: &LayoutConfig) -> Result<String, GridfitError> {
    let grid = config.grid()?;
    let page = config.page_size();
    let m = config.margins();
    let mut css = String::new();
    let _ = writeln!(css, "@page {{");
    let _ = writeln!(css, "  size: {}pt {}pt;", page.width, page.height);
    let _ = writeln!(
        css,
        "  margin: {}pt {}pt {}pt {}pt;",
        m.top, m.right, m.bottom, m.left
    );
    let _ = writeln!(css, "}}");
    let _ = writeln!(css, ":root {{");
    let _ = writeln!(css, "  --gridfit-columns: {};", grid.columns());
    let _ = writeln!(css, "  --gridfit-column-width: {}pt;", grid.column_width());
    let _ = writeln!(css, "  --gridfit-gutter: {}pt;", grid.gutter());
    let _ = writeln!(css, "  --gridfit-full-width: {}pt;", grid.full_width());
    let _ = writeln!(css, "}}");
    for k in 1..=grid.columns() {
        let _ = writeln!(css, ".col-{k} {{ width: {}pt; }}", grid.span_width(k));
    }
    Ok(css)
}

/// Files handed to the renderer on both passes. Removed on drop.
#[derive(Debug)]
pub struct PassAssets {
    dir: TempDir,
    grid_sheet: PathBuf,
    script: PathBuf,
}

impl PassAssets {
    pub fn write(config: &LayoutConfig) -> Result<Self, GridfitError> {
        let dir = tempfile::Builder::new().prefix("gridfit_").tempdir()?;
        let grid_sheet = dir.path().join(GRID_SHEET_NAME);
        std::fs::write(&grid_sheet, grid_stylesheet(config)?)?;
        let script = dir.path().join(SCRIPT_NAME);
        std::fs::write(&script, MEASURE_SCRIPT)?;
        Ok(Self {
            dir,
            grid_sheet,
            script,
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Grid sheet first so user sheets can override it.
    pub fn stylesheets(&self, user: &[PathBuf]) -> Vec<PathBuf> {
        std::iter::once(self.grid_sheet.clone())
            .chain(user.iter().cloned())
            .collect()
    }
}
