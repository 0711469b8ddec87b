//! gridfit command line: measure an HTML document with an external
//! renderer, fit it to the column grid and render it again.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use gridfit::{CmykConverter, ColorSpace, CommandRenderer, LayoutConfig, Typesetter};

#[derive(Parser, Debug)]
#[command(name = "gridfit")]
#[command(author, version, about, long_about = None)]
#[command(after_help = r#"EXAMPLES:
    # Two-pass render with the default renderer (prince)
    gridfit book.html -o book.pdf -s book.css

    # Only measure and decide; print the final HTML
    gridfit book.html --prepare-only

    # Print-ready CMYK output with debug dumps
    gridfit book.html -o book.pdf --cmyk --debug-dir ./debug
"#)]
struct Cli {
    /// HTML document to typeset (`-` reads stdin)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output PDF (with --prepare-only: where to write the final HTML)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// JSON layout configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Renderer executable
    #[arg(long, default_value = gridfit::DEFAULT_RENDERER)]
    renderer: String,

    /// Stylesheet passed to both render passes (repeatable)
    #[arg(short = 's', long = "stylesheet", value_name = "FILE")]
    stylesheets: Vec<PathBuf>,

    /// Kill the renderer after this many seconds per pass
    #[arg(long, default_value_t = gridfit::DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// Write debug.html, debug_final.html and a JSON-lines trace here
    #[arg(long, value_name = "DIR")]
    debug_dir: Option<PathBuf>,

    /// Colour decided blocks in the output
    #[arg(long)]
    debug_highlight: bool,

    /// Convert the final PDF to CMYK
    #[arg(long)]
    cmyk: bool,

    /// CMYK converter executable
    #[arg(long, default_value = gridfit::DEFAULT_CMYK_CONVERTER)]
    cmyk_converter: String,

    /// Stop after the layout rules and emit the final HTML instead of a PDF
    #[arg(long)]
    prepare_only: bool,

    /// Do not inspect the final output as PDF
    #[arg(long)]
    no_verify: bool,
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut html = String::new();
        std::io::stdin()
            .read_to_string(&mut html)
            .context("reading HTML from stdin")?;
        return Ok(html);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn load_config(cli: &Cli) -> Result<LayoutConfig> {
    let base = match &cli.config {
        Some(path) => LayoutConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LayoutConfig::default(),
    };
    let mut builder = base.into_builder();
    if cli.debug_highlight {
        builder = builder.debug_highlight(true);
    }
    if cli.cmyk {
        builder = builder.color_space(ColorSpace::Cmyk);
    }
    Ok(builder.build()?)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let html = read_input(&cli.input)?;
    let config = load_config(&cli)?;

    let renderer = CommandRenderer::new(cli.renderer.clone())
        .with_timeout(Duration::from_secs(cli.timeout_secs));
    let mut builder = Typesetter::builder()
        .config(config)
        .renderer(renderer)
        .verify_output(!cli.no_verify)
        .cmyk_converter(CmykConverter::new(cli.cmyk_converter.clone()));
    for sheet in &cli.stylesheets {
        builder = builder.stylesheet(sheet);
    }
    if let Some(dir) = &cli.debug_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating debug dir {}", dir.display()))?;
        builder = builder
            .debug_html_dir(dir)
            .debug_log(dir.join("trace.jsonl"));
    }
    let typesetter = builder.build()?;

    if cli.prepare_only {
        let prepared = typesetter.prepare(&html)?;
        match &cli.output {
            Some(path) => std::fs::write(path, &prepared.html)
                .with_context(|| format!("writing {}", path.display()))?,
            None => std::io::stdout().write_all(prepared.html.as_bytes())?,
        }
        log::info!(
            "prepared {} element(s), {} layout decision(s)",
            prepared.tagging.tagged,
            prepared.layout.decisions()
        );
        return Ok(());
    }

    let Some(output) = &cli.output else {
        bail!("--output is required unless --prepare-only is given");
    };
    let report = typesetter.render_to_file(&html, output)?;
    log::info!(
        "done: {} in {:.0} ms ({} box(es), {} decision(s){})",
        report.output.display(),
        report.timings.total_ms(),
        report.capture.boxes,
        report.layout.decisions(),
        match &report.pdf {
            Some(pdf) => format!(", {} page(s)", pdf.page_count),
            None => String::new(),
        }
    );
    Ok(())
}
