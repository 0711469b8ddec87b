use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use crate::error::GridfitError;

pub const DEFAULT_RENDERER: &str = "prince";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_CMYK_CONVERTER: &str = "ps2pdf";

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const LOG_TAIL_BYTES: u64 = 2048;

#[cfg(windows)]
const NULL_DEVICE: &str = "NUL";
#[cfg(not(windows))]
const NULL_DEVICE: &str = "/dev/null";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPass {
    /// Output discarded; only the diagnostic log matters.
    Measure,
    Final,
}

impl std::fmt::Display for RenderPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderPass::Measure => f.write_str("measure"),
            RenderPass::Final => f.write_str("final"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub pass: RenderPass,
    pub stylesheets: &'a [PathBuf],
    pub script: Option<&'a Path>,
    /// `None` sends the primary output to the null device.
    pub output: Option<&'a Path>,
}

#[derive(Debug)]
pub struct RenderOutcome {
    pub diagnostic_log: NamedTempFile,
}

impl RenderOutcome {
    /// Wrap already collected log text, for renderers that run in-process.
    pub fn from_log_text(text: &str) -> std::io::Result<Self> {
        let mut log = tempfile::Builder::new()
            .prefix("render_out_")
            .suffix(".log")
            .tempfile()?;
        log.write_all(text.as_bytes())?;
        log.flush()?;
        Ok(Self {
            diagnostic_log: log,
        })
    }

    pub fn open_log(&self) -> std::io::Result<BufReader<File>> {
        Ok(BufReader::new(self.diagnostic_log.reopen()?))
    }

    pub fn log_len(&self) -> std::io::Result<u64> {
        Ok(self.diagnostic_log.as_file().metadata()?.len())
    }
}

/// The external layout engine.
pub trait LayoutRenderer {
    fn name(&self) -> &str;

    fn render(&self, html: &str, request: &RenderRequest<'_>) -> Result<RenderOutcome, GridfitError>;
}

/// Runs a command-line renderer with the document on stdin.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    leading_args: Vec<OsString>,
    timeout: Duration,
}

impl Default for CommandRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_RENDERER)
    }
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Arguments placed before the generated ones.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn command_args(&self, request: &RenderRequest<'_>) -> Vec<OsString> {
        let mut args = self.leading_args.clone();
        args.push("-".into());
        args.push("-o".into());
        args.push(
            request
                .output
                .map(|p| p.as_os_str().to_owned())
                .unwrap_or_else(|| NULL_DEVICE.into()),
        );
        args.push("--media".into());
        args.push("print".into());
        for sheet in request.stylesheets {
            args.push("-s".into());
            args.push(sheet.as_os_str().to_owned());
        }
        args.push("--no-network".into());
        args.push("--server".into());
        if let Some(script) = request.script {
            args.push("--script".into());
            args.push(script.as_os_str().to_owned());
        }
        args
    }

    fn wait_bounded(
        &self,
        child: &mut std::process::Child,
        pass: RenderPass,
    ) -> Result<std::process::ExitStatus, GridfitError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "renderer {} exceeded {:?} in {pass} pass; killing pid {}",
                    self.program,
                    self.timeout,
                    child.id()
                );
                if let Err(err) = child.kill() {
                    log::warn!("kill failed: {err}");
                }
                let _ = child.wait();
                return Err(GridfitError::RendererHung {
                    program: self.program.clone(),
                    pass,
                    timeout: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl LayoutRenderer for CommandRenderer {
    fn name(&self) -> &str {
        &self.program
    }

    fn render(&self, html: &str, request: &RenderRequest<'_>) -> Result<RenderOutcome, GridfitError> {
        let log_file = tempfile::Builder::new()
            .prefix("render_out_")
            .suffix(".log")
            .tempfile()?;
        let stdout = log_file.reopen()?;
        let stderr = stdout.try_clone()?;
        let args = self.command_args(request);
        log::info!(
            "running {} pass: {} {:?} (log: {})",
            request.pass,
            self.program,
            args,
            log_file.path().display()
        );

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|source| GridfitError::RendererSpawn {
                program: self.program.clone(),
                source,
            })?;

        let writer = child.stdin.take().map(|mut stdin| {
            let bytes = html.as_bytes().to_vec();
            thread::spawn(move || stdin.write_all(&bytes))
        });

        let status = self.wait_bounded(&mut child, request.pass);
        if let Some(handle) = writer {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) if err.kind() == std::io::ErrorKind::BrokenPipe => {
                    log::debug!("renderer closed stdin early");
                }
                Ok(Err(err)) => log::warn!("writing document to renderer failed: {err}"),
                Err(_) => log::warn!("stdin writer thread panicked"),
            }
        }
        let status = status?;

        let outcome = RenderOutcome {
            diagnostic_log: log_file,
        };
        if !status.success() {
            return Err(GridfitError::RendererFailed {
                program: self.program.clone(),
                pass: request.pass,
                status: status.to_string(),
                log_tail: log_tail(&outcome)?,
            });
        }

        match request.output {
            Some(output) => {
                let produced = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
                if produced == 0 {
                    return Err(GridfitError::EmptyRendererOutput {
                        program: self.program.clone(),
                        pass: request.pass,
                        what: "output file",
                    });
                }
            }
            None => {
                if request.pass == RenderPass::Measure && outcome.log_len()? == 0 {
                    return Err(GridfitError::EmptyRendererOutput {
                        program: self.program.clone(),
                        pass: request.pass,
                        what: "diagnostic log",
                    });
                }
            }
        }
        Ok(outcome)
    }
}

fn log_tail(outcome: &RenderOutcome) -> Result<String, GridfitError> {
    let mut file = outcome.diagnostic_log.reopen()?;
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(LOG_TAIL_BYTES)))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).trim().to_string())
}

/// Post-converts a finished PDF to CMYK (Ghostscript's `ps2pdf` by default).
#[derive(Debug, Clone)]
pub struct CmykConverter {
    program: String,
    leading_args: Vec<OsString>,
}

impl Default for CmykConverter {
    fn default() -> Self {
        Self::new(DEFAULT_CMYK_CONVERTER)
    }
}

impl CmykConverter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Replace `pdf` with its CMYK rendition. A converter that fails leaves
    /// the RGB file in place and returns `Ok(false)`.
    pub fn convert(&self, pdf: &Path) -> Result<bool, GridfitError> {
        let dir = pdf
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let target = tempfile::Builder::new()
            .prefix(".cmyk_")
            .suffix(".pdf")
            .tempfile_in(dir)?;
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .args([
                "-sProcessColorModel=DeviceCMYK",
                "-dHaveTransparency=/false",
                "-sColorConversionStrategy=CMYK",
                "-dAutoRotatePages=/None",
                "-dPDFSETTINGS=/prepress",
            ])
            .arg(pdf)
            .arg(target.path())
            .stdin(Stdio::null());
        log::info!("converting {} to CMYK with {}", pdf.display(), self.program);
        let status = match cmd.status() {
            Ok(status) => status,
            Err(err) => {
                log::warn!("CMYK conversion skipped: cannot run {}: {err}", self.program);
                return Ok(false);
            }
        };
        if !status.success() {
            log::warn!("CMYK conversion failed ({status}); keeping RGB output");
            return Ok(false);
        }
        let converted = target.as_file().metadata()?.len();
        if converted == 0 {
            log::warn!("CMYK conversion produced an empty file; keeping RGB output");
            return Ok(false);
        }
        target
            .persist(pdf)
            .map_err(|err| GridfitError::Io(err.error))?;
        Ok(true)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::measure_log::capture_geometry_from_reader;

    fn shell(script: &str) -> CommandRenderer {
        CommandRenderer::new("sh").with_args(["-c", script])
    }

    fn measure_request() -> RenderRequest<'static> {
        RenderRequest {
            pass: RenderPass::Measure,
            stylesheets: &[],
            script: None,
            output: None,
        }
    }

    #[test]
    fn command_line_lists_sheets_and_script() {
        let sheets = vec![PathBuf::from("grid.css"), PathBuf::from("site.css")];
        let request = RenderRequest {
            pass: RenderPass::Measure,
            stylesheets: &sheets,
            script: Some(Path::new("measure.js")),
            output: None,
        };
        let args: Vec<String> = CommandRenderer::default()
            .command_args(&request)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-", "-o", "/dev/null", "--media", "print", "-s", "grid.css", "-s", "site.css",
                "--no-network", "--server", "--script", "measure.js",
            ]
        );
    }

    #[test]
    fn measure_pass_captures_stdout_and_stderr() {
        let renderer = shell(
            "cat >/dev/null; echo 'msg|out|HTML boxid: 0'; echo 'msg|out|width: 42' >&2",
        );
        let outcome = renderer
            .render("<html></html>", &measure_request())
            .expect("render succeeds");
        let (map, stats) = capture_geometry_from_reader(outcome.open_log().expect("log"))
            .expect("log parses");
        assert_eq!(stats.boxes, 1);
        assert_eq!(map.get(&0).expect("box 0").width.to_milli_i64(), 42_000);
    }

    #[test]
    fn document_reaches_renderer_stdin() {
        let renderer = shell("cat");
        let outcome = renderer
            .render("<p>hello</p>", &measure_request())
            .expect("render succeeds");
        let text = std::fs::read_to_string(outcome.diagnostic_log.path()).expect("read log");
        assert_eq!(text, "<p>hello</p>");
    }

    #[test]
    fn non_zero_exit_reports_log_tail() {
        let renderer = shell("echo 'error: missing font Foo'; exit 3");
        let err = renderer
            .render("<html></html>", &measure_request())
            .expect_err("exit 3 must fail");
        match err {
            GridfitError::RendererFailed { pass, log_tail, .. } => {
                assert_eq!(pass, RenderPass::Measure);
                assert!(log_tail.contains("missing font Foo"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn hung_renderer_is_killed() {
        let renderer = shell("sleep 5").with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let err = renderer
            .render("<html></html>", &measure_request())
            .expect_err("must time out");
        assert!(matches!(err, GridfitError::RendererHung { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn empty_measure_log_is_an_error() {
        let err = shell("cat >/dev/null")
            .render("<html></html>", &measure_request())
            .expect_err("nothing logged");
        assert!(matches!(
            err,
            GridfitError::EmptyRendererOutput { what: "diagnostic log", .. }
        ));
    }

    #[test]
    fn final_pass_requires_an_output_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("out.pdf");
        let request = RenderRequest {
            pass: RenderPass::Final,
            stylesheets: &[],
            script: None,
            output: Some(&out),
        };
        let err = shell("cat >/dev/null")
            .render("<html></html>", &request)
            .expect_err("no file written");
        assert!(matches!(err, GridfitError::EmptyRendererOutput { .. }));

        // $0 is "-", $1 is "-o", $2 is the output path.
        shell("cat > \"$2\"")
            .render("<html></html>", &request)
            .expect("file written");
        assert_eq!(std::fs::read_to_string(&out).expect("read"), "<html></html>");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = CommandRenderer::new("gridfit-no-such-renderer")
            .render("<html></html>", &measure_request())
            .expect_err("spawn fails");
        assert!(matches!(err, GridfitError::RendererSpawn { .. }));
    }

    #[test]
    fn cmyk_conversion_replaces_file_only_on_success() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = dir.path().join("book.pdf");
        std::fs::write(&pdf, b"rgb").expect("write");

        let failing = CmykConverter::new("false");
        assert!(!failing.convert(&pdf).expect("no hard error"));
        assert_eq!(std::fs::read(&pdf).expect("read"), b"rgb");

        let missing = CmykConverter::new("gridfit-no-such-converter");
        assert!(!missing.convert(&pdf).expect("no hard error"));

        // Five fixed flags land in $0..$4, then input and output.
        let converting = CmykConverter::new("sh").with_args(["-c", "printf cmyk > \"$6\""]);
        assert!(converting.convert(&pdf).expect("converted"));
        assert_eq!(std::fs::read(&pdf).expect("read"), b"cmyk");
    }
}
