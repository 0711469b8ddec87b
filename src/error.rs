use std::time::Duration;

use thiserror::Error;

use crate::pdfinspect::PdfInspectError;
use crate::renderer::RenderPass;

#[derive(Debug, Error)]
pub enum GridfitError {
    #[error("cannot parse length {0:?}: expected a number followed by a unit")]
    Parse(String),
    #[error("conversion from {from} to {to} is not supported")]
    UnsupportedUnit { from: String, to: String },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to start renderer `{program}`: {source}")]
    RendererSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("renderer `{program}` failed during {pass} pass ({status}): {log_tail}")]
    RendererFailed {
        program: String,
        pass: RenderPass,
        status: String,
        log_tail: String,
    },
    #[error("renderer `{program}` hung during {pass} pass (no exit after {timeout:?})")]
    RendererHung {
        program: String,
        pass: RenderPass,
        timeout: Duration,
    },
    #[error("renderer `{program}` produced no {what} during {pass} pass")]
    EmptyRendererOutput {
        program: String,
        pass: RenderPass,
        what: &'static str,
    },
    #[error("output inspection failed: {0}")]
    OutputInspection(#[from] PdfInspectError),
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
