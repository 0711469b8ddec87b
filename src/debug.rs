use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use crate::measure_log::CaptureStats;
use crate::renderer::RenderPass;
use crate::types::Pt;

/// JSON-lines trace of layout decisions, captures and render passes.
#[derive(Clone)]
pub struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: BufWriter<File>,
    counters: BTreeMap<String, u64>,
}

impl std::fmt::Debug for DebugLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugLogger").finish_non_exhaustive()
    }
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: BTreeMap::new(),
            })),
        })
    }

    fn write_event(&self, event: Value) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{event}");
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    pub fn decision(&self, rule: &str, tag: &str, outcome: &str, width: Pt, height: Pt) {
        self.write_event(json!({
            "type": "layout.decision",
            "rule": rule,
            "tag": tag,
            "outcome": outcome,
            "width_pt": width.to_f32(),
            "height_pt": height.to_f32(),
        }));
        self.increment(&format!("decision.{outcome}"), 1);
    }

    pub fn capture(&self, stats: &CaptureStats) {
        self.write_event(json!({
            "type": "geometry.capture",
            "boxes": stats.boxes,
            "id_anomalies": stats.id_anomalies,
            "discarded": stats.discarded,
        }));
        self.increment("geometry.boxes", stats.boxes as u64);
    }

    pub fn render_pass(&self, renderer: &str, pass: RenderPass, elapsed: Duration) {
        self.write_event(json!({
            "type": "render.pass",
            "renderer": renderer,
            "pass": pass.to_string(),
            "ms": elapsed.as_secs_f64() * 1000.0,
        }));
        self.increment("render.passes", 1);
    }

    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let counters = std::mem::take(&mut state.counters);
            let event = json!({
                "type": "debug.summary",
                "context": context,
                "counts": counters,
            });
            let _ = writeln!(state.writer, "{event}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}
