use std::io::BufRead;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::GridfitError;
use crate::geometry::{BoxGeometry, GeometryMap};
use crate::types::Pt;

fn box_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.*? boxid: (\d+)$").expect("valid regex"))
}

fn width_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^msg\|out\|width: ([\d.]+)$").expect("valid regex"))
}

fn height_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^msg\|out\|height: ([\d.]+)$").expect("valid regex"))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub boxes: usize,
    /// Announcements that were not `previous + 1`.
    pub id_anomalies: usize,
    /// Readings seen before the first announcement.
    pub discarded: usize,
}

/// Line-at-a-time reader for the renderer's diagnostic log.
///
/// Width and height readings accumulate until the next `boxid: N` line, then
/// close under `N - 1`: widest fragment wins, fragment heights add up. The
/// last block closes under the last announced id.
#[derive(Debug, Default)]
pub struct MeasureLogParser {
    current: Option<usize>,
    widths: Vec<f32>,
    heights: Vec<f32>,
    geometry: GeometryMap,
    stats: CaptureStats,
}

impl MeasureLogParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_line(&mut self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(caps) = box_id_regex().captures(line) {
            let Ok(id) = caps[1].parse::<usize>() else {
                log::warn!("ignoring unparseable box id in {line:?}");
                return;
            };
            self.announce(id);
            return;
        }
        if let Some(caps) = width_regex().captures(line) {
            self.record(&caps[1], true);
        } else if let Some(caps) = height_regex().captures(line) {
            self.record(&caps[1], false);
        }
    }

    fn announce(&mut self, id: usize) {
        match self.current {
            Some(prev) => {
                if id != prev + 1 {
                    self.stats.id_anomalies += 1;
                    log::warn!(
                        "box id {id} announced after {prev}; closing readings under {}",
                        id.saturating_sub(1)
                    );
                }
                self.finalize(id.saturating_sub(1));
            }
            None => {
                if !self.widths.is_empty() || !self.heights.is_empty() {
                    self.stats.discarded += self.widths.len() + self.heights.len();
                    self.widths.clear();
                    self.heights.clear();
                }
            }
        }
        self.current = Some(id);
    }

    fn record(&mut self, raw: &str, is_width: bool) {
        let Ok(value) = raw.parse::<f32>() else {
            log::warn!("ignoring malformed measurement {raw:?}");
            return;
        };
        if is_width {
            self.widths.push(value);
        } else {
            self.heights.push(value);
        }
    }

    fn finalize(&mut self, id: usize) {
        let width = self.widths.drain(..).fold(0.0_f32, f32::max);
        let height: f32 = self.heights.drain(..).sum();
        self.geometry.insert(
            id,
            BoxGeometry {
                box_id: id,
                width: Pt::from_f32(width),
                height: Pt::from_f32(height),
            },
        );
    }

    pub fn finish(mut self) -> (GeometryMap, CaptureStats) {
        match self.current {
            Some(last) => self.finalize(last),
            None => {
                self.stats.discarded += self.widths.len() + self.heights.len();
            }
        }
        self.stats.boxes = self.geometry.len();
        (self.geometry, self.stats)
    }
}

pub fn capture_geometry(log_text: &str) -> (GeometryMap, CaptureStats) {
    let mut parser = MeasureLogParser::new();
    for line in log_text.lines() {
        parser.feed_line(line);
    }
    parser.finish()
}

pub fn capture_geometry_from_reader<R: BufRead>(
    reader: R,
) -> Result<(GeometryMap, CaptureStats), GridfitError> {
    let mut parser = MeasureLogParser::new();
    for line in reader.lines() {
        parser.feed_line(&line?);
    }
    Ok(parser.finish())
}
