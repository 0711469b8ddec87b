use std::collections::BTreeMap;

use kuchiki::NodeRef;

use crate::dom::{get_attr, remove_attr, set_attr};
use crate::types::Pt;

pub const ATTR_BOX_ID: &str = "box_id";
pub const ATTR_WIDTH: &str = "box_width";
pub const ATTR_HEIGHT: &str = "box_height";

/// Rendered size of one box, as reported by the measurement pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxGeometry {
    pub box_id: usize,
    pub width: Pt,
    pub height: Pt,
}

impl BoxGeometry {
    pub fn empty(box_id: usize) -> Self {
        Self {
            box_id,
            width: Pt::ZERO,
            height: Pt::ZERO,
        }
    }
}

pub type GeometryMap = BTreeMap<usize, BoxGeometry>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagSummary {
    pub tagged: usize,
    /// Comment nodes passed over; they cannot carry a `box_id`.
    pub skipped: usize,
}

/// Number every element in document pre-order, starting at 0.
///
/// The sizing script walks the rendered tree in the same order, so ids line
/// up with the `boxid:` announcements in the diagnostic log.
pub fn tag_nodes(root: &NodeRef) -> TagSummary {
    let mut summary = TagSummary::default();
    for node in root.inclusive_descendants() {
        if node.as_element().is_some() {
            set_attr(&node, ATTR_BOX_ID, summary.tagged.to_string());
            summary.tagged += 1;
        } else if node.as_comment().is_some() {
            summary.skipped += 1;
        }
    }
    if summary.skipped > 0 {
        log::warn!(
            "skipped {} comment node(s) while tagging: comments cannot carry a box id",
            summary.skipped
        );
    }
    summary
}

/// Replace each `box_id` with the measured `box_width`/`box_height`.
/// Boxes without a log entry get zero.
pub fn apply_geometry(root: &NodeRef, geometry: &GeometryMap) -> usize {
    let mut missing = 0usize;
    for node in root.inclusive_descendants() {
        let Some(raw) = remove_attr(&node, ATTR_BOX_ID) else {
            continue;
        };
        let entry = raw.trim().parse::<usize>().ok().and_then(|id| geometry.get(&id));
        let (width, height) = match entry {
            Some(g) => (g.width, g.height),
            None => {
                missing += 1;
                (Pt::ZERO, Pt::ZERO)
            }
        };
        set_attr(&node, ATTR_WIDTH, width.to_string());
        set_attr(&node, ATTR_HEIGHT, height.to_string());
    }
    if missing > 0 {
        log::debug!("{missing} tagged element(s) had no measured box; defaulting to 0x0");
    }
    missing
}

fn read_pt(node: &NodeRef, attr: &str) -> Pt {
    get_attr(node, attr)
        .and_then(|raw| raw.trim().parse::<f32>().ok())
        .map(Pt::from_f32)
        .unwrap_or(Pt::ZERO)
}

/// Measured `(width, height)`; zero when unmeasured or malformed.
pub fn node_size(node: &NodeRef) -> (Pt, Pt) {
    (read_pt(node, ATTR_WIDTH), read_pt(node, ATTR_HEIGHT))
}

pub fn set_node_width(node: &NodeRef, width: Pt) {
    set_attr(node, ATTR_WIDTH, width.to_string());
}

/// Strip every transient geometry attribute before the tree leaves the
/// pipeline.
pub fn remove_geometry_attributes(root: &NodeRef) {
    for node in root.inclusive_descendants() {
        if node.as_element().is_none() {
            continue;
        }
        for attr in [ATTR_BOX_ID, ATTR_WIDTH, ATTR_HEIGHT] {
            remove_attr(&node, attr);
        }
    }
}

/// Raise every ancestor's measured width to the widest leaf below it.
pub fn propagate_widths(root: &NodeRef) -> usize {
    let mut raised = 0usize;
    for leaf in crate::dom::leaves(root) {
        let (mut running, _) = node_size(&leaf);
        for ancestor in leaf.ancestors() {
            if ancestor.as_element().is_none() {
                continue;
            }
            let (own, _) = node_size(&ancestor);
            running = running.max(own);
            if own < running {
                set_node_width(&ancestor, running);
                raised += 1;
            }
        }
    }
    raised
}
