use kuchiki::NodeRef;

use crate::config::LayoutConfig;
use crate::debug::DebugLogger;
use crate::dom::{
    add_node_style, append_class, class_contains, element_children, elements_by_tag,
    following_elements, has_ancestor_tag, has_attr, has_class, is_tag, node_style, remove_attr,
    remove_class, remove_node_width, tag_name, wrap_node,
};
use crate::geometry::node_size;
use crate::grid::{ColumnGrid, ColumnSpan};
use crate::types::Pt;

pub const FLOAT_TABLE: &str = "pp_float_table";
pub const NO_FLOAT: &str = "pp_no_float";
pub const TWO_COL_SPAN: &str = "pp_twocol_span";
pub const SINGLE_COL: &str = "pp_singlecol";
pub const REGULAR_TABLE: &str = "reg-table";
pub const WIDE_TABLE: &str = "wide-table";
pub const OVER_WIDE_WRAPPER: &str = "over-wide-wrapper";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutSummary {
    pub float_tables: usize,
    pub two_col_spans: usize,
    pub single_col: usize,
    pub regular_tables: usize,
    pub wide_tables: usize,
    pub column_classes: usize,
    pub over_wide: usize,
    pub rotated: usize,
    pub no_float: usize,
    pub floats_removed: usize,
    /// Nodes skipped because they carried no measured geometry.
    pub unmeasured: usize,
}

impl LayoutSummary {
    pub fn decisions(&self) -> usize {
        self.float_tables
            + self.two_col_spans
            + self.single_col
            + self.regular_tables
            + self.wide_tables
            + self.column_classes
            + self.over_wide
            + self.rotated
            + self.no_float
            + self.floats_removed
    }
}

struct Rules<'a> {
    config: &'a LayoutConfig,
    grid: &'a ColumnGrid,
    trace: Option<&'a DebugLogger>,
    regular: Pt,
    extended: Pt,
    summary: LayoutSummary,
}

/// Run every layout rule once over a measured, propagated tree.
///
/// Rules only add or remove classes, styles and wrappers; nodes without
/// geometry are left untouched.
pub fn apply_layout_rules(
    root: &NodeRef,
    config: &LayoutConfig,
    grid: &ColumnGrid,
    trace: Option<&DebugLogger>,
) -> LayoutSummary {
    let mut rules = Rules {
        config,
        grid,
        trace,
        regular: grid.span_width(config.regular_columns()),
        extended: grid.span_width(config.extended_columns()),
        summary: LayoutSummary::default(),
    };
    rules.float_tables(root);
    rules.column_spans(root);
    rules.resize_tables(root);
    rules.infobox_floats(root);
    log::debug!("layout rules: {:?}", rules.summary);
    rules.summary
}

impl Rules<'_> {
    fn record(&self, rule: &str, node: &NodeRef, outcome: &str, width: Pt, height: Pt) {
        let tag = tag_name(node).unwrap_or_default();
        log::debug!("{rule}: <{tag}> {width}x{height}pt -> {outcome}");
        if let Some(trace) = self.trace {
            trace.decision(rule, &tag, outcome, width, height);
        }
    }

    fn highlight(&self, node: &NodeRef, color: &str) {
        if self.config.debug_highlight() {
            add_node_style(node, "background-color", color);
        }
    }

    fn float_tables(&mut self, root: &NodeRef) {
        for table in elements_by_tag(root, "table") {
            let (w, h) = node_size(&table);
            if w.is_zero() || h.is_zero() {
                self.summary.unmeasured += 1;
                continue;
            }
            if is_floatable(&table, w, h, self.config, self.grid) {
                append_class(&table, FLOAT_TABLE);
                self.summary.float_tables += 1;
                self.record("float", &table, FLOAT_TABLE, w, h);
            }
        }
    }

    fn column_spans(&mut self, root: &NodeRef) {
        let mut targets: Vec<NodeRef> = Vec::new();
        for article in elements_by_tag(root, "article") {
            for div in element_children(&article).filter(|c| is_tag(c, "div")) {
                targets.extend(element_children(&div));
            }
        }
        for table in top_level_tables(root) {
            if !targets.contains(&table) {
                targets.push(table);
            }
        }

        for node in targets {
            let (w, h) = node_size(&node);
            if w.is_zero() || h.is_zero() {
                self.summary.unmeasured += 1;
                continue;
            }
            self.span_rule(&node, w, h);
            if is_tag(&node, "table") {
                self.table_width_rule(&node, w, h);
            }
        }
    }

    fn span_rule(&mut self, node: &NodeRef, w: Pt, h: Pt) {
        if w > self.regular && w <= self.extended {
            if h.to_f32() > self.config.max_two_col_float_height_pt() {
                append_class(node, SINGLE_COL);
                self.highlight(node, "orange");
                self.summary.single_col += 1;
                self.record("span", node, SINGLE_COL, w, h);
            } else {
                append_class(node, TWO_COL_SPAN);
                self.highlight(node, "yellow");
                self.summary.two_col_spans += 1;
                self.record("span", node, TWO_COL_SPAN, w, h);
            }
        } else if w > self.extended {
            append_class(node, SINGLE_COL);
            self.highlight(node, "red");
            self.summary.single_col += 1;
            self.record("span", node, SINGLE_COL, w, h);
        }
    }

    fn table_width_rule(&mut self, table: &NodeRef, w: Pt, h: Pt) {
        if w <= self.regular {
            append_class(table, REGULAR_TABLE);
            self.summary.regular_tables += 1;
            self.record("table-width", table, REGULAR_TABLE, w, h);
        } else if has_attr(table, "width") {
            remove_attr(table, "width");
            append_class(table, WIDE_TABLE);
            self.summary.wide_tables += 1;
            self.record("table-width", table, WIDE_TABLE, w, h);
        }

        if w > self.regular && w <= self.extended {
            if let Some(parent) = table.parent().filter(|p| is_tag(p, "div")) {
                append_class(&parent, WIDE_TABLE);
                self.record("table-width", &parent, WIDE_TABLE, w, h);
            }
        }
    }

    fn resize_tables(&mut self, root: &NodeRef) {
        let align = self
            .config
            .align_tables_to_subgrid()
            .then(|| self.config.subgrid_columns());
        let tables: Vec<NodeRef> = top_level_tables(root)
            .into_iter()
            .filter(|t| !class_contains(t, "infobox") && !class_contains(t, "pullquote"))
            .collect();
        for table in tables {
            let (w, h) = node_size(&table);
            if w.is_zero() {
                self.summary.unmeasured += 1;
                continue;
            }
            let span = resize_node_width_to_columns(&table, w, self.grid, align);
            match span {
                ColumnSpan::Columns(_) => self.summary.column_classes += 1,
                ColumnSpan::OverWide { .. } => self.summary.over_wide += 1,
                ColumnSpan::Rotated => self.summary.rotated += 1,
            }
            self.record("resize", &table, &span.class_name(), w, h);
        }
    }

    fn infobox_floats(&mut self, root: &NodeRef) {
        let min = self.config.min_float_height_pt();
        let boxes: Vec<NodeRef> = root
            .inclusive_descendants()
            .filter(|n| class_contains(n, "infobox"))
            .collect();
        for node in boxes {
            let (w, h) = node_size(&node);
            if h.is_zero() {
                self.summary.unmeasured += 1;
                continue;
            }
            let height = h.to_f32();
            let keep_in_flow = height < min
                || (height < 2.0 * min && is_floatable(&node, w, h, self.config, self.grid));
            if keep_in_flow {
                append_class(&node, NO_FLOAT);
                self.summary.no_float += 1;
                self.record("infobox", &node, NO_FLOAT, w, h);
            } else if has_class(&node, FLOAT_TABLE) {
                remove_class(&node, FLOAT_TABLE);
                self.summary.floats_removed += 1;
                self.record("infobox", &node, "float-removed", w, h);
            }
        }
    }
}

fn top_level_tables(root: &NodeRef) -> Vec<NodeRef> {
    elements_by_tag(root, "table")
        .into_iter()
        .filter(|t| !has_ancestor_tag(t, "table"))
        .collect()
}

fn is_subheading(node: &NodeRef) -> bool {
    matches!(
        tag_name(node).as_deref(),
        Some("h2" | "h3" | "h4" | "h5" | "h6")
    )
}

/// Whether a narrow, non-nested table has enough following text to sit
/// beside it.
///
/// Following siblings are summed until they cover `float_text_ratio` of the
/// table's height; body content counts with a factor that grows with the
/// table's width, sub-headings count once. A float-breaking sibling ends the
/// scan.
pub fn is_floatable(
    node: &NodeRef,
    width: Pt,
    height: Pt,
    config: &LayoutConfig,
    grid: &ColumnGrid,
) -> bool {
    if !is_tag(node, "table") || width.is_zero() || height.is_zero() {
        return false;
    }
    let column = grid.column_width().to_f32();
    let width = width.to_f32();
    if width >= column * config.float_max_width_ratio() || has_ancestor_tag(node, "table") {
        return false;
    }
    let height_factor = width / column + 1.0;
    let needed = height.to_f32() * config.float_text_ratio();
    let mut text_height = 0.0_f32;
    for sibling in following_elements(node) {
        let tag = tag_name(&sibling).unwrap_or_default();
        if config.is_float_end_tag(&tag) {
            return false;
        }
        let (_, h) = node_size(&sibling);
        let weight = if is_subheading(&sibling) { 1.0 } else { height_factor };
        text_height += h.to_f32() * weight;
        if text_height > needed {
            return true;
        }
    }
    false
}

/// Replace a node's explicit width with a grid class.
///
/// Over-wide nodes are wrapped in `div.over-wide-wrapper`, which is scaled
/// down to the full grid width; anything wider is marked for rotation.
pub fn resize_node_width_to_columns(
    node: &NodeRef,
    width: Pt,
    grid: &ColumnGrid,
    align: Option<usize>,
) -> ColumnSpan {
    remove_node_width(node);
    let span = grid.classify_width(width, align);
    append_class(node, &span.class_name());
    if let ColumnSpan::OverWide { scale } = span {
        let wrapper = match node.parent().filter(|p| has_class(p, OVER_WIDE_WRAPPER)) {
            Some(existing) => Some(existing),
            None => wrap_node(node, "div", OVER_WIDE_WRAPPER),
        };
        if let Some(wrapper) = wrapper {
            add_node_style(&wrapper, "transform-origin", "0 0");
            add_node_style(&wrapper, "transform", &format!("scale({scale:.2})"));
        }
    }
    span
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{classes, get_attr, parse_html, serialize};
    use crate::geometry::propagate_widths;

    fn first(doc: &NodeRef, selector: &str) -> NodeRef {
        doc.select_first(selector)
            .expect("selector matches")
            .as_node()
            .clone()
    }

    fn defaults() -> (LayoutConfig, ColumnGrid) {
        let config = LayoutConfig::default();
        let grid = config.grid().expect("grid");
        (config, grid)
    }

    #[test]
    fn small_table_with_enough_following_text_floats() {
        let (config, grid) = defaults();
        let doc = parse_html(
            r#"<div>
                 <table id="t" box_width="15" box_height="100"><tr><td>1</td></tr></table>
                 <p box_width="161" box_height="40">text</p>
                 <h2 box_width="161" box_height="10">More</h2>
                 <p box_width="161" box_height="30">text</p>
               </div>"#,
        );
        let table = first(&doc, "#t");
        let (w, h) = node_size(&table);
        assert!(is_floatable(&table, w, h, &config, &grid));

        let summary = apply_layout_rules(&doc, &config, &grid, None);
        assert_eq!(summary.float_tables, 1);
        assert!(has_class(&table, FLOAT_TABLE));
    }

    #[test]
    fn float_breaking_sibling_or_width_prevents_floating() {
        let (config, grid) = defaults();
        let doc = parse_html(
            r#"<div>
                 <table id="a" box_width="15" box_height="100"><tr><td>1</td></tr></table>
                 <h1 box_width="161" box_height="20">Chapter</h1>
                 <p box_width="161" box_height="400">text</p>
               </div>
               <div>
                 <table id="b" box_width="25" box_height="100"><tr><td>1</td></tr></table>
                 <p box_width="161" box_height="400">text</p>
               </div>
               <div>
                 <table id="c" box_width="15" box_height="100"><tr><td>1</td></tr></table>
                 <h3 box_width="161" box_height="30">Sub</h3>
                 <h4 box_width="161" box_height="19">Sub</h4>
               </div>"#,
        );
        for id in ["#a", "#b", "#c"] {
            let table = first(&doc, id);
            let (w, h) = node_size(&table);
            assert!(!is_floatable(&table, w, h, &config, &grid), "{id} must not float");
        }
    }

    #[test]
    fn nested_tables_never_float() {
        let (config, grid) = defaults();
        let doc = parse_html(
            r#"<table><tr><td>
                 <table id="inner" box_width="10" box_height="20"><tr><td>x</td></tr></table>
                 <p box_width="50" box_height="500">text</p>
               </td></tr></table>"#,
        );
        let inner = first(&doc, "#inner");
        let (w, h) = node_size(&inner);
        assert!(!is_floatable(&inner, w, h, &config, &grid));
    }

    #[test]
    fn content_blocks_span_by_width_and_height() {
        let config = LayoutConfig::builder()
            .debug_highlight(true)
            .build()
            .expect("config");
        let grid = config.grid().expect("grid");
        let doc = parse_html(
            r#"<article><div>
                 <p id="narrow" box_width="100" box_height="50">a</p>
                 <div id="two" box_width="200" box_height="100">b</div>
                 <div id="tall" box_width="300" box_height="400">c</div>
                 <figure id="full" box_width="400" box_height="100">d</figure>
               </div></article>"#,
        );
        let summary = apply_layout_rules(&doc, &config, &grid, None);
        assert_eq!(summary.two_col_spans, 1);
        assert_eq!(summary.single_col, 2);

        let narrow = first(&doc, "#narrow");
        assert!(classes(&narrow).is_empty());
        assert!(get_attr(&narrow, "style").is_none());

        let two = first(&doc, "#two");
        assert!(has_class(&two, TWO_COL_SPAN));
        assert!(get_attr(&two, "style").is_some_and(|s| s.contains("yellow")));

        let tall = first(&doc, "#tall");
        assert!(has_class(&tall, SINGLE_COL));
        assert!(!has_class(&tall, TWO_COL_SPAN));
        assert!(get_attr(&tall, "style").is_some_and(|s| s.contains("orange")));

        let full = first(&doc, "#full");
        assert!(has_class(&full, SINGLE_COL));
        assert!(get_attr(&full, "style").is_some_and(|s| s.contains("red")));
    }

    #[test]
    fn table_width_classes_follow_measured_width() {
        let (config, grid) = defaults();
        let doc = parse_html(
            r#"<article><div>
                 <table id="reg" box_width="150" box_height="40"><tr><td>a</td></tr></table>
                 <table id="narrow" width="600" box_width="150" box_height="40"><tr><td>b</td></tr></table>
                 <table id="pct" width="100%" box_width="250" box_height="40"><tr><td>c</td></tr></table>
               </div>
               <div id="holder"><table id="mid" box_width="200" box_height="40"><tr><td>d</td></tr></table></div>
               </article>"#,
        );
        let summary = apply_layout_rules(&doc, &config, &grid, None);
        assert_eq!(summary.regular_tables, 2);
        assert_eq!(summary.wide_tables, 1);

        assert!(has_class(&first(&doc, "#reg"), REGULAR_TABLE));

        let narrow = first(&doc, "#narrow");
        assert!(has_class(&narrow, REGULAR_TABLE));
        assert!(!has_class(&narrow, WIDE_TABLE));

        let pct = first(&doc, "#pct");
        assert!(has_class(&pct, WIDE_TABLE));
        assert!(!has_class(&pct, REGULAR_TABLE));
        assert!(get_attr(&pct, "width").is_none());

        let holder = first(&doc, "#holder");
        assert!(has_class(&holder, WIDE_TABLE));
        assert!(!has_class(&first(&doc, "#mid"), WIDE_TABLE));
        assert!(has_class(&first(&doc, "#mid"), TWO_COL_SPAN));
    }

    #[test]
    fn top_level_tables_get_grid_classes() {
        let (config, grid) = defaults();
        let doc = parse_html(
            r#"<table id="small" width="90" style="width: 90px; color: red" box_width="60" box_height="30"><tr><td>a</td></tr></table>
               <table id="wide" box_width="560" box_height="30"><tr><td>b</td></tr></table>
               <table id="huge" box_width="900" box_height="30"><tr><td>c
                 <table id="nested" box_width="5" box_height="5"><tr><td>d</td></tr></table>
               </td></tr></table>
               <table id="info" class="infobox" box_width="60" box_height="30"><tr><td>e</td></tr></table>"#,
        );
        let summary = apply_layout_rules(&doc, &config, &grid, None);
        assert_eq!(summary.column_classes, 1);
        assert_eq!(summary.over_wide, 1);
        assert_eq!(summary.rotated, 1);

        let small = first(&doc, "#small");
        assert!(has_class(&small, "col-2"));
        assert!(get_attr(&small, "width").is_none());
        assert!(node_style(&small).iter().all(|(n, _)| n != "width"));

        let wide = first(&doc, "#wide");
        assert!(has_class(&wide, "over-wide"));
        let wrapper = wide.parent().expect("wrapped");
        assert!(has_class(&wrapper, OVER_WIDE_WRAPPER));
        let style = get_attr(&wrapper, "style").expect("wrapper style");
        assert!(style.starts_with("transform-origin:"));
        assert!(style.ends_with(";transform:scale(0.92)"));

        assert!(has_class(&first(&doc, "#huge"), "rotated-table"));
        assert!(classes(&first(&doc, "#nested")).iter().all(|c| !c.starts_with("col-")));
        assert!(classes(&first(&doc, "#info")).iter().all(|c| !c.starts_with("col-")));
    }

    #[test]
    fn subgrid_alignment_rounds_table_spans() {
        let config = LayoutConfig::builder()
            .align_tables_to_subgrid(true)
            .build()
            .expect("config");
        let grid = config.grid().expect("grid");
        let doc = parse_html(r#"<table box_width="60" box_height="30"><tr><td>a</td></tr></table>"#);
        apply_layout_rules(&doc, &config, &grid, None);
        assert!(has_class(&first(&doc, "table"), "col-4"));
    }

    #[test]
    fn infobox_floats_depend_on_height() {
        let (config, grid) = defaults();
        let doc = parse_html(
            r#"<div id="short" class="infobox" box_width="150" box_height="100">a</div>
               <table id="mid" class="infobox pp_float_table" box_width="150" box_height="200"><tr><td>b</td></tr></table>
               <table id="tall" class="infobox_v2 pp_float_table" box_width="150" box_height="300"><tr><td>c</td></tr></table>
               <div id="unmeasured" class="infobox pp_float_table">d</div>"#,
        );
        let summary = apply_layout_rules(&doc, &config, &grid, None);
        assert!(has_class(&first(&doc, "#short"), NO_FLOAT));

        let mid = first(&doc, "#mid");
        assert!(!has_class(&mid, NO_FLOAT));
        assert!(!has_class(&mid, FLOAT_TABLE));

        let tall = first(&doc, "#tall");
        assert!(!has_class(&tall, FLOAT_TABLE));
        assert!(has_class(&tall, "infobox_v2"));

        let unmeasured = first(&doc, "#unmeasured");
        assert!(has_class(&unmeasured, FLOAT_TABLE));
        assert_eq!(summary.no_float, 1);
        assert_eq!(summary.floats_removed, 2);
    }

    #[test]
    fn unmeasured_tree_is_left_alone() {
        let (config, grid) = defaults();
        let html = r#"<article><div><table width="700"><tr><td>x</td></tr></table><p>y</p></div></article>"#;
        let doc = parse_html(html);
        let before = serialize(&doc);
        let summary = apply_layout_rules(&doc, &config, &grid, None);
        assert_eq!(summary.decisions(), 0);
        assert!(summary.unmeasured > 0);
        assert_eq!(serialize(&doc), before);
    }

    #[test]
    fn applying_rules_twice_changes_nothing() {
        let (config, grid) = defaults();
        let doc = parse_html(
            r#"<article><div>
                 <table box_width="540" box_height="300"><tr><td>a</td></tr></table>
                 <div box_width="200" box_height="50">b</div>
               </div></article>"#,
        );
        apply_layout_rules(&doc, &config, &grid, None);
        let once = serialize(&doc);
        apply_layout_rules(&doc, &config, &grid, None);
        assert_eq!(serialize(&doc), once);
        assert_eq!(once.matches(OVER_WIDE_WRAPPER).count(), 1);
    }

    #[test]
    fn wide_image_in_table_spans_full_grid() {
        let html = r#"<article><div><table><tr><td>
                        <img src="map.png" box_width="510" box_height="300">
                      </td></tr></table></div></article>"#;

        let (config, grid) = defaults();
        let doc = parse_html(html);
        propagate_widths(&doc);
        let table = first(&doc, "table");
        let (w, _) = node_size(&table);
        assert_eq!(w.to_milli_i64(), 510_000);
        assert_eq!(
            resize_node_width_to_columns(&table, w, &grid, None),
            ColumnSpan::Columns(12)
        );
        assert!(has_class(&table, "col-12"));
        assert!(!config.align_tables_to_subgrid());

        let narrow = LayoutConfig::builder()
            .page_size(560.0, 842.0)
            .build()
            .expect("config");
        let narrow_grid = narrow.grid().expect("grid");
        let doc = parse_html(html);
        propagate_widths(&doc);
        let table = first(&doc, "table");
        let (w, _) = node_size(&table);
        let span = resize_node_width_to_columns(&table, w, &narrow_grid, None);
        assert!(matches!(span, ColumnSpan::OverWide { .. }));
        let wrapper = table.parent().expect("wrapper");
        assert!(get_attr(&wrapper, "style").is_some_and(|s| s.ends_with("scale(0.94)")));
    }
}
