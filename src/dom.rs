use kuchiki::traits::TendrilSink;
use kuchiki::{Attribute, ExpandedName, NodeRef};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleAttribute};

pub fn parse_html(html: &str) -> NodeRef {
    kuchiki::parse_html().one(html)
}

pub fn serialize(node: &NodeRef) -> String {
    node.to_string()
}

/// Lower-case local name of an element, `None` for other node kinds.
pub fn tag_name(node: &NodeRef) -> Option<String> {
    node.as_element()
        .map(|el| el.name.local.as_ref().to_ascii_lowercase())
}

pub fn is_tag(node: &NodeRef, tag: &str) -> bool {
    node.as_element()
        .is_some_and(|el| el.name.local.as_ref().eq_ignore_ascii_case(tag))
}

pub fn get_attr(node: &NodeRef, name: &str) -> Option<String> {
    let el = node.as_element()?;
    let attrs = el.attributes.borrow();
    attrs.get(name).map(str::to_string)
}

pub fn set_attr(node: &NodeRef, name: &str, value: impl Into<String>) {
    if let Some(el) = node.as_element() {
        el.attributes.borrow_mut().insert(name, value.into());
    }
}

pub fn remove_attr(node: &NodeRef, name: &str) -> Option<String> {
    let el = node.as_element()?;
    let removed = el.attributes.borrow_mut().remove(name);
    removed.map(|attr| attr.value)
}

pub fn has_attr(node: &NodeRef, name: &str) -> bool {
    node.as_element()
        .is_some_and(|el| el.attributes.borrow().contains(name))
}

pub fn classes(node: &NodeRef) -> Vec<String> {
    get_attr(node, "class")
        .map(|c| c.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

pub fn has_class(node: &NodeRef, class: &str) -> bool {
    classes(node).iter().any(|c| c == class)
}

/// Substring match on the raw class attribute (`contains(@class, ...)`).
pub fn class_contains(node: &NodeRef, needle: &str) -> bool {
    get_attr(node, "class").is_some_and(|c| c.contains(needle))
}

pub fn append_class(node: &NodeRef, class: &str) {
    let mut current = classes(node);
    if current.iter().any(|c| c == class) {
        return;
    }
    current.push(class.to_string());
    set_attr(node, "class", current.join(" "));
}

pub fn remove_class(node: &NodeRef, class: &str) {
    let current = classes(node);
    if !current.iter().any(|c| c == class) {
        return;
    }
    let kept: Vec<String> = current.into_iter().filter(|c| c != class).collect();
    if kept.is_empty() {
        remove_attr(node, "class");
    } else {
        set_attr(node, "class", kept.join(" "));
    }
}

/// Ordered `(property, value)` pairs of the `style` attribute. Important
/// declarations follow the normal ones and keep their `!important` in the
/// value. Declarations lightningcss cannot make sense of are dropped.
pub fn node_style(node: &NodeRef) -> Vec<(String, String)> {
    let Some(style) = get_attr(node, "style") else {
        return Vec::new();
    };
    let options = ParserOptions {
        error_recovery: true,
        ..ParserOptions::default()
    };
    let Ok(parsed) = StyleAttribute::parse(&style, options) else {
        return Vec::new();
    };
    let block = &parsed.declarations;
    let normal = block.declarations.iter().map(|prop| (prop, false));
    let important = block.important_declarations.iter().map(|prop| (prop, true));
    normal
        .chain(important)
        .filter_map(|(prop, important)| {
            let name = prop.property_id().name().to_string();
            let mut value = prop.value_to_css_string(PrinterOptions::default()).ok()?;
            if important {
                value.push_str(" !important");
            }
            Some((name, value))
        })
        .collect()
}

pub fn serialize_style(declarations: &[(String, String)]) -> String {
    declarations
        .iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join(";")
}

fn write_style(node: &NodeRef, declarations: &[(String, String)]) {
    if declarations.is_empty() {
        remove_attr(node, "style");
    } else {
        set_attr(node, "style", serialize_style(declarations));
    }
}

/// Set `name` to `value`, replacing any earlier declaration of it.
pub fn add_node_style(node: &NodeRef, name: &str, value: &str) {
    let mut declarations = node_style(node);
    declarations.retain(|(n, _)| n != name);
    declarations.push((name.to_string(), value.trim().to_string()));
    write_style(node, &declarations);
}

pub fn remove_node_styles(node: &NodeRef, names: &[&str]) {
    if !has_attr(node, "style") {
        return;
    }
    let mut declarations = node_style(node);
    declarations.retain(|(n, _)| !names.contains(&n.as_str()));
    write_style(node, &declarations);
}

/// Drop both the `width` attribute and a `width` style declaration.
pub fn remove_node_width(node: &NodeRef) {
    remove_attr(node, "width");
    remove_node_styles(node, &["width"]);
}

/// Put a new `<tag class="...">` in place of `node` and move `node` inside
/// it. Returns the wrapper.
pub fn wrap_node(node: &NodeRef, tag: &str, class: &str) -> Option<NodeRef> {
    let el = node.as_element()?;
    node.parent()?;
    let mut name = el.name.clone();
    name.local = tag.into();
    let wrapper = NodeRef::new_element(name, std::iter::empty::<(ExpandedName, Attribute)>());
    if !class.is_empty() {
        set_attr(&wrapper, "class", class);
    }
    node.insert_before(wrapper.clone());
    wrapper.append(node.clone());
    Some(wrapper)
}

pub fn element_children(node: &NodeRef) -> impl Iterator<Item = NodeRef> {
    node.children().filter(|c| c.as_element().is_some())
}

pub fn following_elements(node: &NodeRef) -> impl Iterator<Item = NodeRef> {
    node.following_siblings().filter(|c| c.as_element().is_some())
}

/// Elements below `root` (inclusive) that have no element children.
pub fn leaves(root: &NodeRef) -> Vec<NodeRef> {
    root.inclusive_descendants()
        .filter(|n| n.as_element().is_some())
        .filter(|n| element_children(n).next().is_none())
        .collect()
}

pub fn has_ancestor_tag(node: &NodeRef, tag: &str) -> bool {
    node.ancestors().any(|a| is_tag(&a, tag))
}

pub fn elements_by_tag(root: &NodeRef, tag: &str) -> Vec<NodeRef> {
    root.inclusive_descendants()
        .filter(|n| is_tag(n, tag))
        .collect()
}
